//! Real-time driver
//!
//! A tick thread owns the [`SimWorld`] exclusively and advances it at the
//! configured rate. Background tasks (spawning, signal timing, environment)
//! never touch the world; they submit [`Command`]s over a crossbeam channel
//! which the tick thread drains at the start of every frame. The latest
//! snapshot is published behind a mutex for renderers and reporting.
//!
//! A panic inside one iteration of a background task is logged and the task
//! carries on; only a failure on the tick thread ends the run.
//!
//! A shared running flag stops every thread promptly. Sleeps are sliced so a
//! stop request is seen within [`SLEEP_SLICE`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::simulation::{SimSnapshot, SimWorld, SpawnOutcome, TaskPacing};

/// Longest uninterrupted sleep of any thread
pub const SLEEP_SLICE: Duration = Duration::from_millis(20);

const COMMAND_CAPACITY: usize = 256;

/// Pause before a background task retries after a failed iteration
const FAILURE_BACKOFF_SECS: f32 = 1.0;

/// Reply to a spawn request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnReply {
    pub outcome: SpawnOutcome,
    /// Seconds the spawn task should wait before trying again
    pub retry_after: f32,
}

/// Intents submitted to the tick thread
#[derive(Debug)]
pub enum Command {
    SpawnAttempt { reply: Sender<SpawnReply> },
    SignalStep,
    EnvironmentToggle,
    SetNightMode(bool),
    SetSound(bool),
}

/// Handle to a simulation running on its own threads
pub struct RealtimeSimulation {
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<SimSnapshot>>,
    driver: JoinHandle<Result<SimWorld>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl RealtimeSimulation {
    /// Move `world` onto a tick thread and start the background tasks.
    pub fn start(world: SimWorld) -> Result<Self> {
        let (commands, inbox) = crossbeam_channel::bounded(COMMAND_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(world.snapshot()));
        let pacing = world.config().pacing.clone();
        info!(
            "Starting realtime simulation at {} Hz for {:.0}s",
            world.config().tick_rate_hz,
            world.config().run_budget_secs
        );

        let driver = {
            let running = Arc::clone(&running);
            let latest = Arc::clone(&latest);
            thread::Builder::new()
                .name("tick".into())
                .spawn(move || drive(world, inbox, running, latest))
                .context("Failed to start tick thread")?
        };

        let mut sim = Self {
            commands,
            running,
            latest,
            driver,
            tasks: Vec::new(),
        };
        if let Err(e) = sim.spawn_tasks(pacing) {
            sim.stop();
            return Err(e);
        }
        Ok(sim)
    }

    fn spawn_tasks(&mut self, pacing: TaskPacing) -> Result<()> {
        let (tx, running) = (self.commands.clone(), Arc::clone(&self.running));
        let handle = thread::Builder::new()
            .name("spawner".into())
            .spawn(move || spawn_task(tx, running))
            .context("Failed to start spawn task")?;
        self.tasks.push(("spawner", handle));

        let (tx, running) = (self.commands.clone(), Arc::clone(&self.running));
        let interval = pacing.signal_interval;
        let handle = thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                periodic_task("signals", tx, running, interval, || Command::SignalStep)
            })
            .context("Failed to start signal task")?;
        self.tasks.push(("signals", handle));

        let (tx, running) = (self.commands.clone(), Arc::clone(&self.running));
        let interval = pacing.environment_interval;
        let handle = thread::Builder::new()
            .name("environment".into())
            .spawn(move || {
                periodic_task("environment", tx, running, interval, || {
                    Command::EnvironmentToggle
                })
            })
            .context("Failed to start environment task")?;
        self.tasks.push(("environment", handle));
        Ok(())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SimSnapshot {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every thread to finish; returns immediately.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn set_night_mode(&self, enabled: bool) {
        self.submit(Command::SetNightMode(enabled));
    }

    pub fn set_sound(&self, enabled: bool) {
        self.submit(Command::SetSound(enabled));
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Simulation already finished, command dropped");
        }
    }

    /// Wait for the run to end and take the world back.
    ///
    /// A panicking background task is logged and does not fail the run; a
    /// failure on the tick thread does.
    pub fn join(self) -> Result<SimWorld> {
        let result = match self.driver.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("Tick thread panicked")),
        };
        self.running.store(false, Ordering::Release);

        for (name, handle) in self.tasks {
            if handle.join().is_err() {
                error!("Background task '{}' panicked", name);
            }
        }
        result
    }
}

impl std::fmt::Debug for RealtimeSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSimulation")
            .field("running", &self.is_running())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Tick thread body. Clears the running flag on the way out, whatever the
/// outcome, so the background tasks wind down.
fn drive(
    mut world: SimWorld,
    inbox: Receiver<Command>,
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<SimSnapshot>>,
) -> Result<SimWorld> {
    let result = run_frames(&mut world, &inbox, &running, &latest);
    running.store(false, Ordering::Release);
    world.stop();
    publish(&latest, world.snapshot());
    match result {
        Ok(()) => Ok(world),
        Err(e) => {
            error!("Simulation terminated: {:#}", e);
            Err(e)
        }
    }
}

fn run_frames(
    world: &mut SimWorld,
    inbox: &Receiver<Command>,
    running: &AtomicBool,
    latest: &Mutex<SimSnapshot>,
) -> Result<()> {
    let frame = world.clock().frame_duration();
    let delta = world.config().tick_delta();

    while running.load(Ordering::Acquire) && world.is_running() {
        let frame_start = Instant::now();

        for command in inbox.try_iter() {
            apply(world, command)?;
        }

        world
            .tick(delta)
            .with_context(|| format!("Tick {} failed", world.clock().ticks()))?;
        publish(latest, world.snapshot());

        if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }
    Ok(())
}

fn apply(world: &mut SimWorld, command: Command) -> Result<()> {
    match command {
        Command::SpawnAttempt { reply } => {
            let outcome = world.attempt_spawn();
            let retry_after = world.spawn_retry_delay(outcome);
            if reply.send(SpawnReply { outcome, retry_after }).is_err() {
                warn!("Spawn task stopped listening");
            }
        }
        Command::SignalStep => world.step_signals().context("Signal step failed")?,
        Command::EnvironmentToggle => {
            world.toggle_environment();
        }
        Command::SetNightMode(enabled) => world.set_night_mode(enabled),
        Command::SetSound(enabled) => world.set_sound(enabled),
    }
    Ok(())
}

fn publish(latest: &Mutex<SimSnapshot>, snapshot: SimSnapshot) {
    match latest.lock() {
        Ok(mut guard) => *guard = snapshot,
        Err(poisoned) => *poisoned.into_inner() = snapshot,
    }
}

/// Sleep for `secs`, waking early if the run stops. False when stopped.
fn sleep_while_running(running: &AtomicBool, secs: f32) -> bool {
    let deadline = Instant::now() + Duration::from_secs_f32(secs.max(0.0));
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Run one iteration of a background task, logging a panic instead of
/// letting it end the thread. `None` when the iteration failed.
fn isolated<T>(task: &str, body: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => Some(value),
        Err(_) => {
            error!("Background task '{}' iteration panicked, continuing", task);
            None
        }
    }
}

/// Ask the tick thread for one spawn attempt; `None` once it is gone.
fn request_spawn(commands: &Sender<Command>) -> Option<f32> {
    let (reply, answer) = crossbeam_channel::bounded(1);
    commands.send(Command::SpawnAttempt { reply }).ok()?;
    let SpawnReply { outcome, retry_after } = answer.recv().ok()?;
    debug!("Spawn attempt: {:?}, next in {:.2}s", outcome, retry_after);
    Some(retry_after)
}

fn spawn_task(commands: Sender<Command>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Acquire) {
        let delay = match isolated("spawner", || request_spawn(&commands)) {
            Some(Some(delay)) => delay,
            // Tick thread is gone
            Some(None) => break,
            None => FAILURE_BACKOFF_SECS,
        };
        if !sleep_while_running(&running, delay) {
            break;
        }
    }
    debug!("Spawn task finished");
}

fn periodic_task(
    name: &'static str,
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
    interval: f32,
    make: impl Fn() -> Command,
) {
    while sleep_while_running(&running, interval) {
        if let Some(Err(_)) = isolated(name, || commands.send(make())) {
            break;
        }
    }
    debug!("Task '{}' finished", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimConfig;

    fn world(budget: f32) -> SimWorld {
        let config = SimConfig {
            run_budget_secs: budget,
            ..SimConfig::default()
        };
        SimWorld::new_with_seed(config, 21).unwrap()
    }

    #[test]
    fn runs_until_budget() {
        let sim = RealtimeSimulation::start(world(0.5)).unwrap();
        let world = sim.join().unwrap();
        assert!(world.elapsed() >= 0.5);
        assert!(!world.is_running());
        assert!(world.stats().vehicles_spawned >= 1);
    }

    #[test]
    fn stop_terminates_promptly() {
        let sim = RealtimeSimulation::start(world(300.0)).unwrap();
        thread::sleep(Duration::from_millis(100));
        let requested = Instant::now();
        sim.stop();
        let world = sim.join().unwrap();
        assert!(requested.elapsed() < Duration::from_secs(2));
        assert!(world.elapsed() < 300.0);
    }

    #[test]
    fn snapshot_is_published() {
        let sim = RealtimeSimulation::start(world(300.0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sim.snapshot().tick == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(sim.snapshot().tick > 0);
        sim.stop();
        sim.join().unwrap();
    }

    #[test]
    fn control_commands_reach_the_world() {
        let sim = RealtimeSimulation::start(world(300.0)).unwrap();
        sim.set_night_mode(true);
        sim.set_sound(false);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !(sim.snapshot().night_mode && !sim.snapshot().sound_enabled)
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(10));
        }
        let snapshot = sim.snapshot();
        assert!(snapshot.night_mode);
        assert!(!snapshot.sound_enabled);
        sim.stop();
        let world = sim.join().unwrap();
        assert!(world.night_mode());
    }

    #[test]
    fn failed_iteration_does_not_end_task() {
        use std::sync::atomic::AtomicUsize;

        let (tx, rx) = crossbeam_channel::bounded(16);
        let running = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = {
            let (running, calls) = (Arc::clone(&running), Arc::clone(&calls));
            thread::spawn(move || {
                periodic_task("flaky", tx, running, 0.01, move || {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first iteration fails");
                    }
                    Command::SignalStep
                })
            })
        };

        // The first send is lost to the panic, later ones still arrive
        let received = rx.recv_timeout(Duration::from_secs(5));
        assert!(matches!(received, Ok(Command::SignalStep)));
        assert!(calls.load(Ordering::SeqCst) >= 2);

        running.store(false, Ordering::Release);
        drop(rx);
        assert!(handle.join().is_ok());
    }

    #[test]
    fn sliced_sleep_wakes_on_stop() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!sleep_while_running(&running, 10.0));
        assert!(start.elapsed() < Duration::from_secs(1));

        let running = AtomicBool::new(true);
        assert!(sleep_while_running(&running, 0.01));
    }
}
