//! Main simulation world that ties everything together
//!
//! [`SimWorld`] owns every piece of mutable state: the signal controller, the
//! override manager, the vehicle set, the clock, and the random source. All
//! mutation goes through `&mut self`, so whoever holds the world is the one
//! synchronization boundary.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::clock::{SimulationClock, TaskSchedule};
use super::collision::CollisionGuard;
use super::config::{ConfigError, SimConfig};
use super::emergency::{EmergencyOverrideManager, OverrideEvent, SirenCue};
use super::signal::{InvariantViolation, SignalController, SignalTransition};
use super::snapshot::{SignalSnapshot, SimSnapshot, VehicleSnapshot};
use super::spawner::{SpawnOutcome, VehicleSpawner};
use super::stats::SimStats;
use super::types::{Direction, Position, TurnSide, VehicleCategory, VehicleId};
use super::vehicle::{SignalState, SimVehicle, VehicleUpdateResult};

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,
    signals: SignalController,
    emergency: EmergencyOverrideManager,
    spawner: VehicleSpawner,
    collisions: CollisionGuard,
    /// Live vehicles, iterated in id order
    vehicles: BTreeMap<VehicleId, SimVehicle>,
    clock: SimulationClock,
    schedule: TaskSchedule,
    rng: StdRng,
    seed: u64,
    /// Cosmetic only
    night_mode: bool,
    running: bool,
    stats: SimStats,
}

impl SimWorld {
    /// Create a world seeded from OS entropy. The seed is logged so the run
    /// can be replayed with [`SimWorld::new_with_seed`].
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let seed = rand::random::<u64>();
        info!("Simulation seed: {}", seed);
        Self::new_with_seed(config, seed)
    }

    /// Create a world with a seeded RNG for reproducible simulations
    pub fn new_with_seed(config: SimConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            signals: SignalController::new(config.timings),
            emergency: EmergencyOverrideManager::new(config.emergency_radius),
            spawner: VehicleSpawner::new(
                config.population_cap,
                config.spacing_gap,
                config.will_turn_probability,
            ),
            collisions: CollisionGuard::new(config.collision_check_distance),
            vehicles: BTreeMap::new(),
            clock: SimulationClock::new(config.tick_rate_hz, config.run_budget_secs),
            schedule: TaskSchedule::new(
                config.pacing.signal_interval,
                config.pacing.environment_interval,
            ),
            rng: StdRng::seed_from_u64(seed),
            seed,
            night_mode: false,
            running: true,
            stats: SimStats::default(),
            config,
        })
    }

    /// Attach an audio collaborator for the siren
    pub fn with_siren(mut self, siren: Box<dyn SirenCue>) -> Self {
        self.emergency.set_siren(siren);
        self
    }

    pub fn set_siren(&mut self, siren: Box<dyn SirenCue>) {
        self.emergency.set_siren(siren);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    pub fn vehicles(&self) -> &BTreeMap<VehicleId, SimVehicle> {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.get(&id)
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Request termination; later ticks do nothing.
    pub fn stop(&mut self) {
        if self.running {
            info!("Simulation stop requested at {:.2}s", self.clock.elapsed());
        }
        self.running = false;
    }

    pub fn set_night_mode(&mut self, enabled: bool) {
        if self.night_mode != enabled {
            info!("Night mode {}", if enabled { "on" } else { "off" });
        }
        self.night_mode = enabled;
    }

    pub fn set_sound(&mut self, enabled: bool) {
        self.emergency.set_sound(enabled);
    }

    /// Place a vehicle in the lane of `direction`, `distance` units before
    /// the centre, already moving at `speed`.
    pub fn place_vehicle(
        &mut self,
        category: VehicleCategory,
        direction: Direction,
        distance: f32,
        speed: f32,
    ) -> VehicleId {
        let id = self.spawner.allocate_id();
        let position = self.config.layout.approach_point(direction, distance);
        let mut vehicle = SimVehicle::new(id, category, direction, position, false, TurnSide::Left);
        vehicle.speed = speed.clamp(0.0, vehicle.max_speed);
        self.vehicles.insert(id, vehicle);
        self.stats.vehicles_spawned += 1;
        id
    }

    /// Run one spawn attempt.
    pub fn attempt_spawn(&mut self) -> SpawnOutcome {
        let outcome = self
            .spawner
            .attempt(&mut self.vehicles, &self.config.layout, &mut self.rng);
        match outcome {
            SpawnOutcome::Spawned(_) => self.stats.vehicles_spawned += 1,
            SpawnOutcome::PopulationCapReached => self.stats.rejected_cap += 1,
            SpawnOutcome::SpacingBlocked(_) => self.stats.rejected_spacing += 1,
        }
        outcome
    }

    /// Delay before the spawn task should try again after `outcome`
    pub fn spawn_retry_delay(&mut self, outcome: SpawnOutcome) -> f32 {
        outcome.retry_delay(&self.config.pacing, &mut self.rng)
    }

    /// Advance the signal state machine by one phase step.
    pub fn step_signals(&mut self) -> Result<(), InvariantViolation> {
        match self.signals.step() {
            Ok(SignalTransition::HandOff { from, to }) => {
                debug!("Green moved from {} to {}", from, to);
            }
            Ok(_) => {}
            Err(violation) => self.handle_violation(violation)?,
        }
        self.enforce_invariants()
    }

    /// Randomly switch night mode; returns the new setting.
    pub fn toggle_environment(&mut self) -> bool {
        let night = self.rng.random_bool(self.config.pacing.night_probability);
        self.set_night_mode(night);
        night
    }

    /// Run the periodic tasks on simulated time, then tick.
    ///
    /// This is the deterministic counterpart of the real-time runtime.
    pub fn step(&mut self, delta: f32) -> Result<(), InvariantViolation> {
        if !self.running {
            return Ok(());
        }

        if self.schedule.spawn.tick(delta) {
            let outcome = self.attempt_spawn();
            let delay = self.spawn_retry_delay(outcome);
            self.schedule.spawn.rearm(delay);
        }

        if self.schedule.signal.tick(delta) {
            self.schedule.signal.rearm(self.config.pacing.signal_interval);
            self.step_signals()?;
        }

        if self.schedule.environment.tick(delta) {
            self.schedule
                .environment
                .rearm(self.config.pacing.environment_interval);
            self.toggle_environment();
        }

        self.tick(delta)
    }

    /// Authoritative per-tick update.
    pub fn tick(&mut self, delta: f32) -> Result<(), InvariantViolation> {
        if !self.running {
            return Ok(());
        }

        let layout = &self.config.layout;

        if let OverrideEvent::Activated { .. } =
            self.emergency.evaluate(&self.vehicles, layout, &mut self.signals)
        {
            self.stats.overrides_triggered += 1;
        }

        let signal = SignalState {
            current_green: self.signals.current_green(),
            yellow: self.signals.is_yellow(),
        };
        let mut departed = Vec::new();
        for (id, vehicle) in self.vehicles.iter_mut() {
            if vehicle.update(signal, layout) == VehicleUpdateResult::Despawn {
                departed.push(*id);
            }
        }
        for id in departed {
            if let Some(vehicle) = self.vehicles.remove(&id) {
                debug!("{} left the intersection", vehicle);
                self.stats.vehicles_exited += 1;
            }
        }

        self.apply_yield();

        let overlaps = self.collisions.resolve(&mut self.vehicles);
        self.stats.collisions += overlaps as u32;

        self.enforce_invariants()?;

        self.clock.advance(delta);
        if self.clock.budget_exhausted() {
            info!("Run budget of {:.0}s reached", self.clock.run_budget());
            self.running = false;
        }
        Ok(())
    }

    /// Slow down vehicles with an emergency vehicle close behind them.
    fn apply_yield(&mut self) {
        let emergencies: Vec<(Direction, Position)> = self
            .vehicles
            .values()
            .filter(|v| v.is_emergency)
            .map(|v| (v.direction, v.position))
            .collect();
        let reach = self.config.yield_distance;
        let offset = self.config.yield_offset;
        let layout = &self.config.layout;

        for vehicle in self.vehicles.values_mut().filter(|v| !v.is_emergency) {
            let chased = emergencies.iter().any(|(direction, position)| {
                let gap = vehicle.position.sub(position).dot(&direction.heading());
                *direction == vehicle.direction && gap > 0.0 && gap <= reach
            });
            if chased {
                vehicle.yield_to_emergency(offset, layout);
            } else {
                vehicle.yielding = false;
            }
        }
    }

    fn enforce_invariants(&mut self) -> Result<(), InvariantViolation> {
        match self.signals.check_invariants() {
            Ok(()) => Ok(()),
            Err(violation) => self.handle_violation(violation),
        }
    }

    fn handle_violation(&mut self, violation: InvariantViolation) -> Result<(), InvariantViolation> {
        if self.config.strict_invariants {
            error!("Signal invariant violated: {}", violation);
            self.running = false;
            return Err(violation);
        }
        warn!("Repairing signal state after violation: {}", violation);
        self.signals.repair();
        self.stats.invariant_repairs += 1;
        Ok(())
    }

    /// Read-only view of the current state
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            vehicles: self.vehicles.values().map(VehicleSnapshot::from).collect(),
            signals: SignalSnapshot::capture_all(&self.signals),
            override_active: self.signals.is_preempted(),
            override_target: self.signals.preempt_target(),
            elapsed: self.clock.elapsed(),
            tick: self.clock.ticks(),
            night_mode: self.night_mode,
            sound_enabled: self.emergency.sound_enabled(),
            siren_playing: self.emergency.siren_playing(),
        }
    }

    /// Green steps per direction, in N/E/S/W order
    pub fn total_green(&self) -> [u32; 4] {
        Direction::ALL.map(|d| self.signals.signal(d).total_green)
    }

    /// Log the end-of-run statistics block
    pub fn log_completion(&self) {
        self.stats
            .log_completion(self.clock.elapsed(), self.vehicles.len(), self.total_green());
    }

    /// Print a summary of the current state to the console
    pub fn print_summary(&self) {
        println!("=== Intersection Summary ===");
        println!(
            "Time: {:.2}s (tick {}), night mode: {}",
            self.clock.elapsed(),
            self.clock.ticks(),
            if self.night_mode { "on" } else { "off" }
        );
        println!(
            "Vehicles: {}/{} (spawned {}, exited {})",
            self.vehicles.len(),
            self.spawner.population_cap(),
            self.stats.vehicles_spawned,
            self.stats.vehicles_exited
        );

        println!("--- Signals ---");
        for signal in SignalSnapshot::capture_all(&self.signals) {
            println!(
                "  {:<5} {:?} ({}s), total green {}s",
                signal.direction.to_string(),
                signal.phase,
                signal.seconds_remaining,
                signal.total_green
            );
        }
        if let Some(target) = self.signals.preempt_target() {
            println!("  Emergency override towards {}", target);
        }

        if !self.vehicles.is_empty() {
            println!("--- Active Vehicles ---");
            for vehicle in self.vehicles.values() {
                println!(
                    "  {}: {} at ({:.0}, {:.0}) speed {:.2}{}",
                    vehicle,
                    vehicle.direction,
                    vehicle.position.x,
                    vehicle.position.y,
                    vehicle.speed,
                    if vehicle.is_turning() { " turning" } else { "" }
                );
            }
        }
    }
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld")
            .field("seed", &self.seed)
            .field("elapsed", &self.clock.elapsed())
            .field("vehicles", &self.vehicles.len())
            .field("running", &self.running)
            .finish()
    }
}
