use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::{error, info};

use intersection_sim::runtime::RealtimeSimulation;
use intersection_sim::simulation::{Phase, SimConfig, SimSnapshot, SimWorld, SirenCue};

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Four-way traffic signal simulation with emergency preemption")]
struct Cli {
    /// Run on background threads in real time instead of headless
    #[arg(long)]
    realtime: bool,

    /// Run budget in simulated seconds
    #[arg(long, default_value = "300")]
    duration: f32,

    /// Seed for a reproducible run (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Green duration in seconds
    #[arg(long, default_value = "20")]
    green: u32,

    /// Seconds between progress reports
    #[arg(long, default_value = "10")]
    report_every: f32,

    /// Start in night mode
    #[arg(long)]
    night: bool,

    /// Disable the siren cue
    #[arg(long)]
    mute: bool,
}

/// Stands in for an audio device by logging the cue
struct LoggingSiren;

impl SirenCue for LoggingSiren {
    fn start(&mut self) {
        info!("Siren on");
    }

    fn stop(&mut self) {
        info!("Siren off");
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = if cli.realtime {
        run_realtime(&cli)
    } else {
        run_headless(&cli)
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn build_world(cli: &Cli) -> Result<SimWorld> {
    ensure!(
        cli.report_every.is_finite() && cli.report_every > 0.0,
        "report interval must be a positive number of seconds, got {}",
        cli.report_every
    );
    let mut config = SimConfig {
        run_budget_secs: cli.duration,
        ..SimConfig::default()
    };
    config.timings.green = cli.green;

    let world = match cli.seed {
        Some(seed) => SimWorld::new_with_seed(config, seed),
        None => SimWorld::new(config),
    }
    .context("Invalid simulation configuration")?;

    let mut world = world.with_siren(Box::new(LoggingSiren));
    world.set_night_mode(cli.night);
    world.set_sound(!cli.mute);
    Ok(world)
}

/// Run the simulation in headless mode on simulated time
fn run_headless(cli: &Cli) -> Result<()> {
    let mut world = build_world(cli)?;
    let delta = world.config().tick_delta();
    println!("Running intersection simulation in headless mode...");
    println!(
        "Seed: {}, budget: {}s, tick: {:.4}s",
        world.seed(),
        cli.duration,
        delta
    );
    println!();

    println!("Initial state:");
    world.print_summary();
    println!();

    let report_every = cli.report_every.max(delta);
    let mut next_report = report_every;
    while world.is_running() {
        world.step(delta).context("Simulation failed")?;

        if world.elapsed() >= next_report {
            println!("--- After {:.1}s simulated time ---", world.elapsed());
            world.print_summary();
            println!();
            next_report += report_every;
        }
    }

    println!("=== Final State ===");
    world.print_summary();
    world.log_completion();
    Ok(())
}

/// Run the simulation on its own threads in real time
fn run_realtime(cli: &Cli) -> Result<()> {
    let world = build_world(cli)?;
    println!(
        "Running intersection simulation in real time (seed {})...",
        world.seed()
    );

    let sim = RealtimeSimulation::start(world)?;
    let report_every = Duration::from_secs_f32(cli.report_every.max(0.1));
    while sim.is_running() {
        thread::sleep(report_every);
        print_report(&sim.snapshot());
    }

    let world = sim.join().context("Realtime simulation failed")?;
    println!("=== Final State ===");
    world.print_summary();
    world.log_completion();
    Ok(())
}

fn print_report(snapshot: &SimSnapshot) {
    let green = snapshot
        .signals
        .iter()
        .find(|s| s.phase != Phase::Red)
        .map(|s| format!("{} {:?} ({}s)", s.direction, s.phase, s.seconds_remaining))
        .unwrap_or_else(|| "none".to_string());
    println!(
        "[{:>6.1}s] vehicles: {} ({} emergency), active: {}{}",
        snapshot.elapsed,
        snapshot.vehicles.len(),
        snapshot.emergency_count(),
        green,
        match snapshot.override_target {
            Some(target) => format!(", override towards {}", target),
            None => String::new(),
        }
    );
}
