//! Standalone intersection simulation module
//!
//! This module contains the deterministic core of the simulation: signal
//! timing, emergency preemption, vehicle motion, spawning, and collision
//! handling. It runs without any rendering or audio and can be driven
//! headless from a seed.

mod clock;
mod collision;
mod config;
mod emergency;
mod signal;
mod snapshot;
mod spawner;
mod stats;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
pub use clock::{SimulationClock, StepTimer, TaskSchedule};
pub use collision::CollisionGuard;
pub use config::{
    ConfigError, IntersectionLayout, SignalTimings, SimConfig, TaskPacing, MAX_GREEN, MIN_GREEN,
};
pub use emergency::{Approach, EmergencyOverrideManager, OverrideEvent, SilentSiren, SirenCue};
pub use signal::{
    InvariantViolation, Phase, SignalController, SignalTransition, TrafficSignal,
    PREEMPT_YELLOW_CAP,
};
pub use snapshot::{SignalSnapshot, SimSnapshot, VehicleSnapshot};
pub use spawner::{SpawnOutcome, VehicleSpawner};
pub use stats::SimStats;
pub use types::{CategorySpec, Direction, Position, TurnSide, VehicleCategory, VehicleId};
pub use vehicle::{
    Bounds, SignalState, SimVehicle, TurnArc, VehicleUpdateResult, BRAKE_FACTOR,
    TURN_SWEEP_DEGREES, YIELD_FACTOR,
};
pub use world::SimWorld;
