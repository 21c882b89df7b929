//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is fixed at construction time. [`SimConfig::validate`] runs
//! before any state is built so a bad configuration never starts a run.

use std::error::Error;
use std::fmt;

use super::types::{Direction, Position};

/// Lower bound for the configured green duration (seconds)
pub const MIN_GREEN: u32 = 10;
/// Upper bound for the configured green duration (seconds)
pub const MAX_GREEN: u32 = 60;

/// Default signal durations in seconds, used to re-arm a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalTimings {
    pub green: u32,
    pub yellow: u32,
    /// Nominal red duration; red actually lasts until the cycle returns
    pub red: u32,
}

impl Default for SignalTimings {
    fn default() -> Self {
        Self {
            green: 20,
            yellow: 5,
            red: 150,
        }
    }
}

/// Geometry of the single intersection and its four approaches
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionLayout {
    pub width: f32,
    pub height: f32,
    /// Distance from the centre back to each stop line
    pub stop_line_offset: f32,
    /// Offset of each lane from the road centreline
    pub lane_offset: f32,
    /// Maximum random jitter applied across the lane at spawn
    pub lane_jitter: i32,
    /// How far outside the area vehicles appear
    pub spawn_margin: f32,
    /// How far outside the area vehicles are removed
    pub despawn_margin: f32,
    pub turn_radius: f32,
    /// A turning vehicle starts its arc once this close to the centre
    pub turn_trigger_distance: f32,
}

impl Default for IntersectionLayout {
    fn default() -> Self {
        Self {
            width: 1400.0,
            height: 800.0,
            stop_line_offset: 50.0,
            lane_offset: 50.0,
            lane_jitter: 30,
            spawn_margin: 50.0,
            despawn_margin: 100.0,
            turn_radius: 60.0,
            turn_trigger_distance: 30.0,
        }
    }
}

impl IntersectionLayout {
    pub fn center(&self) -> Position {
        Position::new(self.width / 2.0, self.height / 2.0)
    }

    /// Spawn point for a direction before lane jitter is applied
    pub fn spawn_point(&self, direction: Direction) -> Position {
        let c = self.center();
        match direction {
            Direction::North => Position::new(c.x - self.lane_offset, self.height + self.spawn_margin),
            Direction::East => Position::new(-self.spawn_margin, c.y - self.lane_offset),
            Direction::South => Position::new(c.x + self.lane_offset, -self.spawn_margin),
            Direction::West => Position::new(self.width + self.spawn_margin, c.y + self.lane_offset),
        }
    }

    /// Distance still to travel before reaching the centre.
    ///
    /// Positive while approaching, negative once past.
    pub fn distance_to_center(&self, position: &Position, direction: Direction) -> f32 {
        self.center().sub(position).dot(&direction.heading())
    }

    /// Point in the lane of `direction`, `distance` units before the centre
    pub fn approach_point(&self, direction: Direction, distance: f32) -> Position {
        let lane = self.spawn_point(direction);
        let c = self.center();
        let h = direction.heading();
        if direction.is_vertical() {
            Position::new(lane.x, c.y - h.y * distance)
        } else {
            Position::new(c.x - h.x * distance, lane.y)
        }
    }

    pub fn distance_to_stop_line(&self, position: &Position, direction: Direction) -> f32 {
        self.distance_to_center(position, direction) - self.stop_line_offset
    }

    /// Distance travelled since the spawn edge of `direction`
    pub fn distance_from_spawn(&self, position: &Position, direction: Direction) -> f32 {
        position
            .sub(&self.spawn_point(direction))
            .dot(&direction.heading())
    }

    /// Lane and margin geometry checks; called from [`SimConfig::validate`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lane_jitter < 0 {
            return Err(ConfigError::InvalidDistance {
                name: "lane jitter",
                value: self.lane_jitter as f32,
            });
        }
        non_negative_distance("lane offset", self.lane_offset)?;
        non_negative_distance("spawn margin", self.spawn_margin)?;
        non_negative_distance("despawn margin", self.despawn_margin)?;
        if self.spawn_margin >= self.despawn_margin {
            return Err(ConfigError::InvalidMargins {
                spawn: self.spawn_margin,
                despawn: self.despawn_margin,
            });
        }
        Ok(())
    }

    pub fn is_out_of_bounds(&self, position: &Position) -> bool {
        position.x < -self.despawn_margin
            || position.x > self.width + self.despawn_margin
            || position.y < -self.despawn_margin
            || position.y > self.height + self.despawn_margin
    }
}

/// Pacing of the background tasks, in seconds of simulated (or wall) time
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPacing {
    /// One signal phase step per interval
    pub signal_interval: f32,
    pub spawn_delay_min: f32,
    pub spawn_delay_max: f32,
    /// Retry delay when the population cap is reached
    pub cap_retry: f32,
    /// Retry delay when the spacing check fails
    pub spacing_retry: f32,
    pub environment_interval: f32,
    /// Chance that an environment toggle turns night mode on
    pub night_probability: f64,
}

impl Default for TaskPacing {
    fn default() -> Self {
        Self {
            signal_interval: 1.0,
            spawn_delay_min: 0.5,
            spawn_delay_max: 2.0,
            cap_retry: 1.0,
            spacing_retry: 0.5,
            environment_interval: 30.0,
            night_probability: 0.3,
        }
    }
}

/// Full configuration of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub timings: SignalTimings,
    pub min_green: u32,
    pub max_green: u32,
    pub population_cap: usize,
    /// Minimum distance a same-direction vehicle must have travelled from the spawn edge
    pub spacing_gap: f32,
    pub will_turn_probability: f64,
    pub emergency_radius: f32,
    /// Vehicles yield to an emergency vehicle this close behind them
    pub yield_distance: f32,
    /// Sideways shift applied when yielding
    pub yield_offset: f32,
    /// Pairs further apart than this skip the overlap test
    pub collision_check_distance: f32,
    pub layout: IntersectionLayout,
    pub pacing: TaskPacing,
    pub tick_rate_hz: f32,
    pub run_budget_secs: f32,
    /// Fail the run on an invariant violation instead of repairing it
    pub strict_invariants: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timings: SignalTimings::default(),
            min_green: MIN_GREEN,
            max_green: MAX_GREEN,
            population_cap: 25,
            spacing_gap: 120.0,
            will_turn_probability: 0.2,
            emergency_radius: 200.0,
            yield_distance: 200.0,
            yield_offset: 20.0,
            collision_check_distance: 50.0,
            layout: IntersectionLayout::default(),
            pacing: TaskPacing::default(),
            tick_rate_hz: 60.0,
            run_budget_secs: 300.0,
            strict_invariants: cfg!(debug_assertions),
        }
    }
}

/// Errors detected by [`SimConfig::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Green duration falls outside the configured bounds
    GreenOutOfBounds { green: u32, min: u32, max: u32 },
    /// The green bounds themselves are inverted or zero
    InvalidGreenBounds { min: u32, max: u32 },
    /// A duration that must be positive is zero, negative, or not finite
    NonPositiveDuration { name: &'static str },
    /// A distance that must be positive is zero, negative, or not finite
    InvalidDistance { name: &'static str, value: f32 },
    /// A probability is outside `[0, 1]`
    InvalidProbability { name: &'static str, value: f64 },
    /// Tick rate is NaN, infinite, zero, or negative
    InvalidTickRate { value: f32 },
    /// The population cap is zero
    ZeroPopulationCap,
    /// Spawn delay range is inverted
    InvalidSpawnDelay { min: f32, max: f32 },
    /// Vehicles would spawn at or beyond the despawn boundary
    InvalidMargins { spawn: f32, despawn: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreenOutOfBounds { green, min, max } => {
                write!(f, "green duration {green}s outside [{min}, {max}]")
            }
            Self::InvalidGreenBounds { min, max } => {
                write!(f, "invalid green bounds [{min}, {max}]")
            }
            Self::NonPositiveDuration { name } => write!(f, "{name} must be positive"),
            Self::InvalidDistance { name, value } => {
                write!(f, "{name} must be a positive distance, got {value}")
            }
            Self::InvalidProbability { name, value } => {
                write!(f, "{name} must lie in [0, 1], got {value}")
            }
            Self::InvalidTickRate { value } => write!(f, "tick rate {value} Hz is not usable"),
            Self::ZeroPopulationCap => f.write_str("population cap must be at least 1"),
            Self::InvalidSpawnDelay { min, max } => {
                write!(f, "spawn delay range [{min}, {max}] is invalid")
            }
            Self::InvalidMargins { spawn, despawn } => {
                write!(f, "spawn margin {spawn} must be below despawn margin {despawn}")
            }
        }
    }
}

impl Error for ConfigError {}

fn positive_secs(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveDuration { name })
    }
}

fn positive_distance(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDistance { name, value })
    }
}

fn non_negative_distance(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDistance { name, value })
    }
}

fn probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

impl SimConfig {
    /// Check every construction-time constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_green == 0 || self.min_green > self.max_green {
            return Err(ConfigError::InvalidGreenBounds {
                min: self.min_green,
                max: self.max_green,
            });
        }
        let green = self.timings.green;
        if green < self.min_green || green > self.max_green {
            return Err(ConfigError::GreenOutOfBounds {
                green,
                min: self.min_green,
                max: self.max_green,
            });
        }
        if self.timings.yellow == 0 {
            return Err(ConfigError::NonPositiveDuration { name: "yellow" });
        }
        if self.timings.red == 0 {
            return Err(ConfigError::NonPositiveDuration { name: "red" });
        }
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidTickRate {
                value: self.tick_rate_hz,
            });
        }
        positive_secs("run budget", self.run_budget_secs)?;
        if self.population_cap == 0 {
            return Err(ConfigError::ZeroPopulationCap);
        }

        positive_distance("spacing gap", self.spacing_gap)?;
        positive_distance("emergency radius", self.emergency_radius)?;
        positive_distance("yield distance", self.yield_distance)?;
        positive_distance("collision check distance", self.collision_check_distance)?;
        positive_distance("turn radius", self.layout.turn_radius)?;
        positive_distance("turn trigger distance", self.layout.turn_trigger_distance)?;
        positive_distance("stop line offset", self.layout.stop_line_offset)?;
        positive_distance("width", self.layout.width)?;
        positive_distance("height", self.layout.height)?;
        non_negative_distance("yield offset", self.yield_offset)?;
        self.layout.validate()?;

        probability("will-turn probability", self.will_turn_probability)?;
        probability("night probability", self.pacing.night_probability)?;

        let pacing = &self.pacing;
        positive_secs("signal interval", pacing.signal_interval)?;
        positive_secs("cap retry", pacing.cap_retry)?;
        positive_secs("spacing retry", pacing.spacing_retry)?;
        positive_secs("environment interval", pacing.environment_interval)?;
        positive_secs("spawn delay", pacing.spawn_delay_min)?;
        if !pacing.spawn_delay_max.is_finite() || pacing.spawn_delay_max < pacing.spawn_delay_min {
            return Err(ConfigError::InvalidSpawnDelay {
                min: pacing.spawn_delay_min,
                max: pacing.spawn_delay_max,
            });
        }

        Ok(())
    }

    /// Nominal duration of one tick in seconds
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate_hz
    }
}
