//! Vehicle admission control
//!
//! A spawn attempt is rejected when the population cap is reached or when the
//! chosen approach is still occupied near its spawn edge. Rejections are not
//! errors; the caller simply retries after [`SpawnOutcome::retry_delay`].

use std::collections::BTreeMap;

use log::debug;
use rand::Rng;

use super::config::{IntersectionLayout, TaskPacing};
use super::types::{Direction, Position, TurnSide, VehicleCategory, VehicleId};
use super::vehicle::SimVehicle;

/// Result of one spawn attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(VehicleId),
    PopulationCapReached,
    SpacingBlocked(Direction),
}

impl SpawnOutcome {
    /// Delay before the next attempt
    pub fn retry_delay<R: Rng>(&self, pacing: &TaskPacing, rng: &mut R) -> f32 {
        match self {
            SpawnOutcome::Spawned(_) => {
                if pacing.spawn_delay_max > pacing.spawn_delay_min {
                    rng.random_range(pacing.spawn_delay_min..pacing.spawn_delay_max)
                } else {
                    pacing.spawn_delay_min
                }
            }
            SpawnOutcome::PopulationCapReached => pacing.cap_retry,
            SpawnOutcome::SpacingBlocked(_) => pacing.spacing_retry,
        }
    }
}

/// Creates vehicles at the spawn edges
#[derive(Debug, Clone)]
pub struct VehicleSpawner {
    population_cap: usize,
    spacing_gap: f32,
    will_turn_probability: f64,
    next_id: usize,
}

impl VehicleSpawner {
    pub fn new(population_cap: usize, spacing_gap: f32, will_turn_probability: f64) -> Self {
        Self {
            population_cap,
            spacing_gap,
            will_turn_probability,
            next_id: 0,
        }
    }

    pub fn population_cap(&self) -> usize {
        self.population_cap
    }

    /// Whether the approach is free near its spawn edge
    pub fn spacing_clear(
        &self,
        vehicles: &BTreeMap<VehicleId, SimVehicle>,
        direction: Direction,
        layout: &IntersectionLayout,
    ) -> bool {
        !vehicles.values().any(|v| {
            v.direction == direction
                && layout.distance_from_spawn(&v.position, direction) < self.spacing_gap
        })
    }

    /// Try to add one random vehicle to `vehicles`.
    pub fn attempt<R: Rng>(
        &mut self,
        vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
        layout: &IntersectionLayout,
        rng: &mut R,
    ) -> SpawnOutcome {
        if vehicles.len() >= self.population_cap {
            return SpawnOutcome::PopulationCapReached;
        }

        let category = VehicleCategory::from_weighted_sample(rng.random_range(0.0..1.0));
        let direction = Direction::from_index(rng.random_range(0..4));
        if !self.spacing_clear(vehicles, direction, layout) {
            return SpawnOutcome::SpacingBlocked(direction);
        }

        let will_turn = rng.random_bool(self.will_turn_probability);
        let turn_side = if rng.random_bool(0.5) {
            TurnSide::Left
        } else {
            TurnSide::Right
        };
        let jitter = rng.random_range(-layout.lane_jitter..=layout.lane_jitter) as f32;
        let position = Self::lane_position(layout, direction, jitter);

        let id = self.allocate_id();
        let vehicle = SimVehicle::new(id, category, direction, position, will_turn, turn_side);
        debug!(
            "Spawned {} heading {} (turning: {})",
            vehicle, direction, will_turn
        );
        vehicles.insert(id, vehicle);
        SpawnOutcome::Spawned(id)
    }

    /// Hand out the next unused vehicle id
    pub fn allocate_id(&mut self) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Spawn point shifted across the lane by `jitter`
    pub fn lane_position(layout: &IntersectionLayout, direction: Direction, jitter: f32) -> Position {
        let spawn = layout.spawn_point(direction);
        if direction.is_vertical() {
            Position::new(spawn.x + jitter, spawn.y)
        } else {
            Position::new(spawn.x, spawn.y + jitter)
        }
    }
}
