//! Read-only copies of the world for renderers and reporting

use super::signal::{Phase, SignalController};
use super::types::{Direction, Position, VehicleCategory, VehicleId};
use super::vehicle::SimVehicle;

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub category: VehicleCategory,
    pub direction: Direction,
    pub position: Position,
    /// Compass heading, 0 = up the screen, clockwise
    pub heading_deg: f32,
    pub speed: f32,
    pub is_emergency: bool,
    pub is_turning: bool,
}

impl From<&SimVehicle> for VehicleSnapshot {
    fn from(vehicle: &SimVehicle) -> Self {
        Self {
            id: vehicle.id,
            category: vehicle.category,
            direction: vehicle.direction,
            position: vehicle.position,
            heading_deg: vehicle.heading_degrees(),
            speed: vehicle.speed,
            is_emergency: vehicle.is_emergency,
            is_turning: vehicle.is_turning(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub direction: Direction,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub total_green: u32,
}

impl SignalSnapshot {
    pub fn capture_all(controller: &SignalController) -> [SignalSnapshot; 4] {
        Direction::ALL.map(|direction| SignalSnapshot {
            direction,
            phase: controller.phase(direction),
            seconds_remaining: controller.seconds_remaining(direction),
            total_green: controller.signal(direction).total_green,
        })
    }
}

/// Consistent view of the world taken between ticks
#[derive(Debug, Clone, PartialEq)]
pub struct SimSnapshot {
    /// Ordered by vehicle id
    pub vehicles: Vec<VehicleSnapshot>,
    pub signals: [SignalSnapshot; 4],
    pub override_active: bool,
    pub override_target: Option<Direction>,
    pub elapsed: f32,
    pub tick: u64,
    pub night_mode: bool,
    pub sound_enabled: bool,
    pub siren_playing: bool,
}

impl SimSnapshot {
    pub fn signal(&self, direction: Direction) -> &SignalSnapshot {
        &self.signals[direction.index()]
    }

    /// Directions currently showing Green or Yellow
    pub fn active_directions(&self) -> Vec<Direction> {
        self.signals
            .iter()
            .filter(|s| s.phase != Phase::Red)
            .map(|s| s.direction)
            .collect()
    }

    pub fn emergency_count(&self) -> usize {
        self.vehicles.iter().filter(|v| v.is_emergency).count()
    }
}
