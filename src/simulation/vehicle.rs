//! Vehicle movement logic for the intersection simulation
//!
//! Speeds are in units per tick and accelerations in units per tick squared.
//! Each call to [`SimVehicle::update`] is one tick of motion.

use std::fmt;

use super::config::IntersectionLayout;
use super::types::{Direction, Position, TurnSide, VehicleCategory, VehicleId};

/// Deceleration multiplier used when braking for a stop line
pub const BRAKE_FACTOR: f32 = 3.0;
/// Deceleration multiplier used when yielding to an emergency vehicle
pub const YIELD_FACTOR: f32 = 2.0;
/// Turn sweep in degrees before the new direction is committed
pub const TURN_SWEEP_DEGREES: f32 = 90.0;

/// Result of a vehicle update indicating what should happen to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    Continue,
    /// Vehicle left the simulated area
    Despawn,
}

/// The part of the signal state a vehicle reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalState {
    pub current_green: Direction,
    pub yellow: bool,
}

/// Circular arc followed during a turn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnArc {
    pub center: Position,
    /// Vector from the centre to the vehicle when the turn began
    pub start_radial: Position,
    /// Accumulated sweep in degrees
    pub progress: f32,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    /// Strict overlap; boxes that only touch do not collide
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

/// A vehicle in the intersection simulation
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub category: VehicleCategory,
    pub direction: Direction,
    pub position: Position,
    /// Unit vector of the current heading
    pub heading: Position,
    pub speed: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub is_emergency: bool,
    /// Passed the stop line while permitted, i.e. inside the intersection
    pub crossed: bool,
    pub will_turn: bool,
    pub turn_side: TurnSide,
    pub turn: Option<TurnArc>,
    /// Already moved aside for an emergency vehicle
    pub yielding: bool,
    length: f32,
    width: f32,
}

impl SimVehicle {
    pub fn new(
        id: VehicleId,
        category: VehicleCategory,
        direction: Direction,
        position: Position,
        will_turn: bool,
        turn_side: TurnSide,
    ) -> Self {
        let spec = category.spec();
        Self {
            id,
            category,
            direction,
            position,
            heading: direction.heading(),
            speed: 0.0,
            max_speed: spec.max_speed,
            acceleration: spec.acceleration,
            is_emergency: spec.is_emergency,
            crossed: false,
            will_turn,
            turn_side,
            turn: None,
            yielding: false,
            length: spec.length,
            width: spec.width,
        }
    }

    pub fn is_turning(&self) -> bool {
        self.turn.is_some()
    }

    pub fn heading_degrees(&self) -> f32 {
        self.heading.heading_degrees()
    }

    /// Distance needed to stop from the current speed at twice the acceleration
    pub fn stopping_distance(&self) -> f32 {
        self.speed * self.speed / (2.0 * self.acceleration * 2.0)
    }

    /// Whether the signal requires this vehicle to stop before the line
    pub fn must_stop(&self, signal: SignalState, layout: &IntersectionLayout) -> bool {
        if self.is_emergency {
            return false;
        }
        if self.direction != signal.current_green {
            return true;
        }
        if !signal.yellow {
            return false;
        }
        // Stop on yellow only while there is still room to do so comfortably
        layout.distance_to_center(&self.position, self.direction) > self.stopping_distance()
    }

    /// Advance one tick of speed and position.
    pub fn update(&mut self, signal: SignalState, layout: &IntersectionLayout) -> VehicleUpdateResult {
        let should_stop = self.must_stop(signal, layout);

        if should_stop && !self.crossed {
            self.approach_stop_line(layout);
        } else {
            self.speed = (self.speed + self.acceleration).clamp(0.0, self.max_speed);
            self.move_vehicle(layout);
        }

        if layout.is_out_of_bounds(&self.position) {
            VehicleUpdateResult::Despawn
        } else {
            VehicleUpdateResult::Continue
        }
    }

    /// Brake or creep towards the stop line without ever passing it.
    fn approach_stop_line(&mut self, layout: &IntersectionLayout) {
        let to_line = layout.distance_to_stop_line(&self.position, self.direction);
        if to_line < 0.0 {
            // Already inside the box: halt for this tick, then clear it
            self.speed = 0.0;
            self.crossed = true;
            return;
        }
        if to_line == 0.0 {
            self.speed = 0.0;
            return;
        }

        let braking_rate = self.acceleration * BRAKE_FACTOR;
        let braking_distance = self.speed * self.speed / (2.0 * braking_rate);
        if to_line < braking_distance {
            // Never drop below the speed that still reaches the line
            let envelope = (2.0 * braking_rate * to_line).sqrt();
            self.speed = (self.speed - braking_rate).max(envelope);
        } else {
            self.speed = (self.speed + self.acceleration).min(self.max_speed);
        }

        if self.speed >= to_line {
            self.snap_to_stop_line(layout);
            self.speed = 0.0;
        } else {
            self.position = self.position.add(&self.heading.scale(self.speed));
        }
    }

    fn snap_to_stop_line(&mut self, layout: &IntersectionLayout) {
        let center = layout.center();
        let h = self.direction.heading();
        if self.direction.is_vertical() {
            self.position.y = center.y - h.y * layout.stop_line_offset;
        } else {
            self.position.x = center.x - h.x * layout.stop_line_offset;
        }
    }

    fn move_vehicle(&mut self, layout: &IntersectionLayout) {
        if self.turn.is_some() {
            self.execute_turn();
            return;
        }

        self.position = self.position.add(&self.heading.scale(self.speed));

        if !self.crossed && layout.distance_to_stop_line(&self.position, self.direction) < 0.0 {
            self.crossed = true;
        }

        if self.will_turn
            && self.crossed
            && layout.distance_to_center(&self.position, self.direction).abs()
                < layout.turn_trigger_distance
        {
            self.start_turn(layout.turn_radius);
        }
    }

    /// Begin a quarter-circle turn from the current position.
    ///
    /// The arc centre sits `radius` units to the turning side of the vehicle
    /// as it is now, not at a fixed point of the intersection, so the path
    /// joins the straight approach without a jump. Where the turn ends up
    /// therefore follows where it started, lane jitter included.
    pub fn start_turn(&mut self, radius: f32) {
        let normal = self.direction.normal(self.turn_side);
        let center = self.position.add(&normal.scale(radius));
        self.turn = Some(TurnArc {
            center,
            start_radial: self.position.sub(&center),
            progress: 0.0,
        });
    }

    fn execute_turn(&mut self) {
        let Some(mut arc) = self.turn else {
            return;
        };
        arc.progress = (arc.progress + self.speed / 2.0).min(TURN_SWEEP_DEGREES);

        // Screen y points down, so a left turn is a negative rotation
        let sign = match self.turn_side {
            TurnSide::Left => -1.0,
            TurnSide::Right => 1.0,
        };
        let angle = (arc.progress * sign).to_radians();
        self.position = arc.center.add(&arc.start_radial.rotated(angle));
        self.heading = self.direction.heading().rotated(angle);

        if arc.progress >= TURN_SWEEP_DEGREES {
            self.direction = self.direction.turned(self.turn_side);
            self.heading = self.direction.heading();
            self.turn = None;
            self.will_turn = false;
        } else {
            self.turn = Some(arc);
        }
    }

    /// Slow down for an emergency vehicle, moving aside once per episode.
    pub fn yield_to_emergency(&mut self, offset: f32, layout: &IntersectionLayout) {
        self.speed = (self.speed - self.acceleration * YIELD_FACTOR).max(0.0);
        if self.yielding || self.turn.is_some() {
            return;
        }
        self.yielding = true;
        let center = layout.center();
        if self.direction.is_vertical() {
            self.position.x += if self.position.x < center.x { -offset } else { offset };
        } else {
            self.position.y += if self.position.y < center.y { -offset } else { offset };
        }
    }

    /// Bounding box oriented to the nearest axis of travel
    pub fn bounds(&self) -> Bounds {
        let along_x = self.heading.x.abs() >= self.heading.y.abs();
        let (half_x, half_y) = if along_x {
            (self.length / 2.0, self.width / 2.0)
        } else {
            (self.width / 2.0, self.length / 2.0)
        };
        Bounds {
            min: Position::new(self.position.x - half_x, self.position.y - half_y),
            max: Position::new(self.position.x + half_x, self.position.y + half_y),
        }
    }
}

impl fmt::Display for SimVehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.category, self.id.0)
    }
}
