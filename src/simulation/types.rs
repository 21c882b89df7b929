//! Core types for the intersection simulation
//!
//! Directions, vehicle categories and plane geometry. The plane uses screen
//! conventions: x grows to the right and y grows downwards.

use std::fmt;

/// A unique identifier for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub usize);

/// Direction of travel on one of the four approaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Round-robin order of the signal cycle
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }

    pub fn from_index(index: usize) -> Direction {
        Self::ALL[index % 4]
    }

    /// The next direction in the signal cycle
    pub fn next(self) -> Direction {
        Self::from_index(self.index() + 1)
    }

    /// Direction after a 90 degree turn.
    ///
    /// Left turns walk N -> W -> S -> E -> N, right turns the reverse.
    pub fn turned(self, side: TurnSide) -> Direction {
        match side {
            TurnSide::Left => Self::from_index(self.index() + 3),
            TurnSide::Right => Self::from_index(self.index() + 1),
        }
    }

    /// Unit vector of travel (y points down the screen)
    pub fn heading(self) -> Position {
        match self {
            Direction::North => Position::new(0.0, -1.0),
            Direction::East => Position::new(1.0, 0.0),
            Direction::South => Position::new(0.0, 1.0),
            Direction::West => Position::new(-1.0, 0.0),
        }
    }

    /// Unit normal pointing to the given side of the direction of travel
    pub fn normal(self, side: TurnSide) -> Position {
        let h = self.heading();
        match side {
            TurnSide::Left => Position::new(h.y, -h.x),
            TurnSide::Right => Position::new(-h.y, h.x),
        }
    }

    /// True for the north/south axis
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "North",
            Direction::East => "East",
            Direction::South => "South",
            Direction::West => "West",
        };
        f.write_str(name)
    }
}

/// Side chosen for a turn at the intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSide {
    Left,
    Right,
}

/// Fixed physical properties of a vehicle category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategorySpec {
    pub name: &'static str,
    /// Length along the direction of travel
    pub length: f32,
    /// Width across the direction of travel
    pub width: f32,
    /// Maximum speed in units per tick
    pub max_speed: f32,
    /// Acceleration in units per tick squared
    pub acceleration: f32,
    pub is_emergency: bool,
    /// Relative spawn frequency
    pub spawn_weight: f64,
}

/// The eight kinds of vehicle that can enter the intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleCategory {
    Sedan,
    Suv,
    Truck,
    Motorbike,
    Bus,
    Ambulance,
    Police,
    Taxi,
}

/// Property table indexed by [`VehicleCategory::table_index`]
const CATEGORY_TABLE: [CategorySpec; 8] = [
    CategorySpec {
        name: "Sedan",
        length: 40.0,
        width: 20.0,
        max_speed: 2.5,
        acceleration: 0.2,
        is_emergency: false,
        spawn_weight: 0.25,
    },
    CategorySpec {
        name: "SUV",
        length: 45.0,
        width: 22.0,
        max_speed: 2.3,
        acceleration: 0.18,
        is_emergency: false,
        spawn_weight: 0.2,
    },
    CategorySpec {
        name: "Truck",
        length: 50.0,
        width: 25.0,
        max_speed: 2.0,
        acceleration: 0.15,
        is_emergency: false,
        spawn_weight: 0.15,
    },
    CategorySpec {
        name: "Motorbike",
        length: 30.0,
        width: 15.0,
        max_speed: 3.0,
        acceleration: 0.25,
        is_emergency: false,
        spawn_weight: 0.15,
    },
    CategorySpec {
        name: "Bus",
        length: 55.0,
        width: 30.0,
        max_speed: 1.8,
        acceleration: 0.12,
        is_emergency: false,
        spawn_weight: 0.1,
    },
    CategorySpec {
        name: "Ambulance",
        length: 45.0,
        width: 25.0,
        max_speed: 3.5,
        acceleration: 0.3,
        is_emergency: true,
        spawn_weight: 0.05,
    },
    CategorySpec {
        name: "Police",
        length: 45.0,
        width: 25.0,
        max_speed: 3.2,
        acceleration: 0.28,
        is_emergency: true,
        spawn_weight: 0.05,
    },
    CategorySpec {
        name: "Taxi",
        length: 40.0,
        width: 20.0,
        max_speed: 2.7,
        acceleration: 0.22,
        is_emergency: false,
        spawn_weight: 0.05,
    },
];

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 8] = [
        VehicleCategory::Sedan,
        VehicleCategory::Suv,
        VehicleCategory::Truck,
        VehicleCategory::Motorbike,
        VehicleCategory::Bus,
        VehicleCategory::Ambulance,
        VehicleCategory::Police,
        VehicleCategory::Taxi,
    ];

    fn table_index(self) -> usize {
        match self {
            VehicleCategory::Sedan => 0,
            VehicleCategory::Suv => 1,
            VehicleCategory::Truck => 2,
            VehicleCategory::Motorbike => 3,
            VehicleCategory::Bus => 4,
            VehicleCategory::Ambulance => 5,
            VehicleCategory::Police => 6,
            VehicleCategory::Taxi => 7,
        }
    }

    pub fn spec(self) -> &'static CategorySpec {
        &CATEGORY_TABLE[self.table_index()]
    }

    /// Pick a category from a uniform sample in `[0, 1)` using the spawn weights
    pub fn from_weighted_sample(sample: f64) -> VehicleCategory {
        let mut cumulative = 0.0;
        for category in Self::ALL {
            cumulative += category.spec().spawn_weight;
            if sample < cumulative {
                return category;
            }
        }
        // Rounding in the cumulative sum can leave a sliver at the top
        VehicleCategory::Taxi
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

/// A 2D position (or vector) on the simulation plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn add(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(&self, factor: f32) -> Position {
        Position::new(self.x * factor, self.y * factor)
    }

    /// Rotate by `radians` in screen space
    pub fn rotated(&self, radians: f32) -> Position {
        let (sin, cos) = radians.sin_cos();
        Position::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Screen heading of this vector in degrees, 0 pointing north, clockwise positive
    pub fn heading_degrees(&self) -> f32 {
        self.x.atan2(-self.y).to_degrees().rem_euclid(360.0)
    }
}
