//! Pairwise overlap resolution
//!
//! Overlapping vehicles are stopped. When exactly one of the pair is an
//! emergency vehicle it is let through at half its maximum speed.

use std::collections::BTreeMap;

use log::debug;

use super::types::VehicleId;
use super::vehicle::SimVehicle;

#[derive(Debug, Clone)]
pub struct CollisionGuard {
    /// Pairs further apart than this are skipped
    check_distance: f32,
}

impl CollisionGuard {
    pub fn new(check_distance: f32) -> Self {
        Self { check_distance }
    }

    /// Pairs (lower id first) that are close and overlapping
    pub fn find_overlaps(&self, vehicles: &BTreeMap<VehicleId, SimVehicle>) -> Vec<(VehicleId, VehicleId)> {
        let all: Vec<&SimVehicle> = vehicles.values().collect();
        let mut pairs = Vec::new();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if a.position.distance(&b.position) > self.check_distance {
                    continue;
                }
                if a.bounds().overlaps(&b.bounds()) {
                    pairs.push((a.id, b.id));
                }
            }
        }
        pairs
    }

    /// Resolve every overlap, returning how many pairs were found.
    pub fn resolve(&self, vehicles: &mut BTreeMap<VehicleId, SimVehicle>) -> usize {
        let pairs = self.find_overlaps(vehicles);
        for (a, b) in &pairs {
            let a_emergency = vehicles.get(a).is_some_and(|v| v.is_emergency);
            let b_emergency = vehicles.get(b).is_some_and(|v| v.is_emergency);
            for (id, emergency, other_emergency) in
                [(a, a_emergency, b_emergency), (b, b_emergency, a_emergency)]
            {
                if let Some(vehicle) = vehicles.get_mut(id) {
                    vehicle.speed = if emergency && !other_emergency {
                        vehicle.max_speed / 2.0
                    } else {
                        0.0
                    };
                }
            }
            debug!("Overlap between vehicles {} and {}", a.0, b.0);
        }
        pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{Direction, Position, TurnSide, VehicleCategory};

    fn at(id: usize, category: VehicleCategory, x: f32, y: f32) -> SimVehicle {
        let mut v = SimVehicle::new(
            VehicleId(id),
            category,
            Direction::East,
            Position::new(x, y),
            false,
            TurnSide::Left,
        );
        v.speed = 1.5;
        v
    }

    fn fleet(vehicles: Vec<SimVehicle>) -> BTreeMap<VehicleId, SimVehicle> {
        vehicles.into_iter().map(|v| (v.id, v)).collect()
    }

    #[test]
    fn overlapping_pair_stops() {
        let guard = CollisionGuard::new(50.0);
        let mut vehicles = fleet(vec![
            at(1, VehicleCategory::Sedan, 100.0, 100.0),
            at(2, VehicleCategory::Suv, 130.0, 105.0),
        ]);
        assert_eq!(guard.resolve(&mut vehicles), 1);
        assert_eq!(vehicles[&VehicleId(1)].speed, 0.0);
        assert_eq!(vehicles[&VehicleId(2)].speed, 0.0);
    }

    #[test]
    fn emergency_passes_through() {
        let guard = CollisionGuard::new(50.0);
        let mut vehicles = fleet(vec![
            at(1, VehicleCategory::Sedan, 100.0, 100.0),
            at(2, VehicleCategory::Ambulance, 120.0, 100.0),
        ]);
        guard.resolve(&mut vehicles);
        assert_eq!(vehicles[&VehicleId(1)].speed, 0.0);
        assert_eq!(vehicles[&VehicleId(2)].speed, 1.75);
    }

    #[test]
    fn two_emergencies_both_stop() {
        let guard = CollisionGuard::new(50.0);
        let mut vehicles = fleet(vec![
            at(1, VehicleCategory::Police, 100.0, 100.0),
            at(2, VehicleCategory::Ambulance, 120.0, 100.0),
        ]);
        guard.resolve(&mut vehicles);
        assert_eq!(vehicles[&VehicleId(1)].speed, 0.0);
        assert_eq!(vehicles[&VehicleId(2)].speed, 0.0);
    }

    #[test]
    fn distant_or_touching_pairs_ignored() {
        let guard = CollisionGuard::new(50.0);
        let mut vehicles = fleet(vec![
            at(1, VehicleCategory::Sedan, 100.0, 100.0),
            // Sedans are 40 long: exactly touching
            at(2, VehicleCategory::Sedan, 140.0, 100.0),
            at(3, VehicleCategory::Bus, 300.0, 100.0),
        ]);
        assert_eq!(guard.resolve(&mut vehicles), 0);
        assert!(vehicles.values().all(|v| v.speed == 1.5));
    }

    #[test]
    fn check_distance_skips_large_overlaps() {
        // Two buses overlap at 52 apart but the pair is beyond the check distance
        let guard = CollisionGuard::new(50.0);
        let vehicles = fleet(vec![
            at(1, VehicleCategory::Bus, 100.0, 100.0),
            at(2, VehicleCategory::Bus, 152.0, 100.0),
        ]);
        assert!(guard.find_overlaps(&vehicles).is_empty());
    }
}
