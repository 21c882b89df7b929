//! Emergency vehicle detection and signal preemption
//!
//! Every tick the manager looks for an emergency vehicle approaching the
//! centre. The nearest one wins; if its approach is red and no preemption is
//! running, the signal controller is preempted towards it. The preemption is
//! released as soon as no emergency vehicle is approaching.

use std::collections::BTreeMap;

use log::{info, warn};
use ordered_float::OrderedFloat;

use super::config::IntersectionLayout;
use super::signal::SignalController;
use super::types::{Direction, VehicleId};
use super::vehicle::SimVehicle;

/// Audio collaborator notified when the siren should start or stop
pub trait SirenCue: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Siren that makes no sound
#[derive(Debug, Default)]
pub struct SilentSiren;

impl SirenCue for SilentSiren {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// Outcome of one detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideEvent {
    None,
    Activated {
        target: Direction,
        vehicle: VehicleId,
    },
    Released,
}

/// An emergency vehicle inside the detection radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Approach {
    pub vehicle: VehicleId,
    pub direction: Direction,
    pub distance: f32,
}

pub struct EmergencyOverrideManager {
    detection_radius: f32,
    siren: Box<dyn SirenCue>,
    siren_playing: bool,
    sound_enabled: bool,
}

impl EmergencyOverrideManager {
    pub fn new(detection_radius: f32) -> Self {
        Self::with_siren(detection_radius, Box::new(SilentSiren))
    }

    pub fn with_siren(detection_radius: f32, siren: Box<dyn SirenCue>) -> Self {
        Self {
            detection_radius,
            siren,
            siren_playing: false,
            sound_enabled: true,
        }
    }

    pub fn set_siren(&mut self, siren: Box<dyn SirenCue>) {
        self.stop_siren();
        self.siren = siren;
    }

    pub fn siren_playing(&self) -> bool {
        self.siren_playing
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn set_sound(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
        if !enabled {
            self.stop_siren();
        }
    }

    /// Nearest approaching emergency vehicle; ties go to the lowest id.
    pub fn nearest_approach(
        &self,
        vehicles: &BTreeMap<VehicleId, SimVehicle>,
        layout: &IntersectionLayout,
    ) -> Option<Approach> {
        vehicles
            .values()
            .filter(|v| v.is_emergency)
            .map(|v| Approach {
                vehicle: v.id,
                direction: v.direction,
                distance: layout.distance_to_center(&v.position, v.direction),
            })
            .filter(|a| a.distance > 0.0 && a.distance < self.detection_radius)
            .min_by_key(|a| OrderedFloat(a.distance))
    }

    /// Run one detection pass and update the controller's preemption.
    pub fn evaluate(
        &mut self,
        vehicles: &BTreeMap<VehicleId, SimVehicle>,
        layout: &IntersectionLayout,
        signals: &mut SignalController,
    ) -> OverrideEvent {
        let Some(approach) = self.nearest_approach(vehicles, layout) else {
            self.stop_siren();
            if signals.is_preempted() {
                signals.release();
                info!("Emergency override released");
                return OverrideEvent::Released;
            }
            return OverrideEvent::None;
        };

        if self.sound_enabled && !self.siren_playing {
            self.siren.start();
            self.siren_playing = true;
        }

        if approach.direction == signals.current_green() || signals.is_preempted() {
            return OverrideEvent::None;
        }

        match signals.preempt(approach.direction) {
            Ok(()) => {
                info!(
                    "Emergency override: vehicle {} approaching from {} at {:.1}",
                    approach.vehicle.0, approach.direction, approach.distance
                );
                OverrideEvent::Activated {
                    target: approach.direction,
                    vehicle: approach.vehicle,
                }
            }
            Err(e) => {
                warn!("Emergency override rejected: {}", e);
                OverrideEvent::None
            }
        }
    }

    fn stop_siren(&mut self) {
        if self.siren_playing {
            self.siren.stop();
            self.siren_playing = false;
        }
    }
}

impl std::fmt::Debug for EmergencyOverrideManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyOverrideManager")
            .field("detection_radius", &self.detection_radius)
            .field("siren_playing", &self.siren_playing)
            .field("sound_enabled", &self.sound_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::SignalTimings;
    use crate::simulation::types::{TurnSide, VehicleCategory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct CountingSiren {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl SirenCue for CountingSiren {
        fn start(&mut self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Vehicle `distance` units from the centre along its approach
    fn approaching(
        id: usize,
        category: VehicleCategory,
        direction: Direction,
        distance: f32,
    ) -> SimVehicle {
        let position = IntersectionLayout::default().approach_point(direction, distance);
        SimVehicle::new(VehicleId(id), category, direction, position, false, TurnSide::Left)
    }

    fn fleet(vehicles: Vec<SimVehicle>) -> BTreeMap<VehicleId, SimVehicle> {
        vehicles.into_iter().map(|v| (v.id, v)).collect()
    }

    #[test]
    fn activates_for_red_approach() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let mut manager = EmergencyOverrideManager::new(200.0);
        let vehicles = fleet(vec![approaching(
            7,
            VehicleCategory::Ambulance,
            Direction::East,
            150.0,
        )]);

        let event = manager.evaluate(&vehicles, &layout, &mut signals);
        assert_eq!(
            event,
            OverrideEvent::Activated {
                target: Direction::East,
                vehicle: VehicleId(7)
            }
        );
        assert_eq!(signals.preempt_target(), Some(Direction::East));
        assert_eq!(signals.signal(Direction::North).green_remaining, 1);
        assert!(manager.siren_playing());
    }

    #[test]
    fn no_override_when_already_green() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let mut manager = EmergencyOverrideManager::new(200.0);
        let vehicles = fleet(vec![approaching(
            1,
            VehicleCategory::Police,
            Direction::North,
            100.0,
        )]);
        assert_eq!(
            manager.evaluate(&vehicles, &layout, &mut signals),
            OverrideEvent::None
        );
        assert!(!signals.is_preempted());
    }

    #[test]
    fn ignores_vehicles_outside_radius_or_past_centre() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let mut manager = EmergencyOverrideManager::new(200.0);
        let vehicles = fleet(vec![
            approaching(1, VehicleCategory::Ambulance, Direction::East, 250.0),
            approaching(2, VehicleCategory::Ambulance, Direction::West, -20.0),
            approaching(3, VehicleCategory::Sedan, Direction::South, 50.0),
        ]);
        assert_eq!(
            manager.evaluate(&vehicles, &layout, &mut signals),
            OverrideEvent::None
        );
        assert!(!manager.siren_playing());
    }

    #[test]
    fn nearest_emergency_wins() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let mut manager = EmergencyOverrideManager::new(200.0);
        let vehicles = fleet(vec![
            approaching(1, VehicleCategory::Ambulance, Direction::East, 180.0),
            approaching(2, VehicleCategory::Police, Direction::West, 90.0),
            approaching(3, VehicleCategory::Ambulance, Direction::South, 120.0),
        ]);
        manager.evaluate(&vehicles, &layout, &mut signals);
        assert_eq!(signals.preempt_target(), Some(Direction::West));
    }

    #[test]
    fn equal_distance_goes_to_lowest_id() {
        let layout = IntersectionLayout::default();
        let manager = EmergencyOverrideManager::new(200.0);
        let vehicles = fleet(vec![
            approaching(9, VehicleCategory::Ambulance, Direction::East, 100.0),
            approaching(4, VehicleCategory::Police, Direction::South, 100.0),
        ]);
        let approach = manager.nearest_approach(&vehicles, &layout).unwrap();
        assert_eq!(approach.vehicle, VehicleId(4));
    }

    #[test]
    fn releases_when_no_emergency_remains() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let siren = CountingSiren::default();
        let mut manager = EmergencyOverrideManager::with_siren(200.0, Box::new(siren.clone()));
        let vehicles = fleet(vec![approaching(
            1,
            VehicleCategory::Ambulance,
            Direction::South,
            150.0,
        )]);
        manager.evaluate(&vehicles, &layout, &mut signals);
        assert!(signals.is_preempted());

        let event = manager.evaluate(&BTreeMap::new(), &layout, &mut signals);
        assert_eq!(event, OverrideEvent::Released);
        assert!(!signals.is_preempted());
        assert_eq!(siren.starts.load(Ordering::SeqCst), 1);
        assert_eq!(siren.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_emergency_does_not_retarget() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let mut manager = EmergencyOverrideManager::new(200.0);
        let first = fleet(vec![approaching(
            1,
            VehicleCategory::Ambulance,
            Direction::East,
            150.0,
        )]);
        manager.evaluate(&first, &layout, &mut signals);

        let closer = fleet(vec![
            approaching(1, VehicleCategory::Ambulance, Direction::East, 140.0),
            approaching(2, VehicleCategory::Police, Direction::West, 20.0),
        ]);
        assert_eq!(
            manager.evaluate(&closer, &layout, &mut signals),
            OverrideEvent::None
        );
        assert_eq!(signals.preempt_target(), Some(Direction::East));
    }

    #[test]
    fn muted_sound_never_starts_siren() {
        let layout = IntersectionLayout::default();
        let mut signals = SignalController::new(SignalTimings::default());
        let siren = CountingSiren::default();
        let mut manager = EmergencyOverrideManager::with_siren(200.0, Box::new(siren.clone()));
        manager.set_sound(false);
        let vehicles = fleet(vec![approaching(
            1,
            VehicleCategory::Ambulance,
            Direction::East,
            100.0,
        )]);
        manager.evaluate(&vehicles, &layout, &mut signals);
        assert!(signals.is_preempted());
        assert!(!manager.siren_playing());
        assert_eq!(siren.starts.load(Ordering::SeqCst), 0);
    }
}
