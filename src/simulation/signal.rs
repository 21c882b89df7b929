//! Four-direction traffic signal controller
//!
//! A round-robin Green -> Yellow -> Red cycle over North, East, South, West,
//! advanced one step per signal interval. An emergency preemption can redirect
//! the next hand-off and fast-track the current phase.

use std::error::Error;
use std::fmt;

use log::{debug, warn};

use super::config::SignalTimings;
use super::types::Direction;

/// Yellow is cut down to this many steps while a preemption is pending
pub const PREEMPT_YELLOW_CAP: u32 = 2;

/// Colour state of one direction's signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Green,
    Yellow,
    Red,
}

/// The signal facing one approach
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSignal {
    pub direction: Direction,
    pub phase: Phase,
    pub green_remaining: u32,
    pub yellow_remaining: u32,
    pub red: u32,
    /// Signal steps spent green over the whole run
    pub total_green: u32,
}

impl TrafficSignal {
    pub fn new(direction: Direction, timings: &SignalTimings) -> Self {
        Self {
            direction,
            phase: Phase::Red,
            green_remaining: timings.green,
            yellow_remaining: timings.yellow,
            red: timings.red,
            total_green: 0,
        }
    }

    /// Restore the default countdowns
    pub fn rearm(&mut self, timings: &SignalTimings) {
        self.green_remaining = timings.green;
        self.yellow_remaining = timings.yellow;
        self.red = timings.red;
    }
}

/// Broken controller invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// More than one signal is Green or Yellow
    MultipleActive { active: Vec<Direction> },
    /// The direction marked as current is Red
    CurrentNotActive { current: Direction },
    /// A countdown was asked to go below zero
    CountdownUnderflow { direction: Direction, phase: Phase },
    /// A preemption targets the direction already being served at activation
    PreemptTargetIsCurrent { target: Direction },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleActive { active } => {
                write!(f, "multiple signals active at once: {active:?}")
            }
            Self::CurrentNotActive { current } => {
                write!(f, "current green direction {current} is red")
            }
            Self::CountdownUnderflow { direction, phase } => {
                write!(f, "{phase:?} countdown for {direction} went below zero")
            }
            Self::PreemptTargetIsCurrent { target } => {
                write!(f, "preemption target {target} is already green")
            }
        }
    }
}

impl Error for InvariantViolation {}

/// What a single signal step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTransition {
    /// Countdown decremented, phase unchanged
    Counted,
    /// Green held for the preemption target
    Held,
    GreenToYellow(Direction),
    /// Old direction went red, new one turned green
    HandOff { from: Direction, to: Direction },
}

/// Round-robin signal state machine with preemption support
#[derive(Debug, Clone)]
pub struct SignalController {
    signals: [TrafficSignal; 4],
    current: Direction,
    timings: SignalTimings,
    preempt_target: Option<Direction>,
}

impl SignalController {
    /// North starts green with fresh timers; everything else is red.
    pub fn new(timings: SignalTimings) -> Self {
        let mut signals = Direction::ALL.map(|d| TrafficSignal::new(d, &timings));
        signals[Direction::North.index()].phase = Phase::Green;
        Self {
            signals,
            current: Direction::North,
            timings,
            preempt_target: None,
        }
    }

    pub fn timings(&self) -> &SignalTimings {
        &self.timings
    }

    pub fn signal(&self, direction: Direction) -> &TrafficSignal {
        &self.signals[direction.index()]
    }

    pub fn signals(&self) -> &[TrafficSignal; 4] {
        &self.signals
    }

    pub fn phase(&self, direction: Direction) -> Phase {
        self.signal(direction).phase
    }

    pub fn current_green(&self) -> Direction {
        self.current
    }

    pub fn is_yellow(&self) -> bool {
        self.signal(self.current).phase == Phase::Yellow
    }

    pub fn preempt_target(&self) -> Option<Direction> {
        self.preempt_target
    }

    pub fn is_preempted(&self) -> bool {
        self.preempt_target.is_some()
    }

    /// Seconds left in the current phase.
    ///
    /// For red directions this is the round-robin estimate of the wait until
    /// the direction next turns green.
    pub fn seconds_remaining(&self, direction: Direction) -> u32 {
        let signal = self.signal(direction);
        match signal.phase {
            Phase::Green => signal.green_remaining,
            Phase::Yellow => signal.yellow_remaining,
            Phase::Red => {
                let current = self.signal(self.current);
                let mut wait = match current.phase {
                    Phase::Green => current.green_remaining + self.timings.yellow,
                    Phase::Yellow => current.yellow_remaining,
                    Phase::Red => 0,
                };
                let mut d = self.current.next();
                while d != direction {
                    wait += self.timings.green + self.timings.yellow;
                    d = d.next();
                }
                wait
            }
        }
    }

    /// Start a preemption towards `target`.
    ///
    /// The current green is fast-tracked by dropping its countdown to one
    /// step; an in-progress yellow is left to the yellow cap.
    pub fn preempt(&mut self, target: Direction) -> Result<(), InvariantViolation> {
        if target == self.current {
            return Err(InvariantViolation::PreemptTargetIsCurrent { target });
        }
        self.preempt_target = Some(target);
        let current = &mut self.signals[self.current.index()];
        if current.phase == Phase::Green {
            current.green_remaining = 1;
        }
        debug!("Signal preempted: {} -> {}", self.current, target);
        Ok(())
    }

    pub fn release(&mut self) {
        if let Some(target) = self.preempt_target.take() {
            debug!("Signal preemption towards {} released", target);
        }
    }

    /// Advance the current direction by one signal step.
    pub fn step(&mut self) -> Result<SignalTransition, InvariantViolation> {
        let current = self.current;
        let timings = self.timings;
        let preempt = self.preempt_target;
        let signal = &mut self.signals[current.index()];

        match signal.phase {
            Phase::Green => {
                signal.total_green += 1;
                if preempt == Some(current) {
                    signal.rearm(&timings);
                    return Ok(SignalTransition::Held);
                }
                signal.green_remaining = signal.green_remaining.checked_sub(1).ok_or(
                    InvariantViolation::CountdownUnderflow {
                        direction: current,
                        phase: Phase::Green,
                    },
                )?;
                if signal.green_remaining == 0 {
                    signal.phase = Phase::Yellow;
                    signal.yellow_remaining = timings.yellow;
                    debug!("Signal {} green -> yellow", current);
                    return Ok(SignalTransition::GreenToYellow(current));
                }
                Ok(SignalTransition::Counted)
            }
            Phase::Yellow => {
                if preempt.is_some() && signal.yellow_remaining > PREEMPT_YELLOW_CAP {
                    signal.yellow_remaining = PREEMPT_YELLOW_CAP;
                }
                signal.yellow_remaining = signal.yellow_remaining.checked_sub(1).ok_or(
                    InvariantViolation::CountdownUnderflow {
                        direction: current,
                        phase: Phase::Yellow,
                    },
                )?;
                if signal.yellow_remaining > 0 {
                    return Ok(SignalTransition::Counted);
                }

                signal.phase = Phase::Red;
                signal.rearm(&timings);

                let next = preempt.unwrap_or_else(|| current.next());
                let next_signal = &mut self.signals[next.index()];
                next_signal.rearm(&timings);
                next_signal.phase = Phase::Green;
                self.current = next;
                debug!("Signal hand-off {} -> {}", current, next);
                Ok(SignalTransition::HandOff {
                    from: current,
                    to: next,
                })
            }
            Phase::Red => Err(InvariantViolation::CurrentNotActive { current }),
        }
    }

    /// Verify exclusivity: exactly the current direction is Green or Yellow.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let active: Vec<Direction> = self
            .signals
            .iter()
            .filter(|s| s.phase != Phase::Red)
            .map(|s| s.direction)
            .collect();
        if active.len() > 1 {
            return Err(InvariantViolation::MultipleActive { active });
        }
        if self.phase(self.current) == Phase::Red {
            return Err(InvariantViolation::CurrentNotActive {
                current: self.current,
            });
        }
        Ok(())
    }

    /// Clamp the controller back into a safe state after a violation.
    pub fn repair(&mut self) {
        let current = self.current;
        let timings = self.timings;
        for signal in self.signals.iter_mut() {
            if signal.direction != current && signal.phase != Phase::Red {
                warn!("Forcing signal {} to red", signal.direction);
                signal.phase = Phase::Red;
                signal.rearm(&timings);
            }
        }
        let signal = &mut self.signals[current.index()];
        match signal.phase {
            Phase::Red => {
                warn!("Re-arming current signal {} as green", current);
                signal.rearm(&timings);
                signal.phase = Phase::Green;
            }
            Phase::Green if signal.green_remaining == 0 => signal.green_remaining = 1,
            Phase::Yellow if signal.yellow_remaining == 0 => signal.yellow_remaining = 1,
            _ => {}
        }
    }

    #[cfg(test)]
    pub(crate) fn signal_mut(&mut self, direction: Direction) -> &mut TrafficSignal {
        &mut self.signals[direction.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_timings() -> SignalTimings {
        SignalTimings {
            green: 3,
            yellow: 2,
            red: 10,
        }
    }

    /// Step until the current direction changes, returning the new one
    fn run_to_hand_off(controller: &mut SignalController) -> Direction {
        for _ in 0..1000 {
            if let SignalTransition::HandOff { to, .. } = controller.step().unwrap() {
                return to;
            }
        }
        panic!("no hand-off within 1000 steps");
    }

    #[test]
    fn starts_with_north_green() {
        let controller = SignalController::new(SignalTimings::default());
        assert_eq!(controller.current_green(), Direction::North);
        assert_eq!(controller.phase(Direction::North), Phase::Green);
        assert_eq!(controller.phase(Direction::East), Phase::Red);
        assert!(!controller.is_yellow());
        assert_eq!(controller.seconds_remaining(Direction::North), 20);
    }

    #[test]
    fn green_counts_down_to_yellow() {
        let mut controller = SignalController::new(short_timings());
        assert_eq!(controller.step().unwrap(), SignalTransition::Counted);
        assert_eq!(controller.step().unwrap(), SignalTransition::Counted);
        assert_eq!(
            controller.step().unwrap(),
            SignalTransition::GreenToYellow(Direction::North)
        );
        assert!(controller.is_yellow());
        assert_eq!(controller.seconds_remaining(Direction::North), 2);
        assert_eq!(controller.signal(Direction::North).total_green, 3);
    }

    #[test]
    fn yellow_hands_off_to_next_direction() {
        let mut controller = SignalController::new(short_timings());
        let next = run_to_hand_off(&mut controller);
        assert_eq!(next, Direction::East);
        assert_eq!(controller.phase(Direction::North), Phase::Red);
        assert_eq!(controller.phase(Direction::East), Phase::Green);
        // Red direction gets its timers restored
        assert_eq!(controller.signal(Direction::North).green_remaining, 3);
    }

    #[test]
    fn cycle_is_round_robin() {
        let mut controller = SignalController::new(short_timings());
        let order: Vec<Direction> = (0..8).map(|_| run_to_hand_off(&mut controller)).collect();
        assert_eq!(
            order,
            vec![
                Direction::East,
                Direction::South,
                Direction::West,
                Direction::North,
                Direction::East,
                Direction::South,
                Direction::West,
                Direction::North,
            ]
        );
    }

    #[test]
    fn preempt_fast_tracks_green() {
        let mut controller = SignalController::new(SignalTimings::default());
        controller.preempt(Direction::South).unwrap();
        assert_eq!(controller.signal(Direction::North).green_remaining, 1);
        assert_eq!(
            controller.step().unwrap(),
            SignalTransition::GreenToYellow(Direction::North)
        );
        // Yellow capped while the preemption is pending
        assert_eq!(controller.step().unwrap(), SignalTransition::Counted);
        assert_eq!(
            controller.step().unwrap(),
            SignalTransition::HandOff {
                from: Direction::North,
                to: Direction::South
            }
        );
        assert_eq!(controller.current_green(), Direction::South);
        assert_eq!(controller.signal(Direction::South).green_remaining, 20);
    }

    #[test]
    fn preempt_target_held_green_until_release() {
        let mut controller = SignalController::new(short_timings());
        controller.preempt(Direction::West).unwrap();
        assert_eq!(run_to_hand_off(&mut controller), Direction::West);
        for _ in 0..10 {
            assert_eq!(controller.step().unwrap(), SignalTransition::Held);
        }
        controller.release();
        assert_eq!(run_to_hand_off(&mut controller), Direction::North);
    }

    #[test]
    fn preempt_rejects_current_direction() {
        let mut controller = SignalController::new(short_timings());
        assert_eq!(
            controller.preempt(Direction::North),
            Err(InvariantViolation::PreemptTargetIsCurrent {
                target: Direction::North
            })
        );
        assert!(!controller.is_preempted());
    }

    #[test]
    fn red_estimate_follows_cycle() {
        let controller = SignalController::new(short_timings());
        // North green 3 + yellow 2 before East
        assert_eq!(controller.seconds_remaining(Direction::East), 5);
        assert_eq!(controller.seconds_remaining(Direction::South), 10);
        assert_eq!(controller.seconds_remaining(Direction::West), 15);
    }

    #[test]
    fn detects_and_repairs_double_green() {
        let mut controller = SignalController::new(short_timings());
        controller.signal_mut(Direction::East).phase = Phase::Green;
        assert!(matches!(
            controller.check_invariants(),
            Err(InvariantViolation::MultipleActive { .. })
        ));
        controller.repair();
        assert_eq!(controller.check_invariants(), Ok(()));
        assert_eq!(controller.phase(Direction::East), Phase::Red);
    }

    #[test]
    fn detects_underflow() {
        let mut controller = SignalController::new(short_timings());
        controller.signal_mut(Direction::North).green_remaining = 0;
        assert_eq!(
            controller.step(),
            Err(InvariantViolation::CountdownUnderflow {
                direction: Direction::North,
                phase: Phase::Green
            })
        );
        controller.repair();
        assert!(controller.step().is_ok());
    }
}
