//! Simulation time keeping
//!
//! [`SimulationClock`] counts ticks and elapsed time against the run budget.
//! [`StepTimer`] paces the periodic tasks (signal steps, spawning, environment)
//! in simulated time so that a headless run is reproducible from its seed.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    tick_rate_hz: f32,
    run_budget: f32,
    elapsed: f32,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(tick_rate_hz: f32, run_budget: f32) -> Self {
        Self {
            tick_rate_hz,
            run_budget,
            elapsed: 0.0,
            ticks: 0,
        }
    }

    /// Nominal tick length in seconds
    pub fn fixed_delta(&self) -> f32 {
        1.0 / self.tick_rate_hz
    }

    /// Wall-clock duration of one frame at the nominal rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f32(self.fixed_delta())
    }

    pub fn advance(&mut self, delta: f32) {
        self.elapsed += delta.max(0.0);
        self.ticks += 1;
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn run_budget(&self) -> f32 {
        self.run_budget
    }

    pub fn budget_exhausted(&self) -> bool {
        self.elapsed >= self.run_budget
    }
}

/// Countdown that fires once per period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTimer {
    remaining: f32,
}

impl StepTimer {
    pub fn new(first_delay: f32) -> Self {
        Self {
            remaining: first_delay,
        }
    }

    pub fn rearm(&mut self, delay: f32) {
        self.remaining = delay;
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Count down by `delta`; true when the timer expires.
    ///
    /// An expired timer keeps firing until it is re-armed.
    pub fn tick(&mut self, delta: f32) -> bool {
        self.remaining -= delta;
        self.remaining <= 0.0
    }
}

/// Timers for the three periodic tasks
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSchedule {
    pub signal: StepTimer,
    pub spawn: StepTimer,
    pub environment: StepTimer,
}

impl TaskSchedule {
    pub fn new(signal_interval: f32, environment_interval: f32) -> Self {
        Self {
            signal: StepTimer::new(signal_interval),
            // First vehicle appears on the first tick
            spawn: StepTimer::new(0.0),
            environment: StepTimer::new(environment_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_counts_ticks_and_budget() {
        let mut clock = SimulationClock::new(60.0, 1.0);
        assert!((clock.fixed_delta() - 1.0 / 60.0).abs() < 1e-7);
        for _ in 0..59 {
            clock.advance(clock.fixed_delta());
        }
        assert_eq!(clock.ticks(), 59);
        assert!(!clock.budget_exhausted());
        clock.advance(0.5);
        assert!(clock.budget_exhausted());
    }

    #[test]
    fn negative_delta_does_not_rewind() {
        let mut clock = SimulationClock::new(60.0, 10.0);
        clock.advance(-3.0);
        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(clock.ticks(), 1);
    }

    #[test]
    fn timer_fires_after_period() {
        let mut timer = StepTimer::new(1.0);
        assert!(!timer.tick(0.4));
        assert!(!timer.tick(0.4));
        assert!(timer.tick(0.4));
        timer.rearm(1.0);
        assert!(!timer.tick(0.1));
    }

    #[test]
    fn frame_duration_matches_rate() {
        let clock = SimulationClock::new(50.0, 1.0);
        let frame = clock.frame_duration().as_secs_f64();
        assert!((frame - 0.02).abs() < 1e-6);
    }
}
