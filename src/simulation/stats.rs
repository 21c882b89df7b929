//! Run statistics

use log::info;

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub vehicles_spawned: u32,
    /// Vehicles that drove out of the area
    pub vehicles_exited: u32,
    pub rejected_cap: u32,
    pub rejected_spacing: u32,
    pub overrides_triggered: u32,
    /// Overlapping pairs resolved by the collision guard
    pub collisions: u32,
    pub invariant_repairs: u32,
}

impl SimStats {
    /// Share of spawned vehicles that have left the area, in percent
    pub fn throughput_rate(&self) -> f32 {
        if self.vehicles_spawned > 0 {
            (self.vehicles_exited as f32 / self.vehicles_spawned as f32) * 100.0
        } else {
            0.0
        }
    }

    pub fn log_completion(&self, elapsed: f32, active: usize, total_green: [u32; 4]) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", elapsed);
        info!("Total vehicles spawned: {}", self.vehicles_spawned);
        info!("Total vehicles exited: {}", self.vehicles_exited);
        info!("Active vehicles: {}", active);
        info!(
            "Spawn rejections: {} at capacity, {} for spacing",
            self.rejected_cap, self.rejected_spacing
        );
        info!("Emergency overrides: {}", self.overrides_triggered);
        info!("Collisions resolved: {}", self.collisions);
        info!("Invariant repairs: {}", self.invariant_repairs);
        info!(
            "Green steps N/E/S/W: {}/{}/{}/{}",
            total_green[0], total_green[1], total_green[2], total_green[3]
        );
        info!("Throughput: {:.1}%", self.throughput_rate());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_handles_empty_run() {
        assert_eq!(SimStats::default().throughput_rate(), 0.0);
        let stats = SimStats {
            vehicles_spawned: 4,
            vehicles_exited: 1,
            ..SimStats::default()
        };
        assert_eq!(stats.throughput_rate(), 25.0);
    }
}
