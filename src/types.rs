// src/types.rs
//
// Basic shared types for the data-center twin.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Simulated time in seconds since reset.
pub type SimTime = f64;

/// Temperature above which a server inlet counts as overheated (°C).
///
/// Fixed safety bound, intentionally not part of `Config`.
pub const INLET_OVERHEAT_C: f64 = 27.0;

/// A job arrival drawn from a load generator.
///
/// `load == 0` means no job arrived this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    /// Power drawn while running (W).
    pub load: f64,
    /// Run time in simulated seconds.
    pub duration: f64,
}

impl Job {
    pub fn new(load: f64, duration: f64) -> Self {
        Self { load, duration }
    }

    /// The "nothing arrived" job.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.load == 0.0
    }
}

/// A job admitted to a server, waiting for its completion time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningJob {
    pub completion_time: SimTime,
    pub load: f64,
    pub server_index: usize,
    /// Insertion sequence number; breaks completion-time ties so the heap
    /// pops in a reproducible order.
    pub seq: u64,
}

// BinaryHeap is a max-heap; invert the comparison so the earliest
// completion sits on top.
impl Ord for RunningJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .completion_time
            .total_cmp(&self.completion_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for RunningJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for RunningJob {}

/// Cubic fan law summed over a set of fans.
///
/// `Σ max_fan_power · (flow / max_flow)³`
pub fn fan_law_power(max_fan_power: f64, max_flow: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .map(|f| max_fan_power * (f / max_flow).powi(3))
        .sum()
}

/// Index of the smallest value; ties go to the lowest index.
///
/// Returns 0 for an empty slice.
pub fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v < values[best] {
            best = i;
        }
    }
    best
}
