// src/metrics.rs
//
// Online episode statistics.
// - OnlineStats: Welford running mean/variance + min/max.
// - EpisodeSummary: per-run aggregates fed from TickMetrics.

use serde::Serialize;

use crate::telemetry::TickMetrics;

#[derive(Debug, Clone, Copy)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for OnlineStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl OnlineStats {
    /// Adds a sample if finite. Non-finite samples are ignored.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Population variance (divide by n).
    pub fn variance_population(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / (self.n as f64)
        }
    }

    pub fn stddev_population(&self) -> f64 {
        self.variance_population().sqrt()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            n: self.n(),
            mean: self.mean(),
            std: self.stddev_population(),
            min: self.min(),
            max: self.max(),
        }
    }
}

/// Serializable view of an `OnlineStats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub n: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Aggregates over one run.
#[derive(Debug, Clone, Default)]
pub struct EpisodeSummary {
    pub reward: OnlineStats,
    pub pue: OnlineStats,
    pub max_temp_cpu: OnlineStats,
    pub total_reward: f64,
    /// Cooling energy (J).
    pub total_energy: f64,
    pub dropped_jobs: u64,
    /// Sum over ticks of overheated inlet counts.
    pub overheated_inlets: u64,
    pub ticks: u64,
}

impl EpisodeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, m: &TickMetrics) {
        self.reward.add(m.reward);
        // PUE is undefined with no IT load.
        if m.it_power > 0.0 {
            self.pue.add(m.pue);
        }
        self.max_temp_cpu.add(m.max_temp_cpu);

        self.total_reward += m.reward;
        self.total_energy += m.costs.total_energy;
        self.dropped_jobs += u64::from(m.dropped_jobs);
        self.overheated_inlets += m.overheated_inlets as u64;
        self.ticks += 1;
    }

    pub fn report(&self) -> SummaryReport {
        SummaryReport {
            ticks: self.ticks,
            total_reward: self.total_reward,
            total_energy: self.total_energy,
            dropped_jobs: self.dropped_jobs,
            overheated_inlets: self.overheated_inlets,
            reward: self.reward.snapshot(),
            pue: self.pue.snapshot(),
            max_temp_cpu: self.max_temp_cpu.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub ticks: u64,
    pub total_reward: f64,
    pub total_energy: f64,
    pub dropped_jobs: u64,
    pub overheated_inlets: u64,
    pub reward: StatsSnapshot,
    pub pue: StatsSnapshot,
    pub max_temp_cpu: StatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_stats_basic() {
        let mut s = OnlineStats::default();
        for x in [1.0, 2.0, 3.0, 4.0] {
            s.add(x);
        }
        s.add(f64::NAN);
        assert_eq!(s.n(), 4);
        assert!((s.mean() - 2.5).abs() < 1e-12);
        assert!((s.variance_population() - 1.25).abs() < 1e-12);
        assert_eq!(s.min(), 1.0);
        assert_eq!(s.max(), 4.0);
    }

    #[test]
    fn empty_stats_report_zero() {
        let snap = OnlineStats::default().snapshot();
        assert_eq!(snap.n, 0);
        assert_eq!(snap.min, 0.0);
        assert_eq!(snap.max, 0.0);
    }
}
