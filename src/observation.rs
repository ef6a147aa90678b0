// src/observation.rs
//
// Observation snapshot of the data center after reset / step.
//
// The snapshot carries the full state; a policy picks its feature vector
// through the configured `ObservationKind`s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::cost::CostBreakdown;
use crate::engine::DataCenter;
use crate::generators::LoadGenerator;
use crate::types::{Job, SimTime};

/// Server outlet temperature range reported as the feature bound (°C).
pub const TEMP_OUT_BOUNDS: (f64, f64) = (15.0, 85.0);

/// One feature group a policy can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    /// Outlet temperature of every server.
    TempOut,
    /// Load of every server.
    Load,
    /// Load and duration of the pending job.
    Job,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::TempOut => "temp_out",
            ObservationKind::Load => "load",
            ObservationKind::Job => "job",
        }
    }

    /// Number of values this kind contributes to the feature vector.
    pub fn width(&self, cfg: &Config) -> usize {
        match self {
            ObservationKind::TempOut | ObservationKind::Load => cfg.layout.n_servers,
            ObservationKind::Job => 2,
        }
    }

    /// Per-value `(low, high)` bounds in simulation units.
    pub fn bounds(&self, cfg: &Config, load_gen: &dyn LoadGenerator) -> (Vec<f64>, Vec<f64>) {
        let n = cfg.layout.n_servers;
        match self {
            ObservationKind::TempOut => (vec![TEMP_OUT_BOUNDS.0; n], vec![TEMP_OUT_BOUNDS.1; n]),
            ObservationKind::Load => (
                vec![cfg.server.idle_load; n],
                vec![cfg.server.max_load; n],
            ),
            ObservationKind::Job => {
                let lo = load_gen.min_values();
                let hi = load_gen.max_values();
                (vec![lo.load, lo.duration], vec![hi.load, hi.duration])
            }
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temp_out" => Ok(ObservationKind::TempOut),
            "load" => Ok(ObservationKind::Load),
            "job" => Ok(ObservationKind::Job),
            other => Err(format!("unknown observation kind {other:?}")),
        }
    }
}

/// Concatenated bounds of `kinds`, in order.
pub fn feature_bounds(
    kinds: &[ObservationKind],
    cfg: &Config,
    load_gen: &dyn LoadGenerator,
) -> (Vec<f64>, Vec<f64>) {
    let mut low = Vec::new();
    let mut high = Vec::new();
    for kind in kinds {
        let (lo, hi) = kind.bounds(cfg, load_gen);
        low.extend(lo);
        high.extend(hi);
    }
    (low, high)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: SimTime,
    pub tick: u64,
    pub ambient_temp: f64,

    // Servers
    pub load: Vec<f64>,
    pub temp_cpu: Vec<f64>,
    pub flow: Vec<f64>,
    pub temp_in: Vec<f64>,
    pub temp_out: Vec<f64>,
    pub server_fan_power: f64,
    pub dropped_jobs: u32,
    pub overheated_inlets: usize,
    pub running_jobs: usize,

    // CRAH
    pub crah_temp_in: Vec<f64>,
    pub crah_temp_out: Vec<f64>,
    pub crah_flow: Vec<f64>,
    pub crah_fan_power: f64,
    pub compressor_power: f64,

    /// Job waiting for the next step.
    pub job: Job,
    pub costs: CostBreakdown,
}

impl Observation {
    pub fn from_sim(sim: &DataCenter) -> Self {
        let servers = sim.servers();
        let crah = sim.crah();
        let airflow = sim.airflow();

        Self {
            time: sim.time(),
            tick: sim.tick(),
            ambient_temp: sim.ambient_temp(),

            load: servers.load.clone(),
            temp_cpu: servers.temp_cpu.clone(),
            flow: servers.flow.clone(),
            temp_in: airflow.server_temp_in.clone(),
            temp_out: airflow.server_temp_out.clone(),
            server_fan_power: servers.fan_power,
            dropped_jobs: servers.dropped_jobs,
            overheated_inlets: servers.overheated_inlets,
            running_jobs: servers.running_jobs(),

            crah_temp_in: airflow.crah_temp_in.clone(),
            crah_temp_out: crah.temp_out.clone(),
            crah_flow: crah.flow.clone(),
            crah_fan_power: crah.fan_power,
            compressor_power: crah.compressor_power,

            job: sim.pending_job(),
            costs: *sim.costs(),
        }
    }

    /// Feature vector for `kinds`, concatenated in order.
    pub fn features(&self, kinds: &[ObservationKind]) -> Vec<f64> {
        let mut out = Vec::new();
        for kind in kinds {
            match kind {
                ObservationKind::TempOut => out.extend_from_slice(&self.temp_out),
                ObservationKind::Load => out.extend_from_slice(&self.load),
                ObservationKind::Job => {
                    out.push(self.job.load);
                    out.push(self.job.duration);
                }
            }
        }
        out
    }

    /// Canonical JSON bytes: field order is fixed by the struct, so two
    /// identical states always serialize to identical bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
