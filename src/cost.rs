// src/cost.rs
//
// Per-tick cost breakdown and scalar reward.
//
// r_t = -( w_energy · (P_server_fan + P_crah_fan + P_compressor) · dt
//        + w_drop   · dropped_jobs
//        + w_heat   · overheated_inlets )

use serde::{Deserialize, Serialize};

use crate::config::CostWeights;
use crate::crah::CrahUnits;
use crate::servers::ServerFleet;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cooling energy spent this tick (J).
    pub total_energy: f64,
    pub energy_cost: f64,
    pub drop_cost: f64,
    pub overheat_cost: f64,
}

impl CostBreakdown {
    pub fn compute(servers: &ServerFleet, crah: &CrahUnits, dt: f64, weights: &CostWeights) -> Self {
        let total_energy = (servers.fan_power + crah.fan_power + crah.compressor_power) * dt;
        Self {
            total_energy,
            energy_cost: weights.energy * total_energy,
            drop_cost: weights.job_drop * f64::from(servers.dropped_jobs),
            overheat_cost: weights.overheat * servers.overheated_inlets as f64,
        }
    }

    pub fn total(&self) -> f64 {
        self.energy_cost + self.drop_cost + self.overheat_cost
    }

    pub fn reward(&self) -> f64 {
        -self.total()
    }
}
