// src/airflow.rs
//
// Single-node airflow coupling between the server fleet and the CRAH units.
//
// Each step reads the other subsystem's previous-tick outlet temperatures
// and the current flows, so the mixing is solved explicitly with a one-tick
// lag instead of as a simultaneous system.

use crate::crah::CrahUnits;
use crate::servers::ServerFleet;

#[derive(Debug, Clone)]
pub struct Airflow {
    /// Inlet temperature per server (°C).
    pub server_temp_in: Vec<f64>,
    /// Outlet temperature per server (°C).
    pub server_temp_out: Vec<f64>,
    /// Return-air temperature per CRAH unit (°C).
    pub crah_temp_in: Vec<f64>,
    /// Share of server exhaust re-entering server intakes in the last step.
    pub recirculation: f64,
    /// Share of CRAH supply returning straight to the CRAH in the last step.
    pub bypass: f64,
}

impl Airflow {
    pub fn new(n_servers: usize, n_crah: usize) -> Self {
        Self {
            server_temp_in: vec![0.0; n_servers],
            server_temp_out: vec![0.0; n_servers],
            crah_temp_in: vec![0.0; n_crah],
            recirculation: 0.0,
            bypass: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.server_temp_in.fill(0.0);
        self.server_temp_out.fill(0.0);
        self.crah_temp_in.fill(0.0);
        self.recirculation = 0.0;
        self.bypass = 0.0;
    }

    /// Mix one tick of air.
    ///
    /// Flows are floored strictly above zero upstream, so both totals are
    /// positive here.
    pub fn step(&mut self, servers: &ServerFleet, crah: &CrahUnits) {
        let server_flow_total = servers.total_flow();
        let crah_flow_total = crah.total_flow();

        let prev_server_temp_out_avg = flow_weighted_mean(&servers.flow, &self.server_temp_out);

        let recirculation = (1.0 - crah_flow_total / server_flow_total).max(0.0);
        let bypass = (1.0 - server_flow_total / crah_flow_total).max(0.0);

        // Simple model: all units share one supply temperature.
        let crah_temp_out = crah.temp_out.first().copied().unwrap_or_default();

        for i in 0..self.server_temp_out.len() {
            self.server_temp_out[i] = self.server_temp_in[i] + servers.delta_t[i];
        }

        let server_in =
            (1.0 - recirculation) * crah_temp_out + recirculation * prev_server_temp_out_avg;
        self.server_temp_in.fill(server_in);

        let crah_in = (1.0 - bypass) * prev_server_temp_out_avg + bypass * crah_temp_out;
        self.crah_temp_in.fill(crah_in);

        self.recirculation = recirculation;
        self.bypass = bypass;
    }

    /// Flow-weighted average server inlet temperature.
    pub fn avg_server_temp_in(&self, flow: &[f64]) -> f64 {
        flow_weighted_mean(flow, &self.server_temp_in)
    }

    /// Flow-weighted average server outlet temperature.
    pub fn avg_server_temp_out(&self, flow: &[f64]) -> f64 {
        flow_weighted_mean(flow, &self.server_temp_out)
    }
}

fn flow_weighted_mean(flow: &[f64], temps: &[f64]) -> f64 {
    let total: f64 = flow.iter().sum();
    let weighted: f64 = flow.iter().zip(temps.iter()).map(|(f, t)| f * t).sum();
    weighted / total
}
