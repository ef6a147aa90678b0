// src/crah.rs
//
// CRAH units, modelled as one aggregate: a single supply temperature and
// flow command broadcast to every unit.

use crate::config::{Config, CrahConfig};
use crate::types::fan_law_power;

#[derive(Debug, Clone)]
pub struct CrahUnits {
    cfg: CrahConfig,
    air_vol_heatcap: f64,

    /// Supply temperature per unit (°C).
    pub temp_out: Vec<f64>,
    /// Flow per unit (m³/s).
    pub flow: Vec<f64>,
    /// Total CRAH fan power (W).
    pub fan_power: f64,
    /// Total compressor power (W).
    pub compressor_power: f64,
}

impl CrahUnits {
    pub fn new(cfg: &Config) -> Self {
        let m = cfg.layout.n_crah;
        let crah = cfg.crah.clone();
        let mut units = Self {
            air_vol_heatcap: cfg.air.air_vol_heatcap(),
            temp_out: vec![crah.initial_temp_out; m],
            flow: vec![crah.min_flow; m],
            fan_power: 0.0,
            compressor_power: 0.0,
            cfg: crah,
        };
        units.fan_power = units.compute_fan_power();
        units
    }

    pub fn len(&self) -> usize {
        self.flow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flow.is_empty()
    }

    pub fn config(&self) -> &CrahConfig {
        &self.cfg
    }

    /// Seed minimum flow and the fixed initial supply temperature.
    ///
    /// No return-air reading exists yet, so ambient stands in as the heat
    /// load for the compressor estimate.
    pub fn reset(&mut self, ambient_temp: f64) {
        self.flow.fill(self.cfg.min_flow);
        self.temp_out.fill(self.cfg.initial_temp_out);

        self.fan_power = self.compute_fan_power();

        let heatcap = self.air_vol_heatcap;
        self.compressor_power = self
            .temp_out
            .iter()
            .zip(self.flow.iter())
            .filter(|(t_out, _)| ambient_temp > **t_out)
            .map(|(t_out, flow)| heatcap * flow * (ambient_temp - t_out))
            .sum();
    }

    /// Apply a supply temperature and flow command to every unit.
    ///
    /// Inputs are expected pre-clamped to the configured ranges. The
    /// compressor runs only when ambient is above the supply temperature and
    /// then removes the heat in the measured return air `temp_in`.
    pub fn update(&mut self, temp_out: f64, flow: f64, temp_in: &[f64], ambient_temp: f64) {
        self.flow.fill(flow);
        self.temp_out.fill(temp_out);

        self.fan_power = self.compute_fan_power();

        let heatcap = self.air_vol_heatcap;
        let mut compressor = 0.0;
        for i in 0..self.len() {
            let t_out = self.temp_out[i];
            if ambient_temp > t_out {
                // Return air colder than supply needs no cooling.
                let lift = (temp_in[i] - t_out).max(0.0);
                compressor += heatcap * self.flow[i] * lift;
            }
        }
        self.compressor_power = compressor;
    }

    pub fn total_flow(&self) -> f64 {
        self.flow.iter().sum()
    }

    fn compute_fan_power(&self) -> f64 {
        fan_law_power(self.cfg.max_fan_power, self.cfg.max_flow, &self.flow)
    }
}
