// src/config.rs
//
// Central configuration for the data-center twin.
//
// Defaults reproduce the reference cooling model: 360 servers in 12 racks,
// 4 CRAH units, 1 s ticks, air properties at room temperature, and the
// cost weights used for training runs.

use std::env;
use std::str::FromStr;

use tracing::{info, warn};

use crate::action::ActionKind;
use crate::error::ConfigError;
use crate::observation::ObservationKind;

#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Fleet shape and clock.
    pub layout: LayoutConfig,
    /// Server thermal / fan model.
    pub server: ServerConfig,
    /// CRAH unit model.
    pub crah: CrahConfig,
    /// Air properties used to derive heat capacity and thermal resistance.
    pub air: AirConfig,
    /// Cost weights for the scalar reward.
    pub cost: CostWeights,
    /// Default setpoints and enabled control / observation channels.
    pub control: ControlConfig,
}

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Number of servers N.
    pub n_servers: usize,
    /// Number of racks; must divide `n_servers`.
    pub n_racks: usize,
    /// Number of CRAH units M.
    pub n_crah: usize,
    /// Auto-placement considers only the first `n_place` servers.
    pub n_place: usize,
    /// Tick length in simulated seconds.
    pub dt: f64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Power draw with no jobs (W).
    pub idle_load: f64,
    /// Capacity per server (W).
    pub max_load: f64,
    /// CPU temperature at idle (°C). Only used to size the controller gain.
    pub idle_temp_cpu: f64,
    /// CPU temperature limit (°C). Only used to size the controller gain.
    pub max_temp_cpu: f64,
    /// Fan controller target (°C).
    pub target_temp_cpu: f64,
    /// Flow floor (m³/s); strictly positive so `load / flow` stays finite.
    pub min_flow: f64,
    /// Flow ceiling (m³/s).
    pub max_flow: f64,
    /// Fan power at `max_flow` (W).
    pub max_fan_power: f64,
}

impl ServerConfig {
    /// Integral time constant of the fan controller.
    ///
    /// Negative: a CPU hotter than target must raise the flow.
    pub fn ti(&self) -> f64 {
        -10.0 * (self.max_temp_cpu - self.idle_temp_cpu) / (self.max_flow - self.min_flow)
    }
}

#[derive(Debug, Clone)]
pub struct CrahConfig {
    /// Lowest supply temperature command (°C).
    pub min_temp: f64,
    /// Highest supply temperature command (°C).
    pub max_temp: f64,
    /// Flow floor per unit (m³/s).
    pub min_flow: f64,
    /// Flow ceiling per unit (m³/s).
    pub max_flow: f64,
    /// Fan power per unit at `max_flow` (W).
    pub max_fan_power: f64,
    /// Supply temperature after reset (°C), independent of ambient.
    pub initial_temp_out: f64,
}

#[derive(Debug, Clone)]
pub struct AirConfig {
    /// Kinematic viscosity ν (m²/s).
    pub kinematic_viscosity: f64,
    /// Thermal conductivity k (W/m K).
    pub thermal_conductivity: f64,
    /// Prandtl number.
    pub prandtl: f64,
    /// Dimensionless resistance constant; R = k_r / air_vol_heatcap.
    pub k_r: f64,
}

impl AirConfig {
    /// Volumetric heat capacity of air, `Pr · k / ν`.
    pub fn air_vol_heatcap(&self) -> f64 {
        self.prandtl * self.thermal_conductivity / self.kinematic_viscosity
    }

    /// Server thermal resistance R.
    pub fn thermal_resistance(&self) -> f64 {
        self.k_r / self.air_vol_heatcap()
    }
}

#[derive(Debug, Clone)]
pub struct CostWeights {
    /// Weight on energy (per J).
    pub energy: f64,
    /// Cost of one dropped job.
    pub job_drop: f64,
    /// Cost per overheated inlet.
    pub overheat: f64,
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// CRAH supply temperature used when the action leaves it unset (°C).
    pub crah_out_setpoint: f64,
    /// CRAH flow used when unset, as a fraction of `crah.max_flow`.
    pub crah_flow_setpoint: f64,
    /// Until this simulated time every action is replaced by defaults.
    pub pretrain_timesteps: f64,
    /// Enabled control channels, in policy order.
    pub actions: Vec<ActionKind>,
    /// Enabled observation features, in policy order.
    pub observations: Vec<ObservationKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "dctwin-v0.1",
            layout: LayoutConfig {
                n_servers: 360,
                n_racks: 12,
                n_crah: 4,
                n_place: 360,
                dt: 1.0,
            },
            server: ServerConfig {
                idle_load: 50.0,
                max_load: 400.0,
                idle_temp_cpu: 35.0,
                max_temp_cpu: 85.0,
                target_temp_cpu: 60.0,
                min_flow: 0.001,
                max_flow: 0.04,
                max_fan_power: 25.2 * 2.0,
            },
            crah: CrahConfig {
                min_temp: 18.0,
                max_temp: 27.0,
                min_flow: 0.1,
                max_flow: 2.1,
                // Server fans move 0.04 m³/s for 50.4 W; a CRAH of 2.5x that
                // ratio, assumed twice as efficient.
                max_fan_power: 2646.0 / 2.0,
                initial_temp_out: 22.0,
            },
            air: AirConfig {
                kinematic_viscosity: 1.568e-5,
                thermal_conductivity: 2.624e-2,
                prandtl: 0.707,
                k_r: 3.0,
            },
            cost: CostWeights {
                energy: 0.00001,
                job_drop: 10.0,
                overheat: 0.1,
            },
            control: ControlConfig {
                crah_out_setpoint: 22.0,
                crah_flow_setpoint: 0.8,
                pretrain_timesteps: 0.0,
                actions: vec![ActionKind::Server, ActionKind::CrahOut, ActionKind::CrahFlow],
                observations: vec![
                    ObservationKind::TempOut,
                    ObservationKind::Load,
                    ObservationKind::Job,
                ],
            },
        }
    }
}

impl Config {
    /// Small fleet used by tests and quick CLI runs: N servers, 1 rack, 1 CRAH.
    pub fn small(n_servers: usize) -> Self {
        let mut cfg = Config::default();
        cfg.layout.n_servers = n_servers;
        cfg.layout.n_racks = 1;
        cfg.layout.n_crah = 1;
        cfg.layout.n_place = n_servers;
        cfg
    }

    pub fn servers_per_rack(&self) -> usize {
        self.layout.n_servers / self.layout.n_racks.max(1)
    }

    /// Check the structural invariants the simulation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        if layout.n_servers == 0 {
            return Err(ConfigError::ZeroCount { field: "n_servers" });
        }
        if layout.n_racks == 0 {
            return Err(ConfigError::ZeroCount { field: "n_racks" });
        }
        if layout.n_crah == 0 {
            return Err(ConfigError::ZeroCount { field: "n_crah" });
        }
        if layout.n_servers % layout.n_racks != 0 {
            return Err(ConfigError::RacksNotDivisible {
                n_servers: layout.n_servers,
                n_racks: layout.n_racks,
            });
        }

        positive("dt", layout.dt)?;
        positive("server.min_flow", self.server.min_flow)?;
        positive("crah.min_flow", self.crah.min_flow)?;
        positive("air.kinematic_viscosity", self.air.kinematic_viscosity)?;
        // The fan controller divides by both spans.
        strictly_ordered("server.flow", self.server.min_flow, self.server.max_flow)?;
        strictly_ordered(
            "server.temp_cpu",
            self.server.idle_temp_cpu,
            self.server.max_temp_cpu,
        )?;
        ordered("server.load", self.server.idle_load, self.server.max_load)?;
        strictly_ordered("crah.flow", self.crah.min_flow, self.crah.max_flow)?;
        ordered("crah.temp", self.crah.min_temp, self.crah.max_temp)?;

        // Defaults the engine commands on its own must respect the CRAH ranges.
        within(
            "control.crah_out_setpoint",
            self.control.crah_out_setpoint,
            self.crah.min_temp,
            self.crah.max_temp,
        )?;
        within(
            "control.crah_flow_setpoint",
            self.control.crah_flow_setpoint * self.crah.max_flow,
            self.crah.min_flow,
            self.crah.max_flow,
        )?;

        Ok(())
    }

    /// Build the default config, then apply environment overrides.
    ///
    ///   - DCTWIN_N_SERVERS, DCTWIN_N_RACKS, DCTWIN_N_CRAH, DCTWIN_N_PLACE (usize)
    ///   - DCTWIN_DT                      (f64, seconds)
    ///   - DCTWIN_CRAH_OUT_SETPOINT       (f64, °C)
    ///   - DCTWIN_CRAH_FLOW_SETPOINT      (f64, fraction of max flow)
    ///   - DCTWIN_ENERGY_WEIGHT, DCTWIN_DROP_WEIGHT, DCTWIN_OVERHEAT_WEIGHT (f64)
    ///   - DCTWIN_PRETRAIN_TIMESTEPS      (f64, seconds)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_default() -> Self {
        let mut cfg = Config::default();

        override_from_env("DCTWIN_N_SERVERS", &mut cfg.layout.n_servers);
        override_from_env("DCTWIN_N_RACKS", &mut cfg.layout.n_racks);
        override_from_env("DCTWIN_N_CRAH", &mut cfg.layout.n_crah);
        override_from_env("DCTWIN_N_PLACE", &mut cfg.layout.n_place);
        override_from_env("DCTWIN_DT", &mut cfg.layout.dt);
        override_from_env(
            "DCTWIN_CRAH_OUT_SETPOINT",
            &mut cfg.control.crah_out_setpoint,
        );
        override_from_env(
            "DCTWIN_CRAH_FLOW_SETPOINT",
            &mut cfg.control.crah_flow_setpoint,
        );
        override_from_env("DCTWIN_ENERGY_WEIGHT", &mut cfg.cost.energy);
        override_from_env("DCTWIN_DROP_WEIGHT", &mut cfg.cost.job_drop);
        override_from_env("DCTWIN_OVERHEAT_WEIGHT", &mut cfg.cost.overheat);
        override_from_env(
            "DCTWIN_PRETRAIN_TIMESTEPS",
            &mut cfg.control.pretrain_timesteps,
        );

        cfg
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn ordered(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, min, max })
    }
}

fn strictly_ordered(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min < max {
        Ok(())
    } else {
        Err(ConfigError::EmptyRange { field, min, max })
    }
}

fn within(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn override_from_env<T>(var: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            info!(var, value = ?v, "config override");
            *slot = v;
        }
        Err(_) => {
            warn!(var, raw = %raw, default = ?slot, "could not parse config override; using default");
        }
    }
}
