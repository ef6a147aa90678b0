// src/scenario.rs
//
// YAML scenario files.
//
// A scenario fully defines a reproducible run:
// - scenario_id + scenario_version for tracking
// - horizon (steps)
// - RNG seed for stochastic load
// - layout / control / cost overrides on top of `Config::default()`
// - load and ambient models

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::config::Config;
use crate::engine::DataCenter;
use crate::error::ScenarioError;
use crate::generators::{AmbientModel, ConstantArrival, LoadGenerator, LoadModel};
use crate::observation::ObservationKind;

/// Current scenario schema version.
pub const SCENARIO_SCHEMA_VERSION: u32 = 1;

/// Default job size when no load model is given (W per tick).
pub const DEFAULT_LOAD_PER_STEP: f64 = 20.0;
/// Default average server load when no load model is given (W).
pub const DEFAULT_AVG_LOAD: f64 = 200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horizon {
    /// Number of simulation steps.
    pub steps: u64,
}

impl Default for Horizon {
    fn default() -> Self {
        Self { steps: 1000 }
    }
}

/// Layout overrides; unset fields keep the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutOverrides {
    pub n_servers: Option<usize>,
    pub n_racks: Option<usize>,
    pub n_crah: Option<usize>,
    /// Defaults to `n_servers` when only the fleet size is overridden.
    pub n_place: Option<usize>,
    pub dt: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlOverrides {
    pub crah_out_setpoint: Option<f64>,
    pub crah_flow_setpoint: Option<f64>,
    pub pretrain_timesteps: Option<f64>,
    pub actions: Option<Vec<ActionKind>>,
    pub observations: Option<Vec<ObservationKind>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostOverrides {
    pub energy: Option<f64>,
    pub job_drop: Option<f64>,
    pub overheat: Option<f64>,
}

/// Complete scenario description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    /// Schema version (starts at 1).
    pub scenario_version: u32,
    /// Reseeds stochastic generators on the first reset.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub horizon: Horizon,
    #[serde(default)]
    pub layout: LayoutOverrides,
    #[serde(default)]
    pub control: ControlOverrides,
    #[serde(default)]
    pub cost: CostOverrides,
    /// Defaults to a constant arrival sized for 200 W average load.
    #[serde(default)]
    pub load_model: Option<LoadModel>,
    #[serde(default = "default_ambient")]
    pub ambient_model: AmbientModel,
}

fn default_ambient() -> AmbientModel {
    AmbientModel::Sinus {
        offset: 20.0,
        amplitude: 0.0,
    }
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|source| ScenarioError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate a scenario from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.scenario_id.trim().is_empty() {
            return Err(invalid("scenario_id", "scenario_id cannot be empty"));
        }
        if self.scenario_version == 0 || self.scenario_version > SCENARIO_SCHEMA_VERSION {
            return Err(invalid(
                "scenario_version",
                format!(
                    "unsupported version {} (expected 1..={SCENARIO_SCHEMA_VERSION})",
                    self.scenario_version
                ),
            ));
        }
        if self.horizon.steps == 0 {
            return Err(invalid("horizon.steps", "steps must be > 0"));
        }
        if let Some(setpoint) = self.control.crah_flow_setpoint {
            if !(setpoint > 0.0 && setpoint <= 1.0) {
                return Err(invalid(
                    "control.crah_flow_setpoint",
                    "setpoint is a fraction of max flow and must lie in (0, 1]",
                ));
            }
        }
        if let Some(LoadModel::Random { p, .. }) = &self.load_model {
            if !(0.0..=1.0).contains(p) {
                return Err(invalid("load_model.p", "arrival probability must lie in [0, 1]"));
            }
        }
        if let Some(LoadModel::Constant { load, duration } | LoadModel::Random { load, duration, .. }) =
            &self.load_model
        {
            if *load < 0.0 || *duration < 0.0 {
                return Err(invalid("load_model", "load and duration must be >= 0"));
            }
        }

        self.to_config()?.validate()?;
        Ok(())
    }

    /// Default config with this scenario's overrides applied.
    pub fn to_config(&self) -> Result<Config, ScenarioError> {
        let mut cfg = Config::default();

        let layout = &self.layout;
        if let Some(n) = layout.n_servers {
            cfg.layout.n_servers = n;
            cfg.layout.n_place = n;
        }
        if let Some(v) = layout.n_racks {
            cfg.layout.n_racks = v;
        }
        if let Some(v) = layout.n_crah {
            cfg.layout.n_crah = v;
        }
        if let Some(v) = layout.n_place {
            cfg.layout.n_place = v;
        }
        if let Some(v) = layout.dt {
            cfg.layout.dt = v;
        }

        let control = &self.control;
        if let Some(v) = control.crah_out_setpoint {
            cfg.control.crah_out_setpoint = v;
        }
        if let Some(v) = control.crah_flow_setpoint {
            cfg.control.crah_flow_setpoint = v;
        }
        if let Some(v) = control.pretrain_timesteps {
            cfg.control.pretrain_timesteps = v;
        }
        if let Some(v) = &control.actions {
            cfg.control.actions = v.clone();
        }
        if let Some(v) = &control.observations {
            cfg.control.observations = v.clone();
        }

        if let Some(v) = self.cost.energy {
            cfg.cost.energy = v;
        }
        if let Some(v) = self.cost.job_drop {
            cfg.cost.job_drop = v;
        }
        if let Some(v) = self.cost.overheat {
            cfg.cost.overheat = v;
        }

        Ok(cfg)
    }

    /// Build the simulation and reset it with the scenario seed.
    pub fn build(&self) -> Result<DataCenter, ScenarioError> {
        let cfg = self.to_config()?;

        let load_gen: Box<dyn LoadGenerator> = match &self.load_model {
            Some(model) => model.build(),
            None => Box::new(ConstantArrival::for_average_load(
                DEFAULT_LOAD_PER_STEP,
                DEFAULT_AVG_LOAD,
                cfg.layout.n_servers,
                cfg.layout.dt,
            )),
        };
        let ambient = self.ambient_model.build();

        let mut sim = DataCenter::new(cfg, load_gen, ambient)?;
        if self.seed.is_some() {
            sim.reset(self.seed);
        }
        Ok(sim)
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    const HOT_DAY: &str = r#"
scenario_id: hot_day
scenario_version: 1
seed: 37

horizon:
  steps: 120

layout:
  n_servers: 40
  n_racks: 4
  n_crah: 1
  dt: 1.0

control:
  crah_out_setpoint: 20
  crah_flow_setpoint: 0.5
  actions: [rack, crah_out]
  observations: [load, job]

load_model:
  kind: random
  load: 20
  duration: 400
  p: 0.8
  seed: 1

ambient_model:
  kind: sinus
  offset: 30
  amplitude: 5
"#;

    #[test]
    fn parse_full_scenario() {
        let scenario = Scenario::from_yaml_str(HOT_DAY).unwrap();
        assert_eq!(scenario.scenario_id, "hot_day");
        assert_eq!(scenario.horizon.steps, 120);
        assert_eq!(scenario.seed, Some(37));

        let cfg = scenario.to_config().unwrap();
        assert_eq!(cfg.layout.n_servers, 40);
        assert_eq!(cfg.layout.n_place, 40);
        assert_eq!(cfg.servers_per_rack(), 10);
        assert_eq!(cfg.control.crah_out_setpoint, 20.0);
        assert_eq!(cfg.control.actions, vec![ActionKind::Rack, ActionKind::CrahOut]);
        assert_eq!(
            cfg.control.observations,
            vec![ObservationKind::Load, ObservationKind::Job]
        );
    }

    #[test]
    fn minimal_scenario_uses_defaults() {
        let scenario = Scenario::from_yaml_str("scenario_id: tiny\nscenario_version: 1\nlayout:\n  n_servers: 4\n  n_racks: 1\n  n_crah: 1\n").unwrap();
        let sim = scenario.build().unwrap();
        assert_eq!(sim.ambient_temp(), 20.0);
        // 200 W average over 4 servers with 20 W jobs.
        assert_eq!(sim.pending_job().load, 20.0);
        assert!((sim.pending_job().duration - 40.0).abs() < 1e-12);
    }

    #[test]
    fn uneven_racks_fail_validation() {
        let yaml = "scenario_id: bad\nscenario_version: 1\nlayout:\n  n_servers: 10\n  n_racks: 3\n";
        let err = Scenario::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Config(_)));
    }

    #[test]
    fn empty_id_and_zero_steps_rejected() {
        let err = Scenario::from_yaml_str("scenario_id: ''\nscenario_version: 1\n").unwrap_err();
        assert!(matches!(err, ScenarioError::Validation { ref field, .. } if field == "scenario_id"));

        let err = Scenario::from_yaml_str("scenario_id: x\nscenario_version: 1\nhorizon:\n  steps: 0\n")
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Validation { ref field, .. } if field == "horizon.steps"));
    }

    #[test]
    fn default_crah_commands_must_fit_crah_ranges() {
        let zero_flow = "scenario_id: x\nscenario_version: 1\ncontrol:\n  crah_flow_setpoint: 0\n";
        let err = Scenario::from_yaml_str(zero_flow).unwrap_err();
        assert!(
            matches!(err, ScenarioError::Validation { ref field, .. } if field == "control.crah_flow_setpoint")
        );

        // Positive, but 0.02 · max_flow is below the CRAH flow floor.
        let starved = "scenario_id: x\nscenario_version: 1\ncontrol:\n  crah_flow_setpoint: 0.02\n";
        assert!(matches!(
            Scenario::from_yaml_str(starved),
            Err(ScenarioError::Config(ConfigError::OutOfRange { .. }))
        ));

        let hot_supply = "scenario_id: x\nscenario_version: 1\ncontrol:\n  crah_out_setpoint: 35\n";
        assert!(matches!(
            Scenario::from_yaml_str(hot_supply),
            Err(ScenarioError::Config(ConfigError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let yaml = "scenario_id: x\nscenario_version: 1\ncontrol:\n  actions: [warp_drive]\n";
        assert!(matches!(
            Scenario::from_yaml_str(yaml),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Scenario::from_yaml_file("/nonexistent/dctwin/scenario.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::Io { .. }));
    }
}
