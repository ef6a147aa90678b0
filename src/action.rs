// src/action.rs
//
// Control surface of the simulation: which channels a policy may drive,
// and the per-tick action it submits.
//
// The enabled channels are chosen once at configuration time and resolved
// into an `ActionSet`; a tick only checks membership.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// One control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ActionKind {
    /// Placeholder channel for policies that drive nothing.
    None,
    /// Place the job on the least-loaded server of a rack.
    Rack,
    /// Place the job on a specific server.
    Server,
    /// CRAH supply temperature.
    CrahOut,
    /// CRAH flow.
    CrahFlow,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::Rack => "rack",
            ActionKind::Server => "server",
            ActionKind::CrahOut => "crah_out",
            ActionKind::CrahFlow => "crah_flow",
        }
    }

    /// Value range of this channel in simulation units.
    pub fn space(&self, cfg: &Config) -> ActionSpace {
        match self {
            ActionKind::None => ActionSpace::Discrete(2),
            ActionKind::Rack => ActionSpace::Discrete(cfg.layout.n_racks),
            ActionKind::Server => ActionSpace::Discrete(cfg.layout.n_servers),
            ActionKind::CrahOut => ActionSpace::Box {
                low: cfg.crah.min_temp,
                high: cfg.crah.max_temp,
            },
            ActionKind::CrahFlow => ActionSpace::Box {
                low: cfg.crah.min_flow,
                high: cfg.crah.max_flow,
            },
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ActionKind::None),
            "rack" => Ok(ActionKind::Rack),
            "server" => Ok(ActionKind::Server),
            "crah_out" => Ok(ActionKind::CrahOut),
            "crah_flow" => Ok(ActionKind::CrahFlow),
            other => Err(format!("unknown action kind {other:?}")),
        }
    }
}

/// Range of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionSpace {
    /// Integers in `0..n`.
    Discrete(usize),
    /// Closed real interval.
    Box { low: f64, high: f64 },
}

/// Where to put this tick's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Least-loaded server among the first `n_place`.
    #[default]
    Auto,
    /// Least-loaded server in this rack.
    Rack(usize),
    /// This server.
    Server(usize),
}

/// Control decision for one tick. Unset fields fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlAction {
    pub placement: Placement,
    /// CRAH supply temperature command (°C).
    pub crah_temp_out: Option<f64>,
    /// CRAH flow command per unit (m³/s).
    pub crah_flow: Option<f64>,
}

impl ControlAction {
    /// Everything at defaults.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn place_on_server(server: usize) -> Self {
        Self {
            placement: Placement::Server(server),
            ..Self::default()
        }
    }

    pub fn place_on_rack(rack: usize) -> Self {
        Self {
            placement: Placement::Rack(rack),
            ..Self::default()
        }
    }

    pub fn with_crah(mut self, temp_out: f64, flow: f64) -> Self {
        self.crah_temp_out = Some(temp_out);
        self.crah_flow = Some(flow);
        self
    }
}

/// Enabled control channels, in policy order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    kinds: Vec<ActionKind>,
    rack: bool,
    server: bool,
    crah_out: bool,
    crah_flow: bool,
}

impl ActionSet {
    pub fn new(kinds: &[ActionKind]) -> Self {
        let mut ordered: Vec<ActionKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !ordered.contains(kind) {
                ordered.push(*kind);
            }
        }
        Self {
            rack: ordered.contains(&ActionKind::Rack),
            server: ordered.contains(&ActionKind::Server),
            crah_out: ordered.contains(&ActionKind::CrahOut),
            crah_flow: ordered.contains(&ActionKind::CrahFlow),
            kinds: ordered,
        }
    }

    pub fn kinds(&self) -> &[ActionKind] {
        &self.kinds
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Per-channel ranges in policy order.
    pub fn spaces(&self, cfg: &Config) -> Vec<ActionSpace> {
        self.kinds.iter().map(|k| k.space(cfg)).collect()
    }

    /// Drop the parts of `action` whose channel is disabled.
    pub fn filter(&self, action: &ControlAction) -> ControlAction {
        let placement = match action.placement {
            Placement::Rack(r) if self.rack => Placement::Rack(r),
            Placement::Server(s) if self.server => Placement::Server(s),
            _ => Placement::Auto,
        };
        ControlAction {
            placement,
            crah_temp_out: action.crah_temp_out.filter(|_| self.crah_out),
            crah_flow: action.crah_flow.filter(|_| self.crah_flow),
        }
    }
}
