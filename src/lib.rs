//! dctwin core library.
//!
//! A discrete-time digital twin of a data center's compute and cooling loop:
//! a server fleet with fan controllers and a job queue, aggregate CRAH units,
//! and a single-node airflow model coupling the two. A control policy places
//! jobs and sets CRAH supply temperature / flow each tick and receives a
//! scalar reward (negative operating cost).
//!
//! The binary (`src/main.rs`) is a thin run harness around these components.

pub mod action;
pub mod airflow;
pub mod config;
pub mod cost;
pub mod crah;
pub mod engine;
pub mod error;
pub mod generators;
pub mod logging;
pub mod metrics;
pub mod observation;
pub mod scenario;
pub mod servers;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use action::{ActionKind, ActionSet, ActionSpace, ControlAction, Placement};
pub use airflow::Airflow;
pub use config::Config;
pub use cost::CostBreakdown;
pub use crah::CrahUnits;
pub use engine::{DataCenter, StepInfo, StepResult, VecSim};
pub use error::{ConfigError, ScenarioError};
pub use generators::{
    AmbientGenerator, AmbientModel, ConstantArrival, ConstantTemperature, LoadGenerator, LoadModel,
    RandomArrival, SinusTemperature,
};
pub use metrics::{EpisodeSummary, OnlineStats};
pub use observation::{Observation, ObservationKind};
pub use scenario::Scenario;
pub use servers::ServerFleet;
pub use telemetry::{TelemetryConfig, TelemetryMode, TelemetrySink, TickMetrics};
pub use types::{Job, SimTime};
