// src/error.rs
//
// Error types for configuration and scenario loading.
//
// The simulation itself never fails at runtime: out-of-range inputs are
// clamped or passed through. Only construction-time checks produce errors.

use thiserror::Error;

/// Structural problems with a `Config`, detected before a simulation is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("servers not divisible into racks: {n_servers} servers, {n_racks} racks")]
    RacksNotDivisible { n_servers: usize, n_racks: usize },

    #[error("{field} must be >= 1")]
    ZeroCount { field: &'static str },

    #[error("{field} must be > 0 (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field}: min ({min}) exceeds max ({max})")]
    InvertedRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field}: min ({min}) must be strictly below max ({max})")]
    EmptyRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field} = {value} lies outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Errors that can occur when working with scenario files.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("scenario validation error in '{field}': {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
