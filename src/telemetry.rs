//! Per-tick facility records as JSON lines.
//!
//! The run harness turns each step into a [`TickMetrics`] and hands its
//! record to a [`TelemetrySink`]. A record holds temperatures, flows, fan
//! and compressor power, PUE and the cost breakdown for that tick, so a
//! rollout can be replotted or diffed without rerunning it.
//!
//! `--telemetry <path>` on the CLI wins; otherwise the sink is configured by
//! `DCTWIN_TELEMETRY_MODE` (`jsonl` enables it, anything else leaves it off),
//! `DCTWIN_TELEMETRY_PATH` (output file) and `DCTWIN_TELEMETRY_APPEND`
//! (`1`, `true` or `yes` keeps earlier runs in the file).
//!
//! Losing telemetry never stops a rollout. A sink that cannot open or write
//! its file logs a warning and goes quiet.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{self, Value as JsonValue};
use tracing::warn;

use crate::cost::CostBreakdown;
use crate::engine::DataCenter;

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Insert `schema_version` into a JSON object record if it is missing.
///
/// Non-object records are left alone.
pub fn ensure_schema_version(record: &mut JsonValue) {
    if let JsonValue::Object(map) = record {
        map.entry("schema_version")
            .or_insert_with(|| JsonValue::Number(SCHEMA_VERSION.into()));
    }
}

const MODE_VAR: &str = "DCTWIN_TELEMETRY_MODE";
const PATH_VAR: &str = "DCTWIN_TELEMETRY_PATH";
const APPEND_VAR: &str = "DCTWIN_TELEMETRY_APPEND";

/// Whether tick records leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    pub fn from_env() -> Self {
        Self::parse(&env::var(MODE_VAR).unwrap_or_default())
    }

    /// `jsonl` in any case; everything else, empty included, is `Off`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("jsonl") {
            TelemetryMode::Jsonl
        } else {
            TelemetryMode::Off
        }
    }
}

/// Where a run's tick records go.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    /// Ignored while `mode` is `Off`.
    pub path: Option<PathBuf>,
    /// Keep existing lines instead of starting the file over.
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mode = TelemetryMode::parse(&lookup(MODE_VAR).unwrap_or_default());
        let path = match mode {
            TelemetryMode::Jsonl => lookup(PATH_VAR).map(PathBuf::from),
            TelemetryMode::Off => None,
        };
        TelemetryConfig {
            mode,
            path,
            append: lookup(APPEND_VAR).is_some_and(|v| parse_flag(&v)),
        }
    }

    /// JSONL output to `path`, truncating.
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Writes one record per line to the configured file.
///
/// The file is opened on the first record, so a sink built for a run that
/// never logs leaves no file behind. Once disabled it stays disabled.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        TelemetrySink {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
            records: 0,
        }
    }

    pub fn off() -> Self {
        Self::from_config(TelemetryConfig {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    /// Lines written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let Some(path) = self.path.clone() else {
                warn!("telemetry mode is jsonl but no path is set; disabling telemetry");
                self.mode = TelemetryMode::Off;
                return None;
            };

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }

            match options.open(&path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot open telemetry file; disabling telemetry");
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    /// Append `value` as one line; a failed write disables the sink.
    pub fn log_json(&mut self, value: &JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }

        let Some(writer) = self.ensure_writer() else {
            return;
        };

        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };

        if let Err(err) = writeln!(writer, "{line}") {
            warn!(error = %err, "telemetry write failed; disabling telemetry");
            self.mode = TelemetryMode::Off;
            self.writer = None;
            return;
        }
        self.records += 1;
    }

    pub fn log<T: Serialize>(&mut self, record: &T) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }
        if let Ok(value) = serde_json::to_value(record) {
            self.log_json(&value);
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Derived per-tick metrics of the whole facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: u64,
    pub time: f64,
    pub ambient_temp: f64,
    pub reward: f64,

    pub max_temp_cpu: f64,
    pub avg_temp_cpu: f64,
    /// Flow-weighted mean server inlet temperature.
    pub avg_temp_in: f64,
    /// Flow-weighted mean server outlet temperature.
    pub avg_temp_out: f64,
    pub crah_temp_out: f64,
    pub crah_temp_in: f64,

    pub total_server_flow: f64,
    pub total_crah_flow: f64,
    pub recirculation: f64,
    pub bypass: f64,

    pub load_variance: f64,
    pub running_jobs: usize,
    pub dropped_jobs: u32,
    pub overheated_inlets: usize,

    pub server_fan_power: f64,
    pub crah_fan_power: f64,
    pub compressor_power: f64,
    /// Sum of server load (W).
    pub it_power: f64,
    /// (cooling + IT) / IT.
    pub pue: f64,

    pub costs: CostBreakdown,
}

impl TickMetrics {
    pub fn collect(sim: &DataCenter, reward: f64) -> Self {
        let servers = sim.servers();
        let crah = sim.crah();
        let airflow = sim.airflow();

        let n = servers.len().max(1) as f64;
        let max_temp_cpu = servers
            .temp_cpu
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let avg_temp_cpu = servers.temp_cpu.iter().sum::<f64>() / n;

        let mean_load = servers.total_load() / n;
        let load_variance = servers
            .load
            .iter()
            .map(|l| (l - mean_load).powi(2))
            .sum::<f64>()
            / n;

        let it_power = servers.total_load();
        let cooling = servers.fan_power + crah.fan_power + crah.compressor_power;
        let pue = if it_power > 0.0 {
            (cooling + it_power) / it_power
        } else {
            0.0
        };

        TickMetrics {
            tick: sim.tick(),
            time: sim.time(),
            ambient_temp: sim.ambient_temp(),
            reward,
            max_temp_cpu,
            avg_temp_cpu,
            avg_temp_in: airflow.avg_server_temp_in(&servers.flow),
            avg_temp_out: airflow.avg_server_temp_out(&servers.flow),
            crah_temp_out: crah.temp_out.first().copied().unwrap_or_default(),
            crah_temp_in: airflow.crah_temp_in.first().copied().unwrap_or_default(),
            total_server_flow: servers.total_flow(),
            total_crah_flow: crah.total_flow(),
            recirculation: airflow.recirculation,
            bypass: airflow.bypass,
            load_variance,
            running_jobs: servers.running_jobs(),
            dropped_jobs: servers.dropped_jobs,
            overheated_inlets: servers.overheated_inlets,
            server_fan_power: servers.fan_power,
            crah_fan_power: crah.fan_power,
            compressor_power: crah.compressor_power,
            it_power,
            pue,
            costs: *sim.costs(),
        }
    }

    /// JSON record with `schema_version` set.
    pub fn to_record(&self) -> JsonValue {
        let mut record = serde_json::to_value(self)
            .unwrap_or_else(|_| JsonValue::Object(serde_json::Map::new()));
        ensure_schema_version(&mut record);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ControlAction;
    use crate::config::Config;
    use crate::generators::{ConstantArrival, ConstantTemperature};
    use serde_json::json;

    #[test]
    fn ensure_schema_version_inserts_when_missing() {
        let mut record = json!({"t": 0});
        ensure_schema_version(&mut record);
        assert_eq!(record["schema_version"], 1);

        let mut record = json!({"schema_version": 7});
        ensure_schema_version(&mut record);
        assert_eq!(record["schema_version"], 7);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(TelemetryMode::parse("JSONL"), TelemetryMode::Jsonl);
        assert_eq!(TelemetryMode::parse("csv"), TelemetryMode::Off);
    }

    #[test]
    fn config_from_lookup_reads_all_three_variables() {
        let vars = |name: &str| match name {
            "DCTWIN_TELEMETRY_MODE" => Some(" JsonL ".to_string()),
            "DCTWIN_TELEMETRY_PATH" => Some("/tmp/run.jsonl".to_string()),
            "DCTWIN_TELEMETRY_APPEND" => Some("Yes".to_string()),
            _ => None,
        };
        let cfg = TelemetryConfig::from_lookup(vars);
        assert_eq!(cfg.mode, TelemetryMode::Jsonl);
        assert_eq!(cfg.path, Some(PathBuf::from("/tmp/run.jsonl")));
        assert!(cfg.append);
    }

    #[test]
    fn config_from_lookup_drops_path_when_off() {
        let vars = |name: &str| match name {
            "DCTWIN_TELEMETRY_PATH" => Some("/tmp/run.jsonl".to_string()),
            "DCTWIN_TELEMETRY_APPEND" => Some("0".to_string()),
            _ => None,
        };
        let cfg = TelemetryConfig::from_lookup(vars);
        assert_eq!(cfg.mode, TelemetryMode::Off);
        assert_eq!(cfg.path, None);
        assert!(!cfg.append);
        assert!(!TelemetrySink::from_config(cfg).is_enabled());
    }

    #[test]
    fn jsonl_without_path_disables_itself() {
        let mut sink = TelemetrySink::from_config(TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: None,
            append: false,
        });
        sink.log_json(&json!({"t": 0}));
        assert!(!sink.is_enabled());
        assert_eq!(sink.records_written(), 0);
    }

    #[test]
    fn tick_metrics_pue_and_variance() {
        let mut sim = DataCenter::new(
            Config::small(2),
            Box::new(ConstantArrival::new(20.0, 50.0)),
            Box::new(ConstantTemperature::new(20.0)),
        )
        .unwrap();
        let result = sim.step(&ControlAction::empty());
        let metrics = TickMetrics::collect(&sim, result.reward);

        assert_eq!(metrics.tick, 1);
        assert_eq!(metrics.it_power, 120.0);
        assert!((metrics.load_variance - 100.0).abs() < 1e-12);
        let cooling = metrics.server_fan_power + metrics.crah_fan_power + metrics.compressor_power;
        assert!((metrics.pue - (cooling + 120.0) / 120.0).abs() < 1e-12);
        assert!(metrics.pue >= 1.0);
        assert_eq!(metrics.to_record()["schema_version"], 1);
    }
}
