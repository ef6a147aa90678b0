// src/main.rs
//
// Thin harness around the dctwin library: build a data center from CLI
// flags or a scenario file, run it at default control, stream per-tick
// telemetry and print an episode summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dctwin::{
    logging, ActionKind, ActionSpace, AmbientGenerator, Config, ConstantArrival, ControlAction, DataCenter,
    EpisodeSummary, LoadGenerator, RandomArrival, Scenario, SinusTemperature, TelemetryConfig,
    TelemetrySink, TickMetrics,
};

/// Job size emitted per tick by the built-in load generators (W).
const LOAD_PER_STEP: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "dctwin", about = "Data-center cooling and compute twin")]
struct Args {
    /// Number of ticks to run (default: scenario horizon, else 1000).
    #[arg(long)]
    ticks: Option<u64>,

    /// Seed for stochastic job arrivals.
    #[arg(long)]
    seed: Option<u64>,

    /// YAML scenario file; layout flags below are ignored when set.
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long)]
    n_servers: Option<usize>,

    #[arg(long)]
    n_racks: Option<usize>,

    #[arg(long)]
    n_crah: Option<usize>,

    /// Auto placement only considers the first N servers.
    #[arg(long)]
    n_place: Option<usize>,

    /// Target average load per server (W); sizes the job duration.
    #[arg(long, default_value_t = 200.0)]
    avg_load: f64,

    /// Arrival probability per tick; omitted means one job every tick.
    #[arg(long)]
    arrival_p: Option<f64>,

    /// Ambient sinusoid offset and amplitude (°C).
    #[arg(long, num_args = 2, value_names = ["OFFSET", "AMPLITUDE"], default_values_t = [20.0, 0.0])]
    ambient: Vec<f64>,

    /// Default CRAH supply temperature (°C).
    #[arg(long)]
    crah_out_setpoint: Option<f64>,

    /// Default CRAH flow as a fraction of max flow.
    #[arg(long)]
    crah_flow_setpoint: Option<f64>,

    /// Enabled control channels.
    #[arg(long, value_enum, value_delimiter = ',')]
    actions: Vec<ActionKind>,

    /// JSONL telemetry output; overrides DCTWIN_TELEMETRY_* when set.
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Enabled control channels with their ranges, e.g. `server=0..4 crah_out=[18, 27]`.
///
/// The harness rolls out at default control, so these are informational:
/// they show what an external controller driving the same config could set.
fn describe_controls(sim: &DataCenter) -> String {
    let set = sim.action_set();
    set.kinds()
        .iter()
        .zip(set.spaces(sim.config()))
        .map(|(kind, space)| match space {
            ActionSpace::Discrete(n) => format!("{kind}=0..{n}"),
            ActionSpace::Box { low, high } => format!("{kind}=[{low}, {high}]"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Env-derived config with CLI overrides on top.
fn build_config(args: &Args) -> Config {
    let mut cfg = Config::from_env_or_default();

    if let Some(n) = args.n_servers {
        cfg.layout.n_servers = n;
        cfg.layout.n_place = n;
    }
    if let Some(n) = args.n_racks {
        cfg.layout.n_racks = n;
    }
    if let Some(n) = args.n_crah {
        cfg.layout.n_crah = n;
    }
    if let Some(n) = args.n_place {
        cfg.layout.n_place = n;
    }
    if let Some(v) = args.crah_out_setpoint {
        cfg.control.crah_out_setpoint = v;
    }
    if let Some(v) = args.crah_flow_setpoint {
        cfg.control.crah_flow_setpoint = v;
    }
    if !args.actions.is_empty() {
        cfg.control.actions = args.actions.clone();
    }

    cfg
}

fn build_from_args(args: &Args) -> Result<DataCenter> {
    let cfg = build_config(args);

    let job = ConstantArrival::for_average_load(
        LOAD_PER_STEP,
        args.avg_load,
        cfg.layout.n_servers,
        cfg.layout.dt,
    );
    let load_gen: Box<dyn LoadGenerator> = match args.arrival_p {
        Some(p) => Box::new(RandomArrival::new(
            job.load,
            job.duration,
            p,
            args.seed.unwrap_or_default(),
        )),
        None => Box::new(job),
    };

    let (offset, amplitude) = match args.ambient.as_slice() {
        [offset, amplitude] => (*offset, *amplitude),
        _ => (20.0, 0.0),
    };
    let ambient: Box<dyn AmbientGenerator> = Box::new(SinusTemperature::new(offset, amplitude));

    DataCenter::new(cfg, load_gen, ambient).context("invalid data-center configuration")
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    let (mut sim, scenario_ticks, scenario_id) = match &args.scenario {
        Some(path) => {
            let scenario = Scenario::from_yaml_file(path)
                .with_context(|| format!("loading scenario {}", path.display()))?;
            let sim = scenario.build().context("building scenario")?;
            (sim, Some(scenario.horizon.steps), scenario.scenario_id)
        }
        None => (build_from_args(&args)?, None, "cli".to_string()),
    };

    let ticks = args.ticks.or(scenario_ticks).unwrap_or(1000);
    let cfg_hash = fnv1a64(&format!("{:?}", sim.config()));

    println!(
        "dctwin | cfg={} | cfg_hash=0x{:016x} | scenario={} | servers={} | crah={} | ticks={} | seed={}",
        sim.config().version,
        cfg_hash,
        scenario_id,
        sim.config().layout.n_servers,
        sim.config().layout.n_crah,
        ticks,
        args.seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    println!("controls | {} | rollout=default", describe_controls(&sim));

    if args.seed.is_some() {
        sim.reset(args.seed);
    }

    let mut telemetry = match &args.telemetry {
        Some(path) => TelemetrySink::from_config(TelemetryConfig::jsonl(path)),
        None => TelemetrySink::from_env(),
    };

    let mut summary = EpisodeSummary::new();
    let action = ControlAction::empty();
    for _ in 0..ticks {
        let result = sim.step(&action);
        let metrics = TickMetrics::collect(&sim, result.reward);
        telemetry.log_json(&metrics.to_record());
        summary.record(&metrics);
    }
    telemetry.flush();

    info!(
        ticks,
        records = telemetry.records_written(),
        "run finished"
    );

    let report = serde_json::to_string_pretty(&summary.report()).context("serializing summary")?;
    println!("{report}");

    Ok(())
}
