// src/engine.rs
//
// Simulation orchestrator.
//
// One tick, in order:
//   1) resolve the placement target for the pending job,
//   2) advance the clock by dt,
//   3) server fleet update (reads last tick's server inlet temperatures),
//   4) CRAH update (reads last tick's CRAH return temperatures),
//   5) airflow mixing step,
//   6) draw the next job,
//   7) cost breakdown and reward.
//
// The orchestrator owns every entity; instances share nothing, so any number
// of them can run side by side.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::{ActionSet, ControlAction, Placement};
use crate::airflow::Airflow;
use crate::config::Config;
use crate::cost::CostBreakdown;
use crate::crah::CrahUnits;
use crate::error::ConfigError;
use crate::generators::{AmbientGenerator, LoadGenerator};
use crate::observation::{Observation, ObservationKind};
use crate::servers::ServerFleet;
use crate::types::{argmin, Job, SimTime};

/// Result of a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// State after the step.
    pub observation: Observation,
    /// Negative total cost of the step.
    pub reward: f64,
    /// Always false; episode length is the caller's policy.
    pub done: bool,
    pub info: StepInfo,
}

/// Bookkeeping about how a step was carried out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub tick: u64,
    /// Server the tick's job was offered to.
    pub placement: usize,
    /// The job was non-idle and fit on the target server.
    pub admitted: bool,
    /// The incoming action was replaced by defaults (pre-train window).
    pub defaults_forced: bool,
    /// CRAH supply temperature actually applied (°C).
    pub crah_temp_out: f64,
    /// CRAH flow per unit actually applied (m³/s).
    pub crah_flow: f64,
}

/// The data-center twin: server fleet, CRAH units, airflow and job stream.
pub struct DataCenter {
    cfg: Config,
    actions: ActionSet,
    observations: Vec<ObservationKind>,

    servers: ServerFleet,
    crah: CrahUnits,
    airflow: Airflow,

    load_gen: Box<dyn LoadGenerator>,
    ambient: Box<dyn AmbientGenerator>,

    time: SimTime,
    tick: u64,
    job: Job,
    ambient_temp: f64,
    costs: CostBreakdown,
}

impl DataCenter {
    /// Build a simulation. Fails only on structural config problems
    /// (e.g. servers not divisible into racks).
    ///
    /// The returned instance is already reset.
    pub fn new(
        cfg: Config,
        load_gen: Box<dyn LoadGenerator>,
        ambient: Box<dyn AmbientGenerator>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let mut sim = Self {
            actions: ActionSet::new(&cfg.control.actions),
            observations: cfg.control.observations.clone(),
            servers: ServerFleet::new(&cfg),
            crah: CrahUnits::new(&cfg),
            airflow: Airflow::new(cfg.layout.n_servers, cfg.layout.n_crah),
            load_gen,
            ambient,
            time: 0.0,
            tick: 0,
            job: Job::idle(),
            ambient_temp: 0.0,
            costs: CostBreakdown::default(),
            cfg,
        };
        sim.reset(None);

        info!(
            n_servers = sim.cfg.layout.n_servers,
            n_racks = sim.cfg.layout.n_racks,
            n_crah = sim.cfg.layout.n_crah,
            dt = sim.cfg.layout.dt,
            actions = ?sim.actions.kinds(),
            "data center initialised"
        );
        Ok(sim)
    }

    /// Return every entity to its steady-state seed at t = 0.
    ///
    /// A seed restarts the stochastic generators; `None` keeps their streams
    /// where they are.
    pub fn reset(&mut self, seed: Option<u64>) -> Observation {
        if let Some(seed) = seed {
            self.load_gen.reseed(seed);
        }

        self.time = 0.0;
        self.tick = 0;
        self.ambient_temp = self.ambient.temperature(self.time);

        self.servers.reset(self.ambient_temp);
        self.crah.reset(self.ambient_temp);
        self.airflow.reset();

        self.costs = CostBreakdown::compute(&self.servers, &self.crah, self.cfg.layout.dt, &self.cfg.cost);
        self.job = self.load_gen.next_job(self.time);

        self.observe()
    }

    /// Advance one tick under `action`.
    pub fn step(&mut self, action: &ControlAction) -> StepResult {
        let defaults_forced = self.time < self.cfg.control.pretrain_timesteps;
        let action = if defaults_forced {
            ControlAction::empty()
        } else {
            self.actions.filter(action)
        };

        let placement = self.resolve_placement(action.placement);

        self.time += self.cfg.layout.dt;
        self.tick += 1;
        self.ambient_temp = self.ambient.temperature(self.time);

        let job = self.job;
        self.servers.update(
            self.time,
            self.cfg.layout.dt,
            placement,
            job,
            &self.airflow.server_temp_in,
        );

        let crah_temp_out = action
            .crah_temp_out
            .unwrap_or(self.cfg.control.crah_out_setpoint);
        let crah_flow = action
            .crah_flow
            .unwrap_or(self.cfg.control.crah_flow_setpoint * self.cfg.crah.max_flow);
        self.crah.update(
            crah_temp_out,
            crah_flow,
            &self.airflow.crah_temp_in,
            self.ambient_temp,
        );

        self.airflow.step(&self.servers, &self.crah);

        self.job = self.load_gen.next_job(self.time);

        self.costs = CostBreakdown::compute(&self.servers, &self.crah, self.cfg.layout.dt, &self.cfg.cost);

        if self.servers.dropped_jobs > 0 {
            debug!(tick = self.tick, placement, load = job.load, "job dropped");
        }

        StepResult {
            observation: self.observe(),
            reward: self.costs.reward(),
            done: false,
            info: StepInfo {
                tick: self.tick,
                placement,
                admitted: !job.is_idle() && self.servers.dropped_jobs == 0,
                defaults_forced,
                crah_temp_out,
                crah_flow,
            },
        }
    }

    /// Concrete server index for a placement selector.
    ///
    /// Indices past the end are clamped to the last server / rack. Ties in
    /// load go to the lowest index.
    pub fn resolve_placement(&self, placement: Placement) -> usize {
        let n = self.servers.len();
        match placement {
            Placement::Server(i) => i.min(n - 1),
            Placement::Rack(r) => {
                let per_rack = self.cfg.servers_per_rack();
                let rack = r.min(self.cfg.layout.n_racks - 1);
                let start = rack * per_rack;
                let end = start + per_rack;
                start + argmin(&self.servers.load[start..end])
            }
            Placement::Auto => {
                let n_place = self.cfg.layout.n_place.clamp(1, n);
                argmin(&self.servers.load[..n_place])
            }
        }
    }

    /// Snapshot of the current state.
    pub fn observe(&self) -> Observation {
        Observation::from_sim(self)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn action_set(&self) -> &ActionSet {
        &self.actions
    }

    pub fn observation_kinds(&self) -> &[ObservationKind] {
        &self.observations
    }

    pub fn servers(&self) -> &ServerFleet {
        &self.servers
    }

    pub fn crah(&self) -> &CrahUnits {
        &self.crah
    }

    pub fn airflow(&self) -> &Airflow {
        &self.airflow
    }

    pub fn load_generator(&self) -> &dyn LoadGenerator {
        self.load_gen.as_ref()
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Job waiting to be placed on the next step.
    pub fn pending_job(&self) -> Job {
        self.job
    }

    pub fn ambient_temp(&self) -> f64 {
        self.ambient_temp
    }

    pub fn costs(&self) -> &CostBreakdown {
        &self.costs
    }
}

/// Independent simulations stepped together for parallel rollouts.
pub struct VecSim {
    sims: Vec<DataCenter>,
}

impl VecSim {
    /// Build `n` simulations; `make` supplies fresh generators for each one.
    pub fn new<F>(n: usize, cfg: &Config, mut make: F) -> Result<Self, ConfigError>
    where
        F: FnMut(usize) -> (Box<dyn LoadGenerator>, Box<dyn AmbientGenerator>),
    {
        let sims = (0..n)
            .map(|i| {
                let (load_gen, ambient) = make(i);
                DataCenter::new(cfg.clone(), load_gen, ambient)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sims })
    }

    pub fn num_sims(&self) -> usize {
        self.sims.len()
    }

    /// Reset all simulations; missing seeds leave that generator's stream as is.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<Observation> {
        self.sims
            .iter_mut()
            .enumerate()
            .map(|(i, sim)| sim.reset(seeds.and_then(|s| s.get(i).copied())))
            .collect()
    }

    /// Step every simulation with its own action.
    ///
    /// Actions must have the same length as the simulations.
    pub fn step(&mut self, actions: &[ControlAction]) -> Vec<StepResult> {
        assert_eq!(
            actions.len(),
            self.sims.len(),
            "Actions length must match number of simulations"
        );

        self.sims
            .iter_mut()
            .zip(actions.iter())
            .map(|(sim, action)| sim.step(action))
            .collect()
    }

    /// Step every simulation at default setpoints and auto placement.
    pub fn step_defaults(&mut self) -> Vec<StepResult> {
        let actions = vec![ControlAction::empty(); self.sims.len()];
        self.step(&actions)
    }

    pub fn sims(&self) -> &[DataCenter] {
        &self.sims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::generators::{ConstantArrival, ConstantTemperature};

    fn make_sim(cfg: Config, job: Job, ambient: f64) -> DataCenter {
        DataCenter::new(
            cfg,
            Box::new(ConstantArrival::new(job.load, job.duration)),
            Box::new(ConstantTemperature::new(ambient)),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_uneven_racks() {
        let mut cfg = Config::small(10);
        cfg.layout.n_racks = 4;
        let err = DataCenter::new(
            cfg,
            Box::new(ConstantArrival::new(20.0, 5.0)),
            Box::new(ConstantTemperature::new(20.0)),
        )
        .err();
        assert!(matches!(err, Some(ConfigError::RacksNotDivisible { .. })));
    }

    #[test]
    fn reset_draws_first_job_and_costs() {
        let sim = make_sim(Config::small(2), Job::new(20.0, 5.0), 30.0);
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.pending_job(), Job::new(20.0, 5.0));
        assert!(sim.costs().total_energy > 0.0);
        assert!(sim.crah().compressor_power > 0.0);
    }

    #[test]
    fn step_advances_clock_and_never_finishes() {
        let mut sim = make_sim(Config::small(2), Job::idle(), 20.0);
        for k in 1..=5u64 {
            let result = sim.step(&ControlAction::empty());
            assert!(!result.done);
            assert_eq!(result.info.tick, k);
            assert_eq!(sim.time(), k as f64);
        }
    }

    #[test]
    fn auto_placement_picks_least_loaded() {
        let mut sim = make_sim(Config::small(3), Job::new(20.0, 100.0), 20.0);
        let placed: Vec<usize> = (0..4)
            .map(|_| sim.step(&ControlAction::empty()).info.placement)
            .collect();
        assert_eq!(placed, vec![0, 1, 2, 0]);
    }

    #[test]
    fn auto_placement_respects_n_place() {
        let mut cfg = Config::small(4);
        cfg.layout.n_place = 2;
        let mut sim = make_sim(cfg, Job::new(20.0, 100.0), 20.0);
        for _ in 0..6 {
            let placement = sim.step(&ControlAction::empty()).info.placement;
            assert!(placement < 2);
        }
        assert_eq!(sim.servers().load[2], 50.0);
        assert_eq!(sim.servers().load[3], 50.0);
    }

    #[test]
    fn rack_placement_stays_inside_rack() {
        let mut cfg = Config::small(6);
        cfg.layout.n_racks = 3;
        cfg.control.actions = vec![ActionKind::Rack];
        let mut sim = make_sim(cfg, Job::new(20.0, 100.0), 20.0);

        let first = sim.step(&ControlAction::place_on_rack(1)).info.placement;
        let second = sim.step(&ControlAction::place_on_rack(1)).info.placement;
        let third = sim.step(&ControlAction::place_on_rack(1)).info.placement;
        assert_eq!((first, second, third), (2, 3, 2));
    }

    #[test]
    fn out_of_range_indices_are_clamped() {
        let mut cfg = Config::small(4);
        cfg.layout.n_racks = 2;
        cfg.control.actions = vec![ActionKind::Server, ActionKind::Rack];
        let sim = make_sim(cfg, Job::idle(), 20.0);
        assert_eq!(sim.resolve_placement(Placement::Server(99)), 3);
        assert_eq!(sim.resolve_placement(Placement::Rack(99)), 2);
    }

    #[test]
    fn default_setpoints_apply_when_unset() {
        let mut sim = make_sim(Config::small(2), Job::idle(), 20.0);
        let result = sim.step(&ControlAction::empty());
        assert_eq!(result.info.crah_temp_out, 22.0);
        assert!((result.info.crah_flow - 0.8 * 2.1).abs() < 1e-12);
        assert_eq!(sim.crah().temp_out, vec![22.0]);
    }

    #[test]
    fn commanded_setpoints_apply_when_enabled() {
        let mut sim = make_sim(Config::small(2), Job::idle(), 20.0);
        let result = sim.step(&ControlAction::empty().with_crah(19.0, 0.5));
        assert_eq!(result.info.crah_temp_out, 19.0);
        assert_eq!(result.info.crah_flow, 0.5);
    }

    #[test]
    fn pretrain_window_forces_defaults() {
        let mut cfg = Config::small(2);
        cfg.control.pretrain_timesteps = 2.0;
        let mut sim = make_sim(cfg, Job::idle(), 20.0);
        let action = ControlAction::place_on_server(1).with_crah(19.0, 0.5);

        let r1 = sim.step(&action);
        let r2 = sim.step(&action);
        let r3 = sim.step(&action);
        assert!(r1.info.defaults_forced);
        assert_eq!(r1.info.crah_temp_out, 22.0);
        // time was 1.0 < 2.0 before the second step
        assert!(r2.info.defaults_forced);
        assert!(!r3.info.defaults_forced);
        assert_eq!(r3.info.crah_temp_out, 19.0);
    }

    #[test]
    fn reward_matches_cost_breakdown() {
        let mut sim = make_sim(Config::small(2), Job::new(20.0, 5.0), 25.0);
        let result = sim.step(&ControlAction::place_on_server(0));
        assert!((result.reward + sim.costs().total()).abs() < 1e-12);
        assert_eq!(result.observation.costs, *sim.costs());
    }

    #[test]
    fn vec_sim_steps_independently() {
        let cfg = Config::small(2);
        let mut vec_sim = VecSim::new(3, &cfg, |i| {
            (
                Box::new(ConstantArrival::new(10.0 * (i + 1) as f64, 50.0)) as Box<dyn LoadGenerator>,
                Box::new(ConstantTemperature::new(20.0)) as Box<dyn AmbientGenerator>,
            )
        })
        .unwrap();
        assert_eq!(vec_sim.num_sims(), 3);

        vec_sim.reset_all(None);
        let results = vec_sim.step_defaults();
        assert_eq!(results.len(), 3);
        let loads: Vec<f64> = vec_sim.sims().iter().map(|s| s.servers().load[0]).collect();
        assert_eq!(loads, vec![60.0, 70.0, 80.0]);
    }
}
