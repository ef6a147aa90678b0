// src/servers.rs
//
// Server fleet: per-server load, CPU temperature and fan flow, plus the
// queue of running jobs.
//
// The thermal model is a steady-state resistance model, recomputed in full
// each tick rather than integrated. Fan flow follows an integral controller
// toward a target CPU temperature.

use std::collections::BinaryHeap;

use crate::config::{Config, ServerConfig};
use crate::types::{fan_law_power, Job, RunningJob, SimTime, INLET_OVERHEAT_C};

#[derive(Debug, Clone)]
pub struct ServerFleet {
    cfg: ServerConfig,
    air_vol_heatcap: f64,
    thermal_resistance: f64,
    ti: f64,

    /// Power draw per server (W), within [idle_load, max_load].
    pub load: Vec<f64>,
    /// CPU temperature per server (°C).
    pub temp_cpu: Vec<f64>,
    /// Fan flow per server (m³/s), within [min_flow, max_flow].
    pub flow: Vec<f64>,
    /// Air temperature rise across each server (°C).
    pub delta_t: Vec<f64>,
    /// Total server fan power (W).
    pub fan_power: f64,
    /// Servers whose inlet was above the overheat bound this tick.
    pub overheated_inlets: usize,
    /// 1 if this tick's job was rejected, else 0.
    pub dropped_jobs: u32,

    running_jobs: BinaryHeap<RunningJob>,
    next_seq: u64,
}

impl ServerFleet {
    pub fn new(cfg: &Config) -> Self {
        let n = cfg.layout.n_servers;
        let server = cfg.server.clone();
        let ti = server.ti();
        let mut fleet = Self {
            air_vol_heatcap: cfg.air.air_vol_heatcap(),
            thermal_resistance: cfg.air.thermal_resistance(),
            ti,
            load: vec![server.idle_load; n],
            temp_cpu: vec![0.0; n],
            flow: vec![server.min_flow; n],
            delta_t: vec![0.0; n],
            fan_power: 0.0,
            overheated_inlets: 0,
            dropped_jobs: 0,
            running_jobs: BinaryHeap::new(),
            next_seq: 0,
            cfg: server,
        };
        fleet.fan_power = fleet.compute_fan_power();
        fleet
    }

    pub fn len(&self) -> usize {
        self.load.len()
    }

    pub fn is_empty(&self) -> bool {
        self.load.is_empty()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Seed steady state: minimum flow, idle load, CPU at ambient.
    pub fn reset(&mut self, ambient_temp: f64) {
        self.delta_t.fill(0.0);
        self.temp_cpu.fill(ambient_temp);
        self.flow.fill(self.cfg.min_flow);
        self.load.fill(self.cfg.idle_load);

        self.fan_power = self.compute_fan_power();

        self.running_jobs.clear();
        self.next_seq = 0;
        self.dropped_jobs = 0;
        self.overheated_inlets = 0;
    }

    /// Advance the fleet by one tick.
    ///
    /// Thermal and flow terms read the state held before this call; the job is
    /// admitted afterwards and completions at or before `time` are swept last.
    pub fn update(
        &mut self,
        time: SimTime,
        dt: f64,
        placement: usize,
        job: Job,
        temp_in: &[f64],
    ) {
        let r = self.thermal_resistance;
        let target = self.cfg.target_temp_cpu;
        let gain = dt / self.ti;

        for i in 0..self.len() {
            let load = self.load[i];
            let flow = self.flow[i];

            let new_temp_cpu = temp_in[i] + r * load / flow;
            let delta_flow = gain * (target - self.temp_cpu[i]);
            let new_flow = (flow + delta_flow).clamp(self.cfg.min_flow, self.cfg.max_flow);

            self.delta_t[i] = load / (self.air_vol_heatcap * flow);
            self.temp_cpu[i] = new_temp_cpu;
            self.flow[i] = new_flow;
        }

        self.overheated_inlets = temp_in.iter().filter(|t| **t > INLET_OVERHEAT_C).count();
        self.fan_power = self.compute_fan_power();

        self.dropped_jobs = 0;
        if !job.is_idle() && !self.try_admit(time, placement, job) {
            self.dropped_jobs = 1;
        }

        self.complete_jobs(time);
    }

    /// Number of jobs still running.
    pub fn running_jobs(&self) -> usize {
        self.running_jobs.len()
    }

    /// Total load of running jobs per server, recomputed from the queue.
    pub fn job_load_by_server(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        for job in self.running_jobs.iter() {
            out[job.server_index] += job.load;
        }
        out
    }

    /// Sum of load across all servers (IT power, W).
    pub fn total_load(&self) -> f64 {
        self.load.iter().sum()
    }

    pub fn total_flow(&self) -> f64 {
        self.flow.iter().sum()
    }

    fn try_admit(&mut self, time: SimTime, placement: usize, job: Job) -> bool {
        if self.load[placement] + job.load > self.cfg.max_load {
            return false;
        }
        self.load[placement] += job.load;
        self.running_jobs.push(RunningJob {
            completion_time: time + job.duration,
            load: job.load,
            server_index: placement,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        true
    }

    fn complete_jobs(&mut self, time: SimTime) {
        while let Some(job) = self.running_jobs.peek() {
            if job.completion_time > time {
                break;
            }
            if let Some(job) = self.running_jobs.pop() {
                self.load[job.server_index] -= job.load;
            }
        }
    }

    fn compute_fan_power(&self) -> f64 {
        fan_law_power(self.cfg.max_fan_power, self.cfg.max_flow, &self.flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet(n: usize, ambient: f64) -> ServerFleet {
        let mut fleet = ServerFleet::new(&Config::small(n));
        fleet.reset(ambient);
        fleet
    }

    #[test]
    fn reset_seeds_steady_state() {
        let fleet = fleet(3, 20.0);
        assert_eq!(fleet.load, vec![50.0; 3]);
        assert_eq!(fleet.temp_cpu, vec![20.0; 3]);
        assert_eq!(fleet.flow, vec![0.001; 3]);
        assert_eq!(fleet.running_jobs(), 0);
        let expected = 3.0 * 50.4 * (0.001f64 / 0.04).powi(3);
        assert!((fleet.fan_power - expected).abs() < 1e-12);
    }

    #[test]
    fn job_admitted_then_completed() {
        let mut fleet = fleet(2, 20.0);
        let temp_in = [20.0, 20.0];

        fleet.update(0.0, 1.0, 0, Job::new(20.0, 5.0), &temp_in);
        assert_eq!(fleet.load, vec![70.0, 50.0]);
        assert_eq!(fleet.dropped_jobs, 0);

        for t in 1..5 {
            fleet.update(t as f64, 1.0, 0, Job::idle(), &temp_in);
            assert_eq!(fleet.load, vec![70.0, 50.0], "still running at t={t}");
        }

        fleet.update(5.0, 1.0, 0, Job::idle(), &temp_in);
        assert_eq!(fleet.load, vec![50.0, 50.0]);
        assert_eq!(fleet.running_jobs(), 0);
    }

    #[test]
    fn over_capacity_job_is_dropped() {
        let mut fleet = fleet(2, 20.0);
        fleet.update(1.0, 1.0, 0, Job::new(400.0, 5.0), &[20.0, 20.0]);
        assert_eq!(fleet.dropped_jobs, 1);
        assert_eq!(fleet.load, vec![50.0, 50.0]);

        // The flag is per tick.
        fleet.update(2.0, 1.0, 0, Job::idle(), &[20.0, 20.0]);
        assert_eq!(fleet.dropped_jobs, 0);
    }

    #[test]
    fn job_exactly_at_capacity_is_admitted() {
        let mut fleet = fleet(1, 20.0);
        fleet.update(1.0, 1.0, 0, Job::new(350.0, 5.0), &[20.0]);
        assert_eq!(fleet.dropped_jobs, 0);
        assert_eq!(fleet.load, vec![400.0]);
    }

    #[test]
    fn several_completions_in_one_tick() {
        let mut fleet = fleet(2, 20.0);
        let temp_in = [20.0, 20.0];
        fleet.update(1.0, 1.0, 0, Job::new(10.0, 3.0), &temp_in);
        fleet.update(2.0, 1.0, 1, Job::new(30.0, 2.0), &temp_in);
        fleet.update(3.0, 1.0, 1, Job::new(5.0, 1.0), &temp_in);
        assert_eq!(fleet.load, vec![60.0, 85.0]);

        // t=4 retires all three (completions 4, 4, 4).
        fleet.update(4.0, 1.0, 0, Job::idle(), &temp_in);
        assert_eq!(fleet.load, vec![50.0, 50.0]);
        assert_eq!(fleet.running_jobs(), 0);
    }

    #[test]
    fn hot_cpu_raises_flow_and_flow_stays_clamped() {
        let mut fleet = fleet(1, 20.0);
        fleet.temp_cpu[0] = 1.0e6;
        fleet.update(1.0, 1.0, 0, Job::idle(), &[20.0]);
        assert_eq!(fleet.flow[0], fleet.config().max_flow);

        fleet.temp_cpu[0] = -1.0e6;
        fleet.update(2.0, 1.0, 0, Job::idle(), &[20.0]);
        assert_eq!(fleet.flow[0], fleet.config().min_flow);
    }

    #[test]
    fn temperature_uses_resistance_model() {
        let cfg = Config::small(1);
        let mut fleet = ServerFleet::new(&cfg);
        fleet.reset(20.0);
        fleet.update(1.0, 1.0, 0, Job::idle(), &[18.0]);

        let r = cfg.air.thermal_resistance();
        let expected_cpu = 18.0 + r * 50.0 / 0.001;
        let expected_dt = 50.0 / (cfg.air.air_vol_heatcap() * 0.001);
        assert!((fleet.temp_cpu[0] - expected_cpu).abs() < 1e-9);
        assert!((fleet.delta_t[0] - expected_dt).abs() < 1e-9);
    }

    #[test]
    fn overheated_inlets_counted_strictly_above_bound() {
        let mut fleet = fleet(3, 20.0);
        fleet.update(1.0, 1.0, 0, Job::idle(), &[27.0, 27.5, 30.0]);
        assert_eq!(fleet.overheated_inlets, 2);
    }

    #[test]
    fn job_load_by_server_matches_queue() {
        let mut fleet = fleet(3, 20.0);
        let temp_in = [20.0; 3];
        fleet.update(1.0, 1.0, 2, Job::new(40.0, 10.0), &temp_in);
        fleet.update(2.0, 1.0, 2, Job::new(15.0, 10.0), &temp_in);
        fleet.update(3.0, 1.0, 0, Job::new(5.0, 10.0), &temp_in);
        let by_server = fleet.job_load_by_server();
        for i in 0..3 {
            assert!((fleet.load[i] - 50.0 - by_server[i]).abs() < 1e-12);
        }
    }
}
