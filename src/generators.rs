// src/generators.rs
//
// Job arrival and ambient temperature generators.
//
// Both are functions of simulated time. The only state a generator may carry
// is its own seeded random stream; nothing is shared between instances.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Job, SimTime};

/// Seconds in one simulated day.
pub const DAY_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// Source of job arrivals, one draw per tick.
pub trait LoadGenerator: Send {
    /// Job arriving at `time`. An idle job (`load == 0`) means no arrival.
    fn next_job(&mut self, time: SimTime) -> Job;

    /// Lower bound of `(load, duration)` this generator can emit.
    fn min_values(&self) -> Job;

    /// Upper bound of `(load, duration)` this generator can emit.
    fn max_values(&self) -> Job;

    /// Restart the random stream. Deterministic generators ignore this.
    fn reseed(&mut self, _seed: u64) {}
}

/// Source of outdoor temperature.
pub trait AmbientGenerator: Send {
    fn temperature(&self, time: SimTime) -> f64;
    fn min_value(&self) -> f64;
    fn max_value(&self) -> f64;
}

/// A job of fixed size every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantArrival {
    pub load: f64,
    pub duration: f64,
}

impl ConstantArrival {
    pub fn new(load: f64, duration: f64) -> Self {
        Self { load, duration }
    }

    /// Size the job duration so the fleet averages `avg_load` W per server.
    ///
    /// `avg_load = load_per_step / dt · duration / n_servers`
    pub fn for_average_load(load_per_step: f64, avg_load: f64, n_servers: usize, dt: f64) -> Self {
        let duration = dt * avg_load * n_servers as f64 / load_per_step;
        Self::new(load_per_step, duration)
    }
}

impl LoadGenerator for ConstantArrival {
    fn next_job(&mut self, _time: SimTime) -> Job {
        Job::new(self.load, self.duration)
    }

    fn min_values(&self) -> Job {
        Job::idle()
    }

    fn max_values(&self) -> Job {
        Job::new(self.load, self.duration)
    }
}

/// A fixed-size job with probability `p` per tick, otherwise nothing.
#[derive(Debug, Clone)]
pub struct RandomArrival {
    load: f64,
    duration: f64,
    p: f64,
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomArrival {
    pub fn new(load: f64, duration: f64, p: f64, seed: u64) -> Self {
        Self {
            load,
            duration,
            p: p.clamp(0.0, 1.0),
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl LoadGenerator for RandomArrival {
    fn next_job(&mut self, _time: SimTime) -> Job {
        if self.rng.gen::<f64>() < self.p {
            Job::new(self.load, self.duration)
        } else {
            Job::idle()
        }
    }

    fn min_values(&self) -> Job {
        Job::idle()
    }

    fn max_values(&self) -> Job {
        Job::new(self.load, self.duration)
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantTemperature {
    pub temp: f64,
}

impl ConstantTemperature {
    pub fn new(temp: f64) -> Self {
        Self { temp }
    }
}

impl AmbientGenerator for ConstantTemperature {
    fn temperature(&self, _time: SimTime) -> f64 {
        self.temp
    }

    fn min_value(&self) -> f64 {
        0.0
    }

    fn max_value(&self) -> f64 {
        self.temp
    }
}

/// Daily sinusoid: `offset + amplitude · sin(2π t / day)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinusTemperature {
    pub offset: f64,
    pub amplitude: f64,
    pub period: f64,
}

impl SinusTemperature {
    pub fn new(offset: f64, amplitude: f64) -> Self {
        Self {
            offset,
            amplitude,
            period: DAY_SECONDS,
        }
    }
}

impl AmbientGenerator for SinusTemperature {
    fn temperature(&self, time: SimTime) -> f64 {
        self.offset + self.amplitude * (2.0 * PI * time / self.period).sin()
    }

    // One degree of slack either side.
    fn min_value(&self) -> f64 {
        self.offset - self.amplitude - 1.0
    }

    fn max_value(&self) -> f64 {
        self.offset + self.amplitude + 1.0
    }
}

/// Serializable description of a load generator (scenario files, CLI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadModel {
    Constant { load: f64, duration: f64 },
    Random { load: f64, duration: f64, p: f64, seed: u64 },
}

impl LoadModel {
    pub fn build(&self) -> Box<dyn LoadGenerator> {
        match *self {
            LoadModel::Constant { load, duration } => Box::new(ConstantArrival::new(load, duration)),
            LoadModel::Random {
                load,
                duration,
                p,
                seed,
            } => Box::new(RandomArrival::new(load, duration, p, seed)),
        }
    }
}

/// Serializable description of an ambient generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmbientModel {
    Constant { temp: f64 },
    Sinus { offset: f64, amplitude: f64 },
}

impl AmbientModel {
    pub fn build(&self) -> Box<dyn AmbientGenerator> {
        match *self {
            AmbientModel::Constant { temp } => Box::new(ConstantTemperature::new(temp)),
            AmbientModel::Sinus { offset, amplitude } => {
                Box::new(SinusTemperature::new(offset, amplitude))
            }
        }
    }
}
