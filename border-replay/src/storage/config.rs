//! Configuration of the replay buffers.
use super::WeightNormalizer;
use crate::error::ReplayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of prioritized experience replay.
///
/// ```
/// use border_replay::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .n_opts_final(500_000)
///     .normalize(WeightNormalizer::All);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent applied to TD errors when they are turned into priorities.
    /// A value of 0 results in uniform sampling.
    pub alpha: f32,

    /// Initial exponent of importance sampling weights.
    pub beta_0: f32,

    /// Final exponent of importance sampling weights.
    pub beta_final: f32,

    /// Number of priority updates after which `beta` reaches `beta_final`.
    pub n_opts_final: usize,

    /// Priority given to new transitions before any priority update.
    pub start_max_priority: f32,

    /// How importance weights are normalized.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            start_max_priority: 1.0,
            normalize: WeightNormalizer::All,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of priority updates to reach the final exponent.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the priority of new transitions.
    pub fn start_max_priority(mut self, start_max_priority: f32) -> Self {
        self.start_max_priority = start_max_priority;
        self
    }

    /// Sets the method for normalizing importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    pub(super) fn check(&self) -> Result<(), ReplayError> {
        if !(self.start_max_priority.is_finite() && self.start_max_priority > 0.0) {
            return Err(ReplayError::InvalidConfig(format!(
                "start_max_priority must be positive, got {}",
                self.start_max_priority
            )));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(ReplayError::InvalidConfig(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Configuration of [`NstepReplayBuffer`](super::NstepReplayBuffer) and
/// [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// ```
/// use border_replay::{NstepReplayBufferConfig, PerConfig};
///
/// let config = NstepReplayBufferConfig::default()
///     .capacity(1_000_000)
///     .nstep(3)
///     .init_size(50_000)
///     .seed(42)
///     .per_config(Some(PerConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct NstepReplayBufferConfig {
    /// Maximum number of transitions. Old transitions are overwritten.
    pub capacity: usize,

    /// Length of the n-step window, `1 <= nstep < capacity`.
    pub nstep: usize,

    /// Number of transitions required before the buffer reports ready.
    pub init_size: usize,

    /// Seed of the random number generator used for sampling.
    pub seed: u64,

    /// Configuration of prioritized experience replay. Only read by
    /// [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
    pub per_config: Option<PerConfig>,
}

impl Default for NstepReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            nstep: 3,
            init_size: 0,
            seed: 42,
            per_config: None,
        }
    }
}

impl NstepReplayBufferConfig {
    /// Sets the capacity of the buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the length of the n-step window.
    pub fn nstep(mut self, nstep: usize) -> Self {
        self.nstep = nstep;
        self
    }

    /// Sets the number of transitions required before the buffer is ready.
    pub fn init_size(mut self, init_size: usize) -> Self {
        self.init_size = init_size;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration of prioritized experience replay.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    pub(super) fn check(&self) -> Result<(), ReplayError> {
        if self.capacity == 0 {
            return Err(ReplayError::InvalidConfig(
                "capacity must be positive".to_string(),
            ));
        }
        if self.nstep == 0 || self.nstep >= self.capacity {
            return Err(ReplayError::InvalidConfig(format!(
                "nstep must be in [1, {}), got {}",
                self.capacity, self.nstep
            )));
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
