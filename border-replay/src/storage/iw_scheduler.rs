//! Importance sampling weights for prioritized replay.
use serde::{Deserialize, Serialize};

/// Specifies how to normalize the importance weights in a prioritized batch.
#[derive(Copy, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum WeightNormalizer {
    /// Normalize weights by the maximum weight of all transitions in the buffer.
    All,
    /// Normalize weights by the maximum weight of transitions in the batch.
    Batch,
}

/// Linear annealing of the importance sampling exponent $\beta$.
///
/// $\beta$ moves from `beta_0` to `beta_final` over `n_opts_final` priority
/// updates and stays at `beta_final` afterwards.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Value of $\beta$ before any update.
    pub beta_0: f32,

    /// Value of $\beta$ at the end of the schedule.
    pub beta_final: f32,

    /// Number of updates over which $\beta$ is annealed.
    pub n_opts_final: usize,

    /// Number of updates so far.
    pub n_opts: usize,
}

impl IwScheduler {
    /// Creates a scheduler at the start of its schedule.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// Current exponent.
    pub fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            return self.beta_final;
        }
        let progress = self.n_opts as f32 / self.n_opts_final as f32;
        self.beta_0 + (self.beta_final - self.beta_0) * progress
    }

    /// Advances the schedule by one priority update.
    pub fn add_n_opts(&mut self) {
        self.n_opts += 1;
    }
}

/// Computes normalized importance weights from sampling log-probabilities.
///
/// The weight is $w_i=\left(N P(i)\right)^{-\beta}$ divided by the maximum
/// weight, which belongs to the least probable transition. `N` cancels out, so
/// only the reference log-probability `log_p_min` is needed.
pub(super) fn importance_weights(log_probs: &[f32], beta: f32, log_p_min: f32) -> Vec<f32> {
    log_probs
        .iter()
        .map(|&lp| (-beta * (lp - log_p_min)).exp())
        .collect()
}
