//! Batches going into and out of the storage.
use crate::{error::ReplayError, BatchBase};

/// Transitions pushed into a buffer, stored column-wise.
///
/// `reset[k]` is `true` if the `k`-th transition ends an episode.
#[derive(Clone, Debug)]
pub struct TransitionRecords<O, A> {
    /// Observations.
    pub obs: O,

    /// Actions taken on the observations.
    pub act: A,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Episode-end flags.
    pub reset: Vec<bool>,
}

impl<O, A> TransitionRecords<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Bundles the columns, checking that they share their leading length.
    pub fn new(obs: O, act: A, reward: Vec<f32>, reset: Vec<bool>) -> Result<Self, ReplayError> {
        check_lengths(obs.len(), act.len(), reward.len(), reset.len())?;
        Ok(Self {
            obs,
            act,
            reward,
            reset,
        })
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if there is no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }
}

pub(super) fn check_lengths(
    n_obs: usize,
    n_act: usize,
    n_reward: usize,
    n_reset: usize,
) -> Result<(), ReplayError> {
    if n_obs != n_act || n_obs != n_reward || n_obs != n_reset {
        return Err(ReplayError::ShapeMismatch(format!(
            "observations, actions, rewards, and resets all must have the same \
             first dimension, got first dim sizes: {}, {}, {}, {}",
            n_obs, n_act, n_reward, n_reset
        )));
    }
    Ok(())
}

/// A batch of n-step windows read from a buffer.
///
/// For the `k`-th window starting at slot `i`, `obs` and `act` hold the records
/// at `i`, `next_obs` holds the observation at `i + nstep`, and
/// `reward`/`reset` hold the `nstep` values from `i` onwards, laid out
/// row-major: `reward[k * nstep + j]` is the reward at slot `i + j`.
#[derive(Clone, Debug)]
pub struct NstepBatch<O, A> {
    /// Observations at the window starts.
    pub obs: O,

    /// Actions at the window starts.
    pub act: A,

    /// Observations `nstep` slots after the window starts.
    pub next_obs: O,

    /// Rewards, `nstep` per window.
    pub reward: Vec<f32>,

    /// Episode-end flags, `nstep` per window.
    pub reset: Vec<bool>,

    /// Length of each window.
    pub nstep: usize,

    /// Slot indices of the window starts, set by sampling.
    pub ix_sample: Option<Vec<usize>>,

    /// Log-probabilities with which the windows were sampled.
    pub log_prob: Option<Vec<f32>>,

    /// Importance sampling weights.
    pub weight: Option<Vec<f32>>,
}

impl<O, A> NstepBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Number of windows in the batch.
    pub fn len(&self) -> usize {
        self.obs.len()
    }

    /// Returns `true` if the batch holds no window.
    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }

    /// Rewards of the `k`-th window.
    pub fn rewards(&self, k: usize) -> &[f32] {
        &self.reward[k * self.nstep..(k + 1) * self.nstep]
    }

    /// Episode-end flags of the `k`-th window.
    pub fn resets(&self, k: usize) -> &[bool] {
        &self.reset[k * self.nstep..(k + 1) * self.nstep]
    }
}
