//! Column-wise storage of transitions.
use super::NstepBatch;
use crate::BatchBase;

/// Parallel columns of observations, actions, rewards and episode-end flags.
///
/// The table performs no range checks; its owner guarantees that indices
/// lie in `[0, capacity)`.
pub struct TransitionTable<O, A> {
    capacity: usize,
    obs: O,
    act: A,
    reward: Vec<f32>,
    reset: Vec<bool>,
}

impl<O, A> TransitionTable<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Allocates every column with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            obs: O::new(capacity),
            act: A::new(capacity),
            reward: vec![0.; capacity],
            reset: vec![false; capacity],
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Writes the `k`-th transition into slot `ixs[k]`.
    pub fn set(&mut self, ixs: &[usize], obs: &O, act: &A, reward: &[f32], reset: &[bool]) {
        self.obs.set(ixs, obs);
        self.act.set(ixs, act);
        for (k, &ix) in ixs.iter().enumerate() {
            self.reward[ix] = reward[k];
            self.reset[ix] = reset[k];
        }
    }

    /// Reads the `nstep` windows starting at `ixs`, wrapping modulo capacity.
    pub fn get(&self, ixs: &[usize], nstep: usize) -> NstepBatch<O, A> {
        let mut reward = Vec::with_capacity(ixs.len() * nstep);
        let mut reset = Vec::with_capacity(ixs.len() * nstep);
        for &ix in ixs.iter() {
            for j in 0..nstep {
                let i = (ix + j) % self.capacity;
                reward.push(self.reward[i]);
                reset.push(self.reset[i]);
            }
        }
        let next_ixs = ixs
            .iter()
            .map(|&ix| (ix + nstep) % self.capacity)
            .collect::<Vec<_>>();

        NstepBatch {
            obs: self.obs.sample(ixs),
            act: self.act.sample(ixs),
            next_obs: self.obs.sample(&next_ixs),
            reward,
            reset,
            nstep,
            ix_sample: None,
            log_prob: None,
            weight: None,
        }
    }

    /// Sum of the rewards in the first `n` slots.
    pub fn sum_rewards(&self, n: usize) -> f32 {
        self.reward[..n].iter().sum()
    }

    /// Number of episode-end flags in the first `n` slots.
    pub fn num_resets(&self, n: usize) -> usize {
        self.reset[..n].iter().filter(|&&r| r).count()
    }
}
