//! Circular storage of transitions with uniform n-step sampling.
use super::{
    batch::check_lengths, NstepBatch, NstepReplayBufferConfig, TransitionRecords, TransitionTable,
};
use crate::{error::ReplayError, BatchBase, ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use log::{debug, info, trace, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::ops::Range;

/// A fixed-capacity ring buffer of transitions read in n-step windows.
///
/// Transitions are written at a cursor that wraps around once `capacity`
/// slots have been filled, overwriting the oldest data. A window starting at
/// slot `i` covers the rewards and episode-end flags of slots
/// `i, ..., i + nstep - 1` and the observation at `i + nstep`, all modulo the
/// capacity.
///
/// # Type Parameters
///
/// * `O` - Column type of observations
/// * `A` - Column type of actions
pub struct NstepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,

    nstep: usize,

    init_size: usize,

    /// Next slot to be written.
    i: usize,

    /// Set once the cursor has completed its first lap.
    is_full: bool,

    table: TransitionTable<O, A>,

    rng: StdRng,
}

impl<O, A> NstepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates a buffer with a generator seeded from `config.seed`.
    pub fn new(config: &NstepReplayBufferConfig) -> Result<Self, ReplayError> {
        Self::with_rng(config, StdRng::seed_from_u64(config.seed))
    }

    /// Creates a buffer that samples with the given generator.
    pub fn with_rng(config: &NstepReplayBufferConfig, rng: StdRng) -> Result<Self, ReplayError> {
        config.check()?;
        info!(
            "Create replay buffer: capacity = {}, nstep = {}",
            config.capacity, config.nstep
        );

        Ok(Self {
            capacity: config.capacity,
            nstep: config.nstep,
            init_size: config.init_size,
            i: 0,
            is_full: false,
            table: TransitionTable::new(config.capacity),
            rng,
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the n-step window.
    pub fn nstep(&self) -> usize {
        self.nstep
    }

    /// Next slot to be written.
    pub fn write_cursor(&self) -> usize {
        self.i
    }

    /// Returns `true` once `capacity` transitions have been added.
    pub fn is_full(&self) -> bool {
        self.is_full
    }

    /// Number of valid transitions.
    pub fn size(&self) -> usize {
        if self.is_full {
            self.capacity
        } else {
            self.i
        }
    }

    /// Returns `true` if enough transitions are stored to start sampling.
    pub fn is_ready(&self) -> bool {
        self.size() >= self.init_size.max(self.nstep + 1)
    }

    /// Adds a single transition and returns its slot.
    ///
    /// `obs` and `act` must each hold exactly one record.
    pub fn add(
        &mut self,
        obs: &O,
        act: &A,
        reward: f32,
        reset: bool,
    ) -> Result<usize, ReplayError> {
        check_lengths(obs.len(), act.len(), 1, 1)?;
        let ix = self.i;
        self.table.set(&[ix], obs, act, &[reward], &[reset]);
        self.advance(1);
        Ok(ix)
    }

    /// Adds a batch of transitions and returns their slots in order.
    ///
    /// The slots wrap around the end of the buffer. If the columns differ in
    /// length, nothing is written and [`ReplayError::ShapeMismatch`] is returned.
    pub fn add_batch(
        &mut self,
        obs: &O,
        act: &A,
        reward: &[f32],
        reset: &[bool],
    ) -> Result<Vec<usize>, ReplayError> {
        let batch_size = obs.len();
        check_lengths(batch_size, act.len(), reward.len(), reset.len())?;

        let ixs = (0..batch_size)
            .map(|k| (self.i + k) % self.capacity)
            .collect::<Vec<_>>();
        self.table.set(&ixs, obs, act, reward, reset);
        self.advance(batch_size);
        Ok(ixs)
    }

    fn advance(&mut self, n: usize) {
        if !self.is_full && self.i + n >= self.capacity {
            self.is_full = true;
            debug!("Replay buffer is full: capacity = {}", self.capacity);
        }
        self.i = (self.i + n) % self.capacity;
    }

    /// Reads the n-step windows starting at `ixs`.
    ///
    /// Every index must lie in `[0, size)`.
    pub fn get(&self, ixs: &[usize]) -> Result<NstepBatch<O, A>, ReplayError> {
        let size = self.size();
        if let Some(&index) = ixs.iter().find(|&&ix| ix >= size) {
            return Err(ReplayError::IndexOutOfRange { index, size });
        }
        Ok(self.table.get(ixs, self.nstep))
    }

    /// Samples `count` windows uniformly from the sampleable starts.
    pub fn sample(&mut self, count: usize) -> Result<NstepBatch<O, A>, ReplayError> {
        let ixs = self.sample_indices(count)?;
        trace!("Sampled indices: {:?}", ixs);
        let mut batch = self.get(&ixs)?;
        batch.ix_sample = Some(ixs);
        Ok(batch)
    }

    fn sample_indices(&mut self, count: usize) -> Result<Vec<usize>, ReplayError> {
        let n = self.num_sampleable();
        if n == 0 {
            return Err(ReplayError::InsufficientData {
                size: self.size(),
                nstep: self.nstep,
            });
        }
        Ok((0..count)
            .map(|_| {
                let k = self.rng.gen_range(0..n);
                self.sampleable_start(k)
            })
            .collect())
    }

    /// Number of starts whose window lies in contiguous, valid data.
    pub(super) fn num_sampleable(&self) -> usize {
        self.size().saturating_sub(self.nstep)
    }

    /// Maps `k` in `[0, num_sampleable)` one-to-one onto the sampleable starts.
    ///
    /// Once full, the starts `[i - nstep, i)` before the cursor `i` are
    /// excluded, since their windows would run into the newest data.
    fn sampleable_start(&self, k: usize) -> usize {
        if !self.is_full {
            return k;
        }
        if self.i < self.nstep {
            // The excluded starts wrap around slot 0; sampleable ones are
            // [i, i + capacity - nstep).
            return k + self.i;
        }
        let nosample_ix = (self.i + self.capacity - self.nstep) % self.capacity;
        if k >= nosample_ix {
            (k + self.nstep) % self.capacity
        } else {
            k
        }
    }

    /// Returns `true` if the window starting at `ix` lies in contiguous,
    /// valid data.
    pub fn is_sampleable(&self, ix: usize) -> bool {
        if !self.is_full {
            return ix + self.nstep < self.i;
        }
        if ix >= self.capacity {
            return false;
        }
        // Distance from the oldest slot, which is the cursor itself
        let age = (ix + self.capacity - self.i) % self.capacity;
        age < self.capacity - self.nstep
    }

    /// Slot ranges holding the sampleable starts, in increasing order of age.
    pub(super) fn sampleable_ranges(&self) -> [Range<usize>; 2] {
        if !self.is_full {
            [0..self.num_sampleable(), 0..0]
        } else if self.i < self.nstep {
            [self.i..self.i + self.capacity - self.nstep, 0..0]
        } else {
            [self.i..self.capacity, 0..self.i - self.nstep]
        }
    }

    pub(super) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Sum of the rewards of the valid transitions.
    pub fn sum_rewards(&self) -> f32 {
        self.table.sum_rewards(self.size())
    }

    /// Number of episode ends among the valid transitions.
    pub fn num_resets(&self) -> usize {
        self.table.num_resets(self.size())
    }
}

impl<O, A> ExperienceBufferBase for NstepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = TransitionRecords<O, A>;

    fn len(&self) -> usize {
        self.size()
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.add_batch(&tr.obs, &tr.act, &tr.reward, &tr.reset)?;
        Ok(())
    }
}

impl<O, A> ReplayBufferBase for NstepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = NstepReplayBufferConfig;
    type Batch = NstepBatch<O, A>;

    fn build(config: &Self::Config) -> Result<Self> {
        if config.per_config.is_some() {
            warn!("per_config is ignored by NstepReplayBuffer");
        }
        Ok(Self::new(config)?)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        Ok(self.sample(size)?)
    }

    fn update_priority(
        &mut self,
        _ixs: &Option<Vec<usize>>,
        _td_err: &Option<Vec<f32>>,
    ) -> Result<()> {
        Ok(())
    }
}
