//! Prioritized experience replay over the ring buffer storage.
use super::{
    iw_scheduler::importance_weights, IwScheduler, NstepBatch, NstepReplayBuffer,
    NstepReplayBufferConfig, PerConfig, SumTree, TransitionRecords, WeightNormalizer,
};
use crate::{error::ReplayError, BatchBase, ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use log::{debug, trace};
use rand::{rngs::StdRng, Rng};
use std::ops::Range;

/// Draws per segment before snapping to the nearest sampleable start.
const MAX_REDRAWS: usize = 32;

/// Added to TD errors before taking their `alpha`-th power.
const TD_ERR_EPS: f32 = 1e-6;

/// A ring buffer whose samples are drawn in proportion to their priorities.
///
/// Slot `i` of the underlying [`NstepReplayBuffer`] has its priority stored at
/// leaf `i` of a [`SumTree`]. New transitions receive the largest priority
/// seen so far, so they are likely to be replayed before their TD error is
/// known.
///
/// ```
/// use border_replay::{
///     shape, ArrayBatch, NstepReplayBufferConfig, PerConfig, PrioritizedReplayBuffer,
/// };
///
/// shape!(ObsShape, [1]);
/// type Column = ArrayBatch<f32, ObsShape>;
///
/// let config = NstepReplayBufferConfig::default()
///     .capacity(8)
///     .nstep(1)
///     .per_config(Some(PerConfig::default()));
/// let mut buffer = PrioritizedReplayBuffer::<Column, Column>::new(&config).unwrap();
///
/// let obs = Column::from_vec((0..8).map(|t| t as f32).collect()).unwrap();
/// buffer.add_batch(&obs, &obs, &[0.0; 8], &[false; 8]).unwrap();
///
/// let batch = buffer.sample(4).unwrap();
/// let ixs = batch.ix_sample.unwrap();
/// buffer.update_priorities(&ixs, &[0.5, 2.0, 1.0, 0.1]).unwrap();
/// ```
pub struct PrioritizedReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    base: NstepReplayBuffer<O, A>,

    sum_tree: SumTree,

    iw_scheduler: IwScheduler,

    /// Priority given to new transitions.
    max_priority: f32,

    start_max_priority: f32,

    alpha: f32,

    normalize: WeightNormalizer,
}

impl<O, A> PrioritizedReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates a buffer with a generator seeded from `config.seed`.
    ///
    /// The default [`PerConfig`] is used if `config.per_config` is `None`.
    pub fn new(config: &NstepReplayBufferConfig) -> Result<Self, ReplayError> {
        let base = NstepReplayBuffer::new(config)?;
        Self::with_base(base, config)
    }

    /// Creates a buffer that samples with the given generator.
    pub fn with_rng(config: &NstepReplayBufferConfig, rng: StdRng) -> Result<Self, ReplayError> {
        let base = NstepReplayBuffer::with_rng(config, rng)?;
        Self::with_base(base, config)
    }

    fn with_base(
        base: NstepReplayBuffer<O, A>,
        config: &NstepReplayBufferConfig,
    ) -> Result<Self, ReplayError> {
        let per_config = config.per_config.clone().unwrap_or_default();
        per_config.check()?;
        debug!("Prioritized replay: {:?}", per_config);

        Ok(Self {
            sum_tree: SumTree::new(base.capacity()),
            base,
            iw_scheduler: IwScheduler::new(
                per_config.beta_0,
                per_config.beta_final,
                per_config.n_opts_final,
            ),
            max_priority: per_config.start_max_priority,
            start_max_priority: per_config.start_max_priority,
            alpha: per_config.alpha,
            normalize: per_config.normalize,
        })
    }

    /// The underlying ring buffer.
    pub fn base(&self) -> &NstepReplayBuffer<O, A> {
        &self.base
    }

    /// The sum tree holding the priorities.
    pub fn sum_tree(&self) -> &SumTree {
        &self.sum_tree
    }

    /// Priority given to new transitions.
    pub fn max_priority(&self) -> f32 {
        self.max_priority
    }

    /// Lowers the priority of new transitions to the largest priority
    /// currently in the tree, or to the starting priority if the tree is empty.
    pub fn reset_max_priority(&mut self) {
        let p = self.sum_tree.max();
        self.max_priority = if p > 0.0 { p } else { self.start_max_priority };
    }

    /// Current exponent of importance sampling weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    /// Number of valid transitions.
    pub fn size(&self) -> usize {
        self.base.size()
    }

    /// Returns `true` if enough transitions are stored to start sampling.
    pub fn is_ready(&self) -> bool {
        self.base.is_ready()
    }

    /// Adds a single transition with the current maximal priority.
    pub fn add(
        &mut self,
        obs: &O,
        act: &A,
        reward: f32,
        reset: bool,
    ) -> Result<usize, ReplayError> {
        let ix = self.base.add(obs, act, reward, reset)?;
        self.sum_tree.replace(ix, self.max_priority)?;
        Ok(ix)
    }

    /// Adds a batch of transitions with the current maximal priority.
    pub fn add_batch(
        &mut self,
        obs: &O,
        act: &A,
        reward: &[f32],
        reset: &[bool],
    ) -> Result<Vec<usize>, ReplayError> {
        let ixs = self.base.add_batch(obs, act, reward, reset)?;
        let ps = vec![self.max_priority; ixs.len()];
        self.sum_tree.replace_batch(&ixs, &ps)?;
        Ok(ixs)
    }

    /// Reads the n-step windows starting at `ixs`.
    pub fn get(&self, ixs: &[usize]) -> Result<NstepBatch<O, A>, ReplayError> {
        self.base.get(ixs)
    }

    /// Samples `count` windows in proportion to their priorities.
    ///
    /// Only starts whose window lies in contiguous, valid data are
    /// candidates. Their total priority is split into `count` segments of
    /// equal mass and one value is drawn uniformly within each. The batch
    /// carries the sampled slots in `ix_sample`, the log-probabilities
    /// `ln p_i - ln sum_j p_j` over the whole tree in `log_prob`, and
    /// normalized importance weights in `weight`.
    pub fn sample(&mut self, count: usize) -> Result<NstepBatch<O, A>, ReplayError> {
        let ixs = self.sample_indices(count)?;
        trace!("Sampled indices: {:?}", ixs);
        let mut batch = self.base.get(&ixs)?;

        let log_total = self.sum_tree.sum().ln();
        let log_prob = self
            .sum_tree
            .get_values(&ixs)
            .iter()
            .map(|p| p.ln() - log_total)
            .collect::<Vec<_>>();
        let log_p_min = match self.normalize {
            WeightNormalizer::All => self
                .sum_tree
                .min()
                .map_or(0.0, |p_min| p_min.ln() - log_total),
            WeightNormalizer::Batch => log_prob.iter().cloned().fold(f32::INFINITY, f32::min),
        };
        let weight = importance_weights(&log_prob, self.iw_scheduler.beta(), log_p_min);

        batch.ix_sample = Some(ixs);
        batch.log_prob = Some(log_prob);
        batch.weight = Some(weight);
        Ok(batch)
    }

    fn sample_indices(&mut self, count: usize) -> Result<Vec<usize>, ReplayError> {
        // Cumulative priority intervals of the sampleable starts
        let ranges = self.base.sampleable_ranges();
        let intervals = ranges.clone().map(|r| {
            (
                self.sum_tree.prefix_sum(r.start),
                self.sum_tree.prefix_sum(r.end),
            )
        });
        let len0 = (intervals[0].1 - intervals[0].0).max(0.0);
        let mass = len0 + (intervals[1].1 - intervals[1].0).max(0.0);
        // NaN mass is rejected as well
        if mass.is_nan() || mass <= 0.0 {
            return Err(self.insufficient_data());
        }

        let mut ixs = Vec::with_capacity(count);
        for j in 0..count {
            let lo = mass * j as f32 / count as f32;
            let hi = mass * (j + 1) as f32 / count as f32;
            let mut n_draws = 0;
            let ix = loop {
                let u = if hi > lo {
                    self.base.rng_mut().gen_range(lo..hi)
                } else {
                    lo
                };
                let (r, s) = if u < len0 {
                    (0, intervals[0].0 + u)
                } else {
                    (1, intervals[1].0 + (u - len0))
                };
                let ix = self.sum_tree.retrieve(s);
                // Rounding can land on the boundary of an interval
                if self.base.is_sampleable(ix) && self.sum_tree.get_value(ix) > 0.0 {
                    break ix;
                }
                n_draws += 1;
                if n_draws == MAX_REDRAWS {
                    // The segment is narrower than the float step at `s`
                    break self
                        .nearest_positive(ranges[r].clone(), ix)
                        .or_else(|| self.nearest_positive(ranges[1 - r].clone(), ix))
                        .ok_or_else(|| self.insufficient_data())?;
                }
            };
            ixs.push(ix);
        }
        Ok(ixs)
    }

    /// Slot in `range` with positive priority that is closest to `ix`.
    fn nearest_positive(&self, range: Range<usize>, ix: usize) -> Option<usize> {
        range
            .filter(|&i| self.sum_tree.get_value(i) > 0.0)
            .min_by_key(|&i| if i > ix { i - ix } else { ix - i })
    }

    fn insufficient_data(&self) -> ReplayError {
        ReplayError::InsufficientData {
            size: self.base.size(),
            nstep: self.base.nstep(),
        }
    }

    /// Sets the priorities of the transitions at `ixs`.
    ///
    /// Indices must lie in `[0, size)` and priorities must be finite and
    /// non-negative; otherwise nothing is written. The priority of new
    /// transitions is raised to the largest of `priorities`.
    pub fn update_priorities(
        &mut self,
        ixs: &[usize],
        priorities: &[f32],
    ) -> Result<(), ReplayError> {
        let size = self.base.size();
        if let Some(&index) = ixs.iter().find(|&&ix| ix >= size) {
            return Err(ReplayError::IndexOutOfRange { index, size });
        }
        self.sum_tree.replace_batch(ixs, priorities)?;

        let p_max = priorities.iter().cloned().fold(0f32, f32::max);
        if p_max > self.max_priority {
            debug!("Max priority: {} -> {}", self.max_priority, p_max);
            self.max_priority = p_max;
        }
        self.iw_scheduler.add_n_opts();
        Ok(())
    }

    /// Sets priorities from TD errors as $(|\delta| + \epsilon)^\alpha$.
    pub fn update_td_errors(&mut self, ixs: &[usize], td_errs: &[f32]) -> Result<(), ReplayError> {
        let priorities = td_errs
            .iter()
            .map(|e| (e.abs() + TD_ERR_EPS).powf(self.alpha))
            .collect::<Vec<_>>();
        self.update_priorities(ixs, &priorities)
    }
}

impl<O, A> ExperienceBufferBase for PrioritizedReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = TransitionRecords<O, A>;

    fn len(&self) -> usize {
        self.base.size()
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.add_batch(&tr.obs, &tr.act, &tr.reward, &tr.reset)?;
        Ok(())
    }
}

impl<O, A> ReplayBufferBase for PrioritizedReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = NstepReplayBufferConfig;
    type Batch = NstepBatch<O, A>;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self::new(config)?)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        Ok(self.sample(size)?)
    }

    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_err: &Option<Vec<f32>>,
    ) -> Result<()> {
        let ixs = ixs
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ixs should be Some(_) in update_priority()."))?;
        let td_err = td_err
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("td_err should be Some(_) in update_priority()."))?;
        Ok(self.update_td_errors(ixs, td_err)?)
    }
}

#[cfg(test)]
mod tests {
    use super::PrioritizedReplayBuffer;
    use crate::{
        error::ReplayError, shape, ArrayBatch, NstepReplayBufferConfig, PerConfig,
        ReplayBufferBase, WeightNormalizer,
    };
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use test_log::test;

    shape!(ObsShape, [1]);
    type Column = ArrayBatch<f32, ObsShape>;
    type Buffer = PrioritizedReplayBuffer<Column, Column>;

    fn buffer(capacity: usize, nstep: usize, per_config: PerConfig) -> Buffer {
        let config = NstepReplayBufferConfig::default()
            .capacity(capacity)
            .nstep(nstep)
            .seed(0)
            .per_config(Some(per_config));
        Buffer::new(&config).unwrap()
    }

    /// Adds steps `ts`, each with observation, action and reward `t`.
    fn add_steps(buffer: &mut Buffer, ts: std::ops::Range<usize>) -> Vec<usize> {
        let values = ts.map(|t| t as f32).collect::<Vec<_>>();
        let n = values.len();
        let column = Column::from_vec(values.clone()).unwrap();
        buffer
            .add_batch(&column, &column, &values, &vec![false; n])
            .unwrap()
    }

    #[test]
    fn test_uniform_priorities() {
        let mut buffer = buffer(8, 1, PerConfig::default());
        add_steps(&mut buffer, 0..8);
        assert_eq!(buffer.sum_tree().sum(), 8.0);

        let batch = buffer.sample(4).unwrap();
        let ixs = batch.ix_sample.as_ref().unwrap();
        let log_prob = batch.log_prob.as_ref().unwrap();
        assert_eq!(ixs.len(), 4);
        assert!(ixs.iter().all(|&ix| ix < buffer.size()));
        for lp in log_prob.iter() {
            assert_relative_eq!(lp.exp(), 1.0 / 8.0, max_relative = 1e-5);
        }
        // Sampling probabilities over all slots sum to one
        let total: f32 = (0..8)
            .map(|ix| buffer.sum_tree().get_value(ix) / buffer.sum_tree().sum())
            .sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-5);
        assert!(batch.weight.unwrap().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_stratified_segments() {
        let mut buffer = buffer(8, 1, PerConfig::default());
        add_steps(&mut buffer, 0..4);

        // With equal mass per slot, each of 3 segments covers exactly 1 slot
        // and slot 3 is not sampleable yet.
        for _ in 0..20 {
            let batch = buffer.sample(3).unwrap();
            assert_eq!(batch.ix_sample.unwrap(), vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_update_priorities() {
        let mut buffer = buffer(8, 1, PerConfig::default().start_max_priority(1.0));
        add_steps(&mut buffer, 0..6);

        buffer.update_priorities(&[0, 3], &[0.25, 4.0]).unwrap();
        assert_eq!(buffer.sum_tree().get_values(&[0, 3]), vec![0.25, 4.0]);
        assert_eq!(buffer.max_priority(), 4.0);
        assert_relative_eq!(buffer.sum_tree().sum(), 8.25);

        // New transitions are seeded with the raised maximum
        let ixs = add_steps(&mut buffer, 6..7);
        assert_eq!(buffer.sum_tree().get_value(ixs[0]), 4.0);

        // Lower priorities never decrease the maximum
        buffer.update_priorities(&[3], &[0.5]).unwrap();
        assert_eq!(buffer.max_priority(), 4.0);
        buffer.reset_max_priority();
        assert_eq!(buffer.max_priority(), 4.0);
        buffer.update_priorities(&[6], &[0.5]).unwrap();
        buffer.reset_max_priority();
        assert_eq!(buffer.max_priority(), 1.0);
    }

    #[test]
    fn test_invalid_update_leaves_priorities_unchanged() {
        let mut buffer = buffer(8, 1, PerConfig::default());
        add_steps(&mut buffer, 0..4);

        assert!(matches!(
            buffer.update_priorities(&[0, 1], &[2.0, -1.0]),
            Err(ReplayError::InvalidPriority { index: 1, .. })
        ));
        assert_eq!(
            buffer.update_priorities(&[0, 5], &[2.0, 2.0]),
            Err(ReplayError::IndexOutOfRange { index: 5, size: 4 })
        );
        assert!(matches!(
            buffer.update_priorities(&[0, 1], &[2.0]),
            Err(ReplayError::ShapeMismatch(_))
        ));
        assert_eq!(buffer.sum_tree().get_values(&[0, 1]), vec![1.0, 1.0]);
        assert_eq!(buffer.max_priority(), 1.0);
        assert_relative_eq!(buffer.beta(), 0.4);
    }

    #[test]
    fn test_sampling_frequencies_follow_priorities() {
        let mut buffer = buffer(16, 1, PerConfig::default());
        add_steps(&mut buffer, 0..16);
        let ps = (0..16).map(|ix| (ix % 4 + 1) as f32).collect::<Vec<_>>();
        let ixs = (0..16).collect::<Vec<_>>();
        buffer.update_priorities(&ixs, &ps).unwrap();

        let n_batches = 5_000;
        let mut counts = vec![0usize; 16];
        for _ in 0..n_batches {
            let batch = buffer.sample(32).unwrap();
            batch.ix_sample.unwrap().iter().for_each(|&ix| counts[ix] += 1);
        }

        // Slot 15 is right before the cursor and never sampled
        assert_eq!(counts[15], 0);
        let sampleable_mass: f32 = ps[..15].iter().sum();
        let n_total = (n_batches * 32) as f32;
        for ix in 0..15 {
            let expected = ps[ix] / sampleable_mass;
            assert_relative_eq!(counts[ix] as f32 / n_total, expected, max_relative = 0.1);
        }
    }

    #[test]
    fn test_sampled_windows_are_contiguous() {
        let mut buffer = buffer(12, 3, PerConfig::default());
        for t in 0..40 {
            add_steps(&mut buffer, t..t + 1);
            if !buffer.is_ready() {
                assert!(matches!(
                    buffer.sample(4),
                    Err(ReplayError::InsufficientData { .. })
                ));
                continue;
            }
            let batch = buffer.sample(8).unwrap();
            for k in 0..batch.len() {
                let start = batch.obs.row(k)[0];
                assert_eq!(batch.rewards(k), &[start, start + 1., start + 2.]);
                assert_eq!(batch.next_obs.row(k)[0], start + 3.);
            }
        }
    }

    #[test]
    fn test_extreme_priority_ratios() {
        // Segments much narrower than the float step of the cumulative sum
        let mut rng = StdRng::seed_from_u64(7);
        for &capacity in [5, 7, 12, 33, 100].iter() {
            for nstep in 1..=3 {
                let mut buffer = buffer(capacity, nstep, PerConfig::default());
                for t in 0..3 * capacity {
                    add_steps(&mut buffer, t..t + 1);
                    let size = buffer.size();
                    if size <= nstep {
                        continue;
                    }
                    let ixs = (0..size).collect::<Vec<_>>();
                    let ps = ixs
                        .iter()
                        .map(|_| 10f32.powf(rng.gen_range(-6.0..6.0)))
                        .collect::<Vec<_>>();
                    buffer.update_priorities(&ixs, &ps).unwrap();

                    let batch = buffer.sample(4096).unwrap();
                    for &ix in batch.ix_sample.as_ref().unwrap() {
                        assert!(buffer.base().is_sampleable(ix));
                        assert!(buffer.sum_tree().get_value(ix) > 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_importance_weights() {
        let per_config = PerConfig::default()
            .beta_0(1.0)
            .normalize(WeightNormalizer::All);
        let mut buffer = buffer(8, 1, per_config);
        add_steps(&mut buffer, 0..8);
        let ixs = (0..8).collect::<Vec<_>>();
        let ps = [1.0, 2.0, 4.0, 8.0, 1.0, 2.0, 4.0, 8.0];
        buffer.update_priorities(&ixs, &ps).unwrap();

        let batch = buffer.sample(16).unwrap();
        let weight = batch.weight.unwrap();
        for (ix, w) in batch.ix_sample.unwrap().iter().zip(weight.iter()) {
            // w_i / w_max = p_min / p_i with beta = 1
            assert_relative_eq!(*w, 1.0 / ps[*ix], max_relative = 1e-4);
        }
    }

    #[test]
    fn test_trait_interface() -> anyhow::Result<()> {
        let config = NstepReplayBufferConfig::default()
            .capacity(8)
            .nstep(1)
            .per_config(Some(PerConfig::default().alpha(0.5).n_opts_final(2)));
        let mut buffer = Buffer::build(&config)?;
        add_steps(&mut buffer, 0..8);

        let batch = buffer.batch(4)?;
        let ixs = batch.ix_sample.clone();
        buffer.update_priority(&ixs, &Some(vec![3.0; 4]))?;
        let p = (3.0f32 + 1e-6).powf(0.5);
        for ix in ixs.unwrap() {
            assert_relative_eq!(buffer.sum_tree().get_value(ix), p);
        }
        assert_relative_eq!(buffer.beta(), 0.7, max_relative = 1e-6);
        assert!(buffer.update_priority(&None, &None).is_err());
        Ok(())
    }
}
