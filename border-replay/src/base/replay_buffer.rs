//! Replay buffer interface.
//!
//! These traits are the seams between a buffer and the processes around it:
//! samplers push experiences through [`ExperienceBufferBase`], trainers pull
//! batches and feed back priorities through [`ReplayBufferBase`].
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// Items pushed into the buffer.
    type Item;

    /// Pushes experiences into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no experience.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters of the buffer.
    type Config: Clone;

    /// Batch generated for training.
    type Batch;

    /// Builds a replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Samples a batch of `size` experiences.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of sampled experiences from their TD errors.
    ///
    /// Buffers without priorities accept the call and do nothing.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>)
        -> Result<()>;
}
