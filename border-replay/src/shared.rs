//! A replay buffer shared between threads.
use crate::{ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle of a replay buffer guarded by a mutex.
///
/// Clones refer to the same buffer, so samplers can push experiences from
/// their own threads while a trainer draws batches and updates priorities.
/// Every operation holds the lock for its whole duration; a sampled batch is
/// never observed half-written.
pub struct SharedReplayBuffer<R> {
    buffer: Arc<Mutex<R>>,
}

impl<R> Clone for SharedReplayBuffer<R> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<R> SharedReplayBuffer<R> {
    /// Wraps a replay buffer.
    pub fn new(buffer: R) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(buffer)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, R>> {
        self.buffer
            .lock()
            .map_err(|_| anyhow::anyhow!("Replay buffer mutex was poisoned"))
    }

    /// Runs `f` with exclusive access to the buffer.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> Result<T> {
        let mut buffer = self.lock()?;
        Ok(f(&mut buffer))
    }
}

impl<R: ExperienceBufferBase> SharedReplayBuffer<R> {
    /// Pushes experiences into the buffer.
    pub fn push(&self, item: R::Item) -> Result<()> {
        self.lock()?.push(item)
    }

    /// Returns the number of experiences in the buffer.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

impl<R: ReplayBufferBase> SharedReplayBuffer<R> {
    /// Samples a batch of `size` experiences.
    pub fn batch(&self, size: usize) -> Result<R::Batch> {
        self.lock()?.batch(size)
    }

    /// Updates the priorities of sampled experiences.
    pub fn update_priority(
        &self,
        ixs: &Option<Vec<usize>>,
        td_err: &Option<Vec<f32>>,
    ) -> Result<()> {
        self.lock()?.update_priority(ixs, td_err)
    }
}
