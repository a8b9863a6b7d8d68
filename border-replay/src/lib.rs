#![warn(missing_docs)]
//! Experience replay storage for off-policy reinforcement learning.
//!
//! The crate provides a fixed-capacity ring buffer of transitions that returns
//! n-step windows for bootstrapped targets, and a prioritized variant that
//! samples transitions in proportion to their priorities with a sum tree.
//!
//! # Key Components
//!
//! - [`NstepReplayBuffer`]: circular storage with uniform sampling
//! - [`PrioritizedReplayBuffer`]: the same storage paired with a [`SumTree`]
//! - [`ArrayBatch`]: a dense, pre-allocated column of fixed-width records
//! - [`SharedReplayBuffer`]: a mutex-guarded handle for multi-threaded use
//!
//! # Examples
//!
//! ```
//! use border_replay::{
//!     shape, ArrayBatch, NstepReplayBuffer, NstepReplayBufferConfig,
//! };
//!
//! shape!(ObsShape, [2]);
//! shape!(ActShape, [1]);
//! type ObsBatch = ArrayBatch<f32, ObsShape>;
//! type ActBatch = ArrayBatch<i64, ActShape>;
//!
//! let config = NstepReplayBufferConfig::default().capacity(16).nstep(3);
//! let mut buffer = NstepReplayBuffer::<ObsBatch, ActBatch>::new(&config).unwrap();
//!
//! for t in 0..10 {
//!     let obs = ObsBatch::from_vec(vec![t as f32, 0.0]).unwrap();
//!     let act = ActBatch::from_vec(vec![t % 2]).unwrap();
//!     buffer.add(&obs, &act, 1.0, false).unwrap();
//! }
//!
//! let batch = buffer.sample(4).unwrap();
//! assert_eq!(batch.len(), 4);
//! assert_eq!(batch.reward.len(), 4 * 3);
//! ```
mod base;
pub mod error;
mod shape;
mod shared;
mod storage;

pub use base::{ArrayBatch, BatchBase, ExperienceBufferBase, ReplayBufferBase};
pub use error::ReplayError;
pub use shape::Shape;
pub use shared::SharedReplayBuffer;
pub use storage::{
    IwScheduler, NstepBatch, NstepReplayBuffer, NstepReplayBufferConfig, PerConfig,
    PrioritizedReplayBuffer, SumTree, TransitionRecords, TransitionTable, WeightNormalizer,
};
