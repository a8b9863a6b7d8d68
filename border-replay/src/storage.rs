//! Ring buffer storage of transitions with n-step windows.
//!
//! [`NstepReplayBuffer`] owns a [`TransitionTable`] and a circular write cursor.
//! [`PrioritizedReplayBuffer`] composes it with a [`SumTree`] of the same
//! capacity: slot `i` of the buffer corresponds to leaf `i` of the tree.
mod batch;
mod config;
mod iw_scheduler;
mod prioritized;
mod ring;
mod sum_tree;
mod table;
pub use batch::{NstepBatch, TransitionRecords};
pub use config::{NstepReplayBufferConfig, PerConfig};
pub use iw_scheduler::{IwScheduler, WeightNormalizer};
pub use prioritized::PrioritizedReplayBuffer;
pub use ring::NstepReplayBuffer;
pub use sum_tree::SumTree;
pub use table::TransitionTable;
