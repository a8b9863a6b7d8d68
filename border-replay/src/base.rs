//! Core interfaces shared by replay buffers.
mod batch;
mod replay_buffer;
pub use batch::{ArrayBatch, BatchBase};
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
