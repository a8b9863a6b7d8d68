//! Errors in the library.
use thiserror::Error;

/// Errors raised by replay buffer operations.
///
/// All of them are validation failures of caller input. An operation that
/// returns an error has not modified the buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// Arrays passed together do not share their leading length.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A slot index lies outside the valid region.
    #[error("Index out of range(0, {size}): {index}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Upper bound (exclusive) of valid indices.
        size: usize,
    },

    /// A priority is negative or not finite.
    #[error("Invalid priority {priority} at index {index}")]
    InvalidPriority {
        /// Slot index the priority was meant for.
        index: usize,
        /// The offending priority.
        priority: f32,
    },

    /// No stored transition has a complete n-step window yet.
    #[error("Not enough transitions to sample: size = {size}, nstep = {nstep}")]
    InsufficientData {
        /// Number of stored transitions.
        size: usize,
        /// Length of the n-step window.
        nstep: usize,
    },

    /// The configuration cannot describe a valid buffer.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
