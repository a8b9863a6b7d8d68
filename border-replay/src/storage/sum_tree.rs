//! Sum tree for prioritized sampling.
//!
//! Leaves hold non-negative priorities and every internal node holds the sum
//! of its two children. The tree is stored as an array of `2 * n - 1` nodes,
//! where `n` is the capacity rounded up to a power of two; leaves beyond the
//! capacity stay at zero and are never retrieved.
use crate::error::ReplayError;
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};

/// A sum tree used for prioritized experience replay.
#[derive(Debug)]
pub struct SumTree {
    capacity: usize,
    n_leaves: usize,
    tree: Vec<f32>,
    /// Positive priorities; zero leaves are kept at `f32::MAX`.
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    /// Creates a tree with `capacity` leaves, all at zero priority.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity of a sum tree must be positive");
        let n_leaves = capacity.next_power_of_two();
        Self {
            capacity,
            n_leaves,
            tree: vec![0f32; 2 * n_leaves - 1],
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        }
    }

    /// Number of leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn propagate(&mut self, ix: usize, change: f32) {
        let parent = (ix - 1) / 2;
        self.tree[parent] += change;
        if parent != 0 {
            self.propagate(parent, change);
        }
    }

    fn check(&self, ix: usize, p: f32) -> Result<(), ReplayError> {
        if ix >= self.capacity {
            return Err(ReplayError::IndexOutOfRange {
                index: ix,
                size: self.capacity,
            });
        }
        if !(p.is_finite() && p >= 0.0) {
            return Err(ReplayError::InvalidPriority {
                index: ix,
                priority: p,
            });
        }
        Ok(())
    }

    fn set_leaf(&mut self, ix: usize, p: f32) {
        self.min_tree.modify(ix, if p > 0.0 { p } else { f32::MAX });
        self.max_tree.modify(ix, p);

        let node = ix + self.n_leaves - 1;
        let change = p - self.tree[node];
        self.tree[node] = p;
        if node != 0 {
            self.propagate(node, change);
        }
    }

    /// Sets the priority of the `ix`-th leaf.
    pub fn replace(&mut self, ix: usize, p: f32) -> Result<(), ReplayError> {
        self.check(ix, p)?;
        self.set_leaf(ix, p);
        Ok(())
    }

    /// Sets the priorities of several leaves.
    ///
    /// Every pair is validated before the first write, so a failure leaves the
    /// tree unchanged.
    pub fn replace_batch(&mut self, ixs: &[usize], ps: &[f32]) -> Result<(), ReplayError> {
        if ixs.len() != ps.len() {
            return Err(ReplayError::ShapeMismatch(format!(
                "{} indices but {} priorities",
                ixs.len(),
                ps.len()
            )));
        }
        for (&ix, &p) in ixs.iter().zip(ps.iter()) {
            self.check(ix, p)?;
        }
        for (&ix, &p) in ixs.iter().zip(ps.iter()) {
            self.set_leaf(ix, p);
        }
        Ok(())
    }

    /// Total priority of all leaves.
    pub fn sum(&self) -> f32 {
        self.tree[0]
    }

    /// Total priority of the leaves `[0, end)`.
    pub fn prefix_sum(&self, end: usize) -> f32 {
        if end >= self.capacity {
            return self.sum();
        }
        let mut node = end + self.n_leaves - 1;
        let mut s = 0f32;
        while node != 0 {
            // A right child has an even index; its left sibling precedes it.
            if node % 2 == 0 {
                s += self.tree[node - 1];
            }
            node = (node - 1) / 2;
        }
        s
    }

    /// Priority of the `ix`-th leaf.
    ///
    /// `ix` must be less than the capacity, which is only checked in debug
    /// builds.
    pub fn get_value(&self, ix: usize) -> f32 {
        debug_assert!(ix < self.capacity, "leaf index {} out of range", ix);
        self.tree[ix + self.n_leaves - 1]
    }

    /// Priorities of the leaves at `ixs`.
    pub fn get_values(&self, ixs: &[usize]) -> Vec<f32> {
        ixs.iter().map(|&ix| self.get_value(ix)).collect()
    }

    /// Smallest positive priority, or `None` if every leaf is zero.
    pub fn min(&self) -> Option<f32> {
        let p = self.min_tree.query(0, self.capacity);
        if p < f32::MAX {
            Some(p)
        } else {
            None
        }
    }

    /// Largest priority.
    pub fn max(&self) -> f32 {
        self.max_tree.query(0, self.capacity)
    }

    /// Returns the leaf at which the cumulative priority passes `s`.
    ///
    /// Descending from the root, `s` goes left if it is below the left
    /// child's sum and right otherwise, minus the left sum. A value at or
    /// above [`sum`](Self::sum), which rounding can produce, ends at the last
    /// leaf with positive priority.
    pub fn retrieve(&self, s: f32) -> usize {
        let mut ix = 0;
        let mut s = s.max(0.0);
        while ix < self.n_leaves - 1 {
            let left = 2 * ix + 1;
            let right = left + 1;
            if s < self.tree[left] || self.tree[right] <= 0.0 {
                ix = left;
            } else {
                s -= self.tree[left];
                ix = right;
            }
        }
        ix + 1 - self.n_leaves
    }

    /// Applies [`retrieve`](Self::retrieve) to each value independently.
    pub fn retrieve_batch(&self, ss: &[f32]) -> Vec<usize> {
        ss.iter().map(|&s| self.retrieve(s)).collect()
    }
}
