//! Column storage of records.
use crate::{error::ReplayError, Shape};
use std::marker::PhantomData;

/// A column of fixed-width records addressed by slot number.
///
/// The same type serves both as the pre-allocated storage inside a buffer
/// and as the container of records passed in and out of it.
///
/// # Examples
///
/// ```ignore
/// struct TensorBatch {
///     data: Vec<f32>,
/// }
///
/// impl BatchBase for TensorBatch {
///     fn new(capacity: usize) -> Self {
///         Self { data: vec![0.0; capacity] }
///     }
///
///     fn len(&self) -> usize {
///         self.data.len()
///     }
///
///     fn set(&mut self, ixs: &[usize], data: &Self) {
///         for (k, &ix) in ixs.iter().enumerate() {
///             self.data[ix] = data.data[k];
///         }
///     }
///
///     fn sample(&self, ixs: &[usize]) -> Self {
///         Self { data: ixs.iter().map(|&ix| self.data[ix]).collect() }
///     }
/// }
/// ```
pub trait BatchBase: Sized {
    /// Allocates a column holding `capacity` records.
    fn new(capacity: usize) -> Self;

    /// Number of records in the column.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no record.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the `k`-th record of `data` into slot `ixs[k]`.
    ///
    /// When an index repeats, the record written last wins.
    fn set(&mut self, ixs: &[usize], data: &Self);

    /// Gathers the records at `ixs` into a new column.
    fn sample(&self, ixs: &[usize]) -> Self;
}

/// A dense column of records with a static shape `S`.
///
/// Records are stored row-major in one contiguous vector, so a column of
/// `n` records holds `n * S::width()` elements.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayBatch<T, S> {
    data: Vec<T>,
    phantom: PhantomData<S>,
}

impl<T, S> ArrayBatch<T, S>
where
    T: Copy + Default,
    S: Shape,
{
    /// Builds a column from row-major elements.
    ///
    /// Fails with [`ReplayError::ShapeMismatch`] if the number of elements is
    /// not a multiple of the record width.
    pub fn from_vec(data: Vec<T>) -> Result<Self, ReplayError> {
        let width = S::width();
        if width == 0 || data.len() % width != 0 {
            return Err(ReplayError::ShapeMismatch(format!(
                "{} elements do not form records of shape {:?}",
                data.len(),
                S::shape()
            )));
        }
        Ok(Self {
            data,
            phantom: PhantomData,
        })
    }

    /// Returns the `i`-th record.
    pub fn row(&self, i: usize) -> &[T] {
        let width = S::width();
        &self.data[i * width..(i + 1) * width]
    }

    /// Returns the elements as a flat slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consumes the column and returns its elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T, S> BatchBase for ArrayBatch<T, S>
where
    T: Copy + Default,
    S: Shape,
{
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity * S::width()],
            phantom: PhantomData,
        }
    }

    fn len(&self) -> usize {
        self.data.len() / S::width()
    }

    fn set(&mut self, ixs: &[usize], data: &Self) {
        let width = S::width();
        for (k, &ix) in ixs.iter().enumerate() {
            self.data[ix * width..(ix + 1) * width].copy_from_slice(data.row(k));
        }
    }

    fn sample(&self, ixs: &[usize]) -> Self {
        let mut data = Vec::with_capacity(ixs.len() * S::width());
        for &ix in ixs.iter() {
            data.extend_from_slice(self.row(ix));
        }
        Self {
            data,
            phantom: PhantomData,
        }
    }
}
