//! Shape of records.
use core::fmt::Debug;

/// Shape of an observation or action record.
///
/// The shape is fixed for the lifetime of a buffer, which lets columns be
/// allocated once as dense arrays.
pub trait Shape: Clone + Debug {
    /// Returns the shape of a single record.
    fn shape() -> &'static [usize];

    /// Number of scalar elements in a single record.
    fn width() -> usize {
        Self::shape().iter().product()
    }
}

/// Defines a struct that implements [`Shape`](crate::Shape).
///
/// # Example
///
/// ```
/// use border_replay::{shape, Shape};
///
/// shape!(ObsShape, [4, 2]);
/// shape!(pub ActShape, [1]);
///
/// assert_eq!(ObsShape::shape(), &[4, 2]);
/// assert_eq!(ObsShape::width(), 8);
/// ```
#[macro_export]
macro_rules! shape {
    ($vis:vis $struct_:ident, [$($elem_:expr),+]) => {
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $struct_ {}
        impl $crate::Shape for $struct_ {
            fn shape() -> &'static [usize] {
                &[$($elem_),+]
            }
        }
    };
}
