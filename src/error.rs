//! Errors reported by the training engine.

use std::error;
use std::fmt;

use ndarray::ShapeError;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by layers, networks, updaters and trainers.
///
/// Nothing is retried internally; a failed step aborts the batch it belongs
/// to and the error is handed back to the caller.
#[derive(Debug)]
pub enum Error {
    /// Two tensors that must share a shape do not.
    ShapeMismatch {
        /// What was being compared (e.g. a parameter set name).
        what: String,
        /// The shape that was required.
        expected: Vec<usize>,
        /// The shape that was provided.
        got: Vec<usize>,
    },

    /// A vector argument has the wrong length for the operation.
    InvalidShape {
        /// Which argument was rejected.
        what: &'static str,
        /// The required length.
        expected: usize,
        /// The provided length.
        got: usize,
    },

    /// A parameter set name that the receiver does not own.
    UnknownParameter(String),

    /// A division whose denominator was zero.
    DivisionByZero(&'static str),

    /// `ParameterUpdater::adjust` was called without any batch elements.
    EmptyBatch,

    /// The number of per-layer batches differs from the number of layers.
    LayerCountMismatch {
        /// Number of layers in the network.
        expected: usize,
        /// Number of batches provided.
        got: usize,
    },

    /// A constructor or builder received arguments it cannot accept.
    InvalidConfiguration(String),

    /// An `ndarray` reshape failed.
    Ndarray(ShapeError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ShapeMismatch { what, expected, got } => write!(
                f,
                "shape mismatch for {}: expected {:?}, got {:?}",
                what, expected, got
            ),
            Error::InvalidShape { what, expected, got } => write!(
                f,
                "invalid shape for {}: expected length {}, got {}",
                what, expected, got
            ),
            Error::UnknownParameter(name) => {
                write!(f, "unknown parameter set: {}", name)
            }
            Error::DivisionByZero(what) => write!(f, "division by zero: {}", what),
            Error::EmptyBatch => f.write_str("cannot adjust parameters with an empty batch"),
            Error::LayerCountMismatch { expected, got } => write!(
                f,
                "number of parameter batches ({}) must equal number of layers ({})",
                got, expected
            ),
            Error::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Ndarray(err) => write!(f, "ndarray: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Ndarray(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShapeError> for Error {
    fn from(err: ShapeError) -> Self {
        Error::Ndarray(err)
    }
}
