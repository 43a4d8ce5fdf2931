//! Initial values for layer parameters.

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::matrix::rounded_linspace;

/// Produces the starting weights and biases of a layer.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterGenerator {
    /// Uniformly distributed values in `[-0.5, 0.5)`.
    Random,
    /// Evenly spaced values from `start` to `stop`, rounded to three decimals
    /// and laid out row by row.
    Sequence { start: f64, stop: f64 },
    /// Every value is the same constant.
    Constant(f64),
}

impl Default for ParameterGenerator {
    fn default() -> Self {
        ParameterGenerator::Constant(1.0)
    }
}

impl ParameterGenerator {
    /// The evenly spaced generator over `[-1, 1]`.
    pub fn sequence() -> Self {
        ParameterGenerator::Sequence {
            start: -1.0,
            stop: 1.0,
        }
    }

    /// Generates a `(rows, cols)` matrix using the thread-local RNG.
    pub fn generate(&self, rows: usize, cols: usize) -> Array2<f64> {
        self.generate_with(rows, cols, &mut rand::rng())
    }

    /// Generates a `(rows, cols)` matrix drawing any randomness from `rng`.
    pub fn generate_with<R>(&self, rows: usize, cols: usize, rng: &mut R) -> Array2<f64>
    where
        R: Rng + ?Sized,
    {
        match *self {
            ParameterGenerator::Random => {
                Array2::from_shape_simple_fn((rows, cols), || rng.random::<f64>() - 0.5)
            }
            ParameterGenerator::Sequence { start, stop } => {
                let sequence = rounded_linspace(start, stop, rows * cols);
                let mut values = sequence.into_iter();
                Array2::from_shape_simple_fn((rows, cols), || values.next().unwrap_or(stop))
            }
            ParameterGenerator::Constant(value) => Array2::from_elem((rows, cols), value),
        }
    }

    /// Generates a vector of `len` values, as the single row of a `(1, len)`
    /// matrix.
    pub fn generate_vector(&self, len: usize) -> Array1<f64> {
        self.generate(1, len).row(0).to_owned()
    }
}
