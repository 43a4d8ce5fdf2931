//! Cost function types.

use ndarray::{Array, ArrayBase, Data, Dimension, Zip};

use crate::error::{Error, Result};

/// Measures how far a network's output is from the expected output.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cost {
    /// Half the squared difference, `0.5 * (actual - expected)^2`.
    Quadratic,
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Quadratic
    }
}

impl Cost {
    /// Evaluates the cost of a single `actual` value.
    pub fn f(&self, actual: f64, expected: f64) -> f64 {
        match *self {
            Cost::Quadratic => 0.5 * (actual - expected).powi(2),
        }
    }

    /// Evaluates the derivative of the cost with respect to `actual`.
    pub fn fprime(&self, actual: f64, expected: f64) -> f64 {
        match *self {
            Cost::Quadratic => actual - expected,
        }
    }

    /// Pairs up `actual` and `expected` and evaluates the cost of each pair.
    pub fn apply<S, T, D>(
        &self,
        actual: &ArrayBase<S, D>,
        expected: &ArrayBase<T, D>,
    ) -> Result<Array<f64, D>>
    where
        S: Data<Elem = f64>,
        T: Data<Elem = f64>,
        D: Dimension,
    {
        check_shapes(actual, expected)?;
        Ok(Zip::from(actual)
            .and(expected)
            .map_collect(|&a, &e| self.f(a, e)))
    }

    /// Pairs up `actual` and `expected` and evaluates the derivative of each
    /// pair.
    pub fn apply_derivative<S, T, D>(
        &self,
        actual: &ArrayBase<S, D>,
        expected: &ArrayBase<T, D>,
    ) -> Result<Array<f64, D>>
    where
        S: Data<Elem = f64>,
        T: Data<Elem = f64>,
        D: Dimension,
    {
        check_shapes(actual, expected)?;
        Ok(Zip::from(actual)
            .and(expected)
            .map_collect(|&a, &e| self.fprime(a, e)))
    }
}

fn check_shapes<S, T, D>(actual: &ArrayBase<S, D>, expected: &ArrayBase<T, D>) -> Result<()>
where
    S: Data<Elem = f64>,
    T: Data<Elem = f64>,
    D: Dimension,
{
    if actual.shape() != expected.shape() {
        return Err(Error::InvalidShape {
            what: "expected outputs",
            expected: actual.len(),
            got: expected.len(),
        });
    }
    Ok(())
}
