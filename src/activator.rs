//! Activation function types.

use ndarray::{Array, ArrayBase, Data, Dimension};

/// [Activation function](https://en.wikipedia.org/wiki/Activation_function)
/// types.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Activator {
    /// Rectified Linear Unit
    ///
    /// Takes a `leak` value to scale negative inputs by. A leak of zero is the
    /// plain rectifier.
    ReLU(f64),
    /// Passes every value through unchanged.
    Identity,
}

impl Default for Activator {
    fn default() -> Self {
        Activator::Identity
    }
}

impl Activator {
    /// Evaluates `f(x)` for the selected the activation function.
    pub fn f(&self, x: f64) -> f64 {
        match *self {
            Activator::ReLU(leak) => x.max(leak * x),
            Activator::Identity => x,
        }
    }

    /// Evaluates the derivative `f'(x)` at the pre-activation input `x`.
    pub fn fprime(&self, x: f64) -> f64 {
        match *self {
            Activator::ReLU(leak) => {
                if x > 0.0 {
                    1.0
                } else {
                    leak
                }
            }
            Activator::Identity => 1.0,
        }
    }

    /// Applies `f` to every element, preserving the shape of `values`.
    ///
    /// A zero-dimensional array is treated as a scalar.
    pub fn apply<S, D>(&self, values: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        values.mapv(|x| self.f(x))
    }

    /// Applies `f'` to every element, preserving the shape of `values`.
    pub fn apply_derivative<S, D>(&self, values: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        values.mapv(|x| self.fprime(x))
    }
}
