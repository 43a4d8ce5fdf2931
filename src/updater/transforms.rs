use std::collections::{HashMap, VecDeque};

use super::{ParameterDeltaTransform, UpdateContext};
use crate::error::{Error, Result};
use crate::matrix::sign;
use crate::parameter::Parameter;

/// Seeds the delta with the parameter's gradient.
#[derive(Copy, Clone, Debug, Default)]
pub struct FlatGradient;

impl ParameterDeltaTransform for FlatGradient {
    fn name(&self) -> &str {
        "FlatGradient"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(parameter.gradient)
    }
}

/// Seeds the delta with the gradient scaled by a learning rate.
#[derive(Copy, Clone, Debug)]
pub struct ScaledGradient {
    learning_rate: f64,
}

impl ScaledGradient {
    pub fn new(learning_rate: f64) -> Self {
        ScaledGradient { learning_rate }
    }
}

impl ParameterDeltaTransform for ScaledGradient {
    fn name(&self) -> &str {
        "ScaledGradient"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(parameter.gradient * self.learning_rate)
    }
}

/// Multiplies the delta by a fixed rate.
#[derive(Copy, Clone, Debug)]
pub struct FlatLearningRate {
    rate: f64,
}

impl FlatLearningRate {
    pub fn new(rate: f64) -> Self {
        FlatLearningRate { rate }
    }
}

impl ParameterDeltaTransform for FlatLearningRate {
    fn name(&self) -> &str {
        "FlatLearningRate"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(parameter.delta.value() * self.rate)
    }
}

/// Compresses the delta to `sign(d) * ln(1 + |d|)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogScaledDelta;

impl ParameterDeltaTransform for LogScaledDelta {
    fn name(&self) -> &str {
        "LogScaledDelta"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        let delta = parameter.delta.value();
        Ok(sign(delta) * delta.abs().ln_1p())
    }
}

/// Limits the delta to `[-limit, limit]`.
#[derive(Copy, Clone, Debug)]
pub struct ClampedDelta {
    limit: f64,
}

impl ClampedDelta {
    pub fn new(limit: f64) -> Result<Self> {
        if limit.is_nan() || limit < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "clamp limit must be non-negative, got {}",
                limit
            )));
        }
        Ok(ClampedDelta { limit })
    }
}

impl Default for ClampedDelta {
    fn default() -> Self {
        ClampedDelta { limit: 1.0 }
    }
}

impl ParameterDeltaTransform for ClampedDelta {
    fn name(&self) -> &str {
        "ClampedDelta"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(parameter.delta.value().clamp(-self.limit, self.limit))
    }
}

/// Seeds the delta with the gradient divided by the batch's average error.
#[derive(Copy, Clone, Debug, Default)]
pub struct ErrorRegularizedGradient;

impl ParameterDeltaTransform for ErrorRegularizedGradient {
    fn name(&self) -> &str {
        "ErrorRegularizedGradient"
    }

    fn transform(&mut self, parameter: &Parameter, context: &UpdateContext) -> Result<f64> {
        if context.error == 0.0 || !context.error.is_finite() {
            return Err(Error::DivisionByZero(
                "gradient regularized by a zero or non-finite error",
            ));
        }
        Ok(parameter.gradient / context.error)
    }
}

/// Blends each parameter's recent deltas using fixed weights.
///
/// `weights[0]` applies to the newest delta. A delta whose sign differs from
/// the newest remembered delta discards the history first.
#[derive(Clone, Debug)]
pub struct Momentum {
    weights: Vec<f64>,
    history: HashMap<String, VecDeque<f64>>,
}

impl Momentum {
    /// Creates a momentum transform remembering `weights.len()` deltas.
    ///
    /// Weights must be non-negative and sum to one.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidConfiguration(
                "momentum needs at least one weight".to_owned(),
            ));
        }
        if weights.iter().any(|&w| w.is_nan() || w < 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "momentum weights must be non-negative, got {:?}",
                weights
            )));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-5 {
            return Err(Error::InvalidConfiguration(format!(
                "momentum weights must sum to 1, got {}",
                total
            )));
        }
        Ok(Momentum {
            weights,
            history: HashMap::new(),
        })
    }

    /// Pushes `delta` into the history for `name` and returns the weighted
    /// sum of that history.
    fn push(&mut self, name: &str, delta: f64) -> f64 {
        let capacity = self.weights.len();
        let history = self
            .history
            .entry(name.to_owned())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if history.front().map_or(false, |&newest| newest * delta < 0.0) {
            trace!("{} reversed direction, discarding momentum", name);
            history.clear();
        }
        history.push_front(delta);
        history.truncate(capacity);
        history
            .iter()
            .zip(self.weights.iter())
            .map(|(d, w)| d * w)
            .sum()
    }
}

impl ParameterDeltaTransform for Momentum {
    fn name(&self) -> &str {
        "Momentum"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(self.push(&parameter.name, parameter.delta.value()))
    }
}

/// Negates the delta, turning an ascent direction into descent.
#[derive(Copy, Clone, Debug, Default)]
pub struct ToNegative;

impl ParameterDeltaTransform for ToNegative {
    fn name(&self) -> &str {
        "ToNegative"
    }

    fn transform(&mut self, parameter: &Parameter, _: &UpdateContext) -> Result<f64> {
        Ok(-parameter.delta.value())
    }
}
