use std::collections::{HashMap, VecDeque};

use super::{ParameterUpdateStep, UpdateContext};
use crate::error::{Error, Result};
use crate::matrix::sign;
use crate::parameter::Parameter;

/// Finite-difference estimates of the first and second derivative of a
/// sequence of observations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Derivative {
    observations: VecDeque<f64>,
}

impl Derivative {
    pub fn observe(&mut self, value: f64) {
        if self.observations.len() == 3 {
            self.observations.pop_front();
        }
        self.observations.push_back(value);
    }

    /// The most recent observation.
    pub fn latest(&self) -> Option<f64> {
        self.observations.back().cloned()
    }

    /// `x[n] - x[n-1]`, once two observations exist.
    pub fn first(&self) -> Option<f64> {
        let n = self.observations.len();
        if n < 2 {
            return None;
        }
        Some(self.observations[n - 1] - self.observations[n - 2])
    }

    /// `x[n] - 2x[n-1] + x[n-2]`, once three observations exist.
    pub fn second(&self) -> Option<f64> {
        if self.observations.len() < 3 {
            return None;
        }
        let o = &self.observations;
        Some(o[2] - 2.0 * o[1] + o[0])
    }
}

#[derive(Clone, Debug)]
struct AdaptiveState {
    /// Tracks `|gradient|`; a falling magnitude means the step is helping.
    magnitude: Derivative,
    last_gradient: Option<f64>,
    step: f64,
    growth_rate: f64,
}

/// Sizes each parameter's step from the history of its own gradient.
///
/// For every parameter:
///
///  * when the gradient changes sign the delta is zero and both the step and
///    its growth rate shrink by 10%;
///  * while the gradient magnitude keeps falling the step grows by
///    `1 + growth_rate`, and if the fall is not accelerating the base rates
///    handed to new parameters grow by 1%;
///  * otherwise the delta is the current step, signed like the gradient.
///
/// Every call also records the batch error. All per-parameter state is
/// discarded when the error got worse on every one of the last `window`
/// batches, or by more than half in a single batch.
#[derive(Clone, Debug)]
pub struct AdaptiveGradientDerivative {
    base_step: f64,
    base_growth_rate: f64,
    window: usize,
    errors: VecDeque<f64>,
    states: HashMap<String, AdaptiveState>,
}

impl AdaptiveGradientDerivative {
    pub fn new(base_step: f64, base_growth_rate: f64, window: usize) -> Result<Self> {
        if base_step.is_nan() || base_step <= 0.0 || base_growth_rate.is_nan() || base_growth_rate < 0.0
        {
            return Err(Error::InvalidConfiguration(format!(
                "adaptive step {} must be positive and growth rate {} non-negative",
                base_step, base_growth_rate
            )));
        }
        if window < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "error window must hold at least two batches, got {}",
                window
            )));
        }
        Ok(AdaptiveGradientDerivative {
            base_step,
            base_growth_rate,
            window,
            errors: VecDeque::with_capacity(window),
            states: HashMap::new(),
        })
    }

    /// The step currently used for parameter `name`, if it has been seen.
    pub fn step(&self, name: &str) -> Option<f64> {
        self.states.get(name).map(|state| state.step)
    }

    pub fn base_step(&self) -> f64 {
        self.base_step
    }

    /// Records a batch error, discarding all state if training is diverging.
    fn observe_error(&mut self, error: f64) {
        self.errors.push_back(error);
        if self.errors.len() > self.window {
            self.errors.pop_front();
        }
        let n = self.errors.len();
        let spiked = n >= 2 && self.errors[n - 1] > 1.5 * self.errors[n - 2];
        let worsening = n == self.window
            && self
                .errors
                .iter()
                .zip(self.errors.iter().skip(1))
                .all(|(before, after)| after > before);
        if spiked || worsening {
            info!(
                "error rose to {} over the last {} batches, resetting {} adaptive steps",
                error,
                n,
                self.states.len()
            );
            self.states.clear();
            self.errors.clear();
        }
    }

    fn delta(&mut self, name: &str, gradient: f64) -> f64 {
        let (base_step, base_growth_rate) = (self.base_step, self.base_growth_rate);
        let state = self
            .states
            .entry(name.to_owned())
            .or_insert_with(|| AdaptiveState {
                magnitude: Derivative::default(),
                last_gradient: None,
                step: base_step,
                growth_rate: base_growth_rate,
            });

        let reversed = state
            .last_gradient
            .map_or(false, |last| last * gradient < 0.0);
        state.last_gradient = Some(gradient);
        state.magnitude.observe(gradient.abs());

        if reversed {
            state.step *= 0.9;
            state.growth_rate *= 0.9;
            return 0.0;
        }

        let mut grow_base = false;
        if state.magnitude.first().map_or(false, |first| first < 0.0) {
            state.step *= 1.0 + state.growth_rate;
            grow_base = state.magnitude.second().map_or(false, |second| second >= 0.0);
        }
        let delta = state.step * sign(gradient);
        if grow_base {
            self.base_step *= 1.01;
            self.base_growth_rate *= 1.01;
        }
        delta
    }
}

impl Default for AdaptiveGradientDerivative {
    fn default() -> Self {
        AdaptiveGradientDerivative {
            base_step: 1e-3,
            base_growth_rate: 0.1,
            window: 5,
            errors: VecDeque::with_capacity(5),
            states: HashMap::new(),
        }
    }
}

impl ParameterUpdateStep for AdaptiveGradientDerivative {
    fn name(&self) -> &str {
        "AdaptiveGradientDerivative"
    }

    fn update(&mut self, parameters: &mut [&mut Parameter], context: &UpdateContext) -> Result<()> {
        self.observe_error(context.error);
        for parameter in parameters.iter_mut() {
            let delta = self.delta(&parameter.name, parameter.gradient);
            parameter.record("AdaptiveGradientDerivative", delta);
        }
        Ok(())
    }
}
