//! Layers of a feed-forward network.
//!
//! A layer caches everything its forward pass produced so that the backward
//! pass can compute its own gradients and the derivative it hands to the
//! layer before it, knowing nothing about the rest of the network.

use std::fmt;

use ndarray::{Array, ArrayView1, Array1, Array2, Dimension};

use crate::activator::Activator;
use crate::error::{Error, Result};
use crate::parameter::{ParameterSet, ParameterSetMap};
use crate::updater::{ParameterUpdater, UpdateContext};

mod linear;
mod quadratic;

pub use self::linear::LinearLayer;
pub use self::quadratic::QuadraticLayer;

/// Intermediate values from a layer's most recent passes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerCache {
    /// The raw inputs of the last forward pass.
    pub inputs: Array1<f64>,
    /// The transformed inputs, before activation.
    pub pre_activation: Array1<f64>,
    pub outputs: Array1<f64>,
    /// The derivative of the error with respect to `outputs`, from the last
    /// backward pass.
    pub upstream_derivative: Array1<f64>,
}

/// A single stage of a feed-forward network.
pub trait Layer: fmt::Debug {
    /// Returns the number of inputs to this layer.
    fn input_count(&self) -> usize;

    /// Returns the number of outputs from this layer.
    fn output_count(&self) -> usize;

    /// The position of this layer in its network, starting at zero.
    fn level(&self) -> usize;

    fn activator(&self) -> Activator;

    fn cache(&self) -> &LayerCache;

    fn cache_mut(&mut self) -> &mut LayerCache;

    /// The pipeline that turns this layer's gradients into updates.
    fn updater_mut(&mut self) -> &mut ParameterUpdater;

    /// Computes the pre-activation values for `inputs`, caching anything the
    /// gradient computation needs.
    fn transform_inputs(&mut self, inputs: &Array1<f64>) -> Array1<f64>;

    /// Recomputes every parameter gradient from the cached forward pass and
    /// the cached upstream derivative.
    fn calculate_gradients(&mut self);

    /// The Jacobian of the pre-activation with respect to the raw inputs, an
    /// `(outputs, inputs)` matrix evaluated at the cached forward pass.
    fn cached_gradient_derivative(&self) -> Array2<f64>;

    /// Snapshots every parameter set with its latest gradients, keyed by
    /// prefixed set name.
    fn get_parameters(&self) -> Result<ParameterSetMap>;

    /// Verifies that every set in `parameters` names one of this layer's
    /// sets and has its shape.
    fn check_parameters(&self, parameters: &ParameterSetMap) -> Result<()>;

    /// Overwrites the values of the named parameter sets. Nothing is
    /// assigned unless `check_parameters` accepts the whole map.
    fn set_parameters(&mut self, parameters: &ParameterSetMap) -> Result<()>;

    /// Prepended to every set name so that sets are unique in a network.
    fn parameter_prefix(&self) -> String {
        format!("level_{}_", self.level())
    }

    /// Feeds `inputs` forward through the layer, returning its outputs.
    fn forward_pass(&mut self, inputs: ArrayView1<f64>) -> Result<Array1<f64>> {
        if inputs.len() != self.input_count() {
            return Err(Error::InvalidShape {
                what: "layer inputs",
                expected: self.input_count(),
                got: inputs.len(),
            });
        }
        let inputs = inputs.to_owned();
        let pre_activation = self.transform_inputs(&inputs);
        let outputs = self.activator().apply(&pre_activation);

        let cache = self.cache_mut();
        cache.inputs = inputs;
        cache.pre_activation = pre_activation;
        cache.outputs = outputs.clone();
        Ok(outputs)
    }

    /// Feeds the derivative of the error with respect to this layer's
    /// outputs backwards, updating the layer's gradients and returning the
    /// derivative with respect to its inputs.
    fn backward_pass(&mut self, upstream_derivative: ArrayView1<f64>) -> Result<Array1<f64>> {
        if upstream_derivative.len() != self.output_count() {
            return Err(Error::InvalidShape {
                what: "upstream derivative",
                expected: self.output_count(),
                got: upstream_derivative.len(),
            });
        }
        self.cache_mut().upstream_derivative = upstream_derivative.to_owned();
        self.calculate_gradients();

        let derivative = upstream_derivative.dot(&self.cached_gradient_derivative());
        let slope = self.activator().apply_derivative(&self.cache().inputs);
        Ok(slope * derivative)
    }

    /// Runs a batch of parameter snapshots through this layer's updater and
    /// adopts the result, which is returned with its deltas.
    fn adjust_parameters(
        &mut self,
        batch: Vec<ParameterSetMap>,
        context: &UpdateContext,
    ) -> Result<ParameterSetMap> {
        let adjusted = self.updater_mut().adjust(batch, context)?;
        self.set_parameters(&adjusted)?;
        Ok(adjusted)
    }
}

fn check_shape(expected: &[usize], set: &ParameterSet) -> Result<()> {
    if expected != set.shape() {
        return Err(Error::ShapeMismatch {
            what: set.name().to_owned(),
            expected: expected.to_vec(),
            got: set.shape().to_vec(),
        });
    }
    Ok(())
}

/// Copies the values of `set` into `target`, which must have the same shape.
fn assign<D: Dimension>(target: &mut Array<f64, D>, set: &ParameterSet) -> Result<()> {
    check_shape(target.shape(), set)?;
    *target = set.values_as::<D>()?;
    Ok(())
}

/// Rejects layer dimensions that cannot form a matrix.
fn check_dimensions(inputs: usize, outputs: usize) -> Result<()> {
    if inputs == 0 || outputs == 0 {
        return Err(Error::InvalidConfiguration(format!(
            "a layer needs at least one input and output, got {}x{}",
            inputs, outputs
        )));
    }
    Ok(())
}
