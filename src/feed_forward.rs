//! A [Feedforward neural network]
//! (https://en.wikipedia.org/wiki/Feedforward_neural_network).
//!
//! # Example
//!
//! Let's build a small bilinear network and take a single gradient step:
//!
//! ```
//! # use insight::config::{LayerKind, NetworkConfig, UpdaterRegistry};
//! # use insight::generator::ParameterGenerator;
//! let registry = UpdaterRegistry::default();
//! let mut network = NetworkConfig::new(&[1, 3, 1])
//!     .layer(LayerKind::Quadratic)
//!     .generator(ParameterGenerator::Constant(1.0))
//!     .updater("SimpleUpdater")
//!     .build(&registry)
//!     .unwrap();
//!
//! network.forward_pass(&[2.0]).unwrap();
//! let error = network.backward_pass(&[500.0]).unwrap();
//! assert_eq!(error, 40328.0);
//!
//! let parameters = network.get_parameters().unwrap();
//! let batches = parameters.into_iter().map(|layer| vec![layer]).collect();
//! network.adjust_parameters(batches).unwrap();
//! ```

use ndarray::{Array1, ArrayView1};

use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::layers::Layer;
use crate::parameter::ParameterSetMap;
use crate::updater::UpdateContext;

/// A feed-forward stack of layers and the cost that scores its output.
#[derive(Debug)]
pub struct FeedForward {
    layers: Vec<Box<dyn Layer>>,
    cost: Cost,
    total_error: f64,
    forward_pass_tally: usize,
    backward_pass_tally: usize,
}

impl FeedForward {
    /// Assembles a network from `layers`, which must be non-empty and where
    /// each layer's input count matches the previous layer's output count.
    pub fn new(layers: Vec<Box<dyn Layer>>, cost: Cost) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfiguration(
                "a network needs at least one layer".to_owned(),
            ));
        }
        for (before, after) in layers.iter().zip(layers.iter().skip(1)) {
            if before.output_count() != after.input_count() {
                return Err(Error::InvalidConfiguration(format!(
                    "layer {} produces {} outputs but layer {} takes {} inputs",
                    before.level(),
                    before.output_count(),
                    after.level(),
                    after.input_count()
                )));
            }
        }
        Ok(FeedForward {
            layers,
            cost,
            total_error: 0.0,
            forward_pass_tally: 0,
            backward_pass_tally: 0,
        })
    }

    /// Returns the size of the input layer to the network.
    pub fn input_count(&self) -> usize {
        self.layers[0].input_count()
    }

    /// Returns the size of the output layer from the network.
    pub fn output_count(&self) -> usize {
        self.last_layer().output_count()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn cost(&self) -> Cost {
        self.cost
    }

    /// The outputs of the most recent forward pass.
    pub fn outputs(&self) -> &Array1<f64> {
        &self.last_layer().cache().outputs
    }

    /// Sum of the errors of every backward pass since the last reset.
    pub fn total_error(&self) -> f64 {
        self.total_error
    }

    pub fn forward_pass_tally(&self) -> usize {
        self.forward_pass_tally
    }

    pub fn backward_pass_tally(&self) -> usize {
        self.backward_pass_tally
    }

    /// The measurements handed to every parameter update step.
    pub fn update_context(&self) -> UpdateContext {
        UpdateContext::new(self.total_error, self.backward_pass_tally)
    }

    /// Clears the accumulated error and both pass counters.
    pub fn reset(&mut self) {
        self.total_error = 0.0;
        self.forward_pass_tally = 0;
        self.backward_pass_tally = 0;
    }

    /// Feeds the provided `inputs` through the network, returning the output
    /// layer.
    pub fn forward_pass(&mut self, inputs: &[f64]) -> Result<Array1<f64>> {
        let mut values = ArrayView1::from(inputs).to_owned();
        for layer in self.layers.iter_mut() {
            values = layer.forward_pass(values.view())?;
        }
        self.forward_pass_tally += 1;
        Ok(values)
    }

    /// Scores the last forward pass against `expected` and propagates the
    /// cost derivative back through every layer, refreshing their gradients.
    ///
    /// Returns the error of this pass.
    pub fn backward_pass(&mut self, expected: &[f64]) -> Result<f64> {
        let expected = ArrayView1::from(expected);
        let outputs = self.outputs();
        let error = self.cost.apply(outputs, &expected)?.sum();
        let mut derivative = self.cost.apply_derivative(outputs, &expected)?;
        for layer in self.layers.iter_mut().rev() {
            derivative = layer.backward_pass(derivative.view())?;
        }
        self.total_error += error;
        self.backward_pass_tally += 1;
        Ok(error)
    }

    /// Snapshots every layer's parameter sets, ordered by layer.
    pub fn get_parameters(&self) -> Result<Vec<ParameterSetMap>> {
        self.layers.iter().map(|layer| layer.get_parameters()).collect()
    }

    /// Applies one batched update per layer, returning each layer's updated
    /// parameters.
    ///
    /// `batches[i]` holds the snapshots of layer `i` taken after each step
    /// of the batch. No layer is changed unless every layer accepts its
    /// update.
    pub fn adjust_parameters(
        &mut self,
        batches: Vec<Vec<ParameterSetMap>>,
    ) -> Result<Vec<ParameterSetMap>> {
        if batches.len() != self.layers.len() {
            return Err(Error::LayerCountMismatch {
                expected: self.layers.len(),
                got: batches.len(),
            });
        }
        let context = self.update_context();
        let adjusted = self
            .layers
            .iter_mut()
            .zip(batches)
            .map(|(layer, batch)| layer.updater_mut().adjust(batch, &context))
            .collect::<Result<Vec<_>>>()?;
        for (layer, parameters) in self.layers.iter().zip(&adjusted) {
            layer.check_parameters(parameters)?;
        }
        for (layer, parameters) in self.layers.iter_mut().zip(&adjusted) {
            layer.set_parameters(parameters)?;
        }
        Ok(adjusted)
    }

    fn last_layer(&self) -> &dyn Layer {
        // `new` rejects empty networks.
        self.layers[self.layers.len() - 1].as_ref()
    }
}
