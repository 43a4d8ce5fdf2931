use ndarray::{Array1, Array2};

use super::{assign, check_dimensions, check_shape, Layer, LayerCache};
use crate::activator::Activator;
use crate::error::{Error, Result};
use crate::generator::ParameterGenerator;
use crate::matrix::outer;
use crate::parameter::{parameter_set_map, ParameterSet, ParameterSetMap};
use crate::updater::ParameterUpdater;

/// A fully connected layer computing `x·W + b`.
///
/// Each output's weights are stored as a column, so `weights` is an
/// `(inputs, outputs)` matrix. Biases start at zero.
#[derive(Debug)]
pub struct LinearLayer {
    level: usize,
    activator: Activator,
    updater: ParameterUpdater,
    weights: Array2<f64>,
    biases: Array1<f64>,
    weight_gradients: Array2<f64>,
    bias_gradients: Array1<f64>,
    cache: LayerCache,
}

impl LinearLayer {
    /// Initializes a new, untrained layer at position `level` of its network.
    pub fn new(
        inputs: usize,
        outputs: usize,
        level: usize,
        generator: ParameterGenerator,
        updater: ParameterUpdater,
    ) -> Result<Self> {
        check_dimensions(inputs, outputs)?;
        Ok(LinearLayer {
            level,
            activator: Activator::default(),
            updater,
            weights: generator.generate(inputs, outputs),
            biases: Array1::zeros(outputs),
            weight_gradients: Array2::zeros((inputs, outputs)),
            bias_gradients: Array1::zeros(outputs),
            cache: LayerCache::default(),
        })
    }

    /// Sets the activation function applied to the layer's output.
    pub fn with_activator(mut self, activator: Activator) -> Self {
        self.activator = activator;
        self
    }
}

impl Layer for LinearLayer {
    fn input_count(&self) -> usize {
        self.weights.nrows()
    }

    fn output_count(&self) -> usize {
        self.weights.ncols()
    }

    fn level(&self) -> usize {
        self.level
    }

    fn activator(&self) -> Activator {
        self.activator
    }

    fn cache(&self) -> &LayerCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut LayerCache {
        &mut self.cache
    }

    fn updater_mut(&mut self) -> &mut ParameterUpdater {
        &mut self.updater
    }

    fn transform_inputs(&mut self, inputs: &Array1<f64>) -> Array1<f64> {
        inputs.dot(&self.weights) + &self.biases
    }

    fn calculate_gradients(&mut self) {
        let upstream = &self.cache.upstream_derivative;
        self.weight_gradients = outer(self.cache.inputs.view(), upstream.view());
        self.bias_gradients = upstream.clone();
    }

    fn cached_gradient_derivative(&self) -> Array2<f64> {
        self.weights.t().to_owned()
    }

    fn get_parameters(&self) -> Result<ParameterSetMap> {
        let prefix = self.parameter_prefix();
        Ok(parameter_set_map(vec![
            ParameterSet::new(
                &format!("{}weights", prefix),
                &self.weights,
                &self.weight_gradients,
            )?,
            ParameterSet::new(
                &format!("{}biases", prefix),
                &self.biases,
                &self.bias_gradients,
            )?,
        ]))
    }

    fn check_parameters(&self, parameters: &ParameterSetMap) -> Result<()> {
        let prefix = self.parameter_prefix();
        for (name, set) in parameters {
            let expected = match name.strip_prefix(prefix.as_str()) {
                Some("weights") => self.weights.shape(),
                Some("biases") => self.biases.shape(),
                _ => return Err(Error::UnknownParameter(name.clone())),
            };
            check_shape(expected, set)?;
        }
        Ok(())
    }

    fn set_parameters(&mut self, parameters: &ParameterSetMap) -> Result<()> {
        self.check_parameters(parameters)?;
        let prefix = self.parameter_prefix();
        for (name, set) in parameters {
            match name.strip_prefix(prefix.as_str()) {
                Some("weights") => assign(&mut self.weights, set)?,
                Some("biases") => assign(&mut self.biases, set)?,
                _ => return Err(Error::UnknownParameter(name.clone())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::tests::assert_close;
    use crate::updater::{DeltaParameterUpdateStep, ScaledGradient, UpdateContext};
    use ndarray::{arr1, arr2, Ix1};

    fn relu_layer(inputs: usize, outputs: usize, level: usize) -> LinearLayer {
        let updater =
            ParameterUpdater::new(vec![DeltaParameterUpdateStep::boxed(ScaledGradient::new(0.01))]);
        LinearLayer::new(inputs, outputs, level, ParameterGenerator::Constant(1.0), updater)
            .unwrap()
            .with_activator(Activator::ReLU(0.0))
    }

    #[test]
    fn forward_pass() {
        let mut hidden = relu_layer(2, 3, 0);
        let mut output = relu_layer(3, 1, 1);
        let values = hidden.forward_pass(arr1(&[0.5, 1.5]).view()).unwrap();
        let values = output.forward_pass(values.view()).unwrap();
        assert_eq!(output.cache().inputs, arr1(&[2.0, 2.0, 2.0]));
        assert_eq!(values, arr1(&[6.0]));
    }

    #[test]
    fn negative_inputs_are_rectified() {
        let mut layer = relu_layer(2, 3, 0);
        let values = layer.forward_pass(arr1(&[-0.5, -1.5]).view()).unwrap();
        assert_eq!(layer.cache().pre_activation, arr1(&[-2.0, -2.0, -2.0]));
        assert_eq!(values, arr1(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn backward_pass_and_adjust() {
        let mut hidden = relu_layer(2, 3, 0);
        let mut output = relu_layer(3, 1, 1);
        let values = hidden.forward_pass(arr1(&[0.5, 1.5]).view()).unwrap();
        output.forward_pass(values.view()).unwrap();

        // d/dy of 0.5 * (6 - 4)^2
        let downstream = output.backward_pass(arr1(&[2.0]).view()).unwrap();
        assert_eq!(downstream, arr1(&[2.0, 2.0, 2.0]));
        hidden.backward_pass(downstream.view()).unwrap();

        let params = output.get_parameters().unwrap();
        assert_eq!(
            params["level_1_weights"].gradients(),
            arr2(&[[4.0], [4.0], [4.0]]).into_dyn()
        );
        assert_eq!(params["level_1_biases"].gradients(), arr1(&[2.0]).into_dyn());
        let params = hidden.get_parameters().unwrap();
        assert_eq!(
            params["level_0_weights"].gradients(),
            arr2(&[[1.0, 1.0, 1.0], [3.0, 3.0, 3.0]]).into_dyn()
        );

        let batch = vec![output.get_parameters().unwrap()];
        output
            .adjust_parameters(batch, &UpdateContext::default())
            .unwrap();
        let batch = vec![hidden.get_parameters().unwrap()];
        hidden
            .adjust_parameters(batch, &UpdateContext::default())
            .unwrap();

        let params = output.get_parameters().unwrap();
        for &value in params["level_1_weights"].values().iter() {
            assert_close(value, 0.96);
        }
        assert_close(params["level_1_biases"].values_as::<Ix1>().unwrap()[0], -0.02);
        let weights: Vec<f64> = hidden.get_parameters().unwrap()["level_0_weights"]
            .values()
            .iter()
            .cloned()
            .collect();
        for (&actual, &expected) in weights.iter().zip(&[0.99, 0.99, 0.99, 0.97, 0.97, 0.97]) {
            assert_close(actual, expected);
        }
    }

    #[test]
    fn unknown_parameter() {
        let mut layer = relu_layer(2, 3, 0);
        let params = relu_layer(2, 3, 4).get_parameters().unwrap();
        assert!(matches!(
            layer.set_parameters(&params),
            Err(Error::UnknownParameter(_))
        ));
    }

    #[test]
    fn rejected_map_assigns_nothing() {
        let mut layer = relu_layer(2, 3, 0);
        let mut params = ParameterSetMap::new();
        params.insert(
            "level_0_biases".to_owned(),
            ParameterSet::new("level_0_biases", &arr1(&[3.0, 3.0, 3.0]), &Array1::zeros(3))
                .unwrap(),
        );
        params.insert(
            "level_0_weights".to_owned(),
            ParameterSet::new("level_0_weights", &arr2(&[[3.0, 3.0]]), &Array2::zeros((1, 2)))
                .unwrap(),
        );
        assert!(matches!(
            layer.set_parameters(&params),
            Err(Error::ShapeMismatch { .. })
        ));
        let after = layer.get_parameters().unwrap();
        assert!(after["level_0_biases"].values().iter().all(|&v| v == 0.0));
        assert!(after["level_0_weights"].values().iter().all(|&v| v == 1.0));
    }
}
