use ndarray::{Array1, Array2, Axis};

use super::{assign, check_dimensions, check_shape, Layer, LayerCache};
use crate::activator::Activator;
use crate::error::{Error, Result};
use crate::generator::ParameterGenerator;
use crate::matrix::outer;
use crate::parameter::{parameter_set_map, ParameterSet, ParameterSetMap};
use crate::updater::ParameterUpdater;

/// A bilinear layer.
///
/// The pre-activation is the elementwise product of two independent affine
/// transforms of the input:
///
/// ```text
/// fx = x·Wf + bf
/// gx = x·Wg + bg
/// pre_activation = fx ⊙ gx
/// ```
///
/// Weights are stored as `(inputs, outputs)` matrices.
#[derive(Debug)]
pub struct QuadraticLayer {
    level: usize,
    activator: Activator,
    updater: ParameterUpdater,

    fx_weights: Array2<f64>,
    fx_biases: Array1<f64>,
    gx_weights: Array2<f64>,
    gx_biases: Array1<f64>,

    fx_weight_gradients: Array2<f64>,
    fx_bias_gradients: Array1<f64>,
    gx_weight_gradients: Array2<f64>,
    gx_bias_gradients: Array1<f64>,

    fx: Array1<f64>,
    gx: Array1<f64>,
    cache: LayerCache,
}

impl QuadraticLayer {
    /// Initializes a new, untrained layer at position `level` of its network.
    ///
    /// Both affine transforms draw their weights and biases from
    /// `generator`. The layer starts with the identity activation.
    pub fn new(
        inputs: usize,
        outputs: usize,
        level: usize,
        generator: ParameterGenerator,
        updater: ParameterUpdater,
    ) -> Result<Self> {
        check_dimensions(inputs, outputs)?;
        Ok(QuadraticLayer {
            level,
            activator: Activator::default(),
            updater,
            fx_weights: generator.generate(inputs, outputs),
            fx_biases: generator.generate_vector(outputs),
            gx_weights: generator.generate(inputs, outputs),
            gx_biases: generator.generate_vector(outputs),
            fx_weight_gradients: Array2::zeros((inputs, outputs)),
            fx_bias_gradients: Array1::zeros(outputs),
            gx_weight_gradients: Array2::zeros((inputs, outputs)),
            gx_bias_gradients: Array1::zeros(outputs),
            fx: Array1::zeros(outputs),
            gx: Array1::zeros(outputs),
            cache: LayerCache::default(),
        })
    }

    /// Sets the activation function applied to the layer's output.
    pub fn with_activator(mut self, activator: Activator) -> Self {
        self.activator = activator;
        self
    }
}

impl Layer for QuadraticLayer {
    fn input_count(&self) -> usize {
        self.fx_weights.nrows()
    }

    fn output_count(&self) -> usize {
        self.fx_weights.ncols()
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
        self.fx = inputs.dot(&self.fx_weights) + &self.fx_biases;
        self.gx = inputs.dot(&self.gx_weights) + &self.gx_biases;
        &self.fx * &self.gx
    }

    fn calculate_gradients(&mut self) {
        let inputs = self.cache.inputs.view();
        let upstream = &self.cache.upstream_derivative;

        let fx_error = &self.gx * upstream;
        let gx_error = &self.fx * upstream;
        self.fx_weight_gradients = outer(inputs, fx_error.view());
        self.gx_weight_gradients = outer(inputs, gx_error.view());
        self.fx_bias_gradients = fx_error;
        self.gx_bias_gradients = gx_error;
    }

    fn cached_gradient_derivative(&self) -> Array2<f64> {
        // d(fx ⊙ gx)/dx = diag(fx)·Wgᵀ + diag(gx)·Wfᵀ
        let fx = self.fx.view().insert_axis(Axis(1));
        let gx = self.gx.view().insert_axis(Axis(1));
        &self.gx_weights.t() * &fx + &self.fx_weights.t() * &gx
    }

    fn get_parameters(&self) -> Result<ParameterSetMap> {
        let prefix = self.parameter_prefix();
        Ok(parameter_set_map(vec![
            ParameterSet::new(
                &format!("{}fx_weights", prefix),
                &self.fx_weights,
                &self.fx_weight_gradients,
            )?,
            ParameterSet::new(
                &format!("{}fx_biases", prefix),
                &self.fx_biases,
                &self.fx_bias_gradients,
            )?,
            ParameterSet::new(
                &format!("{}gx_weights", prefix),
                &self.gx_weights,
                &self.gx_weight_gradients,
            )?,
            ParameterSet::new(
                &format!("{}gx_biases", prefix),
                &self.gx_biases,
                &self.gx_bias_gradients,
            )?,
        ]))
    }

    fn check_parameters(&self, parameters: &ParameterSetMap) -> Result<()> {
        let prefix = self.parameter_prefix();
        for (name, set) in parameters {
            let expected = match name.strip_prefix(prefix.as_str()) {
                Some("fx_weights") => self.fx_weights.shape(),
                Some("fx_biases") => self.fx_biases.shape(),
                Some("gx_weights") => self.gx_weights.shape(),
                Some("gx_biases") => self.gx_biases.shape(),
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
                Some("fx_weights") => assign(&mut self.fx_weights, set)?,
                Some("fx_biases") => assign(&mut self.fx_biases, set)?,
                Some("gx_weights") => assign(&mut self.gx_weights, set)?,
                Some("gx_biases") => assign(&mut self.gx_biases, set)?,
                _ => return Err(Error::UnknownParameter(name.clone())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Cost;
    use crate::updater::tests::assert_close;
    use crate::updater::{DeltaParameterUpdateStep, ScaledGradient, UpdateContext};
    use ndarray::{arr1, arr2, ArrayD};

    fn layer(inputs: usize, outputs: usize, level: usize, generator: ParameterGenerator) -> QuadraticLayer {
        QuadraticLayer::new(inputs, outputs, level, generator, ParameterUpdater::new(vec![]))
            .unwrap()
    }

    fn assert_all_close(actual: ArrayD<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (&a, &e) in actual.iter().zip(expected) {
            assert_close(a, e);
        }
    }

    /// Runs one forward and backward pass through a two layer stack.
    fn run(first: &mut QuadraticLayer, second: &mut QuadraticLayer, input: &[f64], expected: &[f64]) {
        let hidden = first.forward_pass(arr1(input).view()).unwrap();
        let outputs = second.forward_pass(hidden.view()).unwrap();
        let upstream = Cost::Quadratic
            .apply_derivative(&outputs, &arr1(expected))
            .unwrap();
        let downstream = second.backward_pass(upstream.view()).unwrap();
        first.backward_pass(downstream.view()).unwrap();
    }

    #[test]
    fn forward_pass() {
        let mut first = layer(1, 3, 0, ParameterGenerator::Constant(1.0));
        let mut second = layer(3, 1, 1, ParameterGenerator::Constant(1.0));
        let hidden = first.forward_pass(arr1(&[2.0]).view()).unwrap();
        assert_eq!(first.cache().pre_activation, arr1(&[9.0, 9.0, 9.0]));
        assert_eq!(hidden, arr1(&[9.0, 9.0, 9.0]));
        let outputs = second.forward_pass(hidden.view()).unwrap();
        assert_eq!(outputs, arr1(&[784.0]));
        assert_eq!(second.cache().inputs, arr1(&[9.0, 9.0, 9.0]));
    }

    #[test]
    fn single_input_gradients() {
        let mut first = layer(1, 3, 0, ParameterGenerator::Constant(1.0));
        let mut second = layer(3, 1, 1, ParameterGenerator::Constant(1.0));
        run(&mut first, &mut second, &[2.0], &[500.0]);

        let params = first.get_parameters().unwrap();
        assert_eq!(
            params["level_0_fx_weights"].gradients(),
            arr2(&[[95424.0, 95424.0, 95424.0]]).into_dyn()
        );
        assert_eq!(
            params["level_0_fx_biases"].gradients(),
            arr1(&[47712.0, 47712.0, 47712.0]).into_dyn()
        );
        assert_eq!(
            params["level_0_gx_weights"].gradients(),
            params["level_0_fx_weights"].gradients()
        );

        let params = second.get_parameters().unwrap();
        assert_eq!(
            params["level_1_fx_weights"].gradients(),
            arr2(&[[71568.0], [71568.0], [71568.0]]).into_dyn()
        );
        assert_eq!(
            params["level_1_gx_biases"].gradients(),
            arr1(&[7952.0]).into_dyn()
        );
    }

    #[test]
    fn multi_input_gradients() {
        let mut first = layer(2, 3, 0, ParameterGenerator::sequence());
        let mut second = layer(3, 2, 1, ParameterGenerator::sequence());
        assert_eq!(
            first.get_parameters().unwrap()["level_0_fx_weights"].values(),
            arr2(&[[-1.0, -0.6, -0.2], [0.2, 0.6, 1.0]]).into_dyn()
        );

        run(&mut first, &mut second, &[-3.0, 3.0], &[18.0, -18.0]);
        let outputs = &second.cache().outputs;
        assert_close(outputs[0], 5.494335999999989);
        assert_close(outputs[1], 428.3244159999999);

        let params = first.get_parameters().unwrap();
        let fx_weights = [
            86002.25075060733,
            -40031.03544459262,
            -254459.36327614455,
            -86002.25075060733,
            40031.03544459262,
            254459.36327614455,
        ];
        assert_all_close(params["level_0_fx_weights"].gradients(), &fx_weights);
        assert_all_close(params["level_0_gx_weights"].gradients(), &fx_weights);
        assert_all_close(
            params["level_0_fx_biases"].gradients(),
            &[-28667.41691686911, 13343.678481530875, 84819.78775871485],
        );

        let params = second.get_parameters().unwrap();
        assert_all_close(
            params["level_1_fx_weights"].gradients(),
            &[
                -198.15774857216,
                62442.99956750335,
                -379.90006235135985,
                119713.2062714265,
                -620.2689289625598,
                195457.67320242166,
            ],
        );
        assert_all_close(
            params["level_1_gx_biases"].gradients(),
            &[-29.313276415999994, 9237.130113535997],
        );
    }

    #[test]
    fn downstream_derivative() {
        let mut first = layer(2, 3, 0, ParameterGenerator::sequence());
        let mut second = layer(3, 2, 1, ParameterGenerator::sequence());
        let hidden = first.forward_pass(arr1(&[-3.0, 3.0]).view()).unwrap();
        let outputs = second.forward_pass(hidden.view()).unwrap();
        let upstream = &outputs - &arr1(&[18.0, -18.0]);
        let downstream = second.backward_pass(upstream.view()).unwrap();
        assert_close(downstream[0], -11025.929583411196);
        assert_close(downstream[1], 3706.577355980799);
        assert_close(downstream[2], 18439.084295372795);
    }

    #[test]
    fn adjust_descends() {
        let mut first = layer(1, 3, 0, ParameterGenerator::Constant(1.0));
        let mut second = QuadraticLayer::new(
            3,
            1,
            1,
            ParameterGenerator::Constant(1.0),
            ParameterUpdater::new(vec![DeltaParameterUpdateStep::boxed(ScaledGradient::new(1e-5))]),
        )
        .unwrap();
        run(&mut first, &mut second, &[2.0], &[500.0]);

        let batch = vec![second.get_parameters().unwrap()];
        second
            .adjust_parameters(batch, &UpdateContext::default())
            .unwrap();
        let params = second.get_parameters().unwrap();
        for &value in params["level_1_fx_weights"].values().iter() {
            assert_close(value, 1.0 - 0.71568);
        }
        for &value in params["level_1_gx_biases"].values().iter() {
            assert_close(value, 1.0 - 0.07952);
        }
    }

    #[test]
    fn rejects_wrong_input_length() {
        let mut layer = layer(2, 3, 0, ParameterGenerator::Constant(1.0));
        let result = layer.forward_pass(arr1(&[1.0]).view());
        assert!(matches!(
            result,
            Err(Error::InvalidShape {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_parameters() {
        let mut layer = layer(2, 3, 0, ParameterGenerator::Constant(1.0));
        let mut params = layer.get_parameters().unwrap();
        let set = params.remove("level_0_fx_biases").unwrap();
        params.insert("level_3_fx_biases".to_owned(), set);
        let weights = arr2(&[[5.0, 5.0, 5.0], [5.0, 5.0, 5.0]]);
        params.insert(
            "level_0_fx_weights".to_owned(),
            ParameterSet::new("level_0_fx_weights", &weights, &Array2::zeros((2, 3))).unwrap(),
        );
        match layer.set_parameters(&params) {
            Err(Error::UnknownParameter(name)) => assert_eq!(name, "level_3_fx_biases"),
            other => panic!("unexpected result: {:?}", other),
        }

        // Valid sets earlier in the map are not assigned either.
        let after = layer.get_parameters().unwrap();
        assert!(after["level_0_fx_weights"].values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rejects_wrong_parameter_shape() {
        let mut layer = layer(2, 3, 0, ParameterGenerator::Constant(1.0));
        let mut params = ParameterSetMap::new();
        params.insert(
            "level_0_fx_biases".to_owned(),
            ParameterSet::new("level_0_fx_biases", &arr1(&[2.0, 2.0, 2.0]), &Array1::zeros(3))
                .unwrap(),
        );
        params.insert(
            "level_0_gx_biases".to_owned(),
            ParameterSet::new("level_0_gx_biases", &arr1(&[1.0]), &arr1(&[0.0])).unwrap(),
        );
        assert!(matches!(
            layer.check_parameters(&params),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            layer.set_parameters(&params),
            Err(Error::ShapeMismatch { .. })
        ));
        let after = layer.get_parameters().unwrap();
        assert!(after["level_0_fx_biases"].values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rejects_empty_layers() {
        let result = QuadraticLayer::new(
            0,
            3,
            0,
            ParameterGenerator::Constant(1.0),
            ParameterUpdater::new(vec![]),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }
}
