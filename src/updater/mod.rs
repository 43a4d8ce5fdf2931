//! The parameter-update pipeline.
//!
//! A `ParameterUpdater` averages the gradients of a batch, then folds an
//! ordered list of `ParameterUpdateStep`s over the averaged parameters. Each
//! step reads the parameters' gradients and deltas and records a new delta;
//! the final step always negates the delta so that `value += delta` descends
//! the error surface. Only then is each parameter's value changed, exactly
//! once per batch.

use std::fmt;

use crate::error::{Error, Result};
use crate::parameter::{Parameter, ParameterSetMap};

mod adaptive;
mod filter;
mod transforms;

pub use self::adaptive::{AdaptiveGradientDerivative, Derivative};
pub use self::filter::{LargestDeltasOnly, LargestGradientsOnly};
pub use self::transforms::{
    ClampedDelta, ErrorRegularizedGradient, FlatGradient, FlatLearningRate, LogScaledDelta,
    Momentum, ScaledGradient, ToNegative,
};

/// Network-level measurements available to every step of a batch update.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UpdateContext {
    /// Sum of the errors of every step since the network was last reset.
    pub total_error: f64,
    /// `total_error` divided by the number of backward passes.
    pub error: f64,
    /// Number of elements in the batch being applied.
    pub batch_size: usize,
}

impl UpdateContext {
    /// Builds a context from a running error sum and the number of passes
    /// that produced it.
    pub fn new(total_error: f64, passes: usize) -> Self {
        let error = if passes == 0 {
            0.0
        } else {
            total_error / passes as f64
        };
        UpdateContext {
            total_error,
            error,
            batch_size: passes,
        }
    }
}

/// One stage of the update pipeline.
pub trait ParameterUpdateStep: fmt::Debug {
    /// The name recorded in each `DeltaStep` this stage produces.
    fn name(&self) -> &str;

    /// Updates the deltas of `parameters`.
    fn update(&mut self, parameters: &mut [&mut Parameter], context: &UpdateContext)
        -> Result<()>;
}

/// Computes a new delta for a single parameter from its gradient and
/// current delta.
pub trait ParameterDeltaTransform: fmt::Debug {
    fn name(&self) -> &str;

    /// Returns the new delta value for `parameter`.
    ///
    /// Implementations must not modify the parameter; any state they keep is
    /// their own.
    fn transform(&mut self, parameter: &Parameter, context: &UpdateContext) -> Result<f64>;
}

/// Applies a `ParameterDeltaTransform` to every parameter in scope.
#[derive(Debug)]
pub struct DeltaParameterUpdateStep<T> {
    transform: T,
}

impl<T: ParameterDeltaTransform> DeltaParameterUpdateStep<T> {
    pub fn new(transform: T) -> Self {
        DeltaParameterUpdateStep { transform }
    }

    /// Wraps `transform` and boxes it, ready to join a pipeline.
    pub fn boxed(transform: T) -> Box<dyn ParameterUpdateStep>
    where
        T: 'static,
    {
        Box::new(DeltaParameterUpdateStep::new(transform))
    }
}

impl<T: ParameterDeltaTransform> ParameterUpdateStep for DeltaParameterUpdateStep<T> {
    fn name(&self) -> &str {
        self.transform.name()
    }

    fn update(
        &mut self,
        parameters: &mut [&mut Parameter],
        context: &UpdateContext,
    ) -> Result<()> {
        for parameter in parameters.iter_mut() {
            let updated = self.transform.transform(parameter, context)?;
            parameter.record(self.transform.name(), updated);
        }
        Ok(())
    }
}

/// Turns a batch of gradients into one update per parameter.
#[derive(Debug)]
pub struct ParameterUpdater {
    steps: Vec<Box<dyn ParameterUpdateStep>>,
}

impl ParameterUpdater {
    /// Creates an updater running `steps` in order, followed by `ToNegative`.
    pub fn new(mut steps: Vec<Box<dyn ParameterUpdateStep>>) -> Self {
        steps.push(DeltaParameterUpdateStep::boxed(ToNegative));
        ParameterUpdater { steps }
    }

    /// Names of the pipeline's steps, in the order they run.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Averages the gradients of `batch`, runs the pipeline once over the
    /// averaged parameters, and applies each resulting delta to its value.
    ///
    /// The first element of the batch becomes the result; every other
    /// element must contain the same parameter sets with the same shapes.
    pub fn adjust(
        &mut self,
        batch: Vec<ParameterSetMap>,
        context: &UpdateContext,
    ) -> Result<ParameterSetMap> {
        let mut batch = batch.into_iter();
        let mut result = batch.next().ok_or(Error::EmptyBatch)?;
        let mut batch_count = 1;
        for element in batch {
            accumulate_gradients(&mut result, &element)?;
            batch_count += 1;
        }

        let mut parameters: Vec<&mut Parameter> = result
            .values_mut()
            .flat_map(|set| set.parameters_mut())
            .collect();
        for parameter in parameters.iter_mut() {
            parameter.gradient /= batch_count as f64;
        }
        debug!(
            "adjusting {} parameters averaged over a batch of {}",
            parameters.len(),
            batch_count
        );

        for step in self.steps.iter_mut() {
            step.update(&mut parameters, context)?;
        }
        for parameter in parameters.iter_mut() {
            parameter.value += parameter.delta.value();
        }
        Ok(result)
    }
}

/// Adds the gradients of `element` onto the matching parameters of `sum`.
fn accumulate_gradients(sum: &mut ParameterSetMap, element: &ParameterSetMap) -> Result<()> {
    if let Some(name) = element.keys().find(|name| !sum.contains_key(*name)) {
        return Err(Error::UnknownParameter(name.clone()));
    }
    for (name, set) in sum.iter_mut() {
        let other = element
            .get(name)
            .ok_or_else(|| Error::UnknownParameter(name.clone()))?;
        if set.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                what: name.clone(),
                expected: set.shape().to_vec(),
                got: other.shape().to_vec(),
            });
        }
        for (parameter, addend) in set.parameters_mut().zip(other.parameters()) {
            parameter.gradient += addend.gradient;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parameter::{parameter_set_map, ParameterSet};
    use ndarray::{arr1, arr2, Ix1, Ix2};

    pub fn assert_close(actual: f64, expected: f64) {
        let tolerance = 1e-9 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn example_map() -> ParameterSetMap {
        parameter_set_map(vec![
            ParameterSet::new(
                "param_1",
                &arr2(&[[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]),
                &arr2(&[[5.0, 10.0, -5.0], [0.0, 100.0, -50.0]]),
            )
            .unwrap(),
            ParameterSet::new(
                "param_2",
                &arr1(&[1.0, 1.0, 1.0]),
                &arr1(&[0.0, 100.0, -50.0]),
            )
            .unwrap(),
        ])
    }

    fn scaled_updater(rate: f64) -> ParameterUpdater {
        ParameterUpdater::new(vec![DeltaParameterUpdateStep::boxed(ScaledGradient::new(
            rate,
        ))])
    }

    fn assert_all_close<'a, I>(actual: I, expected: &[f64])
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let actual: Vec<f64> = actual.into_iter().cloned().collect();
        assert_eq!(actual.len(), expected.len());
        for (&a, &e) in actual.iter().zip(expected) {
            assert_close(a, e);
        }
    }

    #[test]
    fn flat_update_descends() {
        let mut updater = scaled_updater(0.01);
        let result = updater
            .adjust(vec![example_map()], &UpdateContext::default())
            .unwrap();
        let param_1 = result["param_1"].values_as::<Ix2>().unwrap();
        assert_all_close(param_1.iter(), &[0.95, 0.9, 1.05, 1.0, 0.0, 1.5]);
        let param_2 = result["param_2"].values_as::<Ix1>().unwrap();
        assert_all_close(param_2.iter(), &[1.0, 0.0, 1.5]);
    }

    #[test]
    fn always_ends_with_to_negative() {
        assert_eq!(ParameterUpdater::new(vec![]).step_names(), ["ToNegative"]);
        assert_eq!(
            scaled_updater(0.1).step_names(),
            ["ScaledGradient", "ToNegative"]
        );
    }

    #[test]
    fn records_every_step() {
        let mut updater = scaled_updater(0.01);
        let result = updater
            .adjust(vec![example_map()], &UpdateContext::default())
            .unwrap();
        let parameter = result["param_2"].get("param_2_2").unwrap();
        let steps = parameter.delta.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "ScaledGradient");
        assert_close(steps[0].output_value, -0.5);
        assert_eq!(steps[1].name, "ToNegative");
        assert_close(steps[1].input_value, -0.5);
        assert_close(steps[1].output_value, 0.5);
    }

    #[test]
    fn averages_gradients_before_transforming() {
        let mut doubled = example_map();
        for set in doubled.values_mut() {
            for parameter in set.parameters_mut() {
                parameter.gradient *= 3.0;
            }
        }
        // Mean of g and 3g is 2g.
        let mut updater = scaled_updater(0.01);
        let result = updater
            .adjust(vec![example_map(), doubled], &UpdateContext::default())
            .unwrap();
        let param_2 = result["param_2"].values_as::<Ix1>().unwrap();
        assert_all_close(param_2.iter(), &[1.0, -1.0, 2.0]);
        let gradients = result["param_2"].gradients();
        assert_all_close(gradients.iter(), &[0.0, 200.0, -100.0]);
    }

    #[test]
    fn batch_of_one_matches_single_update() {
        let context = UpdateContext::new(10.0, 1);
        let single = scaled_updater(0.01)
            .adjust(vec![example_map()], &context)
            .unwrap();
        let repeated = scaled_updater(0.01)
            .adjust(vec![example_map(), example_map(), example_map()], &context)
            .unwrap();
        assert_eq!(single, repeated);

        let mut expected = example_map();
        for set in expected.values_mut() {
            for parameter in set.parameters_mut() {
                parameter.value -= 0.01 * parameter.gradient;
            }
        }
        for (name, set) in &single {
            let expected: Vec<f64> = expected[name].values().iter().cloned().collect();
            assert_all_close(set.values().iter(), &expected);
        }
    }

    #[test]
    fn empty_batch() {
        let result = scaled_updater(0.01).adjust(vec![], &UpdateContext::default());
        assert!(matches!(result, Err(Error::EmptyBatch)));
    }

    #[test]
    fn mismatched_batch_elements() {
        let mut extra = example_map();
        extra.insert(
            "param_3".to_owned(),
            ParameterSet::new("param_3", &arr1(&[0.0]), &arr1(&[0.0])).unwrap(),
        );
        let result = scaled_updater(0.01).adjust(
            vec![example_map(), extra],
            &UpdateContext::default(),
        );
        match result {
            Err(Error::UnknownParameter(name)) => assert_eq!(name, "param_3"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn context_averages_error() {
        let context = UpdateContext::new(30.0, 3);
        assert_eq!(context.error, 10.0);
        assert_eq!(UpdateContext::new(5.0, 0).error, 0.0);
    }
}
