//! The unit of optimizable state and its change history.
//!
//! A layer exposes each of its tensors as a `ParameterSet`. The set breaks
//! the tensor into one `Parameter` per element, each carrying its value, the
//! gradient from the most recent backward pass, and a `Delta`: the update the
//! pipeline is computing for it, together with every step that produced it.

use std::collections::BTreeMap;

use ndarray::{Array, ArrayD, Dimension, IxDyn};

use crate::error::{Error, Result};

/// One transform's contribution to a `Delta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaStep {
    /// Name of the step that produced this change.
    pub name: String,
    /// The delta value before the step.
    pub input_value: f64,
    /// The delta value after the step.
    pub output_value: f64,
}

/// The pending change to a parameter and how it was derived.
///
/// Deltas are never edited in place: recording a step consumes the delta and
/// returns a new one with the step appended.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    value: f64,
    steps: Vec<DeltaStep>,
}

impl Delta {
    /// The current update magnitude.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Every step applied so far, oldest first.
    pub fn steps(&self) -> &[DeltaStep] {
        &self.steps
    }

    /// Returns the delta that results from step `name` producing `value`.
    pub fn record(mut self, name: &str, value: f64) -> Delta {
        self.steps.push(DeltaStep {
            name: name.to_owned(),
            input_value: self.value,
            output_value: value,
        });
        self.value = value;
        self
    }
}

/// A single scalar component of a layer's tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// `<set name>_<row-major index>`, unique within the owning set.
    pub name: String,
    pub value: f64,
    /// Partial derivative of the error with respect to `value`.
    pub gradient: f64,
    pub delta: Delta,
}

impl Parameter {
    pub fn new(set_name: &str, index: usize, value: f64, gradient: f64) -> Self {
        Parameter {
            name: format!("{}_{}", set_name, index),
            value,
            gradient,
            delta: Delta::default(),
        }
    }

    /// Replaces the delta with the result of step `name` producing `value`.
    pub fn record(&mut self, name: &str, value: f64) {
        let delta = std::mem::take(&mut self.delta);
        self.delta = delta.record(name, value);
    }
}

/// The parameters making up one named tensor of one layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    name: String,
    parameters: ArrayD<Parameter>,
}

/// Parameter sets keyed by name.
pub type ParameterSetMap = BTreeMap<String, ParameterSet>;

impl ParameterSet {
    /// Builds a set from a tensor of `values` and matching `gradients`.
    ///
    /// Every parameter starts with an empty `Delta`.
    pub fn new<D>(name: &str, values: &Array<f64, D>, gradients: &Array<f64, D>) -> Result<Self>
    where
        D: Dimension,
    {
        if values.shape() != gradients.shape() {
            return Err(Error::ShapeMismatch {
                what: format!("{} values and gradients", name),
                expected: values.shape().to_vec(),
                got: gradients.shape().to_vec(),
            });
        }
        let parameters: Vec<Parameter> = values
            .iter()
            .zip(gradients.iter())
            .enumerate()
            .map(|(index, (&value, &gradient))| Parameter::new(name, index, value, gradient))
            .collect();
        let parameters = ArrayD::from_shape_vec(IxDyn(values.shape()), parameters)?;
        Ok(ParameterSet {
            name: name.to_owned(),
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        self.parameters.shape()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn values(&self) -> ArrayD<f64> {
        self.parameters.map(|p| p.value)
    }

    pub fn gradients(&self) -> ArrayD<f64> {
        self.parameters.map(|p| p.gradient)
    }

    pub fn deltas(&self) -> ArrayD<Delta> {
        self.parameters.map(|p| p.delta.clone())
    }

    /// Iterates over the parameters in row-major order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.parameters.iter_mut()
    }

    /// Looks up a parameter by its full name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Returns the values reshaped to the dimensionality `D`.
    pub fn values_as<D: Dimension>(&self) -> Result<Array<f64, D>> {
        self.values().into_dimensionality::<D>().map_err(|_| Error::ShapeMismatch {
            what: self.name.clone(),
            expected: vec![D::NDIM.unwrap_or(0)],
            got: self.shape().to_vec(),
        })
    }
}

/// Collects `sets` into a map keyed by set name.
pub fn parameter_set_map<I>(sets: I) -> ParameterSetMap
where
    I: IntoIterator<Item = ParameterSet>,
{
    sets.into_iter().map(|set| (set.name.clone(), set)).collect()
}
