//! Utilities for training networks against a known function.

use std::time::{Duration, Instant};

use itertools::Itertools;
use rand::rngs::ThreadRng;
use rand::Rng;

use crate::error::{Error, Result};
use crate::feed_forward::FeedForward;
use crate::parameter::ParameterSetMap;

/// Something a network can learn: a source of training inputs and the
/// outputs expected for them.
pub trait Objective {
    /// Returns the outputs the network should produce for `inputs`.
    fn evaluate(&self, inputs: &[f64]) -> Vec<f64>;

    /// Draws `count` fresh training inputs.
    fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<f64>;

    /// The fixed inputs used to validate a network with `count` inputs.
    fn validation_set(&self, count: usize) -> Vec<Vec<f64>>;
}

/// A function known in closed form over a scalar domain.
///
/// Training inputs are drawn uniformly from `[min, max)`. Validation walks
/// a grid over the same interval, one axis per network input.
#[derive(Clone, Debug)]
pub struct ClosedFormFunction<F> {
    function: F,
    domain: (f64, f64),
    validation_step: f64,
}

impl<F> ClosedFormFunction<F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    pub fn new(function: F, domain: (f64, f64)) -> Result<Self> {
        let (min, max) = domain;
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::InvalidConfiguration(format!(
                "domain ({}, {}) is not a finite, non-empty interval",
                min, max
            )));
        }
        Ok(ClosedFormFunction {
            function,
            domain,
            validation_step: 0.1,
        })
    }

    /// Sets the spacing of the validation grid. Defaults to 0.1.
    pub fn validation_step(mut self, step: f64) -> Result<Self> {
        if step.is_nan() || step <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "validation step must be positive, got {}",
                step
            )));
        }
        self.validation_step = step;
        Ok(self)
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    /// Points `min, min + step, ...` strictly below `max`.
    fn grid(&self) -> Vec<f64> {
        let (min, max) = self.domain;
        let count = ((max - min) / self.validation_step).ceil() as usize;
        (0..count)
            .map(|i| min + i as f64 * self.validation_step)
            .filter(|&x| x < max)
            .collect()
    }
}

impl<F> Objective for ClosedFormFunction<F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    fn evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        (self.function)(inputs)
    }

    fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<f64> {
        let (min, max) = self.domain;
        (0..count).map(|_| rng.random_range(min..max)).collect()
    }

    fn validation_set(&self, count: usize) -> Vec<Vec<f64>> {
        let grid = self.grid();
        (0..count)
            .map(|_| grid.iter().cloned())
            .multi_cartesian_product()
            .collect()
    }
}

/// One forward and backward pass of a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchStepResult {
    pub inputs: Vec<f64>,
    pub expected: Vec<f64>,
    pub outputs: Vec<f64>,
    pub error: f64,
    /// Every layer's parameters with the gradients of this step.
    pub parameters: Vec<ParameterSetMap>,
}

impl BatchStepResult {
    /// Records the step `network` just completed.
    pub fn new(
        inputs: Vec<f64>,
        expected: Vec<f64>,
        network: &FeedForward,
        error: f64,
    ) -> Result<Self> {
        Ok(BatchStepResult {
            inputs,
            expected,
            outputs: network.outputs().to_vec(),
            error,
            parameters: network.get_parameters()?,
        })
    }
}

/// The outcome of a batch, including the update it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// One-based position of this batch in the trainer's history.
    pub batch_number: usize,
    pub batch_size: usize,
    pub total_error: f64,
    pub avg_error: f64,
    /// Every layer's parameters after the batch update, with the averaged
    /// gradients and the deltas that produced them.
    pub parameters: Vec<ParameterSetMap>,
    pub inputs: Vec<Vec<f64>>,
    pub expected: Vec<Vec<f64>>,
    pub actual: Vec<Vec<f64>>,
}

impl BatchResult {
    /// Summarizes `steps` and applies their averaged gradients to `network`
    /// in a single update.
    pub fn new(
        batch_number: usize,
        network: &mut FeedForward,
        steps: Vec<BatchStepResult>,
    ) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let batch_size = steps.len();
        let total_error: f64 = steps.iter().map(|step| step.error).sum();

        let mut inputs = Vec::with_capacity(batch_size);
        let mut expected = Vec::with_capacity(batch_size);
        let mut actual = Vec::with_capacity(batch_size);
        let mut per_layer: Vec<Vec<ParameterSetMap>> = (0..network.layer_count())
            .map(|_| Vec::with_capacity(batch_size))
            .collect();
        for step in steps {
            inputs.push(step.inputs);
            expected.push(step.expected);
            actual.push(step.outputs);
            for (layer, parameters) in per_layer.iter_mut().zip(step.parameters) {
                layer.push(parameters);
            }
        }
        let parameters = network.adjust_parameters(per_layer)?;

        Ok(BatchResult {
            batch_number,
            batch_size,
            total_error,
            avg_error: total_error / batch_size as f64,
            parameters,
            inputs,
            expected,
            actual,
        })
    }
}

/// The network's performance over the objective's validation set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub inputs: Vec<Vec<f64>>,
    pub expected: Vec<Vec<f64>>,
    pub actual: Vec<Vec<f64>>,
    /// Sum of the error of every validation point.
    pub error: f64,
}

impl ValidationResult {
    /// Mean error per validation point.
    pub fn avg_error(&self) -> f64 {
        if self.inputs.is_empty() {
            0.0
        } else {
            self.error / self.inputs.len() as f64
        }
    }
}

/// Logging frequency to use during training
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Logging {
    /// No logs will be emitted
    Silent,
    /// A summary will be logged at completion
    Completion,
    /// A summary will be logged after every `n` batches
    Iterations(usize),
}

impl Logging {
    /// Performs logging after `batch` completes.
    fn batch(&self, batch: usize, avg_error: f64) {
        if let Logging::Iterations(freq) = *self {
            if freq > 0 && batch % freq == 0 {
                info!("Batch {}:\taverage error={}", batch, avg_error);
            }
        }
    }

    /// Performs logging at the end of training.
    fn completion(&self, batches: usize, avg_error: f64, start_time: Instant) {
        if let Logging::Silent = *self {
            return;
        }
        info!(
            "Ran {} batches in {} seconds.",
            batches,
            start_time.elapsed().as_secs()
        );
        info!("Final average error: {}", avg_error);
    }
}

/// When to stop training
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StopCondition {
    /// Stops after the provided number of batches
    Batches(usize),
    /// Stops when a batch's average error drops below the provided threshold
    ErrorThreshold(f64),
    /// Stops after the provided duration
    Duration(Duration),
}

impl From<Duration> for StopCondition {
    fn from(duration: Duration) -> StopCondition {
        StopCondition::Duration(duration)
    }
}

impl StopCondition {
    /// Returns true if training is complete.
    fn should_stop(&self, batches: usize, avg_error: f64, start_time: Instant) -> bool {
        match *self {
            StopCondition::Batches(limit) => batches >= limit,
            StopCondition::ErrorThreshold(threshold) => avg_error < threshold,
            StopCondition::Duration(duration) => start_time.elapsed() > duration,
        }
    }
}

/// Drives batches of training steps through a network.
#[derive(Debug)]
pub struct Trainer<O, R = ThreadRng> {
    network: FeedForward,
    objective: O,
    rng: R,
    batch_size: usize,
    logging: Logging,
    stop_condition: StopCondition,
    step_tally: usize,
    batch_tally: usize,
}

impl<O: Objective> Trainer<O> {
    /// Creates a new Trainer instance.
    ///
    /// The trainer is initialized with some default values. These defaults are:
    ///
    /// * Batches of 50 steps.
    /// * Stops after 1000 batches.
    /// * Logs on training completion.
    /// * Draws inputs from the thread-local RNG.
    pub fn new(network: FeedForward, objective: O) -> Self {
        Trainer {
            network,
            objective,
            rng: rand::rng(),
            batch_size: 50,
            logging: Logging::Completion,
            stop_condition: StopCondition::Batches(1000),
            step_tally: 0,
            batch_tally: 0,
        }
    }
}

impl<O: Objective, R: Rng> Trainer<O, R> {
    /// Draws training inputs from `rng` instead.
    pub fn with_rng<S: Rng>(self, rng: S) -> Trainer<O, S> {
        Trainer {
            network: self.network,
            objective: self.objective,
            rng,
            batch_size: self.batch_size,
            logging: self.logging,
            stop_condition: self.stop_condition,
            step_tally: self.step_tally,
            batch_tally: self.batch_tally,
        }
    }

    /// Sets the number of steps in a batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the type of logging to be emitted during training.
    pub fn logging(mut self, logging: Logging) -> Self {
        self.logging = logging;
        self
    }

    /// Sets the condition to finish training.
    pub fn stop_condition<C>(mut self, condition: C) -> Self
    where
        C: Into<StopCondition>,
    {
        self.stop_condition = condition.into();
        self
    }

    pub fn network(&self) -> &FeedForward {
        &self.network
    }

    pub fn into_network(self) -> FeedForward {
        self.network
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    /// Total training steps taken across every batch.
    pub fn step_tally(&self) -> usize {
        self.step_tally
    }

    pub fn batch_tally(&self) -> usize {
        self.batch_tally
    }

    /// Trains on a batch containing a single step.
    pub fn single_train(&mut self) -> Result<BatchResult> {
        self.batch_train(1)
    }

    /// Runs `batch_size` steps on fresh random inputs and applies their
    /// averaged gradients in one update. A size of zero uses the trainer's
    /// configured batch size.
    pub fn batch_train(&mut self, batch_size: usize) -> Result<BatchResult> {
        let batch_size = if batch_size == 0 {
            self.batch_size
        } else {
            batch_size
        };
        if batch_size == 0 {
            return Err(Error::EmptyBatch);
        }
        self.network.reset();

        let mut steps = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let inputs = self
                .objective
                .sample(self.network.input_count(), &mut self.rng);
            let (expected, error) = self.step(&inputs)?;
            steps.push(BatchStepResult::new(inputs, expected, &self.network, error)?);
        }
        self.step_tally += batch_size;
        self.batch_tally += 1;
        BatchResult::new(self.batch_tally, &mut self.network, steps)
    }

    /// Scores the network over the objective's validation set without
    /// changing any parameters.
    pub fn validate(&mut self) -> Result<ValidationResult> {
        self.network.reset();
        let mut result = ValidationResult::default();
        for inputs in self.objective.validation_set(self.network.input_count()) {
            let (expected, error) = self.step(&inputs)?;
            result.actual.push(self.network.outputs().to_vec());
            result.inputs.push(inputs);
            result.expected.push(expected);
            result.error += error;
        }
        Ok(result)
    }

    /// Trains batch after batch until the stop condition holds, returning the
    /// last batch. At least one batch is always run.
    pub fn train(&mut self) -> Result<BatchResult> {
        let start_time = Instant::now();
        let mut batches = 0;
        loop {
            let result = self.batch_train(0)?;
            batches += 1;
            self.logging.batch(result.batch_number, result.avg_error);
            if self
                .stop_condition
                .should_stop(batches, result.avg_error, start_time)
            {
                self.logging
                    .completion(batches, result.avg_error, start_time);
                return Ok(result);
            }
        }
    }

    /// Runs one forward and backward pass, returning the expected outputs
    /// and the error.
    fn step(&mut self, inputs: &[f64]) -> Result<(Vec<f64>, f64)> {
        self.network.forward_pass(inputs)?;
        let expected = self.objective.evaluate(inputs);
        let error = self.network.backward_pass(&expected)?;
        Ok((expected, error))
    }
}
