//! Declarative network and experiment configuration.
//!
//! Update pipelines are described as lists of `StepConfig`s and stored by
//! name in an `UpdaterRegistry`. The registry is built once and passed by
//! reference to `NetworkConfig::build`, which creates a fresh, independent
//! `ParameterUpdater` for every layer.

use std::collections::BTreeMap;

use crate::activator::Activator;
use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::feed_forward::FeedForward;
use crate::generator::ParameterGenerator;
use crate::layers::{Layer, LinearLayer, QuadraticLayer};
use crate::trainer::{Logging, StopCondition};
use crate::updater::{self, DeltaParameterUpdateStep, ParameterUpdateStep, ParameterUpdater};

/// The kind of layer a network is built from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum LayerKind {
    /// `QuadraticLayer`
    #[default]
    Quadratic,
    /// `LinearLayer`
    Linear,
}

/// One stage of an update pipeline and its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepConfig {
    FlatGradient,
    ScaledGradient { learning_rate: f64 },
    FlatLearningRate { rate: f64 },
    LogScaledDelta,
    ClampedDelta { limit: f64 },
    ErrorRegularizedGradient,
    Momentum { weights: Vec<f64> },
    LargestGradientsOnly { keep_rate: f64 },
    LargestDeltasOnly { keep_rate: f64 },
    AdaptiveGradientDerivative {
        base_step: f64,
        base_growth_rate: f64,
        window: usize,
    },
}

impl StepConfig {
    /// Instantiates the step with fresh state.
    pub fn build(&self) -> Result<Box<dyn ParameterUpdateStep>> {
        Ok(match *self {
            StepConfig::FlatGradient => DeltaParameterUpdateStep::boxed(updater::FlatGradient),
            StepConfig::ScaledGradient { learning_rate } => {
                DeltaParameterUpdateStep::boxed(updater::ScaledGradient::new(learning_rate))
            }
            StepConfig::FlatLearningRate { rate } => {
                DeltaParameterUpdateStep::boxed(updater::FlatLearningRate::new(rate))
            }
            StepConfig::LogScaledDelta => DeltaParameterUpdateStep::boxed(updater::LogScaledDelta),
            StepConfig::ClampedDelta { limit } => {
                DeltaParameterUpdateStep::boxed(updater::ClampedDelta::new(limit)?)
            }
            StepConfig::ErrorRegularizedGradient => {
                DeltaParameterUpdateStep::boxed(updater::ErrorRegularizedGradient)
            }
            StepConfig::Momentum { ref weights } => {
                DeltaParameterUpdateStep::boxed(updater::Momentum::new(weights.clone())?)
            }
            StepConfig::LargestGradientsOnly { keep_rate } => {
                Box::new(updater::LargestGradientsOnly::new(keep_rate)?)
            }
            StepConfig::LargestDeltasOnly { keep_rate } => {
                Box::new(updater::LargestDeltasOnly::new(keep_rate)?)
            }
            StepConfig::AdaptiveGradientDerivative {
                base_step,
                base_growth_rate,
                window,
            } => Box::new(updater::AdaptiveGradientDerivative::new(
                base_step,
                base_growth_rate,
                window,
            )?),
        })
    }
}

/// Named update pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdaterRegistry {
    recipes: BTreeMap<String, Vec<StepConfig>>,
}

impl UpdaterRegistry {
    /// A registry without any recipes.
    pub fn empty() -> Self {
        UpdaterRegistry {
            recipes: BTreeMap::new(),
        }
    }

    /// Stores `steps` under `name`, returning any recipe it replaces.
    pub fn register(&mut self, name: &str, steps: Vec<StepConfig>) -> Option<Vec<StepConfig>> {
        self.recipes.insert(name.to_owned(), steps)
    }

    pub fn get(&self, name: &str) -> Option<&[StepConfig]> {
        self.recipes.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    /// Builds a new updater from the recipe `name`.
    pub fn create(&self, name: &str) -> Result<ParameterUpdater> {
        let recipe = self.get(name).ok_or_else(|| {
            Error::InvalidConfiguration(format!("no updater named {:?}", name))
        })?;
        let steps = recipe
            .iter()
            .map(StepConfig::build)
            .collect::<Result<Vec<_>>>()?;
        Ok(ParameterUpdater::new(steps))
    }
}

impl Default for UpdaterRegistry {
    /// The registry with the built-in recipes:
    ///
    ///  * `SimpleUpdater` - the gradient, clamped to 1, scaled by 0.0001.
    ///  * `ErrorRegularizedUpdater` - the gradient over the average error,
    ///    log scaled, with momentum, updating only the half of the parameters
    ///    with the largest gradients.
    ///  * `AdaptiveUpdater` - per-parameter adaptive steps.
    fn default() -> Self {
        let mut registry = UpdaterRegistry::empty();
        registry.register(
            "SimpleUpdater",
            vec![
                StepConfig::FlatGradient,
                StepConfig::ClampedDelta { limit: 1.0 },
                StepConfig::FlatLearningRate { rate: 1e-4 },
            ],
        );
        registry.register(
            "ErrorRegularizedUpdater",
            vec![
                StepConfig::ErrorRegularizedGradient,
                StepConfig::LogScaledDelta,
                StepConfig::Momentum {
                    weights: vec![0.9, 0.1],
                },
                StepConfig::LargestGradientsOnly { keep_rate: 0.5 },
            ],
        );
        registry.register(
            "AdaptiveUpdater",
            vec![StepConfig::AdaptiveGradientDerivative {
                base_step: 1e-3,
                base_growth_rate: 0.1,
                window: 5,
            }],
        );
        registry
    }
}

/// Describes a feed-forward network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of nodes in each layer, inputs first.
    pub nodes: Vec<usize>,
    pub layer: LayerKind,
    pub activator: Activator,
    pub cost: Cost,
    pub generator: ParameterGenerator,
    /// Name of the `UpdaterRegistry` recipe every layer uses.
    pub updater: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            nodes: vec![1, 3, 1],
            layer: LayerKind::Quadratic,
            activator: Activator::Identity,
            cost: Cost::Quadratic,
            generator: ParameterGenerator::Random,
            updater: "SimpleUpdater".to_owned(),
        }
    }
}

impl NetworkConfig {
    /// Creates a configuration with `nodes` in each layer.
    ///
    /// The remaining settings default to:
    ///
    /// * Quadratic layers.
    /// * The identity activation.
    /// * A quadratic cost.
    /// * Random initial parameters.
    /// * The `SimpleUpdater` recipe.
    pub fn new(nodes: &[usize]) -> Self {
        NetworkConfig {
            nodes: nodes.into(),
            ..NetworkConfig::default()
        }
    }

    /// Sets the kind of layer to build.
    pub fn layer(mut self, layer: LayerKind) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the activation function to use in every layer.
    pub fn activator(mut self, activator: Activator) -> Self {
        self.activator = activator;
        self
    }

    pub fn cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }

    /// Sets how initial parameters are generated.
    pub fn generator(mut self, generator: ParameterGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Sets the registry recipe to create each layer's updater from.
    pub fn updater(mut self, name: &str) -> Self {
        self.updater = name.to_owned();
        self
    }

    /// Verifies that the network can be built, returning an error if
    /// something is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.len() < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "a network needs input and output sizes, got {:?}",
                self.nodes
            )));
        }
        if self.nodes.contains(&0) {
            return Err(Error::InvalidConfiguration(format!(
                "layer sizes must be positive, got {:?}",
                self.nodes
            )));
        }
        Ok(())
    }

    /// Builds an untrained network, giving each layer its own updater from
    /// `registry`.
    pub fn build(&self, registry: &UpdaterRegistry) -> Result<FeedForward> {
        self.validate()?;
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(self.nodes.len() - 1);
        for (level, sizes) in self.nodes.windows(2).enumerate() {
            let pipeline = registry.create(&self.updater)?;
            let (inputs, outputs) = (sizes[0], sizes[1]);
            let layer: Box<dyn Layer> = match self.layer {
                LayerKind::Quadratic => Box::new(
                    QuadraticLayer::new(inputs, outputs, level, self.generator, pipeline)?
                        .with_activator(self.activator),
                ),
                LayerKind::Linear => Box::new(
                    LinearLayer::new(inputs, outputs, level, self.generator, pipeline)?
                        .with_activator(self.activator),
                ),
            };
            layers.push(layer);
        }
        FeedForward::new(layers, self.cost)
    }
}

/// Everything needed to run one training experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub network: NetworkConfig,
    /// The interval training inputs are drawn from.
    pub domain: (f64, f64),
    pub batch_size: usize,
    pub stop_condition: StopCondition,
    pub logging: Logging,
    pub validation_step: f64,
    /// Recipes registered on top of the built-in ones.
    pub updaters: BTreeMap<String, Vec<StepConfig>>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            network: NetworkConfig::default(),
            domain: (-15.0, 15.0),
            batch_size: 50,
            stop_condition: StopCondition::Batches(100),
            logging: Logging::Iterations(10),
            validation_step: 0.1,
            updaters: BTreeMap::new(),
        }
    }
}

impl ExperimentConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| Error::InvalidConfiguration(format!("invalid experiment: {}", err)))
    }

    /// The built-in recipes plus this experiment's own.
    pub fn registry(&self) -> UpdaterRegistry {
        let mut registry = UpdaterRegistry::default();
        for (name, steps) in &self.updaters {
            registry.register(name, steps.clone());
        }
        registry
    }
}
