use std::env;
use std::error::Error;
use std::fs;

use env_logger::Env;
use log::info;

use insight::config::ExperimentConfig;
use insight::trainer::{ClosedFormFunction, Trainer};

fn cubic(x: &[f64]) -> Vec<f64> {
    x.iter().map(|x| (x - 10.0) * (x + 2.0) * (x + 7.0)).collect()
}

/// Reads the experiment from the JSON file named by the first argument, or
/// falls back to the defaults.
fn load_config() -> Result<ExperimentConfig, Box<dyn Error>> {
    match env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path)?;
            info!("loaded experiment from {}", path);
            Ok(ExperimentConfig::from_json(&json)?)
        }
        None => Ok(ExperimentConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let network = config.network.build(&config.registry())?;
    let objective =
        ClosedFormFunction::new(cubic, config.domain)?.validation_step(config.validation_step)?;
    info!(
        "training {:?} {:?} network with {} over {:?}",
        config.network.nodes, config.network.layer, config.network.updater, config.domain
    );

    let mut trainer = Trainer::new(network, objective)
        .batch_size(config.batch_size)
        .logging(config.logging)
        .stop_condition(config.stop_condition);
    let before = trainer.validate()?;
    trainer.train()?;
    let after = trainer.validate()?;

    info!(
        "validation error {} -> {} over {} points after {} steps",
        before.avg_error(),
        after.avg_error(),
        after.inputs.len(),
        trainer.step_tally()
    );
    Ok(())
}
