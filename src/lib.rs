//! A hand-rolled neural network training engine.
//!
//! Networks are feed-forward stacks of layers with explicit forward and
//! backward passes. Gradients are turned into parameter updates by a
//! composable pipeline of steps that records how every delta was derived,
//! and a `Trainer` drives batches of steps against a known function.

extern crate itertools;
#[macro_use]
extern crate log;
extern crate ndarray;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

pub mod activator;
pub mod config;
pub mod cost;
pub mod error;
pub mod feed_forward;
pub mod generator;
pub mod layers;
pub mod matrix;
pub mod parameter;
pub mod trainer;
pub mod updater;

pub use crate::error::{Error, Result};
