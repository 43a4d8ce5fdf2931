use std::cmp::Ordering;

use super::{ParameterUpdateStep, UpdateContext};
use crate::error::{Error, Result};
use crate::parameter::Parameter;

/// Keeps the deltas of the parameters with the largest magnitude of some
/// measure and zeroes the rest.
#[derive(Clone, Debug)]
struct Largest {
    keep_rate: f64,
}

impl Largest {
    fn new(keep_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&keep_rate) {
            return Err(Error::InvalidConfiguration(format!(
                "keep rate must be within [0, 1], got {}",
                keep_rate
            )));
        }
        Ok(Largest { keep_rate })
    }

    /// Number of parameters kept out of `count`.
    fn kept(&self, count: usize) -> usize {
        ((count as f64 * self.keep_rate).ceil() as usize).min(count)
    }

    /// Indices of the kept parameters, largest `measure` first. Equal
    /// magnitudes keep their original order.
    fn select<F>(&self, parameters: &[&mut Parameter], measure: F) -> Vec<usize>
    where
        F: Fn(&Parameter) -> f64,
    {
        let mut order: Vec<usize> = (0..parameters.len()).collect();
        order.sort_by(|&a, &b| {
            let a = measure(&*parameters[a]).abs();
            let b = measure(&*parameters[b]).abs();
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        });
        order.truncate(self.kept(parameters.len()));
        order
    }

    fn filter<F>(&self, name: &str, parameters: &mut [&mut Parameter], measure: F)
    where
        F: Fn(&Parameter) -> f64,
    {
        let mut keep = vec![false; parameters.len()];
        for index in self.select(parameters, measure) {
            keep[index] = true;
        }
        for (parameter, keep) in parameters.iter_mut().zip(keep) {
            if !keep {
                parameter.record(name, 0.0);
            }
        }
    }
}

/// Only updates the parameters that contributed most to the error: those
/// with the largest gradient magnitudes.
#[derive(Clone, Debug)]
pub struct LargestGradientsOnly {
    largest: Largest,
}

impl LargestGradientsOnly {
    /// `keep_rate` is the fraction of parameters to keep, rounded up.
    pub fn new(keep_rate: f64) -> Result<Self> {
        Ok(LargestGradientsOnly {
            largest: Largest::new(keep_rate)?,
        })
    }

    /// Indices into `parameters` that this filter keeps.
    pub fn select(&self, parameters: &[&mut Parameter]) -> Vec<usize> {
        self.largest.select(parameters, |p| p.gradient)
    }
}

impl ParameterUpdateStep for LargestGradientsOnly {
    fn name(&self) -> &str {
        "LargestGradientsOnly"
    }

    fn update(&mut self, parameters: &mut [&mut Parameter], _: &UpdateContext) -> Result<()> {
        self.largest.filter(self.name(), parameters, |p| p.gradient);
        Ok(())
    }
}

/// Only updates the parameters whose deltas are largest.
#[derive(Clone, Debug)]
pub struct LargestDeltasOnly {
    largest: Largest,
}

impl LargestDeltasOnly {
    /// `keep_rate` is the fraction of parameters to keep, rounded up.
    pub fn new(keep_rate: f64) -> Result<Self> {
        Ok(LargestDeltasOnly {
            largest: Largest::new(keep_rate)?,
        })
    }

    /// Indices into `parameters` that this filter keeps.
    pub fn select(&self, parameters: &[&mut Parameter]) -> Vec<usize> {
        self.largest.select(parameters, |p| p.delta.value())
    }
}

impl ParameterUpdateStep for LargestDeltasOnly {
    fn name(&self) -> &str {
        "LargestDeltasOnly"
    }

    fn update(&mut self, parameters: &mut [&mut Parameter], _: &UpdateContext) -> Result<()> {
        self.largest
            .filter(self.name(), parameters, |p| p.delta.value());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterSet;
    use ndarray::arr2;

    fn example() -> ParameterSet {
        ParameterSet::new(
            "param_1",
            &arr2(&[[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]),
            &arr2(&[[5.0, 10.0, -5.0], [0.0, 100.0, -50.0]]),
        )
        .unwrap()
    }

    fn seeded(set: &mut ParameterSet) -> Vec<&mut Parameter> {
        let mut parameters: Vec<&mut Parameter> = set.parameters_mut().collect();
        for parameter in parameters.iter_mut() {
            let gradient = parameter.gradient;
            parameter.record("FlatGradient", gradient);
        }
        parameters
    }

    fn surviving(parameters: &[&mut Parameter]) -> Vec<f64> {
        parameters
            .iter()
            .filter(|p| p.delta.value() != 0.0)
            .map(|p| p.gradient)
            .collect()
    }

    #[test]
    fn filter_none() {
        let mut set = example();
        let mut parameters = seeded(&mut set);
        let mut filter = LargestGradientsOnly::new(1.0).unwrap();
        assert_eq!(filter.select(&parameters), [4, 5, 1, 0, 2, 3]);
        filter
            .update(&mut parameters, &UpdateContext::default())
            .unwrap();
        assert_eq!(surviving(&parameters), [5.0, 10.0, -5.0, 100.0, -50.0]);
        assert!(parameters.iter().all(|p| p.delta.steps().len() == 1));
    }

    #[test]
    fn filter_all() {
        let mut set = example();
        let mut parameters = seeded(&mut set);
        let mut filter = LargestGradientsOnly::new(0.0).unwrap();
        assert!(filter.select(&parameters).is_empty());
        filter
            .update(&mut parameters, &UpdateContext::default())
            .unwrap();
        assert!(surviving(&parameters).is_empty());
        let last = parameters[4].delta.steps().last().unwrap();
        assert_eq!(last.name, "LargestGradientsOnly");
        assert_eq!(last.input_value, 100.0);
        assert_eq!(last.output_value, 0.0);
    }

    #[test]
    fn keep_top_third() {
        let mut set = example();
        let mut parameters = seeded(&mut set);
        let mut filter = LargestGradientsOnly::new(0.33).unwrap();
        assert_eq!(filter.select(&parameters), [4, 5]);
        filter
            .update(&mut parameters, &UpdateContext::default())
            .unwrap();
        assert_eq!(surviving(&parameters), [100.0, -50.0]);
    }

    #[test]
    fn ties_keep_original_order() {
        let mut set = example();
        let parameters = seeded(&mut set);
        // |5| and |-5| tie for fourth place.
        let filter = LargestGradientsOnly::new(0.66).unwrap();
        assert_eq!(filter.select(&parameters), [4, 5, 1, 0]);
    }

    #[test]
    fn largest_deltas() {
        let mut set = example();
        let mut parameters = seeded(&mut set);
        parameters[0].record("Override", -1000.0);
        let mut filter = LargestDeltasOnly::new(0.2).unwrap();
        assert_eq!(filter.select(&parameters), [0, 4]);
        filter
            .update(&mut parameters, &UpdateContext::default())
            .unwrap();
        let kept: Vec<f64> = parameters
            .iter()
            .map(|p| p.delta.value())
            .filter(|&d| d != 0.0)
            .collect();
        assert_eq!(kept, [-1000.0, 100.0]);
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        assert!(LargestGradientsOnly::new(1.5).is_err());
        assert!(LargestDeltasOnly::new(-0.1).is_err());
    }
}
