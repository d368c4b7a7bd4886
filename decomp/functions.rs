//! Ready-made scalar functions for the decomposition methods.
//!
//! `rates_to_life_expectancy_at_birth` (from `lifetable`) is usable directly
//! as a `ScalarFunction`. The types here cover summaries whose parameter
//! vector stacks several semantic blocks.

use crate::function::{DecompositionError, ScalarFunction};
use crate::lifetable::LifeTable;
use ndarray::{Array1, ArrayView1, s};

/// Remaining life expectancy at a given age index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeExpectancyAt {
    pub age: usize,
}

impl ScalarFunction for LifeExpectancyAt {
    /// NaN when the age lies outside the schedule.
    fn evaluate(&self, mx: ArrayView1<'_, f64>) -> f64 {
        LifeTable::from_rates(mx)
            .ex
            .get(self.age)
            .copied()
            .unwrap_or(f64::NAN)
    }
}

/// Crude death rate `Σ mₓ·wₓ` of a population with age structure `w`.
///
/// The weights sum to 1, so one of them carries no information: the weight
/// at `imputed` is not a parameter and is computed as `1 − Σ(other weights)`.
/// The parameter vector is `[m₀ … mₙ₋₁, free weights in age order]`, of
/// length `2n − 1`.
///
/// Which weight is imputed changes how the structure effect is spread over
/// ages, but not its total: the imputed weight moves linearly with the free
/// ones, so every choice describes the same straight path between the two
/// populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrudeDeathRate {
    ages: usize,
    imputed: usize,
}

impl CrudeDeathRate {
    pub fn new(ages: usize, imputed: usize) -> Result<Self, DecompositionError> {
        if imputed >= ages {
            return Err(DecompositionError::ImputedIndexOutOfRange { imputed, ages });
        }
        Ok(Self { ages, imputed })
    }

    pub fn ages(&self) -> usize {
        self.ages
    }

    pub fn parameter_len(&self) -> usize {
        2 * self.ages - 1
    }

    /// Builds the parameter vector from full rate and weight schedules,
    /// dropping the imputed weight.
    pub fn parameters(
        &self,
        rates: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<Array1<f64>, DecompositionError> {
        for block in [rates.len(), weights.len()] {
            if block != self.ages {
                return Err(DecompositionError::LengthMismatch {
                    first: self.ages,
                    second: block,
                });
            }
        }
        let free_weights = weights
            .iter()
            .enumerate()
            .filter(|&(x, _)| x != self.imputed)
            .map(|(_, &w)| w);
        Ok(rates.iter().copied().chain(free_weights).collect())
    }

    fn ensure_parameter_len(&self, len: usize) -> Result<(), DecompositionError> {
        if len != self.parameter_len() {
            return Err(DecompositionError::LengthMismatch {
                first: self.parameter_len(),
                second: len,
            });
        }
        Ok(())
    }

    /// The full weight schedule implied by a parameter vector.
    pub fn weights(&self, theta: ArrayView1<'_, f64>) -> Result<Array1<f64>, DecompositionError> {
        self.ensure_parameter_len(theta.len())?;
        let free = theta.slice(s![self.ages..]);
        let mut weights = Array1::zeros(self.ages);
        let mut free_iter = free.iter();
        for x in 0..self.ages {
            if x != self.imputed {
                weights[x] = free_iter.next().copied().unwrap_or(0.0);
            }
        }
        weights[self.imputed] = 1.0 - free.sum();
        Ok(weights)
    }

    /// Maps contributions over the `2n − 1` parameters back to `2n` entries,
    /// rates first then weights, with 0 at the imputed weight.
    pub fn expand(
        &self,
        contributions: ArrayView1<'_, f64>,
    ) -> Result<Array1<f64>, DecompositionError> {
        self.ensure_parameter_len(contributions.len())?;
        let mut full = Array1::zeros(2 * self.ages);
        full.slice_mut(s![..self.ages])
            .assign(&contributions.slice(s![..self.ages]));
        let mut free = contributions.slice(s![self.ages..]).into_iter();
        for x in 0..self.ages {
            if x != self.imputed {
                full[self.ages + x] = free.next().copied().unwrap_or(0.0);
            }
        }
        Ok(full)
    }
}

impl ScalarFunction for CrudeDeathRate {
    /// NaN when the vector does not have `2n − 1` entries.
    fn evaluate(&self, theta: ArrayView1<'_, f64>) -> f64 {
        match self.weights(theta) {
            Ok(weights) => theta.slice(s![..self.ages]).dot(&weights),
            Err(_) => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn crude_death_rate_imputes_the_missing_weight() {
        let cdr = CrudeDeathRate::new(3, 1).unwrap();
        let theta = cdr
            .parameters(array![0.01, 0.02, 0.1].view(), array![0.5, 0.3, 0.2].view())
            .unwrap();
        assert_eq!(theta, array![0.01, 0.02, 0.1, 0.5, 0.2]);

        let weights = cdr.weights(theta.view()).unwrap();
        assert_relative_eq!(weights[1], 0.3, epsilon = 1e-12);
        assert_relative_eq!(
            cdr.evaluate(theta.view()),
            0.01 * 0.5 + 0.02 * 0.3 + 0.1 * 0.2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn expand_places_zero_at_imputed_weight() {
        let cdr = CrudeDeathRate::new(2, 0).unwrap();
        let expanded = cdr.expand(array![1.0, 2.0, 3.0].view()).unwrap();
        assert_eq!(expanded, array![1.0, 2.0, 0.0, 3.0]);
    }

    #[test]
    fn short_vectors_are_length_errors() {
        let cdr = CrudeDeathRate::new(3, 0).unwrap();
        let short = array![0.01, 0.02];
        let expected = DecompositionError::LengthMismatch {
            first: 5,
            second: 2,
        };
        assert_eq!(cdr.weights(short.view()), Err(expected.clone()));
        assert_eq!(cdr.expand(short.view()), Err(expected));
    }

    #[test]
    fn wrong_length_evaluates_to_nan() {
        let cdr = CrudeDeathRate::new(2, 1).unwrap();
        assert!(cdr.evaluate(array![0.1, 0.2].view()).is_nan());
    }

    #[test]
    fn imputed_index_must_be_an_age() {
        assert_eq!(
            CrudeDeathRate::new(2, 2),
            Err(DecompositionError::ImputedIndexOutOfRange {
                imputed: 2,
                ages: 2
            })
        );
    }

    #[test]
    fn life_expectancy_at_age_matches_lifetable() {
        let mx = array![0.01, 0.02, 0.05];
        let table = LifeTable::from_rates(mx.view());
        assert_eq!(LifeExpectancyAt { age: 1 }.evaluate(mx.view()), table.ex[1]);
        assert!(LifeExpectancyAt { age: 3 }.evaluate(mx.view()).is_nan());
    }
}
