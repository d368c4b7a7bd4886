//! # Scalar Functions and the Shared Error Taxonomy
//!
//! Every decomposer treats the demographic summary `f` as an opaque black box:
//! it only ever calls `evaluate` on a parameter vector and looks at the number
//! that comes back. Nothing about the form of `f`, its derivatives, or its
//! internal state is assumed.
//!
//! A function signals failure by returning a non-finite value (NaN or ±∞).
//! The decomposers never let such a value reach a contribution vector; they
//! stop and report an `EvaluationFailure` naming the method, the step and
//! index being evaluated, and the offending parameter vector.

use crate::config::Method;
use ndarray::{Array1, ArrayView1};
use std::fmt;
use thiserror::Error;

/// A scalar summary of a parameter vector, e.g. life expectancy at birth.
///
/// Implemented for every `Fn(ArrayView1<f64>) -> f64`, so plain functions
/// and closures can be passed directly. Only `horiuchi`, which evaluates
/// independent coordinates in parallel, additionally requires `Sync`.
pub trait ScalarFunction {
    fn evaluate(&self, theta: ArrayView1<'_, f64>) -> f64;
}

impl<F> ScalarFunction for F
where
    F: Fn(ArrayView1<'_, f64>) -> f64,
{
    fn evaluate(&self, theta: ArrayView1<'_, f64>) -> f64 {
        self(theta)
    }
}

/// An analytical gradient of a scalar function, consumed by the LTRE decomposer.
pub trait GradientFunction {
    fn gradient(&self, theta: ArrayView1<'_, f64>) -> Array1<f64>;
}

impl<F> GradientFunction for F
where
    F: Fn(ArrayView1<'_, f64>) -> Array1<f64>,
{
    fn gradient(&self, theta: ArrayView1<'_, f64>) -> Array1<f64> {
        self(theta)
    }
}

/// Where along a decomposition an evaluation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationSite {
    /// Integration step, counted from 1 (Horiuchi, LTRE), or traversal pass,
    /// counted from 0 (stepwise).
    pub step: Option<usize>,
    /// Parameter index being perturbed or replaced.
    pub index: Option<usize>,
}

impl EvaluationSite {
    pub fn at(step: usize, index: usize) -> Self {
        Self {
            step: Some(step),
            index: Some(index),
        }
    }

    pub fn start_of(step: usize) -> Self {
        Self {
            step: Some(step),
            index: None,
        }
    }
}

impl fmt::Display for EvaluationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.step, self.index) {
            (Some(step), Some(index)) => write!(f, "step {step}, index {index}"),
            (Some(step), None) => write!(f, "the start of step {step}"),
            (None, Some(index)) => write!(f, "index {index}"),
            (None, None) => write!(f, "an endpoint"),
        }
    }
}

/// Errors shared by all decomposition methods.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecompositionError {
    #[error(
        "Parameter vectors must have equal length, but the first has {first} entries and the second has {second}."
    )]
    LengthMismatch { first: usize, second: usize },

    #[error(
        "The {method} decomposition evaluated the scalar function at {site} and got a non-finite value ({value}). Parameters: {parameters:?}"
    )]
    EvaluationFailure {
        method: Method,
        site: EvaluationSite,
        value: f64,
        parameters: Vec<f64>,
    },

    #[error("Invalid decomposition setting: {0}")]
    InvalidResolution(String),

    #[error("Unknown decomposition method '{0}'; expected arriaga, horiuchi, stepwise, or ltre.")]
    UnknownMethod(String),

    #[error(
        "The {0} method has no generic form; it only decomposes life expectancy from rate schedules."
    )]
    UnsupportedMethod(Method),

    #[error("Imputed weight index {imputed} is outside the {ages} age groups.")]
    ImputedIndexOutOfRange { imputed: usize, ages: usize },

    #[error(
        "The {method} decomposition needs {required} function evaluations, which exceeds the limit of {limit}."
    )]
    EvaluationBudgetExceeded {
        method: Method,
        required: usize,
        limit: usize,
    },

    #[error("The analytical gradient returned {found} entries, but the parameter vector has {expected}.")]
    GradientLengthMismatch { expected: usize, found: usize },
}

/// Rejects parameter vectors of different lengths and returns the common length.
pub fn ensure_same_length(
    first: ArrayView1<'_, f64>,
    second: ArrayView1<'_, f64>,
) -> Result<usize, DecompositionError> {
    if first.len() != second.len() {
        return Err(DecompositionError::LengthMismatch {
            first: first.len(),
            second: second.len(),
        });
    }
    Ok(first.len())
}

/// Fails before any evaluation when `required` exceeds the caller's cap.
pub(crate) fn check_budget(
    method: Method,
    required: usize,
    limit: Option<usize>,
) -> Result<(), DecompositionError> {
    match limit {
        Some(limit) if required > limit => Err(DecompositionError::EvaluationBudgetExceeded {
            method,
            required,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Evaluates `f` and turns a non-finite result into an `EvaluationFailure`.
pub(crate) fn evaluate_checked<F>(
    f: &F,
    theta: ArrayView1<'_, f64>,
    method: Method,
    site: EvaluationSite,
) -> Result<f64, DecompositionError>
where
    F: ScalarFunction + ?Sized,
{
    let value = f.evaluate(theta);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecompositionError::EvaluationFailure {
            method,
            site,
            value,
            parameters: theta.to_vec(),
        })
    }
}

/// Number of coordinates that actually change between the two vectors.
pub(crate) fn changing_coordinates(
    first: ArrayView1<'_, f64>,
    second: ArrayView1<'_, f64>,
) -> usize {
    first
        .iter()
        .zip(second.iter())
        .filter(|(a, b)| a != b)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn closures_are_scalar_functions() {
        let f = |theta: ArrayView1<f64>| theta.sum();
        let theta = array![1.0, 2.0, 3.5];
        assert_eq!(f.evaluate(theta.view()), 6.5);
    }

    #[test]
    fn length_mismatch_is_reported_with_both_lengths() {
        let a = array![1.0, 2.0];
        let b = array![1.0, 2.0, 3.0];
        let err = ensure_same_length(a.view(), b.view()).unwrap_err();
        assert_eq!(
            err,
            DecompositionError::LengthMismatch {
                first: 2,
                second: 3
            }
        );
    }

    #[test]
    fn non_finite_values_become_evaluation_failures() {
        let f = |theta: ArrayView1<f64>| theta[0].ln();
        let theta = array![-1.0];
        let err = evaluate_checked(
            &f,
            theta.view(),
            Method::Horiuchi,
            EvaluationSite::at(2, 0),
        )
        .unwrap_err();
        match err {
            DecompositionError::EvaluationFailure {
                method,
                site,
                parameters,
                ..
            } => {
                assert_eq!(method, Method::Horiuchi);
                assert_eq!(site, EvaluationSite::at(2, 0));
                assert_eq!(parameters, vec![-1.0]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn budget_allows_exact_limit_and_rejects_more() {
        assert!(check_budget(Method::Stepwise, 10, Some(10)).is_ok());
        assert!(check_budget(Method::Stepwise, 10, None).is_ok());
        assert_eq!(
            check_budget(Method::Stepwise, 11, Some(10)),
            Err(DecompositionError::EvaluationBudgetExceeded {
                method: Method::Stepwise,
                required: 11,
                limit: 10
            })
        );
    }

    #[test]
    fn changing_coordinates_ignores_equal_entries() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![1.0, 2.5, 3.5];
        assert_eq!(changing_coordinates(a.view(), b.view()), 2);
    }

    #[test]
    fn site_display_names_step_and_index() {
        assert_eq!(EvaluationSite::at(3, 1).to_string(), "step 3, index 1");
        assert_eq!(EvaluationSite::start_of(0).to_string(), "the start of step 0");
        assert_eq!(EvaluationSite::default().to_string(), "an endpoint");
    }
}
