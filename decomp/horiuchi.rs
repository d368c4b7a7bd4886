//! # Numerical Integration Decomposition (Horiuchi)
//!
//! The difference `f(θ₂) − f(θ₁)` equals the line integral of the gradient of
//! `f` along the straight path from `θ₁` to `θ₂`. Splitting that integral by
//! coordinate gives each parameter's contribution. We approximate it with a
//! midpoint rule over `N` equal steps:
//!
//! - step `k` (1-based) sits at fraction `(k − ½)/N` of the path,
//! - coordinate `i` is moved by `±δᵢ/2` around that point, `δᵢ = (θ₂ᵢ − θ₁ᵢ)/N`,
//!   with every other coordinate held at the blended value,
//! - `f(θ⁺) − f(θ⁻)` is added to the accumulator for `i`.
//!
//! The summed contributions converge to the exact difference as `N` grows but
//! are never exact for finite `N`. The cost is `2·N·n` evaluations of `f`,
//! minus the coordinates that do not change (their contribution is exactly 0
//! and they are never evaluated).
//!
//! Within one step the `n` coordinates are independent given the blended base
//! vector, so they are evaluated in parallel. Accumulation happens in index
//! order afterwards, which keeps the output identical from run to run.

use crate::config::Method;
use crate::function::{
    DecompositionError, EvaluationSite, ScalarFunction, changing_coordinates, check_budget,
    ensure_same_length, evaluate_checked,
};
use crate::types::Contributions;
use ndarray::{Array1, ArrayView1, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RESOLUTION: usize = 20;

/// Settings for the numerical integration decomposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoriuchiConfig {
    /// Number of integration steps `N`. Must be at least 1.
    pub resolution: usize,
}

impl Default for HoriuchiConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl HoriuchiConfig {
    pub fn with_resolution(resolution: usize) -> Self {
        Self { resolution }
    }

    /// Number of evaluations of `f` a decomposition of `theta1 → theta2` will make.
    ///
    /// Saturates at `usize::MAX` rather than wrapping.
    pub fn required_evaluations(
        &self,
        theta1: ArrayView1<'_, f64>,
        theta2: ArrayView1<'_, f64>,
    ) -> usize {
        2usize
            .saturating_mul(self.resolution)
            .saturating_mul(changing_coordinates(theta1, theta2))
    }
}

/// Decomposes `f(theta2) − f(theta1)` by numerical line integration.
///
/// `max_evaluations` caps the number of calls to `f`; the cap is checked
/// before anything is evaluated.
pub fn horiuchi<F>(
    f: &F,
    theta1: ArrayView1<'_, f64>,
    theta2: ArrayView1<'_, f64>,
    config: &HoriuchiConfig,
    max_evaluations: Option<usize>,
) -> Result<Contributions, DecompositionError>
where
    F: ScalarFunction + Sync + ?Sized,
{
    let n = ensure_same_length(theta1, theta2)?;
    if config.resolution < 1 {
        return Err(DecompositionError::InvalidResolution(format!(
            "Horiuchi resolution must be at least 1, got {}",
            config.resolution
        )));
    }
    check_budget(
        Method::Horiuchi,
        config.required_evaluations(theta1, theta2),
        max_evaluations,
    )?;

    let steps = config.resolution;
    log::info!("Starting Horiuchi decomposition: {n} parameters, {steps} integration steps.");

    let delta: Array1<f64> = (&theta2 - &theta1) / steps as f64;
    let active: Vec<usize> = (0..n).filter(|&i| delta[i] != 0.0).collect();
    if active.is_empty() {
        return Ok(Contributions::zeros(n));
    }
    let mut accumulated = Array1::<f64>::zeros(n);

    for step in 1..=steps {
        let fraction = (step as f64 - 0.5) / steps as f64;
        let mut base = theta1.to_owned();
        Zip::from(&mut base)
            .and(&theta2)
            .for_each(|b, &t2| *b += (t2 - *b) * fraction);

        let differences: Vec<Result<f64, DecompositionError>> = active
            .par_iter()
            .map(|&i| {
                let mut perturbed = base.clone();
                let site = EvaluationSite::at(step, i);

                perturbed[i] = base[i] + delta[i] / 2.0;
                let upper = evaluate_checked(f, perturbed.view(), Method::Horiuchi, site)?;

                perturbed[i] = base[i] - delta[i] / 2.0;
                let lower = evaluate_checked(f, perturbed.view(), Method::Horiuchi, site)?;

                Ok(upper - lower)
            })
            .collect();

        for (&i, difference) in active.iter().zip(differences) {
            accumulated[i] += difference?;
        }
        log::debug!("Horiuchi step {step}/{steps} complete.");
    }

    let contributions = Contributions::new(accumulated);
    log::debug!(
        "Horiuchi decomposition finished; contributions sum to {:.12}",
        contributions.total()
    );
    Ok(contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetable::rates_to_life_expectancy_at_birth;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn product(theta: ArrayView1<f64>) -> f64 {
        theta.iter().product()
    }

    #[test]
    fn linear_function_is_decomposed_exactly() {
        let f = |theta: ArrayView1<f64>| 2.0 * theta[0] - 3.0 * theta[1] + 0.5 * theta[2];
        let theta1 = array![1.0, 2.0, 3.0];
        let theta2 = array![2.0, 1.0, 5.0];
        let result = horiuchi(
            &f,
            theta1.view(),
            theta2.view(),
            &HoriuchiConfig::with_resolution(1),
            None,
        )
        .unwrap();
        assert_relative_eq!(result[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(result[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(result[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn error_shrinks_as_resolution_grows() {
        let theta1 = array![1.0, 2.0, 0.5];
        let theta2 = array![1.5, 1.2, 1.4];
        let exact = product(theta2.view()) - product(theta1.view());

        let mut previous = f64::INFINITY;
        for steps in [1, 5, 20, 100] {
            let result = horiuchi(
                &product,
                theta1.view(),
                theta2.view(),
                &HoriuchiConfig::with_resolution(steps),
                None,
            )
            .unwrap();
            let error = (result.total() - exact).abs();
            assert!(
                error <= previous,
                "error {error} at N={steps} exceeded {previous}"
            );
            previous = error;
        }
        assert!(previous < 1e-4);
    }

    #[test]
    fn matches_life_expectancy_difference() {
        let mx1 = array![0.01, 0.02, 0.05];
        let mx2 = array![0.005, 0.015, 0.04];
        let result = horiuchi(
            &rates_to_life_expectancy_at_birth,
            mx1.view(),
            mx2.view(),
            &HoriuchiConfig::with_resolution(50),
            None,
        )
        .unwrap();
        let exact = rates_to_life_expectancy_at_birth(mx2.view())
            - rates_to_life_expectancy_at_birth(mx1.view());
        assert_relative_eq!(result.total(), exact, max_relative = 1e-3);
    }

    #[test]
    fn identical_vectors_give_exact_zero() {
        let theta = array![0.3, 0.1];
        let result = horiuchi(
            &product,
            theta.view(),
            theta.view(),
            &HoriuchiConfig::default(),
            Some(0),
        )
        .unwrap();
        assert!(result.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_resolution_is_rejected_before_evaluation() {
        let f = |_: ArrayView1<f64>| -> f64 { panic!("must not be evaluated") };
        let theta1 = array![1.0];
        let theta2 = array![2.0];
        let err = horiuchi(
            &f,
            theta1.view(),
            theta2.view(),
            &HoriuchiConfig::with_resolution(0),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DecompositionError::InvalidResolution(_)));
    }

    #[test]
    fn undefined_values_report_step_and_index() {
        // Defined only for theta[1] > 0. At step 2 the blended value of theta[1]
        // is 0.25 and the upper perturbation lands exactly on 0.
        let f = |theta: ArrayView1<f64>| theta[0] + theta[1].ln();
        let theta1 = array![1.0, 1.0];
        let theta2 = array![2.0, -1.0];
        let err = horiuchi(
            &f,
            theta1.view(),
            theta2.view(),
            &HoriuchiConfig::with_resolution(4),
            None,
        )
        .unwrap_err();
        match err {
            DecompositionError::EvaluationFailure { method, site, .. } => {
                assert_eq!(method, Method::Horiuchi);
                assert_eq!(site, EvaluationSite::at(2, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn evaluation_cap_is_enforced() {
        let theta1 = array![1.0, 2.0, 3.0];
        let theta2 = array![2.0, 2.0, 4.0];
        // Two changing coordinates, 10 steps, 2 evaluations each.
        let config = HoriuchiConfig::with_resolution(10);
        assert_eq!(config.required_evaluations(theta1.view(), theta2.view()), 40);
        let err = horiuchi(&product, theta1.view(), theta2.view(), &config, Some(39)).unwrap_err();
        assert_eq!(
            err,
            DecompositionError::EvaluationBudgetExceeded {
                method: Method::Horiuchi,
                required: 40,
                limit: 39
            }
        );
        assert!(horiuchi(&product, theta1.view(), theta2.view(), &config, Some(40)).is_ok());
    }

    #[test]
    fn oversized_resolution_saturates_the_evaluation_count() {
        let f = |_: ArrayView1<f64>| -> f64 { panic!("must not be evaluated") };
        let theta1 = array![0.0, 0.0];
        let theta2 = array![1.0, 1.0];
        let config = HoriuchiConfig::with_resolution(usize::MAX / 2 + 1);
        assert_eq!(
            config.required_evaluations(theta1.view(), theta2.view()),
            usize::MAX
        );
        assert_eq!(
            horiuchi(&f, theta1.view(), theta2.view(), &config, Some(1000)),
            Err(DecompositionError::EvaluationBudgetExceeded {
                method: Method::Horiuchi,
                required: usize::MAX,
                limit: 1000
            })
        );
    }
}
