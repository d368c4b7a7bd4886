//! # Stepwise Replacement Decomposition (Andreev)
//!
//! Starting from `θ₁`, coordinates are swapped for their `θ₂` values one at a
//! time in a chosen order. After each swap `f` is re-evaluated, and the change
//! in `f` is credited to the coordinate just swapped. The credits telescope,
//! so their sum is exactly `f(θ₂) − f(θ₁)` for every order.
//!
//! The individual credits, however, depend on the order: a coordinate swapped
//! early is evaluated against more `θ₁` values than one swapped late. This is
//! a property of the method, not a numerical artifact. The `Both` and `Full`
//! directions average over several orders to soften it; they do not remove it.
//!
//! Coordinates with `θ₁ᵢ = θ₂ᵢ` are skipped: their credit is exactly 0 and no
//! evaluation is spent on them.

use crate::config::Method;
use crate::function::{
    DecompositionError, EvaluationSite, ScalarFunction, changing_coordinates, check_budget,
    ensure_same_length, evaluate_checked,
};
use crate::types::Contributions;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order in which coordinates are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending index order.
    Up,
    /// Descending index order.
    Down,
    /// Average of the forward pass `θ₁ → θ₂` (ascending) and the backward pass
    /// `θ₂ → θ₁` (ascending, sign flipped). The backward pass walks the
    /// reverse of the descending forward path, so this is also the average of
    /// the `Up` and `Down` results.
    Both,
    /// Average over `permutations` orders drawn from a seeded generator.
    Full,
    /// An explicit permutation of `0..n`.
    Custom(Vec<usize>),
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::Both => write!(f, "both"),
            Direction::Full => write!(f, "full"),
            Direction::Custom(order) => write!(f, "{}", order.iter().join(",")),
        }
    }
}

impl FromStr for Direction {
    type Err = DecompositionError;

    /// Accepts `up`, `down`, `both`, `full`, or a comma-separated index order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "both" => Ok(Direction::Both),
            "full" => Ok(Direction::Full),
            other => other
                .split(',')
                .map(|token| token.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map(Direction::Custom)
                .map_err(|_| {
                    DecompositionError::InvalidResolution(format!(
                        "unrecognized traversal order '{s}'; expected up, down, both, full, or a comma-separated index list"
                    ))
                }),
        }
    }
}

/// Settings for the stepwise replacement decomposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    /// Number of random orders averaged by `Direction::Full`.
    pub permutations: usize,
    /// Seed for the permutation generator used by `Direction::Full`.
    pub seed: u64,
    pub direction: Direction,
}

impl Default for StepwiseConfig {
    fn default() -> Self {
        Self {
            permutations: 100,
            seed: 0,
            direction: Direction::Both,
        }
    }
}

impl StepwiseConfig {
    pub fn with_direction(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    fn passes(&self) -> usize {
        match self.direction {
            Direction::Both => 2,
            Direction::Full => self.permutations,
            _ => 1,
        }
    }

    /// Number of evaluations of `f`: one starting value plus one per changing
    /// coordinate, for every pass. Saturates at `usize::MAX`.
    pub fn required_evaluations(
        &self,
        theta1: ArrayView1<'_, f64>,
        theta2: ArrayView1<'_, f64>,
    ) -> usize {
        self.passes()
            .saturating_mul(changing_coordinates(theta1, theta2).saturating_add(1))
    }
}

/// Decomposes `f(theta2) − f(theta1)` by sequential coordinate replacement.
pub fn stepwise_replacement<F>(
    f: &F,
    theta1: ArrayView1<'_, f64>,
    theta2: ArrayView1<'_, f64>,
    config: &StepwiseConfig,
    max_evaluations: Option<usize>,
) -> Result<Contributions, DecompositionError>
where
    F: ScalarFunction + ?Sized,
{
    let n = ensure_same_length(theta1, theta2)?;
    check_budget(
        Method::Stepwise,
        config.required_evaluations(theta1, theta2),
        max_evaluations,
    )?;
    let orders = traversal_orders(n, config)?;
    log::info!(
        "Starting stepwise replacement: {n} parameters, direction {}, {} pass(es).",
        config.direction,
        orders.len()
    );

    let mut accumulated = Array1::<f64>::zeros(n);
    for (pass, (order, backward)) in orders.iter().enumerate() {
        let credits = if *backward {
            -replace_along(f, theta2, theta1, order, pass)?
        } else {
            replace_along(f, theta1, theta2, order, pass)?
        };
        accumulated += &credits;
    }
    accumulated /= orders.len() as f64;

    Ok(Contributions::new(accumulated))
}

/// One traversal: move from `from` to `to` replacing coordinates in `order`.
fn replace_along<F>(
    f: &F,
    from: ArrayView1<'_, f64>,
    to: ArrayView1<'_, f64>,
    order: &[usize],
    pass: usize,
) -> Result<Array1<f64>, DecompositionError>
where
    F: ScalarFunction + ?Sized,
{
    let mut current = from.to_owned();
    let mut credits = Array1::<f64>::zeros(from.len());
    let mut previous = evaluate_checked(
        f,
        current.view(),
        Method::Stepwise,
        EvaluationSite::start_of(pass),
    )?;

    for &i in order {
        if from[i] == to[i] {
            continue;
        }
        current[i] = to[i];
        let value = evaluate_checked(
            f,
            current.view(),
            Method::Stepwise,
            EvaluationSite::at(pass, i),
        )?;
        credits[i] = value - previous;
        previous = value;
    }
    Ok(credits)
}

/// Expands a direction into concrete passes: `(order, runs backward from θ₂)`.
fn traversal_orders(
    n: usize,
    config: &StepwiseConfig,
) -> Result<Vec<(Vec<usize>, bool)>, DecompositionError> {
    let ascending: Vec<usize> = (0..n).collect();
    match &config.direction {
        Direction::Up => Ok(vec![(ascending, false)]),
        Direction::Down => Ok(vec![(ascending.into_iter().rev().collect(), false)]),
        Direction::Both => Ok(vec![(ascending.clone(), false), (ascending, true)]),
        Direction::Full => {
            if config.permutations == 0 {
                return Err(DecompositionError::InvalidResolution(
                    "the full direction needs at least one permutation".to_string(),
                ));
            }
            let mut rng = StdRng::seed_from_u64(config.seed);
            Ok((0..config.permutations)
                .map(|_| {
                    let mut order = ascending.clone();
                    order.shuffle(&mut rng);
                    (order, false)
                })
                .collect())
        }
        Direction::Custom(order) => {
            let is_permutation = order.len() == n
                && order.iter().all(|&i| i < n)
                && order.iter().all_unique();
            if !is_permutation {
                return Err(DecompositionError::InvalidResolution(format!(
                    "custom traversal order {order:?} is not a permutation of 0..{n}"
                )));
            }
            Ok(vec![(order.clone(), false)])
        }
    }
}
