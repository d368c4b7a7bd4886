//! # Lifetable Kernel
//!
//! Converts a vector of age-specific mortality rates `mx` into the lifetable
//! columns needed to build life-expectancy style scalar functions:
//!
//! - `lx`: survivorship, `lx[0] = 1`, `lx[x] = exp(−Σ_{j<x} mx[j])`
//! - `Lx`: person-years lived in each age interval (trapezoid within the interval)
//! - `Tx`: person-years remaining above each age (reverse cumulative sum of `Lx`)
//! - `ex`: remaining life expectancy, `Tx / lx`
//!
//! All columns have the same length as `mx`. The closing survivorship value
//! (after the last age) is dropped from `lx`, and person-years treat the value
//! past the last index as 0. Under that closeout an all-zero rate schedule of
//! length `m` has `e0 = m − ½`: the last interval is only half lived.
//!
//! Every function here is pure and allocation-bounded by the input length, so
//! the kernel is cheap enough to sit inside a decomposer's inner loop.

use ndarray::{Array1, ArrayView1};

/// The full set of lifetable columns derived from one rate schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct LifeTable {
    pub lx: Array1<f64>,
    pub Lx: Array1<f64>,
    pub Tx: Array1<f64>,
    pub ex: Array1<f64>,
}

impl LifeTable {
    pub fn from_rates(mx: ArrayView1<'_, f64>) -> Self {
        let lx = rates_to_survivorship(mx);
        let Lx = survivorship_to_person_years(lx.view());
        let Tx = reverse_cumulative_sum(Lx.view());
        let ex = ratio_or_zero(Tx.view(), lx.view());
        Self { lx, Lx, Tx, ex }
    }

    pub fn len(&self) -> usize {
        self.lx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lx.is_empty()
    }

    /// Life expectancy at birth, or 0 for an empty schedule.
    pub fn e0(&self) -> f64 {
        self.ex.first().copied().unwrap_or(0.0)
    }
}

/// Survivorship from rates. NaN rates count as zero mortality.
///
/// Missing data should already have been substituted at the data boundary
/// (see `data::load_rate_table`); the NaN rule only keeps the kernel total.
pub fn rates_to_survivorship(mx: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut lx = Array1::zeros(mx.len());
    let mut cumulative_hazard = 0.0_f64;
    for (x, &rate) in mx.iter().enumerate() {
        lx[x] = (-cumulative_hazard).exp();
        if !rate.is_nan() {
            cumulative_hazard += rate;
        }
    }
    lx
}

/// Person-years per interval: `Lx[x] = (lx[x] + lx[x+1]) / 2`, with 0 past the end.
pub fn survivorship_to_person_years(lx: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = lx.len();
    Array1::from_shape_fn(n, |x| {
        let next = if x + 1 < n { lx[x + 1] } else { 0.0 };
        (lx[x] + next) / 2.0
    })
}

/// `Tx[x] = Σ_{j≥x} Lx[j]`.
pub fn reverse_cumulative_sum(values: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut out = Array1::zeros(values.len());
    let mut running = 0.0;
    for x in (0..values.len()).rev() {
        running += values[x];
        out[x] = running;
    }
    out
}

/// Remaining life expectancy `ex = Tx / lx`. Ages with `lx = 0` get `ex = 0`.
pub fn survivorship_to_life_expectancy(lx: ArrayView1<'_, f64>) -> Array1<f64> {
    let Lx = survivorship_to_person_years(lx);
    let Tx = reverse_cumulative_sum(Lx.view());
    ratio_or_zero(Tx.view(), lx)
}

/// Life expectancy at birth from a rate schedule. This is the default scalar
/// function for the decomposition methods.
pub fn rates_to_life_expectancy_at_birth(mx: ArrayView1<'_, f64>) -> f64 {
    let lx = rates_to_survivorship(mx);
    if lx.is_empty() {
        return 0.0;
    }
    // lx[0] = 1, so e0 = T0.
    survivorship_to_person_years(lx.view()).sum()
}

/// `numerator / denominator`, with 0 wherever the denominator is 0.
pub(crate) fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        log::debug!(
            "Division singularity: {numerator} / 0 replaced by 0 in lifetable ratio"
        );
        0.0
    } else {
        numerator / denominator
    }
}

fn ratio_or_zero(numerator: ArrayView1<'_, f64>, denominator: ArrayView1<'_, f64>) -> Array1<f64> {
    Array1::from_shape_fn(numerator.len(), |x| safe_ratio(numerator[x], denominator[x]))
}
