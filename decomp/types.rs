use ndarray::{Array1, ArrayView1};
use std::ops::{Deref, DerefMut};

/// Per-parameter contributions to the difference `f(θ₂) − f(θ₁)`.
///
/// Position `i` is attributed to parameter `i` of the input vectors, so the
/// ordering always matches the ordering of the parameter vectors passed in.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct Contributions(pub Array1<f64>);

impl Contributions {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(Array1::zeros(len))
    }

    /// Sum of all contributions; compare against the directly computed difference.
    pub fn total(&self) -> f64 {
        self.0.sum()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.0
    }

    pub fn as_view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }
}

impl Deref for Contributions {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Contributions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Array1<f64>> for Contributions {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Contributions> for Array1<f64> {
    fn from(values: Contributions) -> Self {
        values.0
    }
}
