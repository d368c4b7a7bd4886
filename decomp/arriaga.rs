//! # Closed-Form (Arriaga) Decomposition of Life Expectancy
//!
//! Splits `e0(mx2) − e0(mx1)` into age-specific contributions, each the sum of
//!
//! - a direct effect: the change in years lived inside the age interval,
//!   `lx1[x] · (Lx2[x]/lx2[x] − Lx1[x]/lx1[x])`
//! - an indirect effect: the change in survivors reaching the next interval,
//!   carried through all older ages, `Tx2[x+1] · (lx1[x]/lx2[x] − lx1[x+1]/lx2[x+1])`
//!
//! For the final (open) age group there is no next interval; its indirect
//! effect is exactly 0.
//!
//! The contributions sum to the life-expectancy difference by algebraic
//! telescoping, not by approximation. Their age pattern differs visibly from
//! the generalized methods (`horiuchi`, `stepwise`, `ltre`) even though all of
//! them add up to the same total. That known discrepancy is left as is; the
//! classic formula is used unmodified.

use crate::function::{DecompositionError, ensure_same_length};
use crate::lifetable::{LifeTable, safe_ratio};
use crate::types::Contributions;
use ndarray::{Array1, ArrayView1};

/// Direct, indirect and total age contributions to a life-expectancy difference.
#[derive(Debug, Clone, PartialEq)]
pub struct ArriagaDecomposition {
    pub direct: Array1<f64>,
    pub indirect: Array1<f64>,
    pub total: Contributions,
}

/// Decomposes `e0(mx2) − e0(mx1)` by age.
pub fn arriaga(
    mx1: ArrayView1<'_, f64>,
    mx2: ArrayView1<'_, f64>,
) -> Result<ArriagaDecomposition, DecompositionError> {
    let n = ensure_same_length(mx1, mx2)?;
    log::info!("Starting Arriaga decomposition over {n} age groups.");

    let first = LifeTable::from_rates(mx1);
    let second = LifeTable::from_rates(mx2);

    let direct = Array1::from_shape_fn(n, |x| {
        first.lx[x]
            * (safe_ratio(second.Lx[x], second.lx[x]) - safe_ratio(first.Lx[x], first.lx[x]))
    });

    let indirect = Array1::from_shape_fn(n, |x| {
        if x + 1 >= n {
            return 0.0;
        }
        second.Tx[x + 1]
            * (safe_ratio(first.lx[x], second.lx[x]) - safe_ratio(first.lx[x + 1], second.lx[x + 1]))
    });

    let total = Contributions::new(&direct + &indirect);
    log::debug!(
        "Arriaga decomposition: sum of contributions {:.12}, e0 difference {:.12}",
        total.total(),
        second.e0() - first.e0()
    );

    Ok(ArriagaDecomposition {
        direct,
        indirect,
        total,
    })
}
