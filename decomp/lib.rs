#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
#![allow(non_snake_case)]

pub mod arriaga;
pub mod config;
pub mod data;
pub mod function;
pub mod functions;
pub mod horiuchi;
pub mod lifetable;
pub mod ltre;
pub mod stepwise;
pub mod types;

pub use function::{DecompositionError, GradientFunction, ScalarFunction};
pub use types::Contributions;
