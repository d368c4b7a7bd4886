//! Method selection and per-method settings, stored as TOML.

use crate::arriaga::{ArriagaDecomposition, arriaga};
use crate::function::{DecompositionError, ScalarFunction};
use crate::horiuchi::{HoriuchiConfig, horiuchi};
use crate::lifetable::rates_to_life_expectancy_at_birth;
use crate::ltre::{LtreConfig, ltre};
use crate::stepwise::{StepwiseConfig, stepwise_replacement};
use crate::types::Contributions;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// The available decomposition methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Closed-form life-expectancy decomposition. Only applies to rate schedules.
    Arriaga,
    /// Numerical line integration along the path between the two vectors.
    Horiuchi,
    /// Sequential one-coordinate-at-a-time replacement.
    Stepwise,
    /// Sensitivity at the midpoint times the parameter change.
    Ltre,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Arriaga => "arriaga",
            Method::Horiuchi => "horiuchi",
            Method::Stepwise => "stepwise",
            Method::Ltre => "ltre",
        };
        f.write_str(name)
    }
}

impl FromStr for Method {
    type Err = DecompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arriaga" => Ok(Method::Arriaga),
            "horiuchi" => Ok(Method::Horiuchi),
            "stepwise" => Ok(Method::Stepwise),
            "ltre" => Ok(Method::Ltre),
            other => Err(DecompositionError::UnknownMethod(other.to_string())),
        }
    }
}

/// Custom error type for reading and writing configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// A complete description of one decomposition run.
///
/// Every section is optional in the TOML file; missing sections take their
/// defaults, so `method = "horiuchi"` alone is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub method: Method,
    /// Upper bound on evaluations of the scalar function for a single decomposition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_evaluations: Option<usize>,
    pub horiuchi: HoriuchiConfig,
    pub stepwise: StepwiseConfig,
    pub ltre: LtreConfig,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            method: Method::Horiuchi,
            max_evaluations: None,
            horiuchi: HoriuchiConfig::default(),
            stepwise: StepwiseConfig::default(),
            ltre: LtreConfig::default(),
        }
    }
}

impl DecompositionConfig {
    pub fn for_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    /// Decomposes `f(theta2) − f(theta1)` with the configured generic method.
    ///
    /// The Arriaga method has no generic form and is rejected here; use
    /// [`decompose_life_expectancy`] for it. `f` must be `Sync` because the
    /// Horiuchi method evaluates it from several threads.
    pub fn decompose<F>(
        &self,
        f: &F,
        theta1: ArrayView1<'_, f64>,
        theta2: ArrayView1<'_, f64>,
    ) -> Result<Contributions, DecompositionError>
    where
        F: ScalarFunction + Sync + ?Sized,
    {
        match self.method {
            Method::Arriaga => Err(DecompositionError::UnsupportedMethod(Method::Arriaga)),
            Method::Horiuchi => horiuchi(f, theta1, theta2, &self.horiuchi, self.max_evaluations),
            Method::Stepwise => {
                stepwise_replacement(f, theta1, theta2, &self.stepwise, self.max_evaluations)
            }
            Method::Ltre => ltre(f, theta1, theta2, &self.ltre, self.max_evaluations),
        }
    }
}

/// Result of decomposing a life-expectancy difference.
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Arriaga(ArriagaDecomposition),
    Generic(Contributions),
}

impl Decomposition {
    pub fn contributions(&self) -> &Contributions {
        match self {
            Decomposition::Arriaga(result) => &result.total,
            Decomposition::Generic(contributions) => contributions,
        }
    }
}

/// Decomposes the difference in life expectancy at birth between two rate
/// schedules with the configured method.
pub fn decompose_life_expectancy(
    mx1: ArrayView1<'_, f64>,
    mx2: ArrayView1<'_, f64>,
    config: &DecompositionConfig,
) -> Result<Decomposition, DecompositionError> {
    match config.method {
        Method::Arriaga => arriaga(mx1, mx2).map(Decomposition::Arriaga),
        _ => config
            .decompose(&rates_to_life_expectancy_at_birth, mx1, mx2)
            .map(Decomposition::Generic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepwise::Direction;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn method_names_round_trip() {
        for method in [Method::Arriaga, Method::Horiuchi, Method::Stepwise, Method::Ltre] {
            assert_eq!(method.to_string().parse::<Method>().unwrap(), method);
        }
        assert_eq!(
            "kitagawa".parse::<Method>(),
            Err(DecompositionError::UnknownMethod("kitagawa".to_string()))
        );
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config: DecompositionConfig = toml::from_str(
            r#"
            method = "stepwise"

            [stepwise]
            direction = "full"
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.method, Method::Stepwise);
        assert_eq!(config.stepwise.direction, Direction::Full);
        assert_eq!(config.stepwise.seed, 7);
        assert_eq!(config.stepwise.permutations, 100);
        assert_eq!(config.horiuchi, HoriuchiConfig::default());
        assert_eq!(config.max_evaluations, None);
    }

    #[test]
    fn custom_order_is_read_from_toml() {
        let config: DecompositionConfig = toml::from_str(
            r#"
            [stepwise]
            direction = { custom = [2, 0, 1] }
            "#,
        )
        .unwrap();
        assert_eq!(config.stepwise.direction, Direction::Custom(vec![2, 0, 1]));
    }

    #[test]
    fn every_method_decomposes_life_expectancy() {
        let mx1 = array![0.01, 0.02, 0.05];
        let mx2 = array![0.005, 0.015, 0.04];
        let exact = rates_to_life_expectancy_at_birth(mx2.view())
            - rates_to_life_expectancy_at_birth(mx1.view());
        for method in [Method::Arriaga, Method::Horiuchi, Method::Stepwise, Method::Ltre] {
            let result = decompose_life_expectancy(
                mx1.view(),
                mx2.view(),
                &DecompositionConfig::for_method(method),
            )
            .unwrap();
            assert_eq!(result.contributions().len(), 3);
            assert_relative_eq!(result.contributions().total(), exact, max_relative = 1e-3);
        }
    }

    #[test]
    fn generic_decompose_rejects_arriaga() {
        let f = |theta: ArrayView1<f64>| theta.sum();
        let theta = array![1.0];
        let config = DecompositionConfig::for_method(Method::Arriaga);
        assert_eq!(
            config.decompose(&f, theta.view(), theta.view()),
            Err(DecompositionError::UnsupportedMethod(Method::Arriaga))
        );
    }
}
