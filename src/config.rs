use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::ArArConstants;
use crate::flux::FluxOptions;
use crate::plateau::PlateauOptions;
use crate::Result;

/// Reduction settings, read from a toml file
///
/// Every section and field is optional, missing values take their defaults.
///
/// ```toml
/// [constants]
/// abundance_sensitivity = 1e-6
///
/// [plateau]
/// nsteps = 3
/// gas_fraction = 50.0
///
/// [flux]
/// monitor_age = 28.201
/// model_kind = "Bowl"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub constants: ArArConstants,
    pub plateau: PlateauOptions,
    pub flux: FluxOptions,
}

impl Config {
    /// # Errors
    /// Returns an error if `s` is not valid toml or a value has the wrong type
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use crate::flux_regressor::FluxModelKind;
    use crate::stats::ErrorKind;
    use crate::Error;

    use super::Config;

    #[test]
    fn empty_config_takes_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [plateau]
            nsteps = 4
            fixed_steps = ["B", "F"]
            plateau_age_error_kind = "MSEM"

            [flux]
            model_kind = "Bowl"
            use_monte_carlo = true
            "#,
        )
        .unwrap();

        assert_eq!(config.plateau.nsteps, 4);
        assert_eq!(
            config.plateau.fixed_steps,
            Some(("B".to_owned(), "F".to_owned()))
        );
        assert_eq!(config.plateau.plateau_age_error_kind, ErrorKind::Msem);
        approx::assert_relative_eq!(config.plateau.gas_fraction, 50.0);
        assert_eq!(config.flux.model_kind, FluxModelKind::Bowl);
        assert!(config.flux.use_monte_carlo);
    }

    #[test]
    fn malformed_values_are_errors() {
        let result = Config::from_toml("[plateau]\nnsteps = \"three\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
