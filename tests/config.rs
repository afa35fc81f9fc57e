use std::fs;

use tempdir::TempDir;

use argon_age::config::Config;
use argon_age::constants::AgeUnits;
use argon_age::flux_regressor::FluxModelKind;
use argon_age::{Error, Result};

#[test]
fn config_is_read_from_disk() -> Result<()> {
    let tmp_dir = TempDir::new("config_is_read_from_disk").unwrap();
    let path = tmp_dir.path().join("argon_age.toml");
    fs::write(
        &path,
        r#"
        [constants]
        age_units = "ka"
        abundance_sensitivity = 1e-6

        [constants.atm4036]
        value = 298.56
        error = 0.31

        [plateau]
        gas_fraction = 60.0

        [flux]
        monitor_age = 1.1864
        model_kind = "Bowl"
        "#,
    )
    .unwrap();

    let config = Config::from_path(&path)?;

    assert_eq!(config.constants.age_units, AgeUnits::Ka);
    approx::assert_relative_eq!(config.constants.atm4036.value, 298.56);
    approx::assert_relative_eq!(config.constants.abundance_sensitivity, 1e-6);
    approx::assert_relative_eq!(config.constants.lambda_b.value, 4.962e-10);
    approx::assert_relative_eq!(config.plateau.gas_fraction, 60.0);
    assert_eq!(config.plateau.nsteps, 3);
    approx::assert_relative_eq!(config.flux.monitor_age, 1.1864);
    assert_eq!(config.flux.model_kind, FluxModelKind::Bowl);
    Ok(())
}

#[test]
fn missing_files_are_io_errors() {
    let tmp_dir = TempDir::new("missing_files_are_io_errors").unwrap();
    let result = Config::from_path(&tmp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn config_round_trips_through_toml() -> Result<()> {
    let config = Config::default();
    let serialised = toml::to_string(&config).unwrap();
    assert_eq!(Config::from_toml(&serialised)?, config);
    Ok(())
}
