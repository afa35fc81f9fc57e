use serde::{Deserialize, Serialize};

use crate::UFloat;

/// Units ages are reported in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum AgeUnits {
    Ga,
    #[default]
    Ma,
    #[serde(rename = "ka")]
    Ka,
    #[serde(rename = "a")]
    A,
}

impl AgeUnits {
    /// Number of years in one unit
    #[must_use]
    pub const fn scalar(self) -> f64 {
        match self {
            Self::Ga => 1e9,
            Self::Ma => 1e6,
            Self::Ka => 1e3,
            Self::A => 1.0,
        }
    }

    /// Factor converting one unit to Ma
    #[must_use]
    pub fn ma_scalar(self) -> f64 {
        self.scalar() / 1e6
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ValueError {
    pub value: f64,
    #[serde(default)]
    pub error: f64,
}

impl ValueError {
    #[must_use]
    pub const fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    #[must_use]
    pub fn tagged(&self, tag: &str) -> UFloat {
        UFloat::tagged(self.value, self.error, tag)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
/// Decay constants, atmospheric ratios and options governing the age calculation
///
/// Decay constants for 40K are per year, those for the short lived nuclides are per day.
pub struct ArArConstants {
    pub lambda_b: ValueError,
    pub lambda_e: ValueError,
    pub lambda_ar37: ValueError,
    pub lambda_ar39: ValueError,
    pub lambda_cl36: ValueError,
    pub atm4036: ValueError,
    pub atm3836: ValueError,
    pub abundance_sensitivity: f64,
    pub allow_negative_ca_correction: bool,
    pub age_units: AgeUnits,
}

impl Default for ArArConstants {
    fn default() -> Self {
        Self {
            lambda_b: ValueError::new(4.962e-10, 9.3e-13),
            lambda_e: ValueError::new(5.81e-11, 1.6e-13),
            lambda_ar37: ValueError::new(1.975e-2, 0.0),
            lambda_ar39: ValueError::new(7.068e-6, 0.0),
            lambda_cl36: ValueError::new(6.308e-9, 0.0),
            atm4036: ValueError::new(295.5, 0.5),
            atm3836: ValueError::new(0.1869, 0.0),
            abundance_sensitivity: 0.0,
            allow_negative_ca_correction: false,
            age_units: AgeUnits::Ma,
        }
    }
}

impl ArArConstants {
    /// Total decay constant of 40K, per year
    ///
    /// Exact: the decay constant errors are not propagated into ages.
    #[must_use]
    pub fn lambda_k(&self) -> UFloat {
        UFloat::exact(self.lambda_b.value + self.lambda_e.value)
    }

    #[must_use]
    pub fn atm4036(&self) -> UFloat {
        self.atm4036.tagged("Ar40/Ar36atm")
    }

    #[must_use]
    pub fn atm3836(&self) -> UFloat {
        self.atm3836.tagged("Ar38/Ar36atm")
    }

    #[must_use]
    pub const fn age_scalar(&self) -> f64 {
        self.age_units.scalar()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
/// Nucleogenic interference production ratios of an irradiation
pub struct InterferenceCorrections {
    pub k4039: ValueError,
    pub k3839: ValueError,
    pub k3739: ValueError,
    pub ca3937: ValueError,
    pub ca3837: ValueError,
    pub ca3637: ValueError,
    pub cl3638: ValueError,
}

impl InterferenceCorrections {
    /// The same ratios with their uncertainties removed
    #[must_use]
    pub fn without_errors(&self) -> Self {
        let strip = |v: &ValueError| ValueError::new(v.value, 0.0);
        Self {
            k4039: strip(&self.k4039),
            k3839: strip(&self.k3839),
            k3739: strip(&self.k3739),
            ca3937: strip(&self.ca3937),
            ca3837: strip(&self.ca3837),
            ca3637: strip(&self.ca3637),
            cl3638: strip(&self.cl3638),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
/// Ca/K and Cl/K production ratios used to convert 39K/37Ca and 39K/38Cl to K/Ca and K/Cl
pub struct ProductionRatios {
    pub ca_k: Option<f64>,
    pub cl_k: Option<f64>,
}

impl ProductionRatios {
    /// Multiplicative factor converting 39K/37Ca to K/Ca
    ///
    /// A missing or zero ratio is treated as unity.
    #[must_use]
    pub fn k_ca_factor(&self) -> f64 {
        factor(self.ca_k)
    }

    #[must_use]
    pub fn k_cl_factor(&self) -> f64 {
        factor(self.cl_k)
    }
}

fn factor(ratio: Option<f64>) -> f64 {
    match ratio {
        Some(r) if r != 0.0 => r.recip(),
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use crate::argon::age_equation;
    use crate::UFloat;

    use super::{AgeUnits, ArArConstants, ProductionRatios};

    #[test]
    fn total_decay_constant_is_sum_of_branches() {
        let constants = ArArConstants::default();
        approx::assert_relative_eq!(constants.lambda_k().nominal_value(), 5.543e-10);
    }

    #[test]
    fn ages_carry_no_decay_constant_error() {
        let constants = ArArConstants::default();
        assert!(constants.lambda_b.error > 0.0);
        approx::assert_abs_diff_eq!(constants.lambda_k().std_dev(), 0.0);

        let age = age_equation(&UFloat::exact(1e-3), &UFloat::exact(10.0), &constants);
        assert!(age.nominal_value() > 0.0);
        approx::assert_abs_diff_eq!(age.std_dev(), 0.0);
    }

    #[test]
    fn missing_and_zero_production_ratios_are_unity() {
        let ratios = ProductionRatios::default();
        approx::assert_relative_eq!(ratios.k_ca_factor(), 1.0);

        let ratios = ProductionRatios {
            ca_k: Some(0.0),
            cl_k: Some(4.0),
        };
        approx::assert_relative_eq!(ratios.k_ca_factor(), 1.0);
        approx::assert_relative_eq!(ratios.k_cl_factor(), 0.25);
    }

    #[test]
    fn age_units_scale_to_ma() {
        approx::assert_relative_eq!(AgeUnits::Ka.ma_scalar(), 1e-3);
        approx::assert_relative_eq!(AgeUnits::Ga.ma_scalar(), 1e3);
    }
}
