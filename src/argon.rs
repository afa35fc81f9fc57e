//! Pure functions of the Ar/Ar age calculation
use std::collections::BTreeMap;

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::constants::{ArArConstants, InterferenceCorrections};
use crate::UFloat;

/// Argon isotopes in the order the age calculation consumes them
pub const ARGON_KEYS: [&str; 5] = ["Ar40", "Ar39", "Ar38", "Ar37", "Ar36"];

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
/// One segment of an irradiation
pub struct ChronSegment {
    /// Relative reactor power during the segment
    pub power: f64,
    /// Duration of the segment in days
    pub duration: f64,
    /// Days elapsed between the end of the segment and the analysis
    pub elapsed: f64,
}

/// Correction factor for decay of a nuclide produced during a segmented irradiation
///
/// For decay constant $\lambda$ and segments of power $p_i$, duration $t_i$ and elapsed time
/// $\Delta t_i$
///
/// $$
///     f = \frac{\sum_i p_i t_i}{\sum_i p_i \frac{1 - e^{-\lambda t_i}}{\lambda e^{\lambda \Delta t_i}}}
/// $$
///
/// With no segments, or a zero decay constant, no correction is applied.
#[must_use]
pub fn calculate_decay_factor(decay_constant: f64, segments: &[ChronSegment]) -> f64 {
    if segments.is_empty() || decay_constant == 0.0 {
        return 1.0;
    }

    let produced: f64 = segments.iter().map(|s| s.power * s.duration).sum();
    let remaining: f64 = segments
        .iter()
        .map(|s| {
            s.power * (1.0 - (-decay_constant * s.duration).exp())
                / (decay_constant * (decay_constant * s.elapsed).exp())
        })
        .sum();

    if remaining == 0.0 {
        1.0
    } else {
        produced / remaining
    }
}

/// Remove tailing from neighbouring masses, assuming a symmetric peak shape
#[must_use]
pub fn abundance_sensitivity_correction(isotopes: &[UFloat; 5], sensitivity: f64) -> [UFloat; 5] {
    let [s40, s39, s38, s37, s36] = isotopes;
    [
        s40 - (s39 + s39) * sensitivity,
        s39 - (s40 + s38) * sensitivity,
        s38 - (s39 + s37) * sensitivity,
        s37 - (s38 + s36) * sensitivity,
        s36 - (s37 + s37) * sensitivity,
    ]
}

/// Solve the age equation $t = \ln(1 + J F) / \lambda_K$, scaled to the configured age units
///
/// Physically impossible inputs ($1 + JF \le 0$) give a zero age.
#[must_use]
pub fn age_equation(j: &UFloat, f: &UFloat, constants: &ArArConstants) -> UFloat {
    let lambda_k = constants.lambda_k();

    let argument = 1.0 + j * f;
    if argument.nominal_value() <= 0.0 {
        return UFloat::zero();
    }

    argument.ln() / lambda_k / constants.age_scalar()
}

/// The irradiation parameter J of a monitor with F-value `f` and known age in years
///
/// $$
///     J = \frac{e^{\lambda_K t} - 1}{F}
/// $$
#[must_use]
pub fn calculate_flux(f: &UFloat, monitor_age: &UFloat, lambda_k: &UFloat) -> UFloat {
    ((lambda_k * monitor_age).exp() - 1.0)
        .checked_div(f)
        .unwrap_or_else(UFloat::zero)
}

#[derive(Clone, Debug, Default)]
pub struct FCalculation {
    /// Radiogenic 40Ar over 39ArK
    pub f: UFloat,
    /// F with the uncertainty of the interference ratios removed
    pub f_wo_irrad: UFloat,
    pub non_ar_isotopes: BTreeMap<String, UFloat>,
    pub computed: BTreeMap<String, UFloat>,
    pub interference_corrected: BTreeMap<String, UFloat>,
}

/// Compute F from blank, baseline, abundance sensitivity and decay corrected intensities
///
/// `isotopes` are ordered as `ARGON_KEYS`. `decay_days` is the time since irradiation, used
/// for the decay of 36Cl produced during irradiation.
#[must_use]
pub fn calculate_f(
    isotopes: &[UFloat; 5],
    decay_days: f64,
    interferences: &InterferenceCorrections,
    constants: &ArArConstants,
    fixed_k3739: Option<&UFloat>,
) -> FCalculation {
    let mut calculation =
        interference_correct(isotopes, decay_days, interferences, constants, fixed_k3739);
    calculation.f_wo_irrad = interference_correct(
        isotopes,
        decay_days,
        &interferences.without_errors(),
        constants,
        fixed_k3739.map(UFloat::without_error).as_ref(),
    )
    .f;
    calculation
}

#[allow(clippy::many_single_char_names)]
fn interference_correct(
    isotopes: &[UFloat; 5],
    decay_days: f64,
    interferences: &InterferenceCorrections,
    constants: &ArArConstants,
    fixed_k3739: Option<&UFloat>,
) -> FCalculation {
    let [a40, a39, a38, a37, a36] = isotopes;

    let k4039 = interferences.k4039.tagged("K4039");
    let k3839 = interferences.k3839.tagged("K3839");
    let k3739 = fixed_k3739
        .cloned()
        .unwrap_or_else(|| interferences.k3739.tagged("K3739"));
    let ca3937 = interferences.ca3937.tagged("Ca3937");
    let ca3837 = interferences.ca3837.tagged("Ca3837");
    let ca3637 = interferences.ca3637.tagged("Ca3637");
    let cl3638 = interferences.cl3638.tagged("Cl3638");

    let a37 = if constants.allow_negative_ca_correction {
        a37.clone()
    } else {
        a37.max_nominal(0.0)
    };

    // 37 and 39 are mutually dependent, iterate to convergence
    let mut k37 = UFloat::zero();
    let mut ca37 = a37.clone();
    let mut ca39 = UFloat::zero();
    let mut k39 = a39.clone();
    for _ in 0..5 {
        ca37 = &a37 - &k37;
        ca39 = &ca3937 * &ca37;
        k39 = a39 - &ca39;
        k37 = &k3739 * &k39;
    }

    let k38 = &k3839 * &k39;
    let ca36 = &ca3637 * &ca37;
    let ca38 = &ca3837 * &ca37;

    let atm3836 = constants.atm3836();
    let m = cl3638 * constants.lambda_cl36.value * decay_days;
    let atm36 = (a36 - &ca36 - &m * (a38 - &k38 - &ca38))
        .checked_div(&(1.0 - &m * &atm3836))
        .unwrap_or_else(UFloat::zero);
    let cl36 = a36 - &atm36 - &ca36;
    let cl38 = a38 - &k38 - &ca38 - &atm36 * &atm3836;

    let atm40 = &atm36 * constants.atm4036();
    let k40 = &k39 * &k4039;
    let rad40 = a40 - &atm40 - &k40;

    let f = rad40.checked_div(&k39).unwrap_or_else(UFloat::zero);
    let rad40_percent = rad40
        .checked_div(a40)
        .map_or_else(UFloat::zero, |r| r * 100.0);

    let non_ar_isotopes = [
        ("k40", k40.clone()),
        ("ca39", ca39),
        ("k38", k38.clone()),
        ("ca38", ca38.clone()),
        ("cl38", cl38),
        ("k37", k37),
        ("ca37", ca37.clone()),
        ("ca36", ca36.clone()),
        ("cl36", cl36),
        ("atm36", atm36.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect();

    let computed = [
        ("rad40", rad40),
        ("rad40_percent", rad40_percent),
        ("k39", k39.clone()),
        ("a40", a40.clone()),
        ("atm40", atm40),
        ("k40", k40.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect();

    let interference_corrected = [
        ("Ar40", a40 - &k40),
        ("Ar39", k39),
        ("Ar38", a38 - &k38 - &ca38),
        ("Ar37", ca37),
        ("Ar36", a36 - &ca36),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect();

    FCalculation {
        f_wo_irrad: f.clone(),
        f,
        non_ar_isotopes,
        computed,
        interference_corrected,
    }
}
