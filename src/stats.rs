use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::Error;

/// How the error of a mean is reported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ErrorKind {
    /// Sample standard deviation of the values about the mean
    #[serde(rename = "SD")]
    Sd,
    /// Propagated standard error of the weighted mean
    #[serde(rename = "SEM")]
    Sem,
    /// Standard error, expanded by the root of the MSWD when the data are overdispersed
    #[default]
    #[serde(rename = "MSEM", alias = "SEM, but if MSWD>1 use SEM * sqrt(MSWD)")]
    Msem,
}

impl ErrorKind {
    pub const ALL: [Self; 3] = [Self::Msem, Self::Sem, Self::Sd];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sd => "SD",
            Self::Sem => "SEM",
            Self::Msem => "SEM, but if MSWD>1 use SEM * sqrt(MSWD)",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SD" => Ok(Self::Sd),
            "SEM" => Ok(Self::Sem),
            "MSEM" | "SEM, but if MSWD>1 use SEM * sqrt(MSWD)" => Ok(Self::Msem),
            other => Err(Error::UnknownErrorKind(other.to_owned())),
        }
    }
}

/// Inverse-variance weighted mean and its propagated standard error
///
/// If any error is zero or non-finite the weights are undefined, in that case the arithmetic
/// mean is returned with zero error.
///
/// # Examples
///
/// ```
/// use argon_age::stats::weighted_mean;
///
/// let (mean, error) = weighted_mean(&[1.0, 3.0], &[1.0, 1.0]);
/// assert_eq!(mean, 2.0);
/// assert!((error - 0.5f64.sqrt()).abs() < 1e-12);
/// ```
#[must_use]
pub fn weighted_mean(values: &[f64], errors: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    if errors.iter().any(|e| !e.is_finite() || *e <= 0.0) {
        return (mean(values), 0.0);
    }

    let weights = errors.iter().map(|e| e.powi(-2)).collect::<Vec<_>>();
    let sum_of_weights: f64 = weights.iter().sum();
    let mean = values
        .iter()
        .zip(&weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / sum_of_weights;

    (mean, sum_of_weights.sqrt().recip())
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Arithmetic mean and sample standard deviation (one degree of freedom removed)
#[must_use]
pub fn arithmetic_mean(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let average = mean(values);
    (average, standard_deviation_about(values, average))
}

/// Sample standard deviation of `values` about `center`, $\sqrt{\sum (x - c)^2 / (n - 1)}$
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn standard_deviation_about(values: &[f64], center: f64) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    (values.iter().map(|v| (v - center).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
}

/// Mean square weighted deviation about the weighted mean with `k` fitted parameters
#[must_use]
pub fn mswd(values: &[f64], errors: &[f64], k: usize) -> f64 {
    let (center, _) = weighted_mean(values, errors);
    mswd_about(values, errors, center, k)
}

/// Mean square weighted deviation about a supplied mean
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn mswd_about(values: &[f64], errors: &[f64], center: f64, k: usize) -> f64 {
    let n = values.len();
    if n < 2 || n <= k || errors.iter().any(|e| *e <= 0.0 || !e.is_finite()) {
        return 0.0;
    }
    let chi_squared: f64 = values
        .iter()
        .zip(errors)
        .map(|(v, e)| ((v - center) / e).powi(2))
        .sum();
    chi_squared / (n - k) as f64
}

/// Test whether `mswd` lies within the central 95% interval of the reduced chi-squared
/// distribution for `n` points and `k` fitted parameters
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn validate_mswd(mswd: f64, n: usize, k: usize) -> bool {
    if n < 2 || n <= k {
        return false;
    }
    let dof = (n - k) as f64;
    ChiSquared::new(dof).map_or(false, |distribution| {
        let low = distribution.inverse_cdf(0.025) / dof;
        let high = distribution.inverse_cdf(0.975) / dof;
        (low..=high).contains(&mswd)
    })
}

/// Apply the error reporting rule for `kind`
///
/// Only `ErrorKind::Msem` modifies the error: it is expanded by $\sqrt{MSWD}$ when the MSWD
/// exceeds one, and never shrunk.
#[must_use]
pub fn modify_error(error: f64, kind: ErrorKind, mswd: f64) -> f64 {
    if kind == ErrorKind::Msem && mswd > 1.0 {
        error * mswd.sqrt()
    } else {
        error
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        arithmetic_mean, modify_error, mswd, validate_mswd, weighted_mean, ErrorKind,
    };

    proptest! {
        #[test]
        fn weighted_mean_equals_arithmetic_mean_for_equal_errors(
            values in proptest::collection::vec(-1e3f64..1e3, 1..50),
            error in 1e-3f64..1e2,
        ) {
            let errors = vec![error; values.len()];
            let (weighted, _) = weighted_mean(&values, &errors);
            let (arithmetic, _) = arithmetic_mean(&values);
            prop_assert!((weighted - arithmetic).abs() <= 1e-9 * (1.0 + arithmetic.abs()));
        }

        #[test]
        fn msem_only_ever_inflates(error in 0f64..1e3, mswd in 0f64..1e2) {
            let modified = modify_error(error, ErrorKind::Msem, mswd);
            if mswd <= 1.0 {
                prop_assert_eq!(modified, error);
            } else {
                prop_assert!((modified - error * mswd.sqrt()).abs() <= 1e-12 * (1.0 + modified));
            }
        }

        #[test]
        fn other_error_kinds_are_unmodified(error in 0f64..1e3, mswd in 0f64..1e2) {
            prop_assert_eq!(modify_error(error, ErrorKind::Sem, mswd), error);
            prop_assert_eq!(modify_error(error, ErrorKind::Sd, mswd), error);
        }
    }

    #[test]
    fn mswd_of_perfectly_consistent_data_is_zero() {
        approx::assert_relative_eq!(mswd(&[5.0, 5.0, 5.0], &[0.1, 0.2, 0.3], 1), 0.0);
    }

    #[test]
    fn mswd_matches_hand_calculation() {
        let values = [1.0, 3.0];
        let errors = [1.0, 1.0];
        // mean 2, chi2 = 1 + 1, dof = 1
        approx::assert_relative_eq!(mswd(&values, &errors, 1), 2.0);
    }

    #[test]
    fn unit_mswd_is_valid_and_large_mswd_is_not() {
        assert!(validate_mswd(1.0, 10, 1));
        assert!(!validate_mswd(10.0, 10, 1));
        assert!(!validate_mswd(1.0, 1, 1));
    }

    #[test]
    fn error_kinds_parse_from_labels() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.label().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("Bogus".parse::<ErrorKind>().is_err());
    }
}
