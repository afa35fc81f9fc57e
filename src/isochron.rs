//! Inverse isochron regression
use log::debug;

use crate::argon::age_equation;
use crate::constants::ArArConstants;
use crate::UFloat;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-15;

#[derive(Clone, Debug, PartialEq)]
/// A straight line fit with errors in both coordinates
///
/// Follows the algorithm of York et al. (2004), which accounts for correlation between the
/// errors of each point.
pub struct YorkRegression {
    pub slope: f64,
    pub slope_error: f64,
    pub intercept: f64,
    pub intercept_error: f64,
    pub mswd: f64,
    /// Weighted centroid of the abscissa
    pub x_bar: f64,
    pub n: usize,
}

impl YorkRegression {
    /// Fit `points` of `(x, sx, y, sy, r)` where `r` is the error correlation coefficient
    ///
    /// Requires at least three points, and non-zero errors on every coordinate.
    #[must_use]
    pub fn fit(points: &[(f64, f64, f64, f64, f64)]) -> Option<Self> {
        let n = points.len();
        if n < 3 || points.iter().any(|p| p.1 <= 0.0 || p.3 <= 0.0) {
            return None;
        }

        let wx = points.iter().map(|p| p.1.powi(-2)).collect::<Vec<_>>();
        let wy = points.iter().map(|p| p.3.powi(-2)).collect::<Vec<_>>();
        let xs = points.iter().map(|p| p.0).collect::<Vec<_>>();
        let ys = points.iter().map(|p| p.2).collect::<Vec<_>>();

        let mut slope = ordinary_slope(&xs, &ys)?;
        let mut weights = vec![0.0; n];
        let mut betas = vec![0.0; n];
        let (mut x_bar, mut y_bar) = (0.0, 0.0);

        for _ in 0..MAX_ITERATIONS {
            for (i, p) in points.iter().enumerate() {
                let alpha = (wx[i] * wy[i]).sqrt();
                weights[i] =
                    wx[i] * wy[i] / (wx[i] + slope.powi(2) * wy[i] - 2.0 * slope * p.4 * alpha);
            }
            let total: f64 = weights.iter().sum();
            x_bar = weights.iter().zip(&xs).map(|(w, x)| w * x).sum::<f64>() / total;
            y_bar = weights.iter().zip(&ys).map(|(w, y)| w * y).sum::<f64>() / total;

            let (mut numerator, mut denominator) = (0.0, 0.0);
            for (i, p) in points.iter().enumerate() {
                let u = xs[i] - x_bar;
                let v = ys[i] - y_bar;
                let alpha = (wx[i] * wy[i]).sqrt();
                betas[i] = weights[i]
                    * (u / wy[i] + slope * v / wx[i] - (slope * u + v) * p.4 / alpha);
                numerator += weights[i] * betas[i] * v;
                denominator += weights[i] * betas[i] * u;
            }

            let next = numerator / denominator;
            if !next.is_finite() {
                debug!("york regression diverged");
                return None;
            }
            let converged = (next - slope).abs() <= TOLERANCE * next.abs();
            slope = next;
            if converged {
                break;
            }
        }

        let intercept = y_bar - slope * x_bar;
        let total: f64 = weights.iter().sum();
        let adjusted = betas.iter().map(|b| x_bar + b).collect::<Vec<_>>();
        let adjusted_bar = weights
            .iter()
            .zip(&adjusted)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            / total;
        let spread: f64 = weights
            .iter()
            .zip(&adjusted)
            .map(|(w, x)| w * (x - adjusted_bar).powi(2))
            .sum();

        let slope_variance = spread.recip();
        let intercept_variance = total.recip() + adjusted_bar.powi(2) * slope_variance;

        #[allow(clippy::cast_precision_loss)]
        let mswd = weights
            .iter()
            .zip(xs.iter().zip(&ys))
            .map(|(w, (x, y))| w * (y - slope * x - intercept).powi(2))
            .sum::<f64>()
            / (n - 2) as f64;

        Some(Self {
            slope,
            slope_error: slope_variance.sqrt(),
            intercept,
            intercept_error: intercept_variance.sqrt(),
            mswd,
            x_bar: adjusted_bar,
            n,
        })
    }

    #[must_use]
    pub fn x_intercept(&self) -> f64 {
        -self.intercept / self.slope
    }

    /// Standard error of the x intercept, including the slope-intercept covariance
    #[must_use]
    pub fn x_intercept_error(&self) -> f64 {
        let (a, b) = (self.intercept, self.slope);
        let covariance = -self.x_bar * self.slope_error.powi(2);
        let variance = self.intercept_error.powi(2) / b.powi(2)
            + a.powi(2) * self.slope_error.powi(2) / b.powi(4)
            - 2.0 * a * covariance / b.powi(3);
        variance.max(0.0).sqrt()
    }
}

fn ordinary_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let sxy: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    (sxx != 0.0).then(|| sxy / sxx)
}

#[derive(Clone, Debug)]
pub struct IsochronResult {
    pub age: UFloat,
    /// Trapped 40Ar/36Ar, the inverse of the y intercept
    pub trapped_4036: UFloat,
    pub regression: YorkRegression,
}

/// Regress 36Ar/40Ar against 39Ar/40Ar and solve for the age at the x intercept
///
/// `ratios` are the `(39Ar/40Ar, 36Ar/40Ar)` coordinates of each analysis, points whose index
/// is in `excludes` are left out of the fit.
#[must_use]
pub fn calculate_isochron(
    ratios: &[(UFloat, UFloat)],
    excludes: &[usize],
    j: &UFloat,
    constants: &ArArConstants,
) -> Option<IsochronResult> {
    let points = ratios
        .iter()
        .enumerate()
        .filter(|(i, _)| !excludes.contains(i))
        .map(|(_, (x, y))| {
            let (sx, sy) = (x.std_dev(), y.std_dev());
            let r = if sx > 0.0 && sy > 0.0 {
                x.covariance(y) / (sx * sy)
            } else {
                0.0
            };
            (x.nominal_value(), sx, y.nominal_value(), sy, r)
        })
        .collect::<Vec<_>>();

    let regression = YorkRegression::fit(&points)?;
    let x_intercept = UFloat::new(regression.x_intercept(), regression.x_intercept_error());
    let y_intercept = UFloat::new(regression.intercept, regression.intercept_error);

    let f = UFloat::exact(1.0).checked_div(&x_intercept)?;
    let trapped_4036 = UFloat::exact(1.0)
        .checked_div(&y_intercept)
        .unwrap_or_default();
    let age = age_equation(j, &f, constants);

    Some(IsochronResult {
        age,
        trapped_4036,
        regression,
    })
}

#[cfg(test)]
mod tests {
    use crate::constants::ArArConstants;
    use crate::UFloat;

    use super::{calculate_isochron, YorkRegression};

    #[test]
    fn collinear_points_are_fit_exactly() {
        let points = (0..5)
            .map(|i| {
                let x = f64::from(i);
                (x, 0.1, 2.0 - 0.5 * x, 0.1, 0.0)
            })
            .collect::<Vec<_>>();
        let regression = YorkRegression::fit(&points).unwrap();

        approx::assert_relative_eq!(regression.slope, -0.5, max_relative = 1e-10);
        approx::assert_relative_eq!(regression.intercept, 2.0, max_relative = 1e-10);
        approx::assert_relative_eq!(regression.x_intercept(), 4.0, max_relative = 1e-10);
        approx::assert_abs_diff_eq!(regression.mswd, 0.0, epsilon = 1e-12);
        assert!(regression.slope_error > 0.0);
    }

    #[test]
    fn two_points_are_not_enough() {
        let points = [(0.0, 0.1, 1.0, 0.1, 0.0), (1.0, 0.1, 0.0, 0.1, 0.0)];
        assert!(YorkRegression::fit(&points).is_none());
    }

    #[test]
    fn isochron_recovers_f_and_trapped_component() {
        let constants = ArArConstants::default();
        let f = 10.0;
        let trapped = 295.5;
        // 40 = 40* + 40atm with 40* = F 39 and 40atm = trapped 36
        let ratios = [0.02, 0.04, 0.06, 0.08]
            .iter()
            .map(|x39| {
                let y36 = (1.0 - f * x39) / trapped;
                (UFloat::new(*x39, 1e-5), UFloat::new(y36, 1e-7))
            })
            .collect::<Vec<_>>();
        let j = UFloat::exact(0.001);

        let result = calculate_isochron(&ratios, &[], &j, &constants).unwrap();

        let expected = crate::argon::age_equation(&j, &UFloat::exact(f), &constants);
        approx::assert_relative_eq!(
            result.age.nominal_value(),
            expected.nominal_value(),
            max_relative = 1e-8
        );
        approx::assert_relative_eq!(
            result.trapped_4036.nominal_value(),
            trapped,
            max_relative = 1e-8
        );
    }

    #[test]
    fn excluded_points_are_ignored() {
        let mut ratios = [0.02, 0.04, 0.06]
            .iter()
            .map(|x| (UFloat::new(*x, 1e-5), UFloat::new((1.0 - 10.0 * x) / 295.5, 1e-7)))
            .collect::<Vec<_>>();
        ratios.push((UFloat::new(0.05, 1e-5), UFloat::new(0.003, 1e-7)));

        let result = calculate_isochron(
            &ratios,
            &[3],
            &UFloat::exact(0.001),
            &ArArConstants::default(),
        )
        .unwrap();
        assert_eq!(result.regression.n, 3);
        approx::assert_abs_diff_eq!(result.regression.mswd, 0.0, epsilon = 1e-6);
    }
}
