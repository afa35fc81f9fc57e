//! Spatial regression of J over an irradiation tray
use std::marker::PhantomData;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::math::{design_matrix, least_squares, quadratic_form, LeastSquares};
use crate::stats::ErrorKind;
use crate::Result;

/// The surface a flux regressor fits
pub trait FluxModel {
    const NAME: &'static str;

    /// Basis functions of the model evaluated at `(x, y)`
    fn basis(x: f64, y: f64) -> Vec<f64>;
}

#[derive(Clone, Copy, Debug)]
/// `a + b x + c y`
pub struct Plane;

impl FluxModel for Plane {
    const NAME: &'static str = "Plane";

    fn basis(x: f64, y: f64) -> Vec<f64> {
        vec![1., x, y]
    }
}

#[derive(Clone, Copy, Debug)]
/// `a + b x + c y + d (x^2 + y^2)`
pub struct Bowl;

impl FluxModel for Bowl {
    const NAME: &'static str = "Bowl";

    fn basis(x: f64, y: f64) -> Vec<f64> {
        vec![1., x, y, x.powi(2) + y.powi(2)]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FluxModelKind {
    #[default]
    Plane,
    Bowl,
}

/// A least squares fit of monitor J values against tray position
#[derive(Clone, Debug)]
pub struct FluxRegressor<M> {
    points: Vec<(f64, f64)>,
    ys: Vec<f64>,
    yserr: Vec<f64>,
    /// `Sd` adds the residual variance to predicted errors, other kinds use the standard error
    error_calc_type: ErrorKind,
    use_weighted_fit: bool,
    fit: LeastSquares,
    model: PhantomData<M>,
}

pub type PlaneFluxRegressor = FluxRegressor<Plane>;
pub type BowlFluxRegressor = FluxRegressor<Bowl>;

impl<M: FluxModel> FluxRegressor<M> {
    /// Fit `ys +/- yserr` observed at `points`
    ///
    /// The fit is weighted by the inverse variances only when `use_weighted_fit` is set and
    /// every error is positive.
    ///
    /// # Errors
    /// Returns an error if there are fewer points than coefficients or the fit is singular
    pub fn new(
        points: Vec<(f64, f64)>,
        ys: Vec<f64>,
        yserr: Vec<f64>,
        error_calc_type: ErrorKind,
        use_weighted_fit: bool,
    ) -> Result<Self> {
        let fit = Self::solve(&points, &ys, &yserr, use_weighted_fit)?;
        Ok(Self {
            points,
            ys,
            yserr,
            error_calc_type,
            use_weighted_fit,
            fit,
            model: PhantomData,
        })
    }

    fn solve(
        points: &[(f64, f64)],
        ys: &[f64],
        yserr: &[f64],
        use_weighted_fit: bool,
    ) -> Result<LeastSquares> {
        let design = design_matrix(points, M::basis)?;
        let y = Array1::from_vec(ys.to_vec());
        let weights = (use_weighted_fit && all_positive(yserr))
            .then(|| yserr.iter().map(|e| e.powi(-2)).collect::<Array1<f64>>());
        least_squares(&design, &y, weights.as_ref())
    }

    /// Refit to the current observations
    ///
    /// # Errors
    /// Returns an error if the fit is singular, leaving the previous fit in place
    pub fn calculate(&mut self) -> Result<()> {
        self.fit = Self::solve(&self.points, &self.ys, &self.yserr, self.use_weighted_fit)?;
        Ok(())
    }

    /// Fit of the same model and settings to new observations
    ///
    /// # Errors
    /// Returns an error if the fit is singular
    pub fn refit(&self, points: Vec<(f64, f64)>, ys: Vec<f64>) -> Result<Self> {
        Self::new(
            points,
            ys,
            self.yserr.clone(),
            self.error_calc_type,
            self.use_weighted_fit,
        )
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        M::NAME
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    #[must_use]
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    #[must_use]
    pub fn yserr(&self) -> &[f64] {
        &self.yserr
    }

    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.use_weighted_fit && all_positive(&self.yserr)
    }

    #[must_use]
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.fit.coefficients
    }

    #[must_use]
    pub fn coefficient_errors(&self) -> Array1<f64> {
        self.fit.covariance.diag().mapv(|v| v.max(0.0).sqrt())
    }

    #[must_use]
    pub fn predict(&self, points: &[(f64, f64)]) -> Vec<f64> {
        points
            .iter()
            .map(|(x, y)| Array1::from_vec(M::basis(*x, *y)).dot(&self.fit.coefficients))
            .collect()
    }

    /// Standard error of the fitted surface at each point, plus the scatter about the surface
    /// for `ErrorKind::Sd`
    #[must_use]
    pub fn predict_error(&self, points: &[(f64, f64)]) -> Vec<f64> {
        let scatter = match self.error_calc_type {
            ErrorKind::Sd => self.fit.mean_square_error,
            ErrorKind::Sem | ErrorKind::Msem => 0.0,
        };
        points
            .iter()
            .map(|(x, y)| {
                let g = Array1::from_vec(M::basis(*x, *y));
                (quadratic_form(&g, &self.fit.covariance) + scatter)
                    .max(0.0)
                    .sqrt()
            })
            .collect()
    }

    /// Sum of squared normalised residuals over the degrees of freedom
    ///
    /// Zero when any error is non-positive or the fit is exactly determined.
    #[must_use]
    pub fn mswd(&self) -> f64 {
        if self.fit.degrees_of_freedom == 0 || !all_positive(&self.yserr) {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let dof = self.fit.degrees_of_freedom as f64;
        self.fit
            .residuals
            .iter()
            .zip(&self.yserr)
            .map(|(r, e)| (r / e).powi(2))
            .sum::<f64>()
            / dof
    }
}

fn all_positive(errors: &[f64]) -> bool {
    errors.iter().all(|e| *e > 0.0)
}
