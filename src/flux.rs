//! Flux mapping: mean J of monitor positions and J predicted across the tray
use itertools::Itertools;
use log::{debug, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::analysis::SharedAnalysis;
use crate::argon::calculate_flux;
use crate::flux_regressor::{Bowl, FluxModel, FluxModelKind, FluxRegressor, Plane};
use crate::geometry::{Geometry, Hole};
use crate::monte_carlo::FluxEstimator;
use crate::stats::{modify_error, mswd, standard_deviation_about, weighted_mean, ErrorKind};
use crate::{Error, Result, UFloat};

const MIN_MONITOR_POSITIONS: usize = 3;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FluxOptions {
    /// Age of the flux monitor in Ma
    pub monitor_age: f64,
    /// Total decay constant of 40K, 1/a
    pub lambda_k: f64,
    /// Error reported for the mean J of a position
    pub error_kind: ErrorKind,
    pub model_kind: FluxModelKind,
    /// Error reported for predicted J, `Sd` includes the scatter about the surface
    pub predicted_j_error_type: ErrorKind,
    pub use_weighted_fit: bool,
    pub use_monte_carlo: bool,
    pub monte_carlo_ntrials: usize,
    /// Monte Carlo perturbs monitor positions only
    pub position_only: bool,
    pub position_error: f64,
}

impl Default for FluxOptions {
    fn default() -> Self {
        Self {
            monitor_age: 28.201,
            lambda_k: 5.543e-10,
            error_kind: ErrorKind::Sd,
            model_kind: FluxModelKind::Plane,
            predicted_j_error_type: ErrorKind::Sd,
            use_weighted_fit: false,
            use_monte_carlo: false,
            monte_carlo_ntrials: 100,
            position_only: false,
            position_error: 0.0,
        }
    }
}

#[derive(Clone)]
/// A tray position, holding a monitor or an unknown
pub struct FluxPosition {
    pub hole_id: usize,
    pub identifier: String,
    pub sample: String,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub saved_j: f64,
    pub saved_jerr: f64,
    pub mean_j: f64,
    pub mean_jerr: f64,
    pub mean_j_mswd: f64,
    /// Number of non-omitted monitor analyses
    pub n: usize,
    /// Predicted J
    pub j: f64,
    pub jerr: f64,
    /// Whether a monitor takes part in the fit
    pub use_position: bool,
    pub save: bool,
    /// Deviation of the saved J from the predicted J, percent
    pub dev: f64,
    pub analyses: Vec<SharedAnalysis>,
    pub error_kind: ErrorKind,
    /// Monitor age in years
    pub monitor_age: f64,
    pub lambda_k: f64,
    pub was_altered: bool,
}

impl FluxPosition {
    #[must_use]
    pub fn new(identifier: impl Into<String>, hole: &Hole) -> Self {
        Self {
            hole_id: hole.index,
            identifier: identifier.into(),
            sample: String::new(),
            x: hole.x,
            y: hole.y,
            theta: hole.x.atan2(hole.y),
            saved_j: 0.0,
            saved_jerr: 0.0,
            mean_j: 0.0,
            mean_jerr: 0.0,
            mean_j_mswd: 0.0,
            n: 0,
            j: 0.0,
            jerr: 0.0,
            use_position: true,
            save: true,
            dev: 0.0,
            analyses: vec![],
            error_kind: ErrorKind::Sd,
            monitor_age: 0.0,
            lambda_k: 0.0,
            was_altered: false,
        }
    }

    #[must_use]
    pub fn with_saved_j(mut self, j: &UFloat) -> Self {
        self.saved_j = j.nominal_value();
        self.saved_jerr = j.std_dev();
        self
    }

    /// Weighted mean of the J implied by each non-omitted monitor analysis
    pub fn set_mean_j(&mut self) {
        let monitor_age = UFloat::exact(self.monitor_age);
        let lambda_k = UFloat::exact(self.lambda_k);
        let (js, errors): (Vec<f64>, Vec<f64>) = self
            .analyses
            .iter()
            .filter(|a| !a.borrow().is_omitted())
            .map(|a| {
                let j = calculate_flux(&a.borrow().get_value("uF"), &monitor_age, &lambda_k);
                (j.nominal_value(), j.std_dev())
            })
            .unzip();

        self.n = js.len();
        if js.is_empty() {
            return;
        }

        let (mean, error) = weighted_mean(&js, &errors);
        let mswd = mswd(&js, &errors, 1);
        let error = match self.error_kind {
            ErrorKind::Sd => standard_deviation_about(&js, mean),
            ErrorKind::Sem | ErrorKind::Msem => modify_error(error, self.error_kind, mswd),
        };

        self.mean_j = mean;
        self.mean_jerr = error;
        self.mean_j_mswd = mswd;
    }

    #[must_use]
    pub fn percent_saved_error(&self) -> Option<f64> {
        percent_error(self.saved_j, self.saved_jerr)
    }

    #[must_use]
    pub fn percent_mean_error(&self) -> Option<f64> {
        percent_error(self.mean_j, self.mean_jerr)
    }

    #[must_use]
    pub fn percent_pred_error(&self) -> Option<f64> {
        percent_error(self.j, self.jerr)
    }
}

fn percent_error(value: f64, error: f64) -> Option<f64> {
    (value != 0.0 && error != 0.0).then(|| error / value * 100.0)
}

/// J predicted over a square grid of the tray
pub struct FluxGrid {
    pub xs: Array1<f64>,
    pub ys: Array1<f64>,
    /// `j[[row, col]]` is the prediction at `(xs[col], ys[row])`
    pub j: Array2<f64>,
}

enum FittedFlux {
    Plane(FluxRegressor<Plane>),
    Bowl(FluxRegressor<Bowl>),
}

impl From<FluxRegressor<Plane>> for FittedFlux {
    fn from(regressor: FluxRegressor<Plane>) -> Self {
        Self::Plane(regressor)
    }
}

impl From<FluxRegressor<Bowl>> for FittedFlux {
    fn from(regressor: FluxRegressor<Bowl>) -> Self {
        Self::Bowl(regressor)
    }
}

impl FittedFlux {
    fn n(&self) -> usize {
        match self {
            Self::Plane(regressor) => regressor.n(),
            Self::Bowl(regressor) => regressor.n(),
        }
    }

    fn predict(&self, points: &[(f64, f64)]) -> Vec<f64> {
        match self {
            Self::Plane(regressor) => regressor.predict(points),
            Self::Bowl(regressor) => regressor.predict(points),
        }
    }
}

/// Monitor and unknown positions of one irradiation level
pub struct FluxResults {
    geometry: Geometry,
    pub options: FluxOptions,
    pub monitor_positions: Vec<FluxPosition>,
    pub unknown_positions: Vec<FluxPosition>,
    regressor: Option<FittedFlux>,
    pub max_j: f64,
    pub min_j: f64,
}

impl FluxResults {
    #[must_use]
    pub const fn new(geometry: Geometry, options: FluxOptions) -> Self {
        Self {
            geometry,
            options,
            monitor_positions: vec![],
            unknown_positions: vec![],
            regressor: None,
            max_j: 0.0,
            min_j: 0.0,
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Group monitor analyses into positions by identifier
    ///
    /// Each position takes its saved J, sample and hole from its first analysis.
    ///
    /// # Errors
    /// Returns an error if an analysis sits in a hole missing from the tray geometry
    pub fn set_positions(
        &mut self,
        monitors: &[SharedAnalysis],
        unknowns: Option<Vec<FluxPosition>>,
    ) -> Result<()> {
        debug!(
            "setting positions mons={}, unks={}",
            monitors.len(),
            unknowns.as_ref().map_or(0, Vec::len)
        );

        let mut sorted = monitors.to_vec();
        sorted.sort_by_key(|a| a.borrow().identifier());

        let mut positions = vec![];
        for (identifier, analyses) in &sorted.into_iter().group_by(|a| a.borrow().identifier()) {
            let analyses = analyses.collect::<Vec<_>>();
            let Some(first) = analyses.first() else {
                continue;
            };
            let (j, sample, hole) = {
                let first = first.borrow();
                (
                    first.j().unwrap_or_default(),
                    first.sample(),
                    self.geometry.hole(first.irradiation_position())?,
                )
            };

            let mut position = FluxPosition::new(identifier, &hole).with_saved_j(&j);
            position.sample = sample;
            position.error_kind = self.options.error_kind;
            position.monitor_age = self.options.monitor_age * 1e6;
            position.lambda_k = self.options.lambda_k;
            position.analyses = analyses;
            position.set_mean_j();
            positions.push(position);
        }

        self.monitor_positions = positions;
        if let Some(unknowns) = unknowns {
            self.unknown_positions = unknowns;
        }
        Ok(())
    }

    /// Fit the flux surface to the active monitors and predict J at every position
    ///
    /// A failed fit is logged and leaves the previous predictions in place.
    ///
    /// # Errors
    /// Returns an error if fewer than three monitor positions are active
    pub fn predict_values(&mut self) -> Result<()> {
        let active = self
            .monitor_positions
            .iter()
            .filter(|p| p.use_position)
            .count();
        if active < MIN_MONITOR_POSITIONS {
            debug!("not enough monitor positions, {active} active");
            return Err(Error::NotEnoughPositions {
                required: MIN_MONITOR_POSITIONS,
                active,
            });
        }

        match self.options.model_kind {
            FluxModelKind::Plane => self.predict_with::<Plane>(),
            FluxModelKind::Bowl => self.predict_with::<Bowl>(),
        }
        Ok(())
    }

    fn predict_with<M: FluxModel>(&mut self)
    where
        FittedFlux: From<FluxRegressor<M>>,
    {
        let (points, (ys, yserr)): (Vec<(f64, f64)>, (Vec<f64>, Vec<f64>)) = self
            .monitor_positions
            .iter()
            .filter(|p| p.use_position)
            .map(|p| ((p.x, p.y), (p.mean_j, p.mean_jerr)))
            .unzip();
        let extent = points
            .iter()
            .map(|(x, y)| x.abs().max(y.abs()))
            .fold(0.0, f64::max);

        let regressor = match FluxRegressor::<M>::new(
            points,
            ys,
            yserr,
            self.options.predicted_j_error_type,
            self.options.use_weighted_fit,
        ) {
            Ok(regressor) => regressor,
            Err(e) => {
                warn!("{} flux regression failed: {e}", M::NAME);
                return;
            }
        };

        let estimator = self.options.use_monte_carlo.then(|| {
            FluxEstimator::new(
                self.options.monte_carlo_ntrials,
                &regressor,
                self.options.position_only,
                self.options.position_error,
            )
        });

        for positions in [&mut self.unknown_positions, &mut self.monitor_positions] {
            let at = positions.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>();
            let (js, errors) = estimator.as_ref().map_or_else(
                || (regressor.predict(&at), regressor.predict_error(&at)),
                |estimator| estimator.estimate(&at),
            );
            for ((position, j), jerr) in positions.iter_mut().zip(js).zip(errors) {
                position.j = j;
                position.jerr = jerr;
                position.dev = if j == 0.0 {
                    0.0
                } else {
                    (position.saved_j - j) / j * 100.0
                };
            }
        }

        self.regressor = Some(regressor.into());
        self.model_flux(extent);
    }

    /// Refresh the mean J of the positions of `identifiers`, and of previously altered
    /// positions, then predict again
    ///
    /// # Errors
    /// Returns an error if fewer than three monitor positions are active
    pub fn recalculate_means(&mut self, identifiers: &[String]) -> Result<()> {
        for position in &mut self.monitor_positions {
            if identifiers.contains(&position.identifier) {
                position.set_mean_j();
                position.was_altered = true;
            } else if position.was_altered {
                position.set_mean_j();
                position.was_altered = false;
            }
        }
        self.predict_values()
    }

    /// Evaluate the fitted surface over a square grid spanning `-r..=r` in both coordinates
    ///
    /// The grid has ten points per monitor along each side. Updates `min_j` and `max_j`.
    pub fn model_flux(&mut self, r: f64) -> Option<FluxGrid> {
        let regressor = self.regressor.as_ref()?;
        let n = regressor.n() * 10;
        let xs = Array1::linspace(-r, r, n);
        let ys = xs.clone();

        let mut j = Array2::zeros((n, n));
        for (row, y) in ys.iter().enumerate() {
            let points = xs.iter().map(|x| (*x, *y)).collect::<Vec<_>>();
            for (col, value) in regressor.predict(&points).into_iter().enumerate() {
                j[[row, col]] = value;
            }
        }

        self.max_j = j.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.min_j = j.iter().copied().fold(f64::INFINITY, f64::min);
        Some(FluxGrid { xs, ys, j })
    }

    /// Predicted J at arbitrary tray coordinates, `None` before a successful fit
    #[must_use]
    pub fn predict(&self, points: &[(f64, f64)]) -> Option<Vec<f64>> {
        self.regressor.as_ref().map(|r| r.predict(points))
    }

    #[must_use]
    pub fn min_j(&self) -> f64 {
        self.min_j
    }

    #[must_use]
    pub fn max_j(&self) -> f64 {
        self.max_j
    }

    /// Spread of J over the tray as a percentage of the maximum
    #[must_use]
    pub fn percent_j_change(&self) -> f64 {
        if self.max_j == 0.0 {
            0.0
        } else {
            (self.max_j - self.min_j) / self.max_j * 100.0
        }
    }
}
