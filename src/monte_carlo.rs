//! Monte Carlo propagation of monitor errors into predicted J
use log::{debug, warn};
use ndarray::{Array, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_isaac::Isaac64Rng;

use crate::flux_regressor::{FluxModel, FluxRegressor};

const DEFAULT_SEED: u64 = 40;

/// Estimates J and its error at arbitrary positions by refitting perturbed monitor data
pub struct FluxEstimator<'a, M> {
    ntrials: usize,
    regressor: &'a FluxRegressor<M>,
    /// Perturb only the monitor positions, keeping their J values fixed
    position_only: bool,
    /// Standard deviation of the monitor position jitter, zero to disable
    position_error: f64,
    seed: u64,
}

impl<'a, M: FluxModel> FluxEstimator<'a, M> {
    #[must_use]
    pub const fn new(
        ntrials: usize,
        regressor: &'a FluxRegressor<M>,
        position_only: bool,
        position_error: f64,
    ) -> Self {
        Self {
            ntrials,
            regressor,
            position_only,
            position_error,
            seed: DEFAULT_SEED,
        }
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Empirical mean and standard deviation of the predicted J at each of `points`
    ///
    /// Trials where the refit fails are skipped. When every trial fails the nominal prediction
    /// is returned with zero error.
    #[must_use]
    pub fn estimate(&self, points: &[(f64, f64)]) -> (Vec<f64>, Vec<f64>) {
        let mut rng = Isaac64Rng::seed_from_u64(self.seed);
        let monitors = self.regressor.points();
        let ys = Array1::from_vec(self.regressor.ys().to_vec());
        let yserr = Array1::from_vec(self.regressor.yserr().to_vec());
        let n = monitors.len();

        let mut samples = vec![];
        for trial in 0..self.ntrials {
            let ys = if self.position_only {
                ys.clone()
            } else {
                let noise: Array1<f64> = Array::random_using(n, StandardNormal, &mut rng);
                &ys + &(noise * &yserr)
            };

            let jittered = if self.position_error > 0.0 {
                let noise: Array2<f64> = Array::random_using((n, 2), StandardNormal, &mut rng);
                monitors
                    .iter()
                    .zip(noise.outer_iter())
                    .map(|((x, y), d)| {
                        (
                            x + d[0] * self.position_error,
                            y + d[1] * self.position_error,
                        )
                    })
                    .collect()
            } else {
                monitors.to_vec()
            };

            match self.regressor.refit(jittered, ys.to_vec()) {
                Ok(fit) => samples.extend(fit.predict(points)),
                Err(e) => debug!("skipping monte carlo trial {trial}: {e}"),
            }
        }

        let ntrials = samples.len() / points.len().max(1);
        if ntrials == 0 {
            warn!("every monte carlo trial failed, reporting the nominal prediction");
            return (self.regressor.predict(points), vec![0.0; points.len()]);
        }

        let Ok(samples) = Array2::from_shape_vec((ntrials, points.len()), samples) else {
            return (self.regressor.predict(points), vec![0.0; points.len()]);
        };
        let means = samples
            .mean_axis(Axis(0))
            .map_or_else(|| vec![0.0; points.len()], |m| m.to_vec());
        let errors = if ntrials > 1 {
            samples.std_axis(Axis(0), 1.0).to_vec()
        } else {
            vec![0.0; points.len()]
        };
        (means, errors)
    }
}
