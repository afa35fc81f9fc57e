use ndarray::{Array, Array1, Array2, Axis};
use ndarray_linalg::Inverse;

use crate::{Error, Result};

/// Build the design matrix for observations at `points`
///
/// Each row holds the basis functions of the model evaluated at one point, so the matrix is
/// (n x p) for `p` basis functions.
///
/// # Examples
///
/// ```ignore
/// let points = [(1., 2.), (3., 4.)];
/// let design = design_matrix(&points, |x, y| vec![1., x, y]).unwrap();
///
/// let expected = ndarray::arr2(&[[1., 1., 2.], [1., 3., 4.]]);
/// assert_eq!(design, expected);
/// ```
pub fn design_matrix(
    points: &[(f64, f64)],
    basis: impl Fn(f64, f64) -> Vec<f64>,
) -> Result<Array2<f64>> {
    let rows = points.iter().map(|(x, y)| basis(*x, *y)).collect::<Vec<_>>();
    let width = rows.first().map_or(0, Vec::len);
    let vals = rows.into_iter().flatten();
    Ok(Array::from_iter(vals).into_shape((points.len(), width))?)
}

#[derive(Clone, Debug)]
pub struct LeastSquares {
    pub coefficients: Array1<f64>,
    /// Covariance matrix of the coefficients
    pub covariance: Array2<f64>,
    pub residuals: Array1<f64>,
    /// Residual sum of squares over the degrees of freedom, zero for an exact determination
    pub mean_square_error: f64,
    pub degrees_of_freedom: usize,
}

/// Solve the (optionally weighted) linear least squares problem `design . beta = y`
///
/// With `weights` the problem is weighted by the inverse variances and the covariance of the
/// coefficients is `(X' W X)^-1`. Without, the covariance is scaled by the mean square error.
///
/// # Errors
/// Returns an error if there are fewer observations than coefficients, or if the normal
/// equations are singular.
pub fn least_squares(
    design: &Array2<f64>,
    y: &Array1<f64>,
    weights: Option<&Array1<f64>>,
) -> Result<LeastSquares> {
    let (n, p) = design.dim();
    if n < p || y.len() != n {
        return Err(Error::InsufficientData {
            required: p,
            received: n.min(y.len()),
        });
    }

    let weighted_fit = weights.is_some();
    let weights = weights.map_or_else(|| Array1::ones(n), Clone::clone);
    let weighted = design * &weights.view().insert_axis(Axis(1));
    let normal = design.t().dot(&weighted);
    let inverse = normal.inv()?;
    let coefficients = inverse.dot(&weighted.t().dot(y));

    let residuals = y - &design.dot(&coefficients);
    let degrees_of_freedom = n - p;
    #[allow(clippy::cast_precision_loss)]
    let mean_square_error = if degrees_of_freedom == 0 {
        0.0
    } else {
        residuals.mapv(|r| r.powi(2)).sum() / degrees_of_freedom as f64
    };

    let covariance = if weighted_fit {
        inverse
    } else {
        inverse * mean_square_error
    };

    Ok(LeastSquares {
        coefficients,
        covariance,
        residuals,
        mean_square_error,
        degrees_of_freedom,
    })
}

/// `g' C g`
pub fn quadratic_form(g: &Array1<f64>, c: &Array2<f64>) -> f64 {
    g.dot(&c.dot(g))
}
