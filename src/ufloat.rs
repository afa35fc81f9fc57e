use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num_traits::Zero;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
/// An independent source of uncertainty
///
/// Every measured quantity with a non-zero standard deviation introduces one source. Derived
/// values hold the partial derivative of their nominal value with respect to each source they
/// depend upon.
struct Source {
    standard_deviation: f64,
    tag: Option<String>,
}

#[derive(Clone, Debug)]
struct Term {
    source: Arc<Source>,
    derivative: f64,
}

#[derive(Clone, Debug, Default)]
/// A nominal value with first-order, correlation aware uncertainty
///
/// Uncertainty is propagated linearly. For a derived value $f$ depending on independent sources
/// $x_i$ with standard deviations $\sigma_i$
///
/// $$
///     \sigma_f^2 = \sum_i \left(\frac{\partial f}{\partial x_i} \sigma_i\right)^2
/// $$
///
/// Because derivatives are kept per source, values sharing a common term (for example the
/// irradiation parameter J) remain correlated through subsequent arithmetic.
///
/// # Examples
///
/// ```
/// use argon_age::UFloat;
///
/// let x = UFloat::new(2.0, 0.1);
/// let y = &x - &x;
/// assert_eq!(y.nominal_value(), 0.0);
/// assert_eq!(y.std_dev(), 0.0);
/// ```
pub struct UFloat {
    nominal: f64,
    terms: BTreeMap<u64, Term>,
}

impl UFloat {
    /// Create an independent value with standard deviation `standard_deviation`
    #[must_use]
    pub fn new(nominal: f64, standard_deviation: f64) -> Self {
        Self::independent(nominal, standard_deviation, None)
    }

    /// Create an independent value whose error contribution can be recovered by `tag`
    #[must_use]
    pub fn tagged(nominal: f64, standard_deviation: f64, tag: impl Into<String>) -> Self {
        Self::independent(nominal, standard_deviation, Some(tag.into()))
    }

    #[must_use]
    pub fn exact(nominal: f64) -> Self {
        Self {
            nominal,
            terms: BTreeMap::new(),
        }
    }

    fn independent(nominal: f64, standard_deviation: f64, tag: Option<String>) -> Self {
        let mut terms = BTreeMap::new();
        if standard_deviation != 0.0 {
            let id = NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed);
            terms.insert(
                id,
                Term {
                    source: Arc::new(Source {
                        standard_deviation: standard_deviation.abs(),
                        tag,
                    }),
                    derivative: 1.0,
                },
            );
        }
        Self { nominal, terms }
    }

    #[must_use]
    pub const fn nominal_value(&self) -> f64 {
        self.nominal
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        self.terms
            .values()
            .map(|term| (term.derivative * term.source.standard_deviation).powi(2))
            .sum()
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Covariance between two values, non-zero only when they share a source
    #[must_use]
    pub fn covariance(&self, other: &Self) -> f64 {
        self.terms
            .iter()
            .filter_map(|(id, term)| {
                other.terms.get(id).map(|other_term| {
                    term.derivative
                        * other_term.derivative
                        * term.source.standard_deviation.powi(2)
                })
            })
            .sum()
    }

    /// The standard deviation contributed by all sources carrying `tag`
    #[must_use]
    pub fn error_component(&self, tag: &str) -> f64 {
        self.terms
            .values()
            .filter(|term| term.source.tag.as_deref() == Some(tag))
            .map(|term| (term.derivative * term.source.standard_deviation).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Error contributions of every source, in order of creation
    #[must_use]
    pub fn error_components(&self) -> Vec<(Option<&str>, f64)> {
        self.terms
            .values()
            .map(|term| {
                (
                    term.source.tag.as_deref(),
                    (term.derivative * term.source.standard_deviation).abs(),
                )
            })
            .collect()
    }

    /// Error as a percentage of the nominal value, zero when the nominal value is zero
    #[must_use]
    pub fn percent_error(&self) -> f64 {
        if self.nominal == 0.0 {
            0.0
        } else {
            (self.std_dev() / self.nominal * 100.0).abs()
        }
    }

    /// A fresh value with the same nominal value and no uncertainty
    #[must_use]
    pub fn without_error(&self) -> Self {
        Self::exact(self.nominal)
    }

    /// A fresh independent value with the same nominal value and standard deviation
    ///
    /// Any correlation with the sources of `self` is discarded.
    #[must_use]
    pub fn decorrelated(&self) -> Self {
        Self::new(self.nominal, self.std_dev())
    }

    /// Divide, returning `None` when the denominator is zero
    #[must_use]
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.nominal == 0.0 {
            None
        } else {
            Some(divide(self, other))
        }
    }

    #[must_use]
    pub fn powf(&self, n: f64) -> Self {
        self.map(self.nominal.powf(n), n * self.nominal.powf(n - 1.0))
    }

    #[must_use]
    pub fn powi(&self, n: i32) -> Self {
        self.map(
            self.nominal.powi(n),
            f64::from(n) * self.nominal.powi(n - 1),
        )
    }

    #[must_use]
    pub fn ln(&self) -> Self {
        self.map(self.nominal.ln(), 1.0 / self.nominal)
    }

    #[must_use]
    pub fn exp(&self) -> Self {
        let value = self.nominal.exp();
        self.map(value, value)
    }

    #[must_use]
    pub fn sqrt(&self) -> Self {
        let value = self.nominal.sqrt();
        self.map(value, 0.5 / value)
    }

    #[must_use]
    pub fn recip(&self) -> Self {
        self.map(1.0 / self.nominal, -1.0 / self.nominal.powi(2))
    }

    #[must_use]
    pub fn max_nominal(&self, floor: f64) -> Self {
        if self.nominal < floor {
            Self::new(floor, self.std_dev())
        } else {
            self.clone()
        }
    }

    fn map(&self, nominal: f64, derivative: f64) -> Self {
        let terms = self
            .terms
            .iter()
            .map(|(id, term)| {
                (
                    *id,
                    Term {
                        source: Arc::clone(&term.source),
                        derivative: term.derivative * derivative,
                    },
                )
            })
            .collect();
        Self { nominal, terms }
    }

    fn linear(a: &Self, da: f64, b: &Self, db: f64, nominal: f64) -> Self {
        let mut terms = a.map(nominal, da).terms;
        for (id, term) in &b.terms {
            terms
                .entry(*id)
                .and_modify(|existing| existing.derivative += term.derivative * db)
                .or_insert_with(|| Term {
                    source: Arc::clone(&term.source),
                    derivative: term.derivative * db,
                });
        }
        Self { nominal, terms }
    }
}

fn add(a: &UFloat, b: &UFloat) -> UFloat {
    UFloat::linear(a, 1.0, b, 1.0, a.nominal + b.nominal)
}

fn subtract(a: &UFloat, b: &UFloat) -> UFloat {
    UFloat::linear(a, 1.0, b, -1.0, a.nominal - b.nominal)
}

fn multiply(a: &UFloat, b: &UFloat) -> UFloat {
    UFloat::linear(a, b.nominal, b, a.nominal, a.nominal * b.nominal)
}

fn divide(a: &UFloat, b: &UFloat) -> UFloat {
    UFloat::linear(
        a,
        1.0 / b.nominal,
        b,
        -a.nominal / b.nominal.powi(2),
        a.nominal / b.nominal,
    )
}

macro_rules! impl_binary_op {
    ($op:ident, $method:ident, $func:ident) => {
        impl $op<&UFloat> for &UFloat {
            type Output = UFloat;
            fn $method(self, rhs: &UFloat) -> UFloat {
                $func(self, rhs)
            }
        }

        impl $op<UFloat> for UFloat {
            type Output = UFloat;
            fn $method(self, rhs: UFloat) -> UFloat {
                $func(&self, &rhs)
            }
        }

        impl $op<&UFloat> for UFloat {
            type Output = UFloat;
            fn $method(self, rhs: &UFloat) -> UFloat {
                $func(&self, rhs)
            }
        }

        impl $op<UFloat> for &UFloat {
            type Output = UFloat;
            fn $method(self, rhs: UFloat) -> UFloat {
                $func(self, &rhs)
            }
        }

        impl $op<f64> for UFloat {
            type Output = UFloat;
            fn $method(self, rhs: f64) -> UFloat {
                $func(&self, &UFloat::exact(rhs))
            }
        }

        impl $op<f64> for &UFloat {
            type Output = UFloat;
            fn $method(self, rhs: f64) -> UFloat {
                $func(self, &UFloat::exact(rhs))
            }
        }

        impl $op<UFloat> for f64 {
            type Output = UFloat;
            fn $method(self, rhs: UFloat) -> UFloat {
                $func(&UFloat::exact(self), &rhs)
            }
        }

        impl $op<&UFloat> for f64 {
            type Output = UFloat;
            fn $method(self, rhs: &UFloat) -> UFloat {
                $func(&UFloat::exact(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, subtract);
impl_binary_op!(Mul, mul, multiply);
impl_binary_op!(Div, div, divide);

impl Neg for UFloat {
    type Output = Self;
    fn neg(self) -> Self {
        self.map(-self.nominal, -1.0)
    }
}

impl Neg for &UFloat {
    type Output = UFloat;
    fn neg(self) -> UFloat {
        self.map(-self.nominal, -1.0)
    }
}

impl Zero for UFloat {
    fn zero() -> Self {
        Self::exact(0.0)
    }

    fn is_zero(&self) -> bool {
        self.nominal == 0.0 && self.terms.values().all(|term| term.derivative == 0.0)
    }
}

impl Sum for UFloat {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| add(&acc, &x))
    }
}

impl<'a> Sum<&'a Self> for UFloat {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| add(&acc, x))
    }
}

impl From<f64> for UFloat {
    fn from(value: f64) -> Self {
        Self::exact(value)
    }
}

impl fmt::Display for UFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +/- {}", self.nominal, self.std_dev())
    }
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use num_traits::Zero;
    use rand_isaac::Isaac64Rng;

    use super::UFloat;

    #[test]
    fn uncorrelated_sums_add_in_quadrature() {
        let a = UFloat::new(1.0, 0.3);
        let b = UFloat::new(2.0, 0.4);
        let c = &a + &b;
        approx::assert_relative_eq!(c.nominal_value(), 3.0);
        approx::assert_relative_eq!(c.std_dev(), 0.5);
    }

    #[test]
    fn shared_sources_cancel() {
        let j = UFloat::tagged(0.01, 1e-5, "J");
        let ratio = &j / &j;
        approx::assert_relative_eq!(ratio.nominal_value(), 1.0);
        approx::assert_abs_diff_eq!(ratio.std_dev(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn relative_errors_of_products_add_in_quadrature() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let (x, ex): (f64, f64) = (rng.gen_range(1.0..10.0), rng.gen_range(0.01..0.1));
        let (y, ey): (f64, f64) = (rng.gen_range(1.0..10.0), rng.gen_range(0.01..0.1));

        let product = UFloat::new(x, ex) * UFloat::new(y, ey);
        let expected = x * y * ((ex / x).powi(2) + (ey / y).powi(2)).sqrt();

        approx::assert_relative_eq!(product.std_dev(), expected, max_relative = 1e-12);
    }

    #[test]
    fn tagged_components_are_recovered() {
        let j = UFloat::tagged(2.0, 0.2, "J");
        let f = UFloat::tagged(3.0, 0.3, "F");
        let age = &j * &f;

        approx::assert_relative_eq!(age.error_component("J"), 0.6);
        approx::assert_relative_eq!(age.error_component("F"), 0.6);
        approx::assert_relative_eq!(age.error_component("missing"), 0.0);
    }

    #[test]
    fn division_by_zero_is_refused() {
        let a = UFloat::new(1.0, 0.1);
        assert!(a.checked_div(&UFloat::zero()).is_none());
    }

    #[test]
    fn decorrelated_values_lose_shared_sources() {
        let a = UFloat::new(5.0, 0.5);
        let b = a.decorrelated();
        approx::assert_relative_eq!(a.covariance(&b), 0.0);
        approx::assert_relative_eq!((&a - &b).std_dev(), 0.5 * 2f64.sqrt());
    }

    #[test]
    fn logarithm_propagates_relative_error() {
        let a = UFloat::new(10.0, 0.5);
        approx::assert_relative_eq!(a.ln().std_dev(), 0.05);
    }
}
