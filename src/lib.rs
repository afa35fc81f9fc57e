#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

extern crate blas_src;

pub mod analysis;
pub mod arar_age;
pub mod argon;
pub mod attribute;
pub mod config;
pub mod constants;
pub mod error;
pub mod flux;
pub mod flux_regressor;
pub mod geometry;
pub mod group;
pub mod interpreted;
pub mod isochron;
pub mod isotope;
pub(crate) mod math;
pub mod monte_carlo;
pub mod plateau;
pub mod preferred;
pub mod stats;
pub mod subgrouping;
pub mod ufloat;

pub use error::Error;
pub use ufloat::UFloat;

pub type Result<T> = ::std::result::Result<T, Error>;
