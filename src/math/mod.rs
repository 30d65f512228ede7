//! Mathematical data types, functions and routines.
//!
//! # Covariance Matrices
//!
//! A [`CovMatrix`] is created from a symmetric square matrix. The inverse is computed once on
//! construction and a singular matrix is rejected as a degenerate covariance. The unbiased
//! sample [`covariance`] of two series is computed separately.
//!
//! # Interpolation
//!
//! - [`LinearTable`] A piecewise linear interpolation table over an increasing axis with `N`
//!   channels that share the axis. Queries outside the axis are linearly extrapolated.
//! - [`CubicSpline`] An interpolating cubic spline with not-a-knot end conditions, and its
//!   tensor-product extension [`interpolate_bicubic`] for rectangular grids.
//!
//! # Curve fitting & quadrature
//!
//! - [`Polynomial`] A least-squares polynomial fit evaluated in a normalized variable.
//! - [`trapezoid`] Trapezoidal integration over sampled values.

mod covariance;
mod polynomial;
mod spline;
mod table;

pub use covariance::{CovMatrix, covariance};
pub use polynomial::{Polynomial, linspace, trapezoid};
pub use spline::{CubicSpline, interpolate_bicubic};
pub use table::LinearTable;

use nalgebra::DMatrix;
use thiserror::Error;

/// Errors associated with the [`math`](crate::math) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MathError<T> {
    #[error("covariance matrix is degenerate: {msg}")]
    DegenerateCovariance {
        msg: &'static str,
        matrix: DMatrix<T>,
    },
    #[error("least squares fit failed: {msg}")]
    FitFailed { msg: &'static str },
    #[error("insufficient number of points {found}, at least {required} are required")]
    InsufficientPoints { found: usize, required: usize },
    #[error("invalid argument: {msg}")]
    InvalidArgument { msg: &'static str },
    #[error("interpolation axis is invalid: {msg}")]
    InvalidAxis { msg: &'static str },
    #[error("matrix does not obey required invariants: {msg}")]
    InvalidMatrix {
        msg: &'static str,
        matrix: DMatrix<T>,
    },
    #[error("array length mismatch: {0} != {1}")]
    LengthMismatch(usize, usize),
}

/// A shorthand for converting constants to type `T`.
macro_rules! T {
    ($value: expr) => {
        T::from_f64($value).unwrap()
    };
}

macro_rules! abs {
    ($value: expr) => {
        num_traits::Float::abs($value)
    };
}

macro_rules! acos {
    ($value: expr) => {
        num_traits::Float::acos($value)
    };
}

macro_rules! atan2 {
    ($value_y: expr, $value_x: expr) => {
        num_traits::Float::atan2($value_y, $value_x)
    };
}

macro_rules! cos {
    ($value: expr) => {
        num_traits::Float::cos($value)
    };
}

macro_rules! ln {
    ($value: expr) => {
        num_traits::Float::ln($value)
    };
}

macro_rules! powf {
    ($value: expr, $float: expr) => {
        num_traits::Float::powf($value, $float)
    };
}

macro_rules! powi {
    ($value: expr, $integer: expr) => {
        num_traits::Float::powi($value, $integer)
    };
}

macro_rules! round {
    ($value: expr) => {
        num_traits::Float::round($value)
    };
}

macro_rules! sin {
    ($value: expr) => {
        num_traits::Float::sin($value)
    };
}

macro_rules! sqrt {
    ($value: expr) => {
        num_traits::Float::sqrt($value)
    };
}

pub(crate) use T;
pub(crate) use abs;
pub(crate) use acos;
pub(crate) use atan2;
pub(crate) use cos;
pub(crate) use ln;
pub(crate) use powf;
pub(crate) use powi;
pub(crate) use round;
pub(crate) use sin;
pub(crate) use sqrt;
