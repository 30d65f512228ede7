use crate::{
    fXX,
    math::{MathError, T, powi},
};
use log::warn;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A polynomial obtained from a least-squares fit.
///
/// The polynomial is expressed in the normalized variable `(x - shift) / scale`, which maps the
/// fitted abscissa range onto `[-1, 1]` and keeps high degree fits well conditioned.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Polynomial<T>
where
    T: fXX,
{
    /// Polynomial coefficients in increasing order.
    coefficients: DVector<T>,

    /// Normalization scale.
    scale: T,

    /// Normalization shift.
    shift: T,
}

impl<T> Polynomial<T>
where
    T: fXX,
{
    /// Returns a reference to the coefficients (in increasing order) with respect to the
    /// normalized variable.
    pub fn coefficients(&self) -> &DVector<T> {
        &self.coefficients
    }

    /// Returns the degree of the polynomial.
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Evaluate the polynomial at `x`.
    pub fn evaluate(&self, x: T) -> T {
        let t = (x - self.shift) / self.scale;

        self.coefficients
            .iter()
            .rev()
            .fold(T::zero(), |acc, coefficient| acc * t + *coefficient)
    }

    /// Least-squares fit of a polynomial of the given degree to the points `(x[i], y[i])`.
    ///
    /// If there are too few points for the requested degree, the degree is reduced to
    /// `x.len() - 1`.
    pub fn fit(x: &[T], y: &[T], degree: usize) -> Result<Self, MathError<T>> {
        if x.len() != y.len() {
            return Err(MathError::LengthMismatch(x.len(), y.len()));
        }

        if x.is_empty() {
            return Err(MathError::InsufficientPoints {
                found: 0,
                required: 1,
            });
        }

        let degree = if degree + 1 > x.len() {
            warn!(
                "Polynomial::fit reducing degree {} to {} ({} samples)",
                degree,
                x.len() - 1,
                x.len()
            );

            x.len() - 1
        } else {
            degree
        };

        let (x_min, x_max) = x.iter().fold(
            (T::infinity(), T::neg_infinity()),
            |(lo, hi), value| {
                (
                    num_traits::Float::min(lo, *value),
                    num_traits::Float::max(hi, *value),
                )
            },
        );

        let shift = (x_max + x_min) * T!(0.5);
        let scale = match (x_max - x_min) * T!(0.5) {
            value if value > T::zero() => value,
            _ => T::one(),
        };

        let vandermonde = DMatrix::<T>::from_fn(x.len(), degree + 1, |idx, jdx| {
            powi!((x[idx] - shift) / scale, jdx as i32)
        });

        let coefficients = vandermonde
            .svd(true, true)
            .solve(&DVector::from_column_slice(y), T!(1e-12))
            .map_err(|msg| MathError::FitFailed { msg })?;

        if !coefficients.iter().all(|value| value.is_finite()) {
            return Err(MathError::FitFailed {
                msg: "coefficients are not finite",
            });
        }

        Ok(Self {
            coefficients,
            scale,
            shift,
        })
    }
}

/// Returns `num` evenly spaced values over the closed interval `[start, stop]`.
pub fn linspace<T>(start: T, stop: T, num: usize) -> Vec<T>
where
    T: fXX,
{
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / T::from_usize(num - 1).unwrap();

            (0..num)
                .map(|idx| {
                    if idx == num - 1 {
                        stop
                    } else {
                        start + step * T::from_usize(idx).unwrap()
                    }
                })
                .collect()
        }
    }
}

/// Trapezoidal integration of `y` over the sample positions `x`.
pub fn trapezoid<T>(x: &[T], y: &[T]) -> T
where
    T: fXX,
{
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x_pair, y_pair)| (x_pair[1] - x_pair[0]) * (y_pair[0] + y_pair[1]) * T!(0.5))
        .sum()
}
