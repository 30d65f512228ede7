use crate::{
    fXX,
    math::{MathError, T, abs},
};
use derive_more::Deref;
use itertools::zip_eq;
use log::error;
use nalgebra::{DMatrix, DMatrixView};
use serde::{Deserialize, Serialize};

/// A dynamically sized covariance matrix.
#[derive(Clone, Debug, Deref, Deserialize, Serialize)]
pub struct CovMatrix<T>
where
    T: fXX,
{
    /// The inverse of the covariance matrix.
    inverse_matrix: DMatrix<T>,

    /// The underlying dynamically sized covariance matrix.
    #[deref]
    matrix: DMatrix<T>,
}

impl<T> CovMatrix<T>
where
    T: fXX,
{
    /// Create a [`CovMatrix`] from a symmetric and invertible square matrix.
    pub fn from_matrix(matrix: &DMatrixView<T>) -> Result<Self, MathError<T>> {
        if !matrix.is_square() {
            return Err(MathError::InvalidMatrix {
                msg: "matrix is not square",
                matrix: matrix.into_owned(),
            });
        }

        if !matrix.iter().all(|value| value.is_finite()) {
            error!(
                "CovMatrix::from_matrix input matrix contains non-finite values: {}",
                matrix
            );
            return Err(MathError::DegenerateCovariance {
                msg: "matrix contains non-finite values",
                matrix: matrix.into_owned(),
            });
        }

        let scale = matrix
            .iter()
            .fold(T::zero(), |acc, value| num_traits::Float::max(acc, abs!(*value)));

        for idx in 0..matrix.nrows() {
            for jdx in (idx + 1)..matrix.ncols() {
                if abs!(matrix[(idx, jdx)] - matrix[(jdx, idx)]) > T!(1e-6) * scale {
                    return Err(MathError::InvalidMatrix {
                        msg: "matrix is not symmetric",
                        matrix: matrix.into_owned(),
                    });
                }
            }
        }

        let inverse_matrix = match matrix.into_owned().try_inverse() {
            Some(result) if result.iter().all(|value| value.is_finite()) => result,
            _ => {
                error!(
                    "CovMatrix::from_matrix input matrix is singular: {}",
                    matrix
                );
                return Err(MathError::DegenerateCovariance {
                    msg: "matrix is singular",
                    matrix: matrix.into_owned(),
                });
            }
        };

        Ok(Self {
            inverse_matrix,
            matrix: matrix.into_owned(),
        })
    }

    /// Returns a reference to the inverse of the covariance matrix.
    pub fn ref_inverse_matrix(&self) -> &DMatrix<T> {
        &self.inverse_matrix
    }

    /// Returns a reference to the covariance matrix.
    pub fn ref_matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }
}

/// Computes the unbiased covariance over two slices.
///
/// The length of both iterators must be equal (panic).
pub fn covariance<'a, T, I>(x: I, y: I) -> T
where
    T: fXX,
    I: IntoIterator<Item = &'a T>,
    <I as IntoIterator>::IntoIter: Clone,
{
    let x_iter = x.into_iter();
    let y_iter = y.into_iter();

    let length = x_iter.clone().count();

    let mu_x = x_iter.clone().sum::<T>() / T::from_usize(length).unwrap();
    let mu_y = y_iter.clone().sum::<T>() / T::from_usize(length).unwrap();

    zip_eq(x_iter, y_iter)
        .map(|(val_x, val_y)| (*val_x - mu_x) * (*val_y - mu_y))
        .sum::<T>()
        / T::from_usize(length - 1).unwrap()
}
