use crate::{
    fXX,
    math::{MathError, T, powi},
};
use log::error;
use nalgebra::{DMatrix, DVector};

/// An interpolating cubic spline with not-a-knot end conditions.
///
/// The spline is stored as its knots, values and second derivatives (moments) at the knots.
/// Outside the knot range the first or last cubic piece is continued.
#[derive(Clone, Debug)]
pub struct CubicSpline<T>
where
    T: fXX,
{
    knots: Vec<T>,
    moments: Vec<T>,
    values: Vec<T>,
}

impl<T> CubicSpline<T>
where
    T: fXX,
{
    /// The minimum number of knots, i.e. the spline order plus one.
    pub const MIN_KNOTS: usize = 4;

    /// Create a new [`CubicSpline`] through the points `(knots[i], values[i])`.
    pub fn new(knots: &[T], values: &[T]) -> Result<Self, MathError<T>> {
        if knots.len() != values.len() {
            return Err(MathError::LengthMismatch(knots.len(), values.len()));
        }

        let n = knots.len();

        if n < Self::MIN_KNOTS {
            return Err(MathError::InsufficientPoints {
                found: n,
                required: Self::MIN_KNOTS,
            });
        }

        if !knots.iter().chain(values.iter()).all(|value| value.is_finite()) {
            return Err(MathError::InvalidAxis {
                msg: "knots or values contain non-finite values",
            });
        }

        if !knots.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(MathError::InvalidAxis {
                msg: "knots are not strictly increasing",
            });
        }

        let steps = knots
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect::<Vec<T>>();

        let mut system = DMatrix::<T>::zeros(n, n);
        let mut rhs = DVector::<T>::zeros(n);

        // not-a-knot: continuous third derivative at the second and second-to-last knot
        system[(0, 0)] = steps[1];
        system[(0, 1)] = -(steps[0] + steps[1]);
        system[(0, 2)] = steps[0];

        system[(n - 1, n - 3)] = steps[n - 2];
        system[(n - 1, n - 2)] = -(steps[n - 3] + steps[n - 2]);
        system[(n - 1, n - 1)] = steps[n - 3];

        for idx in 1..(n - 1) {
            system[(idx, idx - 1)] = steps[idx - 1];
            system[(idx, idx)] = T!(2.0) * (steps[idx - 1] + steps[idx]);
            system[(idx, idx + 1)] = steps[idx];

            rhs[idx] = T!(6.0)
                * ((values[idx + 1] - values[idx]) / steps[idx]
                    - (values[idx] - values[idx - 1]) / steps[idx - 1]);
        }

        let moments = match system.clone().lu().solve(&rhs) {
            Some(result) => result,
            None => {
                error!("CubicSpline::new spline system is singular: {}", system);
                return Err(MathError::InvalidMatrix {
                    msg: "spline system is singular",
                    matrix: system,
                });
            }
        };

        Ok(Self {
            knots: knots.to_vec(),
            moments: moments.iter().copied().collect(),
            values: values.to_vec(),
        })
    }

    /// Evaluate the spline at `x`.
    pub fn evaluate(&self, x: T) -> T {
        let idx = self
            .knots
            .partition_point(|knot| *knot <= x)
            .clamp(1, self.knots.len() - 1)
            - 1;

        let (x_lo, x_hi) = (self.knots[idx], self.knots[idx + 1]);
        let (m_lo, m_hi) = (self.moments[idx], self.moments[idx + 1]);
        let (y_lo, y_hi) = (self.values[idx], self.values[idx + 1]);

        let step = x_hi - x_lo;

        let d_lo = x_hi - x;
        let d_hi = x - x_lo;

        (m_lo * powi!(d_lo, 3) + m_hi * powi!(d_hi, 3)) / (T!(6.0) * step)
            + (y_lo / step - m_lo * step / T!(6.0)) * d_lo
            + (y_hi / step - m_hi * step / T!(6.0)) * d_hi
    }

    /// Returns a reference to the spline knots.
    pub fn knots(&self) -> &[T] {
        &self.knots
    }
}

/// Interpolate a rectangular grid at a single point using a tensor-product cubic spline.
///
/// The `values` matrix is indexed as `(row, column)`, where rows follow `row_axis` and columns
/// follow `col_axis`. Each row is first interpolated along the column axis, the resulting
/// column is then interpolated along the row axis.
pub fn interpolate_bicubic<T>(
    row_axis: &[T],
    col_axis: &[T],
    values: &DMatrix<T>,
    point: [T; 2],
) -> Result<T, MathError<T>>
where
    T: fXX,
{
    if values.nrows() != row_axis.len() {
        return Err(MathError::LengthMismatch(values.nrows(), row_axis.len()));
    }

    if values.ncols() != col_axis.len() {
        return Err(MathError::LengthMismatch(values.ncols(), col_axis.len()));
    }

    let column = values
        .row_iter()
        .map(|row| {
            let row_values = row.iter().copied().collect::<Vec<T>>();

            Ok(CubicSpline::new(col_axis, &row_values)?.evaluate(point[1]))
        })
        .collect::<Result<Vec<T>, MathError<T>>>()?;

    Ok(CubicSpline::new(row_axis, &column)?.evaluate(point[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cubic(x: f64) -> f64 {
        0.5 * x.powi(3) - 2.0 * x.powi(2) + x + 1.0
    }

    #[test]
    fn test_spline_reproduces_cubic() {
        let knots = [-1.0, -0.2, 0.5, 1.3, 2.0, 3.7];
        let values = knots.iter().map(|x| cubic(*x)).collect::<Vec<f64>>();

        let spline = CubicSpline::new(&knots, &values).unwrap();

        for x in [-1.5, -0.7, 0.0, 0.9, 1.3, 2.5, 3.7, 4.2] {
            assert_relative_eq!(spline.evaluate(x), cubic(x), epsilon = 1e-9);
        }

        assert_eq!(spline.knots().len(), 6);
    }

    #[test]
    fn test_spline_minimum_knots() {
        let knots = [0.0, 1.0, 2.5, 3.0];
        let values = knots.iter().map(|x| cubic(*x)).collect::<Vec<f64>>();

        let spline = CubicSpline::new(&knots, &values).unwrap();

        assert_relative_eq!(spline.evaluate(1.7), cubic(1.7), epsilon = 1e-9);

        assert!(matches!(
            CubicSpline::new(&knots[..3], &values[..3]),
            Err(MathError::InsufficientPoints {
                found: 3,
                required: 4
            })
        ));

        assert!(matches!(
            CubicSpline::new(&[0.0, 2.0, 1.0, 3.0], &values),
            Err(MathError::InvalidAxis { .. })
        ));
    }

    #[test]
    fn test_interpolate_bicubic() {
        let surface = |lat: f64, lon: f64| lat.powi(2) + 3.0 * lat * lon - lon.powi(3) + 2.0;

        let lats = [34.0, 34.1, 34.2, 34.3, 34.4];
        let lons = [139.0, 139.125, 139.25, 139.375, 139.5, 139.625];

        let values = DMatrix::from_fn(lats.len(), lons.len(), |idx, jdx| {
            surface(lats[idx], lons[jdx])
        });

        let value = interpolate_bicubic(&lats, &lons, &values, [34.23, 139.31]).unwrap();

        assert_relative_eq!(value, surface(34.23, 139.31), max_relative = 1e-9);

        assert!(matches!(
            interpolate_bicubic(&lats[..4], &lons, &values, [34.23, 139.31]),
            Err(MathError::LengthMismatch(5, 4))
        ));
    }
}
