use crate::{fXX, math::MathError};
use nalgebra::{Const, Dyn, OMatrix, SVector};

/// A piecewise linear interpolation table with `N` channels sharing one increasing axis.
///
/// Channels are stored column-wise (one column per axis node), so that a single query
/// interpolates all channels at once. Queries outside the axis range are extrapolated
/// with the slope of the first or last segment.
#[derive(Clone, Debug)]
pub struct LinearTable<T, const N: usize>
where
    T: fXX,
{
    /// The strictly increasing interpolation axis.
    axis: Vec<T>,

    /// The channel values, one column per axis node.
    values: OMatrix<T, Const<N>, Dyn>,
}

impl<T, const N: usize> LinearTable<T, N>
where
    T: fXX,
{
    /// Create a new [`LinearTable`] from an axis and a matching matrix of channel values.
    pub fn new(axis: Vec<T>, values: OMatrix<T, Const<N>, Dyn>) -> Result<Self, MathError<T>> {
        if axis.is_empty() {
            return Err(MathError::InsufficientPoints {
                found: 0,
                required: 1,
            });
        }

        if axis.len() != values.ncols() {
            return Err(MathError::LengthMismatch(axis.len(), values.ncols()));
        }

        if !axis.iter().all(|node| node.is_finite()) {
            return Err(MathError::InvalidAxis {
                msg: "axis contains non-finite values",
            });
        }

        if !axis.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(MathError::InvalidAxis {
                msg: "axis is not strictly increasing",
            });
        }

        Ok(Self { axis, values })
    }

    /// Create a new [`LinearTable`] from an axis and a slice of `N`-channel rows.
    pub fn from_rows(axis: Vec<T>, rows: &[[T; N]]) -> Result<Self, MathError<T>> {
        let values = OMatrix::<T, Const<N>, Dyn>::from_iterator(
            rows.len(),
            rows.iter().flat_map(|row| row.iter().copied()),
        );

        Self::new(axis, values)
    }

    /// Returns a reference to the interpolation axis.
    pub fn axis(&self) -> &[T] {
        &self.axis
    }

    /// Evaluate all channels at `x`.
    pub fn evaluate(&self, x: T) -> SVector<T, N> {
        let length = self.axis.len();

        if length == 1 {
            return self.values.column(0).into_owned();
        }

        let idx = self
            .axis
            .partition_point(|node| *node <= x)
            .clamp(1, length - 1);

        let (x_lo, x_hi) = (self.axis[idx - 1], self.axis[idx]);
        let frac = (x - x_lo) / (x_hi - x_lo);

        self.values.column(idx - 1) * (T::one() - frac) + self.values.column(idx) * frac
    }

    /// Create a new table over the same axis, mapping the channel values of each node.
    pub fn map_nodes<F, const M: usize>(&self, f: F) -> LinearTable<T, M>
    where
        F: Fn(SVector<T, N>) -> SVector<T, M>,
    {
        let mut values = OMatrix::<T, Const<M>, Dyn>::zeros(self.len());

        for (idx, column) in self.values.column_iter().enumerate() {
            values.set_column(idx, &f(column.into_owned()));
        }

        LinearTable {
            axis: self.axis.clone(),
            values,
        }
    }

    /// Returns `true` if the table holds no nodes (never the case for a constructed table).
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// Returns the number of axis nodes.
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    /// Returns the sampled axis range `(min, max)`.
    pub fn range(&self) -> (T, T) {
        (self.axis[0], self.axis[self.axis.len() - 1])
    }

    /// Returns a reference to the channel values.
    pub fn values(&self) -> &OMatrix<T, Const<N>, Dyn> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Vector1, Vector2};

    fn table() -> LinearTable<f64, 2> {
        LinearTable::from_rows(
            vec![0.0, 10.0, 30.0, 35.5],
            &[[1.0, -1.0], [2.0, 0.5], [0.1, 3.0], [7.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_table_nodes() {
        let table = table();

        for (idx, node) in table.axis().iter().enumerate() {
            assert_eq!(table.evaluate(*node), table.values().column(idx).into_owned());
        }
    }

    #[test]
    fn test_table_interpolation() {
        let table = table();

        assert_relative_eq!(
            table.evaluate(5.0),
            Vector2::new(1.5, -0.25),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            table.evaluate(20.0),
            Vector2::new(1.05, 1.75),
            epsilon = 1e-12
        );

        // extrapolation continues the boundary segments
        assert_relative_eq!(
            table.evaluate(-10.0),
            Vector2::new(0.0, -2.5),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            table.evaluate(41.0),
            Vector2::new(13.9, -3.0),
            epsilon = 1e-12
        );

        assert_eq!(table.range(), (0.0, 35.5));
        assert_eq!(table.len(), 4);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_table_map_nodes() {
        let table = table().map_nodes(|value| Vector1::new(value[0] + value[1]));

        assert_eq!(table.axis(), &[0.0, 10.0, 30.0, 35.5]);
        assert_relative_eq!(table.evaluate(5.0)[0], 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_table_single_node() {
        let table = LinearTable::from_rows(vec![3.0_f64], &[[1.0, 2.0]]).unwrap();

        assert_eq!(table.evaluate(-100.0), Vector2::new(1.0, 2.0));
        assert_eq!(table.evaluate(100.0), Vector2::new(1.0, 2.0));
    }

    #[test]
    fn test_table_invalid() {
        assert!(matches!(
            LinearTable::<f64, 1>::from_rows(vec![0.0, 1.0, 1.0], &[[0.0], [1.0], [2.0]]),
            Err(MathError::InvalidAxis { .. })
        ));

        assert!(matches!(
            LinearTable::<f64, 1>::from_rows(vec![0.0, 1.0], &[[0.0]]),
            Err(MathError::LengthMismatch(2, 1))
        ));

        assert!(matches!(
            LinearTable::<f64, 1>::from_rows(vec![], &[]),
            Err(MathError::InsufficientPoints { .. })
        ));

        assert!(matches!(
            LinearTable::<f64, 1>::from_rows(vec![0.0, f64::NAN], &[[0.0], [1.0]]),
            Err(MathError::InvalidAxis { .. })
        ));
    }
}
