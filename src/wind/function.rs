use crate::{
    WindProfile, fXX,
    math::{LinearTable, T, cos, sin},
    wind::WindError,
};
use derive_more::Deref;
use itertools::Itertools;
use nalgebra::{SVector, Vector2, Vector3};
use serde::{Deserialize, de::DeserializeOwned};
use std::{fs::File, path::Path};

/// A wind table row with `altitude,wind_u,wind_v[,wind_w]` columns.
#[derive(Deserialize)]
struct WindTableRow<T> {
    altitude: T,
    wind_u: T,
    wind_v: T,
    #[serde(default)]
    wind_w: Option<T>,
}

/// A forecast table row, with winds blowing from west, south and upwards.
#[derive(Deserialize)]
struct ForecastTableRow<T> {
    altitude: T,
    #[serde(rename = "Wind (from west)")]
    from_west: T,
    #[serde(rename = "Wind (from south)")]
    from_south: T,
    #[serde(rename = "Wind (vertical)")]
    vertical: T,
}

/// An altitude indexed wind vector function with `N` components.
///
/// The components are linearly interpolated between the altitude nodes and linearly
/// extrapolated beyond them.
#[derive(Clone, Debug, Deref)]
pub struct WindFunction<T, const N: usize>(LinearTable<T, N>)
where
    T: fXX;

impl<T, const N: usize> WindFunction<T, N>
where
    T: fXX,
{
    /// Create a new [`WindFunction`] from an increasing altitude axis and matching wind vectors.
    pub fn new(altitudes: Vec<T>, vectors: &[[T; N]]) -> Result<Self, WindError<T>> {
        Ok(Self(LinearTable::from_rows(altitudes, vectors)?))
    }

    /// Create a new [`WindFunction`] from unordered `(altitude, vector)` samples.
    ///
    /// The samples are sorted by altitude, duplicate altitudes are rejected.
    pub fn from_samples<I>(samples: I) -> Result<Self, WindError<T>>
    where
        I: IntoIterator<Item = (T, [T; N])>,
    {
        let (altitudes, vectors): (Vec<T>, Vec<[T; N]>) = samples
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.total_cmp(rhs))
            .unzip();

        Self::new(altitudes, &vectors)
    }

    /// Returns the altitude nodes.
    pub fn altitudes(&self) -> &[T] {
        self.axis()
    }

    /// Evaluate the wind vector at the given altitude.
    pub fn evaluate(&self, altitude: T) -> SVector<T, N> {
        self.0.evaluate(altitude)
    }
}

impl<T> WindFunction<T, 3>
where
    T: fXX + DeserializeOwned,
{
    /// Load a wind table with `altitude,wind_u,wind_v[,wind_w]` columns.
    ///
    /// Additional columns are ignored, a missing `wind_w` column is read as zero vertical wind.
    pub fn from_csv<P>(path: P) -> Result<Self, WindError<T>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref()).map_err(|error| WindError::MissingInputFile {
            path: path.as_ref().to_path_buf(),
            error,
        })?;

        let rows = csv::Reader::from_reader(file)
            .deserialize::<WindTableRow<T>>()
            .collect::<Result<Vec<_>, csv::Error>>()?;

        Self::from_samples(rows.into_iter().map(|row| {
            (
                row.altitude,
                [row.wind_u, row.wind_v, row.wind_w.unwrap_or(T::zero())],
            )
        }))
    }

    /// Load a forecast table with `altitude,Wind (from west),Wind (from south),Wind (vertical)`
    /// columns and rotate the horizontal components by the magnetic declination (in degrees).
    pub fn from_forecast_csv<P>(path: P, declination: T) -> Result<Self, WindError<T>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref()).map_err(|error| WindError::MissingInputFile {
            path: path.as_ref().to_path_buf(),
            error,
        })?;

        let rows = csv::Reader::from_reader(file)
            .deserialize::<ForecastTableRow<T>>()
            .collect::<Result<Vec<_>, csv::Error>>()?;

        Self::from_samples(rows.into_iter().map(|row| {
            let horizontal =
                rotate_declination(Vector2::new(row.from_west, row.from_south), declination);

            (row.altitude, [horizontal[0], horizontal[1], row.vertical])
        }))
    }
}

impl<T> From<WindFunction<T, 2>> for WindFunction<T, 3>
where
    T: fXX,
{
    fn from(value: WindFunction<T, 2>) -> Self {
        Self(value.map_nodes(|horizontal| horizontal.push(T::zero())))
    }
}

impl<T> WindProfile<T> for WindFunction<T, 2>
where
    T: fXX,
{
    fn wind(&self, altitude: T) -> Vector3<T> {
        let horizontal = self.evaluate(altitude);

        Vector3::new(horizontal[0], horizontal[1], T::zero())
    }
}

impl<T> WindProfile<T> for WindFunction<T, 3>
where
    T: fXX,
{
    fn wind(&self, altitude: T) -> Vector3<T> {
        self.evaluate(altitude)
    }
}

/// Rotate a horizontal `(east, north)` wind vector by the magnetic declination (in degrees).
pub(crate) fn rotate_declination<T>(wind: Vector2<T>, declination: T) -> Vector2<T>
where
    T: fXX,
{
    let theta = declination * T::pi() / T!(180.0);

    Vector2::new(
        wind[0] * cos!(theta) + wind[1] * sin!(theta),
        -wind[0] * sin!(theta) + wind[1] * cos!(theta),
    )
}
