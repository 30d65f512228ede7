use crate::{
    fXX,
    grid::GridError,
    math::{T, interpolate_bicubic},
    wind::{WindError, WindFunction},
};
use derive_builder::Builder;
use derive_more::Deref;
use itertools::Itertools;
use log::debug;
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fs::File, path::Path, time::Instant};

/// A single grid point of a gridded forecast at one pressure level.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GridRecord<T> {
    /// Initialization date of the forecast.
    #[serde(default)]
    pub date1: String,

    /// Valid date of the forecast.
    #[serde(default)]
    pub date2: String,

    /// Longitude (in degrees).
    #[serde(rename = "log")]
    pub lon: T,

    /// Latitude (in degrees).
    pub lat: T,

    /// Pressure level label, e.g. `1000 mb`.
    #[serde(rename = "hPa")]
    pub level: String,

    /// Geopotential height.
    #[serde(rename = "HGT")]
    pub height: T,

    /// Zonal wind.
    #[serde(rename = "UGRD")]
    pub wind_u: T,

    /// Meridional wind.
    #[serde(rename = "VGRD")]
    pub wind_v: T,

    /// Temperature.
    #[serde(rename = "TMP")]
    pub temperature: T,

    /// Vertical wind.
    #[serde(rename = "VVEL")]
    pub wind_w: T,
}

/// The rows of a gridded forecast.
#[derive(Clone, Debug, Default, Deref)]
pub struct GridTable<T>(Vec<GridRecord<T>>);

impl<T> GridTable<T> {
    /// Create a new [`GridTable`] from a list of records.
    pub fn new(records: Vec<GridRecord<T>>) -> Self {
        Self(records)
    }
}

impl<T> GridTable<T>
where
    T: fXX + DeserializeOwned,
{
    /// Load a grid table with `date1,date2,log,lat,hPa,HGT,UGRD,VGRD,TMP,VVEL` columns.
    pub fn from_csv<P>(path: P) -> Result<Self, GridError<T>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref()).map_err(|error| GridError::MissingInputFile {
            path: path.as_ref().to_path_buf(),
            error,
        })?;

        let records = csv::Reader::from_reader(file)
            .deserialize::<GridRecord<T>>()
            .collect::<Result<Vec<_>, csv::Error>>()?;

        Ok(Self(records))
    }
}

/// Settings of a [`GridSampler`].
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct GridSamplerSettings<T>
where
    T: fXX,
{
    /// Half width of the latitude/longitude box around the point of interest (in degrees).
    #[builder(default = T!(0.3))]
    pub half_width: T,
}

/// Interpolates a gridded forecast at a single point, for every pressure level.
#[derive(Clone, Debug)]
pub struct GridSampler<T>
where
    T: fXX,
{
    settings: GridSamplerSettings<T>,
}

impl<T> GridSampler<T>
where
    T: fXX,
{
    /// Create a new [`GridSampler`].
    pub fn new(settings: GridSamplerSettings<T>) -> Self {
        Self { settings }
    }

    /// Interpolate every pressure level of `table` at `point` (latitude, longitude).
    ///
    /// Levels keep the order in which they first appear in the table. A level that does not
    /// form a complete lattice, or has too few latitudes or longitudes for a cubic spline,
    /// fails the whole profile.
    pub fn sample_at_point(
        &self,
        table: &GridTable<T>,
        point: [T; 2],
    ) -> Result<PointProfile<T>, GridError<T>> {
        let start = Instant::now();
        let half_width = self.settings.half_width;

        let selection = table
            .iter()
            .filter(|record| {
                record.lat <= point[0] + half_width
                    && record.lat >= point[0] - half_width
                    && record.lon <= point[1] + half_width
                    && record.lon >= point[1] - half_width
            })
            .collect::<Vec<&GridRecord<T>>>();

        if selection.is_empty() {
            return Err(GridError::EmptySelection {
                lat: point[0],
                lon: point[1],
                half_width,
            });
        }

        let levels = selection
            .iter()
            .map(|record| record.level.as_str())
            .unique()
            .collect::<Vec<&str>>();

        let samples = levels
            .par_iter()
            .map(|level| {
                let records = selection
                    .iter()
                    .filter(|record| record.level == *level)
                    .copied()
                    .collect::<Vec<&GridRecord<T>>>();

                sample_level(level, &records, point)
            })
            .collect::<Result<Vec<LevelSample<T>>, GridError<T>>>()?;

        debug!(
            "{} pressure levels in {:.2} sec",
            samples.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(PointProfile {
            levels: samples,
            point,
        })
    }

    /// Returns a reference to the sampler settings.
    pub fn settings(&self) -> &GridSamplerSettings<T> {
        &self.settings
    }
}

/// Interpolate the fields of a single pressure level at `point`.
fn sample_level<T>(
    level: &str,
    records: &[&GridRecord<T>],
    point: [T; 2],
) -> Result<LevelSample<T>, GridError<T>>
where
    T: fXX,
{
    let lats = records
        .iter()
        .map(|record| record.lat)
        .sorted_by(|lhs, rhs| lhs.total_cmp(rhs))
        .dedup()
        .collect::<Vec<T>>();

    let lons = records
        .iter()
        .map(|record| record.lon)
        .sorted_by(|lhs, rhs| lhs.total_cmp(rhs))
        .dedup()
        .collect::<Vec<T>>();

    let irregular = || GridError::IrregularLevel {
        level: level.to_string(),
        found: records.len(),
        expected: lats.len() * lons.len(),
    };

    if records.len() != lats.len() * lons.len() {
        return Err(irregular());
    }

    // height, wind_u, wind_v, wind_w, temperature
    let mut fields: [DMatrix<T>; 5] =
        std::array::from_fn(|_| DMatrix::zeros(lats.len(), lons.len()));
    let mut filled = DMatrix::<bool>::from_element(lats.len(), lons.len(), false);

    for record in records {
        let (Some(row), Some(col)) = (
            lats.iter().position(|lat| *lat == record.lat),
            lons.iter().position(|lon| *lon == record.lon),
        ) else {
            return Err(irregular());
        };

        if filled[(row, col)] {
            return Err(irregular());
        }

        filled[(row, col)] = true;

        for (field, value) in fields.iter_mut().zip([
            record.height,
            record.wind_u,
            record.wind_v,
            record.wind_w,
            record.temperature,
        ]) {
            field[(row, col)] = value;
        }
    }

    let values = fields
        .iter()
        .map(|field| {
            interpolate_bicubic(&lats, &lons, field, point).map_err(|error| {
                GridError::DegenerateLevel {
                    level: level.to_string(),
                    error,
                }
            })
        })
        .collect::<Result<Vec<T>, GridError<T>>>()?;

    Ok(LevelSample {
        altitude: values[0],
        level: level.to_string(),
        temperature: values[4],
        wind: Vector3::new(values[1], values[2], values[3]),
    })
}

/// The interpolated state of a single pressure level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSample<T>
where
    T: fXX,
{
    /// Interpolated geopotential height.
    pub altitude: T,

    /// Pressure level label.
    pub level: String,

    /// Interpolated temperature.
    pub temperature: T,

    /// Interpolated `(u, v, w)` wind vector.
    pub wind: Vector3<T>,
}

impl<T> LevelSample<T>
where
    T: fXX,
{
    /// Returns the wind speed.
    pub fn wind_speed(&self) -> T {
        self.wind.norm()
    }
}

#[derive(Serialize)]
struct ProfileRow<T> {
    altitude: T,
    wind_u: T,
    wind_v: T,
    wind_w: T,
    wind_speed: T,
    temperature: T,
}

/// The vertical profile of a gridded forecast at a point of interest.
#[derive(Clone, Debug)]
pub struct PointProfile<T>
where
    T: fXX,
{
    levels: Vec<LevelSample<T>>,
    point: [T; 2],
}

impl<T> PointProfile<T>
where
    T: fXX,
{
    /// Returns the interpolated pressure levels.
    pub fn levels(&self) -> &[LevelSample<T>] {
        &self.levels
    }

    /// Returns the point of interest (latitude, longitude).
    pub fn point(&self) -> [T; 2] {
        self.point
    }

    /// Build the forecast [`WindFunction`] of the profile, ordered by altitude.
    pub fn wind_function(&self) -> Result<WindFunction<T, 3>, WindError<T>> {
        WindFunction::from_samples(
            self.levels
                .iter()
                .map(|level| (level.altitude, [level.wind[0], level.wind[1], level.wind[2]])),
        )
    }
}

impl<T> PointProfile<T>
where
    T: fXX + Serialize,
{
    /// Write the profile with `altitude,wind_u,wind_v,wind_w,wind_speed,temperature` columns.
    pub fn write_csv<P>(&self, path: P) -> Result<(), GridError<T>>
    where
        P: AsRef<Path>,
    {
        let output_error = |error| GridError::OutputFile {
            path: path.as_ref().to_path_buf(),
            error,
        };

        let file = File::create(path.as_ref()).map_err(output_error)?;
        let mut writer = csv::Writer::from_writer(file);

        for level in self.levels.iter() {
            writer.serialize(ProfileRow {
                altitude: level.altitude,
                wind_u: level.wind[0],
                wind_v: level.wind[1],
                wind_w: level.wind[2],
                wind_speed: level.wind_speed(),
                temperature: level.temperature,
            })?;
        }

        writer.flush().map_err(output_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::{env::temp_dir, fmt::Write, fs};

    fn height(level: usize, lat: f64, lon: f64) -> f64 {
        100.0 + 500.0 * level as f64 + 10.0 * lat - 3.0 * lon
    }

    fn grid_csv(skip_last: bool) -> String {
        let mut text = "date1,date2,log,lat,hPa,HGT,UGRD,VGRD,TMP,VVEL\n".to_string();

        for (level, label) in ["1000 mb", "975 mb"].iter().enumerate() {
            for i in 0..12 {
                for j in 0..12 {
                    if skip_last && level == 1 && i == 4 && j == 5 {
                        continue;
                    }

                    let lat = 34.5 + 0.125 * i as f64;
                    let lon = 138.5 + 0.125 * j as f64;

                    writeln!(
                        text,
                        "2017-08-20 00:00:00,2017-08-20 09:00:00,{},{},{},{},{},{},{},{}",
                        lon,
                        lat,
                        label,
                        height(level, lat, lon),
                        lat * lon,
                        lat.powi(2),
                        290.0 - 5.0 * level as f64,
                        0.1 * lon,
                    )
                    .unwrap();
                }
            }
        }

        text
    }

    fn load(name: &str, skip_last: bool) -> GridTable<f64> {
        let path = temp_dir().join(name);

        fs::write(&path, grid_csv(skip_last)).unwrap();

        let table = GridTable::<f64>::from_csv(&path).unwrap();

        fs::remove_file(&path).unwrap();

        table
    }

    #[test]
    fn test_sample_at_point() {
        let table = load("ventus_test_grid.csv", false);

        assert_eq!(table.len(), 288);

        let sampler = GridSampler::new(
            GridSamplerSettingsBuilder::<f64>::default()
                .build()
                .unwrap(),
        );

        let (lat, lon) = (35.03, 139.07);
        let profile = sampler.sample_at_point(&table, [lat, lon]).unwrap();

        assert_eq!(profile.point(), [lat, lon]);
        assert_eq!(profile.levels().len(), 2);
        assert_eq!(profile.levels()[0].level, "1000 mb");
        assert_eq!(profile.levels()[1].level, "975 mb");

        for (idx, sample) in profile.levels().iter().enumerate() {
            assert_relative_eq!(sample.altitude, height(idx, lat, lon), epsilon = 1e-6);
            assert_relative_eq!(
                sample.wind,
                Vector3::new(lat * lon, lat * lat, 0.1 * lon),
                epsilon = 1e-6
            );
            assert_relative_eq!(
                sample.temperature,
                290.0 - 5.0 * idx as f64,
                epsilon = 1e-6
            );
            assert_relative_eq!(sample.wind_speed(), sample.wind.norm());
        }
    }

    #[test]
    fn test_sample_failures() {
        let table = load("ventus_test_grid_failures.csv", false);

        let narrow = GridSampler::new(
            GridSamplerSettingsBuilder::<f64>::default()
                .half_width(0.15)
                .build()
                .unwrap(),
        );

        assert!(matches!(
            narrow.sample_at_point(&table, [35.03, 139.07]),
            Err(GridError::DegenerateLevel { .. })
        ));

        let sampler = GridSampler::new(
            GridSamplerSettingsBuilder::<f64>::default()
                .build()
                .unwrap(),
        );

        assert!(matches!(
            sampler.sample_at_point(&table, [10.0, 10.0]),
            Err(GridError::EmptySelection { .. })
        ));

        let incomplete = load("ventus_test_grid_incomplete.csv", true);

        assert!(matches!(
            sampler.sample_at_point(&incomplete, [35.03, 139.07]),
            Err(GridError::IrregularLevel {
                found: 19,
                expected: 20,
                ..
            })
        ));

        assert!(matches!(
            GridTable::<f64>::from_csv(temp_dir().join("ventus_test_grid_missing.csv")),
            Err(GridError::MissingInputFile { .. })
        ));
    }

    #[test]
    fn test_profile_round_trip() {
        let table = load("ventus_test_grid_profile.csv", false);

        let sampler = GridSampler::new(
            GridSamplerSettingsBuilder::<f64>::default()
                .build()
                .unwrap(),
        );

        let profile = sampler.sample_at_point(&table, [35.03, 139.07]).unwrap();
        let path = temp_dir().join("ventus_test_point_profile.csv");

        profile.write_csv(&path).unwrap();

        let header = fs::read_to_string(&path).unwrap();

        assert!(header.starts_with("altitude,wind_u,wind_v,wind_w,wind_speed,temperature\n"));

        let loaded = WindFunction::<f64, 3>::from_csv(&path).unwrap();
        let direct = profile.wind_function().unwrap();

        assert_eq!(loaded.altitudes().len(), 2);

        for altitude in direct.altitudes() {
            assert_relative_eq!(
                loaded.evaluate(*altitude),
                direct.evaluate(*altitude),
                epsilon = 1e-9
            );
        }

        fs::remove_file(&path).unwrap();
    }
}
