use crate::{
    WindProfile, fXX,
    math::{MathError, T, abs, covariance},
    wind::{ConditionalNormal, WindError, WindFunction},
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use derive_builder::Builder;
use log::{debug, warn};
use nalgebra::{Dyn, Matrix4, OMatrix, U4, Vector2, Vector4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::Path,
    time::Instant,
};

/// A single historical forecast error sample at one altitude bin.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ErrorStatSample<T>
where
    T: fXX,
{
    /// Forecast error (observed - forecast).
    pub error: Vector2<T>,

    /// Coincident forecast wind.
    pub forecast: Vector2<T>,
}

impl<T> ErrorStatSample<T>
where
    T: fXX,
{
    /// Returns the sample as a `(error_u, error_v, forecast_u, forecast_v)` vector.
    pub fn as_vector(&self) -> Vector4<T> {
        Vector4::new(
            self.error[0],
            self.error[1],
            self.forecast[0],
            self.forecast[1],
        )
    }
}

/// The 4-variate normal statistics of [`ErrorStatSample`]s at one altitude bin.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AltitudeBinStatistics<T>
where
    T: fXX,
{
    /// Bin altitude.
    pub altitude: T,

    /// Mean `(error_u, error_v, forecast_u, forecast_v)` vector.
    pub mean: Vector4<T>,

    /// Covariance matrix of the `(error_u, error_v, forecast_u, forecast_v)` vector.
    pub covariance: Matrix4<T>,
}

impl<T> AltitudeBinStatistics<T>
where
    T: fXX,
{
    /// Compute the sample mean and the unbiased sample covariance of a set of samples.
    pub fn from_samples(
        altitude: T,
        samples: &[ErrorStatSample<T>],
    ) -> Result<Self, MathError<T>> {
        if samples.len() < 2 {
            return Err(MathError::InsufficientPoints {
                found: samples.len(),
                required: 2,
            });
        }

        let matrix = OMatrix::<T, U4, Dyn>::from_columns(
            &samples
                .iter()
                .map(|sample| sample.as_vector())
                .collect::<Vec<Vector4<T>>>(),
        );

        let covariance =
            Matrix4::from_fn(|idx, jdx| covariance(matrix.row(idx), matrix.row(jdx)));

        Ok(Self {
            altitude,
            mean: matrix.column_mean(),
            covariance,
        })
    }

    /// Returns the climatological distribution of the observed wind.
    pub fn climatological(&self) -> ConditionalNormal<T> {
        ConditionalNormal::climatological(&self.mean, &self.covariance)
    }

    /// Returns the distribution of the forecast error, given a forecast realization.
    pub fn conditional(
        &self,
        forecast: &Vector2<T>,
    ) -> Result<ConditionalNormal<T>, WindError<T>> {
        ConditionalNormal::from_joint(&self.mean, &self.covariance, forecast).map_err(|error| {
            WindError::DegenerateBin {
                altitude: self.altitude,
                error,
            }
        })
    }
}

/// Parse an inclusive integer range given as `a`, `a:b` or `a:b:step`.
///
/// Returns `None` if the range is malformed.
pub fn parse_range(text: &str) -> Option<Vec<i32>> {
    let parts = text
        .split(':')
        .map(|part| part.trim().parse::<i32>().ok())
        .collect::<Option<Vec<i32>>>()?;

    match parts.as_slice() {
        [value] => Some(vec![*value]),
        [start, stop] => Some((*start..=*stop).collect()),
        [start, stop, step] if *step > 0 => {
            Some((*start..=*stop).step_by(*step as usize).collect())
        }
        _ => None,
    }
}

/// Provenance of a set of error statistics.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Provenance {
    /// Sampled years.
    pub years: Vec<i32>,

    /// Sampled months.
    pub months: Vec<u32>,

    /// Sampled days of the month.
    pub days: Vec<u32>,

    /// Location identifier.
    pub location: String,

    /// Hour of day reached by the forecast.
    pub target_hour: u32,

    /// Hour of day of the radiosonde observations, the target hour if unset.
    #[serde(
        default,
        rename = "rawin_hour",
        skip_serializing_if = "Option::is_none"
    )]
    pub observation_hour: Option<u32>,

    /// Hour of day at which the forecast was initialized.
    #[serde(rename = "MSM_init_hour")]
    pub init_hour: u32,

    /// Forecast lead time in hours.
    #[serde(rename = "MSM_forecast_hour")]
    pub forecast_hour: u32,
}

impl Provenance {
    /// Create a new [`Provenance`], the target hour is the hour of day reached by the forecast.
    pub fn new(
        years: Vec<i32>,
        months: Vec<u32>,
        days: Vec<u32>,
        location: impl Into<String>,
        init_hour: u32,
        forecast_hour: u32,
    ) -> Self {
        Self {
            years,
            months,
            days,
            location: location.into(),
            target_hour: (init_hour + forecast_hour) % 24,
            observation_hour: None,
            init_hour,
            forecast_hour,
        }
    }

    /// Set the hour of day of the observations.
    pub fn with_observation_hour(mut self, hour: u32) -> Self {
        self.observation_hour = Some(hour);

        self
    }

    /// Returns every valid forecast target date-time, invalid calendar dates are skipped.
    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.years
            .iter()
            .flat_map(|year| {
                self.months.iter().flat_map(move |month| {
                    self.days.iter().filter_map(move |day| {
                        NaiveDate::from_ymd_opt(*year, *month, *day)
                            .and_then(|date| date.and_hms_opt(self.target_hour, 0, 0))
                    })
                })
            })
            .collect()
    }

    /// Returns the initialization date-time of the forecast valid at `target`.
    pub fn forecast_init(&self, target: &NaiveDateTime) -> NaiveDateTime {
        *target - TimeDelta::hours(self.forecast_hour as i64)
    }

    /// Returns the observation date-time paired with the forecast valid at `target`, `None` if
    /// the observation hour is not a valid hour of day.
    pub fn observation_time(&self, target: &NaiveDateTime) -> Option<NaiveDateTime> {
        match self.observation_hour {
            Some(hour) => target.date().and_hms_opt(hour, 0, 0),
            None => Some(*target),
        }
    }
}

/// A serialized set of error statistics over an altitude axis.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorStatistics<T>
where
    T: fXX,
{
    alt_axis: Vec<T>,

    #[serde(flatten)]
    provenance: Provenance,

    mu4: Vec<[T; 4]>,

    sigma4: Vec<[[T; 4]; 4]>,
}

impl<T> ErrorStatistics<T>
where
    T: fXX,
{
    /// Create a new [`ErrorStatistics`] record from per-bin statistics.
    pub fn new(provenance: Provenance, bins: &[AltitudeBinStatistics<T>]) -> Self {
        Self {
            alt_axis: bins.iter().map(|bin| bin.altitude).collect(),
            provenance,
            mu4: bins
                .iter()
                .map(|bin| [bin.mean[0], bin.mean[1], bin.mean[2], bin.mean[3]])
                .collect(),
            sigma4: bins
                .iter()
                .map(|bin| {
                    let mut rows = [[T::zero(); 4]; 4];

                    for (idx, row) in rows.iter_mut().enumerate() {
                        for (jdx, value) in row.iter_mut().enumerate() {
                            *value = bin.covariance[(idx, jdx)];
                        }
                    }

                    rows
                })
                .collect(),
        }
    }

    /// Returns the altitude axis.
    pub fn alt_axis(&self) -> &[T] {
        &self.alt_axis
    }

    /// Returns the statistics of each altitude bin.
    pub fn bins(&self) -> Vec<AltitudeBinStatistics<T>> {
        self.alt_axis
            .iter()
            .zip(self.mu4.iter().zip(self.sigma4.iter()))
            .map(|(altitude, (mu, sigma))| AltitudeBinStatistics {
                altitude: *altitude,
                mean: Vector4::from_column_slice(mu),
                covariance: Matrix4::from_fn(|idx, jdx| sigma[idx][jdx]),
            })
            .collect()
    }

    /// Returns the number of altitude bins.
    pub fn len(&self) -> usize {
        self.alt_axis.len()
    }

    /// Returns `true` if there are no altitude bins.
    pub fn is_empty(&self) -> bool {
        self.alt_axis.is_empty()
    }

    /// Returns a reference to the provenance.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Check the consistency of the record.
    pub fn validate(&self) -> Result<(), WindError<T>> {
        if self.alt_axis.is_empty() {
            return Err(WindError::InvalidStatistics {
                msg: "record contains no altitude bins".to_string(),
            });
        }

        if self.mu4.len() != self.alt_axis.len() || self.sigma4.len() != self.alt_axis.len() {
            return Err(WindError::InvalidStatistics {
                msg: format!(
                    "{} altitudes, {} mean vectors and {} covariance matrices",
                    self.alt_axis.len(),
                    self.mu4.len(),
                    self.sigma4.len()
                ),
            });
        }

        if !self.alt_axis.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(WindError::InvalidStatistics {
                msg: "altitude axis is not strictly increasing".to_string(),
            });
        }

        for (altitude, (mu, sigma)) in self
            .alt_axis
            .iter()
            .zip(self.mu4.iter().zip(self.sigma4.iter()))
        {
            let finite = mu
                .iter()
                .chain(sigma.iter().flatten())
                .all(|value| value.is_finite());

            if !finite {
                return Err(WindError::InvalidStatistics {
                    msg: format!("altitude bin {} contains non-finite values", altitude),
                });
            }

            for idx in 0..4 {
                for jdx in (idx + 1)..4 {
                    let scale = num_traits::Float::max(
                        abs!(sigma[idx][jdx]),
                        abs!(sigma[jdx][idx]),
                    );

                    if abs!(sigma[idx][jdx] - sigma[jdx][idx]) > T!(1e-6) * scale {
                        return Err(WindError::InvalidStatistics {
                            msg: format!(
                                "covariance at altitude bin {} is not symmetric",
                                altitude
                            ),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl<T> ErrorStatistics<T>
where
    T: fXX + DeserializeOwned + Serialize,
{
    /// Load and validate an [`ErrorStatistics`] record from a JSON file.
    pub fn from_file<P>(path: P) -> Result<Self, WindError<T>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref()).map_err(|error| WindError::MissingInputFile {
            path: path.as_ref().to_path_buf(),
            error,
        })?;

        let statistics = serde_json::from_reader::<_, Self>(BufReader::new(file))?;

        statistics.validate()?;

        Ok(statistics)
    }

    /// Write the record to a JSON file.
    pub fn save<P>(&self, path: P) -> Result<(), WindError<T>>
    where
        P: AsRef<Path>,
    {
        save_json(self, path)
    }
}

/// Accumulates [`ErrorStatSample`]s over an altitude axis from pairs of forecast and observed
/// wind profiles.
#[derive(Clone, Debug)]
pub struct ErrorSampleCollector<T>
where
    T: fXX,
{
    alt_axis: Vec<T>,
    samples: Vec<Vec<ErrorStatSample<T>>>,
}

impl<T> ErrorSampleCollector<T>
where
    T: fXX,
{
    /// Create a new [`ErrorSampleCollector`] over the given altitude axis.
    pub fn new(alt_axis: Vec<T>) -> Self {
        let samples = vec![Vec::new(); alt_axis.len()];

        Self { alt_axis, samples }
    }

    /// Returns the default altitude axis, 200 m to 7100 m in steps of 150 m.
    pub fn default_axis() -> Vec<T> {
        (0..47)
            .map(|idx| T!(200.0) + T::from_usize(idx).unwrap() * T!(150.0))
            .collect()
    }

    /// Add one `(forecast, observed)` profile pair.
    ///
    /// An altitude bin only receives a sample if both profiles start at or below the bin.
    pub fn add_profiles(
        &mut self,
        forecast: &WindFunction<T, 3>,
        observed: &WindFunction<T, 3>,
    ) {
        let floor = num_traits::Float::max(forecast.range().0, observed.range().0);

        for (altitude, samples) in self.alt_axis.iter().zip(self.samples.iter_mut()) {
            if floor > *altitude {
                continue;
            }

            let forecast_wind = forecast.evaluate(*altitude).xy();
            let observed_wind = observed.evaluate(*altitude).xy();

            samples.push(ErrorStatSample {
                error: observed_wind - forecast_wind,
                forecast: forecast_wind,
            });
        }
    }

    /// Returns the samples collected for each altitude bin.
    pub fn samples(&self) -> &[Vec<ErrorStatSample<T>>] {
        &self.samples
    }

    /// Compute the per-bin statistics.
    ///
    /// Bins with fewer than two samples are dropped from the resulting altitude axis.
    pub fn finish(&self, provenance: Provenance) -> Result<ErrorStatistics<T>, WindError<T>> {
        let start = Instant::now();

        let bins = self
            .alt_axis
            .par_iter()
            .zip(self.samples.par_iter())
            .filter_map(|(altitude, samples)| {
                if samples.len() < 2 {
                    warn!(
                        "altitude bin {} skipped, {} sample(s) collected",
                        altitude,
                        samples.len()
                    );
                    return None;
                }

                Some(
                    AltitudeBinStatistics::from_samples(*altitude, samples).map_err(|error| {
                        WindError::DegenerateBin {
                            altitude: *altitude,
                            error,
                        }
                    }),
                )
            })
            .collect::<Result<Vec<AltitudeBinStatistics<T>>, WindError<T>>>()?;

        debug!(
            "{} altitude bins in {:.2} sec",
            bins.len(),
            start.elapsed().as_secs_f64()
        );

        let statistics = ErrorStatistics::new(provenance, &bins);

        statistics.validate()?;

        Ok(statistics)
    }
}

/// Settings of the [`WindStatisticsEngine`].
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct StatisticsSettings<T>
where
    T: fXX,
{
    /// Probability that the wind vector lies within the confidence ellipse.
    #[builder(default = T!(0.95))]
    pub alpha: T,

    /// Azimuths (in degrees) of the wind profile record.
    #[builder(default = (0..16).map(|idx| T::from_usize(idx).unwrap() * T!(22.5)).collect())]
    pub azimuths: Vec<T>,
}

/// The horizontal wind components of one profile.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WindComponents<T> {
    /// East component per altitude.
    pub wind_u: Vec<T>,

    /// North component per altitude.
    pub wind_v: Vec<T>,
}

/// Wind profiles for a set of azimuths, annotated with the provenance of the statistics.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WindProfileRecord<T>
where
    T: fXX,
{
    /// Altitude axis shared by all profiles.
    pub alt_axis: Vec<T>,

    /// Provenance of the underlying error statistics.
    #[serde(flatten)]
    pub provenance: Provenance,

    /// Profiles keyed by azimuth in degrees.
    pub wind: BTreeMap<String, WindComponents<T>>,
}

impl<T> WindProfileRecord<T>
where
    T: fXX + DeserializeOwned + Serialize,
{
    /// Load a [`WindProfileRecord`] from a JSON file.
    pub fn from_file<P>(path: P) -> Result<Self, WindError<T>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref()).map_err(|error| WindError::MissingInputFile {
            path: path.as_ref().to_path_buf(),
            error,
        })?;

        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Returns the profile of the given azimuth (in degrees) as a wind function.
    pub fn profile(&self, azimuth: T) -> Option<Result<WindFunction<T, 2>, WindError<T>>> {
        self.wind.get(&format!("{:?}", azimuth)).map(|components| {
            WindFunction::new(
                self.alt_axis.clone(),
                &components
                    .wind_u
                    .iter()
                    .zip(components.wind_v.iter())
                    .map(|(u, v)| [*u, *v])
                    .collect::<Vec<[T; 2]>>(),
            )
        })
    }

    /// Write the record to a JSON file.
    pub fn save<P>(&self, path: P) -> Result<(), WindError<T>>
    where
        P: AsRef<Path>,
    {
        save_json(self, path)
    }
}

/// Extracts the most probable wind along an azimuth from error statistics, for every altitude
/// bin independently.
#[derive(Clone, Debug)]
pub struct WindStatisticsEngine<T>
where
    T: fXX,
{
    bins: Vec<AltitudeBinStatistics<T>>,
    settings: StatisticsSettings<T>,
    statistics: ErrorStatistics<T>,
}

impl<T> WindStatisticsEngine<T>
where
    T: fXX,
{
    /// Create a new [`WindStatisticsEngine`] from a set of error statistics.
    pub fn new(
        statistics: ErrorStatistics<T>,
        settings: StatisticsSettings<T>,
    ) -> Result<Self, WindError<T>> {
        statistics.validate()?;

        Ok(Self {
            bins: statistics.bins(),
            settings,
            statistics,
        })
    }

    /// Returns the climatological wind blowing from `direction` (in degrees).
    ///
    /// The ellipse is centred on the mean observed wind, which also serves as the reference
    /// point of the azimuth.
    pub fn climatological_wind(&self, direction: T) -> Result<WindFunction<T, 2>, WindError<T>> {
        let azimuth = direction * T::pi() / T!(180.0);

        self.collect_bins(|bin| {
            let normal = bin.climatological();
            let ellipse = normal
                .ellipse(self.settings.alpha, &Vector2::zeros())
                .map_err(|error| WindError::DegenerateBin {
                    altitude: bin.altitude,
                    error,
                })?;

            ellipse.azimuth_wind(azimuth, normal.mean())
        })
    }

    /// Returns the wind profiles for all configured azimuths, given a forecast.
    pub fn edge_profiles<F>(&self, forecast: &F) -> Result<WindProfileRecord<T>, WindError<T>>
    where
        F: WindProfile<T> + Sync,
    {
        let wind = self
            .settings
            .azimuths
            .iter()
            .map(|direction| {
                let profile = self.statistical_wind(*direction, forecast)?;
                let values = profile.values();

                Ok((
                    format!("{:?}", direction),
                    WindComponents {
                        wind_u: values.row(0).iter().copied().collect(),
                        wind_v: values.row(1).iter().copied().collect(),
                    },
                ))
            })
            .collect::<Result<BTreeMap<String, WindComponents<T>>, WindError<T>>>()?;

        Ok(WindProfileRecord {
            alt_axis: self.statistics.alt_axis().to_vec(),
            provenance: self.statistics.provenance().clone(),
            wind,
        })
    }

    /// Returns a reference to the engine settings.
    pub fn settings(&self) -> &StatisticsSettings<T> {
        &self.settings
    }

    /// Returns the most probable wind blowing from `direction` (in degrees), given a forecast.
    ///
    /// For every altitude bin, the error distribution is conditioned on the forecast at the bin
    /// altitude and the resulting confidence ellipse is centred on `forecast + mean error`,
    /// which also serves as the reference point of the azimuth.
    pub fn statistical_wind<F>(
        &self,
        direction: T,
        forecast: &F,
    ) -> Result<WindFunction<T, 2>, WindError<T>>
    where
        F: WindProfile<T> + Sync,
    {
        let azimuth = direction * T::pi() / T!(180.0);

        self.collect_bins(|bin| {
            let forecast_wind = forecast.wind(bin.altitude).xy();

            let ellipse = bin
                .conditional(&forecast_wind)?
                .ellipse(self.settings.alpha, &forecast_wind)
                .map_err(|error| WindError::DegenerateBin {
                    altitude: bin.altitude,
                    error,
                })?;

            ellipse.azimuth_wind(azimuth, ellipse.center())
        })
    }

    /// Returns a reference to the underlying error statistics.
    pub fn statistics(&self) -> &ErrorStatistics<T> {
        &self.statistics
    }

    fn collect_bins<F>(&self, func: F) -> Result<WindFunction<T, 2>, WindError<T>>
    where
        F: Fn(&AltitudeBinStatistics<T>) -> Result<Vector2<T>, WindError<T>> + Sync,
    {
        let start = Instant::now();

        let vectors = self
            .bins
            .par_iter()
            .map(|bin| func(bin).map(|wind| [wind[0], wind[1]]))
            .collect::<Result<Vec<[T; 2]>, WindError<T>>>()?;

        debug!(
            "{} altitude bins in {:.2} sec",
            vectors.len(),
            start.elapsed().as_secs_f64()
        );

        WindFunction::new(self.statistics.alt_axis().to_vec(), &vectors)
    }
}

fn save_json<S, P, T>(value: &S, path: P) -> Result<(), WindError<T>>
where
    S: Serialize,
    P: AsRef<Path>,
{
    if let Some(parent) = path
        .as_ref()
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        fs::create_dir_all(parent).map_err(|error| WindError::OutputFile {
            path: parent.to_path_buf(),
            error,
        })?;
    }

    let file = File::create(path.as_ref()).map_err(|error| WindError::OutputFile {
        path: path.as_ref().to_path_buf(),
        error,
    })?;

    serde_json::to_writer_pretty(BufWriter::new(file), value)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wind::ConfidenceEllipse;
    use approx::assert_relative_eq;
    use chrono::Timelike;
    use rand::{RngExt, SeedableRng};
    use rand_distr::StandardNormal;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::env::temp_dir;

    fn statistics() -> ErrorStatistics<f64> {
        let bins = [500.0, 1000.0, 1500.0]
            .iter()
            .enumerate()
            .map(|(idx, altitude)| AltitudeBinStatistics {
                altitude: *altitude,
                mean: Vector4::new(0.1 * idx as f64, -0.2, 3.0, 4.0 + idx as f64),
                covariance: Matrix4::new(
                    1.0, 0.2, 0.3, 0.0, //
                    0.2, 2.0, 0.0, 0.4, //
                    0.3, 0.0, 4.0, 0.5, //
                    0.0, 0.4, 0.5, 3.0,
                ),
            })
            .collect::<Vec<AltitudeBinStatistics<f64>>>();

        let provenance = Provenance::new(vec![2020, 2021], vec![8], vec![1, 2, 3], "noshiro", 3, 6);

        ErrorStatistics::new(provenance, &bins)
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("2019"), Some(vec![2019]));
        assert_eq!(parse_range("8:10"), Some(vec![8, 9, 10]));
        assert_eq!(parse_range("1:10:4"), Some(vec![1, 5, 9]));
        assert_eq!(parse_range("1:10:0"), None);
        assert_eq!(parse_range("a:3"), None);
        assert_eq!(parse_range("1:2:3:4"), None);
    }

    #[test]
    fn test_provenance_dates() {
        let provenance =
            Provenance::new(vec![2020, 2021], vec![2], vec![28, 29, 30], "taiki", 21, 6);

        assert_eq!(provenance.target_hour, 3);

        let dates = provenance.dates();

        // 2020-02-29 exists, 2021-02-29 and both 02-30 do not
        assert_eq!(dates.len(), 3);
        assert_eq!(
            dates[1],
            NaiveDate::from_ymd_opt(2020, 2, 29)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap()
        );
        assert_eq!(
            provenance.forecast_init(&dates[0]),
            NaiveDate::from_ymd_opt(2020, 2, 27)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap()
        );
        assert_eq!(provenance.observation_time(&dates[0]), Some(dates[0]));

        let provenance =
            Provenance::new(vec![2021], vec![3], vec![1], "oshima", 0, 12).with_observation_hour(9);
        let target = provenance.dates()[0];

        assert_eq!(target.hour(), 12);
        assert_eq!(
            provenance.observation_time(&target),
            NaiveDate::from_ymd_opt(2021, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
        );
        assert_eq!(
            provenance.clone().with_observation_hour(25).observation_time(&target),
            None
        );

        let text = serde_json::to_string(&provenance).unwrap();

        assert!(text.contains("\"rawin_hour\":9"));
        assert_eq!(serde_json::from_str::<Provenance>(&text).unwrap(), provenance);
        assert!(
            !serde_json::to_string(&Provenance::default())
                .unwrap()
                .contains("rawin_hour")
        );
    }

    #[test]
    fn test_statistics_json_roundtrip() {
        let statistics = statistics();
        let text = serde_json::to_string(&statistics).unwrap();

        assert!(text.contains("\"MSM_init_hour\":3"));
        assert!(text.contains("\"alt_axis\":[500.0,1000.0,1500.0]"));

        let loaded = serde_json::from_str::<ErrorStatistics<f64>>(&text).unwrap();

        assert_eq!(loaded.alt_axis(), statistics.alt_axis());
        assert_eq!(loaded.provenance(), statistics.provenance());
        assert_eq!(loaded.mu4, statistics.mu4);
        assert_eq!(loaded.sigma4, statistics.sigma4);

        let path = temp_dir().join("ventus_test_error_statistics.json");

        statistics.save(&path).unwrap();

        let from_file = ErrorStatistics::<f64>::from_file(&path).unwrap();

        assert_eq!(from_file.sigma4, statistics.sigma4);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_statistics_validate() {
        let mut statistics = statistics();

        statistics.sigma4[1][0][2] = 0.9;

        assert!(matches!(
            statistics.validate(),
            Err(WindError::InvalidStatistics { .. })
        ));

        let text = r#"{"alt_axis": [200, 350], "years": [2020], "months": [8], "days": [1],
            "location": "noshiro", "target_hour": 9, "MSM_init_hour": 3, "MSM_forecast_hour": 6,
            "mu4": [[0, 0, 0, 0]], "sigma4": [[[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]]}"#;

        let truncated = serde_json::from_str::<ErrorStatistics<f64>>(text).unwrap();

        assert_eq!(truncated.alt_axis(), &[200.0, 350.0]);
        assert!(matches!(
            truncated.validate(),
            Err(WindError::InvalidStatistics { .. })
        ));
    }

    #[test]
    fn test_collector() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut collector = ErrorSampleCollector::new(vec![100.0, 400.0, 1000.0]);

        for _ in 0..500 {
            let fc = [
                3.0 + rng.sample::<f64, _>(StandardNormal),
                -1.0 + 2.0 * rng.sample::<f64, _>(StandardNormal),
            ];
            let err = [
                0.5 + 0.5 * rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
            ];

            let forecast = WindFunction::new(
                vec![200.0, 2000.0],
                &[[fc[0], fc[1], 0.0], [fc[0], fc[1], 0.0]],
            )
            .unwrap();
            let observed = WindFunction::new(
                vec![50.0, 2000.0],
                &[
                    [fc[0] + err[0], fc[1] + err[1], 0.0],
                    [fc[0] + err[0], fc[1] + err[1], 0.0],
                ],
            )
            .unwrap();

            collector.add_profiles(&forecast, &observed);
        }

        // the forecast profile starts above the lowest bin
        assert_eq!(collector.samples()[0].len(), 0);
        assert_eq!(collector.samples()[1].len(), 500);

        let statistics = collector
            .finish(Provenance::new(vec![2020], vec![8], vec![1], "noshiro", 3, 6))
            .unwrap();

        assert_eq!(statistics.alt_axis(), &[400.0, 1000.0]);

        let bin = &statistics.bins()[0];

        assert!((bin.mean[0] - 0.5).abs() < 0.1);
        assert!((bin.mean[2] - 3.0).abs() < 0.15);
        assert!((bin.mean[3] + 1.0).abs() < 0.25);
        assert!((bin.covariance[(0, 0)] - 0.25).abs() < 0.05);
        assert!((bin.covariance[(3, 3)] - 4.0).abs() < 0.6);
        assert_eq!(bin.covariance[(1, 3)], bin.covariance[(3, 1)]);

        assert_eq!(ErrorSampleCollector::<f64>::default_axis().len(), 47);
        assert_eq!(
            ErrorSampleCollector::<f64>::default_axis().last(),
            Some(&7100.0)
        );
    }

    #[test]
    fn test_statistical_wind() {
        let settings = StatisticsSettingsBuilder::default().build().unwrap();
        let engine = WindStatisticsEngine::new(statistics(), settings).unwrap();

        let forecast = WindFunction::new(
            vec![0.0, 2000.0],
            &[[1.0, 2.0, 0.0], [5.0, 6.0, 0.0]],
        )
        .unwrap();

        let profile = engine.statistical_wind(315.0, &forecast).unwrap();

        assert_eq!(profile.altitudes(), &[500.0, 1000.0, 1500.0]);

        for (idx, bin) in engine.statistics().bins().iter().enumerate() {
            let forecast_wind = forecast.wind(bin.altitude).xy();
            let normal = bin.conditional(&forecast_wind).unwrap();
            let ellipse = ConfidenceEllipse::new(
                normal.mean() + forecast_wind,
                normal.covariance(),
                0.95,
            )
            .unwrap();

            let expected = ellipse
                .azimuth_wind(315.0_f64.to_radians(), ellipse.center())
                .unwrap();
            let computed = profile.evaluate(bin.altitude);

            assert_relative_eq!(computed, expected, epsilon = 1e-9);

            // wind from the north-west has a positive east and a negative north offset
            let offset = computed - ellipse.center();

            assert!(offset[0] > 0.0 && offset[1] < 0.0, "bin {}", idx);
        }

        let climatological = engine.climatological_wind(90.0).unwrap();

        for bin in engine.statistics().bins() {
            let mean = bin.climatological().mean().clone_owned();

            assert!(climatological.evaluate(bin.altitude)[0] < mean[0]);
        }
    }

    #[test]
    fn test_edge_profiles() {
        let settings = StatisticsSettingsBuilder::default().build().unwrap();
        let engine = WindStatisticsEngine::new(statistics(), settings).unwrap();

        let forecast = WindFunction::new(vec![0.0, 2000.0], &[[1.0, 2.0], [5.0, 6.0]]).unwrap();

        let record = engine.edge_profiles(&forecast).unwrap();

        assert_eq!(record.wind.len(), 16);
        assert!(record.wind.contains_key("0.0"));
        assert!(record.wind.contains_key("22.5"));
        assert!(record.wind.contains_key("337.5"));
        assert_eq!(record.provenance.location, "noshiro");

        let path = temp_dir().join("ventus_test_wind_profiles.json");

        record.save(&path).unwrap();

        let loaded = WindProfileRecord::<f64>::from_file(&path).unwrap();

        assert_eq!(loaded.wind, record.wind);

        let east = loaded.profile(90.0).unwrap().unwrap();

        assert_relative_eq!(
            east.evaluate(1000.0),
            engine
                .statistical_wind(90.0, &forecast)
                .unwrap()
                .evaluate(1000.0),
            epsilon = 1e-12
        );
        assert!(loaded.profile(10.0).is_none());

        fs::remove_file(&path).unwrap();
    }
}
