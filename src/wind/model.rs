use crate::{
    WindProfile, fXX,
    math::{T, cos, ln, powf, sin},
    wind::{WindError, WindFunction, WindStatisticsEngine},
};
use derive_builder::Builder;
use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt::{Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
};

/// The kind of wind model, selected once at configuration time.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum WindModelKind {
    /// Power law profile.
    #[default]
    #[serde(rename = "power")]
    Power,

    /// Power law profile with fixed low altitude gusts.
    #[serde(rename = "power_Gust")]
    PowerGust,

    /// Logarithmic law profile.
    #[serde(rename = "log")]
    Log,

    /// Forecast wind table.
    #[serde(rename = "forecast")]
    Forecast,

    /// Climatological wind from error statistics.
    #[serde(rename = "statistics")]
    Statistics,

    /// Forecast conditioned wind from error statistics.
    #[serde(rename = "error-statistics")]
    ErrorStatistics,

    /// Power law below, error statistics above the transition band.
    #[serde(rename = "power-es-hybrid")]
    PowerErrorStatisticsHybrid,

    /// Power law below, forecast above the transition band.
    #[serde(rename = "power-forecast-hybrid")]
    PowerForecastHybrid,

    /// Logarithmic law below, forecast above the transition band.
    #[serde(rename = "log-forecast-hybrid")]
    LogForecastHybrid,

    /// Power law below, climatological statistics above the transition band.
    #[serde(rename = "power-statistics-hybrid")]
    PowerStatisticsHybrid,
}

impl WindModelKind {
    /// All wind model kinds.
    pub const ALL: [WindModelKind; 10] = [
        WindModelKind::Power,
        WindModelKind::PowerGust,
        WindModelKind::Log,
        WindModelKind::Forecast,
        WindModelKind::Statistics,
        WindModelKind::ErrorStatistics,
        WindModelKind::PowerErrorStatisticsHybrid,
        WindModelKind::PowerForecastHybrid,
        WindModelKind::LogForecastHybrid,
        WindModelKind::PowerStatisticsHybrid,
    ];

    /// Returns the configuration name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            WindModelKind::Power => "power",
            WindModelKind::PowerGust => "power_Gust",
            WindModelKind::Log => "log",
            WindModelKind::Forecast => "forecast",
            WindModelKind::Statistics => "statistics",
            WindModelKind::ErrorStatistics => "error-statistics",
            WindModelKind::PowerErrorStatisticsHybrid => "power-es-hybrid",
            WindModelKind::PowerForecastHybrid => "power-forecast-hybrid",
            WindModelKind::LogForecastHybrid => "log-forecast-hybrid",
            WindModelKind::PowerStatisticsHybrid => "power-statistics-hybrid",
        }
    }
}

impl Display for WindModelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WindModelKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| s.to_string())
    }
}

/// An altitude band `boundary ± transition` over which two wind models are blended.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct HybridBand<T> {
    /// Center of the band.
    pub boundary: T,

    /// Half width of the band.
    pub transition: T,
}

impl<T> HybridBand<T>
where
    T: fXX,
{
    /// Create a new [`HybridBand`].
    pub fn new(boundary: T, transition: T) -> Self {
        Self {
            boundary,
            transition,
        }
    }

    /// Blend the `lower` and `upper` models at the given altitude.
    ///
    /// At or below `boundary - transition` only `lower` is evaluated, above
    /// `boundary + transition` only `upper`, in between both are linearly weighted.
    pub fn blend<L, U>(&self, altitude: T, lower: L, upper: U) -> Vector3<T>
    where
        L: Fn(T) -> Vector3<T>,
        U: Fn(T) -> Vector3<T>,
    {
        let floor = self.boundary - self.transition;

        if altitude <= floor {
            lower(altitude)
        } else if altitude <= self.boundary + self.transition {
            let weight = (altitude - floor) / (T!(2.0) * self.transition);

            upper(altitude) * weight + lower(altitude) * (T::one() - weight)
        } else {
            upper(altitude)
        }
    }
}

/// The transition bands of the hybrid wind models.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct HybridBands<T> {
    /// Power law / error statistics (hard switch).
    pub power_es: HybridBand<T>,

    /// Power law / forecast.
    pub power_forecast: HybridBand<T>,

    /// Logarithmic law / forecast.
    pub log_forecast: HybridBand<T>,

    /// Power law / statistics.
    pub power_statistics: HybridBand<T>,
}

impl<T> Default for HybridBands<T>
where
    T: fXX,
{
    fn default() -> Self {
        Self {
            power_es: HybridBand::new(T!(300.0), T::zero()),
            power_forecast: HybridBand::new(T!(300.0), T!(100.0)),
            log_forecast: HybridBand::new(T!(300.0), T!(50.0)),
            power_statistics: HybridBand::new(T!(400.0), T!(100.0)),
        }
    }
}

/// Wind configuration of a rocket launch.
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
#[builder(default)]
#[serde(default)]
pub struct RocketWindParameters<T>
where
    T: fXX,
{
    /// Direction the wind blows from (in degrees, clockwise from north).
    pub direction: T,

    /// Direction used by the power law of the `power-es-hybrid` model, if different from
    /// `direction`.
    pub original_direction: Option<T>,

    /// Wind speed at the reference altitude.
    pub speed: T,

    /// Power law coefficient, the profile exponent is its inverse.
    pub power_coeff: T,

    /// Reference altitude of the wind speed.
    pub reference_altitude: T,

    /// Surface roughness length of the logarithmic law.
    pub roughness: T,

    /// Magnetic declination (in degrees) applied to forecast tables.
    pub magnetic_declination: T,

    /// Wind model kind.
    pub model: WindModelKind,

    /// Hybrid transition bands.
    pub bands: HybridBands<T>,
}

impl<T> Default for RocketWindParameters<T>
where
    T: fXX,
{
    fn default() -> Self {
        Self {
            direction: T!(315.0),
            original_direction: None,
            speed: T!(2.0),
            power_coeff: T!(14.0),
            reference_altitude: T!(5.0),
            roughness: T!(0.0003),
            magnetic_declination: T!(8.9),
            model: WindModelKind::Power,
            bands: HybridBands::default(),
        }
    }
}

impl<T> RocketWindParameters<T>
where
    T: fXX + DeserializeOwned,
{
    /// Load [`RocketWindParameters`] from a JSON5 file, missing fields take their defaults.
    pub fn from_file<P>(path: P) -> Result<Self, WindError<T>>
    where
        P: AsRef<Path>,
    {
        let text =
            fs::read_to_string(path.as_ref()).map_err(|error| WindError::MissingInputFile {
                path: path.as_ref().to_path_buf(),
                error,
            })?;

        Ok(serde_json5::from_str::<Self>(&text)?)
    }
}

/// Returns the unit vector of a wind blowing from `direction` (in degrees).
fn unit_vector<T>(direction: T) -> Vector3<T>
where
    T: fXX,
{
    let angle = direction * T::pi() / T!(180.0);

    Vector3::new(-sin!(angle), -cos!(angle), T::zero())
}

/// A power law wind profile `speed · (h / h_ref)^exponent`.
#[derive(Clone, Debug)]
pub struct PowerLaw<T>
where
    T: fXX,
{
    exponent: T,
    gust: bool,
    reference_altitude: T,
    speed: T,
    unit: Vector3<T>,
}

impl<T> PowerLaw<T>
where
    T: fXX,
{
    /// Create a new [`PowerLaw`] for a wind blowing from `direction` (in degrees).
    pub fn new(direction: T, speed: T, reference_altitude: T, power_coeff: T) -> Self {
        Self {
            exponent: T::one() / power_coeff,
            gust: false,
            reference_altitude,
            speed,
            unit: unit_vector(direction),
        }
    }

    /// Add fixed gust offsets above 10 m.
    pub fn with_gust(mut self) -> Self {
        self.gust = true;

        self
    }

    /// Evaluate the wind vector, negative altitudes are clamped to zero.
    pub fn evaluate(&self, altitude: T) -> Vector3<T> {
        let altitude = if altitude < T::zero() {
            T::zero()
        } else {
            altitude
        };

        let base = self.unit * self.speed * powf!(altitude / self.reference_altitude, self.exponent);

        if !self.gust || altitude < T!(10.0) {
            base
        } else if altitude < T!(20.0) {
            base + Vector3::new(T!(5.0), T!(3.0), T::zero())
        } else if altitude < T!(25.0) {
            base + Vector3::new(T!(5.0), T!(-3.0), T::zero())
        } else {
            base + Vector3::new(T!(-7.0), T!(-10.0), T::zero())
        }
    }
}

/// A logarithmic law wind profile `speed · ln(h / z0) / ln(h_ref / z0)`.
#[derive(Clone, Debug)]
pub struct LogLaw<T>
where
    T: fXX,
{
    reference_altitude: T,
    roughness: T,
    speed: T,
    unit: Vector3<T>,
}

impl<T> LogLaw<T>
where
    T: fXX,
{
    /// The lowest altitude at which the profile is evaluated.
    pub const FLOOR: f64 = 0.1;

    /// Create a new [`LogLaw`] for a wind blowing from `direction` (in degrees).
    pub fn new(direction: T, speed: T, reference_altitude: T, roughness: T) -> Self {
        Self {
            reference_altitude,
            roughness,
            speed,
            unit: unit_vector(direction),
        }
    }

    /// Evaluate the wind vector, altitudes below 0.1 m are clamped.
    pub fn evaluate(&self, altitude: T) -> Vector3<T> {
        let altitude = num_traits::Float::max(altitude, T!(Self::FLOOR));

        self.unit * self.speed * ln!(altitude / self.roughness)
            / ln!(self.reference_altitude / self.roughness)
    }
}

/// Precomputed table based wind sources.
#[derive(Clone, Debug, Default)]
pub struct WindSources<T>
where
    T: fXX,
{
    /// Forecast wind table.
    pub forecast: Option<WindFunction<T, 3>>,

    /// Error statistics used by the `error-statistics` kinds.
    pub error_statistics: Option<WindStatisticsEngine<T>>,

    /// Error statistics used by the `statistics` kinds.
    pub statistics: Option<WindStatisticsEngine<T>>,
}

/// A wind model covering the whole flight envelope.
#[derive(Clone, Debug)]
pub enum WindModel<T>
where
    T: fXX,
{
    /// Blend of two models over an altitude band, altitudes are floored before evaluation.
    Hybrid {
        /// Transition band.
        band: HybridBand<T>,
        /// Lowest evaluated altitude.
        floor: T,
        /// Model below the band.
        lower: Box<WindModel<T>>,
        /// Model above the band.
        upper: Box<WindModel<T>>,
    },
    /// Logarithmic law.
    Log(LogLaw<T>),
    /// Power law (optionally with gusts).
    Power(PowerLaw<T>),
    /// Interpolated wind table.
    Table(WindFunction<T, 3>),
}

impl<T> WindModel<T>
where
    T: fXX,
{
    /// Build the wind model selected by `parameters.model`.
    ///
    /// Table based kinds require the matching entry in `sources`.
    pub fn new(
        parameters: &RocketWindParameters<T>,
        sources: &WindSources<T>,
    ) -> Result<Self, WindError<T>> {
        let kind = parameters.model;

        info!("building \"{}\" wind model", kind);

        let power = |direction: T| {
            PowerLaw::new(
                direction,
                parameters.speed,
                parameters.reference_altitude,
                parameters.power_coeff,
            )
        };

        let log = || {
            WindModel::Log(LogLaw::new(
                parameters.direction,
                parameters.speed,
                parameters.reference_altitude,
                parameters.roughness,
            ))
        };

        let forecast = || -> Result<WindModel<T>, WindError<T>> {
            sources
                .forecast
                .clone()
                .map(WindModel::Table)
                .ok_or(WindError::MissingSource {
                    kind,
                    source_name: "forecast wind table",
                })
        };

        let statistics = || -> Result<WindModel<T>, WindError<T>> {
            let engine = sources.statistics.as_ref().ok_or(WindError::MissingSource {
                kind,
                source_name: "statistics record",
            })?;

            Ok(WindModel::Table(
                engine.climatological_wind(parameters.direction)?.into(),
            ))
        };

        let error_statistics = || -> Result<WindModel<T>, WindError<T>> {
            let engine = sources
                .error_statistics
                .as_ref()
                .ok_or(WindError::MissingSource {
                    kind,
                    source_name: "error statistics record",
                })?;

            let table = sources.forecast.as_ref().ok_or(WindError::MissingSource {
                kind,
                source_name: "forecast wind table",
            })?;

            Ok(WindModel::Table(
                engine
                    .statistical_wind(parameters.direction, table)?
                    .into(),
            ))
        };

        let hybrid = |band: HybridBand<T>, floor: T, lower: WindModel<T>, upper: WindModel<T>| {
            WindModel::Hybrid {
                band,
                floor,
                lower: Box::new(lower),
                upper: Box::new(upper),
            }
        };

        Ok(match kind {
            WindModelKind::Power => WindModel::Power(power(parameters.direction)),
            WindModelKind::PowerGust => WindModel::Power(power(parameters.direction).with_gust()),
            WindModelKind::Log => log(),
            WindModelKind::Forecast => forecast()?,
            WindModelKind::Statistics => statistics()?,
            WindModelKind::ErrorStatistics => error_statistics()?,
            WindModelKind::PowerErrorStatisticsHybrid => hybrid(
                parameters.bands.power_es,
                T::zero(),
                WindModel::Power(power(
                    parameters
                        .original_direction
                        .unwrap_or(parameters.direction),
                )),
                error_statistics()?,
            ),
            WindModelKind::PowerForecastHybrid => hybrid(
                parameters.bands.power_forecast,
                T::zero(),
                WindModel::Power(power(parameters.direction)),
                forecast()?,
            ),
            WindModelKind::LogForecastHybrid => hybrid(
                parameters.bands.log_forecast,
                T!(LogLaw::<T>::FLOOR),
                log(),
                forecast()?,
            ),
            WindModelKind::PowerStatisticsHybrid => hybrid(
                parameters.bands.power_statistics,
                T::zero(),
                WindModel::Power(power(parameters.direction)),
                statistics()?,
            ),
        })
    }

    /// Evaluate the wind vector at the given altitude.
    pub fn evaluate(&self, altitude: T) -> Vector3<T> {
        match self {
            WindModel::Hybrid {
                band,
                floor,
                lower,
                upper,
            } => band.blend(
                num_traits::Float::max(altitude, *floor),
                |h| lower.evaluate(h),
                |h| upper.evaluate(h),
            ),
            WindModel::Log(law) => law.evaluate(altitude),
            WindModel::Power(law) => law.evaluate(altitude),
            WindModel::Table(table) => table.evaluate(altitude),
        }
    }
}

impl<T> WindProfile<T> for WindModel<T>
where
    T: fXX,
{
    fn wind(&self, altitude: T) -> Vector3<T> {
        self.evaluate(altitude)
    }
}
