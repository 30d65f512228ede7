//! Wind field models.
//!
//! # Wind functions
//!
//! Every wind source is reduced to a [`WindFunction`], a vectorized piecewise linear table over
//! altitude. Forecast tables are read from CSV files ([`WindFunction::from_csv`],
//! [`WindFunction::from_forecast_csv`]), the latter applying a magnetic declination correction.
//!
//! # Statistical winds
//!
//! Historical forecast errors are summarized per altitude bin as a 4-variate normal
//! distribution over `(error_u, error_v, forecast_u, forecast_v)` ([`ErrorStatistics`]).
//! Conditioning on a forecast realization yields a bivariate normal ([`ConditionalNormal`]),
//! whose [`ConfidenceEllipse`] is intersected with a compass azimuth to obtain the most
//! probable wind vector blowing from that direction. The [`WindStatisticsEngine`] repeats this
//! for every altitude bin.
//!
//! # Wind models
//!
//! A [`WindModel`] is selected once from a [`WindModelKind`] and combines analytic profiles
//! (power law, logarithmic law) with table based winds. Hybrid kinds blend two models within
//! an altitude band ([`HybridBand`]).

mod ellipse;
mod function;
mod model;
mod statistics;

pub use ellipse::{ConditionalNormal, ConfidenceEllipse, azimuth_wind_on_ellipse};
pub use function::WindFunction;
pub use model::{
    HybridBand, HybridBands, LogLaw, PowerLaw, RocketWindParameters, RocketWindParametersBuilder,
    WindModel, WindModelKind, WindSources,
};
pub use statistics::{
    AltitudeBinStatistics, ErrorSampleCollector, ErrorStatSample, ErrorStatistics, Provenance,
    StatisticsSettings, StatisticsSettingsBuilder, WindComponents, WindProfileRecord,
    WindStatisticsEngine, parse_range,
};

use crate::math::MathError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors associated with the [`wind`](crate::wind) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum WindError<T> {
    #[error("invalid table: {0}")]
    Csv(#[from] csv::Error),
    #[error("degenerate statistics at altitude bin {altitude}")]
    DegenerateBin {
        altitude: T,
        #[source]
        error: MathError<T>,
    },
    #[error("statistics record is inconsistent: {msg}")]
    InvalidStatistics { msg: String },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid json5: {0}")]
    Json5(#[from] serde_json5::Error),
    #[error("math error")]
    Math(#[from] MathError<T>),
    #[error("failed to read input file {path}")]
    MissingInputFile {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("wind model \"{kind}\" requires a {source_name}")]
    MissingSource {
        kind: WindModelKind,
        source_name: &'static str,
    },
    #[error("azimuth {azimuth} rad does not intersect the confidence ellipse")]
    NoIntersection { azimuth: T },
    #[error("failed to write output file {path}")]
    OutputFile {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
}
