//! Thrust curve processing.
//!
//! An engine is described by [`EngineParameters`], either as a constant thrust over a burn
//! time or as a sampled thrust curve read from a CSV file. The [`ThrustCurveProcessor`]
//! normalizes the samples, low-pass filters fixed time step curves, removes the low thrust
//! tails and either fits a polynomial or interpolates the samples linearly. The result is a
//! [`ThrustCurve`], a summary of the engine performance together with a callable
//! [`ThrustFunction`].

mod processor;

pub use processor::{
    ThrustCurve, ThrustCurveProcessor, ThrustFunction, ThrustSettings, ThrustSettingsBuilder,
};

use crate::{
    fXX,
    math::{MathError, T},
};
use derive_builder::Builder;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt::{Display, Formatter},
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// Errors associated with the [`thrust`](crate::thrust) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ThrustError<T> {
    #[error("invalid thrust table: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid thrust samples: {msg}")]
    InvalidSamples { msg: &'static str },
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
    #[error("thrust input type \"{input_type}\" requires \"{name}\"")]
    MissingParameter {
        input_type: ThrustInputType,
        name: &'static str,
    },
}

/// The kind of thrust input.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ThrustInputType {
    /// Constant thrust over the burn time.
    #[serde(rename = "rectangle")]
    Rectangle,

    /// Thrust samples at a fixed time step, low-pass filtered before use.
    #[default]
    #[serde(rename = "curve_const_t")]
    CurveConstT,

    /// Thrust samples with explicit time stamps.
    #[serde(rename = "time_curve")]
    TimeCurve,
}

impl ThrustInputType {
    /// Returns the configuration name of the input type.
    pub fn name(&self) -> &'static str {
        match self {
            ThrustInputType::Rectangle => "rectangle",
            ThrustInputType::CurveConstT => "curve_const_t",
            ThrustInputType::TimeCurve => "time_curve",
        }
    }
}

impl Display for ThrustInputType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThrustInputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ThrustInputType::Rectangle,
            ThrustInputType::CurveConstT,
            ThrustInputType::TimeCurve,
        ]
        .into_iter()
        .find(|input_type| input_type.name() == s.trim())
        .ok_or_else(|| s.to_string())
    }
}

/// Engine configuration of a rocket.
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineParameters<T>
where
    T: fXX,
{
    /// Kind of thrust input.
    #[builder(default)]
    #[serde(alias = "thrust_input_type")]
    pub input_type: ThrustInputType,

    /// Burn time of a rectangular thrust.
    #[builder(default = T!(9.3))]
    #[serde(alias = "t_MECO")]
    pub burn_time: T,

    /// Thrust of a rectangular thrust.
    #[builder(default = T!(800.0))]
    pub thrust: T,

    /// Sampling time step of a `curve_const_t` thrust file.
    #[builder(default)]
    pub thrust_dt: Option<T>,

    /// Thrust curve file.
    #[builder(default)]
    pub thrust_filename: Option<PathBuf>,

    /// Fit a polynomial to sampled thrust curves instead of interpolating linearly.
    #[builder(default = true)]
    pub curve_fitting: bool,

    /// Degree of the fitted polynomial.
    #[builder(default = 15)]
    pub fitting_order: usize,

    /// Thrust magnification factor.
    #[builder(default = T::one())]
    pub thrust_mag_factor: T,

    /// Time magnification factor.
    #[builder(default = T::one())]
    pub time_mag_factor: T,
}

impl<T> Default for EngineParameters<T>
where
    T: fXX,
{
    fn default() -> Self {
        Self {
            input_type: ThrustInputType::default(),
            burn_time: T!(9.3),
            thrust: T!(800.0),
            thrust_dt: None,
            thrust_filename: None,
            curve_fitting: true,
            fitting_order: 15,
            thrust_mag_factor: T::one(),
            time_mag_factor: T::one(),
        }
    }
}

impl<T> EngineParameters<T>
where
    T: fXX + DeserializeOwned,
{
    /// Load [`EngineParameters`] from a JSON5 file, missing fields take their defaults.
    pub fn from_file<P>(path: P) -> Result<Self, ThrustError<T>>
    where
        P: AsRef<Path>,
    {
        let text =
            fs::read_to_string(path.as_ref()).map_err(|error| ThrustError::MissingInputFile {
                path: path.as_ref().to_path_buf(),
                error,
            })?;

        Ok(serde_json5::from_str::<Self>(&text)?)
    }
}
