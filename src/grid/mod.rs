//! Meteorological grid sampling.
//!
//! A [`GridTable`] holds the rows of a gridded forecast, one row per pressure level, latitude
//! and longitude, with geopotential height, wind components and temperature. The
//! [`GridSampler`] restricts the table to a box around a point of interest and interpolates
//! every pressure level at that point with a tensor-product cubic spline, resulting in a
//! vertical [`PointProfile`].

mod sampler;

pub use sampler::{
    GridRecord, GridSampler, GridSamplerSettings, GridSamplerSettingsBuilder, GridTable,
    LevelSample, PointProfile,
};

use crate::math::MathError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors associated with the [`grid`](crate::grid) module.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum GridError<T> {
    #[error("invalid grid table: {0}")]
    Csv(#[from] csv::Error),
    #[error("pressure level \"{level}\" cannot be interpolated")]
    DegenerateLevel {
        level: String,
        #[source]
        error: MathError<T>,
    },
    #[error("no grid points within {half_width} deg of ({lat}, {lon})")]
    EmptySelection { lat: T, lon: T, half_width: T },
    #[error("pressure level \"{level}\" is not a complete lattice ({found} points, {expected} expected)")]
    IrregularLevel {
        level: String,
        found: usize,
        expected: usize,
    },
    #[error("failed to read input file {path}")]
    MissingInputFile {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("failed to write output file {path}")]
    OutputFile {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
}
