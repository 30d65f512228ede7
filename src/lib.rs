#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod grid;
pub mod math;
pub mod thrust;
pub mod wind;

use grid::GridError;
use math::MathError;
use nalgebra::{RealField, Scalar, Vector3};
use num_traits::{AsPrimitive, Float, FromPrimitive, float::TotalOrder};
use std::{
    fmt::{Debug, Display},
    iter::Sum,
};
use thiserror::Error;
use thrust::ThrustError;
use wind::WindError;

/// Generic container type for errors.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum VentusError<T> {
    #[error("grid error")]
    Grid(#[from] GridError<T>),
    #[error("math error")]
    Math(#[from] MathError<T>),
    #[error("thrust error")]
    Thrust(#[from] ThrustError<T>),
    #[error("wind error")]
    Wind(#[from] WindError<T>),
}

/// An altitude indexed wind field, as consumed by a trajectory integrator.
pub trait WindProfile<T> {
    /// Returns the `(east, north, up)` wind vector at the given altitude.
    fn wind(&self, altitude: T) -> Vector3<T>;
}

/// A time indexed thrust function, as consumed by a trajectory integrator.
pub trait ThrustProfile<T> {
    /// Returns the thrust at the given time since ignition.
    fn thrust(&self, time: T) -> T;
}

/// A trait that describes a generic floating point numbers within the **ventus** crate. In
/// practical terms this trait is only used for the f32/f64 types.
#[allow(non_camel_case_types)]
pub trait fXX:
    'static
    + AsPrimitive<usize>
    + Copy
    + Debug
    + Default
    + Display
    + Float
    + FromPrimitive
    + RealField
    + Scalar
    + Send
    + Sum
    + for<'x> Sum<&'x Self>
    + Sync
    + TotalOrder
{
}

impl fXX for f32 {}
impl fXX for f64 {}
