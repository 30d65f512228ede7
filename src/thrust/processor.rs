use crate::{
    ThrustProfile, fXX,
    math::{LinearTable, Polynomial, T, abs, linspace, trapezoid},
    thrust::{EngineParameters, ThrustError, ThrustInputType},
};
use derive_builder::Builder;
use log::{debug, warn};
use rustfft::{FftNum, FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fs::File, path::Path};

/// Settings of a [`ThrustCurveProcessor`].
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
pub struct ThrustSettings<T>
where
    T: fXX,
{
    /// Low-pass filter cutoff frequency (in Hz).
    #[builder(default = T!(10.0))]
    pub cutoff_frequency: T,

    /// Samples below this fraction of the peak thrust are removed.
    #[builder(default = T!(0.01))]
    pub mask_ratio: T,

    /// Number of points at which a fitted polynomial is integrated.
    #[builder(default = 10000)]
    pub fit_resolution: usize,

    /// Impulse reconstruction error (in percent) above which a warning is logged.
    #[builder(default = T!(5.0))]
    pub impulse_error_warning: T,
}

/// A callable thrust function.
#[derive(Clone, Debug)]
pub enum ThrustFunction<T>
where
    T: fXX,
{
    /// Linear interpolation between the samples, extrapolated beyond them.
    Linear(LinearTable<T, 1>),
    /// Least-squares polynomial.
    Polynomial(Polynomial<T>),
}

impl<T> ThrustFunction<T>
where
    T: fXX,
{
    /// Evaluate the thrust at the given time.
    pub fn evaluate(&self, time: T) -> T {
        match self {
            ThrustFunction::Linear(table) => table.evaluate(time)[0],
            ThrustFunction::Polynomial(polynomial) => polynomial.evaluate(time),
        }
    }
}

impl<T> ThrustProfile<T> for ThrustFunction<T>
where
    T: fXX,
{
    fn thrust(&self, time: T) -> T {
        self.evaluate(time)
    }
}

/// A processed thrust curve and its performance summary.
#[derive(Clone, Debug)]
pub struct ThrustCurve<T>
where
    T: fXX,
{
    average_thrust: T,
    burn_time: T,
    function: ThrustFunction<T>,
    impulse_error: T,
    max_thrust: T,
    raw_impulse: T,
    thrusts: Vec<T>,
    times: Vec<T>,
    total_impulse: T,
}

impl<T> ThrustCurve<T>
where
    T: fXX,
{
    /// Returns the average thrust over the burn time.
    pub fn average_thrust(&self) -> T {
        self.average_thrust
    }

    /// Returns the burn time, i.e. the time of the last retained sample.
    pub fn burn_time(&self) -> T {
        self.burn_time
    }

    /// Returns a reference to the thrust function.
    pub fn function(&self) -> &ThrustFunction<T> {
        &self.function
    }

    /// Returns the relative difference (in percent) between the impulse of the fitted
    /// polynomial and the raw impulse, zero if no fit was performed.
    pub fn impulse_error(&self) -> T {
        self.impulse_error
    }

    /// Returns the peak thrust of the processed samples.
    pub fn max_thrust(&self) -> T {
        self.max_thrust
    }

    /// Returns the total impulse of the normalized samples before filtering and masking.
    pub fn raw_impulse(&self) -> T {
        self.raw_impulse
    }

    /// Returns the processed thrust samples.
    pub fn thrusts(&self) -> &[T] {
        &self.thrusts
    }

    /// Returns the processed sample times.
    pub fn times(&self) -> &[T] {
        &self.times
    }

    /// Returns the total impulse of the processed samples.
    pub fn total_impulse(&self) -> T {
        self.total_impulse
    }
}

impl<T> ThrustProfile<T> for ThrustCurve<T>
where
    T: fXX,
{
    fn thrust(&self, time: T) -> T {
        self.function.evaluate(time)
    }
}

/// Turns engine parameters and thrust samples into a [`ThrustCurve`].
#[derive(Clone, Debug)]
pub struct ThrustCurveProcessor<T>
where
    T: fXX,
{
    settings: ThrustSettings<T>,
}

impl<T> ThrustCurveProcessor<T>
where
    T: fXX + FftNum,
{
    /// Create a new [`ThrustCurveProcessor`].
    pub fn new(settings: ThrustSettings<T>) -> Self {
        Self { settings }
    }

    /// Low-pass filter uniformly sampled values with time step `dt`.
    ///
    /// All frequency components above the cutoff frequency are removed, the real part of the
    /// inverse transform is returned.
    pub fn low_pass(&self, values: &[T], dt: T) -> Vec<T> {
        let n = values.len();

        if n == 0 {
            return Vec::new();
        }

        let mut planner = FftPlanner::<T>::new();
        let mut buffer = values
            .iter()
            .map(|value| Complex::new(*value, T::zero()))
            .collect::<Vec<Complex<T>>>();

        planner.plan_fft_forward(n).process(&mut buffer);

        let span = T::from_usize(n).unwrap() * dt;

        buffer.iter_mut().enumerate().for_each(|(k, coefficient)| {
            let frequency = T::from_usize(k.min(n - k)).unwrap() / span;

            if frequency > self.settings.cutoff_frequency {
                *coefficient = Complex::new(T::zero(), T::zero());
            }
        });

        planner.plan_fft_inverse(n).process(&mut buffer);

        buffer
            .iter()
            .map(|coefficient| coefficient.re / T::from_usize(n).unwrap())
            .collect()
    }

    /// Remove all samples below the mask ratio of the peak thrust and shift the time axis so
    /// that the first retained sample is at zero.
    pub fn mask(&self, times: &[T], thrusts: &[T]) -> (Vec<T>, Vec<T>) {
        let peak = thrusts
            .iter()
            .fold(T::neg_infinity(), |acc, value| num_traits::Float::max(acc, *value));

        let threshold = self.settings.mask_ratio * peak;

        let (times, thrusts): (Vec<T>, Vec<T>) = times
            .iter()
            .zip(thrusts.iter())
            .filter(|(_, thrust)| **thrust >= threshold)
            .map(|(time, thrust)| (*time, *thrust))
            .unzip();

        match times.first() {
            Some(origin) => {
                let origin = *origin;

                (times.iter().map(|time| *time - origin).collect(), thrusts)
            }
            None => (times, thrusts),
        }
    }

    /// Process the engine parameters, reading the thrust file if the input type requires it.
    pub fn process(
        &self,
        parameters: &EngineParameters<T>,
    ) -> Result<ThrustCurve<T>, ThrustError<T>>
    where
        T: DeserializeOwned,
    {
        match parameters.input_type {
            ThrustInputType::Rectangle => self.process_samples(parameters, None, &[]),
            input_type => {
                let path =
                    parameters
                        .thrust_filename
                        .as_ref()
                        .ok_or(ThrustError::MissingParameter {
                            input_type,
                            name: "thrust_filename",
                        })?;

                let (times, thrusts) = read_thrust_csv(path)?;

                self.process_samples(parameters, times.as_deref(), &thrusts)
            }
        }
    }

    /// Process in-memory thrust samples.
    ///
    /// For `curve_const_t` inputs the time stamps are optional and default to multiples of
    /// `thrust_dt`, `time_curve` inputs require them, `rectangle` inputs ignore the samples.
    /// The low-pass filter always runs on the unscaled `thrust_dt`.
    pub fn process_samples(
        &self,
        parameters: &EngineParameters<T>,
        times: Option<&[T]>,
        thrusts: &[T],
    ) -> Result<ThrustCurve<T>, ThrustError<T>> {
        let input_type = parameters.input_type;
        let time_factor = parameters.time_mag_factor;
        let thrust_factor = parameters.thrust_mag_factor;

        let (raw_times, raw_thrusts, filter_dt) = match input_type {
            ThrustInputType::Rectangle => (
                vec![T::zero(), parameters.burn_time * time_factor],
                vec![parameters.thrust * thrust_factor; 2],
                None,
            ),
            ThrustInputType::CurveConstT => {
                let dt = parameters.thrust_dt.ok_or(ThrustError::MissingParameter {
                    input_type,
                    name: "thrust_dt",
                })?;

                let times = match times {
                    Some(times) => times.to_vec(),
                    None => (0..thrusts.len())
                        .map(|idx| T::from_usize(idx).unwrap() * dt)
                        .collect(),
                };

                let (times, thrusts) = normalize(&times, thrusts, time_factor, thrust_factor)?;

                (times, thrusts, Some(dt))
            }
            ThrustInputType::TimeCurve => {
                let times = times.ok_or(ThrustError::InvalidSamples {
                    msg: "time_curve input requires a time column",
                })?;

                let (times, thrusts) = normalize(times, thrusts, time_factor, thrust_factor)?;

                (times, thrusts, None)
            }
        };

        let raw_impulse = trapezoid(&raw_times, &raw_thrusts);

        let (times, thrusts) = match (input_type, filter_dt) {
            (ThrustInputType::Rectangle, _) => (raw_times, raw_thrusts),
            (_, Some(dt)) => {
                let filtered = self.low_pass(&raw_thrusts, dt);
                let (times, thrusts) = self.mask(&raw_times, &filtered);

                (
                    times,
                    thrusts
                        .into_iter()
                        .map(|thrust| num_traits::Float::max(thrust, T::zero()))
                        .collect(),
                )
            }
            (_, None) => self.mask(&raw_times, &raw_thrusts),
        };

        if times.len() < 2 {
            return Err(ThrustError::InvalidSamples {
                msg: "less than two samples remain after masking",
            });
        }

        let max_thrust = thrusts
            .iter()
            .fold(T::zero(), |acc, value| num_traits::Float::max(acc, *value));
        let total_impulse = trapezoid(&times, &thrusts);
        let burn_time = times[times.len() - 1];
        let average_thrust = total_impulse / burn_time;

        let (function, impulse_error) =
            if parameters.curve_fitting && (input_type != ThrustInputType::Rectangle) {
                self.fit(&times, &thrusts, parameters.fitting_order, raw_impulse)?
            } else {
                let rows = thrusts.iter().map(|thrust| [*thrust]).collect::<Vec<[T; 1]>>();

                (
                    ThrustFunction::Linear(LinearTable::from_rows(times.clone(), &rows)?),
                    T::zero(),
                )
            };

        debug!(
            "\"{}\" thrust curve: {} samples, impulse {:.2}, burn time {:.2}",
            input_type,
            times.len(),
            total_impulse,
            burn_time
        );

        Ok(ThrustCurve {
            average_thrust,
            burn_time,
            function,
            impulse_error,
            max_thrust,
            raw_impulse,
            thrusts,
            times,
            total_impulse,
        })
    }

    /// Fit a polynomial and compute its impulse reconstruction error (in percent).
    fn fit(
        &self,
        times: &[T],
        thrusts: &[T],
        degree: usize,
        raw_impulse: T,
    ) -> Result<(ThrustFunction<T>, T), ThrustError<T>> {
        let polynomial = Polynomial::fit(times, thrusts, degree)?;

        let grid = linspace(times[0], times[times.len() - 1], self.settings.fit_resolution);
        let fitted = grid
            .iter()
            .map(|time| num_traits::Float::max(polynomial.evaluate(*time), T::zero()))
            .collect::<Vec<T>>();

        let impulse_error =
            abs!(trapezoid(&grid, &fitted) - raw_impulse) / raw_impulse * T!(100.0);

        if impulse_error > self.settings.impulse_error_warning {
            warn!(
                "impulse reconstruction error of the fitted thrust curve is {:.2}%",
                impulse_error
            );
        }

        Ok((ThrustFunction::Polynomial(polynomial), impulse_error))
    }
}

/// Validate and apply the magnification factors to raw samples.
fn normalize<T>(
    times: &[T],
    thrusts: &[T],
    time_factor: T,
    thrust_factor: T,
) -> Result<(Vec<T>, Vec<T>), ThrustError<T>>
where
    T: fXX,
{
    if times.len() != thrusts.len() {
        return Err(ThrustError::InvalidSamples {
            msg: "time and thrust columns differ in length",
        });
    }

    if thrusts.len() < 2 {
        return Err(ThrustError::InvalidSamples {
            msg: "at least two thrust samples are required",
        });
    }

    if !thrusts.iter().any(|thrust| *thrust > T::zero()) {
        return Err(ThrustError::InvalidSamples {
            msg: "thrust curve has no positive thrust",
        });
    }

    Ok((
        times.iter().map(|time| *time * time_factor).collect(),
        thrusts.iter().map(|thrust| *thrust * thrust_factor).collect(),
    ))
}

/// Read a header-less thrust file with either a thrust column or time and thrust columns.
fn read_thrust_csv<T, P>(path: P) -> Result<(Option<Vec<T>>, Vec<T>), ThrustError<T>>
where
    T: fXX + DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).map_err(|error| ThrustError::MissingInputFile {
        path: path.as_ref().to_path_buf(),
        error,
    })?;

    let rows = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file)
        .deserialize::<Vec<T>>()
        .collect::<Result<Vec<Vec<T>>, csv::Error>>()?;

    match rows.first().map(|row| row.len()) {
        Some(1) => Ok((None, rows.into_iter().map(|row| row[0]).collect())),
        Some(2) => {
            let (times, thrusts) = rows.into_iter().map(|row| (row[0], row[1])).unzip();

            Ok((Some(times), thrusts))
        }
        _ => Err(ThrustError::InvalidSamples {
            msg: "thrust file must have one or two columns",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thrust::EngineParametersBuilder;
    use approx::assert_relative_eq;
    use rand::{RngExt, SeedableRng};
    use rand_distr::StandardNormal;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::{env::temp_dir, f64::consts::PI, fs};

    fn processor() -> ThrustCurveProcessor<f64> {
        ThrustCurveProcessor::new(ThrustSettingsBuilder::default().build().unwrap())
    }

    #[test]
    fn test_rectangle() {
        let parameters = EngineParametersBuilder::<f64>::default()
            .input_type(ThrustInputType::Rectangle)
            .build()
            .unwrap();

        let curve = processor().process(&parameters).unwrap();

        assert_relative_eq!(curve.total_impulse(), 7440.0, max_relative = 1e-12);
        assert_relative_eq!(curve.raw_impulse(), 7440.0, max_relative = 1e-12);
        assert_relative_eq!(curve.average_thrust(), 800.0, max_relative = 1e-12);
        assert_eq!(curve.burn_time(), 9.3);
        assert_eq!(curve.max_thrust(), 800.0);
        assert_eq!(curve.impulse_error(), 0.0);
        assert_relative_eq!(curve.thrust(4.65), 800.0, max_relative = 1e-12);
        assert!(matches!(curve.function(), ThrustFunction::Linear(_)));

        let scaled = EngineParametersBuilder::<f64>::default()
            .input_type(ThrustInputType::Rectangle)
            .thrust_mag_factor(1.5)
            .time_mag_factor(2.0)
            .build()
            .unwrap();

        let curve = processor().process(&scaled).unwrap();

        assert_relative_eq!(curve.total_impulse(), 3.0 * 7440.0, max_relative = 1e-12);
        assert_relative_eq!(curve.burn_time(), 18.6, max_relative = 1e-12);
    }

    #[test]
    fn test_filtered_impulse_conservation() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let dt = 0.01;

        for _ in 0..16 {
            let burn = (5.0 + 1.5 * rng.sample::<f64, _>(StandardNormal)).clamp(2.0, 8.0);
            let peak = 800.0 * (0.5 * rng.sample::<f64, _>(StandardNormal)).exp();
            let frequency = 1.1 + 0.9 * rng.sample::<f64, _>(StandardNormal).tanh();
            let padding = 100;

            let n = (burn / dt) as usize;
            let thrusts = (0..(n + 2 * padding))
                .map(|idx| {
                    if idx < padding || idx >= n + padding {
                        return 0.0;
                    }

                    let t = (idx - padding) as f64 * dt;

                    peak * (PI * t / burn).sin().powi(2)
                        * (1.0 + 0.2 * (2.0 * PI * frequency * t).sin())
                })
                .collect::<Vec<f64>>();

            let parameters = EngineParametersBuilder::<f64>::default()
                .thrust_dt(Some(dt))
                .curve_fitting(false)
                .build()
                .unwrap();

            let curve = processor()
                .process_samples(&parameters, None, &thrusts)
                .unwrap();

            let deviation =
                (curve.total_impulse() - curve.raw_impulse()).abs() / curve.raw_impulse();

            assert!(deviation < 0.01, "impulse deviation {}", deviation);
            assert_eq!(curve.times()[0], 0.0);
            assert!(curve.thrusts().iter().all(|thrust| *thrust >= 0.0));
            assert!(curve.burn_time() < burn + 0.1);
        }
    }

    #[test]
    fn test_fitted_impulse_error() {
        let dt = 0.01;
        let thrusts = (0..400)
            .map(|idx| if (50..350).contains(&idx) { 1000.0 } else { 0.0 })
            .collect::<Vec<f64>>();

        let parameters = EngineParametersBuilder::<f64>::default()
            .thrust_dt(Some(dt))
            .build()
            .unwrap();

        let curve = processor()
            .process_samples(&parameters, None, &thrusts)
            .unwrap();

        assert!(matches!(curve.function(), ThrustFunction::Polynomial(_)));
        assert_relative_eq!(curve.raw_impulse(), 3000.0, max_relative = 1e-12);

        let times = curve.times();
        let grid = linspace(times[0], times[times.len() - 1], 10000);
        let fitted = grid
            .iter()
            .map(|time| curve.thrust(*time).max(0.0))
            .collect::<Vec<f64>>();

        let expected = (trapezoid(&grid, &fitted) - curve.raw_impulse()).abs()
            / curve.raw_impulse()
            * 100.0;

        assert_relative_eq!(curve.impulse_error(), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_low_pass_time_factor() {
        let dt = 0.01;
        let thrusts = (0..400)
            .map(|idx| 500.0 + 100.0 * (2.0 * PI * 15.0 * idx as f64 * dt).sin())
            .collect::<Vec<f64>>();

        let parameters = EngineParametersBuilder::<f64>::default()
            .thrust_dt(Some(dt))
            .time_mag_factor(2.0)
            .curve_fitting(false)
            .build()
            .unwrap();

        let curve = processor()
            .process_samples(&parameters, None, &thrusts)
            .unwrap();

        assert_eq!(curve.thrusts().len(), 400);
        assert_relative_eq!(curve.burn_time(), 7.98, max_relative = 1e-12);

        for thrust in curve.thrusts() {
            assert_relative_eq!(*thrust, 500.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_low_pass() {
        let dt = 0.01;
        let (low, high) = (2.0, 25.0);

        let values = (0..400)
            .map(|idx| {
                let t = idx as f64 * dt;

                (2.0 * PI * low * t).sin() + 0.5 * (2.0 * PI * high * t).sin()
            })
            .collect::<Vec<f64>>();

        let filtered = processor().low_pass(&values, dt);

        assert_eq!(filtered.len(), values.len());

        for (idx, value) in filtered.iter().enumerate() {
            let t = idx as f64 * dt;

            assert_relative_eq!(*value, (2.0 * PI * low * t).sin(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_time_curve_masking() {
        let path = temp_dir().join("ventus_test_thrust_time_curve.csv");

        fs::write(
            &path,
            "1.0, 0.5\n2.0, 100.0\n3.0, 200.0\n4.0, 150.0\n5.0, 100.0\n6.0, 0.2\n",
        )
        .unwrap();

        let parameters = EngineParametersBuilder::<f64>::default()
            .input_type(ThrustInputType::TimeCurve)
            .thrust_filename(Some(path.clone()))
            .curve_fitting(false)
            .thrust_mag_factor(2.0)
            .build()
            .unwrap();

        let curve = processor().process(&parameters).unwrap();

        assert_eq!(curve.times(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(curve.thrusts(), &[200.0, 400.0, 300.0, 200.0]);
        assert_eq!(curve.burn_time(), 3.0);
        assert_eq!(curve.max_thrust(), 400.0);
        assert_relative_eq!(curve.total_impulse(), 900.0, epsilon = 1e-12);
        assert_relative_eq!(curve.average_thrust(), 300.0, epsilon = 1e-12);
        assert_relative_eq!(curve.thrust(0.5), 300.0, epsilon = 1e-12);

        fs::remove_file(&path).unwrap();

        assert!(matches!(
            processor().process(&parameters),
            Err(ThrustError::MissingInputFile { .. })
        ));
    }

    #[test]
    fn test_polynomial_fit() {
        let times = (0..=20).map(|idx| idx as f64 * 0.5).collect::<Vec<f64>>();
        let thrusts = times
            .iter()
            .map(|t| 100.0 + 40.0 * t - 4.0 * t * t)
            .collect::<Vec<f64>>();

        let parameters = EngineParametersBuilder::<f64>::default()
            .input_type(ThrustInputType::TimeCurve)
            .fitting_order(2)
            .build()
            .unwrap();

        let curve = processor()
            .process_samples(&parameters, Some(&times), &thrusts)
            .unwrap();

        assert!(matches!(curve.function(), ThrustFunction::Polynomial(_)));
        assert!(curve.impulse_error() < 0.2);

        for t in [0.25, 3.3, 7.1, 9.9] {
            assert_relative_eq!(
                curve.thrust(t),
                100.0 + 40.0 * t - 4.0 * t * t,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let missing_dt = EngineParametersBuilder::<f64>::default().build().unwrap();

        assert!(matches!(
            processor().process_samples(&missing_dt, None, &[1.0, 2.0, 3.0]),
            Err(ThrustError::MissingParameter {
                name: "thrust_dt",
                ..
            })
        ));

        assert!(matches!(
            processor().process(&missing_dt),
            Err(ThrustError::MissingParameter {
                name: "thrust_filename",
                ..
            })
        ));

        let time_curve = EngineParametersBuilder::<f64>::default()
            .input_type(ThrustInputType::TimeCurve)
            .build()
            .unwrap();

        assert!(matches!(
            processor().process_samples(&time_curve, None, &[1.0, 2.0]),
            Err(ThrustError::InvalidSamples { .. })
        ));

        assert!(matches!(
            processor().process_samples(&time_curve, Some(&[0.0, 1.0]), &[0.0, 0.0]),
            Err(ThrustError::InvalidSamples { .. })
        ));
    }
}
