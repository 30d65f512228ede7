use crate::{
    fXX,
    math::{CovMatrix, MathError, T, abs, acos, atan2, cos, ln, round, sin, sqrt},
    wind::WindError,
};
use log::error;
use nalgebra::{DMatrix, Matrix2, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

/// A bivariate normal distribution over horizontal wind (error) vectors.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConditionalNormal<T>
where
    T: fXX,
{
    /// Mean vector.
    mean: Vector2<T>,

    /// Covariance matrix.
    covariance: Matrix2<T>,
}

impl<T> ConditionalNormal<T>
where
    T: fXX,
{
    /// Create a new [`ConditionalNormal`] from a mean vector and a covariance matrix.
    pub fn new(mean: Vector2<T>, covariance: Matrix2<T>) -> Self {
        Self { mean, covariance }
    }

    /// Condition the joint `(error_u, error_v, forecast_u, forecast_v)` normal distribution on
    /// a forecast realization, returning the distribution of the forecast error.
    ///
    /// The forecast-forecast covariance block must be invertible.
    pub fn from_joint(
        mean: &Vector4<T>,
        covariance: &Matrix4<T>,
        forecast: &Vector2<T>,
    ) -> Result<Self, MathError<T>> {
        let mu_error = mean.fixed_rows::<2>(0);
        let mu_forecast = mean.fixed_rows::<2>(2);

        let sigma_ee = covariance.fixed_view::<2, 2>(0, 0);
        let sigma_ef = covariance.fixed_view::<2, 2>(0, 2);
        let sigma_fe = covariance.fixed_view::<2, 2>(2, 0);

        let sigma_ff = DMatrix::from_iterator(
            2,
            2,
            covariance.fixed_view::<2, 2>(2, 2).iter().copied(),
        );

        let sigma_ff_inv = Matrix2::from_iterator(
            CovMatrix::from_matrix(&sigma_ff.as_view())?
                .ref_inverse_matrix()
                .iter()
                .copied(),
        );

        let gain = sigma_ef * sigma_ff_inv;

        Ok(Self {
            mean: mu_error + gain * (forecast - mu_forecast),
            covariance: sigma_ee - gain * sigma_fe,
        })
    }

    /// Combine the joint `(error_u, error_v, forecast_u, forecast_v)` normal distribution
    /// into the climatological distribution of the observed wind (`forecast + error`).
    pub fn climatological(mean: &Vector4<T>, covariance: &Matrix4<T>) -> Self {
        let sigma_ee = covariance.fixed_view::<2, 2>(0, 0);
        let sigma_ef = covariance.fixed_view::<2, 2>(0, 2);
        let sigma_fe = covariance.fixed_view::<2, 2>(2, 0);
        let sigma_ff = covariance.fixed_view::<2, 2>(2, 2);

        Self {
            mean: mean.fixed_rows::<2>(0) + mean.fixed_rows::<2>(2),
            covariance: sigma_ee + sigma_ff + sigma_ef + sigma_fe,
        }
    }

    /// Returns a reference to the covariance matrix.
    pub fn covariance(&self) -> &Matrix2<T> {
        &self.covariance
    }

    /// Returns a reference to the mean vector.
    pub fn mean(&self) -> &Vector2<T> {
        &self.mean
    }

    /// Returns the confidence ellipse of probability `alpha`, centred on the mean shifted by
    /// `offset`.
    pub fn ellipse(
        &self,
        alpha: T,
        offset: &Vector2<T>,
    ) -> Result<ConfidenceEllipse<T>, MathError<T>> {
        ConfidenceEllipse::new(self.mean + offset, &self.covariance, alpha)
    }
}

/// The confidence ellipse of a bivariate normal distribution.
///
/// The ellipse boundary is parameterized by `t ∈ [0, 2π)` as
/// `rotation · (scale₀ cos t, scale₁ sin t) + center`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConfidenceEllipse<T>
where
    T: fXX,
{
    /// Ellipse center.
    center: Vector2<T>,

    /// Principal axis rotation matrix (eigenvectors as columns).
    rotation: Matrix2<T>,

    /// Semi-axis lengths along the principal axes.
    scale: Vector2<T>,
}

impl<T> ConfidenceEllipse<T>
where
    T: fXX,
{
    /// Create the [`ConfidenceEllipse`] that contains a bivariate normal random vector with
    /// mean `center` and the given covariance with probability `alpha`.
    pub fn new(
        center: Vector2<T>,
        covariance: &Matrix2<T>,
        alpha: T,
    ) -> Result<Self, MathError<T>> {
        if !(alpha > T::zero() && alpha < T::one()) {
            return Err(MathError::InvalidArgument {
                msg: "confidence level must lie within (0, 1)",
            });
        }

        let inverse = match covariance.try_inverse() {
            Some(result) if result.iter().all(|value| value.is_finite()) => result,
            _ => {
                error!(
                    "ConfidenceEllipse::new covariance matrix is singular: {}",
                    covariance
                );
                return Err(MathError::DegenerateCovariance {
                    msg: "covariance matrix is singular",
                    matrix: DMatrix::from_iterator(2, 2, covariance.iter().copied()),
                });
            }
        };

        let eigen = inverse.symmetric_eigen();

        if !eigen
            .eigenvalues
            .iter()
            .all(|value| value.is_finite() && *value > T::zero())
        {
            error!(
                "ConfidenceEllipse::new covariance matrix is not positive definite: {}",
                covariance
            );
            return Err(MathError::DegenerateCovariance {
                msg: "covariance matrix is not positive definite",
                matrix: DMatrix::from_iterator(2, 2, covariance.iter().copied()),
            });
        }

        let chi2 = T!(-2.0) * ln!(T::one() - alpha);

        Ok(Self {
            center,
            rotation: eigen.eigenvectors,
            scale: eigen.eigenvalues.map(|lambda| sqrt!(chi2 / lambda)),
        })
    }

    /// Returns the wind vector on the ellipse boundary that lies along the given azimuth (in
    /// radians) as seen from `reference`, see [`azimuth_wind_on_ellipse`].
    pub fn azimuth_wind(
        &self,
        azimuth: T,
        reference: &Vector2<T>,
    ) -> Result<Vector2<T>, WindError<T>> {
        azimuth_wind_on_ellipse(&self.center, &self.scale, &self.rotation, azimuth, reference)
    }

    /// Returns a reference to the ellipse center.
    pub fn center(&self) -> &Vector2<T> {
        &self.center
    }

    /// Returns the point on the ellipse boundary at the parameter `t`.
    pub fn point(&self, t: T) -> Vector2<T> {
        ellipse_point(&self.center, &self.scale, &self.rotation, t)
    }

    /// Returns a reference to the rotation matrix.
    pub fn rotation(&self) -> &Matrix2<T> {
        &self.rotation
    }

    /// Returns a reference to the semi-axis lengths.
    pub fn scale(&self) -> &Vector2<T> {
        &self.scale
    }
}

fn ellipse_point<T>(
    center: &Vector2<T>,
    scale: &Vector2<T>,
    rotation: &Matrix2<T>,
    t: T,
) -> Vector2<T>
where
    T: fXX,
{
    rotation * Vector2::new(scale[0] * cos!(t), scale[1] * sin!(t)) + center
}

/// Find the wind vector on an ellipse boundary that blows from the given azimuth (in radians,
/// clockwise from north) as seen from `reference`.
///
/// The bearing of a point `w` is `atan2(-(w - reference)_u, -(w - reference)_v)`. Substituting
/// the bearing line into the ellipse parameterization gives `A cos t + B sin t + C = 0`, which is
/// solved in closed form. If one or more roots match the requested bearing, the matching root
/// with the largest wind magnitude is returned, otherwise the root with the smallest magnitude.
/// Roots are ordered by `t ∈ [0, 2π)`, magnitude ties keep the first root.
pub fn azimuth_wind_on_ellipse<T>(
    center: &Vector2<T>,
    scale: &Vector2<T>,
    rotation: &Matrix2<T>,
    azimuth: T,
    reference: &Vector2<T>,
) -> Result<Vector2<T>, WindError<T>>
where
    T: fXX,
{
    let offset = center - reference;

    // north/south bearings reduce the line to u = u_ref
    let (coeff_a, coeff_b, coeff_c) =
        if abs!(sin!(azimuth)) <= sqrt!(<T as num_traits::Float>::epsilon()) {
            (
                scale[0] * rotation[(0, 0)],
                scale[1] * rotation[(0, 1)],
                offset[0],
            )
        } else {
            let cot = cos!(azimuth) / sin!(azimuth);

            (
                scale[0] * (rotation[(1, 0)] - cot * rotation[(0, 0)]),
                scale[1] * (rotation[(1, 1)] - cot * rotation[(0, 1)]),
                offset[1] - cot * offset[0],
            )
        };

    let radius = sqrt!(coeff_a * coeff_a + coeff_b * coeff_b);

    if !(radius > T::zero()) || abs!(coeff_c) > radius {
        return Err(WindError::NoIntersection { azimuth });
    }

    let phase = atan2!(coeff_b, coeff_a);
    let delta = acos!(num_traits::Float::max(
        num_traits::Float::min(-coeff_c / radius, T::one()),
        -T::one()
    ));

    let mut roots = vec![wrap_two_pi(phase - delta), wrap_two_pi(phase + delta)];

    roots.sort_by(|lhs, rhs| lhs.total_cmp(rhs));
    roots.dedup();

    let candidates = roots
        .into_iter()
        .map(|t| {
            let wind = ellipse_point(center, scale, rotation, t);
            let relative = wind - reference;

            let bearing = atan2!(-relative[0], -relative[1]);

            (wind, bearing_matches(bearing, azimuth))
        })
        .collect::<Vec<(Vector2<T>, bool)>>();

    let selection = if candidates.iter().any(|(_, matched)| *matched) {
        candidates
            .iter()
            .filter(|(_, matched)| *matched)
            .fold(None, |acc: Option<&Vector2<T>>, (wind, _)| match acc {
                Some(best) if best.norm() >= wind.norm() => Some(best),
                _ => Some(wind),
            })
    } else {
        candidates
            .iter()
            .fold(None, |acc: Option<&Vector2<T>>, (wind, _)| match acc {
                Some(best) if best.norm() <= wind.norm() => Some(best),
                _ => Some(wind),
            })
    };

    selection
        .copied()
        .ok_or(WindError::NoIntersection { azimuth })
}

/// Bearing comparison rounded to two decimals, modulo 6.28.
fn bearing_matches<T>(bearing: T, azimuth: T) -> bool
where
    T: fXX,
{
    let diff = round!((bearing - azimuth) * T!(100.0)) / T!(100.0);
    let remainder = diff % T!(6.28);

    remainder == T::zero()
}

fn wrap_two_pi<T>(t: T) -> T
where
    T: fXX,
{
    let remainder = t % T::two_pi();

    if remainder < T::zero() {
        remainder + T::two_pi()
    } else {
        remainder
    }
}
