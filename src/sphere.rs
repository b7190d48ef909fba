//! Orientation sampling on the unit sphere.

use crate::error::{Error, Result};
use ndarray::{Array1, Zip};
use rand::Rng;
use std::f64::consts::PI;

/// Euler angles in degrees sampling the rotation group.
///
/// `theta` and `phi` place the rotation axes, `psi` is the in-plane rotation
/// about each axis. Without the product, `theta` and `phi` have `n` entries
/// and `psi` has `m`; with it all three have `n * m`.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereSampling {
    pub theta: Array1<f64>,
    pub phi: Array1<f64>,
    pub psi: Array1<f64>,
    /// Approximate angular spacing in degrees, `(axes, rotation)`.
    pub precision: (f64, f64),
}

impl SphereSampling {
    pub fn len(&self) -> usize {
        self.theta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theta.is_empty()
    }
}

/// Fibonacci-sphere sampling of `n` axes with `m` rotations about each.
///
/// `symmetry` is the order of rotational symmetry of the object, which
/// restricts the third angle to `[0, 2π / symmetry]`. When `product` is set
/// every axis is paired with every rotation, axis-major.
pub fn discretize_sphere_uniformly(
    n: usize,
    m: usize,
    symmetry: usize,
    product: bool,
) -> Result<SphereSampling> {
    if symmetry == 0 {
        return Err(Error::precondition("symmetry order must be at least 1"));
    }
    let golden_ratio = (1.0 + 5f64.sqrt()) / 2.0;
    let i = Array1::from_shape_fn(n, |i| i as f64);
    let theta = i.mapv(|i| (2.0 * PI * i / golden_ratio).rem_euclid(2.0 * PI));
    let phi = i.mapv(|i| (1.0 - 2.0 * (i + 0.5) / n as f64).acos());
    let psi = Array1::linspace(0.0, 2.0 * PI / symmetry as f64, m);

    // area around each axis is 4π / n
    let precision_axes = 2.0 * (PI / n as f64).sqrt().to_degrees();
    let precision_rot = (2.0 * PI / (symmetry * m) as f64).to_degrees();

    let (theta, phi, psi) = if product {
        (
            Array1::from_shape_fn(n * m, |k| theta[k / m]),
            Array1::from_shape_fn(n * m, |k| phi[k / m]),
            Array1::from_shape_fn(n * m, |k| psi[k % m]),
        )
    } else {
        (theta, phi, psi)
    };
    Ok(SphereSampling {
        theta: theta.mapv(f64::to_degrees),
        phi: phi.mapv(f64::to_degrees),
        psi: psi.mapv(f64::to_degrees),
        precision: (precision_axes, precision_rot),
    })
}

/// Unit vectors `(z, y, x)` of the sampled axes, one row per axis.
pub fn axis_vectors(sampling: &SphereSampling) -> ndarray::Array2<f64> {
    let mut vectors = ndarray::Array2::zeros((sampling.theta.len(), 3));
    Zip::from(vectors.rows_mut())
        .and(&sampling.theta)
        .and(&sampling.phi)
        .for_each(|mut v, &theta, &phi| {
            let (theta, phi) = (theta.to_radians(), phi.to_radians());
            v[0] = phi.cos();
            v[1] = phi.sin() * theta.sin();
            v[2] = phi.sin() * theta.cos();
        });
    vectors
}

/// Uniformly distributed random direction `(z, y, x)` scaled to `norm`
/// (1 when `None`). Negative norms give the zero vector.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R, norm: Option<f64>) -> [f64; 3] {
    let norm = norm.unwrap_or(1.0).max(0.0);
    let azimuth = rng.gen_range(0.0..2.0 * PI);
    let cos_polar: f64 = rng.gen_range(-1.0..=1.0);
    let sin_polar = (1.0 - cos_polar * cos_polar).max(0.0).sqrt();
    [
        norm * cos_polar,
        norm * sin_polar * azimuth.sin(),
        norm * sin_polar * azimuth.cos(),
    ]
}
