//! Tapering windows.

use ndarray::{Array1, ArrayD, Dimension, IxDyn};
use std::f64::consts::PI;

/// One-dimensional Tukey (tapered cosine) window of `len` samples.
///
/// `alpha` is the fraction of the window inside the cosine tapers: `0` or
/// less gives a rectangular window, `1` or more a Hann window. With `sym`
/// false the window is periodic, as used for spectral analysis.
pub fn tukey_1d(len: usize, alpha: f64, sym: bool) -> Array1<f64> {
    if len <= 1 || alpha <= 0.0 {
        return Array1::ones(len);
    }
    // a periodic window is the symmetric one a sample longer, truncated
    let m = if sym { len } else { len + 1 };
    let last = (m - 1) as f64;
    let w = if alpha >= 1.0 {
        Array1::from_shape_fn(m, |n| 0.5 - 0.5 * (2.0 * PI * n as f64 / last).cos())
    } else {
        let width = (alpha * last / 2.0).floor() as usize;
        Array1::from_shape_fn(m, |n| {
            let x = n as f64;
            if n <= width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * x / alpha / last)).cos())
            } else if n < m - width - 1 {
                1.0
            } else {
                0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * x / alpha / last)).cos())
            }
        })
    };
    if sym {
        w
    } else {
        w.slice_move(ndarray::s![..len])
    }
}

/// Separable N-d Tukey window: the product of [`tukey_1d`] along every axis.
pub fn tukey(shape: &[usize], alpha: f64, sym: bool) -> ArrayD<f64> {
    let windows: Vec<Array1<f64>> = shape.iter().map(|&n| tukey_1d(n, alpha, sym)).collect();
    ArrayD::from_shape_fn(IxDyn(shape), |index| {
        index
            .slice()
            .iter()
            .zip(&windows)
            .map(|(&i, w)| w[i])
            .product()
    })
}
