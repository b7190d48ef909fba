//! Masked normalized cross-correlation.
//!
//! Translation registration of images with invalid regions, after Padfield,
//! "Masked Object Registration in the Fourier Domain" (IEEE TIP, 2012). The
//! correlation is normalized over the overlap of the two masks at each shift,
//! so masked-out voxels never contribute.

use crate::error::{Error, Result};
use crate::fft::{fftn, ifftn};
use crate::find_fast_number::fastish_shape;
use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice, Zip};
use num_complex::Complex;
use tracing::trace;

/// FFT of `image` zero-padded to `shape`.
fn padded_fft(image: ArrayViewD<f64>, shape: &[usize]) -> ArrayD<Complex<f64>> {
    let mut padded = ArrayD::<Complex<f64>>::zeros(IxDyn(shape));
    padded
        .slice_each_axis_mut(|axis| Slice::from(..image.len_of(axis.axis)))
        .zip_mut_with(&image, |p, &x| *p = Complex::new(x, 0.0));
    let axes: Vec<usize> = (0..shape.len()).collect();
    fftn(padded.view(), &axes)
}

fn mask_to_f64(mask: &ArrayViewD<bool>) -> ArrayD<f64> {
    mask.mapv(|m| if m { 1.0 } else { 0.0 })
}

/// Real part of the inverse FFT of `a * b`.
fn correlate(a: &ArrayD<Complex<f64>>, b: &ArrayD<Complex<f64>>) -> ArrayD<f64> {
    let product = a * b;
    let axes: Vec<usize> = (0..a.ndim()).collect();
    ifftn(product.view(), &axes).mapv(|c| c.re)
}

/// Masked normalized cross-correlation of `fixed` and `moving` over every
/// relative shift (`full` mode, shape `fixed + moving - 1`).
///
/// Values lie in `[-1, 1]`. Shifts where the number of overlapping valid
/// voxels is below `overlap_ratio` times the maximum overlap are set to zero.
pub fn cross_correlate_masked(
    fixed: ArrayViewD<f64>,
    moving: ArrayViewD<f64>,
    fixed_mask: ArrayViewD<bool>,
    moving_mask: ArrayViewD<bool>,
    overlap_ratio: f64,
) -> Result<ArrayD<f64>> {
    if fixed.shape() != fixed_mask.shape() {
        return Err(Error::shape_mismatch(fixed.shape(), fixed_mask.shape()));
    }
    if moving.shape() != moving_mask.shape() {
        return Err(Error::shape_mismatch(moving.shape(), moving_mask.shape()));
    }
    if fixed.ndim() != moving.ndim() {
        return Err(Error::shape_mismatch(fixed.shape(), moving.shape()));
    }

    let final_shape: Vec<usize> = fixed
        .shape()
        .iter()
        .zip(moving.shape())
        .map(|(&f, &m)| f + m - 1)
        .collect();
    let fast_shape = fastish_shape(&final_shape);
    trace!(?final_shape, ?fast_shape, "masked cross correlation");

    let fixed_mask = mask_to_f64(&fixed_mask);
    let fixed_image = &fixed * &fixed_mask;

    // an N-d rotation by 180 degrees flips every axis
    let mut moving_mask = mask_to_f64(&moving_mask);
    let mut moving_image = &moving * &moving_mask;
    for axis in 0..moving.ndim() {
        moving_mask.invert_axis(Axis(axis));
        moving_image.invert_axis(Axis(axis));
    }

    let fixed_fft = padded_fft(fixed_image.view(), &fast_shape);
    let rotated_moving_fft = padded_fft(moving_image.view(), &fast_shape);
    let fixed_mask_fft = padded_fft(fixed_mask.view(), &fast_shape);
    let rotated_moving_mask_fft = padded_fft(moving_mask.view(), &fast_shape);

    // number of valid voxels overlapping at every shift
    let overlap = correlate(&rotated_moving_mask_fft, &fixed_mask_fft)
        .mapv(|n| n.round_ties_even().max(f64::EPSILON));

    let masked_fixed = correlate(&rotated_moving_mask_fft, &fixed_fft);
    let masked_moving = correlate(&fixed_mask_fft, &rotated_moving_fft);

    let mut numerator = correlate(&rotated_moving_fft, &fixed_fft);
    Zip::from(&mut numerator)
        .and(&masked_fixed)
        .and(&masked_moving)
        .and(&overlap)
        .for_each(|n, &f, &m, &o| *n -= f * m / o);

    let fixed_squared_fft = padded_fft(fixed_image.mapv(|x| x * x).view(), &fast_shape);
    let mut fixed_denom = correlate(&rotated_moving_mask_fft, &fixed_squared_fft);
    Zip::from(&mut fixed_denom)
        .and(&masked_fixed)
        .and(&overlap)
        .for_each(|d, &f, &o| *d = (*d - f * f / o).max(0.0));

    let moving_squared_fft = padded_fft(moving_image.mapv(|x| x * x).view(), &fast_shape);
    let mut moving_denom = correlate(&fixed_mask_fft, &moving_squared_fft);
    Zip::from(&mut moving_denom)
        .and(&masked_moving)
        .and(&overlap)
        .for_each(|d, &m, &o| *d = (*d - m * m / o).max(0.0));

    let crop = |a: ArrayD<f64>| -> ArrayD<f64> {
        a.slice_each_axis(|axis| Slice::from(..final_shape[axis.axis.index()]))
            .to_owned()
    };
    let numerator = crop(numerator);
    let overlap = crop(overlap);
    let mut denom = crop(fixed_denom);
    denom.zip_mut_with(&crop(moving_denom), |f, &m| *f = (*f * m).sqrt());

    // tiny denominators blow up the quotient
    let tolerance = 1e3 * f64::EPSILON * denom.iter().fold(0.0f64, |m, &d| m.max(d.abs()));
    let threshold = overlap_ratio * overlap.iter().fold(0.0f64, |m, &o| m.max(o));
    let mut out = ArrayD::<f64>::zeros(denom.raw_dim());
    Zip::from(&mut out)
        .and(&numerator)
        .and(&denom)
        .and(&overlap)
        .for_each(|out, &n, &d, &o| {
            if d > tolerance && o >= threshold {
                *out = (n / d).max(-1.0).min(1.0);
            }
        });
    Ok(out)
}

/// Shift registering `moving` onto `reference` from the masked correlation.
///
/// Ties between equal maxima are resolved by their centroid.
pub(crate) fn masked_registration(
    reference: ArrayViewD<f64>,
    moving: ArrayViewD<f64>,
    reference_mask: ArrayViewD<bool>,
    moving_mask: Option<ArrayViewD<bool>>,
    overlap_ratio: f64,
) -> Result<Vec<f64>> {
    let moving_mask = match &moving_mask {
        Some(mask) => mask.view(),
        None => {
            if reference.shape() != moving.shape() {
                return Err(Error::shape_mismatch(reference.shape(), moving.shape()));
            }
            reference_mask.view()
        }
    };
    let correlation = cross_correlate_masked(
        moving.view(),
        reference.view(),
        moving_mask,
        reference_mask.view(),
        overlap_ratio,
    )?;

    let max = correlation.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut center = vec![0.0; correlation.ndim()];
    let mut count = 0usize;
    for (index, _) in correlation.indexed_iter().filter(|&(_, &c)| c == max) {
        for (c, &i) in center.iter_mut().zip(index.slice()) {
            *c += i as f64;
        }
        count += 1;
    }

    Ok(center
        .iter()
        .zip(reference.shape().iter().zip(moving.shape()))
        .map(|(&c, (&r, &m))| {
            let shift = c / count as f64 - r as f64 + 1.0;
            let size_mismatch = m as f64 - r as f64;
            -shift + size_mismatch / 2.0
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_image(shape: (usize, usize), seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array::from_shape_fn(shape, |_| rng.gen_range(0.0..1.0))
    }

    #[test]
    fn test_unmasked_autocorrelation_peaks_at_center() {
        let image = random_image((9, 7), 0).into_dyn();
        let mask = Array::from_elem(IxDyn(&[9, 7]), true);
        let xcorr =
            cross_correlate_masked(image.view(), image.view(), mask.view(), mask.view(), 0.3);
        let xcorr = xcorr.unwrap();
        assert_eq!(xcorr.shape(), &[17, 13]);
        assert!((xcorr[[8, 6]] - 1.0).abs() < 1e-9);
        assert!(xcorr.iter().all(|&c| (-1.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_low_overlap_is_zeroed() {
        let image = random_image((8, 8), 1).into_dyn();
        let mask = Array::from_elem(IxDyn(&[8, 8]), true);
        let xcorr =
            cross_correlate_masked(image.view(), image.view(), mask.view(), mask.view(), 0.5);
        let xcorr = xcorr.unwrap();
        // the corners overlap by a single voxel
        assert_eq!(xcorr[[0, 0]], 0.0);
        assert_eq!(xcorr[[14, 14]], 0.0);
    }

    #[test]
    fn test_recovers_shift_despite_masked_corruption() {
        let reference = random_image((32, 32), 2);
        let (di, dj) = (3usize, 5usize);
        // moving[i, j] = reference[i - 3, j - 5] where defined
        let mut moving = random_image((32, 32), 3);
        for i in di..32 {
            for j in dj..32 {
                moving[[i, j]] = reference[[i - di, j - dj]];
            }
        }
        // corrupt a block of the reference and mask it out
        let mut corrupted = reference.clone();
        let mut reference_mask = Array2::from_elem((32, 32), true);
        for i in 20..28 {
            for j in 2..10 {
                corrupted[[i, j]] = 50.0;
                reference_mask[[i, j]] = false;
            }
        }
        let mut moving_mask = Array2::from_elem((32, 32), false);
        for i in di..32 {
            for j in dj..32 {
                moving_mask[[i, j]] = true;
            }
        }
        let shift = masked_registration(
            corrupted.view().into_dyn(),
            moving.view().into_dyn(),
            reference_mask.view().into_dyn(),
            Some(moving_mask.view().into_dyn()),
            0.3,
        )
        .unwrap();
        assert_eq!(shift, vec![-3.0, -5.0]);
    }

    #[test]
    fn test_mask_shape_checked() {
        let image = random_image((8, 8), 4).into_dyn();
        let mask = Array::from_elem(IxDyn(&[8, 7]), true);
        assert!(matches!(
            masked_registration(image.view(), image.view(), mask.view(), None, 0.3),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
