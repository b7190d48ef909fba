//! Sub-pixel translation registration by phase cross-correlation.
//!
//! The peak of the inverse FFT of the cross-power spectrum gives the integer
//! shift; with an upsample factor above one the neighbourhood of the peak is
//! refined with a matrix-multiply DFT evaluated only on a small grid.

use crate::dtype::Spectral;
use crate::error::{Error, Result};
use crate::fft::{fftfreq, fftn, ifftn};
use crate::layout::{broadcast_shapes, broadcast_subview, par_indexed_for_each, subview};
use crate::namespace::{coerce, resolve, ArrayNamespace};
use crate::options::{Mode, Normalization, PhaseCorrelationOptions, Space};
use crate::spline::{AxisTaps, Interpolator};
use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{indices, Array2, ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice, Zip};
use num_complex::Complex;
use std::f64::consts::PI;
use tracing::{trace, warn};

/// Result of a registration.
///
/// For inputs that broadcast to `(broadcast...)` leading axes, `shift` has
/// shape `(broadcast..., D)` and `error`/`phasediff` have shape
/// `(broadcast...)`. Without broadcasting those are `(D,)` and 0-d.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    /// Shift that registers the moving volume onto the reference.
    pub shift: ArrayD<f64>,
    /// Translation-invariant normalized RMS error.
    ///
    /// Only meaningful with [`Normalization::None`]: after phase
    /// normalization it sits near 1 whatever the inputs.
    pub error: ArrayD<f64>,
    /// Global phase difference, when the backend computes it.
    pub phasediff: Option<ArrayD<f64>>,
}

impl Registration {
    /// Shift of the broadcast element at `index` (empty for a single pair).
    ///
    /// `None` when `index` does not address one element of the broadcast axes.
    pub fn shift_at(&self, index: &[usize]) -> Option<Vec<f64>> {
        let lead = &self.shift.shape()[..self.shift.ndim() - 1];
        if index.len() != lead.len() || index.iter().zip(lead).any(|(&i, &n)| i >= n) {
            return None;
        }
        Some(subview(self.shift.view(), index).iter().copied().collect())
    }

    pub fn error_at(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.error.ndim() {
            return None;
        }
        self.error.get(index).copied()
    }
}

/// Masks of a masked registration; `true` marks valid voxels.
#[derive(Clone, Debug)]
pub struct Masks<'a> {
    pub reference: ArrayViewD<'a, bool>,
    /// Defaults to the reference mask.
    pub moving: Option<ArrayViewD<'a, bool>>,
}

/// Per-element outcome.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Peak {
    pub shift: Vec<f64>,
    pub error: f64,
    pub phasediff: f64,
}

/// A reference/moving pair broadcast to common leading axes.
pub(crate) struct Problem<'a> {
    lead: Vec<usize>,
    spatial_dims: usize,
    multichannel: bool,
    /// Leading axes of `reference` and `moving` before the channel and
    /// spatial axes.
    split: (usize, usize),
    reference: ArrayViewD<'a, Complex<f64>>,
    moving: ArrayViewD<'a, Complex<f64>>,
}

impl<'a> Problem<'a> {
    pub fn new(
        reference: ArrayViewD<'a, Complex<f64>>,
        moving: ArrayViewD<'a, Complex<f64>>,
        options: &PhaseCorrelationOptions,
    ) -> Result<Self> {
        let channel = options.multichannel as usize;
        let spatial_dims = match options.nb_spatial_dims {
            Some(d) => d,
            None => {
                if reference.shape() != moving.shape() {
                    return Err(Error::shape_mismatch(reference.shape(), moving.shape()));
                }
                reference.ndim().saturating_sub(channel)
            }
        };
        let tail = spatial_dims + channel;
        if spatial_dims == 0 || reference.ndim() < tail || moving.ndim() < tail {
            return Err(Error::precondition(format!(
                "cannot register arrays of shapes {:?} and {:?} over {} spatial axes",
                reference.shape(),
                moving.shape(),
                spatial_dims
            )));
        }
        let reference_split = reference.ndim() - tail;
        let moving_split = moving.ndim() - tail;
        if reference.shape()[reference_split..] != moving.shape()[moving_split..] {
            return Err(Error::shape_mismatch(
                &reference.shape()[reference_split..],
                &moving.shape()[moving_split..],
            ));
        }
        let lead = broadcast_shapes(
            &reference.shape()[..reference_split],
            &moving.shape()[..moving_split],
        )?;

        Ok(Problem {
            reference,
            moving,
            split: (reference_split, moving_split),
            lead,
            spatial_dims,
            multichannel: options.multichannel,
        })
    }

    pub fn spatial_shape(&self) -> &[usize] {
        let ndim = self.reference.ndim();
        &self.reference.shape()[ndim - self.spatial_dims..]
    }

    /// The `(channel, spatial...)` pair at `index` of the broadcast axes.
    fn element(
        &self,
        index: &[usize],
    ) -> (ArrayViewD<'a, Complex<f64>>, ArrayViewD<'a, Complex<f64>>) {
        let reference = broadcast_subview(self.reference.clone(), self.split.0, index);
        let moving = broadcast_subview(self.moving.clone(), self.split.1, index);
        if self.multichannel {
            (reference, moving)
        } else {
            (reference.insert_axis(Axis(0)), moving.insert_axis(Axis(0)))
        }
    }

    /// Registers every broadcast element with `register`, in parallel.
    pub fn run<F>(&self, register: F) -> Result<Registration>
    where
        F: Fn(ArrayViewD<Complex<f64>>, ArrayViewD<Complex<f64>>) -> Result<Peak> + Sync,
    {
        trace!(
            lead = ?self.lead,
            spatial = ?self.spatial_shape(),
            multichannel = self.multichannel,
            "phase cross correlation"
        );
        let elements: Vec<IxDyn> = indices(&self.lead[..]).into_iter().collect();
        let peaks = elements
            .into_par_iter()
            .map(|index| {
                let (reference, moving) = self.element(index.slice());
                register(reference, moving)
            })
            .collect::<Result<Vec<Peak>>>()?;

        let mut shift_shape = self.lead.clone();
        shift_shape.push(self.spatial_dims);
        let shift = ArrayD::from_shape_vec(
            IxDyn(&shift_shape),
            peaks.iter().flat_map(|p| p.shift.iter().copied()).collect(),
        )?;
        let lead = IxDyn(&self.lead);
        let error = ArrayD::from_shape_vec(lead.clone(), peaks.iter().map(|p| p.error).collect())?;
        let phasediff = ArrayD::from_shape_vec(lead, peaks.iter().map(|p| p.phasediff).collect())?;
        Ok(Registration {
            shift,
            error,
            phasediff: Some(phasediff),
        })
    }
}

/// Registers one `(channel, spatial...)` pair.
pub(crate) fn cross_correlation_peak(
    reference: ArrayViewD<Complex<f64>>,
    moving: ArrayViewD<Complex<f64>>,
    options: &PhaseCorrelationOptions,
) -> Peak {
    let ndim = reference.ndim() - 1;
    let spatial: Vec<usize> = reference.shape()[1..].to_vec();
    let (reference_freq, moving_freq) = match options.space {
        Space::Real => {
            let axes: Vec<usize> = (1..=ndim).collect();
            (fftn(reference, &axes), fftn(moving, &axes))
        }
        Space::Fourier => (reference.to_owned(), moving.to_owned()),
    };

    // cross-power spectrum, channels combined coherently
    let mut product = ArrayD::<Complex<f64>>::zeros(IxDyn(&spatial));
    for (r, m) in reference_freq.outer_iter().zip(moving_freq.outer_iter()) {
        Zip::from(&mut product)
            .and(&r)
            .and(&m)
            .for_each(|p, &r, &m| *p += r * m.conj());
    }
    if options.normalization == Normalization::Phase {
        let floor = 100.0 * f64::EPSILON;
        product.mapv_inplace(|p| p / p.norm().max(floor));
    }

    let axes: Vec<usize> = (0..ndim).collect();
    let correlation = ifftn(product.view(), &axes);
    let (maxima, mut peak) = argmax(correlation.view());
    let mut shift: Vec<f64> = maxima
        .iter()
        .zip(&spatial)
        .map(|(&m, &n)| if m > n / 2 { m as f64 - n as f64 } else { m as f64 })
        .collect();

    let mut reference_amp: f64 = reference_freq.iter().map(|c| c.norm_sqr()).sum();
    let mut moving_amp: f64 = moving_freq.iter().map(|c| c.norm_sqr()).sum();

    if options.upsample_factor <= 1 {
        let size = product.len() as f64;
        reference_amp /= size;
        moving_amp /= size;
    } else {
        let upsample = options.upsample_factor as f64;
        let region = (upsample * 1.5).ceil();
        let dftshift = (region / 2.0).trunc();
        for s in shift.iter_mut() {
            *s = (*s * upsample).round_ties_even() / upsample;
        }
        let offsets: Vec<f64> = shift.iter().map(|s| dftshift - s * upsample).collect();
        let conjugate = product.mapv(|p| p.conj());
        let upsampled =
            upsampled_dft(conjugate.view(), region as usize, options.upsample_factor, &offsets)
                .mapv(|c| c.conj());
        let (maxima, refined) = argmax(upsampled.view());
        for (s, &m) in shift.iter_mut().zip(&maxima) {
            *s += (m as f64 - dftshift) / upsample;
        }
        peak = refined;
    }

    for (s, &n) in shift.iter_mut().zip(&spatial) {
        if n == 1 {
            *s = 0.0;
        }
    }
    let error = (1.0 - peak.norm_sqr() / (reference_amp * moving_amp)).max(0.0).sqrt();
    Peak {
        shift,
        error,
        phasediff: peak.im.atan2(peak.re),
    }
}

/// Index and value of the first maximum of `|a|`.
fn argmax(a: ArrayViewD<Complex<f64>>) -> (Vec<usize>, Complex<f64>) {
    let mut best = (IxDyn(&vec![0; a.ndim()]), Complex::new(0.0, 0.0));
    let mut best_norm = f64::NEG_INFINITY;
    for (index, &value) in a.indexed_iter() {
        let norm = value.norm_sqr();
        if norm > best_norm {
            best_norm = norm;
            best = (index, value);
        }
    }
    (best.0.slice().to_vec(), best.1)
}

/// DFT of `data` on a `region^D` grid upsampled by `upsample`, starting at
/// `offsets` (in upsampled pixels) along each axis.
///
/// Equivalent to zero-padding the spectrum by `upsample` and taking the
/// inverse FFT, restricted to the region of interest.
pub(crate) fn upsampled_dft(
    data: ArrayViewD<Complex<f64>>,
    region: usize,
    upsample: usize,
    offsets: &[f64],
) -> ArrayD<Complex<f64>> {
    let mut current = data.to_owned();
    for axis in (0..data.ndim()).rev() {
        let n = current.len_of(Axis(axis));
        let frequencies = fftfreq(n, upsample as f64);
        let kernel = Array2::from_shape_fn((region, n), |(u, k)| {
            Complex::from_polar(1.0, -2.0 * PI * (u as f64 - offsets[axis]) * frequencies[k])
        });

        let mut shape = current.shape().to_vec();
        shape[axis] = region;
        let mut next = ArrayD::<Complex<f64>>::zeros(IxDyn(&shape));
        Zip::from(next.lanes_mut(Axis(axis)))
            .and(current.lanes(Axis(axis)))
            .par_for_each(|mut out, lane| {
                for (o, row) in out.iter_mut().zip(kernel.outer_iter()) {
                    *o = row.dot(&lane);
                }
            });
        current = next;
    }
    current
}

/// Picks, among the periodic aliases of `shift`, the one whose overlapping
/// tiles correlate best.
///
/// The moving image is shifted by `shift` with periodic boundaries and every
/// split of the image at the shift position is scored by Pearson correlation.
pub(crate) fn disambiguate_shift(
    reference: ArrayViewD<f64>,
    moving: ArrayViewD<f64>,
    shift: &[f64],
) -> Result<Vec<f64>> {
    let shape = reference.shape().to_vec();
    let positive: Vec<f64> = shift
        .iter()
        .zip(&shape)
        .map(|(s, &n)| s.rem_euclid(n as f64))
        .collect();
    let negative: Vec<f64> = positive.iter().zip(&shape).map(|(s, &n)| s - n as f64).collect();
    let subpixel = shift.iter().any(|s| s.fract() != 0.0);
    let order = if subpixel { 3 } else { 0 };

    let interpolator = Interpolator::new(moving, order, Mode::GridWrap, 0.0, true)?;
    let d = shape.len();
    let mut shifted = ArrayD::<f64>::zeros(IxDyn(&shape));
    par_indexed_for_each(
        shifted.view_mut(),
        || (vec![0.0; d], vec![AxisTaps::default(); d]),
        |(coordinate, taps), index, value| {
            for (a, c) in coordinate.iter_mut().enumerate() {
                *c = index[a] as f64 - shift[a];
            }
            *value = interpolator.sample(coordinate, taps);
        },
    );

    let splits: Vec<usize> = positive
        .iter()
        .zip(&shape)
        .map(|(s, &n)| (s.round_ties_even() as usize).min(n))
        .collect();
    // corners in row-major order, the last axis varying fastest; a set
    // bit selects the tile after the split
    let after = |corner: usize, a: usize| corner >> (d - 1 - a) & 1 == 1;
    let mut best: Option<(f64, usize)> = None;
    for corner in 0..(1usize << d) {
        let tile = |view: ArrayViewD<f64>| -> Vec<f64> {
            view.slice_each_axis(|axis| {
                let a = axis.axis.index();
                if after(corner, a) {
                    Slice::from(splits[a]..)
                } else {
                    Slice::from(..splits[a])
                }
            })
            .iter()
            .copied()
            .collect()
        };
        let reference_tile = tile(reference.view());
        if reference_tile.len() <= 2 {
            continue;
        }
        let moving_tile = tile(shifted.view());
        let correlation = pearson(&reference_tile, &moving_tile);
        if correlation > best.map_or(-1.0, |b| b.0) {
            best = Some((correlation, corner));
        }
    }

    match best {
        Some((_, corner)) => Ok((0..d)
            .map(|a| if after(corner, a) { positive[a] } else { negative[a] })
            .collect()),
        None => {
            warn!(
                ?shift,
                "could not determine the real shift: no tile had a defined correlation; \
                 returning the periodic shift"
            );
            Ok(shift.to_vec())
        }
    }
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a) * (x - mean_a);
        var_b += (y - mean_b) * (y - mean_b);
    }
    cov / (var_a * var_b).sqrt()
}

/// Real-space image of channel 0 of a `(channel, spatial...)` element.
pub(crate) fn real_space(element: ArrayViewD<Complex<f64>>, space: Space) -> ArrayD<f64> {
    let image = element.index_axis_move(Axis(0), 0);
    match space {
        Space::Real => image.mapv(|c| c.re),
        Space::Fourier => {
            let axes: Vec<usize> = (0..image.ndim()).collect();
            ifftn(image, &axes).mapv(|c| c.re)
        }
    }
}

/// Registration with the features every backend supports.
///
/// Masks and disambiguation are rejected with [`Error::NotImplemented`] and no
/// phase difference is reported.
pub(crate) fn portable_phase_cross_correlation(
    backend: &str,
    reference: ArrayViewD<Complex<f64>>,
    moving: ArrayViewD<Complex<f64>>,
    masks: Option<Masks>,
    options: &PhaseCorrelationOptions,
) -> Result<Registration> {
    if masks.is_some() {
        return Err(Error::not_implemented(format!(
            "masked phase cross correlation (reference_mask, moving_mask, overlap_ratio) \
             on the {} backend{}",
            backend,
            if options.multichannel { " with multichannel inputs" } else { "" }
        )));
    }
    if options.disambiguate {
        return Err(Error::not_implemented(format!(
            "disambiguate on the {} backend{}",
            backend,
            if options.multichannel { " with multichannel inputs" } else { "" }
        )));
    }
    let problem = Problem::new(reference.view(), moving.view(), options)?;
    let mut registration = problem.run(|r, m| Ok(cross_correlation_peak(r, m, options)))?;
    registration.phasediff = None;
    Ok(registration)
}

fn prepare<A, T>(array: &A) -> Result<ArrayD<Complex<f64>>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Spectral,
{
    Ok(coerce(array)?.mapv(T::to_complex))
}

/// Efficient subpixel image translation registration by cross-correlation.
///
/// `reference` and `moving` are real-space images (or their FFTs with
/// `Space::Fourier`), optionally with a channel axis before the spatial axes
/// (`multichannel`). With `nb_spatial_dims` their leading axes broadcast and
/// every pair is registered.
pub fn phase_cross_correlation<R, M, T, U>(
    reference: &R,
    moving: &M,
    options: &PhaseCorrelationOptions,
) -> Result<Registration>
where
    R: ArrayNamespace<Elem = T> + ?Sized,
    M: ArrayNamespace<Elem = U> + ?Sized,
    T: Spectral,
    U: Spectral,
{
    let backend = resolve(&[reference.namespace(), moving.namespace()]);
    let (reference, moving) = (prepare(reference)?, prepare(moving)?);
    backend.phase_cross_correlation(reference.view(), moving.view(), None, options)
}

/// Masked normalized cross-correlation registration.
///
/// Voxels where a mask is `false` are ignored. The masks have the spatial
/// shape of the images and apply to every broadcast element; a missing moving
/// mask reuses the reference mask. `error` and `phasediff` are `NaN`.
pub fn phase_cross_correlation_masked<R, M, T, U>(
    reference: &R,
    moving: &M,
    reference_mask: ArrayViewD<bool>,
    moving_mask: Option<ArrayViewD<bool>>,
    options: &PhaseCorrelationOptions,
) -> Result<Registration>
where
    R: ArrayNamespace<Elem = T> + ?Sized,
    M: ArrayNamespace<Elem = U> + ?Sized,
    T: Spectral,
    U: Spectral,
{
    let backend = resolve(&[reference.namespace(), moving.namespace()]);
    let (reference, moving) = (prepare(reference)?, prepare(moving)?);
    let masks = Masks {
        reference: reference_mask.view(),
        moving: moving_mask.as_ref().map(|mask| mask.view()),
    };
    backend.phase_cross_correlation(reference.view(), moving.view(), Some(masks), options)
}

fn alignment_options(nb_spatial_dims: Option<usize>) -> PhaseCorrelationOptions {
    let options = PhaseCorrelationOptions::default()
        .upsample_factor(10)
        .disambiguate(true)
        .normalization(Normalization::None);
    match nb_spatial_dims {
        Some(d) => options.nb_spatial_dims(d),
        None => options,
    }
}

/// Whether every registered shift between `a` and `b` has a norm of at most `atol`.
pub fn are_volumes_aligned<A, B, T, U>(
    a: &A,
    b: &B,
    atol: f64,
    nb_spatial_dims: Option<usize>,
) -> Result<bool>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    B: ArrayNamespace<Elem = U> + ?Sized,
    T: Spectral,
    U: Spectral,
{
    let registration = phase_cross_correlation(a, b, &alignment_options(nb_spatial_dims))?;
    Ok(registration
        .shift
        .lanes(Axis(registration.shift.ndim() - 1))
        .into_iter()
        .all(|shift| shift.iter().map(|s| s * s).sum::<f64>().sqrt() <= atol))
}

/// Whether `b` is a translated copy of `a` up to `atol` registration error.
pub fn is_translation_of<A, B, T, U>(
    a: &A,
    b: &B,
    atol: f64,
    nb_spatial_dims: Option<usize>,
) -> Result<bool>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    B: ArrayNamespace<Elem = U> + ?Sized,
    T: Spectral,
    U: Spectral,
{
    let registration = phase_cross_correlation(a, b, &alignment_options(nb_spatial_dims))?;
    Ok(registration.error.iter().all(|&e| e <= atol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::fftn_real;
    use crate::fourier::fourier_shift;
    use crate::geometry::translate;
    use crate::namespace::Portable;
    use crate::options::FourierShiftOptions;
    use ndarray::{Array, Array2, Array3};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_volume(shape: &[usize], seed: u64) -> ArrayD<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-1.0..1.0))
    }

    /// A smooth blob, so that sub-pixel Fourier shifts stay band limited.
    fn blob(shape: &[usize], center: &[f64], sigma: f64) -> ArrayD<f64> {
        Array::from_shape_fn(IxDyn(shape), |index| {
            let r2: f64 = center
                .iter()
                .enumerate()
                .map(|(a, c)| (index[a] as f64 - c).powi(2))
                .sum();
            (-r2 / (2.0 * sigma * sigma)).exp()
        })
    }

    fn shifted(volume: &ArrayD<f64>, shift: &[f64]) -> ArrayD<f64> {
        let axes: Vec<usize> = (0..volume.ndim()).collect();
        let spectrum = fftn_real(volume.view(), &axes);
        let options = FourierShiftOptions::default();
        let spectrum = fourier_shift(&spectrum, shift.to_vec(), &options).unwrap();
        ifftn(spectrum.view(), &axes).mapv(|c| c.re)
    }

    fn assert_shift(actual: &[f64], expected: &[f64], tol: f64) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= tol, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn test_integer_shift() {
        let reference = random_volume(&[16, 12, 10], 0);
        let moving = shifted(&reference, &[3.0, -2.0, 4.0]);
        let options = PhaseCorrelationOptions::default();
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_eq!(registration.shift.shape(), &[3]);
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![-3.0, 2.0, -4.0]);
        let phasediff = registration.phasediff.unwrap().iter().next().copied().unwrap();
        assert!(phasediff.abs() < 1e-8);
    }

    #[test]
    fn test_subpixel_shift() {
        // odd sizes: a sub-pixel shift of a real image stays real
        let reference = random_volume(&[31, 31], 1);
        let truth = [1.3, -2.7];
        let moving = shifted(&reference, &truth);
        let options = PhaseCorrelationOptions::default().upsample_factor(20);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_shift(&registration.shift_at(&[]).unwrap(), &[-1.3, 2.7], 0.05 + 1e-9);

        let reference = blob(&[31, 31, 31], &[15.0, 16.0, 14.5], 3.0);
        let truth = [0.4, -1.5, 2.25];
        let moving = shifted(&reference, &truth);
        let options = PhaseCorrelationOptions::default()
            .upsample_factor(20)
            .normalization(Normalization::None);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_shift(&registration.shift_at(&[]).unwrap(), &[-0.4, 1.5, -2.25], 0.05 + 1e-9);
    }

    #[test]
    fn test_recovers_spline_translation() {
        let reference = blob(&[24, 24, 24], &[12.0, 11.5, 12.5], 3.0);
        let d = [0.25, 0.5, -0.75];
        let moving = translate(&reference, &d, 3).unwrap();
        let options = PhaseCorrelationOptions::default()
            .upsample_factor(20)
            .normalization(Normalization::None);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_shift(&registration.shift_at(&[]).unwrap(), &[-0.25, -0.5, 0.75], 0.05);
        assert!(registration.error_at(&[]).unwrap() < 1e-2);

        // a whitened spectrum reports an error near one even for a copy
        let whitened = options.clone().normalization(Normalization::Phase);
        let whitened = phase_cross_correlation(&reference, &reference, &whitened).unwrap();
        assert!(whitened.error_at(&[]).unwrap() > 0.5);
        let itself = phase_cross_correlation(&reference, &reference, &options).unwrap();
        assert!(itself.error_at(&[]).unwrap() < 1e-6);
    }

    #[test]
    fn test_accessors_check_the_index() {
        let reference = random_volume(&[8, 8], 16);
        let options = PhaseCorrelationOptions::default();
        let registration = phase_cross_correlation(&reference, &reference, &options).unwrap();
        assert_eq!(registration.shift_at(&[]), Some(vec![0.0, 0.0]));
        assert_eq!(registration.shift_at(&[0]), None);
        assert_eq!(registration.error_at(&[0]), None);

        let batch = ndarray::stack(Axis(0), &[reference.view(), reference.view()]).unwrap();
        let options = PhaseCorrelationOptions::default().nb_spatial_dims(2);
        let registration = phase_cross_correlation(&reference, &batch, &options).unwrap();
        assert!(registration.shift_at(&[1]).is_some());
        assert_eq!(registration.shift_at(&[2]), None);
        assert_eq!(registration.shift_at(&[]), None);
        assert!(registration.error_at(&[1]).is_some());
        assert_eq!(registration.error_at(&[2]), None);
    }

    #[test]
    fn test_error_vanishes_for_exact_copies() {
        let reference = random_volume(&[12, 12], 2);
        let moving = shifted(&reference, &[2.0, 5.0]);
        let options = PhaseCorrelationOptions::default().normalization(Normalization::None);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert!(registration.error_at(&[]).unwrap() < 1e-6);

        let upsampled =
            phase_cross_correlation(&reference, &moving, &options.upsample_factor(4)).unwrap();
        assert!(upsampled.error_at(&[]).unwrap() < 1e-6);
        assert_shift(&upsampled.shift_at(&[]).unwrap(), &[-2.0, -5.0], 1e-12);
    }

    #[test]
    fn test_fourier_space_input() {
        let reference = random_volume(&[10, 14], 3);
        let moving = shifted(&reference, &[-1.0, 3.0]);
        let options = PhaseCorrelationOptions::default().space(Space::Fourier);
        let registration = phase_cross_correlation(
            &fftn_real(reference.view(), &[0, 1]),
            &fftn_real(moving.view(), &[0, 1]),
            &options,
        )
        .unwrap();
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![1.0, -3.0]);
    }

    #[test]
    fn test_broadcast_matches_single_calls() {
        let reference = random_volume(&[12, 12], 4);
        let shifts = [[1.0, 2.0], [-3.0, 0.0], [4.0, -5.0]];
        let mut moving = Array3::<f64>::zeros((3, 12, 12));
        for (k, s) in shifts.iter().enumerate() {
            moving
                .index_axis_mut(Axis(0), k)
                .assign(&shifted(&reference, s).into_dimensionality::<ndarray::Ix2>().unwrap());
        }
        let options = PhaseCorrelationOptions::default().nb_spatial_dims(2).upsample_factor(5);
        let batched = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_eq!(batched.shift.shape(), &[3, 2]);
        assert_eq!(batched.error.shape(), &[3]);
        for (k, s) in shifts.iter().enumerate() {
            let single = phase_cross_correlation(
                &reference,
                &moving.index_axis(Axis(0), k),
                &PhaseCorrelationOptions::default().upsample_factor(5),
            )
            .unwrap();
            assert_eq!(batched.shift_at(&[k]).unwrap(), single.shift_at(&[]).unwrap());
            let error = single.error_at(&[]).unwrap();
            assert!((batched.error_at(&[k]).unwrap() - error).abs() < 1e-12);
            assert_shift(&single.shift_at(&[]).unwrap(), &[-s[0], -s[1]], 1e-12);
        }
    }

    #[test]
    fn test_multichannel_sums_channels() {
        let reference = random_volume(&[3, 10, 10], 5);
        let mut moving = ArrayD::<f64>::zeros(IxDyn(&[3, 10, 10]));
        for c in 0..3 {
            let channel = reference.index_axis(Axis(0), c).to_owned();
            moving.index_axis_mut(Axis(0), c).assign(&shifted(&channel, &[2.0, -1.0]));
        }
        let options = PhaseCorrelationOptions::default().multichannel(true);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![-2.0, 1.0]);
        // channels go through the portable path, without phase difference
        assert!(registration.phasediff.is_none());
        assert!(matches!(
            phase_cross_correlation(&reference, &moving, &options.disambiguate(true)),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_singleton_axis_has_zero_shift() {
        let reference = random_volume(&[1, 16], 6);
        let moving = shifted(&reference, &[0.0, 3.0]);
        let options = PhaseCorrelationOptions::default().upsample_factor(10);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_shift(&registration.shift_at(&[]).unwrap(), &[0.0, -3.0], 1e-9);
    }

    #[test]
    fn test_portable_backend() {
        let reference = random_volume(&[8, 8], 7);
        let moving = shifted(&reference, &[1.0, 1.0]);
        let registration = phase_cross_correlation(
            &Portable(reference.view()),
            &moving,
            &PhaseCorrelationOptions::default(),
        )
        .unwrap();
        // an ndarray argument outranks the portable one
        assert!(registration.phasediff.is_some());

        let registration = phase_cross_correlation(
            &Portable(reference.view()),
            &Portable(moving.view()),
            &PhaseCorrelationOptions::default(),
        )
        .unwrap();
        assert!(registration.phasediff.is_none());
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![-1.0, -1.0]);

        let mask = Array2::from_elem((8, 8), true).into_dyn();
        let masked = phase_cross_correlation_masked(
            &Portable(reference.view()),
            &Portable(moving.view()),
            mask.view(),
            None,
            &PhaseCorrelationOptions::default(),
        );
        assert!(matches!(masked, Err(Error::NotImplemented(_))));
        let disambiguated = phase_cross_correlation(
            &Portable(reference.view()),
            &Portable(moving.view()),
            &PhaseCorrelationOptions::default().disambiguate(true),
        );
        assert!(matches!(disambiguated, Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_upsampled_dft_without_upsampling_is_the_dft() {
        let data = random_volume(&[6, 6], 8).mapv(|x| Complex::new(x, 0.5 * x));
        let dft = upsampled_dft(data.view(), 6, 1, &[0.0, 0.0]);
        let expected = fftn(data.view(), &[0, 1]);
        for (a, b) in dft.iter().zip(expected.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn test_disambiguate_large_shift() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let reference = Array::from_shape_fn((20, 20), |_| rng.gen_range(-1.0..1.0));
        // the scene moved by 12 rows; uncovered rows show unrelated content
        let moving = Array::from_shape_fn((20, 20), |(i, j)| {
            if i >= 12 {
                reference[[i - 12, j]]
            } else {
                rng.gen_range(-1.0..1.0)
            }
        });
        let options = PhaseCorrelationOptions::default();
        let plain = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_eq!(plain.shift_at(&[]).unwrap(), vec![8.0, 0.0]);

        let options = PhaseCorrelationOptions::default().disambiguate(true);
        let registration = phase_cross_correlation(&reference, &moving, &options).unwrap();
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![-12.0, 0.0]);
    }

    #[test]
    fn test_disambiguate_ties_keep_the_first_corner() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let mut reference = Array2::<f64>::zeros((10, 10));
        for i in 0..10 {
            for j in 0..=i {
                let v = rng.gen_range(-1.0..1.0);
                reference[[i, j]] = v;
                reference[[j, i]] = v;
            }
        }
        // shifting by one row and column brings moving back onto reference
        let moving =
            Array2::from_shape_fn((10, 10), |(i, j)| reference[[(i + 1) % 10, (j + 1) % 10]]);
        // the one-voxel corner is skipped; the two symmetric strips tie and
        // the first of them, above the row split, wins
        let (reference, moving) = (reference.into_dyn(), moving.into_dyn());
        let shift = disambiguate_shift(reference.view(), moving.view(), &[1.0, 1.0]).unwrap();
        assert_eq!(shift, vec![-9.0, 1.0]);
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    }

    #[test]
    fn test_alignment_helpers() {
        let reference = blob(&[16, 16, 16], &[8.0, 7.5, 8.0], 2.5);
        assert!(are_volumes_aligned(&reference, &reference, 0.1, None).unwrap());
        assert!(is_translation_of(&reference, &reference, 1e-6, None).unwrap());

        let moving = shifted(&reference, &[2.0, 0.0, -1.0]);
        assert!(!are_volumes_aligned(&reference, &moving, 0.5, None).unwrap());
        assert!(is_translation_of(&reference, &moving, 1e-3, None).unwrap());

        let batch = ndarray::stack(Axis(0), &[reference.view(), moving.view()]).unwrap();
        assert!(!are_volumes_aligned(&reference, &batch, 0.5, Some(3)).unwrap());
        assert!(is_translation_of(&reference, &batch, 1e-3, Some(3)).unwrap());

        let other = random_volume(&[16, 16, 16], 10);
        assert!(!is_translation_of(&reference, &other, 1e-3, None).unwrap());
    }

    #[test]
    fn test_shape_checks() {
        let a = random_volume(&[8, 8], 11);
        let b = random_volume(&[8, 6], 12);
        assert!(matches!(
            phase_cross_correlation(&a, &b, &PhaseCorrelationOptions::default()),
            Err(Error::ShapeMismatch { .. })
        ));
        let batch = random_volume(&[3, 8, 8], 13);
        let other = random_volume(&[2, 8, 8], 14);
        assert!(matches!(
            phase_cross_correlation(
                &batch,
                &other,
                &PhaseCorrelationOptions::default().nb_spatial_dims(2)
            ),
            Err(Error::Broadcast(_, _))
        ));
    }
}
