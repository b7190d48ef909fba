//! Fourier-domain shift with broadcasting.

use crate::dtype::Spectral;
use crate::error::{Error, Result};
use crate::fft::fftfreq;
use crate::layout::{
    broadcast_shapes, broadcast_subview, normalize_axis, par_indexed_for_each, subview_mut,
};
use crate::namespace::{coerce, resolve, ArrayNamespace};
use crate::options::FourierShiftOptions;
use ndarray::{
    indices, Array1, Array2, ArrayBase, ArrayD, ArrayViewD, ArrayViewMutD, DataMut, Dimension,
    IxDyn,
};
use num_complex::Complex;
use std::f64::consts::PI;
use tracing::trace;

/// Shift handed to [`fourier_shift`].
#[derive(Clone, Debug, PartialEq)]
pub enum Shift {
    /// Same shift along every axis of the input.
    Uniform(f64),
    /// One value per spatial axis; the spatial axes are the trailing ones.
    PerAxis(Vec<f64>),
    /// Shape `(broadcast..., D)`, broadcast against the input's leading axes.
    Batched(ArrayD<f64>),
}

impl From<f64> for Shift {
    fn from(shift: f64) -> Self {
        Shift::Uniform(shift)
    }
}

impl From<Vec<f64>> for Shift {
    fn from(shift: Vec<f64>) -> Self {
        Shift::PerAxis(shift)
    }
}

impl From<&[f64]> for Shift {
    fn from(shift: &[f64]) -> Self {
        Shift::PerAxis(shift.to_vec())
    }
}

impl From<Array1<f64>> for Shift {
    fn from(shift: Array1<f64>) -> Self {
        Shift::PerAxis(shift.to_vec())
    }
}

impl From<Array2<f64>> for Shift {
    fn from(shift: Array2<f64>) -> Self {
        Shift::Batched(shift.into_dyn())
    }
}

impl From<ArrayD<f64>> for Shift {
    fn from(shift: ArrayD<f64>) -> Self {
        Shift::Batched(shift)
    }
}

impl Shift {
    /// The shift as an array of shape `(broadcast..., D)`.
    pub fn to_array(&self, input_ndim: usize) -> Result<ArrayD<f64>> {
        let array = match self {
            Shift::Uniform(s) => ArrayD::from_elem(IxDyn(&[input_ndim]), *s),
            Shift::PerAxis(v) => ArrayD::from_shape_vec(IxDyn(&[v.len()]), v.clone())?,
            Shift::Batched(a) => a.clone(),
        };
        match array.shape().last() {
            Some(&d) if d >= 1 && d <= input_ndim => Ok(array),
            _ => Err(Error::precondition(format!(
                "shift of shape {:?} does not fit an input with {} axes",
                array.shape(),
                input_ndim
            ))),
        }
    }
}

/// Shape of the result of shifting `input` by `shift`.
pub(crate) fn output_shape(input: &[usize], shift: &[usize]) -> Result<Vec<usize>> {
    let d = *shift.last().unwrap_or(&0);
    if d == 0 || d > input.len() {
        return Err(Error::precondition(format!(
            "shift of shape {:?} does not fit an input of shape {:?}",
            shift, input
        )));
    }
    let split = input.len() - d;
    let mut shape = broadcast_shapes(&input[..split], &shift[..shift.len() - 1])?;
    shape.extend_from_slice(&input[split..]);
    Ok(shape)
}

/// Multiplies `input` by the phase ramp of `shift` into `output`.
///
/// `real_axis` is `(axis, n)` when the input along that spatial axis is the
/// half spectrum of a real FFT of length `n`.
pub(crate) fn shift_spectrum(
    input: ArrayViewD<Complex<f64>>,
    shift: ArrayViewD<f64>,
    real_axis: Option<(usize, usize)>,
    mut output: ArrayViewMutD<Complex<f64>>,
) -> Result<()> {
    let shape = output_shape(input.shape(), shift.shape())?;
    if output.shape() != &shape[..] {
        return Err(Error::shape_mismatch(&shape, output.shape()));
    }
    let d = shift.shape()[shift.ndim() - 1];
    let lead = &shape[..shape.len() - d];
    let spatial = &shape[shape.len() - d..];
    trace!(?lead, ?spatial, ?real_axis, "fourier shift");

    let (input_leading, shift_leading) = (input.ndim() - d, shift.ndim() - 1);
    let frequencies: Vec<Array1<f64>> = spatial
        .iter()
        .enumerate()
        .map(|(a, &len)| match real_axis {
            Some((axis, n)) if axis == a => Array1::from_shape_fn(len, |k| k as f64 / n as f64),
            _ => fftfreq(len, 1.0),
        })
        .collect();

    for index in indices(lead) {
        let index = index.slice();
        let s = broadcast_subview(shift.clone(), shift_leading, index);
        let x = broadcast_subview(input.clone(), input_leading, index);
        let out = subview_mut(output.view_mut(), index);
        par_indexed_for_each(
            out,
            || (),
            |_, voxel, o| {
                let phase: f64 = frequencies
                    .iter()
                    .zip(s.iter())
                    .enumerate()
                    .map(|(a, (f, &s))| f[voxel[a]] * s)
                    .sum();
                *o = x[voxel] * Complex::from_polar(1.0, -2.0 * PI * phase);
            },
        );
    }
    Ok(())
}

/// Rejects the real-FFT parameters on backends that only handle full spectra.
pub(crate) fn require_full_spectrum(backend: &str, options: &FourierShiftOptions) -> Result<()> {
    if options.n.is_some() {
        return Err(Error::not_implemented(format!(
            "fourier shift of a real FFT (n) on the {} backend",
            backend
        )));
    }
    if options.axis != -1 {
        return Err(Error::not_implemented(format!(
            "fourier shift along axis {} on the {} backend",
            options.axis, backend
        )));
    }
    Ok(())
}

/// Resolves `options` into the `(axis, n)` of a real FFT input, if any.
pub(crate) fn real_fft_axis(
    options: &FourierShiftOptions,
    spatial_ndim: usize,
) -> Result<Option<(usize, usize)>> {
    match options.n {
        None => Ok(None),
        Some(0) => Err(Error::precondition("real FFT length n must be positive")),
        Some(n) => Ok(Some((normalize_axis(options.axis, spatial_ndim)?, n))),
    }
}

fn prepare<A, T>(input: &A, shift: Shift) -> Result<(ArrayD<Complex<f64>>, ArrayD<f64>)>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Spectral,
{
    let input = coerce(input)?.mapv(T::to_complex);
    let shift = shift.to_array(input.ndim())?;
    Ok((input, shift))
}

/// Shifts a spectrum by multiplying it with `exp(-2πi f·shift)`.
///
/// `input` is a frequency-domain array whose trailing `D` axes are spatial,
/// `D` being the length of the shift vector. A [`Shift::Batched`] shift of
/// shape `(broadcast..., D)` is broadcast against the input's leading axes and
/// the result has shape `(broadcast..., spatial...)`.
pub fn fourier_shift<A, T>(
    input: &A,
    shift: impl Into<Shift>,
    options: &FourierShiftOptions,
) -> Result<ArrayD<Complex<f64>>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Spectral,
{
    let backend = resolve(&[input.namespace()]);
    let (input, shift) = prepare(input, shift.into())?;
    backend.fourier_shift(input.view(), shift.view(), options)
}

/// Same as [`fourier_shift`], writing into `output`.
pub fn fourier_shift_into<A, T, S, D>(
    input: &A,
    shift: impl Into<Shift>,
    output: &mut ArrayBase<S, D>,
    options: &FourierShiftOptions,
) -> Result<()>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Spectral,
    S: DataMut<Elem = Complex<f64>>,
    D: Dimension,
{
    let backend = resolve(&[input.namespace()]);
    let (input, shift) = prepare(input, shift.into())?;
    backend.fourier_shift_into(input.view(), shift.view(), options, output.view_mut().into_dyn())
}
