//! Numerical backends.
//!
//! A [`Backend`] implements the operations for one array library. The default
//! methods are written against the portable surface only, so a backend
//! overrides what its library does natively and inherits the rest, including
//! the `NotImplemented` errors for features the portable surface lacks.

mod cpu;
mod portable;
mod tensor;

pub use cpu::NdarrayBackend;
pub use portable::PortableBackend;
pub use tensor::TensorBackend;

use crate::affine::Transform;
use crate::error::{Error, Result};
use crate::fourier::{output_shape, require_full_spectrum, shift_spectrum};
use crate::options::{AffineOptions, FourierShiftOptions, PhaseCorrelationOptions};
use crate::registration::{portable_phase_cross_correlation, Masks, Registration};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};
use num_complex::Complex;

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transforms a canonical `(batch, channel, spatial...)` input into
    /// `output`, one transform per batch element.
    fn affine_transform(
        &self,
        input: ArrayViewD<f64>,
        transforms: &[Transform],
        output: ArrayViewMutD<f64>,
        options: &AffineOptions,
    ) -> Result<()>;

    /// `shift` has shape `(broadcast..., D)`.
    fn fourier_shift(
        &self,
        input: ArrayViewD<Complex<f64>>,
        shift: ArrayViewD<f64>,
        options: &FourierShiftOptions,
    ) -> Result<ArrayD<Complex<f64>>> {
        require_full_spectrum(self.name(), options)?;
        let shape = output_shape(input.shape(), shift.shape())?;
        let mut output = ArrayD::zeros(IxDyn(&shape));
        shift_spectrum(input, shift, None, output.view_mut())?;
        Ok(output)
    }

    fn fourier_shift_into(
        &self,
        _input: ArrayViewD<Complex<f64>>,
        _shift: ArrayViewD<f64>,
        _options: &FourierShiftOptions,
        _output: ArrayViewMutD<Complex<f64>>,
    ) -> Result<()> {
        Err(Error::not_implemented(format!(
            "fourier shift into an output buffer on the {} backend",
            self.name()
        )))
    }

    fn phase_cross_correlation(
        &self,
        reference: ArrayViewD<Complex<f64>>,
        moving: ArrayViewD<Complex<f64>>,
        masks: Option<Masks>,
        options: &PhaseCorrelationOptions,
    ) -> Result<Registration> {
        portable_phase_cross_correlation(self.name(), reference, moving, masks, options)
    }
}
