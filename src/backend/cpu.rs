use super::Backend;
use crate::affine::{affine_slices, Transform};
use crate::error::Result;
use crate::fourier::{output_shape, real_fft_axis, shift_spectrum};
use crate::masked::masked_registration;
use crate::options::{AffineOptions, FourierShiftOptions, PhaseCorrelationOptions};
use crate::registration::{
    cross_correlation_peak, disambiguate_shift, portable_phase_cross_correlation, real_space, Masks,
    Peak, Problem, Registration,
};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};
use num_complex::Complex;

/// Reference backend on plain `ndarray` arrays, with every feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct NdarrayBackend;

impl Backend for NdarrayBackend {
    fn name(&self) -> &'static str {
        "ndarray"
    }

    fn affine_transform(
        &self,
        input: ArrayViewD<f64>,
        transforms: &[Transform],
        output: ArrayViewMutD<f64>,
        options: &AffineOptions,
    ) -> Result<()> {
        affine_slices(input, transforms, output, options)
    }

    fn fourier_shift(
        &self,
        input: ArrayViewD<Complex<f64>>,
        shift: ArrayViewD<f64>,
        options: &FourierShiftOptions,
    ) -> Result<ArrayD<Complex<f64>>> {
        let shape = output_shape(input.shape(), shift.shape())?;
        let mut output = ArrayD::zeros(IxDyn(&shape));
        self.fourier_shift_into(input, shift, options, output.view_mut())?;
        Ok(output)
    }

    fn fourier_shift_into(
        &self,
        input: ArrayViewD<Complex<f64>>,
        shift: ArrayViewD<f64>,
        options: &FourierShiftOptions,
        output: ArrayViewMutD<Complex<f64>>,
    ) -> Result<()> {
        output_shape(input.shape(), shift.shape())?;
        let d = shift.shape()[shift.ndim() - 1];
        let real_axis = real_fft_axis(options, d)?;
        shift_spectrum(input, shift, real_axis, output)
    }

    fn phase_cross_correlation(
        &self,
        reference: ArrayViewD<Complex<f64>>,
        moving: ArrayViewD<Complex<f64>>,
        masks: Option<Masks>,
        options: &PhaseCorrelationOptions,
    ) -> Result<Registration> {
        // channels are only combined on the portable path
        if options.multichannel {
            return portable_phase_cross_correlation(self.name(), reference, moving, masks, options);
        }
        let problem = Problem::new(reference.view(), moving.view(), options)?;
        match masks {
            Some(masks) => problem.run(|reference, moving| {
                let shift = masked_registration(
                    real_space(reference, options.space).view(),
                    real_space(moving, options.space).view(),
                    masks.reference.clone(),
                    masks.moving.clone(),
                    options.overlap_ratio,
                )?;
                Ok(Peak {
                    shift,
                    error: f64::NAN,
                    phasediff: f64::NAN,
                })
            }),
            None => problem.run(|reference, moving| {
                let mut peak = cross_correlation_peak(reference.clone(), moving.clone(), options);
                if options.disambiguate {
                    peak.shift = disambiguate_shift(
                        real_space(reference, options.space).view(),
                        real_space(moving, options.space).view(),
                        &peak.shift,
                    )?;
                }
                Ok(peak)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::registration::phase_cross_correlation_masked;
    use crate::options::PhaseCorrelationOptions;
    use ndarray::{Array, Array2, Array3, Axis};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_masked_registration_through_backend() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let reference = Array::from_shape_fn((24, 24), |_| rng.gen_range(0.0..1.0));
        // moving[i, j] = reference[i + 2, j - 4], unknown content elsewhere
        let mut moving = Array::from_shape_fn((24, 24), |_| rng.gen_range(0.0..1.0));
        let mut moving_mask = Array2::from_elem((24, 24), false);
        for i in 0..22 {
            for j in 4..24 {
                moving[[i, j]] = reference[[i + 2, j - 4]];
                moving_mask[[i, j]] = true;
            }
        }
        let reference_mask = Array2::from_elem((24, 24), true).into_dyn();
        let moving_mask = moving_mask.into_dyn();

        let registration = phase_cross_correlation_masked(
            &reference,
            &moving,
            reference_mask.view(),
            Some(moving_mask.view()),
            &PhaseCorrelationOptions::default(),
        )
        .unwrap();
        assert_eq!(registration.shift_at(&[]).unwrap(), vec![2.0, -4.0]);
        assert!(registration.error_at(&[]).unwrap().is_nan());
        assert!(registration.phasediff.unwrap().iter().all(|p| p.is_nan()));

        // the same masks apply to every broadcast element
        let batch: Array3<f64> = ndarray::stack(Axis(0), &[moving.view(), moving.view()]).unwrap();
        let batched = phase_cross_correlation_masked(
            &reference,
            &batch,
            reference_mask.view(),
            Some(moving_mask.view()),
            &PhaseCorrelationOptions::default().nb_spatial_dims(2),
        )
        .unwrap();
        assert_eq!(batched.shift.shape(), &[2, 2]);
        assert_eq!(batched.shift_at(&[1]).unwrap(), vec![2.0, -4.0]);
    }
}
