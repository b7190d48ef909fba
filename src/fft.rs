use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{Array1, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Zip};
use num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{FftDirection, FftPlanner};
use tracing::trace;

/// Forward FFT over `axes`, unnormalized.
pub fn fftn(input: ArrayViewD<Complex<f64>>, axes: &[usize]) -> ArrayD<Complex<f64>> {
    let mut output = input.to_owned();
    fft_axes(output.view_mut(), axes, FftDirection::Forward);
    output
}

/// Inverse FFT over `axes`, scaled by `1/n` so that `ifftn(fftn(x)) == x`.
pub fn ifftn(input: ArrayViewD<Complex<f64>>, axes: &[usize]) -> ArrayD<Complex<f64>> {
    let mut output = input.to_owned();
    fft_axes(output.view_mut(), axes, FftDirection::Inverse);
    output
}

/// Forward FFT of a real array over `axes`.
pub fn fftn_real(input: ArrayViewD<f64>, axes: &[usize]) -> ArrayD<Complex<f64>> {
    let mut output = input.mapv(|x| Complex::new(x, 0.0));
    fft_axes(output.view_mut(), axes, FftDirection::Forward);
    output
}

/// In-place FFT along each of `axes` in turn.
///
/// Lanes along an axis are transformed in parallel; each worker copies its lane into
/// a contiguous buffer, so the array may have any memory layout.
pub fn fft_axes(mut input: ArrayViewMutD<Complex<f64>>, axes: &[usize], direction: FftDirection) {
    trace!(shape = ?input.shape(), ?axes, ?direction, "fft");
    let mut planner = FftPlanner::new();
    for &axis in axes {
        let len = input.len_of(Axis(axis));
        if len <= 1 {
            continue;
        }
        let fft = planner.plan_fft(len, direction);
        let normalisation = match direction {
            FftDirection::Forward => 1.0,
            FftDirection::Inverse => 1.0 / len as f64,
        };

        Zip::from(input.lanes_mut(Axis(axis)))
            .into_par_iter()
            .for_each_init(
                || {
                    (
                        vec![Zero::zero(); len],
                        vec![Zero::zero(); fft.get_inplace_scratch_len()],
                    )
                },
                |(buffer, scratch), lane| {
                    let mut lane = lane.0;
                    for (b, &x) in buffer.iter_mut().zip(lane.iter()) {
                        *b = x;
                    }
                    fft.process_with_scratch(buffer, scratch);
                    for (x, &b) in lane.iter_mut().zip(buffer.iter()) {
                        *x = b * normalisation;
                    }
                },
            );
    }
}

/// Sample frequencies of a length `n` DFT with sample spacing `d`, in cycles per unit.
///
/// `[0, 1, ..., (n - 1) / 2, -(n / 2), ..., -1] / (d * n)`
pub fn fftfreq(n: usize, d: f64) -> Array1<f64> {
    if n == 0 {
        return Array1::zeros(0);
    }
    let scale = 1.0 / (d * n as f64);
    let positive = (n - 1) / 2 + 1;
    Array1::from_shape_fn(n, |k| {
        if k < positive {
            k as f64 * scale
        } else {
            (k as f64 - n as f64) * scale
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{fftfreq, fftn, fftn_real, ifftn};
    use ndarray::{Array, ArrayD, IxDyn};
    use num_complex::Complex;

    fn assert_eq_vecs(a: &[Complex<f64>], b: &[Complex<f64>]) {
        for (a, b) in a.iter().zip(b) {
            assert!((a - b).norm() < 1e-7, "{}", (a - b).norm());
        }
    }

    #[test]
    fn test_fftn_2d() {
        let input = Array::from_shape_vec(IxDyn(&[3, 3]), vec![1., 2., 3., 4., 5., 6., 7., 8., 9.])
            .unwrap();

        let output = fftn_real(input.view(), &[0, 1]);

        let expected = [
            Complex::new(45.0, 0.),
            Complex::new(-4.5, 2.598_076_211_353_316),
            Complex::new(-4.5, -2.598_076_211_353_316),
            Complex::new(-13.5, 7.794_228_634_059_948),
            Complex::new(0.0, 0.),
            Complex::new(0.0, 0.),
            Complex::new(-13.5, -7.794_228_634_059_948),
            Complex::new(0.0, 0.),
            Complex::new(0.0, 0.),
        ];
        assert_eq_vecs(&expected, output.as_slice().unwrap());
    }

    #[test]
    fn test_inverse_fftn() {
        let input: ArrayD<Complex<f64>> = Array::from_shape_fn(IxDyn(&[4, 3, 5]), |i| {
            Complex::new((i[0] * 15 + i[1] * 5 + i[2]) as f64, i[2] as f64)
        });

        let output = ifftn(fftn(input.view(), &[0, 1, 2]).view(), &[0, 1, 2]);

        assert_eq_vecs(input.as_slice().unwrap(), output.as_slice().unwrap());
    }

    #[test]
    fn test_fft_single_axis_of_strided_view() {
        let input: ArrayD<Complex<f64>> = Array::from_shape_fn(IxDyn(&[2, 4]), |i| {
            Complex::new(i[1] as f64 + 4.0 * i[0] as f64, 0.0)
        });
        // along axis 0 the lanes are not contiguous
        let output = fftn(input.view(), &[0]);
        assert_eq_vecs(
            output.as_slice().unwrap(),
            &[
                Complex::new(4.0, 0.),
                Complex::new(6.0, 0.),
                Complex::new(8.0, 0.),
                Complex::new(10.0, 0.),
                Complex::new(-4.0, 0.),
                Complex::new(-4.0, 0.),
                Complex::new(-4.0, 0.),
                Complex::new(-4.0, 0.),
            ],
        );
    }

    #[test]
    fn test_fftfreq() {
        assert_eq!(fftfreq(4, 1.0).to_vec(), vec![0.0, 0.25, -0.5, -0.25]);
        assert_eq!(fftfreq(5, 1.0).to_vec(), vec![0.0, 0.2, 0.4, -0.4, -0.2]);
        assert_eq!(fftfreq(2, 2.0).to_vec(), vec![0.0, -0.25]);
    }
}
