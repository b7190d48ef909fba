use super::Backend;
use crate::affine::Transform;
use crate::error::{Error, Result};
use crate::options::{AffineOptions, Mode};
use crate::spline::map_coordinate;
use crate::layout::par_indexed_for_each;
use ndarray::{ArrayViewD, ArrayViewMutD};
use tracing::trace;

/// Batch-vectorized backend with bilinear/trilinear sampling only.
///
/// Samples like a tensor `grid_sample` with aligned corners: the whole
/// `(batch, channel, spatial...)` output is produced in one parallel pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct TensorBackend;

impl TensorBackend {
    fn check(&self, spatial_dims: usize, options: &AffineOptions) -> Result<()> {
        if options.order != 1 {
            return Err(Error::unsupported(
                self.name(),
                format!("interpolation order {} (only 1)", options.order),
            ));
        }
        if !matches!(options.mode, Mode::Constant | Mode::Nearest | Mode::Reflect) {
            return Err(Error::unsupported(
                self.name(),
                format!("boundary mode '{}' (only constant, nearest and reflect)", options.mode),
            ));
        }
        if options.cval != 0.0 {
            return Err(Error::unsupported(self.name(), format!("cval {} (only 0)", options.cval)));
        }
        if !(2..=3).contains(&spatial_dims) {
            return Err(Error::unsupported(
                self.name(),
                format!("{} spatial axes (only 2 or 3)", spatial_dims),
            ));
        }
        Ok(())
    }
}

impl Backend for TensorBackend {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn affine_transform(
        &self,
        input: ArrayViewD<f64>,
        transforms: &[Transform],
        output: ArrayViewMutD<f64>,
        options: &AffineOptions,
    ) -> Result<()> {
        let d = input.ndim() - 2;
        self.check(d, options)?;
        trace!(
            input = ?input.shape(),
            output = ?output.shape(),
            mode = %options.mode,
            "tensor affine transform"
        );
        let mode = options.mode;
        par_indexed_for_each(
            output,
            || vec![0.0; d],
            |coordinate, index, value| {
                transforms[index[0]].map(&index[2..], coordinate);
                *value = sample_linear(&input, index[0], index[1], coordinate, mode);
            },
        );
        Ok(())
    }
}

/// Multilinear sample of slice `(b, c)` at `coordinate`.
fn sample_linear(
    input: &ArrayViewD<f64>,
    b: usize,
    c: usize,
    coordinate: &[f64],
    mode: Mode,
) -> f64 {
    let d = coordinate.len();
    let spatial = &input.shape()[2..];
    let mut lower = [0isize; 3];
    let mut fraction = [0.0; 3];
    for a in 0..d {
        let n = spatial[a];
        let x = match mode {
            Mode::Nearest => coordinate[a].max(0.0).min(n as f64 - 1.0),
            Mode::Reflect => map_coordinate(coordinate[a], n, Mode::Mirror).unwrap_or(0.0),
            _ => coordinate[a],
        };
        let floor = x.floor();
        lower[a] = floor as isize;
        fraction[a] = x - floor;
    }

    let mut index = [b, c, 0, 0, 0];
    let mut total = 0.0;
    'corners: for corner in 0..(1usize << d) {
        let mut weight = 1.0;
        for a in 0..d {
            let upper = corner >> a & 1 == 1;
            let w = if upper { fraction[a] } else { 1.0 - fraction[a] };
            if w == 0.0 {
                continue 'corners;
            }
            let i = lower[a] + upper as isize;
            if i < 0 || i >= spatial[a] as isize {
                // zero padding
                continue 'corners;
            }
            weight *= w;
            index[a + 2] = i as usize;
        }
        total += weight * input[&index[..d + 2]];
    }
    total
}

#[cfg(test)]
mod tests {
    use crate::affine::affine_transform;
    use crate::error::Error;
    use crate::namespace::Tensor;
    use crate::options::{AffineOptions, Mode};
    use ndarray::{arr2, Array, Array2, Array3, ArrayD, IxDyn};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_volume(shape: &[usize], seed: u64) -> ArrayD<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array::from_shape_fn(IxDyn(shape), |_| rng.gen_range(0.0..1.0))
    }

    #[test]
    fn test_linear_matches_ndarray_inside_grid() {
        let volume = random_volume(&[2, 3, 9, 8], 0);
        let matrix = arr2(&[[0.9, 0.05], [-0.05, 0.9]]);
        for &mode in &[Mode::Constant, Mode::Nearest, Mode::Reflect] {
            let options = AffineOptions::default()
                .order(1)
                .mode(mode)
                .batch(true)
                .multichannel(true);
            let offset = vec![0.4, 0.5];
            let tensor =
                affine_transform(&Tensor(volume.view()), &matrix, offset.clone(), None, &options);
            let tensor = tensor.unwrap();
            let reference = affine_transform(&volume, &matrix, offset, None, &options).unwrap();
            // both sample inside the grid for this transform
            for (a, b) in tensor.iter().zip(reference.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_boundaries() {
        let volume = Array::from_shape_fn((4, 4), |(i, j)| (i * 4 + j) as f64 + 1.0);
        let shift = |mode: Mode, offset: Vec<f64>| {
            affine_transform(
                &Tensor(volume.view()),
                &Array2::<f64>::eye(2),
                offset,
                None,
                &AffineOptions::default().order(1).mode(mode),
            )
            .unwrap()
        };
        // half a voxel past the last row
        let constant = shift(Mode::Constant, vec![0.5, 0.0]);
        assert!((constant[[3, 0]] - 0.5 * 13.0).abs() < 1e-12);
        let nearest = shift(Mode::Nearest, vec![0.5, 0.0]);
        assert!((nearest[[3, 0]] - 13.0).abs() < 1e-12);
        // 3.5 mirrors to 2.5 about the edge sample
        let reflect = shift(Mode::Reflect, vec![0.5, 0.0]);
        assert!((reflect[[3, 0]] - 0.5 * (9.0 + 13.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unsupported_requests() {
        let volume = Array3::<f64>::zeros((4, 4, 4));
        let eye = Array2::<f64>::eye(3);
        let t = Tensor(volume.view());
        let unsupported = |options: AffineOptions| {
            matches!(
                affine_transform(&t, &eye, 0.0, None, &options),
                Err(Error::Unsupported { backend: "tensor", .. })
            )
        };
        assert!(unsupported(AffineOptions::default()));
        assert!(unsupported(AffineOptions::default().order(1).mode(Mode::Wrap)));
        assert!(unsupported(AffineOptions::default().order(1).cval(1.0)));
        assert!(!unsupported(AffineOptions::default().order(1)));

        let line = Array::from_elem(IxDyn(&[8]), 1.0);
        assert!(matches!(
            affine_transform(
                &Tensor(line.view()),
                &arr2(&[[1.0]]),
                0.0,
                None,
                &AffineOptions::default().order(1)
            ),
            Err(Error::Unsupported { .. })
        ));
    }
}
