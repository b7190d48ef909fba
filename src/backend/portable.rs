use super::Backend;
use crate::affine::{affine_slices, Transform};
use crate::error::Result;
use crate::options::AffineOptions;
use ndarray::{ArrayViewD, ArrayViewMutD};

/// Backend for arrays that only expose the portable array surface.
///
/// Everything beyond the affine transform comes from the trait defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortableBackend;

impl Backend for PortableBackend {
    fn name(&self) -> &'static str {
        "portable"
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
}

#[cfg(test)]
mod tests {
    use crate::affine::affine_transform;
    use crate::namespace::Portable;
    use crate::options::{AffineOptions, Mode};
    use ndarray::{arr2, Array, Array2};

    #[test]
    fn test_affine_matches_ndarray() {
        let volume = Array::from_shape_fn((6, 5), |(i, j)| ((i * 5 + j) as f64).sin());
        let matrix = arr2(&[[0.8, 0.1], [-0.1, 1.2]]);
        let options = AffineOptions::default().mode(Mode::Reflect);
        let native = affine_transform(&volume, &matrix, vec![0.3, -0.2], None, &options).unwrap();
        let portable = affine_transform(
            &Portable(volume.view()),
            &Portable(matrix.view()),
            vec![0.3, -0.2],
            None,
            &options,
        )
        .unwrap();
        assert_eq!(native, portable);

        let ones = Array2::<f64>::ones((4, 4));
        let eye = Array2::<f64>::eye(2);
        let options = options.order(1);
        let out = affine_transform(&Portable(&ones), &Portable(&eye), 0.0, None, &options).unwrap();
        assert_eq!(out, ones.into_dyn());
    }
}
