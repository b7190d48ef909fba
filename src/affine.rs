//! Batched, multichannel affine transforms.
//!
//! Given an output voxel index `o`, the value is sampled from the input at
//! `matrix · o + offset`, so the matrix maps output coordinates to input
//! coordinates.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::layout::{par_indexed_for_each, Layout};
use crate::namespace::{coerce, resolve, ArrayNamespace};
use crate::options::AffineOptions;
use crate::spline::{check_order, AxisTaps, Interpolator};
use ndarray::{
    Array1, Array2, ArrayBase, ArrayD, ArrayViewD, ArrayViewMutD, Axis, DataMut, Dimension, IxDyn,
    Zip,
};
use tracing::trace;

/// Offset added to the mapped coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum Offset {
    /// Same offset along every axis.
    Scalar(f64),
    /// One value per spatial axis.
    PerAxis(Vec<f64>),
    /// One row of per-axis values for each batch element, shape `(batch, d)`.
    PerBatch(Array2<f64>),
}

impl Default for Offset {
    fn default() -> Self {
        Offset::Scalar(0.0)
    }
}

impl From<f64> for Offset {
    fn from(offset: f64) -> Self {
        Offset::Scalar(offset)
    }
}

impl From<Vec<f64>> for Offset {
    fn from(offset: Vec<f64>) -> Self {
        Offset::PerAxis(offset)
    }
}

impl From<&[f64]> for Offset {
    fn from(offset: &[f64]) -> Self {
        Offset::PerAxis(offset.to_vec())
    }
}

impl From<Array1<f64>> for Offset {
    fn from(offset: Array1<f64>) -> Self {
        Offset::PerAxis(offset.to_vec())
    }
}

impl From<Array2<f64>> for Offset {
    fn from(offset: Array2<f64>) -> Self {
        Offset::PerBatch(offset)
    }
}

impl Offset {
    fn for_element(&self, index: usize, d: usize, batch: usize) -> Result<Vec<f64>> {
        match self {
            Offset::Scalar(s) => Ok(vec![*s; d]),
            Offset::PerAxis(v) => {
                if v.len() != d {
                    return Err(Error::shape_mismatch(&[d], &[v.len()]));
                }
                Ok(v.clone())
            }
            Offset::PerBatch(a) => {
                if a.ncols() != d || (a.nrows() != batch && a.nrows() != 1) {
                    return Err(Error::shape_mismatch(&[batch, d], a.shape()));
                }
                let row = if a.nrows() == 1 { 0 } else { index };
                Ok(a.row(row).to_vec())
            }
        }
    }
}

/// Coordinate map of one batch element: `input = matrix · output + offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub matrix: Array2<f64>,
    pub offset: Array1<f64>,
}

impl Transform {
    /// Builds a transform from a `(d,)`, `(d, d)`, `(d + 1, d + 1)` or `(d, d + 1)` matrix.
    ///
    /// `offset` is ignored for the homogeneous forms.
    pub fn from_matrix(matrix: ArrayViewD<f64>, offset: &[f64]) -> Result<Self> {
        let d = offset.len();
        let shape = matrix.shape().to_vec();
        match shape[..] {
            [n] if n == d => Ok(Transform {
                matrix: Array2::from_diag(&matrix.into_dimensionality::<ndarray::Ix1>()?),
                offset: Array1::from(offset.to_vec()),
            }),
            [r, c] if r == d && c == d => Ok(Transform {
                matrix: matrix.into_dimensionality::<ndarray::Ix2>()?.to_owned(),
                offset: Array1::from(offset.to_vec()),
            }),
            [r, c] if (r == d || r == d + 1) && c == d + 1 => {
                let matrix = matrix.into_dimensionality::<ndarray::Ix2>()?;
                Ok(Transform {
                    matrix: matrix.slice(ndarray::s![..d, ..d]).to_owned(),
                    offset: matrix.slice(ndarray::s![..d, d]).to_owned(),
                })
            }
            _ => Err(Error::precondition(format!(
                "matrix of shape {:?} is not a transform of {} spatial axes",
                shape, d
            ))),
        }
    }

    /// Input coordinate of the output voxel `output`.
    pub fn map(&self, output: &[usize], input: &mut [f64]) {
        for (a, c) in input.iter_mut().enumerate() {
            let row = self.matrix.row(a);
            *c = self.offset[a]
                + row
                    .iter()
                    .zip(output.iter())
                    .map(|(m, &o)| m * o as f64)
                    .sum::<f64>();
        }
    }
}

/// Builds one transform per batch element from the caller's matrix and offset.
///
/// With `batched` the matrix carries a leading batch axis; a batch of one
/// broadcasts to the whole input batch.
pub(crate) fn batch_transforms(
    matrix: ArrayViewD<f64>,
    offset: &Offset,
    d: usize,
    batch: usize,
    batched: bool,
) -> Result<Vec<Transform>> {
    let elements: Vec<ArrayViewD<f64>> = if batched {
        if matrix.ndim() < 2 {
            return Err(Error::precondition(format!(
                "batched matrix must have a leading batch axis, got shape {:?}",
                matrix.shape()
            )));
        }
        matrix.axis_iter(Axis(0)).collect()
    } else {
        vec![matrix.view()]
    };
    if elements.len() != batch && elements.len() != 1 {
        return Err(Error::precondition(format!(
            "matrix batch of {} does not match input batch of {}",
            elements.len(),
            batch
        )));
    }

    (0..batch)
        .map(|i| {
            let element = if elements.len() == 1 { &elements[0] } else { &elements[i] };
            Transform::from_matrix(element.clone(), &offset.for_element(i, d, batch)?)
        })
        .collect()
}

/// Reference implementation: one `(batch, channel)` slice at a time.
pub(crate) fn affine_slices(
    input: ArrayViewD<f64>,
    transforms: &[Transform],
    mut output: ArrayViewMutD<f64>,
    options: &AffineOptions,
) -> Result<()> {
    check_order(options.order)?;
    let (batch, channels) = (input.shape()[0], input.shape()[1]);
    trace!(
        batch,
        channels,
        input = ?&input.shape()[2..],
        output = ?&output.shape()[2..],
        order = options.order,
        mode = %options.mode,
        "affine transform"
    );
    for b in 0..batch {
        for c in 0..channels {
            let slice = input.index_axis(Axis(0), b).index_axis_move(Axis(0), c);
            let interpolator = Interpolator::new(
                slice,
                options.order,
                options.mode,
                options.cval,
                options.prefilter,
            )?;
            let out = output.index_axis_mut(Axis(0), b).index_axis_move(Axis(0), c);
            transform_slice(&interpolator, &transforms[b], out);
        }
    }
    Ok(())
}

fn transform_slice(interpolator: &Interpolator, transform: &Transform, output: ArrayViewMutD<f64>) {
    let d = interpolator.ndim();
    par_indexed_for_each(
        output,
        || (vec![0.0; d], vec![AxisTaps::default(); d]),
        |(coordinate, taps), index, value| {
            transform.map(index, coordinate);
            *value = interpolator.sample(coordinate, taps);
        },
    );
}

struct Prepared {
    input: ArrayD<f64>,
    transforms: Vec<Transform>,
    layout: Layout,
}

fn prepare<A, M, T>(
    input: &A,
    matrix: &M,
    offset: Offset,
    options: &AffineOptions,
) -> Result<Prepared>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    M: ArrayNamespace + ?Sized,
    M::Elem: Element,
    T: Element,
{
    let dtype = <M::Elem as Element>::DTYPE;
    if !dtype.is_real_floating() {
        return Err(Error::precondition(format!(
            "matrix dtype must be a real floating dtype (float32, float64), got {}",
            dtype
        )));
    }
    let layout = Layout::new(options.batch, options.multichannel);
    let input = coerce(input)?;
    let d = layout.spatial(input.shape())?.len();
    let input = layout.canonical(input).mapv(T::to_f64);
    let matrix = coerce(matrix)?.mapv(<M::Elem as Element>::to_f64);
    let transforms = batch_transforms(matrix.view(), &offset, d, input.shape()[0], options.batch)?;
    Ok(Prepared {
        input,
        transforms,
        layout,
    })
}

/// Applies an affine transform to `input`, returning a new array.
///
/// `input` has shape `(spatial...)`, prefixed with a batch axis if
/// `options.batch` and a channel axis if `options.multichannel`. `matrix` maps
/// output coordinates to input coordinates and must have a real floating
/// element type; see [`Transform::from_matrix`] for the accepted shapes. With
/// `options.batch` it carries a leading batch axis too.
///
/// The result has `output_shape` spatial axes (the input's by default) and the
/// same leading axes and element type as `input`.
pub fn affine_transform<A, M, T>(
    input: &A,
    matrix: &M,
    offset: impl Into<Offset>,
    output_shape: Option<&[usize]>,
    options: &AffineOptions,
) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    M: ArrayNamespace + ?Sized,
    M::Elem: Element,
    T: Element,
{
    let backend = resolve(&[input.namespace(), matrix.namespace()]);
    let prepared = prepare(input, matrix, offset.into(), options)?;
    let shape = prepared.input.shape();
    let spatial = output_shape.unwrap_or(&shape[2..]);
    if spatial.len() != shape.len() - 2 {
        return Err(Error::shape_mismatch(&shape[2..], spatial));
    }
    let mut output_dims = vec![shape[0], shape[1]];
    output_dims.extend_from_slice(spatial);

    let mut output = ArrayD::<f64>::zeros(IxDyn(&output_dims));
    backend.affine_transform(
        prepared.input.view(),
        &prepared.transforms,
        output.view_mut(),
        options,
    )?;
    Ok(prepared.layout.strip(output.mapv(T::from_f64)))
}

/// Same as [`affine_transform`], writing into `output` whose spatial shape gives
/// the output shape.
pub fn affine_transform_into<A, M, T, S, D>(
    input: &A,
    matrix: &M,
    offset: impl Into<Offset>,
    output: &mut ArrayBase<S, D>,
    options: &AffineOptions,
) -> Result<()>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    M: ArrayNamespace + ?Sized,
    M::Elem: Element,
    T: Element,
    S: DataMut<Elem = T>,
    D: Dimension,
{
    let backend = resolve(&[input.namespace(), matrix.namespace()]);
    let prepared = prepare(input, matrix, offset.into(), options)?;
    let mut target = prepared.layout.canonical_mut(output.view_mut().into_dyn());
    let shape = prepared.input.shape();
    if target.ndim() != shape.len() || target.shape()[..2] != shape[..2] {
        return Err(Error::shape_mismatch(&shape[..2], &target.shape()[..2.min(target.ndim())]));
    }

    let mut result = ArrayD::<f64>::zeros(target.raw_dim());
    backend.affine_transform(
        prepared.input.view(),
        &prepared.transforms,
        result.view_mut(),
        options,
    )?;
    Zip::from(&mut target)
        .and(&result)
        .for_each(|t, &r| *t = T::from_f64(r));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Mode;
    use ndarray::{arr1, arr2, Array, Array3};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_volume(shape: &[usize], seed: u64) -> ArrayD<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array::from_shape_fn(IxDyn(shape), |_| rng.gen_range(0.0..1.0))
    }

    fn assert_close(a: &ArrayD<f64>, b: &ArrayD<f64>, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_identity_is_noop() {
        let volume = random_volume(&[6, 7, 5], 0);
        let identity = Array2::<f64>::eye(3);
        let options = AffineOptions::default().order(1);
        let out = affine_transform(&volume, &identity, 0.0, None, &options).unwrap();
        assert_close(&out, &volume, 1e-12);

        for order in 0..=5 {
            let options = AffineOptions::default().order(order).mode(Mode::Mirror);
            let out = affine_transform(&volume, &identity, 0.0, None, &options).unwrap();
            assert_close(&out, &volume, 1e-8);
        }
    }

    #[test]
    fn test_integer_matrix_rejected() {
        let volume = random_volume(&[4, 4], 1);
        let identity = arr2(&[[1i64, 0], [0, 1]]);
        let err =
            affine_transform(&volume, &identity, 0.0, None, &AffineOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_matrix_forms_agree() {
        let volume = random_volume(&[5, 6], 2);
        let options = AffineOptions::default().order(1);
        let full = arr2(&[[0.9, 0.0], [0.0, 1.1]]);
        let diagonal = arr1(&[0.9, 1.1]);
        let homogeneous = arr2(&[[0.9, 0.0, 0.5], [0.0, 1.1, -0.25], [0.0, 0.0, 1.0]]);
        let truncated = arr2(&[[0.9, 0.0, 0.5], [0.0, 1.1, -0.25]]);

        let a = affine_transform(&volume, &full, vec![0.5, -0.25], None, &options).unwrap();
        let b = affine_transform(&volume, &diagonal, vec![0.5, -0.25], None, &options).unwrap();
        // the offset is ignored for homogeneous matrices
        let c = affine_transform(&volume, &homogeneous, 7.0, None, &options).unwrap();
        let d = affine_transform(&volume, &truncated, 0.0, None, &options).unwrap();
        assert_close(&a, &b, 1e-12);
        assert_close(&a, &c, 1e-12);
        assert_close(&a, &d, 1e-12);
    }

    #[test]
    fn test_integer_shift_moves_voxels() {
        let mut volume = Array3::<f64>::zeros((5, 5, 5));
        volume[[2, 2, 2]] = 1.0;
        let options = AffineOptions::default().order(1);
        let matrix = Array2::<f64>::eye(3);
        let out = affine_transform(&volume, &matrix, vec![-1.0, 0.0, 1.0], None, &options).unwrap();
        // output voxel o samples the input at o + offset
        assert!((out[[3, 2, 1]] - 1.0).abs() < 1e-12);
        assert!((out.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_batch_and_channels_keep_leading_axes() {
        let volume = random_volume(&[3, 2, 4, 5], 3);
        let options = AffineOptions::default().order(1).batch(true).multichannel(true);
        let matrices = Array::from_shape_fn((1, 2, 2), |(_, i, j)| if i == j { 1.0 } else { 0.0 });
        let out = affine_transform(&volume, &matrices, 0.0, Some(&[6, 5]), &options).unwrap();
        assert_eq!(out.shape(), &[3, 2, 6, 5]);
        assert_close(
            &out.slice(ndarray::s![.., .., ..4, ..]).to_owned().into_dyn(),
            &volume,
            1e-12,
        );
        assert!(out.slice(ndarray::s![.., .., 4.., ..]).iter().all(|&v| v == 0.0));

        let wrong = Array::<f64, _>::zeros((2, 2, 2));
        assert!(affine_transform(&volume, &wrong, 0.0, None, &options).is_err());
    }

    #[test]
    fn test_per_batch_offset() {
        let volume = random_volume(&[2, 6, 6], 4);
        let options = AffineOptions::default().order(1).batch(true).mode(Mode::GridWrap);
        let matrices = Array::from_shape_fn((2, 2, 2), |(_, i, j)| if i == j { 1.0 } else { 0.0 });
        let offsets = arr2(&[[0.0, 0.0], [1.0, 0.0]]);
        let out = affine_transform(&volume, &matrices, offsets, None, &options).unwrap();
        for i in 0..6 {
            for j in 0..6 {
                assert!((out[[0, i, j]] - volume[[0, i, j]]).abs() < 1e-12);
                assert!((out[[1, i, j]] - volume[[1, (i + 1) % 6, j]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_integer_volume_is_rounded() {
        let volume = arr1(&[0u8, 10, 20, 255]);
        let options = AffineOptions::default().order(1);
        let out = affine_transform(&volume, &arr1(&[1.0]), 0.5, None, &options).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[5, 15, 138, 0]);
    }

    #[test]
    fn test_into_writes_buffer() {
        let volume = random_volume(&[4, 4], 5);
        let mut out = Array2::<f64>::from_elem((3, 3), f64::NAN);
        affine_transform_into(
            &volume,
            &Array2::<f64>::eye(2),
            0.0,
            &mut out,
            &AffineOptions::default().order(1),
        )
        .unwrap();
        for ((i, j), &v) in out.indexed_iter() {
            assert!((v - volume[[i, j]]).abs() < 1e-12);
        }
    }
}
