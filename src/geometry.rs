//! Whole-volume geometric operations built on [`affine_transform`].

use crate::affine::affine_transform;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::namespace::{coerce, ArrayNamespace, Undeclared};
use crate::options::{AffineOptions, Mode};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayD, Dimension, IxDyn, Slice};

/// Per-axis scale factors of [`resample`].
#[derive(Clone, Debug, PartialEq)]
pub enum Sampling {
    Uniform(f64),
    PerAxis(Vec<f64>),
}

impl From<f64> for Sampling {
    fn from(sampling: f64) -> Self {
        Sampling::Uniform(sampling)
    }
}

impl From<Vec<f64>> for Sampling {
    fn from(sampling: Vec<f64>) -> Self {
        Sampling::PerAxis(sampling)
    }
}

impl From<&[f64]> for Sampling {
    fn from(sampling: &[f64]) -> Self {
        Sampling::PerAxis(sampling.to_vec())
    }
}

impl Sampling {
    fn per_axis(&self, d: usize) -> Result<Vec<f64>> {
        let factors = match self {
            Sampling::Uniform(s) => vec![*s; d],
            Sampling::PerAxis(v) if v.len() == d => v.clone(),
            Sampling::PerAxis(v) => return Err(Error::shape_mismatch(&[d], &[v.len()])),
        };
        if factors.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::precondition(format!(
                "sampling factors must be positive, got {:?}",
                factors
            )));
        }
        Ok(factors)
    }
}

/// Padding of [`pad`].
#[derive(Clone, Debug, PartialEq)]
pub enum PadWidth {
    /// Same width before and after every axis.
    Uniform(usize),
    /// Same width before and after, one per axis.
    Symmetric(Vec<usize>),
    /// `(before, after)` per axis.
    PerAxis(Vec<(usize, usize)>),
}

impl From<usize> for PadWidth {
    fn from(width: usize) -> Self {
        PadWidth::Uniform(width)
    }
}

impl From<Vec<usize>> for PadWidth {
    fn from(widths: Vec<usize>) -> Self {
        PadWidth::Symmetric(widths)
    }
}

impl From<Vec<(usize, usize)>> for PadWidth {
    fn from(widths: Vec<(usize, usize)>) -> Self {
        PadWidth::PerAxis(widths)
    }
}

impl PadWidth {
    fn per_axis(&self, ndim: usize) -> Result<Vec<(usize, usize)>> {
        let widths = match self {
            PadWidth::Uniform(w) => vec![(*w, *w); ndim],
            PadWidth::Symmetric(v) => v.iter().map(|&w| (w, w)).collect(),
            PadWidth::PerAxis(v) => v.clone(),
        };
        if widths.len() != ndim {
            return Err(Error::shape_mismatch(&[ndim], &[widths.len()]));
        }
        Ok(widths)
    }
}

fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let inverse = DMatrix::from_fn(n, n, |i, j| matrix[[i, j]])
        .try_inverse()
        .ok_or(Error::SingularMatrix)?;
    Ok(Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)]))
}

/// Homogeneous translation by `t`.
fn translation(t: &[f64]) -> Array2<f64> {
    let d = t.len();
    let mut h = Array2::eye(d + 1);
    for (a, &t) in t.iter().enumerate() {
        h[[a, d]] = t;
    }
    h
}

fn centers(shape: &[usize]) -> Vec<f64> {
    shape.iter().map(|&n| (n as f64 - 1.0) / 2.0).collect()
}

/// Rescales the spatial axes by `sampling`, keeping the volume centered.
///
/// The output spatial shape is `round(shape * sampling)` (ties to even).
/// Interpolation runs without the spline prefilter.
pub fn resample<A, T>(
    volume: &A,
    sampling: impl Into<Sampling>,
    order: usize,
    batch: bool,
    multichannel: bool,
) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let view = coerce(volume)?;
    let spatial = Layout::new(batch, multichannel).spatial(view.shape())?.to_vec();
    let d = spatial.len();
    let sampling = sampling.into().per_axis(d)?;
    let output_shape: Vec<usize> = spatial
        .iter()
        .zip(&sampling)
        .map(|(&n, &s)| (n as f64 * s).round_ties_even() as usize)
        .collect();

    let input_center: Vec<f64> = centers(&spatial).iter().map(|c| -c).collect();
    let mut homothety = Array2::eye(d + 1);
    for (a, &s) in sampling.iter().enumerate() {
        homothety[[a, a]] = s;
    }
    // input -> output, inverted to map output voxels back into the input
    let forward = translation(&centers(&output_shape))
        .dot(&homothety)
        .dot(&translation(&input_center));
    let matrix = invert(&forward)?;

    let options = AffineOptions::default()
        .order(order)
        .prefilter(false)
        .batch(batch)
        .multichannel(multichannel);
    let matrix = if batch {
        matrix.insert_axis(ndarray::Axis(0)).into_dyn()
    } else {
        matrix.into_dyn()
    };
    affine_transform(volume, &Undeclared(matrix), 0.0, Some(&output_shape), &options)
}

/// Zero-padded copy of `volume`.
pub fn pad<A, T>(volume: &A, pad_width: impl Into<PadWidth>) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let view = coerce(volume)?;
    let widths = pad_width.into().per_axis(view.ndim())?;
    let shape: Vec<usize> = view
        .shape()
        .iter()
        .zip(&widths)
        .map(|(&n, &(before, after))| n + before + after)
        .collect();
    let mut padded = ArrayD::from_elem(IxDyn(&shape), T::from_f64(0.0));
    padded
        .slice_each_axis_mut(|axis| {
            let a = axis.axis.index();
            let before = widths[a].0;
            Slice::from(before..before + view.shape()[a])
        })
        .assign(&view);
    Ok(padded)
}

/// Centers `volume` in a grid of spatial shape `output_size` by a pure
/// translation, cropping or zero-filling as needed.
pub fn interpolate_to_size<A, T>(
    volume: &A,
    output_size: &[usize],
    order: usize,
    batch: bool,
    multichannel: bool,
) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let view = coerce(volume)?;
    let spatial = Layout::new(batch, multichannel).spatial(view.shape())?.to_vec();
    if spatial.len() != output_size.len() {
        return Err(Error::shape_mismatch(&spatial, output_size));
    }
    let shift: Vec<f64> = centers(output_size)
        .iter()
        .zip(centers(&spatial))
        .map(|(out, input)| out - input)
        .collect();
    let matrix = invert(&translation(&shift))?;

    let options = AffineOptions::default()
        .order(order)
        .prefilter(false)
        .batch(batch)
        .multichannel(multichannel);
    let matrix = if batch {
        matrix.insert_axis(ndarray::Axis(0)).into_dyn()
    } else {
        matrix.into_dyn()
    };
    affine_transform(volume, &Undeclared(matrix), 0.0, Some(output_size), &options)
}

/// Moves the content of `volume` by `vector` (in voxels), filling with zeros.
pub fn translate<A, T>(volume: &A, vector: &[f64], order: usize) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let d = coerce(volume)?.ndim();
    if vector.len() != d {
        return Err(Error::shape_mismatch(&[d], &[vector.len()]));
    }
    let offset: Vec<f64> = vector.iter().map(|v| -v).collect();
    let options = AffineOptions::default().order(order).mode(Mode::Constant);
    affine_transform(volume, &Undeclared(Array2::<f64>::eye(d)), offset, None, &options)
}

/// Intensity-weighted centroid of `volume`, per axis.
///
/// `NaN` when the intensities sum to zero.
pub fn center_of_mass<A, T>(volume: &A) -> Result<Vec<f64>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let view = coerce(volume)?;
    let mut moments = vec![0.0; view.ndim()];
    let mut total = 0.0;
    for (index, &v) in view.indexed_iter() {
        let v = v.to_f64();
        total += v;
        for (m, &i) in moments.iter_mut().zip(index.slice()) {
            *m += v * i as f64;
        }
    }
    if total == 0.0 {
        return Ok(vec![f64::NAN; moments.len()]);
    }
    Ok(moments.into_iter().map(|m| m / total).collect())
}

/// Translates `volume` so that its center of mass lands on the grid center.
pub fn move_center_of_mass_to_center<A, T>(volume: &A, order: usize) -> Result<ArrayD<T>>
where
    A: ArrayNamespace<Elem = T> + ?Sized,
    T: Element,
{
    let shape = coerce(volume)?.shape().to_vec();
    let vector: Vec<f64> = centers(&shape)
        .iter()
        .zip(center_of_mass(volume)?)
        .map(|(c, m)| c - m)
        .collect();
    translate(volume, &vector, order)
}
