//! Geometric transforms and translation registration of N-dimensional
//! volumes, with optional leading batch and channel axes.
//!
//! Every operation picks a [`Backend`] from the wrappers its array arguments
//! are passed in: plain `ndarray` arrays run on the full-featured
//! [`NdarrayBackend`], [`Tensor`] on the batch-vectorized linear sampler and
//! [`Portable`] on the reduced reference implementation.
//!
//! ```no_run
//! use ndarray::Array3;
//! use volume_transforms::{
//!     fourier_shift, phase_cross_correlation, FourierShiftOptions, PhaseCorrelationOptions,
//! };
//! use volume_transforms::fft::{fftn_real, ifftn};
//!
//! let volume = Array3::from_shape_fn((32, 32, 32), |(z, y, x)| ((z * y + x) % 7) as f64);
//! let volume = volume.into_dyn();
//! let spectrum = fftn_real(volume.view(), &[0, 1, 2]);
//! let shift = vec![1.5, -2.0, 0.25];
//! let shifted = fourier_shift(&spectrum, shift, &FourierShiftOptions::default()).unwrap();
//! let moving = ifftn(shifted.view(), &[0, 1, 2]).mapv(|c| c.re);
//!
//! let options = PhaseCorrelationOptions::default().upsample_factor(20);
//! let registration = phase_cross_correlation(&volume, &moving, &options).unwrap();
//! println!("{}", registration.shift);
//! ```

mod affine;
pub mod backend;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
mod dtype;
mod error;
pub mod fft;
mod find_fast_number;
mod fourier;
mod geometry;
mod layout;
mod masked;
pub mod namespace;
pub mod options;
mod registration;
mod sphere;
pub mod spline;
mod window;

pub use crate::affine::{affine_transform, affine_transform_into, Offset, Transform};
pub use crate::backend::{Backend, NdarrayBackend, PortableBackend, TensorBackend};
pub use crate::dtype::{DType, Element, Spectral};
pub use crate::error::{Error, Result};
pub use crate::find_fast_number::fastish_fft_len;
pub use crate::fourier::{fourier_shift, fourier_shift_into, Shift};
pub use crate::geometry::{
    center_of_mass, interpolate_to_size, move_center_of_mass_to_center, pad, resample, translate,
    PadWidth, Sampling,
};
pub use crate::layout::broadcast_shapes;
pub use crate::masked::cross_correlate_masked;
pub use crate::namespace::{ArrayNamespace, Namespace, Portable, Tensor};
pub use crate::options::{
    AffineOptions, FourierShiftOptions, Mode, Normalization, PhaseCorrelationOptions, Space,
};
pub use crate::registration::{
    are_volumes_aligned, is_translation_of, phase_cross_correlation, phase_cross_correlation_masked,
    Masks, Registration,
};
pub use crate::sphere::{
    axis_vectors, discretize_sphere_uniformly, random_unit_vector, SphereSampling,
};
pub use crate::window::{tukey, tukey_1d};

#[cfg(feature = "diagnostics")]
pub use crate::diagnostics::{disp2d, disp2d_compare, disp3d, Colormap, Figure, Panel};
