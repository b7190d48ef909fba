//! Option structs for the public operations.
//!
//! Defaults match the documented keyword defaults; setters consume and return `self`
//! so options can be built inline: `AffineOptions::default().order(1).batch(true)`.

use crate::error::{Error, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How points outside the input grid are filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Mode {
    /// `cval` beyond the edges, no interpolation outside the grid.
    Constant,
    /// Edge value repeated (`a a a | a b c d | d d d`).
    Nearest,
    /// Whole-sample symmetric (`d c b | a b c d | c b a`).
    Mirror,
    /// Half-sample symmetric (`d c b a | a b c d | d c b a`).
    Reflect,
    /// Legacy periodic extension, period `len - 1` for coordinates.
    Wrap,
    /// Same as `Reflect`.
    GridMirror,
    /// `cval` beyond the edges, interpolating across the edge.
    GridConstant,
    /// Periodic extension with period `len`.
    GridWrap,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Constant => "constant",
            Mode::Nearest => "nearest",
            Mode::Mirror => "mirror",
            Mode::Reflect => "reflect",
            Mode::Wrap => "wrap",
            Mode::GridMirror => "grid-mirror",
            Mode::GridConstant => "grid-constant",
            Mode::GridWrap => "grid-wrap",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Constant
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(Mode::Constant),
            "nearest" => Ok(Mode::Nearest),
            "mirror" => Ok(Mode::Mirror),
            "reflect" => Ok(Mode::Reflect),
            "wrap" => Ok(Mode::Wrap),
            "grid-mirror" => Ok(Mode::GridMirror),
            "grid-constant" => Ok(Mode::GridConstant),
            "grid-wrap" => Ok(Mode::GridWrap),
            other => Err(Error::precondition(format!("unknown boundary mode '{}'", other))),
        }
    }
}

/// Options of [`affine_transform`](crate::affine_transform).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AffineOptions {
    /// Spline interpolation order, 0 to 5.
    pub order: usize,
    pub mode: Mode,
    /// Fill value for the constant modes.
    pub cval: f64,
    /// Run the spline prefilter before interpolating (orders above 1 only).
    pub prefilter: bool,
    /// The first axis of the input is a batch axis.
    pub batch: bool,
    /// The first axis (second if `batch`) is a channel axis.
    pub multichannel: bool,
}

impl Default for AffineOptions {
    fn default() -> Self {
        AffineOptions {
            order: 3,
            mode: Mode::Constant,
            cval: 0.0,
            prefilter: true,
            batch: false,
            multichannel: false,
        }
    }
}

impl AffineOptions {
    pub fn order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cval(mut self, cval: f64) -> Self {
        self.cval = cval;
        self
    }

    pub fn prefilter(mut self, prefilter: bool) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    pub fn multichannel(mut self, multichannel: bool) -> Self {
        self.multichannel = multichannel;
        self
    }
}

/// Options of [`fourier_shift`](crate::fourier_shift).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FourierShiftOptions {
    /// Length before a real FFT along `axis`. `None` means the input is a full complex FFT.
    pub n: Option<usize>,
    /// Axis of the real transform, counted among the spatial axes (negative from the end).
    pub axis: isize,
}

impl Default for FourierShiftOptions {
    fn default() -> Self {
        FourierShiftOptions { n: None, axis: -1 }
    }
}

impl FourierShiftOptions {
    pub fn real_fft(mut self, n: usize, axis: isize) -> Self {
        self.n = Some(n);
        self.axis = axis;
        self
    }
}

/// Domain of the images handed to phase cross-correlation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Space {
    Real,
    Fourier,
}

impl Default for Space {
    fn default() -> Self {
        Space::Real
    }
}

impl FromStr for Space {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "real" => Ok(Space::Real),
            "fourier" => Ok(Space::Fourier),
            other => Err(Error::precondition(format!("unknown space '{}'", other))),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Space::Real => "real",
            Space::Fourier => "fourier",
        })
    }
}

/// Normalization of the cross-power spectrum.
///
/// Phase normalization whitens the spectrum, so the registration error it
/// reports sits near 1 for any input, including a volume against itself. Use
/// `None` when the error is needed, or for smooth volumes whose energy sits
/// in a few low frequencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Normalization {
    /// Divide by the magnitude, keeping only the phase.
    Phase,
    None,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Phase
    }
}

impl FromStr for Normalization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "phase" => Ok(Normalization::Phase),
            "none" | "None" => Ok(Normalization::None),
            other => Err(Error::precondition(format!("unknown normalization '{}'", other))),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Normalization::Phase => "phase",
            Normalization::None => "none",
        })
    }
}

/// Options of [`phase_cross_correlation`](crate::phase_cross_correlation).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PhaseCorrelationOptions {
    /// Images are registered to within `1 / upsample_factor` of a pixel.
    pub upsample_factor: usize,
    pub space: Space,
    /// Resolve the periodic ambiguity of the shift in real space.
    pub disambiguate: bool,
    /// Minimum overlap ratio for masked registration.
    pub overlap_ratio: f64,
    pub normalization: Normalization,
    /// Number of trailing spatial axes; required when the inputs broadcast.
    pub nb_spatial_dims: Option<usize>,
    /// A channel axis precedes the spatial axes; channels are combined coherently.
    pub multichannel: bool,
}

impl Default for PhaseCorrelationOptions {
    fn default() -> Self {
        PhaseCorrelationOptions {
            upsample_factor: 1,
            space: Space::Real,
            disambiguate: false,
            overlap_ratio: 0.3,
            normalization: Normalization::Phase,
            nb_spatial_dims: None,
            multichannel: false,
        }
    }
}

impl PhaseCorrelationOptions {
    pub fn upsample_factor(mut self, upsample_factor: usize) -> Self {
        self.upsample_factor = upsample_factor;
        self
    }

    pub fn space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn disambiguate(mut self, disambiguate: bool) -> Self {
        self.disambiguate = disambiguate;
        self
    }

    pub fn overlap_ratio(mut self, overlap_ratio: f64) -> Self {
        self.overlap_ratio = overlap_ratio;
        self
    }

    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn nb_spatial_dims(mut self, nb_spatial_dims: usize) -> Self {
        self.nb_spatial_dims = Some(nb_spatial_dims);
        self
    }

    pub fn multichannel(mut self, multichannel: bool) -> Self {
        self.multichannel = multichannel;
        self
    }
}
