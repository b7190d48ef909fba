//! Error type shared by every operation of the crate.

use thiserror::Error;

/// Errors raised by volume operations.
///
/// Nothing is retried or wrapped further: every operation is a deterministic
/// local computation, so the error is returned to the caller as is.
#[derive(Error, Debug)]
pub enum Error {
    /// No backend could be resolved for the arguments, and coercing them to
    /// `ndarray` failed.
    #[error("no backend found: {0}")]
    NoBackend(String),

    /// An argument violates a precondition of the operation (wrong dtype,
    /// unsupported interpolation order or boundary mode, ...).
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The resolved backend cannot perform the requested variant.
    #[error("{feature} is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        feature: String,
    },

    /// The feature exists on other backends but not on the one resolved.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("shapes {0:?} and {1:?} cannot be broadcast together")]
    Broadcast(Vec<usize>, Vec<usize>),

    /// A homogeneous transform could not be inverted.
    #[error("transform matrix is singular")]
    SingularMatrix,

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn no_backend(msg: impl Into<String>) -> Self {
        Self::NoBackend(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn unsupported(backend: &'static str, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            backend,
            feature: feature.into(),
        }
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
