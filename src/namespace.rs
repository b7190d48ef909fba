//! Backend resolution.
//!
//! Every array argument declares (or not) the numerical library that owns it.
//! The highest-precedence declared namespace picks the [`Backend`]; arrays that
//! declare nothing go to the `ndarray` backend after being coerced to a view.

use crate::backend::{Backend, NdarrayBackend, PortableBackend, TensorBackend};
use crate::error::{Error, Result};
use ndarray::{ArrayBase, ArrayViewD, Data, Dimension};
use tracing::debug;

/// Array libraries the crate knows how to dispatch to, lowest precedence first.
///
/// A GPU namespace would slot in between `Ndarray` and `Tensor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// Generic array-API surface, no native backend.
    Portable,
    /// Plain CPU arrays.
    Ndarray,
    /// Batch-vectorized tensors with linear-only interpolation.
    Tensor,
}

/// Something array-like that the public functions accept.
pub trait ArrayNamespace {
    type Elem;

    /// The namespace this object declares, if any.
    fn namespace(&self) -> Option<Namespace>;

    /// Best-effort view of the data as an `ndarray` array.
    fn coerce(&self) -> Option<ArrayViewD<'_, Self::Elem>>;
}

impl<S, D> ArrayNamespace for ArrayBase<S, D>
where
    S: Data,
    D: Dimension,
{
    type Elem = S::Elem;

    fn namespace(&self) -> Option<Namespace> {
        Some(Namespace::Ndarray)
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, S::Elem>> {
        Some(self.view().into_dyn())
    }
}

impl<T> ArrayNamespace for [T] {
    type Elem = T;

    fn namespace(&self) -> Option<Namespace> {
        None
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, T>> {
        ArrayViewD::from_shape(vec![self.len()], self).ok()
    }
}

impl<T> ArrayNamespace for Vec<T> {
    type Elem = T;

    fn namespace(&self) -> Option<Namespace> {
        None
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, T>> {
        self.as_slice().coerce()
    }
}

impl<A: ArrayNamespace + ?Sized> ArrayNamespace for &A {
    type Elem = A::Elem;

    fn namespace(&self) -> Option<Namespace> {
        (**self).namespace()
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, A::Elem>> {
        (**self).coerce()
    }
}

/// Marks an array as owned by the tensor backend.
#[derive(Clone, Copy, Debug)]
pub struct Tensor<A>(pub A);

impl<A: ArrayNamespace> ArrayNamespace for Tensor<A> {
    type Elem = A::Elem;

    fn namespace(&self) -> Option<Namespace> {
        Some(Namespace::Tensor)
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, A::Elem>> {
        self.0.coerce()
    }
}

/// Marks an array as only exposing the portable array surface.
#[derive(Clone, Copy, Debug)]
pub struct Portable<A>(pub A);

impl<A: ArrayNamespace> ArrayNamespace for Portable<A> {
    type Elem = A::Elem;

    fn namespace(&self) -> Option<Namespace> {
        Some(Namespace::Portable)
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, A::Elem>> {
        self.0.coerce()
    }
}

/// Helper arrays built inside the crate; they never take part in dispatch.
pub(crate) struct Undeclared<A>(pub A);

impl<A: ArrayNamespace> ArrayNamespace for Undeclared<A> {
    type Elem = A::Elem;

    fn namespace(&self) -> Option<Namespace> {
        None
    }

    fn coerce(&self) -> Option<ArrayViewD<'_, A::Elem>> {
        self.0.coerce()
    }
}

static NDARRAY: NdarrayBackend = NdarrayBackend;
static TENSOR: TensorBackend = TensorBackend;
static PORTABLE: PortableBackend = PortableBackend;

/// Backend implementing `namespace`.
pub fn backend_for(namespace: Namespace) -> &'static dyn Backend {
    match namespace {
        Namespace::Tensor => &TENSOR,
        Namespace::Ndarray => &NDARRAY,
        Namespace::Portable => &PORTABLE,
    }
}

/// Picks the backend for a set of arguments.
pub fn resolve(namespaces: &[Option<Namespace>]) -> &'static dyn Backend {
    let namespace = namespaces
        .iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(Namespace::Ndarray);
    let backend = backend_for(namespace);
    debug!(
        backend = backend.name(),
        ?namespaces,
        "resolved array backend"
    );
    backend
}

/// Views an argument as an `ndarray` array, failing with [`Error::NoBackend`].
pub fn coerce<A>(array: &A) -> Result<ArrayViewD<'_, A::Elem>>
where
    A: ArrayNamespace + ?Sized,
{
    array.coerce().ok_or_else(|| {
        Error::no_backend(format!(
            "argument of type {} declares no array namespace and cannot be viewed as an ndarray",
            std::any::type_name::<A>()
        ))
    })
}
