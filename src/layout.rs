//! Conversions between the caller's flag-driven layout and the canonical
//! `(batch, channel, spatial...)` layout the numerical core works on.

use crate::error::{Error, Result};
use ndarray::parallel::prelude::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Dimension};

/// Leading axes declared by the `batch`/`multichannel` flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub batch: bool,
    pub multichannel: bool,
}

impl Layout {
    pub fn new(batch: bool, multichannel: bool) -> Self {
        Layout {
            batch,
            multichannel,
        }
    }

    /// Number of leading non-spatial axes in the caller's layout.
    pub fn leading(self) -> usize {
        self.batch as usize + self.multichannel as usize
    }

    /// Spatial part of a caller-layout shape.
    pub fn spatial<'s>(self, shape: &'s [usize]) -> Result<&'s [usize]> {
        if shape.len() <= self.leading() {
            return Err(Error::precondition(format!(
                "array of shape {:?} has no spatial axes (batch: {}, multichannel: {})",
                shape, self.batch, self.multichannel
            )));
        }
        Ok(&shape[self.leading()..])
    }

    /// Inserts the missing batch/channel axes.
    pub fn canonical<'a, T>(self, view: ArrayViewD<'a, T>) -> ArrayViewD<'a, T> {
        let mut view = view;
        if !self.multichannel {
            view = view.insert_axis(Axis(self.batch as usize));
        }
        if !self.batch {
            view = view.insert_axis(Axis(0));
        }
        view
    }

    pub fn canonical_mut<'a, T>(self, view: ArrayViewMutD<'a, T>) -> ArrayViewMutD<'a, T> {
        let mut view = view;
        if !self.multichannel {
            view = view.insert_axis(Axis(self.batch as usize));
        }
        if !self.batch {
            view = view.insert_axis(Axis(0));
        }
        view
    }

    /// Removes the synthetic axes inserted by [`Layout::canonical`].
    pub fn strip<T>(self, array: ArrayD<T>) -> ArrayD<T> {
        let mut array = array;
        if !self.multichannel {
            array = array.index_axis_move(Axis(1), 0);
        }
        if !self.batch {
            array = array.index_axis_move(Axis(0), 0);
        }
        array
    }
}

/// Broadcast shape of `a` and `b`: trailing axes aligned, length-one axes stretched.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![1; ndim];
    for i in 0..ndim {
        let da = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let db = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        shape[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(Error::Broadcast(a.to_vec(), b.to_vec())),
        };
    }
    Ok(shape)
}

/// Selects the sub-array at `index` along the leading axes.
pub(crate) fn subview<'a, T>(view: ArrayViewD<'a, T>, index: &[usize]) -> ArrayViewD<'a, T> {
    index
        .iter()
        .fold(view, |view, &i| view.index_axis_move(Axis(0), i))
}

/// Sub-array of `view` at `index` of broadcast leading axes.
///
/// `view` has `leading` axes of its own, aligned with the trailing entries of
/// `index`; axes of length one are not indexed.
pub(crate) fn broadcast_subview<'a, T>(
    view: ArrayViewD<'a, T>,
    leading: usize,
    index: &[usize],
) -> ArrayViewD<'a, T> {
    index[index.len() - leading..].iter().fold(view, |view, &i| {
        let i = if view.len_of(Axis(0)) == 1 { 0 } else { i };
        view.index_axis_move(Axis(0), i)
    })
}

pub(crate) fn subview_mut<'a, T>(
    view: ArrayViewMutD<'a, T>,
    index: &[usize],
) -> ArrayViewMutD<'a, T> {
    index
        .iter()
        .fold(view, |view, &i| view.index_axis_move(Axis(0), i))
}

/// Calls `f` on every element of `view` with its full index, in parallel over
/// the outermost axis. `init` builds the scratch state of each rayon job.
pub(crate) fn par_indexed_for_each<T, S, I, F>(mut view: ArrayViewMutD<T>, init: I, f: F)
where
    T: Send + Sync,
    I: Fn() -> S + Send + Sync,
    F: Fn(&mut S, &[usize], &mut T) + Send + Sync,
{
    let ndim = view.ndim();
    if ndim == 0 {
        let mut state = init();
        view.iter_mut().for_each(|value| f(&mut state, &[], value));
        return;
    }
    view.axis_iter_mut(Axis(0)).into_par_iter().enumerate().for_each_init(
        || (init(), Vec::with_capacity(ndim)),
        |(state, index), (i, mut lane)| {
            for (rest, value) in lane.indexed_iter_mut() {
                index.clear();
                index.push(i);
                index.extend_from_slice(rest.slice());
                f(state, &index[..], value);
            }
        },
    );
}

/// Resolves a possibly negative axis among `ndim` axes.
pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved >= ndim as isize {
        return Err(Error::precondition(format!(
            "axis {} is out of bounds for {} spatial axes",
            axis, ndim
        )));
    }
    Ok(resolved as usize)
}
