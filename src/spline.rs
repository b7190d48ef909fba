//! B-spline interpolation of orders 0 to 5.
//!
//! Coefficients are obtained with the recursive prefilter of Unser et al., and
//! samples are evaluated from the `order + 1` neighbouring coefficients along
//! each axis. Sample `i` sits at coordinate `i`.

use crate::error::{Error, Result};
use crate::options::Mode;
use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, Zip};
use num_integer::Integer;

pub const MAX_ORDER: usize = 5;

/// Samples added on each side before prefiltering in the `nearest` and
/// `grid-constant` modes, which have no exact recursive boundary condition.
const PREPAD: usize = 12;

const EDGE_TOLERANCE: f64 = 1e-9;

/// Boundary condition of the recursive prefilter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterBoundary {
    Mirror,
    Reflect,
    Wrap,
}

impl FilterBoundary {
    fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Constant | Mode::GridConstant | Mode::Mirror | Mode::Wrap => {
                FilterBoundary::Mirror
            }
            Mode::GridWrap => FilterBoundary::Wrap,
            Mode::Nearest | Mode::Reflect | Mode::GridMirror => FilterBoundary::Reflect,
        }
    }
}

pub(crate) fn check_order(order: usize) -> Result<()> {
    if order > MAX_ORDER {
        return Err(Error::precondition(format!(
            "spline order must be in 0..={}, got {}",
            MAX_ORDER, order
        )));
    }
    Ok(())
}

fn poles(order: usize) -> &'static [f64] {
    match order {
        2 => &[-0.171_572_875_253_809_9],
        3 => &[-0.267_949_192_431_122_7],
        4 => &[-0.361_341_225_900_220_2, -0.013_725_429_297_339_121],
        5 => &[-0.430_575_347_099_973_8, -0.043_096_288_203_264_65],
        _ => &[],
    }
}

/// Computes the B-spline coefficients of `input` along every axis.
pub fn spline_filter(input: ArrayViewD<f64>, order: usize, mode: Mode) -> Result<ArrayD<f64>> {
    check_order(order)?;
    let mut output = input.to_owned();
    if order > 1 {
        filter_axes(output.view_mut(), order, FilterBoundary::for_mode(mode));
    }
    Ok(output)
}

fn filter_axes(mut data: ArrayViewMutD<f64>, order: usize, boundary: FilterBoundary) {
    for axis in 0..data.ndim() {
        let len = data.len_of(Axis(axis));
        if len <= 1 {
            continue;
        }
        Zip::from(data.lanes_mut(Axis(axis)))
            .into_par_iter()
            .for_each_init(
                || vec![0.0; len],
                |buffer, lane| {
                    let mut lane = lane.0;
                    for (b, &x) in buffer.iter_mut().zip(lane.iter()) {
                        *b = x;
                    }
                    filter_line(buffer, order, boundary);
                    for (x, &b) in lane.iter_mut().zip(buffer.iter()) {
                        *x = b;
                    }
                },
            );
    }
}

fn filter_line(line: &mut [f64], order: usize, boundary: FilterBoundary) {
    let n = line.len();
    let poles = poles(order);
    if n <= 1 || poles.is_empty() {
        return;
    }

    let gain: f64 = poles.iter().map(|&z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    for c in line.iter_mut() {
        *c *= gain;
    }

    for &z in poles {
        init_causal(line, z, boundary);
        for i in 1..n {
            line[i] += z * line[i - 1];
        }
        init_anticausal(line, z, boundary);
        for i in (0..n - 1).rev() {
            line[i] = z * (line[i + 1] - line[i]);
        }
    }
}

fn init_causal(c: &mut [f64], z: f64, boundary: FilterBoundary) {
    let n = c.len();
    match boundary {
        FilterBoundary::Mirror => {
            let z_n_1 = z.powi(n as i32 - 1);
            let mut z_i = z;
            let mut sum = c[0] + z_n_1 * c[n - 1];
            for i in 1..n - 1 {
                sum += z_i * (c[i] + z_n_1 * c[n - 1 - i]);
                z_i *= z;
            }
            c[0] = sum / (1.0 - z_n_1 * z_n_1);
        }
        FilterBoundary::Reflect => {
            let z_n = z.powi(n as i32);
            let c0 = c[0];
            let mut z_i = z;
            let mut sum = c[0] + z_n * c[n - 1];
            for i in 1..n {
                sum += z_i * (c[i] + z_n * c[n - 1 - i]);
                z_i *= z;
            }
            c[0] = sum * z / (1.0 - z_n * z_n) + c0;
        }
        FilterBoundary::Wrap => {
            let mut z_i = z;
            let mut sum = c[0];
            for i in 1..n {
                sum += z_i * c[n - i];
                z_i *= z;
            }
            c[0] = sum / (1.0 - z_i);
        }
    }
}

fn init_anticausal(c: &mut [f64], z: f64, boundary: FilterBoundary) {
    let n = c.len();
    match boundary {
        FilterBoundary::Mirror => {
            c[n - 1] = (z * c[n - 2] + c[n - 1]) * z / (z * z - 1.0);
        }
        FilterBoundary::Reflect => {
            c[n - 1] *= z / (z - 1.0);
        }
        FilterBoundary::Wrap => {
            let mut z_i = z;
            let mut sum = c[n - 1];
            for &x in &c[..n - 1] {
                sum += z_i * x;
                z_i *= z;
            }
            c[n - 1] = sum * z / (z_i - 1.0);
        }
    }
}

/// Interpolation weights of the `order + 1` taps around `x`.
fn spline_weights(order: usize, x: f64, weights: &mut [f64; MAX_ORDER + 1]) {
    let x = x - if order & 1 == 1 { x } else { x + 0.5 }.floor();
    match order {
        1 => weights[0] = 1.0 - x,
        2 => {
            weights[1] = 0.75 - x * x;
            let y = 0.5 - x;
            weights[0] = 0.5 * y * y;
        }
        3 => {
            let y = x;
            weights[1] = (y * y * (y - 2.0) * 3.0 + 4.0) / 6.0;
            let y = 1.0 - x;
            weights[2] = (y * y * (y - 2.0) * 3.0 + 4.0) / 6.0;
            weights[0] = y * y * y / 6.0;
        }
        4 => {
            let t = x * x;
            weights[2] = t * (t * 0.25 - 0.625) + 115.0 / 192.0;
            let y = 1.0 + x;
            weights[1] = y * (y * (y * (5.0 - y) / 6.0 - 1.25) + 5.0 / 24.0) + 55.0 / 96.0;
            let y = 1.0 - x;
            weights[3] = y * (y * (y * (5.0 - y) / 6.0 - 1.25) + 5.0 / 24.0) + 55.0 / 96.0;
            let y = 0.5 - x;
            let t = y * y;
            weights[0] = t * t / 24.0;
        }
        5 => {
            let y = x;
            let t = y * y;
            weights[2] = t * (t * (0.25 - y / 12.0) - 0.5) + 0.55;
            let y = 1.0 - x;
            let t = y * y;
            weights[3] = t * (t * (0.25 - y / 12.0) - 0.5) + 0.55;
            let y = x + 1.0;
            weights[1] = y * (y * (y * (y * (y / 24.0 - 0.375) + 1.25) - 1.75) + 0.625) + 0.425;
            let y = 2.0 - x;
            weights[4] = y * (y * (y * (y * (y / 24.0 - 0.375) + 1.25) - 1.75) + 0.625) + 0.425;
            let y = 1.0 - x;
            let t = y * y;
            weights[0] = y * t * t / 120.0;
        }
        _ => {}
    }
    weights[order] = 1.0 - weights[..order].iter().sum::<f64>();
}

/// Index of the first tap for a sample at `x`.
fn first_tap(order: usize, x: f64) -> isize {
    let base = if order & 1 == 1 { x.floor() } else { (x + 0.5).floor() };
    base as isize - (order / 2) as isize
}

/// Maps a sample coordinate into `[0, len - 1]`, or `None` when the sample takes `cval`.
pub(crate) fn map_coordinate(c: f64, len: usize, mode: Mode) -> Option<f64> {
    let last = len as f64 - 1.0;
    if (0.0..=last).contains(&c) {
        return Some(c);
    }
    if len <= 1 {
        return match mode {
            Mode::Constant if c.abs() > EDGE_TOLERANCE => None,
            Mode::GridConstant => Some(c),
            _ => Some(0.0),
        };
    }
    let n = len as f64;
    let mapped = match mode {
        Mode::Constant => {
            if c >= -EDGE_TOLERANCE && c <= last + EDGE_TOLERANCE {
                c.max(0.0).min(last)
            } else {
                return None;
            }
        }
        Mode::GridConstant => c,
        Mode::Nearest => c.max(0.0).min(last),
        Mode::Mirror => {
            let period = 2.0 * n - 2.0;
            let c = c.abs() % period;
            if c > last {
                period - c
            } else {
                c
            }
        }
        Mode::Reflect | Mode::GridMirror => {
            let period = 2.0 * n;
            let c = c.rem_euclid(period);
            // values in (-1, 0) stay as is, the taps reflect them
            if c >= n {
                period - c - 1.0
            } else {
                c
            }
        }
        Mode::Wrap => {
            let period = n - 1.0;
            if c < 0.0 {
                c + period * ((-c / period).trunc() + 1.0)
            } else {
                c - period * (c / period).trunc()
            }
        }
        Mode::GridWrap => c.rem_euclid(n),
    };
    Some(mapped)
}

/// Maps a tap index onto the coefficient grid, `None` meaning `cval`.
fn tap_index(i: isize, len: usize, mode: Mode) -> Option<usize> {
    let n = len as isize;
    if (0..n).contains(&i) {
        return Some(i as usize);
    }
    if n <= 1 {
        return match mode {
            Mode::GridConstant => None,
            _ => Some(0),
        };
    }
    let mapped = match mode {
        Mode::Constant | Mode::Mirror => {
            let period = 2 * n - 2;
            let i = i.abs().mod_floor(&period);
            if i >= n {
                period - i
            } else {
                i
            }
        }
        Mode::Reflect | Mode::GridMirror => {
            let period = 2 * n;
            let i = i.mod_floor(&period);
            if i >= n {
                period - i - 1
            } else {
                i
            }
        }
        Mode::Nearest => i.max(0).min(n - 1),
        Mode::Wrap | Mode::GridWrap => i.mod_floor(&n),
        Mode::GridConstant => return None,
    };
    Some(mapped as usize)
}

/// Taps along one axis: weights and flat offsets into the coefficients.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AxisTaps {
    weights: [f64; MAX_ORDER + 1],
    offsets: [Option<usize>; MAX_ORDER + 1],
    len: usize,
}

impl Default for AxisTaps {
    fn default() -> Self {
        AxisTaps {
            weights: [0.0; MAX_ORDER + 1],
            offsets: [None; MAX_ORDER + 1],
            len: 0,
        }
    }
}

/// Spline coefficients of one volume, ready to be sampled at arbitrary coordinates.
pub(crate) struct Interpolator {
    values: Vec<f64>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    pad: f64,
    order: usize,
    mode: Mode,
    cval: f64,
}

impl Interpolator {
    pub fn new(
        input: ArrayViewD<f64>,
        order: usize,
        mode: Mode,
        cval: f64,
        prefilter: bool,
    ) -> Result<Self> {
        check_order(order)?;
        let (coefficients, pad) = if prefilter && order > 1 {
            let (mut data, pad) = match mode {
                Mode::Nearest | Mode::GridConstant => (prepad(&input, mode, cval), PREPAD),
                _ => (input.as_standard_layout().into_owned(), 0),
            };
            filter_axes(data.view_mut(), order, FilterBoundary::for_mode(mode));
            (data, pad)
        } else {
            (input.as_standard_layout().into_owned(), 0)
        };

        let shape = coefficients.shape().to_vec();
        let mut strides = vec![1; shape.len()];
        for axis in (0..shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }
        Ok(Interpolator {
            values: coefficients.into_raw_vec(),
            shape,
            strides,
            pad: pad as f64,
            order,
            mode,
            cval,
        })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Value at `coordinate` (input grid units). `taps` is scratch space of length `ndim`.
    pub fn sample(&self, coordinate: &[f64], taps: &mut [AxisTaps]) -> f64 {
        if self.values.is_empty() {
            return self.cval;
        }
        for (axis, (&c, axis_taps)) in coordinate.iter().zip(taps.iter_mut()).enumerate() {
            let len = self.shape[axis];
            let c = match map_coordinate(c + self.pad, len, self.mode) {
                Some(c) => c,
                None => return self.cval,
            };
            let start = first_tap(self.order, c);
            spline_weights(self.order, c, &mut axis_taps.weights);
            for k in 0..=self.order {
                axis_taps.offsets[k] =
                    tap_index(start + k as isize, len, self.mode).map(|i| i * self.strides[axis]);
            }
            axis_taps.len = self.order + 1;
        }
        gather(&self.values, &taps[..coordinate.len()], 0, self.cval)
    }
}

fn gather(values: &[f64], taps: &[AxisTaps], offset: usize, cval: f64) -> f64 {
    let (first, rest) = match taps.split_first() {
        Some(split) => split,
        None => return values[offset],
    };
    let mut acc = 0.0;
    for k in 0..first.len {
        let w = first.weights[k];
        if w == 0.0 {
            continue;
        }
        acc += w * match first.offsets[k] {
            Some(o) => gather(values, rest, offset + o, cval),
            None => cval,
        };
    }
    acc
}

/// Extends `input` by `PREPAD` samples per side: edge values for `nearest`, `cval` otherwise.
fn prepad(input: &ArrayViewD<f64>, mode: Mode, cval: f64) -> ArrayD<f64> {
    let shape: Vec<usize> = input.shape().iter().map(|&n| n + 2 * PREPAD).collect();
    let mut inner = vec![0usize; input.ndim()];
    ArrayD::from_shape_fn(IxDyn(&shape), |index| {
        for (axis, slot) in inner.iter_mut().enumerate() {
            let i = index[axis] as isize - PREPAD as isize;
            let n = input.len_of(Axis(axis)) as isize;
            if (0..n).contains(&i) {
                *slot = i as usize;
            } else if mode == Mode::Nearest {
                *slot = i.max(0).min(n - 1) as usize;
            } else {
                return cval;
            }
        }
        input[&inner[..]]
    })
}
