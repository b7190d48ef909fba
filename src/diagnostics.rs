//! Slice rendering for eyeballing volumes while debugging.
//!
//! Nothing here is numerically meaningful: images are rendered into an
//! [`RgbImage`] canvas that the caller can save or inspect.

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use ndarray::{concatenate, Array2, ArrayView2, ArrayView3, Axis};
use palette::{Lch, Srgb};
use std::path::Path;

const GAP: u32 = 4;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([96, 96, 96]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Colormap {
    Gray,
    /// Perceptual dark-blue to yellow ramp in the Lch space.
    Lch,
}

impl Colormap {
    /// Colour of `value` in `[0, 1]`.
    pub fn color(self, value: f64) -> Rgb<u8> {
        let value = if value.is_nan() { 0.0 } else { value.max(0.0).min(1.0) };
        let colour = match self {
            Colormap::Gray => Srgb::new(value, value, value),
            Colormap::Lch => {
                Srgb::from(Lch::new(value * 70.0, value * 128.0, 280.0 - 245.0 * value))
            }
        };
        Rgb([
            (colour.red.max(0.0).min(1.0) * 255.0).round() as u8,
            (colour.green.max(0.0).min(1.0) * 255.0).round() as u8,
            (colour.blue.max(0.0).min(1.0) * 255.0).round() as u8,
        ])
    }
}

/// Placement of one rendered image on the canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Intensity mapped to the bottom and top of the colormap.
    pub vmin: f64,
    pub vmax: f64,
    pub label: Option<String>,
}

impl Panel {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x..self.x + self.width).contains(&x) && (self.y..self.y + self.height).contains(&y)
    }
}

#[derive(Clone, Debug)]
pub struct Figure {
    pub canvas: RgbImage,
    pub axes: Vec<Panel>,
}

impl Figure {
    fn new(width: u32, height: u32) -> Self {
        Figure {
            canvas: RgbImage::from_pixel(width, height, BACKGROUND),
            axes: Vec::new(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        self.canvas.save(path)
    }

    /// Draws `image` into `panel`; `pixel` maps an offset `(row, column)`
    /// inside the panel to the array index.
    fn draw<F>(&mut self, panel: Panel, image: ArrayView2<f64>, colormap: Colormap, pixel: F)
    where
        F: Fn(usize, usize) -> (usize, usize),
    {
        let range = panel.vmax - panel.vmin;
        for row in 0..panel.height {
            for column in 0..panel.width {
                let value = image[pixel(row as usize, column as usize)];
                let normalized = if range > 0.0 { (value - panel.vmin) / range } else { 0.0 };
                self.canvas
                    .put_pixel(panel.x + column, panel.y + row, colormap.color(normalized));
            }
        }
        self.axes.push(panel);
    }

    /// One pixel outline just outside `panel`.
    fn frame(&mut self, panel: &Panel) {
        let (left, top) = (panel.x.saturating_sub(1), panel.y.saturating_sub(1));
        let (right, bottom) = (panel.x + panel.width, panel.y + panel.height);
        for x in left..=right {
            for y in [top, bottom] {
                if x < self.canvas.width() && y < self.canvas.height() {
                    self.canvas.put_pixel(x, y, FRAME);
                }
            }
        }
        for y in top..=bottom {
            for x in [left, right] {
                if x < self.canvas.width() && y < self.canvas.height() {
                    self.canvas.put_pixel(x, y, FRAME);
                }
            }
        }
    }
}

fn range<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Lays `images` out on a grid `floor(sqrt(n))` rows high, each image with
/// its own intensity range.
pub fn disp2d(images: &[ArrayView2<f64>], colormap: Colormap) -> Result<Figure> {
    if images.is_empty() {
        return Err(Error::precondition("disp2d needs at least one image"));
    }
    let rows = (images.len() as f64).sqrt().floor() as usize;
    let columns = (images.len() + rows - 1) / rows;
    let cell_height = images.iter().map(|i| i.nrows()).max().unwrap_or(0) as u32;
    let cell_width = images.iter().map(|i| i.ncols()).max().unwrap_or(0) as u32;

    let mut figure = Figure::new(
        GAP + columns as u32 * (cell_width + GAP),
        GAP + rows as u32 * (cell_height + GAP),
    );
    for (i, image) in images.iter().enumerate() {
        let (vmin, vmax) = range(image.iter());
        let panel = Panel {
            x: GAP + (i % columns) as u32 * (cell_width + GAP),
            y: GAP + (i / columns) as u32 * (cell_height + GAP),
            width: image.ncols() as u32,
            height: image.nrows() as u32,
            vmin,
            vmax,
            label: None,
        };
        figure.draw(panel, image.view(), colormap, |row, column| (row, column));
    }
    Ok(figure)
}

/// Like [`disp2d`], with each stack `(k, h, w)` laid side by side into one
/// `(h, k * w)` image, so related images share a panel and its range.
pub fn disp2d_compare(stacks: &[ArrayView3<f64>], colormap: Colormap) -> Result<Figure> {
    let rows = stacks
        .iter()
        .map(|stack| {
            let images: Vec<ArrayView2<f64>> = stack.outer_iter().collect();
            concatenate(Axis(1), &images).map_err(Error::from)
        })
        .collect::<Result<Vec<Array2<f64>>>>()?;
    let views: Vec<ArrayView2<f64>> = rows.iter().map(|row| row.view()).collect();
    disp2d(&views, colormap)
}

/// Renders the three central orthogonal slices of each volume `(z, y, x)`.
///
/// The `z` slice is drawn with the `x` slice (transposed, `z` along the
/// columns) to its right and the `y` slice below it, matching their shared
/// axes. The three slices of a volume share one intensity range. Unless
/// `axis_off` is set the panels are framed and labelled with the slice index.
pub fn disp3d(volumes: &[ArrayView3<f64>], axis_off: bool) -> Result<Figure> {
    if volumes.is_empty() {
        return Err(Error::precondition("disp3d needs at least one volume"));
    }
    let width: u32 = volumes
        .iter()
        .map(|v| (v.len_of(Axis(2)) + v.len_of(Axis(0))) as u32 + GAP)
        .sum();
    let height = volumes
        .iter()
        .map(|v| (v.len_of(Axis(1)) + v.len_of(Axis(0))) as u32)
        .max()
        .unwrap_or(0);
    let mut figure = Figure::new(GAP + width, 2 * GAP + height);

    let mut left = GAP;
    for volume in volumes {
        let (d, h, w) = volume.dim();
        let (cz, cy, cx) = (d / 2, h / 2, w / 2);
        let views = [
            volume.index_axis(Axis(0), cz),
            volume.index_axis(Axis(1), cy),
            volume.index_axis(Axis(2), cx),
        ];
        let (vmin, vmax) = range(views.iter().flat_map(|v| v.iter()));
        let panel = |x: u32, y: u32, width: usize, height: usize, label: String| Panel {
            x,
            y,
            width: width as u32,
            height: height as u32,
            vmin,
            vmax,
            label: if axis_off { None } else { Some(label) },
        };
        let panels = [
            panel(left, GAP, w, h, format!("Z={}", cz)),
            panel(left + w as u32, GAP, d, h, format!("X={}", cx)),
            panel(left, GAP + h as u32, w, d, format!("Y={}", cy)),
        ];
        // frames first so neighbouring slices are not overdrawn
        if !axis_off {
            for p in &panels {
                figure.frame(p);
            }
        }
        let [z_panel, x_panel, y_panel] = panels;
        figure.draw(z_panel, views[0].view(), Colormap::Gray, |row, column| (row, column));
        figure.draw(x_panel, views[2].view(), Colormap::Gray, |row, column| (column, row));
        figure.draw(y_panel, views[1].view(), Colormap::Gray, |row, column| (row, column));
        left += (w + d) as u32 + GAP;
    }
    Ok(figure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_disp2d_grid() {
        let images: Vec<Array2<f64>> = (0..5)
            .map(|k| Array2::from_shape_fn((6, 8), |(i, j)| (i * 8 + j + k) as f64))
            .collect();
        let views: Vec<_> = images.iter().map(|i| i.view()).collect();
        let figure = disp2d(&views, Colormap::Gray).unwrap();
        // 2 rows of 3
        assert_eq!(figure.axes.len(), 5);
        assert_eq!(figure.canvas.dimensions(), (GAP + 3 * (8 + GAP), GAP + 2 * (6 + GAP)));
        let last = &figure.axes[4];
        assert_eq!((last.x, last.y), (GAP + 8 + GAP, GAP + 6 + GAP));

        let first = &figure.axes[0];
        assert_eq!(*figure.canvas.get_pixel(first.x, first.y), Rgb([0, 0, 0]));
        assert_eq!(*figure.canvas.get_pixel(first.x + 7, first.y + 5), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_disp3d_layout() {
        let mut volume = Array3::<f64>::zeros((4, 6, 10));
        volume[[2, 3, 5]] = 1.0;
        let figure = disp3d(&[volume.view(), volume.view()], false).unwrap();
        assert_eq!(figure.axes.len(), 6);

        let (z, x, y) = (&figure.axes[0], &figure.axes[1], &figure.axes[2]);
        assert_eq!((z.width, z.height), (10, 6));
        assert_eq!((x.x, x.width, x.height), (z.x + 10, 4, 6));
        assert_eq!((y.y, y.width, y.height), (z.y + 6, 10, 4));
        assert_eq!(z.label.as_deref(), Some("Z=2"));
        assert_eq!((z.vmin, z.vmax), (0.0, 1.0));

        // the bright voxel sits on all three central slices
        let white = Rgb([255, 255, 255]);
        assert_eq!(*figure.canvas.get_pixel(z.x + 5, z.y + 3), white);
        assert_eq!(*figure.canvas.get_pixel(x.x + 2, x.y + 3), white);
        assert_eq!(*figure.canvas.get_pixel(y.x + 5, y.y + 2), white);
        assert_eq!(*figure.canvas.get_pixel(z.x, z.y), Rgb([0, 0, 0]));
        assert_eq!(figure.axes[3].x, z.x + 14 + GAP);

        let bare = disp3d(&[volume.view()], true).unwrap();
        assert!(bare.axes.iter().all(|p| p.label.is_none()));
    }

    #[test]
    fn test_disp2d_compare_joins_stacks() {
        let a = Array3::from_shape_fn((3, 4, 5), |(k, i, j)| (k * 20 + i * 5 + j) as f64);
        let b = Array3::<f64>::zeros((3, 4, 5));
        let figure = disp2d_compare(&[a.view(), b.view()], Colormap::Gray).unwrap();
        assert_eq!(figure.axes.len(), 2);
        let first = &figure.axes[0];
        assert_eq!((first.width, first.height), (15, 4));
        assert_eq!((first.vmin, first.vmax), (0.0, 59.0));
        // last column of the last image of the stack is the brightest
        assert_eq!(*figure.canvas.get_pixel(first.x + 14, first.y + 3), Rgb([255, 255, 255]));
        assert_eq!(figure.axes[1].x, first.x + 15 + GAP);

        let empty = Array3::<f64>::zeros((0, 4, 5));
        assert!(disp2d_compare(&[empty.view()], Colormap::Gray).is_err());
    }

    #[test]
    fn test_colormaps() {
        assert_eq!(Colormap::Gray.color(0.5), Rgb([128, 128, 128]));
        assert_eq!(Colormap::Gray.color(f64::NAN), Rgb([0, 0, 0]));
        assert_eq!(Colormap::Lch.color(0.0), Rgb([0, 0, 0]));
        assert!(disp2d(&[], Colormap::Gray).is_err());
    }
}
