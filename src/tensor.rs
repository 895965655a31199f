//! Small tensor helpers shared by preprocessing, evaluation and the model backend.
//!
//! Float data never goes through `image::imageops::resize`, which clamps float
//! pixels into `[0, 1]`.

use ndarray::prelude::*;
use rayon::prelude::*;

/// Source taps and weight of the second tap for each output position along one axis.
///
/// Pixel centers are aligned (`src = (dst + 0.5) * in / out - 0.5`), clamped
/// to the border.
fn axis_taps(input: usize, output: usize) -> Vec<(usize, usize, f32)> {
    let ratio = input as f32 / output as f32;
    (0..output)
        .map(|dst| {
            let src = ((dst as f32 + 0.5) * ratio - 0.5).max(0.0);
            let lo = (src.floor() as usize).min(input - 1);
            let hi = (lo + 1).min(input - 1);
            (lo, hi, src - lo as f32)
        })
        .collect()
}

fn resize_plane(
    plane: ArrayView2<f32>,
    rows: &[(usize, usize, f32)],
    cols: &[(usize, usize, f32)],
) -> Array2<f32> {
    Array2::from_shape_fn((rows.len(), cols.len()), |(y, x)| {
        let (y0, y1, fy) = rows[y];
        let (x0, x1, fx) = cols[x];
        let top = plane[[y0, x0]] * (1.0 - fx) + plane[[y0, x1]] * fx;
        let bottom = plane[[y1, x0]] * (1.0 - fx) + plane[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// Bilinear resize of a `C x H x W` tensor to `C x height x width`, one channel per rayon task.
pub fn resize_bilinear(input: ArrayView3<f32>, height: usize, width: usize) -> Array3<f32> {
    let (channels, in_h, in_w) = input.dim();
    if (in_h, in_w) == (height, width) {
        return input.to_owned();
    }
    if channels == 0 || in_h == 0 || in_w == 0 {
        return Array3::zeros((channels, height, width));
    }

    let rows = axis_taps(in_h, height);
    let cols = axis_taps(in_w, width);
    let planes: Vec<Array2<f32>> = (0..channels)
        .into_par_iter()
        .map(|c| resize_plane(input.index_axis(Axis(0), c), &rows, &cols))
        .collect();

    let mut output = Array3::zeros((channels, height, width));
    for (mut dst, plane) in output.outer_iter_mut().zip(planes) {
        dst.assign(&plane);
    }
    output
}

/// Bilinear resize of every item of a `N x C x H x W` batch.
pub fn resize_batch(batch: ArrayView4<f32>, height: usize, width: usize) -> Array4<f32> {
    let (n, c, h, w) = batch.dim();
    if (h, w) == (height, width) {
        return batch.to_owned();
    }

    let mut output = Array4::zeros((n, c, height, width));
    for (mut dst, item) in output.outer_iter_mut().zip(batch.outer_iter()) {
        dst.assign(&resize_bilinear(item, height, width));
    }
    output
}

/// Mirrors a `N x C x H x W` batch along its width axis.
pub fn hflip(tensor: ArrayView4<f32>) -> Array4<f32> {
    tensor.slice(s![.., .., .., ..;-1]).to_owned()
}

/// Pads a `N x C x H x W` batch on the bottom and right to at least `height x width`.
///
/// Channel `c` of the padded area is filled with `values[c]`.
pub fn pad_to(tensor: ArrayView4<f32>, height: usize, width: usize, values: &[f32]) -> Array4<f32> {
    let (n, c, h, w) = tensor.dim();
    let (ph, pw) = (h.max(height), w.max(width));
    if (ph, pw) == (h, w) {
        return tensor.to_owned();
    }

    let mut padded = Array4::zeros((n, c, ph, pw));
    for (channel, mut plane) in padded.axis_iter_mut(Axis(1)).enumerate() {
        plane.fill(values.get(channel).copied().unwrap_or(0.0));
    }
    padded.slice_mut(s![.., .., ..h, ..w]).assign(&tensor);
    padded
}
