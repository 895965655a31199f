use std::path::Path;

use image::RgbImage;
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{Result, SegInferError};
use crate::tensor::resize_bilinear;

/// Per-channel mean of the training data, in R, G, B order.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation of the training data, in R, G, B order.
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decodes an image file and converts it to 8-bit RGB at native resolution.
pub fn read_rgb(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .map_err(|e| SegInferError::image(path.display().to_string(), "image decode", e))?;
    Ok(image.into_rgb8())
}

/// Scales intensities to `[0, 1]`, subtracts [`MEAN`] and divides by [`STD`].
///
/// The result is channel-first, `3 x H x W`.
pub fn normalize(image: &RgbImage) -> Array3<f32> {
    let mut tensor = image.as_ndarray3().mapv(|v| f32::from(v) / 255.0);
    for (c, mut channel) in tensor.outer_iter_mut().enumerate() {
        channel.mapv_inplace(|v| (v - MEAN[c]) / STD[c]);
    }
    tensor
}

/// Normalized value of a black pixel, used when padding normalized tensors.
pub fn pad_values() -> [f32; 3] {
    std::array::from_fn(|c| -MEAN[c] / STD[c])
}

/// Size `(height, width)` whose shorter side equals `base_size`, keeping the aspect ratio.
pub fn short_side_size(height: usize, width: usize, base_size: u32) -> (usize, usize) {
    let scale = f64::from(base_size) / height.min(width) as f64;
    let resized_h = (height as f64 * scale) as usize;
    let resized_w = (width as f64 * scale) as usize;
    (resized_h.max(1), resized_w.max(1))
}

/// Linearly resizes a normalized `3 x H x W` tensor so its shorter side equals `base_size`.
pub fn resize_short_side(tensor: ArrayView3<f32>, base_size: u32) -> Array3<f32> {
    let (_, height, width) = tensor.dim();
    let (resized_h, resized_w) = short_side_size(height, width, base_size);
    resize_bilinear(tensor, resized_h, resized_w)
}

/// Wraps a normalized `3 x H x W` tensor into a single-item `1 x 3 x H x W` batch.
pub fn to_batch_tensor(tensor: Array3<f32>) -> Result<Array4<f32>> {
    let channels = tensor.shape()[0];
    if channels != 3 {
        return Err(SegInferError::validation(
            "image",
            format!("expected 3 color channels, got {channels}"),
        ));
    }
    Ok(tensor.insert_axis(Axis(0)).as_standard_layout().into_owned())
}
