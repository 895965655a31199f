use image::{imageops, imageops::FilterType, GrayImage};
use ndarray::{prelude::*, Zip};

use crate::errors::{Result, SegInferError};

/// Per-pixel class indices, one byte per pixel.
pub type LabelMask = GrayImage;

/// Reduces `num_class x H x W` scores to the index of the highest score per pixel.
///
/// Ties keep the lowest class index. Indices are cast to `u8` without a range check.
pub fn argmax_labels(scores: ArrayView3<f32>) -> Result<LabelMask> {
    let (classes, height, width) = scores.dim();
    if classes == 0 {
        return Err(SegInferError::validation("scores", "has no class channel"));
    }

    let mut best = scores.index_axis(Axis(0), 0).to_owned();
    let mut labels = Array2::<u8>::zeros((height, width));
    for (class, channel) in scores.outer_iter().enumerate().skip(1) {
        Zip::from(&mut best)
            .and(&mut labels)
            .and(&channel)
            .for_each(|best, label, &score| {
                if score > *best {
                    *best = score;
                    *label = class as u8;
                }
            });
    }

    let (raw, _) = labels.into_raw_vec_and_offset();
    GrayImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
        SegInferError::validation("labels", "buffer does not match the score map size")
    })
}

/// Resizes a label mask with nearest-neighbor sampling so no new class values appear.
pub fn restore_size(mask: &LabelMask, width: u32, height: u32) -> LabelMask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Nearest)
}
