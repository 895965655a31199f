//! Test-time evaluation strategies on top of a [`SegmentationModel`].

use ndarray::prelude::*;
use tracing::debug;

use crate::errors::{Result, SegInferError};
use crate::preprocess::pad_values;
use crate::tensor::{hflip, pad_to, resize_batch};
use crate::traits::SegmentationModel;

/// Overlap between neighbouring sliding windows, as a fraction of the crop size.
const STRIDE_RATE: f32 = 2.0 / 3.0;

/// Runs one forward pass, optionally adding the mirrored prediction of the mirrored input.
///
/// Returns `exp` of the (summed) scores, shaped `N x num_class x H x W`.
pub fn flip_inference<M>(model: &M, batch: ArrayView4<f32>, flip: bool) -> Result<Array4<f32>>
where
    M: SegmentationModel + ?Sized,
{
    let mut output = model.forward(batch)?;
    check_output(&output, batch)?;

    if flip {
        let flipped_output = model.forward(hflip(batch).view())?;
        check_output(&flipped_output, batch)?;
        output += &hflip(flipped_output.view());
    }

    output.mapv_inplace(f32::exp);
    Ok(output)
}

fn check_output(output: &Array4<f32>, input: ArrayView4<f32>) -> Result<()> {
    let (n, _, h, w) = input.dim();
    let (on, _, oh, ow) = output.dim();
    if (on, oh, ow) != (n, h, w) {
        return Err(SegInferError::validation(
            "model output",
            format!("has shape {:?}, expected batch {n} at {h}x{w}", output.shape()),
        ));
    }
    Ok(())
}

/// Multi-scale sliding-window evaluator.
///
/// For each scale the input is resized so its long side is
/// `ceil(base_size * scale)`. Inputs that fit in one crop are padded and
/// evaluated whole; larger ones are covered by overlapping `crop x crop`
/// windows whose scores are averaged. Scores of every scale are resized back
/// to the input resolution and summed.
#[derive(Debug, Clone)]
pub struct MultiScaleEvaluator<'m, M: ?Sized> {
    model: &'m M,
    num_class: usize,
    scales: Vec<f32>,
    crop: usize,
    base_size: u32,
    flip: bool,
}

impl<'m, M> MultiScaleEvaluator<'m, M>
where
    M: SegmentationModel + ?Sized,
{
    pub fn new(
        model: &'m M,
        num_class: usize,
        scales: Vec<f32>,
        crop: u32,
        base_size: u32,
    ) -> Self {
        Self {
            model,
            num_class,
            scales,
            crop: crop as usize,
            base_size,
            flip: true,
        }
    }

    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    pub fn forward(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, _, h, w) = batch.dim();
        let mut scores = Array4::<f32>::zeros((n, self.num_class, h, w));

        for &scale in &self.scales {
            let long_size = (self.base_size as f32 * scale).ceil() as usize;
            let (height, width, short_size) = if h > w {
                let width = ((w * long_size) as f32 / h as f32 + 0.5) as usize;
                (long_size, width.max(1), width.max(1))
            } else {
                let height = ((h * long_size) as f32 / w as f32 + 0.5) as usize;
                (height.max(1), long_size, height.max(1))
            };
            debug!(scale, height, width, "evaluating scale");

            let resized = resize_batch(batch, height, width);
            let outputs = if long_size <= self.crop {
                let padded = pad_to(resized.view(), self.crop, self.crop, &pad_values());
                let outputs = self.infer(padded.view())?;
                outputs.slice(s![.., .., ..height, ..width]).to_owned()
            } else {
                self.sliding_window(resized.view(), short_size)?
            };

            scores += &resize_batch(outputs.view(), h, w);
        }

        Ok(scores)
    }

    fn sliding_window(&self, image: ArrayView4<f32>, short_size: usize) -> Result<Array4<f32>> {
        let (_, _, height, width) = image.dim();
        let padded = if short_size < self.crop {
            pad_to(image, self.crop, self.crop, &pad_values())
        } else {
            image.to_owned()
        };

        let (n, _, ph, pw) = padded.dim();
        let stride = ((self.crop as f32 * STRIDE_RATE) as usize).max(1);
        let h_grids = ph.saturating_sub(self.crop).div_ceil(stride) + 1;
        let w_grids = pw.saturating_sub(self.crop).div_ceil(stride) + 1;

        let mut outputs = Array4::<f32>::zeros((n, self.num_class, ph, pw));
        let mut counts = Array2::<f32>::zeros((ph, pw));
        for idh in 0..h_grids {
            for idw in 0..w_grids {
                let (h0, w0) = (idh * stride, idw * stride);
                let (h1, w1) = ((h0 + self.crop).min(ph), (w0 + self.crop).min(pw));

                let window = padded.slice(s![.., .., h0..h1, w0..w1]);
                let window = pad_to(window, self.crop, self.crop, &pad_values());
                let output = self.infer(window.view())?;

                let mut target = outputs.slice_mut(s![.., .., h0..h1, w0..w1]);
                target += &output.slice(s![.., .., ..h1 - h0, ..w1 - w0]);
                counts
                    .slice_mut(s![h0..h1, w0..w1])
                    .mapv_inplace(|c| c + 1.0);
            }
        }
        debug!(windows = h_grids * w_grids, stride, "sliding window pass done");

        outputs /= &counts;
        Ok(outputs.slice(s![.., .., ..height, ..width]).to_owned())
    }

    fn infer(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let output = flip_inference(self.model, batch, self.flip)?;
        let classes = output.shape()[1];
        if classes != self.num_class {
            return Err(SegInferError::validation(
                "model output",
                format!("scores {classes} classes, expected {}", self.num_class),
            ));
        }
        Ok(output)
    }
}
