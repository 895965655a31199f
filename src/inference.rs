use std::path::Path;

use image::RgbImage;
use ndarray::prelude::*;
use tracing::debug;

use crate::config::{InferConfig, InferenceMode};
use crate::errors::{Result, SegInferError};
use crate::evaluator::{flip_inference, MultiScaleEvaluator};
use crate::postprocess::{argmax_labels, restore_size, LabelMask};
use crate::preprocess::{normalize, read_rgb, resize_short_side, to_batch_tensor};
use crate::traits::SegmentationModel;

enum Strategy<'m, M: ?Sized> {
    SingleScale { model: &'m M, base_size: u32 },
    MultiScale(MultiScaleEvaluator<'m, M>),
}

/// Single-image inference bound to one model and one configuration.
///
/// The multi-scale evaluator, when configured, is built once here and reused
/// for every image passed to the predictor.
pub struct Predictor<'m, M: ?Sized> {
    strategy: Strategy<'m, M>,
    num_class: usize,
}

impl<'m, M> Predictor<'m, M>
where
    M: SegmentationModel + ?Sized,
{
    pub fn new(model: &'m M, config: &InferConfig) -> Result<Self> {
        config.validate()?;
        if let Some(model_classes) = model.num_class() {
            if model_classes != config.num_class {
                return Err(SegInferError::validation(
                    "num_class",
                    format!(
                        "is {} but the model scores {model_classes} classes",
                        config.num_class
                    ),
                ));
            }
        }

        let strategy = match &config.mode {
            InferenceMode::SingleScale { base_size } => Strategy::SingleScale {
                model,
                base_size: *base_size,
            },
            InferenceMode::MultiScale {
                scales,
                crop,
                base_size,
            } => Strategy::MultiScale(MultiScaleEvaluator::new(
                model,
                config.num_class,
                scales.clone(),
                *crop,
                *base_size,
            )),
        };

        Ok(Self {
            strategy,
            num_class: config.num_class,
        })
    }

    /// Decodes the image at `path` and predicts its label mask.
    pub fn predict_path(&self, path: &Path) -> Result<LabelMask> {
        debug!(path = %path.display(), "predicting");
        let image = read_rgb(path)?;
        self.predict(&image)
    }

    /// Predicts a label mask with the same width and height as `image`.
    pub fn predict(&self, image: &RgbImage) -> Result<LabelMask> {
        let (width, height) = image.dimensions();
        let tensor = normalize(image);

        let scores = match &self.strategy {
            Strategy::MultiScale(evaluator) => evaluator.forward(to_batch_tensor(tensor)?.view())?,
            Strategy::SingleScale { model, base_size } => {
                let resized = resize_short_side(tensor.view(), *base_size);
                flip_inference(*model, to_batch_tensor(resized)?.view(), true)?
            }
        };

        let classes = scores.shape()[1];
        if classes != self.num_class {
            return Err(SegInferError::validation(
                "model output",
                format!("scores {classes} classes, expected {}", self.num_class),
            ));
        }

        let labels = argmax_labels(scores.index_axis(Axis(0), 0))?;
        Ok(restore_size(&labels, width, height))
    }
}

/// One-off inference of a single image file.
///
/// Batch callers should build one [`Predictor`] and reuse it instead.
pub fn infer_image<M>(model: &M, path: &Path, config: &InferConfig) -> Result<LabelMask>
where
    M: SegmentationModel + ?Sized,
{
    Predictor::new(model, config)?.predict_path(path)
}
