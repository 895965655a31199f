use std::path::Path;

use crate::{
    errors::{Result, SegInferError},
    tensor::resize_batch,
    traits::SegmentationModel,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Segmentation network exported to ONNX, run with ONNX Runtime.
///
/// The graph takes one `N x 3 x H x W` float input and its first output holds
/// the class scores. Outputs smaller than the input are upsampled bilinearly.
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    num_class: Option<usize>,
}

impl OnnxModel {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let load_operation = format!("model load: {}", model_path.display());
        let session = SessionBuilder::new()
            .map_err(|e| SegInferError::model("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| SegInferError::model("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| SegInferError::model("memory pattern setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| SegInferError::model(&load_operation, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| SegInferError::model("model input lookup", "graph has no input"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| SegInferError::model("model output lookup", "graph has no output"))?;
        let output_name = output.name.clone();
        let num_class = output
            .output_type
            .tensor_shape()
            .and_then(|shape| shape.get(1).copied())
            .filter(|&classes| classes > 0)
            .map(|classes| classes as usize);

        info!(
            path = %model_path.display(),
            input = %input_name,
            output = %output_name,
            ?num_class,
            "loaded segmentation model"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            num_class,
        })
    }
}

impl SegmentationModel for OnnxModel {
    fn forward(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (_, _, height, width) = tensor.dim();
        let input = tensor.as_standard_layout();
        let scores = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(&input)?
            ])?;
            outputs[self.output_name.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix4>()?
                .to_owned()
        };

        let (_, _, out_h, out_w) = scores.dim();
        if (out_h, out_w) == (height, width) {
            return Ok(scores);
        }
        debug!(out_h, out_w, height, width, "upsampling model output");
        Ok(resize_batch(scores.view(), height, width))
    }

    fn num_class(&self) -> Option<usize> {
        self.num_class
    }
}
