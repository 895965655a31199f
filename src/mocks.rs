use crate::errors::Result;
use crate::traits::SegmentationModel;
use ndarray::prelude::*;
use parking_lot::Mutex;

/// テスト用のモックセグメンテーションモデル
///
/// Scores every pixel from its first input channel only: class `k` gets
/// `-(v - anchor_k)^2`, with anchors spread evenly over the normalized
/// intensity range. Dark pixels land in class 0 and bright pixels in the last
/// class.
#[derive(Debug, Clone)]
pub struct PixelwiseMockModel {
    pub num_class: usize,
    output_scale: usize,
}

impl PixelwiseMockModel {
    pub const fn new(num_class: usize) -> Self {
        Self {
            num_class,
            output_scale: 1,
        }
    }

    /// Emits scores at `1 / factor` of the input resolution.
    pub fn with_output_scale(mut self, factor: usize) -> Self {
        self.output_scale = factor;
        self
    }

    fn anchor(&self, class: usize) -> f32 {
        if self.num_class < 2 {
            return 0.0;
        }
        -2.2 + 4.5 * class as f32 / (self.num_class - 1) as f32
    }
}

impl SegmentationModel for PixelwiseMockModel {
    fn forward(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, _, h, w) = tensor.dim();
        let factor = self.output_scale.max(1);
        let (oh, ow) = ((h / factor).max(1), (w / factor).max(1));
        Ok(Array4::from_shape_fn(
            (n, self.num_class, oh, ow),
            |(b, class, y, x)| {
                let v = tensor[[b, 0, y * factor, x * factor]];
                -(v - self.anchor(class)).powi(2)
            },
        ))
    }

    fn num_class(&self) -> Option<usize> {
        Some(self.num_class)
    }
}

/// テスト用: 呼び出し回数と入力サイズを記録するモデル
#[derive(Debug, Default)]
pub struct CountingModel {
    num_class: usize,
    inputs: Mutex<Vec<(usize, usize)>>,
}

impl CountingModel {
    pub fn new(num_class: usize) -> Self {
        Self {
            num_class,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    /// `(height, width)` of every batch seen so far.
    pub fn input_sizes(&self) -> Vec<(usize, usize)> {
        self.inputs.lock().clone()
    }
}

impl SegmentationModel for CountingModel {
    fn forward(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, _, h, w) = tensor.dim();
        self.inputs.lock().push((h, w));
        Ok(Array4::zeros((n, self.num_class, h, w)))
    }
}

/// テスト用のファクトリー関数
pub const fn create_mock_model() -> PixelwiseMockModel {
    PixelwiseMockModel::new(2)
}
