use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over a pretrained semantic-segmentation network.
///
/// Implementations are evaluated through `&self` only; there is no training
/// or evaluation mode to toggle before a batch.
pub trait SegmentationModel: Send + Sync {
    /// Runs one forward pass.
    ///
    /// `tensor` is a normalized `N x 3 x H x W` batch. The result holds raw
    /// class scores shaped `N x num_class x H x W`, at the input resolution.
    fn forward(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Number of classes the network scores, if known up front.
    fn num_class(&self) -> Option<usize> {
        None
    }
}
