pub mod batch;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod inference;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod tensor;
pub mod traits;
pub mod visualize;

pub mod mocks;

use image::ImageFormat;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use batch::{infer_and_save, visualize_images, BatchReport};
pub use config::{Command, Config, FailurePolicy, InferConfig, InferenceMode};
pub use errors::{Result, SegInferError};
pub use inference::{infer_image, Predictor};
pub use model::OnnxModel;
pub use postprocess::LabelMask;
pub use traits::SegmentationModel;

/// Whether `path` has the extension of an image format this build can decode.
pub fn is_supported_image_format(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
}

/// Lists the images under `input`, sorted by path.
///
/// A file is returned as is; a directory is walked recursively and only
/// decodable image files are kept.
pub fn collect_image_files(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(SegInferError::FileSystem {
            path: input.to_path_buf(),
            operation: "input lookup".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "input does not exist"),
        });
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let image_files = WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
        .map(|e| e.into_path())
        .collect();
    Ok(image_files)
}

/// Mirrors `input_file` from `input_dir` into `output_dir`, replacing its extension with `format`.
pub fn output_path_for(
    input_file: &Path,
    input_dir: &Path,
    output_dir: &Path,
    format: &str,
) -> Result<PathBuf> {
    input_file
        .strip_prefix(input_dir)
        .map(|relative| output_dir.join(relative).with_extension(format))
        .map_err(|_| SegInferError::FileSystem {
            path: input_file.to_path_buf(),
            operation: "relative path lookup".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "input file is not inside the input directory",
            ),
        })
}
