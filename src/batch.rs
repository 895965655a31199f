use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use tracing::{info, warn};

use crate::config::{FailurePolicy, InferConfig};
use crate::errors::{Result, SegInferError};
use crate::inference::Predictor;
use crate::traits::SegmentationModel;
use crate::visualize::{prepare_visualization, visualization_grid};

/// Outcome of one batch driver call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Images that went through the whole pipeline.
    pub processed: usize,
    /// Skipped images and the reason, only filled under [`FailurePolicy::Skip`].
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    fn handle_failure(
        &mut self,
        path: &Path,
        err: SegInferError,
        policy: FailurePolicy,
    ) -> Result<()> {
        match policy {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip => {
                warn!(path = %path.display(), error = %err, "skipping image");
                self.failed.push((path.to_path_buf(), err.to_string()));
                Ok(())
            }
        }
    }
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let progress_bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        progress_bar.set_style(style.progress_chars("#>-"));
    }
    progress_bar.with_message(message)
}

fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| SegInferError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })
        }
        _ => Ok(()),
    }
}

/// Predicts every image and saves one grid of (image, colorized mask) pairs to
/// `config.save_path`.
///
/// The grid is written only once every image has been handled. Under
/// [`FailurePolicy::Abort`] the first failure therefore discards the whole
/// batch; under [`FailurePolicy::Skip`] failed images are left out of the grid.
pub fn visualize_images<M>(
    model: &M,
    paths: &[PathBuf],
    config: &InferConfig,
) -> Result<BatchReport>
where
    M: SegmentationModel + ?Sized,
{
    let save_path = config
        .save_path
        .as_deref()
        .ok_or_else(|| SegInferError::missing_option("save_path", "visualization"))?;
    let predictor = Predictor::new(model, config)?;

    let mut report = BatchReport::default();
    let mut pairs = Vec::with_capacity(paths.len());
    let progress = progress_bar(paths.len(), "Visualizing");
    for path in paths.iter().progress_with(progress.clone()) {
        let pair = predictor
            .predict_path(path)
            .and_then(|mask| prepare_visualization(path, &mask, config.vis_size));
        match pair {
            Ok(pair) => {
                pairs.push(pair);
                report.processed += 1;
            }
            Err(err) => report.handle_failure(path, err, config.failure_policy)?,
        }
    }
    progress.finish();

    if pairs.is_empty() {
        return Err(SegInferError::validation(
            "visualization",
            "has no successfully predicted image to draw",
        ));
    }

    let grid = visualization_grid(&pairs)?;
    create_parent_dir(save_path)?;
    let grid_path = save_path.display().to_string();
    grid.save(save_path).map_err(|e| SegInferError::image(grid_path, "grid save", e))?;

    info!(
        images = report.processed,
        skipped = report.failed.len(),
        path = %save_path.display(),
        "saved visualization grid"
    );
    Ok(report)
}

/// Predicts every image of `paths` and saves its raw label mask to the matching
/// entry of `save_paths`.
///
/// Masks are written as soon as they are predicted, so outputs completed
/// before a failure stay on disk whatever the failure policy.
pub fn infer_and_save<M>(
    model: &M,
    paths: &[PathBuf],
    save_paths: &[PathBuf],
    config: &InferConfig,
) -> Result<BatchReport>
where
    M: SegmentationModel + ?Sized,
{
    if paths.len() != save_paths.len() {
        return Err(SegInferError::validation(
            "save_paths",
            format!(
                "has {} entries for {} input images",
                save_paths.len(),
                paths.len()
            ),
        ));
    }
    let predictor = Predictor::new(model, config)?;

    let mut report = BatchReport::default();
    let progress = progress_bar(paths.len(), "Inference");
    for (path, save_path) in paths.iter().zip(save_paths).progress_with(progress.clone()) {
        let saved = predictor.predict_path(path).and_then(|mask| {
            create_parent_dir(save_path)?;
            mask.save(save_path).map_err(|e| {
                SegInferError::image(save_path.display().to_string(), "mask save", e)
            })
        });
        match saved {
            Ok(()) => report.processed += 1,
            Err(err) => report.handle_failure(path, err, config.failure_policy)?,
        }
    }
    progress.finish();

    info!(
        images = report.processed,
        skipped = report.failed.len(),
        "saved label masks"
    );
    Ok(report)
}
