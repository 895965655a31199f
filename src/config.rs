use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use image::ImageFormat;

use crate::errors::{Result, SegInferError};

/// Reference long side used by the multi-scale evaluator when none is given.
pub const DEFAULT_MS_BASE_SIZE: u32 = 520;

/// Default size of one visualization tile, as (width, height).
pub const DEFAULT_VIS_SIZE: (u32, u32) = (64, 128);

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(short, long)]
    pub model_path: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(short, long)]
    pub num_class: usize,

    /// Evaluate at several scales with sliding windows instead of one resized pass.
    #[arg(long)]
    pub multi_scale: bool,

    /// Shorter side of the resized input (single-scale only).
    #[arg(long)]
    pub base_size: Option<u32>,

    /// Comma separated evaluation scales (multi-scale only).
    #[arg(long, value_delimiter = ',')]
    pub scales: Vec<f32>,

    /// Sliding window size (multi-scale only).
    #[arg(long)]
    pub crop: Option<u32>,

    #[arg(long, default_value_t = DEFAULT_MS_BASE_SIZE)]
    pub ms_base_size: u32,

    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_error: FailurePolicy,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Render every input next to its colorized prediction in one grid image.
    Visualize {
        /// Image file, or directory searched recursively.
        input: PathBuf,

        #[arg(short, long)]
        save_path: PathBuf,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = DEFAULT_VIS_SIZE.0)]
        tile_width: u32,

        #[arg(long, default_value_t = DEFAULT_VIS_SIZE.1)]
        tile_height: u32,
    },
    /// Write one raw label mask per input image.
    Infer {
        input_dir: PathBuf,

        #[arg(default_value = "output")]
        output_dir: PathBuf,

        #[arg(short, long, default_value = "png", value_parser = check_format)]
        format: String,
    },
}

/// What a batch driver does when one image fails.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure and return its error.
    #[default]
    Abort,
    /// Log the failure, record it in the batch report and move on.
    Skip,
}

/// How a single image is evaluated.
#[derive(Clone, Debug, PartialEq)]
pub enum InferenceMode {
    /// Resize so the shorter side equals `base_size`, then one flipped pass.
    SingleScale { base_size: u32 },
    /// Sliding-window evaluation at each of `scales`, summed.
    MultiScale {
        scales: Vec<f32>,
        crop: u32,
        base_size: u32,
    },
}

impl InferenceMode {
    pub fn is_multi_scale(&self) -> bool {
        matches!(self, Self::MultiScale { .. })
    }
}

/// Immutable inference settings shared by every image of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct InferConfig {
    pub mode: InferenceMode,
    pub num_class: usize,
    pub save_path: Option<PathBuf>,
    /// `(width, height)` of each visualization tile.
    pub vis_size: (u32, u32),
    pub failure_policy: FailurePolicy,
}

impl InferConfig {
    pub fn single_scale(base_size: u32, num_class: usize) -> Self {
        Self {
            mode: InferenceMode::SingleScale { base_size },
            num_class,
            save_path: None,
            vis_size: DEFAULT_VIS_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn multi_scale(scales: Vec<f32>, crop: u32, num_class: usize) -> Self {
        Self {
            mode: InferenceMode::MultiScale {
                scales,
                crop,
                base_size: DEFAULT_MS_BASE_SIZE,
            },
            num_class,
            save_path: None,
            vis_size: DEFAULT_VIS_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    pub fn with_vis_size(mut self, width: u32, height: u32) -> Self {
        self.vis_size = (width, height);
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_class == 0 {
            return Err(SegInferError::validation("num_class", "must be at least 1"));
        }
        if self.num_class > 256 {
            tracing::warn!(
                num_class = self.num_class,
                "class indices above 255 do not fit the 8-bit label mask and will wrap"
            );
        }

        match &self.mode {
            InferenceMode::SingleScale { base_size } => {
                if *base_size == 0 {
                    return Err(SegInferError::validation("base_size", "must be positive"));
                }
            }
            InferenceMode::MultiScale {
                scales,
                crop,
                base_size,
            } => {
                if scales.is_empty() {
                    return Err(SegInferError::validation("scales", "must not be empty"));
                }
                if let Some(scale) = scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
                    return Err(SegInferError::validation(
                        "scales",
                        format!("must be positive, got {scale}"),
                    ));
                }
                if *crop == 0 {
                    return Err(SegInferError::validation("crop", "must be positive"));
                }
                if *base_size == 0 {
                    return Err(SegInferError::validation("ms_base_size", "must be positive"));
                }
            }
        }

        if self.vis_size.0 == 0 || self.vis_size.1 == 0 {
            return Err(SegInferError::validation("vis_size", "must be positive"));
        }

        Ok(())
    }
}

impl Config {
    /// Builds the validated inference settings for the selected mode.
    ///
    /// Options belonging to the inactive mode are ignored; options the active
    /// mode needs must be present.
    pub fn inference_config(&self) -> Result<InferConfig> {
        let mode = if self.multi_scale {
            if self.scales.is_empty() {
                return Err(SegInferError::missing_option("scales", "multi-scale"));
            }
            InferenceMode::MultiScale {
                scales: self.scales.clone(),
                crop: self
                    .crop
                    .ok_or_else(|| SegInferError::missing_option("crop", "multi-scale"))?,
                base_size: self.ms_base_size,
            }
        } else {
            InferenceMode::SingleScale {
                base_size: self
                    .base_size
                    .ok_or_else(|| SegInferError::missing_option("base_size", "single-scale"))?,
            }
        };

        let (save_path, vis_size) = match &self.command {
            Command::Visualize {
                save_path,
                tile_width,
                tile_height,
                ..
            } => (Some(save_path.clone()), (*tile_width, *tile_height)),
            Command::Infer { .. } => (None, DEFAULT_VIS_SIZE),
        };

        let config = InferConfig {
            mode,
            num_class: self.num_class,
            save_path,
            vis_size,
            failure_policy: self.on_error,
        };
        config.validate()?;
        Ok(config)
    }
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}
