use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seg_infer_rs::{
    collect_image_files, infer_and_save, output_path_for, visualize_images, BatchReport, Command,
    Config, OnnxModel,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let config = Config::parse();
    ensure!(config.model_path.exists(), "Model path does not exist");
    let infer_config = config.inference_config()?;

    let model = OnnxModel::new(&config.model_path, config.device_id)
        .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;
    info!(
        multi_scale = infer_config.mode.is_multi_scale(),
        num_class = infer_config.num_class,
        "inference configured"
    );

    let report = match &config.command {
        Command::Visualize { input, limit, .. } => {
            let mut image_paths = collect_image_files(input)?;
            if let Some(limit) = limit {
                image_paths.truncate(*limit);
            }
            ensure!(!image_paths.is_empty(), "No image found in {}", input.display());
            visualize_images(&model, &image_paths, &infer_config)?
        }
        Command::Infer {
            input_dir,
            output_dir,
            format,
        } => {
            ensure!(input_dir.is_dir(), "Input directory does not exist");
            let image_paths = collect_image_files(input_dir)?;
            let save_paths = image_paths
                .iter()
                .map(|path| output_path_for(path, input_dir, output_dir, format))
                .collect::<seg_infer_rs::Result<Vec<_>>>()?;
            infer_and_save(&model, &image_paths, &save_paths, &infer_config)?
        }
    };

    report_failures(&report);
    Ok(())
}

fn report_failures(report: &BatchReport) {
    if report.failed.is_empty() {
        return;
    }
    warn!(
        failed = report.failed.len(),
        processed = report.processed,
        "some images could not be processed"
    );
    for (path, reason) in &report.failed {
        warn!(path = %path.display(), reason = %reason, "skipped image");
    }
}
