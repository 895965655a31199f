use image::{Rgb, RgbImage};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use seg_infer_rs::{
    infer_and_save, infer_image, mocks::PixelwiseMockModel, visualize_images, FailurePolicy,
    InferConfig, SegInferError,
};

fn write_image(dir: &Path, name: &str, width: u32, height: u32, seed: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x * 11 + y * 3 + seed * 40) % 256) as u8, 60, 200])
    })
    .save(&path)
    .unwrap();
    path
}

fn write_broken(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"definitely not a png").unwrap();
    path
}

#[test]
fn test_infer_and_save_writes_every_mask() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(3);
    let config = InferConfig::single_scale(24, 3);

    let inputs = vec![
        write_image(temp_dir.path(), "a.png", 40, 30, 0),
        write_image(temp_dir.path(), "b.png", 25, 50, 1),
        write_image(temp_dir.path(), "c.png", 64, 64, 2),
    ];
    let outputs: Vec<PathBuf> = ["out/a.png", "out/b.png", "out/nested/c.png"]
        .iter()
        .map(|name| temp_dir.path().join(name))
        .collect();

    let report = infer_and_save(&model, &inputs, &outputs, &config)?;

    assert_eq!(report.processed, 3);
    assert!(report.failed.is_empty());
    // 出力ディレクトリ以下のファイルは期待した3つだけ
    let written: BTreeSet<PathBuf> = WalkDir::new(temp_dir.path().join("out"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    let expected: BTreeSet<PathBuf> = outputs.iter().cloned().collect();
    assert_eq!(written, expected);

    // バッチ処理の結果は単体推論と一致する
    for (input, output) in inputs.iter().zip(&outputs) {
        let saved = image::open(output)?.into_luma8();
        let expected = infer_image(&model, input, &config)?;
        assert_eq!(saved, expected, "{}", output.display());
    }

    Ok(())
}

#[test]
fn test_infer_and_save_skip_policy_continues() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(2);
    let config = InferConfig::single_scale(16, 2).with_failure_policy(FailurePolicy::Skip);

    let broken = write_broken(temp_dir.path(), "b.png");
    let inputs = vec![
        write_image(temp_dir.path(), "a.png", 20, 20, 0),
        broken.clone(),
        write_image(temp_dir.path(), "c.png", 20, 20, 2),
    ];
    let outputs: Vec<PathBuf> = ["a_mask.png", "b_mask.png", "c_mask.png"]
        .iter()
        .map(|name| temp_dir.path().join(name))
        .collect();

    let report = infer_and_save(&model, &inputs, &outputs, &config)?;

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, broken);
    assert!(outputs[0].exists());
    assert!(!outputs[1].exists());
    assert!(outputs[2].exists());

    Ok(())
}

#[test]
fn test_infer_and_save_abort_keeps_earlier_masks() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(2);
    let config = InferConfig::single_scale(16, 2);
    assert_eq!(config.failure_policy, FailurePolicy::Abort);

    let inputs = vec![
        write_image(temp_dir.path(), "a.png", 20, 20, 0),
        write_broken(temp_dir.path(), "b.png"),
        write_image(temp_dir.path(), "c.png", 20, 20, 2),
    ];
    let outputs: Vec<PathBuf> = ["a_mask.png", "b_mask.png", "c_mask.png"]
        .iter()
        .map(|name| temp_dir.path().join(name))
        .collect();

    let result = infer_and_save(&model, &inputs, &outputs, &config);

    assert!(matches!(result, Err(SegInferError::ImageProcessing { .. })));
    assert!(outputs[0].exists());
    assert!(!outputs[1].exists());
    assert!(!outputs[2].exists());

    Ok(())
}

#[test]
fn test_visualize_images_grid_layout() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(2);
    let grid_path = temp_dir.path().join("vis/grid.png");
    let config = InferConfig::single_scale(16, 2)
        .with_save_path(&grid_path)
        .with_vis_size(8, 12);

    // 白一色の画像はクラス1（パレットでは暗い赤）になる
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| {
            let path = temp_dir.path().join(format!("white_{i}.png"));
            RgbImage::from_pixel(30 + i * 5, 20, Rgb([255, 255, 255]))
                .save(&path)
                .unwrap();
            path
        })
        .collect();

    let report = visualize_images(&model, &inputs, &config)?;
    assert_eq!(report.processed, 3);

    let grid = image::open(&grid_path)?.into_rgb8();
    // 16ペア = 32タイル/行、間隔4px
    assert_eq!(grid.dimensions(), (32 * 8 + 31 * 4, 12));
    assert_eq!(grid.get_pixel(0, 0), &Rgb([255, 255, 255]));
    assert_eq!(grid.get_pixel(12, 0), &Rgb([128, 0, 0]));
    // タイル間の余白
    assert_eq!(grid.get_pixel(9, 5), &Rgb([255, 255, 255]));
    // 画像のない残りのタイル
    assert_eq!(grid.get_pixel(6 * 12, 5), &Rgb([255, 255, 255]));

    Ok(())
}

#[test]
fn test_visualize_images_rows_round_up() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(2);
    let grid_path = temp_dir.path().join("grid.png");
    let config = InferConfig::single_scale(8, 2)
        .with_save_path(&grid_path)
        .with_vis_size(4, 6);

    let inputs: Vec<PathBuf> = (0..17)
        .map(|i| write_image(temp_dir.path(), &format!("{i:02}.png"), 10, 10, i))
        .collect();

    visualize_images(&model, &inputs, &config)?;

    let grid = image::open(&grid_path)?.into_rgb8();
    assert_eq!(grid.dimensions(), (32 * 4 + 31 * 4, 2 * 6 + 4));

    Ok(())
}

#[test]
fn test_visualize_images_abort_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let model = PixelwiseMockModel::new(2);
    let grid_path = temp_dir.path().join("grid.png");
    let config = InferConfig::single_scale(8, 2).with_save_path(&grid_path);

    let inputs = vec![
        write_image(temp_dir.path(), "a.png", 10, 10, 0),
        write_broken(temp_dir.path(), "b.png"),
    ];

    assert!(visualize_images(&model, &inputs, &config).is_err());
    assert!(!grid_path.exists());

    let report = visualize_images(
        &model,
        &inputs,
        &config.clone().with_failure_policy(FailurePolicy::Skip),
    )?;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(grid_path.exists());

    Ok(())
}
