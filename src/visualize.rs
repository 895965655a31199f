use std::path::Path;

use image::{imageops, imageops::FilterType, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;
use ndarray::Array3;
use nshare::AsNdarray3;

use crate::errors::{Result, SegInferError};
use crate::postprocess::LabelMask;
use crate::preprocess::read_rgb;

/// Number of (image, mask) pairs per grid row.
pub const GRID_COLUMNS: usize = 16;
/// Gap between tiles, in pixels.
pub const GRID_SPACE: u32 = 4;
/// Background intensity of the grid canvas.
pub const GRID_PAD_VALUE: u8 = 255;

/// Class colors following the PASCAL VOC colormap: the bits of the class
/// index are spread over R, G and B, most significant bit first.
pub fn color_palette() -> [Rgb<u8>; 256] {
    std::array::from_fn(|class| {
        let mut rgb = [0u8; 3];
        let mut bits = class;
        for shift in (0..8).rev() {
            for (channel, value) in rgb.iter_mut().enumerate() {
                *value |= (((bits >> channel) & 1) as u8) << shift;
            }
            bits >>= 3;
        }
        Rgb(rgb)
    })
}

/// Maps every class index of `mask` to its palette color.
pub fn colorize(mask: &LabelMask) -> RgbImage {
    let palette = color_palette();
    map_colors(mask, |Luma([class])| palette[class as usize])
}

/// A resized input image and its colorized prediction, both the same size.
#[derive(Debug, Clone)]
pub struct VisPair {
    pub image: RgbImage,
    pub mask: RgbImage,
}

impl VisPair {
    /// Channel-first `3 x H x W` copies of the image and the mask.
    pub fn to_chw(&self) -> (Array3<u8>, Array3<u8>) {
        (
            self.image.as_ndarray3().to_owned(),
            self.mask.as_ndarray3().to_owned(),
        )
    }
}

/// Builds the display pair for one image and its predicted mask.
///
/// `size` is `(width, height)`; see [`crate::config::DEFAULT_VIS_SIZE`]. The original is
/// resized linearly, the colorized mask with nearest-neighbor sampling so
/// class boundaries stay sharp.
pub fn prepare_visualization(path: &Path, mask: &LabelMask, size: (u32, u32)) -> Result<VisPair> {
    let (width, height) = size;
    if width == 0 || height == 0 {
        return Err(SegInferError::validation(
            "visualization size",
            format!("must be positive, got {width}x{height}"),
        ));
    }

    let image = read_rgb(path)?;
    Ok(VisPair {
        image: imageops::resize(&image, width, height, FilterType::Triangle),
        mask: imageops::resize(&colorize(mask), width, height, FilterType::Nearest),
    })
}

/// Tiles equally sized images row by row into an `n_rows x n_cols` grid.
///
/// Tiles are separated by `space` pixels; the canvas is filled with
/// `pad_value` wherever no tile is drawn.
pub fn make_grid(
    tiles: &[RgbImage],
    n_rows: usize,
    n_cols: usize,
    space: u32,
    pad_value: u8,
) -> Result<RgbImage> {
    let first = tiles
        .first()
        .ok_or_else(|| SegInferError::validation("grid", "needs at least one tile"))?;
    if tiles.len() > n_rows * n_cols {
        return Err(SegInferError::validation(
            "grid",
            format!("{} tiles do not fit in {n_rows}x{n_cols}", tiles.len()),
        ));
    }
    let (w, h) = first.dimensions();
    if let Some(tile) = tiles.iter().find(|t| t.dimensions() != (w, h)) {
        return Err(SegInferError::validation(
            "grid",
            format!("tile size {:?} differs from {w}x{h}", tile.dimensions()),
        ));
    }

    let (rows, cols) = (n_rows as u32, n_cols as u32);
    let canvas_w = w * cols + space * cols.saturating_sub(1);
    let canvas_h = h * rows + space * rows.saturating_sub(1);
    let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, Rgb([pad_value; 3]));

    for (n, tile) in tiles.iter().enumerate() {
        let (r, c) = ((n / n_cols) as u32, (n % n_cols) as u32);
        let x = c * (w + space);
        let y = r * (h + space);
        imageops::replace(&mut canvas, tile, x.into(), y.into());
    }

    Ok(canvas)
}

/// Lays out (image, mask) pairs [`GRID_COLUMNS`] pairs per row.
///
/// Columns count pairs, not tiles: a row is `2 * GRID_COLUMNS` tiles wide, a
/// pair never wraps across rows and the grid has `ceil(pairs / GRID_COLUMNS)`
/// rows.
pub fn visualization_grid(pairs: &[VisPair]) -> Result<RgbImage> {
    let n_rows = pairs.len().div_ceil(GRID_COLUMNS);
    let tiles: Vec<RgbImage> = pairs
        .iter()
        .flat_map(|pair| [pair.image.clone(), pair.mask.clone()])
        .collect();
    make_grid(&tiles, n_rows, GRID_COLUMNS * 2, GRID_SPACE, GRID_PAD_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_VIS_SIZE;
    use image::GrayImage;

    #[test]
    fn test_palette_matches_voc_colormap() {
        let palette = color_palette();
        assert_eq!(palette[0], Rgb([0, 0, 0]));
        assert_eq!(palette[1], Rgb([128, 0, 0]));
        assert_eq!(palette[2], Rgb([0, 128, 0]));
        assert_eq!(palette[3], Rgb([128, 128, 0]));
        assert_eq!(palette[15], Rgb([192, 128, 128]));
    }

    #[test]
    fn test_colorize_uses_palette() {
        let mask = GrayImage::from_fn(2, 1, |x, _| Luma([x as u8 + 1]));
        let colored = colorize(&mask);
        assert_eq!(*colored.get_pixel(0, 0), Rgb([128, 0, 0]));
        assert_eq!(*colored.get_pixel(1, 0), Rgb([0, 128, 0]));
    }

    #[test]
    fn test_prepare_visualization_sizes() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        for (width, height) in [(300, 200), (17, 9), (64, 128)] {
            let path = temp_dir.path().join(format!("{width}x{height}.png"));
            RgbImage::from_pixel(width, height, Rgb([10, 20, 30])).save(&path)?;
            let mask = GrayImage::from_pixel(width, height, Luma([1]));

            let pair = prepare_visualization(&path, &mask, DEFAULT_VIS_SIZE)?;

            assert_eq!(pair.image.dimensions(), DEFAULT_VIS_SIZE);
            assert_eq!(pair.mask.dimensions(), DEFAULT_VIS_SIZE);
            assert!(pair.mask.pixels().all(|p| *p == Rgb([128, 0, 0])));
        }
        Ok(())
    }

    #[test]
    fn test_vis_pair_to_chw() {
        let pair = VisPair {
            image: RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])),
            mask: RgbImage::from_pixel(3, 2, Rgb([4, 5, 6])),
        };
        let (image, mask) = pair.to_chw();
        assert_eq!(image.dim(), (3, 2, 3));
        assert_eq!(image[[2, 1, 2]], 3);
        assert_eq!(mask[[0, 0, 0]], 4);
    }

    #[test]
    fn test_make_grid_layout() -> Result<()> {
        let tiles: Vec<RgbImage> = (0..5)
            .map(|i| RgbImage::from_pixel(2, 3, Rgb([i, i, i])))
            .collect();

        let grid = make_grid(&tiles, 2, 3, 4, 255)?;

        assert_eq!(grid.dimensions(), (2 * 3 + 4 * 2, 3 * 2 + 4));
        assert_eq!(*grid.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*grid.get_pixel(6, 0), Rgb([1, 1, 1]));
        assert_eq!(*grid.get_pixel(7, 8), Rgb([4, 4, 4]));
        // gap between tiles and the empty last cell keep the background
        assert_eq!(*grid.get_pixel(3, 0), Rgb([255, 255, 255]));
        assert_eq!(*grid.get_pixel(12, 8), Rgb([255, 255, 255]));
        Ok(())
    }

    #[test]
    fn test_make_grid_rejects_bad_input() {
        assert!(make_grid(&[], 1, 1, 4, 255).is_err());
        let tiles = vec![RgbImage::new(2, 2), RgbImage::new(3, 2)];
        assert!(make_grid(&tiles, 1, 2, 4, 255).is_err());
        assert!(make_grid(&[RgbImage::new(2, 2), RgbImage::new(2, 2)], 1, 1, 4, 255).is_err());
    }

    #[test]
    fn test_grid_rows_round_up() -> Result<()> {
        let (w, h) = (4, 6);
        let pair = VisPair {
            image: RgbImage::new(w, h),
            mask: RgbImage::new(w, h),
        };

        for (pairs, rows) in [(1, 1), (16, 1), (17, 2), (33, 3)] {
            let grid = visualization_grid(&vec![pair.clone(); pairs])?;
            assert_eq!(grid.height(), h * rows + GRID_SPACE * (rows - 1));
            let cols = 2 * GRID_COLUMNS as u32;
            assert_eq!(grid.width(), w * cols + GRID_SPACE * (cols - 1));
        }
        Ok(())
    }
}
