use image_dataset::{Record, RecordTable, DEFAULT_TARGET_COLUMNS};

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn target_columns() -> Vec<String> {
    DEFAULT_TARGET_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Mid-gray interior of `width x height` surrounded by a black margin of
/// `margin` pixels on every side.
pub fn framed_image(width: u32, height: u32, margin: u32) -> RgbImage {
    RgbImage::from_fn(width + 2 * margin, height + 2 * margin, |x, y| {
        let inside = (margin..margin + width).contains(&x) && (margin..margin + height).contains(&y);
        if inside {
            let v = 60 + ((x * 3 + y * 5) % 120) as u8;
            Rgb([v, v, v])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Writes each image as a PNG inside `dir` and returns the paths.
pub fn write_images(dir: &Path, images: &[RgbImage]) -> Result<Vec<PathBuf>> {
    images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let path = dir.join(format!("img_{i}.png"));
            img.save(&path)?;
            Ok(path)
        })
        .collect()
}

/// Table over `images` with the eleven default targets; row `i` has every
/// label set to `i`.
pub fn table_for(dir: &TempDir, images: &[RgbImage]) -> Result<RecordTable> {
    let columns = target_columns();
    let records = write_images(dir.path(), images)?
        .into_iter()
        .enumerate()
        .map(|(i, path)| Record::new(path, vec![i as f32; columns.len()]))
        .collect();
    RecordTable::new(columns, records)
}
