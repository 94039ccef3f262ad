use crate::error::DatasetError;
use crate::transforms::Transform;
use anyhow::Result;
use image::{DynamicImage, ImageError, ImageReader};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

// ============================================================================
// LoadImage
// ============================================================================

/// Loads images from file paths.
///
/// Reads the whole file through a buffered reader, guesses the format from
/// its content and decodes it. Every call touches the disk again; nothing is
/// cached. A missing, unreadable or corrupt file fails with
/// [`DatasetError::Decode`].
///
/// # Input/Output
/// - **Input**: `PathBuf` - File path to image
/// - **Output**: `DynamicImage` - Decoded image in its native pixel format
///
/// # Example
/// ```ignore
/// let loader = LoadImage::new();
/// let image = loader.apply(PathBuf::from("train/00001.png"))?;
/// println!("Image size: {:?}", image.dimensions());
/// ```
#[derive(Debug, Clone)]
pub struct LoadImage {
    buffer_size: usize,
}

impl LoadImage {
    /// Creates a new image loader with an 8KB read buffer.
    pub fn new() -> Self {
        Self { buffer_size: 8192 }
    }

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len() as usize;
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = Vec::with_capacity(file_size);
        reader.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, ImageError> {
        let bytes = self.read_bytes(path).map_err(ImageError::IoError)?;
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(ImageError::IoError)?
            .decode()
    }
}

impl Default for LoadImage {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform<PathBuf, DynamicImage> for LoadImage {
    fn apply(&self, path: PathBuf) -> Result<DynamicImage> {
        let image = self.decode(&path).map_err(|source| DatasetError::Decode {
            path: path.clone(),
            source,
        })?;
        log::trace!("decoded {} ({}x{})", path.display(), image.width(), image.height());
        Ok(image)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_image() -> Result<NamedTempFile> {
        let mut test_img = RgbImage::new(3, 3);
        test_img.put_pixel(0, 0, Rgb([255, 0, 0]));
        test_img.put_pixel(1, 1, Rgb([0, 255, 0]));
        test_img.put_pixel(2, 2, Rgb([0, 0, 255]));

        let temp_file = NamedTempFile::with_suffix(".png")?;
        test_img.save(temp_file.path())?;
        Ok(temp_file)
    }

    #[test]
    fn test_load_image() -> Result<()> {
        let temp_file = create_test_image()?;
        let loaded_image = LoadImage::new().apply(temp_file.path().to_path_buf())?;

        assert_eq!(loaded_image.dimensions(), (3, 3));
        let rgb = loaded_image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 0, 0]), "Red pixel should match");
        assert_eq!(rgb.get_pixel(2, 2), &Rgb([0, 0, 255]), "Blue pixel should match");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = LoadImage::new()
            .apply(PathBuf::from("nonexistent.jpg"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::Decode { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_decode_error() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".png")?;
        file.write_all(b"definitely not a png")?;
        let err = LoadImage::new()
            .apply(file.path().to_path_buf())
            .unwrap_err();
        match err.downcast_ref::<DatasetError>() {
            Some(DatasetError::Decode { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {:?}", other),
        }
        Ok(())
    }
}
