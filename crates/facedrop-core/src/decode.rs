//! Image decoding from disk into the RGB bitmap the analyzer consumes.

use image::{ImageReader, RgbImage};
use std::path::Path;
use thiserror::Error;

/// In-memory 8-bit RGB pixel buffer.
pub type Bitmap = RgbImage;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Decode the file at `path` into an RGB bitmap.
///
/// The format is guessed from file content, not the extension.
pub fn load_bitmap(path: &Path) -> Result<Bitmap, DecodeError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;

    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::Empty {
            width: image.width(),
            height: image.height(),
        });
    }

    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image"
    );

    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([12, 34, 56]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        std::fs::write(&path, png_bytes(4, 3)).unwrap();

        let bitmap = load_bitmap(&path).unwrap();
        assert_eq!(bitmap.dimensions(), (4, 3));
        assert_eq!(bitmap.get_pixel(1, 1), &Rgb([12, 34, 56]));
    }

    #[test]
    fn test_format_guessed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, png_bytes(2, 2)).unwrap();

        assert!(load_bitmap(&path).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_bitmap(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn test_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"definitely not pixels").unwrap();

        assert!(load_bitmap(&path).is_err());
    }

    #[test]
    fn test_truncated_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.png");
        let bytes = png_bytes(16, 16);
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(load_bitmap(&path).unwrap_err(), DecodeError::Image(_)));
    }
}
