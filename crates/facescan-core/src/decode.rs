//! Image decoding into the RGB frames the models consume.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("undecodable image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decode an encoded image (JPEG, PNG, ...) into 3-channel RGB.
///
/// Alpha is dropped and grayscale is expanded, so every model sees the same layout.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    tracing::debug!(
        width = rgb.width(),
        height = rgb.height(),
        source_color = ?decoded.color(),
        "decoded image"
    );
    Ok(rgb)
}

/// Read an image file from disk and decode it into RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage, ImageError> {
    tracing::info!(path = %path.display(), "loading image");
    let bytes = std::fs::read(path).map_err(|source| ImageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_rgb(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_rgba_drops_alpha() {
        let img = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 40]));
        let rgb = decode_rgb(&encode_png(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_grayscale_expands() {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();
        let rgb = decode_rgb(&buf.into_inner()).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [77, 77, 77]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_rgb(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_rgb(Path::new("/nonexistent/face.jpg")).unwrap_err();
        assert!(matches!(err, ImageError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/face.jpg"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        let img = RgbaImage::from_pixel(5, 5, Rgba([1, 2, 3, 255]));
        std::fs::write(&path, encode_png(&img)).unwrap();
        let rgb = load_rgb(&path).unwrap();
        assert_eq!(rgb.dimensions(), (5, 5));
    }
}
