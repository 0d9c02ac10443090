//! Temporary probe image handed to the recognizer.
//!
//! A `ProbeImage` owns its file: the file is removed when the guard drops,
//! whichever way the login attempt ends.

use image::{ColorType, ImageFormat, ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("refusing to write an empty probe image")]
    EmptyImage,
    #[error("probe I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("probe image: {0}")]
    Image(#[from] image::ImageError),
}

/// The just-captured image being matched, materialized on disk.
#[derive(Debug)]
pub struct ProbeImage {
    path: PathBuf,
}

impl ProbeImage {
    /// Write `image` to `path` as JPEG and normalize it to 3-channel RGB.
    ///
    /// If any step fails the partially written file is removed before the
    /// error is returned.
    pub fn create(path: impl Into<PathBuf>, image: &RgbImage) -> Result<Self, ProbeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ProbeError::EmptyImage);
        }

        let probe = Self { path: path.into() };
        image.save_with_format(&probe.path, ImageFormat::Jpeg)?;
        let converted = normalize(&probe.path)?;

        tracing::debug!(
            path = %probe.path.display(),
            width = image.width(),
            height = image.height(),
            converted,
            "probe image written"
        );
        Ok(probe)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute path of the probe file, as passed to the recognizer.
    pub fn absolute_path(&self) -> Result<PathBuf, ProbeError> {
        std::fs::canonicalize(&self.path).map_err(|source| ProbeError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for ProbeImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "probe image removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove probe image")
            }
        }
    }
}

/// Re-open the image at `path` and rewrite it as 8-bit RGB if it is in any
/// other color mode. Returns whether a conversion happened.
pub fn normalize(path: &Path) -> Result<bool, ProbeError> {
    let decoded = ImageReader::open(path)
        .map_err(|source| ProbeError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| ProbeError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .decode()?;

    if decoded.color() == ColorType::Rgb8 {
        return Ok(false);
    }

    tracing::debug!(
        path = %path.display(),
        mode = ?decoded.color(),
        "converting probe image to RGB"
    );
    decoded.to_rgb8().save_with_format(path, ImageFormat::Jpeg)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, 128]))
    }

    #[test]
    fn test_create_writes_rgb_jpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".tmp.jpg");

        let probe = ProbeImage::create(&path, &gradient(16, 12)).unwrap();
        assert!(path.exists());

        let reread = image::open(probe.path()).unwrap();
        assert_eq!(reread.color(), ColorType::Rgb8);
        assert_eq!((reread.width(), reread.height()), (16, 12));
    }

    #[test]
    fn test_drop_removes_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".tmp.jpg");
        {
            let _probe = ProbeImage::create(&path, &gradient(4, 4)).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".tmp.jpg");
        let probe = ProbeImage::create(&path, &gradient(4, 4)).unwrap();
        std::fs::remove_file(&path).unwrap();
        drop(probe);
        assert!(!path.exists());
    }

    #[test]
    fn test_create_empty_image_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".tmp.jpg");
        let result = ProbeImage::create(&path, &RgbImage::new(0, 0));
        assert!(matches!(result, Err(ProbeError::EmptyImage)));
        assert!(!path.exists());
    }

    #[test]
    fn test_create_failure_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join(".tmp.jpg");
        assert!(ProbeImage::create(&path, &gradient(4, 4)).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_normalize_converts_grayscale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gray.jpg");
        image::GrayImage::from_pixel(6, 6, image::Luma([90]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();

        assert!(normalize(&path).unwrap());
        assert_eq!(image::open(&path).unwrap().color(), ColorType::Rgb8);
        // Second pass is a no-op
        assert!(!normalize(&path).unwrap());
    }

    #[test]
    fn test_absolute_path() {
        let tmp = TempDir::new().unwrap();
        let probe = ProbeImage::create(tmp.path().join("p.jpg"), &gradient(4, 4)).unwrap();
        assert!(probe.absolute_path().unwrap().is_absolute());
    }
}
