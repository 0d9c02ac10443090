//! On-disk gallery: one reference image per enrolled identity.
//!
//! The file stem is the identity. The directory is handed to the recognizer
//! as its complete reference set.

use crate::recognizer::SENTINEL_IDENTITIES;
use crate::types::GalleryEntry;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENTRY_EXTENSION: &str = "jpg";
const REFERENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("username cannot be empty")]
    EmptyName,
    #[error("invalid username {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("gallery I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write reference image: {0}")]
    Image(#[from] image::ImageError),
}

/// Directory of enrolled reference images.
#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    /// Open the gallery at `dir`, creating the directory if it is missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, GalleryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| GalleryError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of the gallery directory, as passed to the recognizer.
    pub fn absolute_dir(&self) -> Result<PathBuf, GalleryError> {
        std::fs::canonicalize(&self.dir).map_err(|source| GalleryError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Trim and validate a username for use as a storage key.
    ///
    /// An accepted name is recovered unchanged from the recognizer's
    /// `<probe>,<stem>` output line.
    pub fn validate_name(raw: &str) -> Result<&str, GalleryError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(GalleryError::EmptyName);
        }
        let reason = if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            Some("must not contain path separators")
        } else if name.contains(char::is_control) {
            Some("must not contain control characters")
        } else if name.contains(',') {
            Some("must not contain commas")
        } else if name.to_ascii_lowercase().ends_with(".jpg") {
            Some("must not end in .jpg")
        } else if SENTINEL_IDENTITIES.contains(&name) {
            Some("reserved by the recognizer")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(GalleryError::InvalidName {
                name: name.to_string(),
                reason,
            }),
            None => Ok(name),
        }
    }

    /// Path of the reference image for `name` (not validated).
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{ENTRY_EXTENSION}"))
    }

    /// Store `still` as the reference image for `name`.
    ///
    /// An existing entry with the same name is overwritten.
    pub fn enroll(&self, name: &str, still: &RgbImage) -> Result<GalleryEntry, GalleryError> {
        let name = Self::validate_name(name)?;
        let path = self.entry_path(name);
        let replaced = path.exists();

        still.save_with_format(&path, ImageFormat::Jpeg)?;

        tracing::info!(
            name,
            path = %path.display(),
            replaced,
            "gallery entry written"
        );

        Ok(GalleryEntry {
            name: name.to_string(),
            path,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok_and(|name| self.entry_path(name).is_file())
    }

    /// Enrolled entries, sorted by name.
    pub fn list(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|source| GalleryError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for dirent in read_dir {
            let dirent = dirent.map_err(|source| GalleryError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = dirent.path();
            if !path.is_file() {
                continue;
            }
            let is_reference = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| REFERENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if !is_reference {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push(GalleryEntry {
                name: name.to_string(),
                path: path.clone(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
