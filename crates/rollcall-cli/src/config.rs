use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Session configuration.
///
/// Built from defaults, then an optional TOML file named by
/// `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device index (`/dev/video<N>`).
    pub camera_index: u32,
    /// Directory holding one reference image per enrolled identity.
    pub gallery_dir: PathBuf,
    /// Append-only attendance log.
    pub log_path: PathBuf,
    /// Fixed path of the temporary probe image.
    pub probe_path: PathBuf,
    /// Recognizer executable.
    pub recognizer: PathBuf,
    /// Optional `--tolerance` for the recognizer.
    pub tolerance: Option<f32>,
    /// Display tick period in milliseconds.
    pub tick_ms: u64,
    /// If set, the terminal view writes its latest frame here as JPEG.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            gallery_dir: PathBuf::from("./db"),
            log_path: PathBuf::from("./log.txt"),
            probe_path: PathBuf::from("./.tmp.jpg"),
            recognizer: PathBuf::from(rollcall_core::recognizer::DEFAULT_PROGRAM),
            tolerance: None,
            tick_ms: 20,
            preview_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&src).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `ROLLCALL_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "ROLLCALL_CAMERA_INDEX") {
            self.camera_index = v;
        }
        if let Some(v) = lookup("ROLLCALL_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_LOG_PATH") {
            self.log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_PROBE_PATH") {
            self.probe_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_RECOGNIZER") {
            self.recognizer = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "ROLLCALL_TOLERANCE") {
            self.tolerance = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "ROLLCALL_TICK_MS") {
            self.tick_ms = v;
        }
        if let Some(v) = lookup("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(v));
        }
    }

    /// Display tick period (never zero).
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_index, 0);
        assert_eq!(config.gallery_dir, PathBuf::from("./db"));
        assert_eq!(config.log_path, PathBuf::from("./log.txt"));
        assert_eq!(config.probe_path, PathBuf::from("./.tmp.jpg"));
        assert_eq!(config.recognizer, PathBuf::from("face_recognition"));
        assert_eq!(config.tick(), Duration::from_millis(20));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_CAMERA_INDEX", "2"),
            ("ROLLCALL_GALLERY_DIR", "/srv/faces"),
            ("ROLLCALL_TOLERANCE", "0.45"),
            ("ROLLCALL_TICK_MS", "33"),
        ]));
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.gallery_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.tolerance, Some(0.45));
        assert_eq!(config.tick_ms, 33);
        assert_eq!(config.log_path, PathBuf::from("./log.txt"));
    }

    #[test]
    fn test_env_unparsable_keeps_current() {
        let mut config = Config::default();
        config.apply_env(env(&[("ROLLCALL_CAMERA_INDEX", "front"), ("ROLLCALL_TICK_MS", "-1")]));
        assert_eq!(config.camera_index, 0);
        assert_eq!(config.tick_ms, 20);
    }

    #[test]
    fn test_zero_tick_is_clamped() {
        let config = Config { tick_ms: 0, ..Config::default() };
        assert_eq!(config.tick(), Duration::from_millis(1));
    }

    #[test]
    fn test_from_file_partial() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rollcall.toml");
        std::fs::write(&path, "camera_index = 1\nrecognizer = \"/opt/fr/bin/face_recognition\"\n")
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_index, 1);
        assert_eq!(config.recognizer, PathBuf::from("/opt/fr/bin/face_recognition"));
        assert_eq!(config.gallery_dir, PathBuf::from("./db"));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rollcall.toml");
        std::fs::write(&path, "camera = 1\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/rollcall.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
