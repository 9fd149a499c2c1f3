//! Player configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! partial (or absent) file is valid. Playback timing is clamped rather
//! than rejected, the same way runtime rate changes are.

use crate::archive::{ArchivePaths, DirStorage, LoadLimits, FRAMES_FILE, METADATA_FILE};
use crate::playback::{Pacer, Resolution, DEFAULT_FRAME_DURATION_MS};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Where the frame archive lives and how much memory it may use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory standing in for the flash filesystem mount.
    pub root: PathBuf,
    /// Storage path of the metadata file.
    pub metadata_path: String,
    /// Storage path of the frames file.
    pub frames_path: String,
    /// Largest frames file accepted, in bytes.
    pub max_buffer_bytes: Option<u64>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            metadata_path: METADATA_FILE.to_string(),
            frames_path: FRAMES_FILE.to_string(),
            max_buffer_bytes: None,
        }
    }
}

impl ArchiveConfig {
    /// Storage rooted at the configured directory.
    pub fn storage(&self) -> DirStorage {
        DirStorage::new(&self.root)
    }

    /// Archive file paths inside the root.
    pub fn paths(&self) -> ArchivePaths {
        ArchivePaths {
            metadata: self.metadata_path.clone(),
            frames: self.frames_path.clone(),
        }
    }

    /// Memory limits for the loader.
    pub fn limits(&self) -> LoadLimits {
        LoadLimits {
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }
}

/// Playback timing and nominal frame metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Minimum milliseconds between frames; `0` means the default.
    pub frame_duration_ms: u64,
    /// Nominal frame width reported to consumers.
    pub width: u32,
    /// Nominal frame height reported to consumers.
    pub height: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let resolution = Resolution::default();
        Self {
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            width: resolution.width,
            height: resolution.height,
        }
    }
}

impl PlaybackConfig {
    /// Pacer at the configured frame duration.
    pub fn pacer(&self) -> Pacer {
        Pacer::with_frame_duration(self.frame_duration_ms)
    }

    /// Nominal frame dimensions.
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

/// HTTP surface: snapshot, MJPEG stream, status and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// How often a stream connection polls for a new frame.
    pub stream_poll_ms: u64,
    /// Maximum concurrent stream connections.
    pub max_stream_clients: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            stream_poll_ms: 10,
            max_stream_clients: 4,
        }
    }
}

/// Periodic broadcaster feeding external streaming sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Run the broadcaster at all.
    pub enabled: bool,
    /// Port advertised for the streaming service.
    pub port: u16,
    /// Broadcaster tick period in milliseconds.
    pub tick_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 554,
            tick_ms: 10,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// `stream_poll_ms` is zero.
    #[error("poll interval must be at least 1 ms")]
    InvalidPollInterval,
    /// `max_stream_clients` is zero.
    #[error("max_stream_clients must be at least 1")]
    InvalidStreamLimit,
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Archive location and memory budget.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Frame timing and dimensions.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// HTTP consumers.
    #[serde(default)]
    pub http: HttpConfig,
    /// Periodic broadcaster.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playback.width == 0 || self.playback.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.http.stream_poll_ms == 0 || self.broadcast.tick_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        if self.http.max_stream_clients == 0 {
            return Err(ConfigError::InvalidStreamLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = FileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.pacer().interval_ms(), 100);
        assert_eq!(config.archive.paths().frames, "/video_frames.bin");
    }

    #[test]
    fn test_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [archive]
            root = "/mnt/flash"
            max_buffer_bytes = 4000000

            [playback]
            frame_duration_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.archive.root, PathBuf::from("/mnt/flash"));
        assert_eq!(config.archive.limits().max_buffer_bytes, Some(4_000_000));
        assert_eq!(config.archive.metadata_path, METADATA_FILE);
        assert_eq!(config.playback.pacer().rate(), 20.0);
        assert_eq!(config.http.stream_poll_ms, 10);
        assert!(config.broadcast.enabled);
    }

    #[test]
    fn test_zero_frame_duration_falls_back() {
        let config = FileConfig::from_toml("[playback]\nframe_duration_ms = 0\n").unwrap();
        assert_eq!(config.playback.pacer().interval_ms(), DEFAULT_FRAME_DURATION_MS);
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = FileConfig::default();
        config.playback.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_zero_stream_limit_invalid() {
        let err = FileConfig::from_toml("[http]\nmax_stream_clients = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStreamLimit));
    }

    #[test]
    fn test_parse_error() {
        let err = FileConfig::from_toml("[playback\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
