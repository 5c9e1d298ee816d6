//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory exported videos are delivered to.
    pub output_dir: PathBuf,

    /// Default capture/export settings.
    #[serde(default)]
    pub capture: CaptureDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default capture parameters and synchronization tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Default output FPS.
    pub fps: u32,

    /// Default output resolution label (e.g. "1080p").
    pub resolution: String,

    /// Default aspect ratio label (e.g. "16:9").
    pub aspect_ratio: String,

    /// Default quality tier ("low", "medium", "high").
    pub quality: String,

    /// Ordered codec preference list, probed when no explicit codec is requested.
    pub codec_preferences: Vec<String>,

    /// Drift tolerance while recording, in seconds.
    pub capture_drift_tolerance_secs: f64,

    /// Drift tolerance for preview playback, in seconds.
    pub preview_drift_tolerance_secs: f64,

    /// Per-asset preload timeout in milliseconds.
    pub preload_timeout_ms: u64,

    /// Delay between recorder start and primary track start.
    pub stabilize_delay_ms: u64,

    /// Delay between primary track end and recorder stop.
    pub tail_delay_ms: u64,

    /// Seek applied to freshly loaded videos so a frame is decodable.
    pub micro_seek_secs: f64,

    /// Recorder chunk interval in milliseconds.
    pub timeslice_ms: u64,

    /// Rate of the per-frame callback that drives the render loop.
    pub display_refresh_hz: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "lyricap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            capture: CaptureDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            resolution: "1080p".to_string(),
            aspect_ratio: "16:9".to_string(),
            quality: "medium".to_string(),
            codec_preferences: default_codec_preferences(),
            capture_drift_tolerance_secs: 0.5,
            preview_drift_tolerance_secs: 0.1,
            preload_timeout_ms: 5_000,
            stabilize_delay_ms: 50,
            tail_delay_ms: 100,
            micro_seek_secs: 0.001,
            timeslice_ms: 1_000,
            display_refresh_hz: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CaptureDefaults {
    pub fn preload_timeout(&self) -> Duration {
        Duration::from_millis(self.preload_timeout_ms)
    }

    pub fn stabilize_delay(&self) -> Duration {
        Duration::from_millis(self.stabilize_delay_ms)
    }

    pub fn tail_delay(&self) -> Duration {
        Duration::from_millis(self.tail_delay_ms)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

/// Codec mime types in preference order: broadest playback support first,
/// then the WebM variants most recorders can produce.
pub fn default_codec_preferences() -> Vec<String> {
    [
        "video/mp4;codecs=\"avc1.640028,mp4a.40.2\"",
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("lyricap").join("config.json")
}

/// Default export directory.
fn dirs_default_output() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Videos").join("lyricap")
}
