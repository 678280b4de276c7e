use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no cameras configured")]
    NoCameras,
    #[error("duplicate camera id: {0}")]
    DuplicateCamera(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Where a camera's frames come from: a local device index or a URL/path
/// understood by the capture backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CaptureSource {
    Index(i32),
    Url(String),
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Index(i) => write!(f, "device {i}"),
            CaptureSource::Url(u) => f.write_str(u),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub source: CaptureSource,
}

fn default_http_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

fn default_capture_width() -> u32 {
    640
}

fn default_capture_height() -> u32 {
    480
}

fn default_reopen_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_width")]
    pub width: u32,
    #[serde(default = "default_capture_height")]
    pub height: u32,
    #[serde(default = "default_reopen_delay_ms")]
    pub reopen_delay_ms: u64,
}

impl CaptureConfig {
    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: default_capture_width(),
            height: default_capture_height(),
            reopen_delay_ms: default_reopen_delay_ms(),
        }
    }
}

fn default_target_fps() -> u32 {
    5
}

fn default_alert_threshold() -> f32 {
    40.0
}

fn default_min_detection_confidence() -> f32 {
    0.3
}

fn default_model_path() -> String {
    "model.onnx".to_string()
}

fn default_classes() -> Vec<String> {
    vec!["fire".to_string(), "spark".to_string()]
}

fn default_intra_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Percent confidence at or above which a hazard counts as present.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_percent: f32,
    /// Raw detections below this (0..1) are discarded before anything else.
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl InferenceConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            alert_threshold_percent: default_alert_threshold(),
            min_detection_confidence: default_min_detection_confidence(),
            model_path: default_model_path(),
            classes: default_classes(),
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_snapshots_enabled() -> bool {
    true
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_min_save_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshots_enabled")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_min_save_interval_ms")]
    pub min_save_interval_ms: u64,
}

impl SnapshotConfig {
    pub fn min_save_interval(&self) -> Duration {
        Duration::from_millis(self.min_save_interval_ms)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_snapshots_enabled(),
            dir: default_snapshot_dir(),
            min_save_interval_ms: default_min_save_interval_ms(),
        }
    }
}

fn default_jpeg_quality() -> i32 {
    80
}

fn default_idle_delay_ms() -> u64 {
    10
}

fn default_placeholder_delay_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_placeholder_delay_ms")]
    pub placeholder_delay_ms: u64,
}

impl StreamConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn placeholder_delay(&self) -> Duration {
        Duration::from_millis(self.placeholder_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            idle_delay_ms: default_idle_delay_ms(),
            placeholder_delay_ms: default_placeholder_delay_ms(),
        }
    }
}

fn default_history_cap() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_cap")]
    pub cap: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if !seen.insert(cam.id.as_str()) {
                return Err(ConfigError::DuplicateCamera(cam.id.clone()));
            }
        }

        if self.inference.target_fps == 0 {
            return Err(ConfigError::Invalid {
                field: "inference.target_fps",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.inference.alert_threshold_percent) {
            return Err(ConfigError::Invalid {
                field: "inference.alert_threshold_percent",
                reason: "must be within 0..=100".to_string(),
            });
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "stream.jpeg_quality",
                reason: "must be within 1..=100".to_string(),
            });
        }
        if self.history.cap == 0 {
            return Err(ConfigError::Invalid {
                field: "history.cap",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
