use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::{FfmpegConfig, DEFAULT_IMAGE_QUALITY};
use crate::format::Family;

/// Root configuration. Every section has defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    /// Remote conversion backend. When set, it becomes the primary path and
    /// the local pipeline the fallback.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body.
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload() -> usize {
    100 * 1024 * 1024
}

/// Which usage gate guards conversions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMethod {
    #[default]
    Unlimited,
    DailyQuota,
}

/// Usage gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UsageConfig {
    #[serde(default)]
    pub method: UsageMethod,
    /// Conversions per caller per UTC day for `daily_quota`.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            method: UsageMethod::default(),
            daily_limit: default_daily_limit(),
        }
    }
}

fn default_daily_limit() -> u32 {
    20
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Root for per-request scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Budget for families without their own setting.
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub image_timeout_secs: Option<u64>,
    #[serde(default)]
    pub document_timeout_secs: Option<u64>,
    #[serde(default)]
    pub video_timeout_secs: Option<u64>,
    #[serde(default)]
    pub audio_timeout_secs: Option<u64>,

    /// Payloads above this size are rejected as invalid.
    #[serde(default = "default_max_input")]
    pub max_input_bytes: u64,

    #[serde(default = "default_image_quality")]
    pub default_image_quality: u8,

    /// Cap on concurrent adapter invocations (0 = unlimited).
    #[serde(default)]
    pub max_parallel_conversions: usize,

    /// Budget for each enricher.
    #[serde(default = "default_enrich_timeout")]
    pub enrich_timeout_secs: u64,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("transmute-scratch")
}

fn default_timeout() -> u64 {
    120
}

fn default_max_input() -> u64 {
    100 * 1024 * 1024
}

fn default_image_quality() -> u8 {
    DEFAULT_IMAGE_QUALITY
}

fn default_enrich_timeout() -> u64 {
    30
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            default_timeout_secs: default_timeout(),
            image_timeout_secs: None,
            document_timeout_secs: None,
            video_timeout_secs: Some(900),
            audio_timeout_secs: Some(300),
            max_input_bytes: default_max_input(),
            default_image_quality: default_image_quality(),
            max_parallel_conversions: 0,
            enrich_timeout_secs: default_enrich_timeout(),
        }
    }
}

impl ConversionConfig {
    /// Execution budget for a conversion whose source is in `family`.
    pub fn timeout_for(&self, family: Family) -> Duration {
        let specific = match family {
            Family::Image | Family::Compress => self.image_timeout_secs,
            Family::Document => self.document_timeout_secs,
            Family::Video => self.video_timeout_secs,
            Family::Audio => self.audio_timeout_secs,
            Family::Unknown => None,
        };
        Duration::from_secs(specific.unwrap_or(self.default_timeout_secs))
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self.image_timeout_secs = None;
        self.document_timeout_secs = None;
        self.video_timeout_secs = None;
        self.audio_timeout_secs = None;
        self
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel_conversions = max;
        self
    }
}

/// Remote conversion backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Base URL of another instance, e.g. `http://converter:8080`.
    pub url: String,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

fn default_remote_timeout() -> u64 {
    60
}

/// Summary enricher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryConfig {
    /// Optional AI summarization endpoint. Without it only the local
    /// extractive summarizer runs.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_summary_timeout(),
            max_sentences: default_max_sentences(),
        }
    }
}

fn default_summary_timeout() -> u64 {
    20
}

fn default_max_sentences() -> usize {
    3
}

/// OCR enricher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: default_tesseract_path(),
            language: default_language(),
        }
    }
}

fn default_tesseract_path() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_language() -> String {
    "eng".to_string()
}

/// Conversion event log
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_events_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: default_events_path(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_events_path() -> PathBuf {
    PathBuf::from("transmute-events.db")
}

fn default_buffer_size() -> usize {
    1000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub usage: UsageConfig,
    pub conversion: ConversionConfig,
    pub ffmpeg: FfmpegConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    pub summary: SanitizedSummaryConfig,
    pub ocr: OcrConfig,
    pub events: EventsConfig,
}

/// Summary config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSummaryConfig {
    pub url: Option<String>,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
    pub max_sentences: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            usage: config.usage.clone(),
            conversion: config.conversion.clone(),
            ffmpeg: config.ffmpeg.clone(),
            remote: config.remote.clone(),
            summary: SanitizedSummaryConfig {
                url: config.summary.url.clone(),
                api_key_configured: config.summary.api_key.is_some(),
                timeout_secs: config.summary.timeout_secs,
                max_sentences: config.summary.max_sentences,
            },
            ocr: config.ocr.clone(),
            events: config.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.usage.method, UsageMethod::Unlimited);
        assert_eq!(config.conversion.default_image_quality, 90);
        assert!(config.remote.is_none());
        assert!(config.events.enabled);
    }

    #[test]
    fn test_timeout_for_family() {
        let config = ConversionConfig {
            default_timeout_secs: 60,
            image_timeout_secs: Some(10),
            video_timeout_secs: Some(600),
            audio_timeout_secs: None,
            ..Default::default()
        };
        assert_eq!(config.timeout_for(Family::Image), Duration::from_secs(10));
        assert_eq!(config.timeout_for(Family::Compress), Duration::from_secs(10));
        assert_eq!(config.timeout_for(Family::Video), Duration::from_secs(600));
        assert_eq!(config.timeout_for(Family::Audio), Duration::from_secs(60));
        assert_eq!(config.timeout_for(Family::Document), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [usage]
            method = "daily_quota"
            daily_limit = 5

            [conversion]
            scratch_dir = "/tmp/scratch"
            default_timeout_secs = 30
            video_timeout_secs = 300
            max_parallel_conversions = 4

            [ffmpeg]
            ffmpeg_path = "/usr/bin/ffmpeg"

            [remote]
            url = "http://converter:8080"

            [summary]
            url = "http://llm:9000/summarize"
            api_key = "secret"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.usage.method, UsageMethod::DailyQuota);
        assert_eq!(config.usage.daily_limit, 5);
        assert_eq!(config.conversion.max_parallel_conversions, 4);
        assert_eq!(config.conversion.video_timeout_secs, Some(300));
        assert_eq!(config.remote.as_ref().unwrap().timeout_secs, 60);
        assert_eq!(config.summary.max_sentences, 3);
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let mut config = Config::default();
        config.summary.api_key = Some("super-secret".to_string());

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(sanitized.summary.api_key_configured);
    }
}
