//! Request and result types shared by every conversion path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::format::FormatTag;

/// Derived artifacts attached to a successful conversion, keyed by name
/// (`"text"`, `"summary"`).
pub type AuxResults = BTreeMap<String, String>;

/// AuxResults key for recognized or extracted text.
pub const AUX_TEXT: &str = "text";

/// AuxResults key for a generated summary.
pub const AUX_SUMMARY: &str = "summary";

/// Options bag accepted with every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Encode quality, 1-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    /// Target width in pixels (fit-inside).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target height in pixels (fit-inside).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Allow upscaling and apply sharpening.
    pub enhance: bool,
    /// Select the compress pseudo-format.
    pub compress: bool,
    /// Alternative spelling of `compress` (`mode = "compress"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Attach recognized text as an AuxResult.
    pub extract_text: bool,
    /// Attach a summary as an AuxResult.
    pub summarize: bool,
    /// Audio bitrate in kbps for lossy audio outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    /// Per-request execution budget override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ConversionOptions {
    /// Whether the request selects the compress pseudo-format.
    pub fn wants_compress(&self) -> bool {
        self.compress
            || self
                .mode
                .as_deref()
                .map(|mode| mode.trim().eq_ignore_ascii_case("compress"))
                .unwrap_or(false)
    }

    /// Quality clamped into the encoder range, or `default` when unset.
    pub fn quality_or(&self, default: u8) -> u8 {
        self.quality
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(default)
    }
}

/// One conversion call. Immutable once handed to a converter.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Request-scoped identifier; also namespaces scratch resources.
    pub id: String,
    /// Input payload.
    pub payload: Arc<[u8]>,
    /// Declared source format. Empty means "sniff".
    pub source: FormatTag,
    /// Requested target format.
    pub target: FormatTag,
    pub options: ConversionOptions,
    /// Original filename, used to suggest the output filename.
    pub filename: Option<String>,
}

impl ConversionRequest {
    pub fn new(payload: impl Into<Arc<[u8]>>, target: impl AsRef<str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
            source: FormatTag::default(),
            target: FormatTag::new(target),
            options: ConversionOptions::default(),
            filename: None,
        }
    }

    pub fn with_source(mut self, source: impl AsRef<str>) -> Self {
        self.source = FormatTag::new(source);
        self
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Size of the input payload in bytes.
    pub fn input_bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Output of a successful conversion. Owned by the caller once returned.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub data: Vec<u8>,
    /// Suggested download filename.
    pub filename: String,
    /// Resolved output format.
    pub format: FormatTag,
    pub aux: AuxResults,
    /// Adapter or backend that produced the output.
    pub produced_by: String,
    pub duration_ms: u64,
}

impl ConversionResult {
    pub fn new(data: Vec<u8>, format: FormatTag, produced_by: impl Into<String>) -> Self {
        let filename = suggested_filename(None, &format);
        Self {
            data,
            filename,
            format,
            aux: AuxResults::new(),
            produced_by: produced_by.into(),
            duration_ms: 0,
        }
    }

    pub fn output_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Builds a header-safe output filename from the original name and the
/// output format.
pub fn suggested_filename(original: Option<&str>, format: &FormatTag) -> String {
    let stem = original
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map(|stem| {
            stem.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .filter(|stem| !stem.trim_matches(|c| c == '_' || c == '.').is_empty())
        .unwrap_or_else(|| "converted".to_string());

    format!("{}.{}", stem, format)
}
