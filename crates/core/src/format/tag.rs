//! Format tags and family classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Coarse media bucket used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Image,
    Document,
    Video,
    Audio,
    /// Routing target for the `compress` pseudo-format.
    Compress,
    /// Anything the classification table does not know. Never routable.
    Unknown,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Compress => "compress",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag of the compress pseudo-format.
pub const COMPRESS_TAG: &str = "compress";

/// Fixed classification table. Every known tag appears exactly once.
const CLASSIFICATION: &[(&str, Family)] = &[
    // Image
    ("jpg", Family::Image),
    ("png", Family::Image),
    ("webp", Family::Image),
    ("gif", Family::Image),
    ("bmp", Family::Image),
    ("tiff", Family::Image),
    ("ico", Family::Image),
    // Document
    ("pdf", Family::Document),
    ("docx", Family::Document),
    ("txt", Family::Document),
    ("md", Family::Document),
    ("html", Family::Document),
    // Video
    ("mp4", Family::Video),
    ("webm", Family::Video),
    ("mkv", Family::Video),
    ("mov", Family::Video),
    ("avi", Family::Video),
    // Audio
    ("mp3", Family::Audio),
    ("m4a", Family::Audio),
    ("aac", Family::Audio),
    ("ogg", Family::Audio),
    ("opus", Family::Audio),
    ("flac", Family::Audio),
    ("wav", Family::Audio),
    // Pseudo-formats
    (COMPRESS_TAG, Family::Compress),
];

/// Classify a normalized tag into its family.
pub fn classify(tag: &str) -> Family {
    CLASSIFICATION
        .iter()
        .find(|(known, _)| *known == tag)
        .map(|(_, family)| *family)
        .unwrap_or(Family::Unknown)
}

/// All tags in the classification table, in table order.
pub fn known_tags() -> impl Iterator<Item = FormatTag> {
    CLASSIFICATION.iter().map(|(tag, _)| FormatTag(tag.to_string()))
}

/// A normalized file format identifier.
///
/// Construction always trims, strips a leading dot, lowercases and folds
/// aliases, so `"JPEG"`, `" .jpg"` and `"jpg"` compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormatTag(String);

impl FormatTag {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let lowered = raw
            .as_ref()
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        let canonical = match lowered.as_str() {
            "jpeg" | "jpe" | "jfif" => "jpg",
            "tif" => "tiff",
            "htm" | "xhtml" => "html",
            "markdown" => "md",
            "text" => "txt",
            "oga" => "ogg",
            other => other,
        };
        Self(canonical.to_string())
    }

    /// The compress pseudo-format.
    pub fn compress() -> Self {
        Self(COMPRESS_TAG.to_string())
    }

    /// Tag derived from a filename's extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::new)
            .filter(|tag| !tag.is_empty())
    }

    /// Tag derived from the leading bytes of a payload.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        sniff_magic(bytes).map(|tag| Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn family(&self) -> Family {
        classify(&self.0)
    }

    /// MIME type used when serving converted output.
    pub fn mime_type(&self) -> &'static str {
        match self.0.as_str() {
            "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tiff" => "image/tiff",
            "ico" => "image/x-icon",
            "pdf" => "application/pdf",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "txt" => "text/plain; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",
            "html" => "text/html; charset=utf-8",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mkv" => "video/x-matroska",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            "mp3" => "audio/mpeg",
            "m4a" => "audio/mp4",
            "aac" => "audio/aac",
            "ogg" => "audio/ogg",
            "opus" => "audio/opus",
            "flac" => "audio/flac",
            "wav" => "audio/wav",
            _ => "application/octet-stream",
        }
    }
}

impl From<String> for FormatTag {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for FormatTag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<FormatTag> for String {
    fn from(tag: FormatTag) -> Self {
        tag.0
    }
}

impl PartialEq<str> for FormatTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FormatTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sniff_magic(bytes: &[u8]) -> Option<&'static str> {
    let head = &bytes[..bytes.len().min(64)];

    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("png");
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if head.starts_with(b"GIF8") {
        return Some("gif");
    }
    if head.starts_with(b"RIFF") && head.len() >= 12 {
        return match &head[8..12] {
            b"WEBP" => Some("webp"),
            b"WAVE" => Some("wav"),
            b"AVI " => Some("avi"),
            _ => None,
        };
    }
    if head.starts_with(b"BM") {
        return Some("bmp");
    }
    if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        return Some("tiff");
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some("ico");
    }
    if head.starts_with(b"%PDF") {
        return Some("pdf");
    }
    if head.starts_with(b"PK\x03\x04") {
        return Some("docx");
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"qt  " => Some("mov"),
            b"M4A " => Some("m4a"),
            _ => Some("mp4"),
        };
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return if contains(head, b"webm") {
            Some("webm")
        } else {
            Some("mkv")
        };
    }
    if head.starts_with(b"OggS") {
        return if contains(head, b"OpusHead") {
            Some("opus")
        } else {
            Some("ogg")
        };
    }
    if head.starts_with(b"fLaC") {
        return Some("flac");
    }
    if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0) {
        return Some("mp3");
    }

    let text = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        return Some("html");
    }

    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(FormatTag::new("JPG"), FormatTag::new("jpg"));
        assert_eq!(FormatTag::new("  .Png "), "png");
        assert_eq!(FormatTag::new("JPEG"), "jpg");
        assert_eq!(FormatTag::new("htm"), "html");
        assert_eq!(FormatTag::new("Markdown"), "md");
    }

    #[test]
    fn test_classification_is_total() {
        assert_eq!(FormatTag::new("png").family(), Family::Image);
        assert_eq!(FormatTag::new("docx").family(), Family::Document);
        assert_eq!(FormatTag::new("mkv").family(), Family::Video);
        assert_eq!(FormatTag::new("flac").family(), Family::Audio);
        assert_eq!(FormatTag::compress().family(), Family::Compress);
        assert_eq!(FormatTag::new("xyz").family(), Family::Unknown);
        assert_eq!(FormatTag::new("").family(), Family::Unknown);
    }

    #[test]
    fn test_every_known_tag_has_one_family() {
        let tags: Vec<FormatTag> = known_tags().collect();
        for tag in &tags {
            assert_eq!(tags.iter().filter(|t| *t == tag).count(), 1, "{tag} listed twice");
            assert_ne!(tag.family(), Family::Unknown);
        }
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(FormatTag::from_filename("Photo.JPEG"), Some(FormatTag::new("jpg")));
        assert_eq!(FormatTag::from_filename("archive.tar.gz"), Some(FormatTag::new("gz")));
        assert_eq!(FormatTag::from_filename("README"), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(FormatTag::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]).unwrap(), "png");
        assert_eq!(FormatTag::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(), "jpg");
        assert_eq!(FormatTag::sniff(b"%PDF-1.7\n").unwrap(), "pdf");
        assert_eq!(FormatTag::sniff(b"RIFF\0\0\0\0WEBPVP8 ").unwrap(), "webp");
        assert_eq!(FormatTag::sniff(b"RIFF\0\0\0\0WAVEfmt ").unwrap(), "wav");
        assert_eq!(FormatTag::sniff(b"\0\0\0\x20ftypisom\0\0").unwrap(), "mp4");
        assert_eq!(FormatTag::sniff(b"\0\0\0\x14ftypqt  \0\0").unwrap(), "mov");
        assert_eq!(FormatTag::sniff(b"  <!DOCTYPE html><html>").unwrap(), "html");
        assert!(FormatTag::sniff(b"just some words").is_none());
        assert!(FormatTag::sniff(&[]).is_none());
    }

    #[test]
    fn test_serde_normalizes() {
        let tag: FormatTag = serde_json::from_str("\"JPEG\"").unwrap();
        assert_eq!(tag, "jpg");
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"jpg\"");
    }
}
