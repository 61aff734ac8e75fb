use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{EnrichError, Enricher};
use crate::adapter::{html_to_text, markdown_to_text};
use crate::config::OcrConfig;
use crate::conversion::{ConversionOptions, ConversionRequest, ConversionResult, AUX_TEXT};
use crate::format::Family;
use crate::scratch::ScratchDir;

/// Attaches recognized text to image outputs via the `tesseract` CLI.
/// Text outputs are copied as they are.
pub struct OcrEnricher {
    tesseract_path: PathBuf,
    language: String,
}

impl OcrEnricher {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            tesseract_path: config.tesseract_path.clone(),
            language: config.language.clone(),
        }
    }

    async fn recognize(&self, result: &ConversionResult, scratch: &ScratchDir) -> Result<String, EnrichError> {
        let input = scratch
            .write(&format!("ocr-input.{}", result.format), &result.data)
            .await?;

        debug!(path = %input.display(), language = %self.language, "Running tesseract");

        let output = Command::new(&self.tesseract_path)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EnrichError::ToolUnavailable(format!(
                        "{} not found",
                        self.tesseract_path.display()
                    ))
                } else {
                    EnrichError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnrichError::ToolFailed(
                stderr.lines().last().unwrap_or("tesseract failed").to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for OcrEnricher {
    fn default() -> Self {
        Self::new(&OcrConfig::default())
    }
}

/// Plain text carried by a document output.
pub(crate) fn document_text(result: &ConversionResult) -> String {
    let raw = String::from_utf8_lossy(&result.data);
    match result.format.as_str() {
        "html" => html_to_text(&raw),
        "md" => markdown_to_text(&raw),
        _ => raw.into_owned(),
    }
}

#[async_trait]
impl Enricher for OcrEnricher {
    fn key(&self) -> &'static str {
        AUX_TEXT
    }

    fn name(&self) -> &'static str {
        "ocr"
    }

    fn wants(&self, options: &ConversionOptions) -> bool {
        options.extract_text
    }

    async fn enrich(
        &self,
        _request: &ConversionRequest,
        result: &ConversionResult,
        scratch: &ScratchDir,
    ) -> Result<Option<String>, EnrichError> {
        let text = match result.format.family() {
            Family::Image => self.recognize(result, scratch).await?,
            Family::Document => document_text(result),
            _ => return Ok(None),
        };

        let text = text.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTag;
    use crate::scratch::ScratchSpace;
    use tempfile::TempDir;

    fn text_result(data: &str, format: &str) -> ConversionResult {
        ConversionResult::new(data.as_bytes().to_vec(), FormatTag::new(format), "document")
    }

    #[test]
    fn test_wants_extract_text_flag() {
        let enricher = OcrEnricher::default();
        assert!(!enricher.wants(&ConversionOptions::default()));
        assert!(enricher.wants(&ConversionOptions {
            extract_text: true,
            ..Default::default()
        }));
    }

    #[tokio::test]
    async fn test_document_output_is_copied() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("ocr").unwrap();
        let request = ConversionRequest::new(b"x".to_vec(), "html");
        let result = text_result("<p>Hello <b>there</b></p>", "html");

        let text = OcrEnricher::default()
            .enrich(&request, &result, &scratch)
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn test_missing_tesseract_is_tool_unavailable() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("ocr").unwrap();
        let enricher = OcrEnricher::new(&OcrConfig {
            tesseract_path: PathBuf::from("/nonexistent/tesseract"),
            language: "eng".to_string(),
        });
        let request = ConversionRequest::new(b"x".to_vec(), "png");
        let result = ConversionResult::new(vec![0u8; 16], FormatTag::new("png"), "image");

        let err = enricher.enrich(&request, &result, &scratch).await.unwrap_err();
        assert!(matches!(err, EnrichError::ToolUnavailable(_)));
    }

    #[tokio::test]
    async fn test_media_output_has_no_text() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("ocr").unwrap();
        let request = ConversionRequest::new(b"x".to_vec(), "mp3");
        let result = ConversionResult::new(vec![1, 2, 3], FormatTag::new("mp3"), "ffmpeg");

        let text = OcrEnricher::default()
            .enrich(&request, &result, &scratch)
            .await
            .unwrap();
        assert!(text.is_none());
    }
}
