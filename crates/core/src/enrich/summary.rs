use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::ocr::document_text;
use super::{EnrichError, Enricher};
use crate::config::SummaryConfig;
use crate::conversion::{
    ConversionOptions, ConversionRequest, ConversionResult, AUX_SUMMARY, AUX_TEXT,
};
use crate::format::Family;
use crate::scratch::ScratchDir;

static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z']+").expect("valid regex"));

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "her", "was", "one",
    "our", "out", "his", "has", "had", "its", "this", "that", "with", "from", "they", "them",
    "then", "than", "have", "were", "been", "will", "would", "there", "their", "which", "what",
    "when", "who", "into", "also", "more", "some", "such", "only", "other", "these", "those",
];

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    text: &'a str,
    max_sentences: usize,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// Attaches a summary of text-bearing outputs.
///
/// Tries the configured summarization endpoint first and falls back to
/// [`extractive_summary`] on any failure.
pub struct SummaryEnricher {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    max_sentences: usize,
}

impl SummaryEnricher {
    pub fn new(config: &SummaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_sentences: config.max_sentences.max(1),
        }
    }

    async fn remote_summary(&self, url: &str, text: &str) -> Result<String, EnrichError> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&SummaryRequest {
                text,
                max_sentences: self.max_sentences,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EnrichError::Api { status, message });
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;
        Ok(body.summary.trim().to_string())
    }
}

impl Default for SummaryEnricher {
    fn default() -> Self {
        Self::new(&SummaryConfig::default())
    }
}

#[async_trait]
impl Enricher for SummaryEnricher {
    fn key(&self) -> &'static str {
        AUX_SUMMARY
    }

    fn name(&self) -> &'static str {
        "summary"
    }

    fn wants(&self, options: &ConversionOptions) -> bool {
        options.summarize
    }

    async fn enrich(
        &self,
        _request: &ConversionRequest,
        result: &ConversionResult,
        _scratch: &ScratchDir,
    ) -> Result<Option<String>, EnrichError> {
        let text = if result.format.family() == Family::Document {
            document_text(result)
        } else if let Some(text) = result.aux.get(AUX_TEXT) {
            text.clone()
        } else {
            return Ok(None);
        };

        if text.trim().is_empty() {
            return Ok(None);
        }

        if let Some(url) = &self.url {
            match self.remote_summary(url, &text).await {
                Ok(summary) if !summary.is_empty() => return Ok(Some(summary)),
                Ok(_) => debug!("Remote summarizer returned nothing, using extractive summary"),
                Err(e) => warn!(error = %e, "Remote summarizer failed, using extractive summary"),
            }
        }

        let summary = extractive_summary(&text, self.max_sentences);
        Ok((!summary.is_empty()).then_some(summary))
    }
}

/// Picks the `max_sentences` highest-scoring sentences, kept in their
/// original order. A sentence scores the mean document frequency of its
/// content words.
pub fn extractive_summary(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.len() <= max_sentences {
        return sentences.join(" ");
    }

    let content_words = |sentence: &str| -> Vec<String> {
        WORD.find_iter(sentence)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
            .collect()
    };

    let mut frequency: HashMap<String, usize> = HashMap::new();
    for sentence in &sentences {
        for word in content_words(sentence) {
            *frequency.entry(word).or_insert(0) += 1;
        }
    }

    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(index, sentence)| {
            let words = content_words(sentence);
            let score = if words.is_empty() {
                0.0
            } else {
                let total: usize = words.iter().map(|w| frequency[w]).sum();
                total as f64 / words.len() as f64
            };
            (index, score)
        })
        .collect();

    // Highest score first; earlier sentences win ties.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut chosen: Vec<usize> = scored
        .into_iter()
        .take(max_sentences)
        .map(|(index, _)| index)
        .collect();
    chosen.sort_unstable();

    chosen
        .into_iter()
        .map(|index| sentences[index])
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTag;
    use crate::scratch::ScratchSpace;
    use tempfile::TempDir;

    const ARTICLE: &str = "Rust compilers check ownership at compile time. \
        Lunch was pleasant. \
        Ownership rules let Rust compilers reject data races. \
        The weather turned grey. \
        Rust ownership and borrowing replace a garbage collector.";

    #[test]
    fn test_short_text_returned_whole() {
        assert_eq!(
            extractive_summary("One sentence. Two sentences!", 3),
            "One sentence. Two sentences!"
        );
    }

    #[test]
    fn test_extractive_summary_prefers_central_sentences() {
        let summary = extractive_summary(ARTICLE, 2);
        assert!(summary.contains("compile time"));
        assert!(summary.contains("garbage collector"));
        assert!(!summary.contains("Lunch"));
        assert!(!summary.contains("weather"));
    }

    #[test]
    fn test_extractive_summary_keeps_original_order() {
        let summary = extractive_summary(ARTICLE, 3);
        let first = summary.find("compile time").unwrap();
        let second = summary.find("Ownership rules").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_extractive_summary_empty() {
        assert_eq!(extractive_summary("   ", 3), "");
    }

    #[tokio::test]
    async fn test_enrich_document_without_remote() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("sum").unwrap();
        let enricher = SummaryEnricher::new(&SummaryConfig {
            max_sentences: 1,
            ..Default::default()
        });
        let request = ConversionRequest::new(b"x".to_vec(), "txt");
        let result = ConversionResult::new(ARTICLE.as_bytes().to_vec(), FormatTag::new("txt"), "document");

        let summary = enricher.enrich(&request, &result, &scratch).await.unwrap().unwrap();
        assert!(summary.contains("Rust"));
        assert!(!summary.contains("Lunch"));
    }

    #[tokio::test]
    async fn test_unreachable_remote_falls_back() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("sum").unwrap();
        let enricher = SummaryEnricher::new(&SummaryConfig {
            url: Some("http://127.0.0.1:1/summarize".to_string()),
            timeout_secs: 2,
            max_sentences: 1,
            ..Default::default()
        });
        let request = ConversionRequest::new(b"x".to_vec(), "txt");
        let result = ConversionResult::new(ARTICLE.as_bytes().to_vec(), FormatTag::new("txt"), "document");

        let summary = enricher.enrich(&request, &result, &scratch).await.unwrap();
        assert!(summary.is_some());
    }

    #[tokio::test]
    async fn test_image_without_text_has_no_summary() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp.path()).acquire("sum").unwrap();
        let request = ConversionRequest::new(b"x".to_vec(), "png");
        let result = ConversionResult::new(vec![0u8; 8], FormatTag::new("png"), "image");

        let summary = SummaryEnricher::default()
            .enrich(&request, &result, &scratch)
            .await
            .unwrap();
        assert!(summary.is_none());
    }
}
