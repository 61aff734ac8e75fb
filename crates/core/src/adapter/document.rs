//! Text extraction and text-format rendering for documents.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Event, Parser, TagEnd};
use regex_lite::Regex;
use std::path::PathBuf;
use tracing::debug;

use super::error::AdapterError;
use super::traits::CodecAdapter;
use crate::conversion::{ConversionRequest, ConversionResult};
use crate::format::{AdapterId, FormatTag};
use crate::scratch::ScratchDir;

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});
static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|section|article)>|<br\s*/?>").expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Content pulled out of a source document.
#[derive(Debug, Clone, PartialEq)]
enum Extracted {
    Plain(String),
    Markdown(String),
    Html(String),
}

/// Extracts text from pdf, docx, txt, md and html and renders it as txt,
/// html or md.
#[derive(Debug, Default)]
pub struct DocumentAdapter;

impl DocumentAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn extract(
        &self,
        request: &ConversionRequest,
        scratch: &ScratchDir,
    ) -> Result<Extracted, AdapterError> {
        match request.source.as_str() {
            "pdf" | "docx" => {
                let source = request.source.clone();
                let path = scratch
                    .write(&format!("input.{}", source), &request.payload)
                    .await?;
                let text = tokio::task::spawn_blocking(move || extract_from_file(&source, path))
                    .await
                    .map_err(|e| {
                        if e.is_panic() {
                            AdapterError::corrupt_input("document parser rejected the file")
                        } else {
                            AdapterError::backend_unavailable(
                                format!("extraction worker failed: {}", e),
                                None,
                            )
                        }
                    })??;
                Ok(Extracted::Plain(text))
            }
            "txt" => Ok(Extracted::Plain(utf8(&request.payload, "txt")?)),
            "md" => Ok(Extracted::Markdown(utf8(&request.payload, "md")?)),
            "html" => Ok(Extracted::Html(utf8(&request.payload, "html")?)),
            other => Err(AdapterError::unsupported_option(format!(
                "cannot extract text from {}",
                other
            ))),
        }
    }
}

fn extract_from_file(source: &FormatTag, path: PathBuf) -> Result<String, AdapterError> {
    match source.as_str() {
        "pdf" => pdf_extract::extract_text(&path)
            .map_err(|e| AdapterError::corrupt_input(format!("not a readable pdf: {}", e))),
        "docx" => docx_lite::extract_text(&path)
            .map_err(|e| AdapterError::corrupt_input(format!("not a readable docx: {}", e))),
        other => Err(AdapterError::unsupported_option(format!(
            "no file extractor for {}",
            other
        ))),
    }
}

fn utf8(bytes: &[u8], tag: &str) -> Result<String, AdapterError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AdapterError::corrupt_input(format!("{} input is not valid UTF-8", tag)))
}

/// Strips markup from an HTML document, keeping block boundaries as newlines.
pub fn html_to_text(input: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(input, "");
    let with_breaks = BLOCK_END.replace_all(&without_scripts, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);
    let collapsed = INLINE_SPACE.replace_all(&decoded, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Flattens Markdown to plain text.
pub fn markdown_to_text(input: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(input) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => out.push_str("\n\n"),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Renders Markdown as an HTML body fragment.
pub fn markdown_to_html(input: &str) -> String {
    let mut body = String::new();
    html::push_html(&mut body, Parser::new(input));
    body
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn text_to_html_body(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|para| !para.is_empty())
        .map(|para| format!("<p>{}</p>\n", escape_html(para).replace('\n', "<br>\n")))
        .collect()
}

fn html_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n{}</body>\n</html>\n",
        body
    )
}

fn render(extracted: Extracted, target: &FormatTag) -> Result<String, AdapterError> {
    let rendered = match (target.as_str(), extracted) {
        ("txt", Extracted::Plain(text)) => text,
        ("txt", Extracted::Markdown(md)) => markdown_to_text(&md),
        ("txt", Extracted::Html(html)) => html_to_text(&html),

        ("md", Extracted::Plain(text)) => text,
        ("md", Extracted::Markdown(md)) => md,
        ("md", Extracted::Html(html)) => html_to_text(&html),

        ("html", Extracted::Plain(text)) => html_document(&text_to_html_body(&text)),
        ("html", Extracted::Markdown(md)) => html_document(&markdown_to_html(&md)),
        ("html", Extracted::Html(html)) => html,

        (other, _) => {
            return Err(AdapterError::unsupported_option(format!(
                "documents can only be rendered as txt, html or md, not {}",
                other
            )))
        }
    };
    Ok(rendered)
}

#[async_trait]
impl CodecAdapter for DocumentAdapter {
    fn id(&self) -> AdapterId {
        AdapterId::Document
    }

    fn name(&self) -> &str {
        "document"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError> {
        let extracted = self.extract(request, scratch).await?;
        let rendered = render(extracted, &request.target)?;
        debug!(
            source = %request.source,
            target = %request.target,
            chars = rendered.len(),
            "Rendered document"
        );
        Ok(ConversionResult::new(
            rendered.into_bytes(),
            request.target.clone(),
            self.name(),
        ))
    }
}
