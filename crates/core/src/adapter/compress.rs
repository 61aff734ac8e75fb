//! Same-format image recompression.

use async_trait::async_trait;
use image::codecs::png::CompressionType;
use image::DynamicImage;
use tracing::debug;

use super::error::AdapterError;
use super::image::{decode, encode};
use super::traits::CodecAdapter;
use crate::conversion::{ConversionRequest, ConversionResult};
use crate::format::{AdapterId, FormatTag};
use crate::scratch::ScratchDir;

/// Starting lossy quality when the request does not set one.
const START_QUALITY: u8 = 75;
const QUALITY_STEP: u8 = 15;
const MIN_QUALITY: u8 = 30;

/// Re-encodes an image in its own format at a reduced size.
///
/// The output tag is always the source tag, and the output is never larger
/// than the input: when no attempt is smaller, the input comes back as is.
#[derive(Debug, Default)]
pub struct CompressAdapter;

impl CompressAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Lossy qualities to try, highest first.
fn quality_ladder(start: u8) -> Vec<u8> {
    let start = start.clamp(MIN_QUALITY, 100);
    let mut ladder = Vec::new();
    let mut q = start;
    loop {
        ladder.push(q);
        if q < MIN_QUALITY + QUALITY_STEP {
            break;
        }
        q -= QUALITY_STEP;
    }
    if ladder.last() != Some(&MIN_QUALITY) {
        ladder.push(MIN_QUALITY);
    }
    ladder
}

/// Drops an alpha channel that carries no information.
fn strip_opaque_alpha(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    let rgba = img.to_rgba8();
    if rgba.pixels().all(|p| p.0[3] == u8::MAX) {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    }
}

fn recompress(payload: &[u8], tag: &FormatTag, start_quality: u8) -> Result<Vec<u8>, AdapterError> {
    let mut img = decode(payload, tag)?;
    let input_len = payload.len();

    // (quality, png compression) pairs, best looking first.
    let attempts: Vec<(u8, CompressionType)> = match tag.as_str() {
        "jpg" | "webp" => quality_ladder(start_quality)
            .into_iter()
            .map(|q| (q, CompressionType::Default))
            .collect(),
        "png" => {
            img = strip_opaque_alpha(img);
            vec![(start_quality, CompressionType::Best)]
        }
        _ => vec![(start_quality, CompressionType::Best)],
    };

    for (quality, png_compression) in attempts {
        let candidate = encode(&img, tag, quality, png_compression)?;
        debug!(format = %tag, input_len, output_len = candidate.len(), "Compression attempt");
        if candidate.len() < input_len {
            return Ok(candidate);
        }
    }

    Ok(payload.to_vec())
}

#[async_trait]
impl CodecAdapter for CompressAdapter {
    fn id(&self) -> AdapterId {
        AdapterId::Compress
    }

    fn name(&self) -> &str {
        "compress"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        _scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError> {
        let payload = request.payload.clone();
        let tag = request.source.clone();
        let start = request.options.quality_or(START_QUALITY);

        let data = tokio::task::spawn_blocking(move || recompress(&payload, &tag, start))
            .await
            .map_err(|e| {
                AdapterError::backend_unavailable(format!("compress worker failed: {}", e), None)
            })??;

        Ok(ConversionResult::new(data, request.source.clone(), self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::ScratchSpace;
    use crate::testing::fixtures;

    #[test]
    fn test_quality_ladder() {
        assert_eq!(quality_ladder(75), vec![75, 60, 45, 30]);
        assert_eq!(quality_ladder(100), vec![100, 85, 70, 55, 40, 30]);
        assert_eq!(quality_ladder(10), vec![30]);
    }

    #[tokio::test]
    async fn test_jpeg_gets_smaller_and_keeps_tag() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(root.path());
        let input = fixtures::noisy_jpeg(256, 256, 95);

        let request = ConversionRequest::new(input.clone(), "compress").with_source("jpg");
        let scratch = space.acquire(&request.id).unwrap();
        let result = CompressAdapter::new().convert(&request, &scratch).await.unwrap();

        assert_eq!(result.format, "jpg");
        assert!(result.data.len() < input.len());
        image::load_from_memory_with_format(&result.data, image::ImageFormat::Jpeg).unwrap();
    }

    #[tokio::test]
    async fn test_never_grows_output() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(root.path());
        // Already heavily compressed: no attempt can beat it.
        let input = fixtures::noisy_jpeg(64, 64, 5);

        let request = ConversionRequest::new(input.clone(), "compress").with_source("jpg");
        let scratch = space.acquire(&request.id).unwrap();
        let result = CompressAdapter::new().convert(&request, &scratch).await.unwrap();

        assert!(result.data.len() <= input.len());
        assert_eq!(result.format, "jpg");
    }

    #[tokio::test]
    async fn test_lossy_webp_gets_smaller() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(root.path());
        let input = fixtures::noisy_webp(128, 128, 100);

        let request = ConversionRequest::new(input.clone(), "compress").with_source("webp");
        let scratch = space.acquire(&request.id).unwrap();
        let result = CompressAdapter::new().convert(&request, &scratch).await.unwrap();

        assert_eq!(result.format, "webp");
        assert!(result.data.len() < input.len());
        image::load_from_memory_with_format(&result.data, image::ImageFormat::WebP).unwrap();
    }

    #[tokio::test]
    async fn test_png_opaque_alpha_is_stripped() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(root.path());
        let input = fixtures::opaque_rgba_png(64, 64);

        let request = ConversionRequest::new(input.clone(), "compress").with_source("png");
        let scratch = space.acquire(&request.id).unwrap();
        let result = CompressAdapter::new().convert(&request, &scratch).await.unwrap();

        assert_eq!(result.format, "png");
        assert!(result.data.len() <= input.len());
    }

    #[tokio::test]
    async fn test_corrupt_input() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(root.path());
        let request = ConversionRequest::new(b"not a jpeg".to_vec(), "compress").with_source("jpg");
        let scratch = space.acquire(&request.id).unwrap();
        let err = CompressAdapter::new().convert(&request, &scratch).await.unwrap_err();
        assert!(matches!(err, AdapterError::CorruptInput { .. }));
    }
}
