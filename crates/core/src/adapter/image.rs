//! Image re-encoding adapter built on the `image` crate.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use super::error::AdapterError;
use super::traits::CodecAdapter;
use crate::conversion::{ConversionOptions, ConversionRequest, ConversionResult};
use crate::format::{AdapterId, FormatTag};
use crate::scratch::ScratchDir;

/// Default encode quality when the request does not set one.
pub const DEFAULT_IMAGE_QUALITY: u8 = 90;

/// Largest edge the ICO container can store.
const ICO_MAX_EDGE: u32 = 256;

/// Largest edge the WebP bitstream can store.
const WEBP_MAX_EDGE: u32 = 16_383;

/// Re-encodes images between raster formats with optional resizing.
pub struct ImageAdapter {
    default_quality: u8,
}

impl ImageAdapter {
    pub fn new(default_quality: u8) -> Self {
        Self {
            default_quality: default_quality.clamp(1, 100),
        }
    }
}

impl Default for ImageAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_QUALITY)
    }
}

/// Maps a tag onto the codec the `image` crate uses for it.
pub(crate) fn image_format(tag: &FormatTag) -> Option<ImageFormat> {
    match tag.as_str() {
        "jpg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "webp" => Some(ImageFormat::WebP),
        "gif" => Some(ImageFormat::Gif),
        "bmp" => Some(ImageFormat::Bmp),
        "tiff" => Some(ImageFormat::Tiff),
        "ico" => Some(ImageFormat::Ico),
        _ => None,
    }
}

/// Decodes `bytes` strictly as the claimed `source` format.
pub(crate) fn decode(bytes: &[u8], source: &FormatTag) -> Result<DynamicImage, AdapterError> {
    let format = image_format(source).ok_or_else(|| {
        AdapterError::unsupported_option(format!("{} is not a raster image format", source))
    })?;

    image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
        ImageError::Limits(limit) => {
            AdapterError::unsupported_option(format!("image exceeds decoder limits: {}", limit))
        }
        ImageError::Unsupported(unsupported) => {
            AdapterError::unsupported_option(format!("unsupported image feature: {}", unsupported))
        }
        other => AdapterError::corrupt_input(format!("not a valid {} image: {}", source, other)),
    })
}

/// Encodes `img` as `target`. `quality` applies to lossy encoders.
pub(crate) fn encode(
    img: &DynamicImage,
    target: &FormatTag,
    quality: u8,
    png_compression: CompressionType,
) -> Result<Vec<u8>, AdapterError> {
    let format = image_format(target).ok_or_else(|| {
        AdapterError::unsupported_option(format!("cannot encode images as {}", target))
    })?;

    let mut out = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::Png => {
            let encoder = PngEncoder::new_with_quality(&mut out, png_compression, PngFilter::Adaptive);
            normalize_color(img).write_with_encoder(encoder)
        }
        ImageFormat::WebP => return encode_webp(img, quality),
        ImageFormat::Ico => {
            if img.width() > ICO_MAX_EDGE || img.height() > ICO_MAX_EDGE {
                return Err(AdapterError::unsupported_option(format!(
                    "ico output is limited to {}x{} pixels",
                    ICO_MAX_EDGE, ICO_MAX_EDGE
                )));
            }
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, format)
        }
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, format),
        _ => normalize_color(img).write_to(&mut out, format),
    };

    result.map_err(|e| match e {
        ImageError::Unsupported(unsupported) => {
            AdapterError::unsupported_option(format!("cannot encode {}: {}", target, unsupported))
        }
        ImageError::Limits(limit) => {
            AdapterError::unsupported_option(format!("image exceeds encoder limits: {}", limit))
        }
        ImageError::Parameter(_) | ImageError::Encoding(_) => {
            AdapterError::unsupported_option(format!("cannot encode as {}: {}", target, e))
        }
        other => AdapterError::backend_unavailable(format!("encoder failed: {}", other), None),
    })?;

    Ok(out.into_inner())
}

/// Lossy WebP through libwebp. Opaque images skip the alpha plane.
fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, AdapterError> {
    let (width, height) = (img.width(), img.height());
    if width > WEBP_MAX_EDGE || height > WEBP_MAX_EDGE {
        return Err(AdapterError::unsupported_option(format!(
            "webp output is limited to {}x{} pixels",
            WEBP_MAX_EDGE, WEBP_MAX_EDGE
        )));
    }

    let quality = f32::from(quality.clamp(1, 100));
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, quality)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, quality)
    };

    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| AdapterError::unsupported_option(format!("cannot encode as webp: {:?}", e)))
}

/// Collapses exotic pixel layouts to 8-bit RGB(A), which every encoder takes.
fn normalize_color(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Computes fit-inside dimensions for a `src` image and the requested box.
///
/// A single given edge preserves aspect ratio. Without `allow_upscale` the
/// result never exceeds the source.
pub fn fit_inside(
    src: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    allow_upscale: bool,
) -> (u32, u32) {
    let (src_w, src_h) = src;
    if src_w == 0 || src_h == 0 {
        return src;
    }

    let scale_w = width.map(|w| w as f64 / src_w as f64);
    let scale_h = height.map(|h| h as f64 / src_h as f64);

    let scale = match (scale_w, scale_h) {
        (None, None) => return src,
        (Some(s), None) | (None, Some(s)) => s,
        (Some(a), Some(b)) => a.min(b),
    };
    let scale = if allow_upscale { scale } else { scale.min(1.0) };

    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);

    // Rounding may push one edge a pixel past the box.
    (
        width.map_or(w, |max| w.min(max.max(1))),
        height.map_or(h, |max| h.min(max.max(1))),
    )
}

fn transform(
    payload: &[u8],
    source: &FormatTag,
    target: &FormatTag,
    options: &ConversionOptions,
    quality: u8,
) -> Result<Vec<u8>, AdapterError> {
    let mut img = decode(payload, source)?;

    let (w, h) = fit_inside(
        (img.width(), img.height()),
        options.width,
        options.height,
        options.enhance,
    );
    if (w, h) != (img.width(), img.height()) {
        debug!(
            from_width = img.width(),
            from_height = img.height(),
            to_width = w,
            to_height = h,
            "Resizing image"
        );
        img = img.resize_exact(w, h, FilterType::Lanczos3);
    }

    if options.enhance {
        img = img.unsharpen(0.8, 2);
    }

    encode(&img, target, quality, CompressionType::Default)
}

#[async_trait]
impl CodecAdapter for ImageAdapter {
    fn id(&self) -> AdapterId {
        AdapterId::Image
    }

    fn name(&self) -> &str {
        "image"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        _scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError> {
        let payload = request.payload.clone();
        let source = request.source.clone();
        let target = request.target.clone();
        let options = request.options.clone();
        let quality = options.quality_or(self.default_quality);

        let data = tokio::task::spawn_blocking(move || {
            transform(&payload, &source, &target, &options, quality)
        })
        .await
        .map_err(|e| AdapterError::backend_unavailable(format!("image worker failed: {}", e), None))??;

        Ok(ConversionResult::new(data, request.target.clone(), self.name()))
    }
}
