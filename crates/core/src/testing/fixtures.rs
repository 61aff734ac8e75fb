//! Test fixtures: small in-memory media payloads.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

/// A smooth RGB gradient.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// PNG-encoded gradient.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

/// JPEG-encoded gradient at quality 90.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&gradient(width, height))
        .expect("encode jpeg fixture");
    out
}

/// Deterministic RGB noise.
fn noise(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x2545_f491;
    ImageBuffer::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    })
}

/// JPEG of deterministic noise. Compresses badly at high quality, which
/// leaves room for re-encoding to win.
pub fn noisy_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&noise(width, height))
        .expect("encode jpeg fixture");
    out
}

/// Lossy WebP of deterministic noise.
pub fn noisy_webp(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = noise(width, height);
    webp::Encoder::from_rgb(img.as_raw(), width, height)
        .encode(f32::from(quality))
        .to_vec()
}

/// RGBA PNG whose alpha channel is fully opaque.
pub fn opaque_rgba_png(width: u32, height: u32) -> Vec<u8> {
    let img: RgbaImage = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

/// A short Markdown document with a heading, emphasis and a list.
pub const SAMPLE_MARKDOWN: &str = "# Release notes\n\n\
The converter now handles **Markdown** input.\n\n\
- faster image resizing\n\
- fewer temporary files\n";

/// A short HTML document.
pub const SAMPLE_HTML: &str = "<html><head><title>t</title><style>p{}</style></head>\
<body><h1>Release notes</h1><p>The converter now handles <b>HTML</b> input.</p></body></html>";
