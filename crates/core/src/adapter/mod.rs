//! Codec backend adapters.
//!
//! Each adapter wraps exactly one external encode/decode capability:
//!
//! - [`ImageAdapter`]: raster re-encoding and resizing (`image` crate)
//! - [`DocumentAdapter`]: pdf/docx/txt/md/html text extraction and rendering
//! - [`MediaAdapter`]: audio and video transcoding through ffmpeg
//! - [`CompressAdapter`]: same-format image recompression

mod compress;
mod document;
mod error;
mod image;
pub mod media;
mod traits;

pub use self::image::{fit_inside, ImageAdapter, DEFAULT_IMAGE_QUALITY};
pub use compress::CompressAdapter;
pub use document::{html_to_text, markdown_to_html, markdown_to_text, DocumentAdapter};
pub use error::AdapterError;
pub use media::{FfmpegConfig, MediaAdapter};
pub use traits::CodecAdapter;
