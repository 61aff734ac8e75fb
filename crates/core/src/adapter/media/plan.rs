//! Codec selection and option mapping for ffmpeg jobs.

use crate::adapter::AdapterError;
use crate::conversion::ConversionOptions;
use crate::format::{Family, FormatTag};

/// Quality used when the request does not set one.
pub const DEFAULT_MEDIA_QUALITY: u8 = 85;

/// Accepted range for an explicit audio bitrate.
pub const MIN_BITRATE_KBPS: u32 = 32;
pub const MAX_BITRATE_KBPS: u32 = 320;

/// Audio codecs the adapter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Mp3,
    Aac,
    Vorbis,
    Opus,
    Flac,
    Wav,
}

impl AudioCodec {
    pub fn for_tag(tag: &FormatTag) -> Option<Self> {
        match tag.as_str() {
            "mp3" => Some(Self::Mp3),
            "m4a" | "aac" => Some(Self::Aac),
            "ogg" => Some(Self::Vorbis),
            "opus" => Some(Self::Opus),
            "flac" => Some(Self::Flac),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }

    /// Returns the ffmpeg encoder name.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Aac => "aac",
            Self::Vorbis => "libvorbis",
            Self::Opus => "libopus",
            Self::Flac => "flac",
            Self::Wav => "pcm_s16le",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Wav)
    }
}

/// Video codecs the adapter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
    Mpeg4,
}

impl VideoCodec {
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Vp9 => "libvpx-vp9",
            Self::Mpeg4 => "mpeg4",
        }
    }

    /// Maps 1-100 quality onto the codec's own scale, returned as
    /// `(flag, value)`.
    pub fn quality_arg(&self, quality: u8) -> (&'static str, u32) {
        let q = quality.clamp(1, 100) as u32;
        match self {
            // CRF 51 (worst) .. 18 (visually lossless)
            Self::H264 => ("-crf", 51 - q * 33 / 100),
            // CRF 63 .. 15
            Self::Vp9 => ("-crf", 63 - q * 48 / 100),
            // qscale 31 .. 2
            Self::Mpeg4 => ("-q:v", 31 - q * 29 / 100),
        }
    }
}

/// Output containers for video targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Webm,
    Mkv,
    Mov,
    Avi,
}

impl Container {
    pub fn for_tag(tag: &FormatTag) -> Option<Self> {
        match tag.as_str() {
            "mp4" => Some(Self::Mp4),
            "webm" => Some(Self::Webm),
            "mkv" => Some(Self::Mkv),
            "mov" => Some(Self::Mov),
            "avi" => Some(Self::Avi),
            _ => None,
        }
    }

    pub fn video_codec(&self) -> VideoCodec {
        match self {
            Self::Mp4 | Self::Mkv | Self::Mov => VideoCodec::H264,
            Self::Webm => VideoCodec::Vp9,
            Self::Avi => VideoCodec::Mpeg4,
        }
    }

    pub fn audio_codec(&self) -> AudioCodec {
        match self {
            Self::Mp4 | Self::Mkv | Self::Mov => AudioCodec::Aac,
            Self::Webm => AudioCodec::Opus,
            Self::Avi => AudioCodec::Mp3,
        }
    }
}

/// Fully resolved ffmpeg job parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPlan {
    Audio {
        codec: AudioCodec,
        bitrate_kbps: Option<u32>,
    },
    Video {
        container: Container,
        quality: u8,
        audio_bitrate_kbps: u32,
        max_width: Option<u32>,
        max_height: Option<u32>,
    },
}

/// Default bitrate derived from quality: 1 → 66 kbps, 100 → 320 kbps.
pub fn bitrate_for_quality(quality: u8) -> u32 {
    64 + quality.clamp(1, 100) as u32 * 256 / 100
}

fn explicit_bitrate(options: &ConversionOptions) -> Result<Option<u32>, AdapterError> {
    match options.bitrate_kbps {
        Some(kbps) if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&kbps) => {
            Err(AdapterError::unsupported_option(format!(
                "bitrate {} kbps is outside {}-{} kbps",
                kbps, MIN_BITRATE_KBPS, MAX_BITRATE_KBPS
            )))
        }
        other => Ok(other),
    }
}

/// Resolves the ffmpeg job for `source → target` with `options`.
pub fn plan(
    source: &FormatTag,
    target: &FormatTag,
    options: &ConversionOptions,
) -> Result<MediaPlan, AdapterError> {
    let bitrate = explicit_bitrate(options)?;
    let quality = options.quality_or(DEFAULT_MEDIA_QUALITY);

    match target.family() {
        Family::Audio => {
            if options.width.is_some() || options.height.is_some() {
                return Err(AdapterError::unsupported_option(
                    "width and height cannot be applied to audio output",
                ));
            }
            let codec = AudioCodec::for_tag(target).ok_or_else(|| {
                AdapterError::unsupported_option(format!("no audio encoder for {}", target))
            })?;
            if codec.is_lossless() {
                if bitrate.is_some() {
                    return Err(AdapterError::unsupported_option(format!(
                        "{} is lossless and takes no bitrate",
                        target
                    )));
                }
                return Ok(MediaPlan::Audio {
                    codec,
                    bitrate_kbps: None,
                });
            }
            Ok(MediaPlan::Audio {
                codec,
                bitrate_kbps: Some(bitrate.unwrap_or_else(|| bitrate_for_quality(quality))),
            })
        }
        Family::Video if source.family() == Family::Video => {
            let container = Container::for_tag(target).ok_or_else(|| {
                AdapterError::unsupported_option(format!("no video container for {}", target))
            })?;
            Ok(MediaPlan::Video {
                container,
                quality,
                audio_bitrate_kbps: bitrate.unwrap_or(192),
                max_width: options.width,
                max_height: options.height,
            })
        }
        _ => Err(AdapterError::unsupported_option(format!(
            "media adapter cannot produce {} from {}",
            target, source
        ))),
    }
}
