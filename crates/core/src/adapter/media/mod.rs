//! Audio/video transcoding through an external ffmpeg binary.

mod config;
mod plan;

pub use config::FfmpegConfig;
pub use plan::{
    bitrate_for_quality, plan, AudioCodec, Container, MediaPlan, VideoCodec,
    DEFAULT_MEDIA_QUALITY, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS,
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::error::AdapterError;
use super::traits::CodecAdapter;
use crate::conversion::{ConversionRequest, ConversionResult};
use crate::format::{AdapterId, Family};
use crate::scratch::ScratchDir;

static OUT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"out_time_ms=(\d+)").expect("valid regex"));

/// Stderr fragments ffmpeg prints when the input itself is unreadable.
const CORRUPT_INPUT_MARKERS: &[&str] = &[
    "Invalid data found when processing input",
    "moov atom not found",
    "could not find codec parameters",
    "End of file",
];

/// Lines of stderr kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Stream summary read from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub format: String,
    pub duration_secs: f64,
    pub has_audio: bool,
    pub has_video: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Transcodes audio and video by shelling out to ffmpeg.
pub struct MediaAdapter {
    config: FfmpegConfig,
}

impl MediaAdapter {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Creates an adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FfmpegConfig::default())
    }

    fn tail_args(&self, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for an audio-only output.
    fn build_audio_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        codec: AudioCodec,
        bitrate_kbps: Option<u32>,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            // Drop video and cover art streams
            "-vn".to_string(),
            "-c:a".to_string(),
            codec.ffmpeg_codec().to_string(),
        ];

        if !codec.is_lossless() {
            if let Some(bitrate) = bitrate_kbps {
                args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
            }
        }

        args.extend(self.tail_args(output_path));
        args
    }

    /// Builds ffmpeg arguments for a video output.
    #[allow(clippy::too_many_arguments)]
    fn build_video_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        container: Container,
        quality: u8,
        audio_bitrate_kbps: u32,
        max_width: Option<u32>,
        max_height: Option<u32>,
    ) -> Vec<String> {
        let video = container.video_codec();
        let (quality_flag, quality_value) = video.quality_arg(quality);

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-c:v".to_string(),
            video.ffmpeg_codec().to_string(),
            quality_flag.to_string(),
            quality_value.to_string(),
        ];

        // libvpx only honors CRF in constant-quality mode
        if video == VideoCodec::Vp9 {
            args.extend(["-b:v".to_string(), "0".to_string()]);
        }

        if max_width.is_some() || max_height.is_some() {
            let width = max_width.unwrap_or(u32::MAX);
            let height = max_height.unwrap_or(u32::MAX);
            // Scale down only, keeping aspect ratio
            args.extend([
                "-vf".to_string(),
                format!(
                    "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
                    width, height
                ),
            ]);
        }

        if video == VideoCodec::H264 {
            args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        }

        let audio = container.audio_codec();
        args.extend([
            "-c:a".to_string(),
            audio.ffmpeg_codec().to_string(),
            "-b:a".to_string(),
            format!("{}k", audio_bitrate_kbps),
        ]);

        args.extend(self.tail_args(output_path));
        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(output: &str) -> Result<MediaInfo, AdapterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            AdapterError::corrupt_input(format!("unreadable media metadata: {}", e))
        })?;

        let video = probe.streams.iter().find(|s| s.codec_type == "video");

        Ok(MediaInfo {
            format: probe
                .format
                .format_name
                .split(',')
                .next()
                .unwrap_or("unknown")
                .to_string(),
            duration_secs: probe
                .format
                .duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0),
            has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
            has_video: video.is_some(),
            width: video.and_then(|s| s.width),
            height: video.and_then(|s| s.height),
        })
    }

    /// Reads stream information from a media file.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, AdapterError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(&self.config.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(AdapterError::corrupt_input(format!(
                "ffprobe could not read the input: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn spawn_error(&self, binary: &Path, err: std::io::Error) -> AdapterError {
        if err.kind() == std::io::ErrorKind::NotFound {
            AdapterError::backend_unavailable(format!("{} not found", binary.display()), None)
        } else {
            AdapterError::backend_unavailable(
                format!("failed to start {}: {}", binary.display(), err),
                None,
            )
        }
    }

    /// Runs ffmpeg with `args` to completion.
    ///
    /// The orchestrator's time budget bounds this call; dropping the future
    /// kills the child through `kill_on_drop`.
    async fn run_ffmpeg(&self, args: &[String], duration_secs: f64) -> Result<(), AdapterError> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&self.config.ffmpeg_path, e))?;

        let stderr = child.stderr.take().ok_or_else(|| {
            AdapterError::backend_unavailable("ffmpeg stderr was not captured", None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        let mut tail: Vec<String> = Vec::new();
        while let Ok(Some(line)) = reader.next_line().await {
            if let Some(caps) = OUT_TIME.captures(&line) {
                if let Some(us) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                    let secs = us / 1_000_000.0;
                    if duration_secs > 0.0 {
                        trace!(percent = (secs / duration_secs * 100.0).min(100.0), "ffmpeg progress");
                    }
                }
                continue;
            }
            if line.contains('=') && !line.contains(' ') {
                // Other -progress key=value lines
                continue;
            }
            tail.push(line);
            if tail.len() > STDERR_TAIL_LINES {
                tail.remove(0);
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(classify_failure(status.code(), tail.join("\n")))
        }
    }
}

/// Maps a failed ffmpeg exit onto the narrowest adapter error.
fn classify_failure(code: Option<i32>, stderr: String) -> AdapterError {
    let corrupt = CORRUPT_INPUT_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker));
    if corrupt {
        AdapterError::corrupt_input("ffmpeg could not parse the input")
    } else {
        AdapterError::backend_unavailable(
            format!("ffmpeg exited with code {:?}", code),
            if stderr.is_empty() { None } else { Some(stderr) },
        )
    }
}

#[async_trait]
impl CodecAdapter for MediaAdapter {
    fn id(&self) -> AdapterId {
        AdapterId::Media
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError> {
        let plan = plan(&request.source, &request.target, &request.options)?;

        let input_path = scratch
            .write(&format!("input.{}", request.source), &request.payload)
            .await?;
        let output_path = scratch.file(&format!("output.{}", request.target));

        let info = self.probe(&input_path).await?;
        debug!(
            request_id = %request.id,
            format = %info.format,
            duration_secs = info.duration_secs,
            has_audio = info.has_audio,
            has_video = info.has_video,
            "Probed media input"
        );

        let args = match plan {
            MediaPlan::Audio {
                codec,
                bitrate_kbps,
            } => {
                if !info.has_audio {
                    return Err(AdapterError::unsupported_option(
                        "the input has no audio stream to extract",
                    ));
                }
                self.build_audio_args(&input_path, &output_path, codec, bitrate_kbps)
            }
            MediaPlan::Video {
                container,
                quality,
                audio_bitrate_kbps,
                max_width,
                max_height,
            } => {
                if request.source.family() == Family::Video && !info.has_video {
                    return Err(AdapterError::corrupt_input("the input has no video stream"));
                }
                self.build_video_args(
                    &input_path,
                    &output_path,
                    container,
                    quality,
                    audio_bitrate_kbps,
                    max_width,
                    max_height,
                )
            }
        };

        debug!(request_id = %request.id, args = ?args, "Running ffmpeg");
        if let Err(e) = self.run_ffmpeg(&args, info.duration_secs).await {
            if let AdapterError::BackendUnavailable {
                stderr: Some(stderr),
                ..
            } = &e
            {
                warn!(request_id = %request.id, stderr = %stderr, "ffmpeg failed");
            }
            return Err(e);
        }

        let data = tokio::fs::read(&output_path).await.map_err(|e| {
            AdapterError::backend_unavailable(format!("ffmpeg produced no output: {}", e), None)
        })?;

        Ok(ConversionResult::new(data, request.target.clone(), self.name()))
    }

    async fn validate(&self) -> Result<(), AdapterError> {
        for binary in [&self.config.ffmpeg_path, &self.config.ffprobe_path] {
            let output = Command::new(binary)
                .arg("-version")
                .output()
                .await
                .map_err(|e| self.spawn_error(binary, e))?;
            if !output.status.success() {
                return Err(AdapterError::backend_unavailable(
                    format!("{} -version failed", binary.display()),
                    None,
                ));
            }
        }
        Ok(())
    }
}
