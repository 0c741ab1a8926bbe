use ac_ffmpeg::codec::video::scaler::Algorithm;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Alignment of the video frame buffer, matching what the scaler's SIMD paths expect.
pub const DEFAULT_FRAME_ALIGNMENT: usize = 128;

/// Interpolation used when converting decoded pictures to the output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAlgorithm {
    FastBilinear,
    #[default]
    Bilinear,
    Bicubic,
    Point,
    Area,
    Lanczos,
}

impl ScaleAlgorithm {
    pub(crate) fn to_ffmpeg(self) -> Algorithm {
        match self {
            ScaleAlgorithm::FastBilinear => Algorithm::FastBilinear,
            ScaleAlgorithm::Bilinear => Algorithm::Bilinear,
            ScaleAlgorithm::Bicubic => Algorithm::Bicubic,
            ScaleAlgorithm::Point => Algorithm::Point,
            ScaleAlgorithm::Area => Algorithm::Area,
            ScaleAlgorithm::Lanczos => Algorithm::Lanczos,
        }
    }
}

/// Packed 4-byte-per-pixel layout written into the video frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// R, G, B, padding
    #[default]
    Rgb0,
    Rgba,
    Bgr0,
    Bgra,
}

impl OutputLayout {
    /// FFmpeg pixel format name for this layout.
    pub fn pixel_format_name(self) -> &'static str {
        match self {
            OutputLayout::Rgb0 => "rgb0",
            OutputLayout::Rgba => "rgba",
            OutputLayout::Bgr0 => "bgr0",
            OutputLayout::Bgra => "bgra",
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Settings shared by [`AudioDecodeSession`](crate::AudioDecodeSession) and
/// [`VideoReader`](crate::VideoReader).
///
/// Every field has a default, so a JSON file only needs to name what it overrides:
///
/// ```json
/// { "scale_algorithm": "bicubic", "demuxer_options": [["probesize", "5000000"]] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Must be a power of two.
    pub frame_alignment: usize,
    pub scale_algorithm: ScaleAlgorithm,
    pub output_layout: OutputLayout,
    /// Passed verbatim to the demuxer before the container is opened.
    pub demuxer_options: Vec<(String, String)>,
    pub max_analyze_duration_ms: Option<u64>,
    /// Install the FFmpeg log bridge when a session opens.
    ///
    /// The bridge is process-wide and stays installed once any session has enabled it,
    /// so `false` only keeps FFmpeg's messages on stderr while no earlier session in the
    /// process asked for forwarding.
    pub forward_ffmpeg_logs: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            frame_alignment: DEFAULT_FRAME_ALIGNMENT,
            scale_algorithm: ScaleAlgorithm::default(),
            output_layout: OutputLayout::default(),
            demuxer_options: Vec::new(),
            max_analyze_duration_ms: None,
            forward_ffmpeg_logs: true,
        }
    }
}

impl DecoderConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn max_analyze_duration(&self) -> Option<Duration> {
        self.max_analyze_duration_ms.map(Duration::from_millis)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
