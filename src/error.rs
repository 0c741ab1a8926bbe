//! Error kinds surfaced by the decode sessions

use crate::decoder::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while opening a container and binding a decoder to one of its streams.
///
/// Every variant is raised after whatever was already allocated has been dropped,
/// so a failed open never leaves native state behind.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("could not read {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open container {path}: {source}")]
    Container {
        path: PathBuf,
        #[source]
        source: ac_ffmpeg::Error,
    },

    #[error("could not read stream information from {path}: {source}")]
    StreamInfo {
        path: PathBuf,
        #[source]
        source: ac_ffmpeg::Error,
    },

    #[error("no {kind} stream in {path}")]
    NoStream { kind: MediaKind, path: PathBuf },

    #[error("no decoder registered for the {kind} stream #{index}")]
    NoDecoder { kind: MediaKind, index: usize },

    #[error("failed to initialize the {kind} decoder: {source}")]
    DecoderInit {
        kind: MediaKind,
        #[source]
        source: ac_ffmpeg::Error,
    },

    #[error("video stream reports invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("could not allocate a {size} byte frame buffer aligned to {alignment}")]
    Allocation { size: usize, alignment: usize },
}

/// Errors returned by [`AudioDecodeSession`](crate::AudioDecodeSession) and
/// [`VideoReader`](crate::VideoReader).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The decoder rejected a packet or failed while producing a frame.
    ///
    /// Terminal for the current operation only; the session stays usable.
    #[error("{stage} failed: {source}")]
    Decode {
        stage: &'static str,
        #[source]
        source: ac_ffmpeg::Error,
    },

    /// Sample format outside the raw output vocabulary, or no scaler for the pixel format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("the reader has been closed")]
    Closed,
}

impl Error {
    pub(crate) fn decode(stage: &'static str, source: ac_ffmpeg::Error) -> Self {
        Error::Decode { stage, source }
    }
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, Error>;
