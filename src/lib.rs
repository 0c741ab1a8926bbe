//! Pull decoded media out of container files with FFmpeg.
//!
//! - [`AudioDecodeSession`] writes the best audio stream of a file as raw samples.
//! - [`VideoReader`] reads the best video stream frame by frame into a fixed,
//!   aligned RGB buffer and can seek by timestamp.

pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod logging;

#[cfg(test)]
mod testing;

pub use config::DecoderConfig;
pub use decoder::{
    AudioDecodeSession, AudioMeta, DecodeStats, MediaKind, RawAudioFormat, ReaderState, VideoReader,
};
pub use display::AlignedFrameBuffer;
pub use error::{Error, OpenError, Result};
