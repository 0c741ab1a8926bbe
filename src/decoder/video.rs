//! Frame-by-frame video reader with a fixed output buffer
//!
//! A [`VideoReader`] keeps its container and decoder open between calls. Each
//! successful read converts one decoded picture into a packed 4-byte layout inside
//! an aligned buffer that is allocated once at open and overwritten in place.

use super::pixel::{Retagger, correct_deprecated_pixel_format};
use super::pump::DecodeStats;
use super::session::MediaSession;
use crate::config::DecoderConfig;
use crate::display::frame_buffer::{AlignedFrameBuffer, copy_rows};
use crate::error::{Error, OpenError, Result};
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::{PixelFormat, VideoDecoder, VideoFrame, VideoFrameScaler};
use ac_ffmpeg::format::demuxer::SeekTarget;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use std::path::Path;

/// Reader lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Container and decoder are open, nothing decoded yet
    Opened,
    /// At least one frame was read or a seek primed the decoder
    Streaming,
    /// The stream ended; reads return `false` until the next seek
    Exhausted,
    /// Native resources released; terminal
    Closed,
}

impl ReaderState {
    pub fn can_transition_to(&self, target: &ReaderState) -> bool {
        use ReaderState::*;

        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,

            (Opened, Streaming) | (Opened, Exhausted) => true,
            (Streaming, Exhausted) => true,
            // seek rewinds an exhausted reader
            (Exhausted, Streaming) => true,

            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReaderState::Opened => "Opened",
            ReaderState::Streaming => "Streaming",
            ReaderState::Exhausted => "Exhausted",
            ReaderState::Closed => "Closed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ReaderState::Closed)
    }
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Sequential reader over the best video stream of a container.
///
/// The output buffer holds `width * height * 4` bytes in the configured packed layout
/// (`rgb0` by default), row-major without padding. Its address and size never change
/// for the lifetime of the reader.
///
/// Field order is drop order: scaler, staging frames, decoder and container, then the buffer.
pub struct VideoReader {
    scaler: Option<VideoFrameScaler>,
    retagger: Option<Retagger>,
    /// Geometry of the decoded pictures the scaler was built for
    scaler_input: Option<ScalerInput>,
    session: Option<MediaSession<VideoDecoder>>,
    buffer: AlignedFrameBuffer,
    width: usize,
    height: usize,
    time_base: TimeBase,
    pts: i64,
    state: ReaderState,
    config: DecoderConfig,
}

// The native handles are owned exclusively by the reader and never shared.
unsafe impl Send for VideoReader {}

impl VideoReader {
    /// Open `path` with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, DecoderConfig::default())
    }

    /// Open `path`, select its best video stream and allocate the frame buffer.
    pub fn with_config(path: impl AsRef<Path>, config: DecoderConfig) -> Result<Self> {
        let path = path.as_ref();
        let session = MediaSession::<VideoDecoder>::open(path, &config)?;

        let (width, height) = {
            let params = session.stream().codec_parameters();
            params
                .as_video_codec_parameters()
                .map(|video| (video.width(), video.height()))
                .unwrap_or((0, 0))
        };
        if width == 0 || height == 0 {
            return Err(OpenError::InvalidDimensions { width, height }.into());
        }

        let bytes_per_pixel = config.output_layout.bytes_per_pixel();
        let buffer = AlignedFrameBuffer::for_picture(width, height, bytes_per_pixel, config.frame_alignment)
            .ok_or(OpenError::Allocation {
                size: width.saturating_mul(height).saturating_mul(bytes_per_pixel),
                alignment: config.frame_alignment,
            })?;

        let time_base = session.time_base();
        log::info!(
            "Video reader on {} ({}x{}, time base {}/{})",
            path.display(),
            width,
            height,
            time_base.num(),
            time_base.den()
        );

        Ok(Self {
            scaler: None,
            retagger: None,
            scaler_input: None,
            session: Some(session),
            buffer,
            width,
            height,
            time_base,
            pts: 0,
            state: ReaderState::Opened,
            config,
        })
    }

    /// Decode the next frame into the buffer.
    ///
    /// `Ok(false)` once the stream is exhausted; the buffer and timestamp are left as they were.
    pub fn try_read_next_frame(&mut self) -> Result<bool> {
        match self.state {
            ReaderState::Closed => return Err(Error::Closed),
            ReaderState::Exhausted => return Ok(false),
            ReaderState::Opened | ReaderState::Streaming => {}
        }

        let session = self.session.as_mut().ok_or(Error::Closed)?;
        let frame = match session.pump.next_frame(&mut session.container, &mut session.decoder)? {
            Some(frame) => frame,
            None => {
                log::debug!("end of video stream after {} frames", session.pump.stats().frames_decoded);
                self.transition(ReaderState::Exhausted);
                return Ok(false);
            }
        };

        self.convert(&frame)?;

        let pts = frame.pts();
        if !pts.is_null() {
            self.pts = pts.with_time_base(self.time_base).timestamp();
        }
        self.transition(ReaderState::Streaming);
        Ok(true)
    }

    /// Decode the next frame into the buffer, folding every failure into `false`.
    pub fn read_next_frame(&mut self) -> bool {
        match self.try_read_next_frame() {
            Ok(read) => read,
            Err(err) => {
                log::warn!("read_next_frame: {}", err);
                false
            }
        }
    }

    /// Seek to the closest sync point at or before `timestamp` (stream time base ticks).
    ///
    /// The decoder is restarted and primed with one pass of the decode loop; the frame
    /// it yields is not copied out. On success [`pts`](Self::pts) reports `timestamp`
    /// itself, and the next [`read_next_frame`](Self::read_next_frame) returns a real
    /// frame from the new position.
    pub fn try_seek(&mut self, timestamp: i64) -> Result<bool> {
        if self.state == ReaderState::Closed {
            return Err(Error::Closed);
        }
        let session = self.session.as_mut().ok_or(Error::Closed)?;

        let target = Timestamp::new(timestamp, session.time_base());
        session
            .container
            .demuxer_mut()
            .seek_to_timestamp(target, SeekTarget::UpTo)
            .map_err(|err| Error::decode("seek", err))?;

        // a fresh decoder drops references to pre-seek pictures and accepts input after a flush
        session.reopen_decoder()?;

        let primed = session
            .pump
            .next_frame(&mut session.container, &mut session.decoder)?
            .is_some();
        if !primed {
            log::debug!("seek to {} landed at the end of the stream", timestamp);
        }

        self.pts = timestamp;
        self.transition(if primed {
            ReaderState::Streaming
        } else {
            ReaderState::Exhausted
        });
        Ok(true)
    }

    /// Seek, folding every failure into `false`.
    pub fn seek(&mut self, timestamp: i64) -> bool {
        match self.try_seek(timestamp) {
            Ok(done) => done,
            Err(err) => {
                log::warn!("seek to {}: {}", timestamp, err);
                false
            }
        }
    }

    /// Release the scaler, decoder and container. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == ReaderState::Closed {
            return;
        }
        self.scaler = None;
        self.retagger = None;
        self.scaler_input = None;
        if let Some(session) = self.session.take() {
            log::debug!("closing video reader: {:?}", session.pump.stats());
        }
        self.transition(ReaderState::Closed);
    }

    /// Timestamp of the last frame read, or the last seek target.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn pts_seconds(&self) -> f64 {
        ticks_to_seconds(self.pts, self.time_base)
    }

    /// Stream ticks for a position in seconds, for use with [`seek`](Self::seek).
    pub fn seconds_to_ticks(&self, seconds: f64) -> i64 {
        seconds_to_ticks(seconds, self.time_base)
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The last converted frame.
    pub fn frame(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn frame_buffer(&self) -> &AlignedFrameBuffer {
        &self.buffer
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stream_index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.stream_index())
    }

    pub fn stats(&self) -> DecodeStats {
        self.session
            .as_ref()
            .map(|session| *session.pump.stats())
            .unwrap_or_default()
    }

    fn transition(&mut self, next: ReaderState) {
        if self.state.can_transition_to(&next) {
            if self.state != next {
                log::trace!("video reader: {} -> {}", self.state, next);
            }
            self.state = next;
        } else {
            log::warn!("video reader: ignored transition {} -> {}", self.state, next);
        }
    }

    /// Scale `frame` into the output buffer, building the scaler on first use.
    ///
    /// Pictures whose format or size differ from the first one are rejected and leave the
    /// buffer untouched.
    fn convert(&mut self, frame: &VideoFrame) -> Result<()> {
        match self.scaler_input {
            Some(input) if !input.matches(frame) => {
                return Err(Error::UnsupportedFormat(format!(
                    "decoded picture changed from {} to {}",
                    input,
                    ScalerInput::from_frame(frame)
                )));
            }
            Some(_) => {}
            None => {
                let (scaler, retagger) = build_scaler(frame, self.width, self.height, &self.config)?;
                self.scaler = Some(scaler);
                self.retagger = retagger;
                self.scaler_input = Some(ScalerInput::from_frame(frame));
            }
        }

        let staged = self.retagger.as_mut().map(|retagger| retagger.retag(frame));
        let source = staged.as_ref().unwrap_or(frame);

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(Error::UnsupportedFormat("no scaler available".into()));
        };
        let scaled = scaler
            .scale(source)
            .map_err(|err| Error::decode("scale frame", err))?;

        let planes = scaled.planes();
        let Some(plane) = planes.first() else {
            return Err(Error::UnsupportedFormat("scaler produced no picture data".into()));
        };

        let row_bytes = self.width * self.config.output_layout.bytes_per_pixel();
        let copied = copy_rows(
            self.buffer.as_mut_slice(),
            row_bytes,
            plane.data(),
            plane.line_size(),
            row_bytes,
            self.height,
        );
        if copied < self.height {
            log::warn!("scaled picture truncated: {} of {} rows", copied, self.height);
        }
        Ok(())
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pixel format and size of a decoded picture, as delivered by the decoder.
#[derive(Clone, Copy, PartialEq, Eq)]
struct ScalerInput {
    format: PixelFormat,
    width: usize,
    height: usize,
}

impl ScalerInput {
    fn from_frame(frame: &VideoFrame) -> Self {
        Self {
            format: frame.pixel_format(),
            width: frame.width(),
            height: frame.height(),
        }
    }

    fn matches(&self, frame: &VideoFrame) -> bool {
        *self == Self::from_frame(frame)
    }
}

impl std::fmt::Display for ScalerInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}x{}", self.format.name(), self.width, self.height)
    }
}

/// Build a scaler from the first decoded frame to the fixed output size and layout.
///
/// Deprecated JPEG-range formats are replaced by their plain equivalent, in which case
/// a [`Retagger`] is returned to restage decoded pictures under the new format.
fn build_scaler(
    frame: &VideoFrame,
    width: usize,
    height: usize,
    config: &DecoderConfig,
) -> Result<(VideoFrameScaler, Option<Retagger>)> {
    let decoded_format = frame.pixel_format();
    let corrected = correct_deprecated_pixel_format(decoded_format);
    let source_format = corrected.unwrap_or(decoded_format);
    let target_name = config.output_layout.pixel_format_name();

    let scaler = VideoFrameScaler::builder()
        .source_pixel_format(source_format)
        .source_width(frame.width())
        .source_height(frame.height())
        .target_pixel_format(get_pixel_format(target_name))
        .target_width(width)
        .target_height(height)
        .algorithm(config.scale_algorithm.to_ffmpeg())
        .build()
        .map_err(|err| {
            Error::UnsupportedFormat(format!(
                "no scaler from {} {}x{} to {} {}x{}: {}",
                source_format.name(),
                frame.width(),
                frame.height(),
                target_name,
                width,
                height,
                err
            ))
        })?;

    log::debug!(
        "scaler {} {}x{} -> {} {}x{}",
        source_format.name(),
        frame.width(),
        frame.height(),
        target_name,
        width,
        height
    );

    let retagger = corrected.map(|format| Retagger::new(format, frame.width(), frame.height()));
    Ok((scaler, retagger))
}

fn ticks_to_seconds(ticks: i64, time_base: TimeBase) -> f64 {
    if time_base.den() == 0 {
        return 0.0;
    }
    ticks as f64 * time_base.num() as f64 / time_base.den() as f64
}

fn seconds_to_ticks(seconds: f64, time_base: TimeBase) -> i64 {
    if time_base.num() == 0 {
        return 0;
    }
    (seconds * time_base.den() as f64 / time_base.num() as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MediaKind;
    use crate::testing;
    use ac_ffmpeg::codec::video::VideoFrameMut;

    #[test]
    fn test_valid_transitions() {
        use ReaderState::*;

        assert!(Opened.can_transition_to(&Streaming));
        assert!(Opened.can_transition_to(&Exhausted));
        assert!(Streaming.can_transition_to(&Exhausted));
        assert!(Exhausted.can_transition_to(&Streaming));
        assert!(Streaming.can_transition_to(&Streaming));

        for state in [Opened, Streaming, Exhausted] {
            assert!(state.can_transition_to(&Closed));
            assert!(state.is_open());
        }
    }

    #[test]
    fn test_invalid_transitions() {
        use ReaderState::*;

        assert!(!Streaming.can_transition_to(&Opened));
        assert!(!Exhausted.can_transition_to(&Opened));
        for state in [Opened, Streaming, Exhausted, Closed] {
            assert!(!Closed.can_transition_to(&state));
        }
        assert!(!Closed.is_open());
        assert_eq!(Closed.to_string(), "Closed");
    }

    #[test]
    fn test_tick_conversions() {
        let tb = TimeBase::new(1, 1000);
        assert_eq!(seconds_to_ticks(1.5, tb), 1500);
        assert!((ticks_to_seconds(250, tb) - 0.25).abs() < 1e-9);

        let ntsc = TimeBase::new(1001, 30000);
        assert_eq!(seconds_to_ticks(1001.0 / 30000.0 * 7.0, ntsc), 7);
    }

    #[test]
    fn test_reads_every_frame_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 64, 48, 10);

        let mut reader = VideoReader::open(&source).unwrap();
        assert_eq!((reader.width(), reader.height()), (64, 48));
        assert_eq!(reader.frame().len(), 64 * 48 * 4);
        assert_eq!(reader.frame_buffer().as_ptr() as usize % 128, 0);
        assert_eq!(reader.state(), ReaderState::Opened);

        let address = reader.frame().as_ptr();
        let mut last_pts = i64::MIN;
        let mut frames = 0;
        while reader.read_next_frame() {
            assert!(reader.pts() >= last_pts);
            last_pts = reader.pts();
            frames += 1;
        }
        assert_eq!(frames, 10);
        assert_eq!(reader.state(), ReaderState::Exhausted);
        assert_eq!(reader.frame().as_ptr(), address);
        assert_eq!(reader.stats().frames_decoded, 10);

        // exhausted: no mutation of either the buffer or the timestamp
        let snapshot = reader.frame().to_vec();
        assert!(!reader.read_next_frame());
        assert!(!reader.try_read_next_frame().unwrap());
        assert_eq!(reader.frame(), &snapshot[..]);
        assert_eq!(reader.pts(), last_pts);
    }

    #[test]
    fn test_yuvj_source_is_converted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gray.mkv");
        testing::write_mjpeg(&source, 32, 16, 2);

        let mut reader = VideoReader::open(&source).unwrap();
        assert!(reader.read_next_frame());
        assert!(reader.scaler.is_some());
        assert!(reader.retagger.is_some());
        assert_eq!(reader.frame().len(), 32 * 16 * 4);

        // the fixture is a flat mid-gray picture: equal RGB channels, padding untouched
        let pixel = &reader.frame()[..4];
        assert!(pixel[0].abs_diff(pixel[1]) <= 2);
        assert!(pixel[1].abs_diff(pixel[2]) <= 2);
        assert!(pixel[0] > 64 && pixel[0] < 192);
    }

    #[test]
    fn test_rejects_pictures_that_differ_from_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gray.mkv");
        testing::write_mjpeg(&source, 32, 16, 2);

        let mut reader = VideoReader::open(&source).unwrap();
        assert!(reader.read_next_frame());
        let snapshot = reader.frame().to_vec();

        let larger = VideoFrameMut::black(get_pixel_format("yuvj420p"), 64, 32).freeze();
        assert!(matches!(reader.convert(&larger), Err(Error::UnsupportedFormat(_))));

        // same size, but not the format the scaler was built for
        let other_format = VideoFrameMut::black(get_pixel_format("yuv420p"), 32, 16).freeze();
        assert!(matches!(reader.convert(&other_format), Err(Error::UnsupportedFormat(_))));

        assert_eq!(reader.frame(), &snapshot[..]);

        // a matching picture still converts
        let matching = VideoFrameMut::black(get_pixel_format("yuvj420p"), 32, 16).freeze();
        assert!(reader.convert(&matching).is_ok());
    }

    #[test]
    fn test_bgra_layout() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 16, 16, 1);

        let config = DecoderConfig {
            output_layout: crate::config::OutputLayout::Bgra,
            frame_alignment: 64,
            ..Default::default()
        };
        let mut reader = VideoReader::with_config(&source, config).unwrap();
        assert!(reader.read_next_frame());
        assert_eq!(reader.frame_buffer().alignment(), 64);
        assert_eq!(reader.frame().len(), 16 * 16 * 4);
    }

    #[test]
    fn test_seek_records_requested_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 32, 32, 10);

        let mut reader = VideoReader::open(&source).unwrap();
        let target = reader.seconds_to_ticks(0.2);

        assert!(reader.seek(target));
        assert_eq!(reader.pts(), target);
        assert_eq!(reader.state(), ReaderState::Streaming);

        // every MJPEG packet is a sync point, so reading resumes at the target or later
        assert!(reader.read_next_frame());
        assert!(reader.pts() >= target);
    }

    #[test]
    fn test_seek_rewinds_exhausted_reader() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 32, 32, 4);

        let mut reader = VideoReader::open(&source).unwrap();
        while reader.read_next_frame() {}
        assert_eq!(reader.state(), ReaderState::Exhausted);

        assert!(reader.seek(0));
        assert_eq!(reader.pts(), 0);
        let mut frames = 0;
        while reader.read_next_frame() {
            frames += 1;
        }
        assert_eq!(frames, 3);
    }

    #[test]
    fn test_missing_video_stream() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tone.wav");
        testing::write_pcm_wav(&source, 8000, 1, 800);

        for _ in 0..3 {
            match VideoReader::open(&source) {
                Err(Error::Open(OpenError::NoStream { kind, .. })) => assert_eq!(kind, MediaKind::Video),
                Err(other) => panic!("unexpected error: {}", other),
                Ok(_) => panic!("a WAV file has no video stream"),
            }
        }
    }

    #[test]
    fn test_bad_alignment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 16, 16, 1);

        let config = DecoderConfig {
            frame_alignment: 48,
            ..Default::default()
        };
        let err = VideoReader::with_config(&source, config).err().unwrap();
        assert!(matches!(err, Error::Open(OpenError::Allocation { alignment: 48, .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 16, 16, 2);

        let mut reader = VideoReader::open(&source).unwrap();
        assert!(reader.read_next_frame());
        reader.close();
        reader.close();

        assert_eq!(reader.state(), ReaderState::Closed);
        assert!(reader.stream_index().is_none());
        assert!(!reader.read_next_frame());
        assert!(matches!(reader.try_read_next_frame(), Err(Error::Closed)));
        assert!(matches!(reader.try_seek(0), Err(Error::Closed)));
        assert_eq!(reader.frame().len(), 16 * 16 * 4);
    }

    #[test]
    fn test_readers_on_separate_threads() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mkv");
        testing::write_mjpeg(&source, 32, 32, 5);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let source = source.clone();
                std::thread::spawn(move || {
                    let mut reader = VideoReader::open(&source).unwrap();
                    let mut frames = 0;
                    while reader.read_next_frame() {
                        frames += 1;
                    }
                    frames
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 5);
        }
    }
}
