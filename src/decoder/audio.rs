//! One-shot audio drain into a raw sample file
//!
//! The session decodes the best audio stream of a container from start to end and
//! writes the samples, headerless, in the decoder's own sample format and the host's
//! endianness. Only the first data plane of every frame is written: packed formats
//! carry all channels there, planar formats only the first channel. A planar source
//! therefore comes out as mono and the session reports one channel.

use super::pump::DecodeStats;
use super::session::MediaSession;
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use ac_ffmpeg::codec::audio::{AudioDecoder, AudioFrame, SampleFormat};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Raw sample encodings the session can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "&'static str")]
pub enum RawAudioFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl RawAudioFormat {
    /// Map an FFmpeg sample format name (`s16`, `fltp`, ...) to its packed raw encoding.
    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        let packed = name.strip_suffix('p').unwrap_or(name);
        match packed {
            "u8" => Some(RawAudioFormat::U8),
            "s16" => Some(RawAudioFormat::S16),
            "s32" => Some(RawAudioFormat::S32),
            "flt" => Some(RawAudioFormat::F32),
            "dbl" => Some(RawAudioFormat::F64),
            _ => None,
        }
    }

    pub fn from_sample_format(format: SampleFormat) -> Option<Self> {
        Self::from_ffmpeg_name(format.name())
    }

    /// Name understood by `ffplay -f`, for the host's endianness.
    pub fn name(self) -> &'static str {
        if cfg!(target_endian = "big") {
            self.name_be()
        } else {
            self.name_le()
        }
    }

    fn name_be(self) -> &'static str {
        match self {
            RawAudioFormat::U8 => "u8",
            RawAudioFormat::S16 => "s16be",
            RawAudioFormat::S32 => "s32be",
            RawAudioFormat::F32 => "f32be",
            RawAudioFormat::F64 => "f64be",
        }
    }

    fn name_le(self) -> &'static str {
        match self {
            RawAudioFormat::U8 => "u8",
            RawAudioFormat::S16 => "s16le",
            RawAudioFormat::S32 => "s32le",
            RawAudioFormat::F32 => "f32le",
            RawAudioFormat::F64 => "f64le",
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            RawAudioFormat::U8 => 1,
            RawAudioFormat::S16 => 2,
            RawAudioFormat::S32 | RawAudioFormat::F32 => 4,
            RawAudioFormat::F64 => 8,
        }
    }
}

impl From<RawAudioFormat> for &'static str {
    fn from(format: RawAudioFormat) -> Self {
        format.name()
    }
}

impl std::fmt::Display for RawAudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of the raw sample stream written by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioMeta {
    pub format: RawAudioFormat,
    pub sample_rate: u32,
    /// Channels present in the output; 1 when the source was planar.
    pub channels: u32,
    /// The decoder produced planar samples and only the first channel was kept.
    pub planar_source: bool,
}

impl AudioMeta {
    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    /// Bytes per sample frame (one sample of every output channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Number of sample frames in a raw blob of `byte_len` bytes.
    pub fn frame_count(&self, byte_len: u64) -> u64 {
        match self.bytes_per_frame() as u64 {
            0 => 0,
            n => byte_len / n,
        }
    }

    /// Command line that plays the raw output file.
    pub fn ffplay_command(&self, output: &Path) -> String {
        format!(
            "ffplay -f {} -ac {} -ar {} {}",
            self.format,
            self.channels,
            self.sample_rate,
            output.display()
        )
    }
}

/// Negotiated decoder output, tracked frame by frame.
#[derive(Debug, Clone, Copy)]
struct NegotiatedFormat {
    sample_format: SampleFormat,
    sample_rate: u32,
    channels: u32,
}

/// Decodes the audio track of a container into raw samples.
///
/// Each call to [`run`](Self::run) opens its own container and decoder and releases
/// them before returning, so one session value can be reused and several sessions
/// can run on separate threads.
pub struct AudioDecodeSession {
    config: DecoderConfig,
    meta: Option<AudioMeta>,
    stats: DecodeStats,
}

impl AudioDecodeSession {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            meta: None,
            stats: DecodeStats::default(),
        }
    }

    /// Decode `source` into the raw file `destination`.
    ///
    /// The destination is only created once an audio stream and its decoder are open.
    pub fn run(&mut self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<AudioMeta> {
        let source = source.as_ref();
        let destination = destination.as_ref();

        let session = MediaSession::<AudioDecoder>::open(source, &self.config)?;
        let file = File::create(destination).map_err(|err| {
            log::error!("Could not open destination file {}: {}", destination.display(), err);
            err
        })?;

        log::info!(
            "Demuxing audio from file '{}' into '{}'",
            source.display(),
            destination.display()
        );

        let mut out = BufWriter::new(file);
        let meta = self.decode(session, &mut out)?;
        out.flush()?;

        log::info!(
            "Play the output audio file with the command: {}",
            meta.ffplay_command(destination)
        );
        Ok(meta)
    }

    /// Decode `source` into any writer.
    pub fn run_to_writer<W: Write>(&mut self, source: impl AsRef<Path>, out: &mut W) -> Result<AudioMeta> {
        let session = MediaSession::<AudioDecoder>::open(source.as_ref(), &self.config)?;
        self.decode(session, out)
    }

    /// Decode `source` into memory.
    pub fn decode_to_bytes(&mut self, source: impl AsRef<Path>) -> Result<(Bytes, AudioMeta)> {
        let mut out = BytesMut::new().writer();
        let meta = self.run_to_writer(source, &mut out)?;
        Ok((out.into_inner().freeze(), meta))
    }

    /// Metadata of the last successful run.
    pub fn meta(&self) -> Option<&AudioMeta> {
        self.meta.as_ref()
    }

    pub fn format(&self) -> Option<&'static str> {
        self.meta.map(|m| m.format.name())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.meta.map(|m| m.sample_rate)
    }

    pub fn channels(&self) -> Option<u32> {
        self.meta.map(|m| m.channels)
    }

    /// Counters of the last run, successful or not.
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Drain the stream into `out`. The session, and with it every native handle, is
    /// dropped when this returns.
    fn decode<W: Write>(&mut self, mut session: MediaSession<AudioDecoder>, out: &mut W) -> Result<AudioMeta> {
        self.meta = None;

        let mut negotiated = session
            .stream()
            .codec_parameters()
            .as_audio_codec_parameters()
            .map(|params| NegotiatedFormat {
                sample_format: params.sample_format(),
                sample_rate: params.sample_rate(),
                channels: params.channel_layout().channels(),
            });

        let MediaSession {
            decoder,
            container,
            pump,
            ..
        } = &mut session;

        let mut frame_index = 0u64;
        let result = pump.drain(container, decoder, |frame, stats| {
            negotiated = Some(NegotiatedFormat {
                sample_format: frame.sample_format(),
                sample_rate: frame.sample_rate(),
                channels: frame.channel_layout().channels(),
            });

            log::trace!(
                "audio_frame n:{} nb_samples:{} pts:{:?}",
                frame_index,
                frame.samples(),
                frame.pts().as_f64()
            );
            frame_index += 1;

            let written = write_first_plane(&frame, out)?;
            stats.samples_decoded += frame.samples() as u64;
            stats.bytes_written += written as u64;
            Ok(())
        });
        self.stats = *session.pump.stats();
        result?;

        log::info!("Demuxing succeeded.");

        let negotiated = negotiated
            .ok_or_else(|| Error::UnsupportedFormat("audio stream reports no sample format".into()))?;
        let meta = describe(negotiated)?;
        self.meta = Some(meta);
        Ok(meta)
    }
}

impl Default for AudioDecodeSession {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

/// Write the first data plane of `frame`, returning the number of bytes written.
fn write_first_plane<W: Write>(frame: &AudioFrame, out: &mut W) -> Result<usize> {
    let format = frame.sample_format();
    let channels = if format.is_planar() {
        1
    } else {
        frame.channel_layout().channels() as usize
    };
    let wanted = frame.samples() * format.bytes_per_sample() * channels;

    let planes = frame.planes();
    let Some(plane) = planes.first() else {
        return Ok(0);
    };
    let data = plane.data();
    let len = wanted.min(data.len());
    if len < wanted {
        log::warn!(
            "Audio plane too small ({} bytes for {} samples)",
            data.len(),
            frame.samples()
        );
    }

    out.write_all(&data[..len])?;
    Ok(len)
}

/// Turn the decoder's final output format into the metadata reported to the caller.
fn describe(negotiated: NegotiatedFormat) -> Result<AudioMeta> {
    let NegotiatedFormat {
        sample_format,
        sample_rate,
        mut channels,
    } = negotiated;

    let planar_source = sample_format.is_planar();
    if planar_source {
        log::warn!(
            "the sample format the decoder produced is planar ({}); only the first channel is written",
            sample_format.name()
        );
        channels = 1;
    }

    let format = RawAudioFormat::from_sample_format(sample_format).ok_or_else(|| {
        log::error!("sample format {} is not supported as output format", sample_format.name());
        Error::UnsupportedFormat(format!("sample format {}", sample_format.name()))
    })?;

    Ok(AudioMeta {
        format,
        sample_rate,
        channels,
        planar_source,
    })
}
