//! Opening a container and binding a decoder to its best stream of one kind

use super::pump::{CodecSlot, PacketPump, PacketSource};
use crate::config::DecoderConfig;
use crate::error::OpenError;
use crate::logging;
use ac_ffmpeg::codec::audio::AudioDecoder;
use ac_ffmpeg::codec::video::VideoDecoder;
use ac_ffmpeg::codec::CodecParameters;
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::format::stream::Stream;
use ac_ffmpeg::packet::Packet;
use ac_ffmpeg::time::TimeBase;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Kind of elementary stream a session decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// What the ranking needs to know about one entry of the stream table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCandidate {
    pub index: usize,
    pub kind: Option<MediaKind>,
    /// A decoder is registered for the codec
    pub decodable: bool,
    /// width * height for video
    pub pixels: u64,
    pub channels: u32,
    pub sample_rate: u32,
    /// Declared bit rate, 0 when unknown
    pub bit_rate: u64,
}

impl StreamCandidate {
    fn from_parameters(index: usize, params: &CodecParameters) -> Self {
        let decodable = params.decoder_name().is_some();

        if let Some(video) = params.as_video_codec_parameters() {
            return Self {
                index,
                kind: Some(MediaKind::Video),
                decodable,
                pixels: video.width() as u64 * video.height() as u64,
                channels: 0,
                sample_rate: 0,
                bit_rate: video.bit_rate(),
            };
        }

        if let Some(audio) = params.as_audio_codec_parameters() {
            return Self {
                index,
                kind: Some(MediaKind::Audio),
                decodable,
                pixels: 0,
                channels: audio.channel_layout().channels(),
                sample_rate: audio.sample_rate(),
                bit_rate: audio.bit_rate(),
            };
        }

        Self {
            index,
            kind: None,
            decodable,
            pixels: 0,
            channels: 0,
            sample_rate: 0,
            bit_rate: 0,
        }
    }

    /// Audio streams without channels or sample rate cannot be decoded into anything.
    fn is_usable(&self) -> bool {
        match self.kind {
            Some(MediaKind::Audio) => self.channels > 0 && self.sample_rate > 0,
            _ => true,
        }
    }

    fn rank(&self) -> (bool, u64, u32, u32, u64) {
        (self.decodable, self.pixels, self.channels, self.sample_rate, self.bit_rate)
    }
}

/// Pick the best stream of `kind`.
///
/// Streams with a registered decoder win over those without; among those, the largest
/// picture (video) or the most channels and then the highest sample rate (audio), then
/// the highest bit rate. Audio streams reporting no channels or no sample rate are never
/// picked. Remaining ties go to the lowest index.
pub fn select_best_stream(candidates: &[StreamCandidate], kind: MediaKind) -> Option<StreamCandidate> {
    candidates
        .iter()
        .filter(|c| c.kind == Some(kind) && c.is_usable())
        .fold(None, |best: Option<&StreamCandidate>, c| match best {
            Some(b) if b.rank() >= c.rank() => Some(b),
            _ => Some(c),
        })
        .copied()
}

/// Demuxer over a local file, with the stream table already probed.
pub struct Container {
    demuxer: DemuxerWithStreamInfo<File>,
    path: PathBuf,
}

impl Container {
    pub fn open(path: &Path, config: &DecoderConfig) -> Result<Self, OpenError> {
        if config.forward_ffmpeg_logs {
            logging::install();
        }

        let file = File::open(path).map_err(|source| OpenError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let io = IO::from_seekable_read_stream(file);

        let mut builder = Demuxer::builder();
        for (key, value) in &config.demuxer_options {
            builder = builder.set_option(key, value);
        }
        let demuxer = builder.build(io).map_err(|source| OpenError::Container {
            path: path.to_path_buf(),
            source,
        })?;

        let demuxer = demuxer
            .find_stream_info(config.max_analyze_duration())
            .map_err(|(_, source)| OpenError::StreamInfo {
                path: path.to_path_buf(),
                source,
            })?;

        let container = Self {
            demuxer,
            path: path.to_path_buf(),
        };
        container.log_summary();
        Ok(container)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn streams(&self) -> &[Stream] {
        self.demuxer.streams()
    }

    pub fn candidates(&self) -> Vec<StreamCandidate> {
        self.streams()
            .iter()
            .enumerate()
            .map(|(index, stream)| StreamCandidate::from_parameters(index, &stream.codec_parameters()))
            .collect()
    }

    /// Select the best stream of `kind`, failing if there is none or it cannot be decoded.
    pub fn select(&self, kind: MediaKind) -> Result<usize, OpenError> {
        let best = select_best_stream(&self.candidates(), kind).ok_or_else(|| OpenError::NoStream {
            kind,
            path: self.path.clone(),
        })?;

        if !best.decodable {
            return Err(OpenError::NoDecoder {
                kind,
                index: best.index,
            });
        }
        Ok(best.index)
    }

    pub fn demuxer_mut(&mut self) -> &mut DemuxerWithStreamInfo<File> {
        &mut self.demuxer
    }

    fn log_summary(&self) {
        log::debug!("Input {}:", self.path.display());
        for (index, stream) in self.streams().iter().enumerate() {
            let params = stream.codec_parameters();
            let codec = params.decoder_name().unwrap_or("<no decoder>");
            if let Some(video) = params.as_video_codec_parameters() {
                log::debug!(
                    "  #{}: video {} {}x{} {} tb={}/{}",
                    index,
                    codec,
                    video.width(),
                    video.height(),
                    video.pixel_format().name(),
                    stream.time_base().num(),
                    stream.time_base().den()
                );
            } else if let Some(audio) = params.as_audio_codec_parameters() {
                log::debug!(
                    "  #{}: audio {} {} Hz {} ch {}",
                    index,
                    codec,
                    audio.sample_rate(),
                    audio.channel_layout().channels(),
                    audio.sample_format().name()
                );
            } else {
                log::debug!("  #{}: other", index);
            }
        }
    }
}

impl PacketSource for Container {
    type Packet = Packet;

    fn read_packet(&mut self) -> Option<Packet> {
        match self.demuxer.take() {
            Ok(packet) => packet,
            Err(err) => {
                // a damaged tail ends the stream the same way EOF does
                log::warn!("{}: stopped reading: {}", self.path.display(), err);
                None
            }
        }
    }

    fn stream_index(packet: &Packet) -> usize {
        packet.stream_index()
    }
}

/// Build a decoder for one stream of the container.
pub trait OpenDecoder: Sized {
    const KIND: MediaKind;

    fn open(stream: &Stream) -> Result<Self, ac_ffmpeg::Error>;
}

impl OpenDecoder for AudioDecoder {
    const KIND: MediaKind = MediaKind::Audio;

    fn open(stream: &Stream) -> Result<Self, ac_ffmpeg::Error> {
        AudioDecoder::from_stream(stream)?.build()
    }
}

impl OpenDecoder for VideoDecoder {
    const KIND: MediaKind = MediaKind::Video;

    fn open(stream: &Stream) -> Result<Self, ac_ffmpeg::Error> {
        VideoDecoder::from_stream(stream)?.build()
    }
}

/// A container with a decoder bound to its best stream of one kind.
///
/// Field order is drop order: the decoder goes before the container.
pub struct MediaSession<D> {
    pub(crate) decoder: CodecSlot<D>,
    pub(crate) container: Container,
    pub(crate) pump: PacketPump,
    time_base: TimeBase,
}

impl<D: OpenDecoder> MediaSession<D> {
    pub fn open(path: &Path, config: &DecoderConfig) -> Result<Self, OpenError> {
        let container = Container::open(path, config)?;
        let index = container.select(D::KIND)?;

        let stream = &container.streams()[index];
        let time_base = stream.time_base();
        let decoder = D::open(stream).map_err(|source| OpenError::DecoderInit {
            kind: D::KIND,
            source,
        })?;

        log::info!(
            "Opened {} stream #{} of {}",
            D::KIND,
            index,
            path.display()
        );

        Ok(Self {
            decoder: CodecSlot::new(decoder),
            container,
            pump: PacketPump::new(index),
            time_base,
        })
    }

    /// Replace the decoder with a fresh one for the same stream.
    ///
    /// Needed once the decoder has been flushed, since it then rejects new packets.
    pub fn reopen_decoder(&mut self) -> Result<(), OpenError> {
        let stream = &self.container.streams()[self.pump.stream_index()];
        let decoder = D::open(stream).map_err(|source| OpenError::DecoderInit {
            kind: D::KIND,
            source,
        })?;
        self.decoder = CodecSlot::new(decoder);
        Ok(())
    }
}

impl<D> MediaSession<D> {
    pub fn stream_index(&self) -> usize {
        self.pump.stream_index()
    }

    pub fn stream(&self) -> &Stream {
        &self.container.streams()[self.pump.stream_index()]
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }
}
