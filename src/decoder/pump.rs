//! Packet pump shared by the audio drain and the single-frame video reads
//!
//! The loop reads packets from a [`PacketSource`], drops the ones that belong to
//! other streams, submits the rest to a [`FrameDecoder`] and asks it for frames
//! until it reports that it needs more input or has been drained. Each answer from
//! the decoder is a [`DecodeStep`], so "no frame yet" and "no frames ever again" are
//! ordinary values rather than error codes.

use crate::error::{Error, Result};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::packet::Packet;

/// Outcome of asking a decoder for its next frame.
#[derive(Debug)]
pub enum DecodeStep<F> {
    /// A decoded frame.
    Frame(F),
    /// The decoder has nothing buffered and wants another packet.
    NeedMoreInput,
    /// The decoder was flushed and every buffered frame has been returned.
    EndOfStream,
    /// Anything else. Terminal for the current operation.
    Fatal(ac_ffmpeg::Error),
}

/// Demuxer side of the pump.
pub trait PacketSource {
    type Packet;

    /// Read the next packet. `None` once the container is exhausted.
    fn read_packet(&mut self) -> Option<Self::Packet>;

    fn stream_index(packet: &Self::Packet) -> usize;
}

/// Decoder side of the pump.
pub trait FrameDecoder {
    type Packet;
    type Frame;

    fn submit(&mut self, packet: Self::Packet) -> std::result::Result<(), ac_ffmpeg::Error>;

    /// Signal end of stream so buffered frames can be drained.
    fn submit_eof(&mut self) -> std::result::Result<(), ac_ffmpeg::Error>;

    fn receive(&mut self) -> DecodeStep<Self::Frame>;

    /// Whether `submit_eof` has been called since the decoder was opened.
    fn is_draining(&self) -> bool;
}

/// Counters for one decode session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    /// Packets read from the container, whatever their stream
    pub packets_read: u64,
    /// Packets dropped because they belong to another stream
    pub packets_skipped: u64,
    /// Packets handed to the decoder
    pub packets_submitted: u64,
    pub frames_decoded: u64,
    /// Audio samples per channel across all decoded frames
    pub samples_decoded: u64,
    /// Bytes written to the audio destination
    pub bytes_written: u64,
}

/// Drives a source and a decoder bound to one stream.
pub struct PacketPump {
    stream_index: usize,
    stats: DecodeStats,
}

impl PacketPump {
    pub fn new(stream_index: usize) -> Self {
        Self {
            stream_index,
            stats: DecodeStats::default(),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut DecodeStats {
        &mut self.stats
    }

    /// Produce exactly one frame, or `Ok(None)` once the stream is exhausted.
    ///
    /// Frames still buffered in the decoder are returned before another packet is read.
    /// At container EOF the decoder is flushed once, so trailing frames held back for
    /// reordering are still delivered before exhaustion is reported.
    pub fn next_frame<S, D>(&mut self, source: &mut S, decoder: &mut D) -> Result<Option<D::Frame>>
    where
        S: PacketSource,
        D: FrameDecoder<Packet = S::Packet>,
    {
        loop {
            match decoder.receive() {
                DecodeStep::Frame(frame) => {
                    self.stats.frames_decoded += 1;
                    return Ok(Some(frame));
                }
                DecodeStep::EndOfStream => return Ok(None),
                DecodeStep::Fatal(err) => return Err(Error::decode("receive frame", err)),
                DecodeStep::NeedMoreInput => {}
            }

            if decoder.is_draining() {
                // a flushed decoder asking for input has nothing left to give
                return Ok(None);
            }

            match self.read_own_packet(source) {
                Some(packet) => {
                    decoder
                        .submit(packet)
                        .map_err(|err| Error::decode("submit packet", err))?;
                    self.stats.packets_submitted += 1;
                }
                None => {
                    log::debug!("stream #{}: end of container", self.stream_index);
                    decoder
                        .submit_eof()
                        .map_err(|err| Error::decode("flush decoder", err))?;
                }
            }
        }
    }

    /// Decode the whole stream, handing every frame to `on_frame`.
    ///
    /// Runs to container EOF, then flushes the decoder once and drains what it still holds.
    pub fn drain<S, D, F>(&mut self, source: &mut S, decoder: &mut D, mut on_frame: F) -> Result<()>
    where
        S: PacketSource,
        D: FrameDecoder<Packet = S::Packet>,
        F: FnMut(D::Frame, &mut DecodeStats) -> Result<()>,
    {
        while let Some(packet) = self.read_own_packet(source) {
            decoder
                .submit(packet)
                .map_err(|err| Error::decode("submit packet", err))?;
            self.stats.packets_submitted += 1;
            self.receive_all(decoder, &mut on_frame)?;
        }

        log::debug!("stream #{}: end of container, flushing", self.stream_index);
        decoder
            .submit_eof()
            .map_err(|err| Error::decode("flush decoder", err))?;
        self.receive_all(decoder, &mut on_frame)
    }

    fn receive_all<D, F>(&mut self, decoder: &mut D, on_frame: &mut F) -> Result<()>
    where
        D: FrameDecoder,
        F: FnMut(D::Frame, &mut DecodeStats) -> Result<()>,
    {
        loop {
            match decoder.receive() {
                DecodeStep::Frame(frame) => {
                    self.stats.frames_decoded += 1;
                    on_frame(frame, &mut self.stats)?;
                }
                DecodeStep::NeedMoreInput | DecodeStep::EndOfStream => return Ok(()),
                DecodeStep::Fatal(err) => return Err(Error::decode("receive frame", err)),
            }
        }
    }

    /// Next packet of the selected stream. Packets of other streams are dropped here.
    fn read_own_packet<S: PacketSource>(&mut self, source: &mut S) -> Option<S::Packet> {
        loop {
            let packet = source.read_packet()?;
            self.stats.packets_read += 1;
            if S::stream_index(&packet) == self.stream_index {
                return Some(packet);
            }
            self.stats.packets_skipped += 1;
        }
    }
}

/// An FFmpeg decoder plus the bookkeeping needed to tell "needs input" from "drained".
pub struct CodecSlot<D> {
    decoder: D,
    draining: bool,
}

impl<D> CodecSlot<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            draining: false,
        }
    }
}

impl<D: Decoder> FrameDecoder for CodecSlot<D> {
    type Packet = Packet;
    type Frame = D::Frame;

    fn submit(&mut self, packet: Packet) -> std::result::Result<(), ac_ffmpeg::Error> {
        self.decoder.push(packet)
    }

    fn submit_eof(&mut self) -> std::result::Result<(), ac_ffmpeg::Error> {
        self.draining = true;
        self.decoder.flush()
    }

    fn receive(&mut self) -> DecodeStep<D::Frame> {
        // take() folds EAGAIN and EOF into Ok(None); the draining flag tells them apart
        match self.decoder.take() {
            Ok(Some(frame)) => DecodeStep::Frame(frame),
            Ok(None) if self.draining => DecodeStep::EndOfStream,
            Ok(None) => DecodeStep::NeedMoreInput,
            Err(err) => DecodeStep::Fatal(err),
        }
    }

    fn is_draining(&self) -> bool {
        self.draining
    }
}
