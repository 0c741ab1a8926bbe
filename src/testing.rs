//! Media fixtures synthesized at test time

use ac_ffmpeg::codec::audio::frame::get_sample_format;
use ac_ffmpeg::codec::audio::{AudioEncoder, AudioFrameMut, ChannelLayout};
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::{VideoEncoder, VideoFrameMut};
use ac_ffmpeg::codec::{CodecParameters, Encoder};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::format::muxer::{Muxer, OutputFormat};
use ac_ffmpeg::packet::Packet;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::thread::ThreadId;

/// Size of the canonical RIFF/WAVE header written by [`write_pcm_wav`]
pub const WAV_HEADER_LEN: usize = 44;

/// AAC frame length in samples per channel
const AAC_FRAME_SAMPLES: usize = 1024;

/// Write `samples` frames of 16-bit little-endian PCM as a WAV file.
///
/// Every sample value is distinct per channel so byte-exact comparisons catch reordering.
pub fn write_pcm_wav(path: &Path, sample_rate: u32, channels: u16, samples: usize) {
    let block_align = channels as u32 * 2;
    let data_len = samples as u32 * block_align;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    wav.extend_from_slice(&(block_align as u16).to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    assert_eq!(wav.len(), WAV_HEADER_LEN);

    for n in 0..samples {
        for c in 0..channels as usize {
            let value = ((n * 37 + c * 1000) % 20_000) as i16 - 10_000;
            wav.extend_from_slice(&value.to_le_bytes());
        }
    }

    std::fs::write(path, wav).unwrap();
}

/// Write `frames` AAC frames of silence into a Matroska file. The native AAC
/// encoder and decoder work in planar float, so the decoded stream is `fltp`.
pub fn write_aac(path: &Path, sample_rate: u32, channels: u32, frames: usize) {
    let layout = ChannelLayout::from_channels(channels).unwrap();
    let sample_format = get_sample_format("fltp");
    let time_base = TimeBase::new(1, sample_rate as i32);

    let mut encoder = AudioEncoder::builder("aac")
        .unwrap()
        .sample_format(sample_format)
        .sample_rate(sample_rate)
        .channel_layout(layout.clone())
        .bit_rate(128_000)
        .build()
        .unwrap();

    let params: CodecParameters = encoder.codec_parameters().into();
    let mut muxer = open_muxer(path, &params);

    for i in 0..frames {
        let frame = AudioFrameMut::silence(&layout, sample_format, sample_rate, AAC_FRAME_SAMPLES)
            .with_time_base(time_base)
            .with_pts(Timestamp::new((i * AAC_FRAME_SAMPLES) as i64, time_base))
            .freeze();
        encoder.push(frame).unwrap();
        drain_encoder(&mut encoder, &mut muxer);
    }

    encoder.flush().unwrap();
    drain_encoder(&mut encoder, &mut muxer);
    muxer.flush().unwrap();
    muxer.close().unwrap();
}

/// Write `frames` flat mid-gray MJPEG pictures at 25 fps into a Matroska file.
///
/// MJPEG is always coded as full-range `yuvj420p`, and every packet is a keyframe.
pub fn write_mjpeg(path: &Path, width: usize, height: usize, frames: usize) {
    let pixel_format = get_pixel_format("yuvj420p");
    let time_base = TimeBase::new(1, 25);

    let mut encoder = VideoEncoder::builder("mjpeg")
        .unwrap()
        .pixel_format(pixel_format)
        .width(width)
        .height(height)
        .time_base(time_base)
        .build()
        .unwrap();

    let params: CodecParameters = encoder.codec_parameters().into();
    let mut muxer = open_muxer(path, &params);

    for i in 0..frames {
        let mut frame = VideoFrameMut::black(pixel_format, width, height)
            .with_time_base(time_base)
            .with_pts(Timestamp::new(i as i64, time_base));
        for plane in frame.planes_mut().iter_mut() {
            plane.data_mut().fill(128);
        }
        encoder.push(frame.freeze()).unwrap();
        drain_encoder(&mut encoder, &mut muxer);
    }

    encoder.flush().unwrap();
    drain_encoder(&mut encoder, &mut muxer);
    muxer.flush().unwrap();
    muxer.close().unwrap();
}

fn open_muxer(path: &Path, params: &CodecParameters) -> Muxer<File> {
    let format = OutputFormat::find_by_name("matroska").unwrap();
    let io = IO::from_seekable_write_stream(File::create(path).unwrap());

    let mut builder = Muxer::builder();
    builder.add_stream(params).unwrap();
    builder.build(io, format).unwrap()
}

fn drain_encoder<E: Encoder>(encoder: &mut E, muxer: &mut Muxer<File>) {
    while let Some(packet) = encoder.take().unwrap() {
        let packet: Packet = packet.with_stream_index(0);
        muxer.push(packet).unwrap();
    }
}

/// One log record kept by the capturing logger.
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub thread: ThreadId,
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Process-wide logger that keeps every record for later inspection.
struct CaptureLogger {
    records: Mutex<Vec<CapturedRecord>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(CapturedRecord {
                thread: std::thread::current().id(),
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {}
}

static CAPTURE: Lazy<CaptureLogger> = Lazy::new(|| CaptureLogger {
    records: Mutex::new(Vec::new()),
});
static CAPTURE_INSTALLED: OnceCell<()> = OnceCell::new();

/// Route `log` records into the capturing logger. Subsequent calls are no-ops.
pub fn capture_logs() {
    CAPTURE_INSTALLED.get_or_init(|| {
        if log::set_logger(&*CAPTURE).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

/// Records emitted so far by the calling thread. Tests run on their own threads,
/// so this isolates one test's records from the others.
pub fn captured_on_this_thread() -> Vec<CapturedRecord> {
    let current = std::thread::current().id();
    CAPTURE
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|record| record.thread == current)
        .cloned()
        .collect()
}
