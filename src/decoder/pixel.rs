//! Pixel-format correction ahead of the scaler
//!
//! The JPEG-range `yuvj*` formats are deprecated in swscale: handing one to the
//! scaler takes a separate code path and prints a warning on every context. They
//! share their plane layout with the plain `yuv*` formats, so the scaler is built
//! for the plain format and decoded pictures are re-tagged by copying their planes
//! into a reusable staging frame of that format.

use crate::display::frame_buffer::copy_rows;
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::{PixelFormat, VideoFrame, VideoFrameMut};
use std::collections::VecDeque;

/// Plain equivalent of a deprecated JPEG-range format name, or the name unchanged.
pub fn correct_deprecated_format_name(name: &str) -> &str {
    match name {
        "yuvj420p" => "yuv420p",
        "yuvj422p" => "yuv422p",
        "yuvj444p" => "yuv444p",
        "yuvj440p" => "yuv440p",
        other => other,
    }
}

/// Plain equivalent of a deprecated JPEG-range pixel format, or `None` if `format` is fine as is.
pub fn correct_deprecated_pixel_format(format: PixelFormat) -> Option<PixelFormat> {
    let name = format.name();
    let corrected = correct_deprecated_format_name(name);
    if corrected == name {
        None
    } else {
        Some(get_pixel_format(corrected))
    }
}

/// Maximum number of staging frames kept around for reuse
const POOL_LIMIT: usize = 2;

/// Re-tags decoded pictures with a corrected pixel format.
///
/// # Performance
/// - Staging frames are reused via a small pool instead of allocated per picture
/// - Planes with matching strides are copied with a single memcpy
pub(crate) struct Retagger {
    frames: VecDeque<VideoFrame>,
    format: PixelFormat,
    w: usize,
    h: usize,
}

impl Retagger {
    pub fn new(format: PixelFormat, w: usize, h: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(POOL_LIMIT),
            format,
            w,
            h,
        }
    }

    /// Copy the planes of `source` into a staging frame tagged with the corrected format.
    pub fn retag(&mut self, source: &VideoFrame) -> VideoFrame {
        let mut staging = self.take();

        {
            let src_planes = source.planes();
            let mut dst_planes = staging.planes_mut();
            for (src, dst) in src_planes.iter().zip(dst_planes.iter_mut()) {
                let dst_stride = dst.line_size();
                if dst_stride == 0 {
                    continue;
                }
                let rows = dst.data().len() / dst_stride;
                copy_rows(
                    dst.data_mut(),
                    dst_stride,
                    src.data(),
                    src.line_size(),
                    src.line_size().min(dst_stride),
                    rows,
                );
            }
        }

        let frame = staging.freeze();
        self.put(frame.clone());
        frame
    }

    fn put(&mut self, frame: VideoFrame) {
        if self.frames.len() < POOL_LIMIT {
            self.frames.push_back(frame);
        }
    }

    /// Take a writable frame from the pool or allocate a new one if necessary.
    fn take(&mut self) -> VideoFrameMut {
        // Scan each pooled frame at most once; frames still referenced elsewhere stay pooled.
        let available = self.frames.len();
        for _ in 0..available {
            let Some(frame) = self.frames.pop_front() else {
                break;
            };
            match frame.try_into_mut() {
                Ok(frame) => return frame,
                Err(frame) => self.frames.push_back(frame),
            }
        }

        VideoFrameMut::black(self.format, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deprecated_names_are_corrected() {
        assert_eq!(correct_deprecated_format_name("yuvj420p"), "yuv420p");
        assert_eq!(correct_deprecated_format_name("yuvj422p"), "yuv422p");
        assert_eq!(correct_deprecated_format_name("yuvj444p"), "yuv444p");
        assert_eq!(correct_deprecated_format_name("yuvj440p"), "yuv440p");
    }

    #[test]
    fn test_other_names_pass_through() {
        for name in ["yuv420p", "nv12", "rgb24", "gray", "yuvj411p", "p010le"] {
            assert_eq!(correct_deprecated_format_name(name), name);
        }
    }

    #[test]
    fn test_pixel_format_correction() {
        let yuvj = get_pixel_format("yuvj420p");
        let corrected = correct_deprecated_pixel_format(yuvj).unwrap();
        assert_eq!(corrected.name(), "yuv420p");

        assert!(correct_deprecated_pixel_format(get_pixel_format("yuv420p")).is_none());
        assert!(correct_deprecated_pixel_format(get_pixel_format("nv12")).is_none());
    }

    #[test]
    fn test_retag_copies_planes() {
        let source_format = get_pixel_format("yuvj420p");
        let mut source = VideoFrameMut::black(source_format, 16, 8);
        {
            let mut planes = source.planes_mut();
            planes[0].data_mut().fill(200);
            planes[1].data_mut().fill(90);
            planes[2].data_mut().fill(160);
        }
        let source = source.freeze();

        let mut retagger = Retagger::new(get_pixel_format("yuv420p"), 16, 8);
        let staged = retagger.retag(&source);

        assert_eq!(staged.pixel_format().name(), "yuv420p");
        assert_eq!(staged.width(), 16);
        assert_eq!(staged.height(), 8);

        let planes = staged.planes();
        let y_stride = planes[0].line_size();
        for row in 0..8 {
            assert!(planes[0].data()[row * y_stride..row * y_stride + 16].iter().all(|&b| b == 200));
        }
        let u_stride = planes[1].line_size();
        for row in 0..4 {
            assert!(planes[1].data()[row * u_stride..row * u_stride + 8].iter().all(|&b| b == 90));
            assert!(planes[2].data()[row * u_stride..row * u_stride + 8].iter().all(|&b| b == 160));
        }
    }

    #[test]
    fn test_retag_reuses_released_frames() {
        let format = get_pixel_format("yuv420p");
        let source = VideoFrameMut::black(get_pixel_format("yuvj420p"), 8, 8).freeze();
        let mut retagger = Retagger::new(format, 8, 8);

        for _ in 0..5 {
            let staged = retagger.retag(&source);
            drop(staged);
        }
        assert!(retagger.frames.len() <= POOL_LIMIT);
    }
}
