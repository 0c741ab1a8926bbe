//! Audio and video decoding sessions
//!
//! Both sessions open a container, bind a decoder to its best stream of one kind and
//! drive it with the packet pump in [`pump`]. [`AudioDecodeSession`] drains the whole
//! audio stream into raw samples in one call; [`VideoReader`] stays open and hands out
//! one converted picture per call.

mod pixel;

pub mod audio;
pub mod pump;
pub mod session;
pub mod video;

pub use audio::{AudioDecodeSession, AudioMeta, RawAudioFormat};
pub use pixel::{correct_deprecated_format_name, correct_deprecated_pixel_format};
pub use pump::{DecodeStats, DecodeStep};
pub use session::{MediaKind, select_best_stream};
pub use video::{ReaderState, VideoReader};
