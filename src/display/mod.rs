//! Caller-visible output buffers

pub mod frame_buffer;

pub use frame_buffer::AlignedFrameBuffer;
