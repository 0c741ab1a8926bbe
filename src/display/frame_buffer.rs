//! Fixed-size, aligned pixel buffer for decoded video frames
//!
//! The buffer is allocated once when a [`VideoReader`](crate::VideoReader) opens and
//! is overwritten in place by every successful read. It is never resized.
//!
//! # Invariants
//!
//! 1. `as_ptr()` is aligned to `alignment()`, which is a power of two
//! 2. `len()` never changes after construction and is never zero
//! 3. The memory is zero-initialized, so the buffer is readable before the first frame

use std::alloc::{self, Layout};
use std::ptr::NonNull;

pub struct AlignedFrameBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: the buffer uniquely owns its allocation, like a Box<[u8]>
unsafe impl Send for AlignedFrameBuffer {}
// Safety: shared access only hands out &[u8]
unsafe impl Sync for AlignedFrameBuffer {}

impl AlignedFrameBuffer {
    /// Allocate `len` zeroed bytes aligned to `alignment`.
    ///
    /// Returns `None` if `len` is zero, `alignment` is not a power of two,
    /// or the allocator fails.
    pub fn new(len: usize, alignment: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let layout = Layout::from_size_align(len, alignment).ok()?;

        // Safety: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;

        Some(Self { ptr, layout })
    }

    /// Allocate a buffer for a `width` x `height` picture with `bytes_per_pixel` packed bytes.
    pub fn for_picture(
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
        alignment: usize,
    ) -> Option<Self> {
        let len = width.checked_mul(height)?.checked_mul(bytes_per_pixel)?;
        Self::new(len, alignment)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // Safety: ptr is valid for len initialized bytes for as long as self lives
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: &mut self guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }
}

impl Drop for AlignedFrameBuffer {
    fn drop(&mut self) {
        // Safety: allocated in new() with exactly this layout
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl std::ops::Deref for AlignedFrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::ops::DerefMut for AlignedFrameBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl std::fmt::Debug for AlignedFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedFrameBuffer")
            .field("len", &self.len())
            .field("alignment", &self.alignment())
            .finish()
    }
}

/// Copy `rows` rows of `row_bytes` each from a strided source into a strided destination.
///
/// # Performance
/// - Fast path: matching strides -> single memcpy
/// - Fallback: row-by-row copy, stopping at the first row that would overrun either side
#[inline]
pub fn copy_rows(
    dst: &mut [u8],
    dst_stride: usize,
    src: &[u8],
    src_stride: usize,
    row_bytes: usize,
    rows: usize,
) -> usize {
    let row_bytes = row_bytes.min(src_stride).min(dst_stride);
    let total = rows * src_stride;

    if src_stride == dst_stride && src.len() >= total && dst.len() >= total {
        dst[..total].copy_from_slice(&src[..total]);
        return rows;
    }

    for r in 0..rows {
        let src_start = r * src_stride;
        let dst_start = r * dst_stride;
        if src_start + row_bytes > src.len() || dst_start + row_bytes > dst.len() {
            return r;
        }
        dst[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }

    rows
}
