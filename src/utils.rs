//! Aligned storage and small alignment helpers.
//!
//! Every matrix buffer in the crate is an [`AlignedBuffer`] aligned to
//! [`VECTOR_ALIGNMENT`](crate::VECTOR_ALIGNMENT), which is what lets padded rows
//! reach the vector kernels' aligned loads.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{configuration_error, Result};

/// An owned, zero-initialised `f64` buffer with a caller-chosen alignment.
///
/// `Vec<f64>` only guarantees 8-byte alignment, which is not enough for the
/// 512-bit aligned loads of the AVX-512 kernel. This container allocates with
/// an explicit [`Layout`] and frees with the same layout, so the allocation is
/// never handed to `Vec`'s allocator.
///
/// # Memory Safety
///
/// - Allocation and deallocation both go through `std::alloc` with one `Layout`
/// - Zero-length buffers never touch the allocator
/// - Clones allocate fresh storage with the same alignment
pub struct AlignedBuffer {
    ptr: NonNull<f64>,
    len: usize,
    layout: Layout,
}

// SAFETY: the buffer uniquely owns its allocation, exactly like `Vec<f64>`.
unsafe impl Send for AlignedBuffer {}
// SAFETY: shared access only hands out `&[f64]`.
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeroed doubles aligned to `align` bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `align` is not a power of two, is
    /// smaller than the natural alignment of `f64`, or if the byte size
    /// overflows.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        if !align.is_power_of_two() || align < mem::align_of::<f64>() {
            return Err(configuration_error(format!(
                "alignment {align} must be a power of two >= {}",
                mem::align_of::<f64>()
            )));
        }

        let size_bytes = len.checked_mul(mem::size_of::<f64>()).ok_or_else(|| {
            configuration_error(format!("buffer of {len} doubles overflows usize"))
        })?;

        let layout = Layout::from_size_align(size_bytes, align).map_err(|_| {
            configuration_error(format!(
                "invalid layout (size: {size_bytes}, alignment: {align})"
            ))
        })?;

        if layout.size() == 0 {
            return Ok(AlignedBuffer {
                ptr: NonNull::dangling(),
                len: 0,
                layout,
            });
        }

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) as *mut f64 };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };

        Ok(AlignedBuffer { ptr, len, layout })
    }

    /// Alignment, in bytes, the buffer was allocated with.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_ptr(&self) -> *const f64 {
        self.ptr.as_ptr()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe {
                dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
            }
        }
    }
}

impl Deref for AlignedBuffer {
    type Target = [f64];
    fn deref(&self) -> &Self::Target {
        // SAFETY: `ptr` is valid for `len` initialised doubles (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Clone for AlignedBuffer {
    fn clone(&self) -> Self {
        let mut copy = match AlignedBuffer::zeroed(self.len, self.layout.align()) {
            Ok(buffer) => buffer,
            // The layout was already validated when `self` was built.
            Err(_) => handle_alloc_error(self.layout),
        };
        copy.copy_from_slice(self);
        copy
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("alignment", &self.layout.align())
            .finish()
    }
}

/// Returns `true` when `ptr` sits on an `align`-byte boundary.
#[inline(always)]
pub fn is_aligned(ptr: *const f64, align: usize) -> bool {
    (ptr as usize) % align == 0
}

/// Rounds `value` up to the next multiple of `multiple`.
#[inline(always)]
pub fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}
