//! Segment memory backends.
//!
//! A backend hands out a pointer to an `ShmLayout` that stays valid for
//! the backend's lifetime. It does no locking of its own: all access goes
//! through `SharedStore`, which pairs a backend with a `ProcessLock`.
//!
//! # Implementors
//!
//! - `SysvSegment`: SysV shared memory, attached by key. Every process
//!   using the same key sees the same bytes.
//! - `HeapSegment`: a boxed layout private to this process, for tests.

use std::cell::UnsafeCell;
use std::ptr::NonNull;

use crate::layout::ShmLayout;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod sysv;
        pub use sysv::SysvSegment;
    }
}

/// Default SysV key.
pub const DEFAULT_SHM_KEY: i32 = 0x5164;

pub trait SegmentMemory: Send + Sync {
    /// Pointer to the mapped layout.
    ///
    /// The pointee may be written by other processes at any time; callers
    /// must hold the cross-process lock while dereferencing it.
    fn layout_ptr(&self) -> NonNull<ShmLayout>;

    /// Whether this handle created (and initialised) the segment.
    fn created(&self) -> bool;
}

/// Process-private segment.
pub struct HeapSegment {
    cell: Box<UnsafeCell<ShmLayout>>,
}

// Safety: the layout is only reached through SharedStore, which holds the
// lock for every access.
unsafe impl Send for HeapSegment {}
unsafe impl Sync for HeapSegment {}

impl HeapSegment {
    /// Zeroed layout with a valid header and a fresh token.
    pub fn new() -> Self {
        Self::with_token(&uuid::Uuid::new_v4().to_string())
    }

    pub fn with_token(token: &str) -> Self {
        let mut layout = ShmLayout::new_boxed();
        layout.initialize(token);
        // SAFETY: UnsafeCell<T> is repr(transparent) over T
        let cell = unsafe { Box::from_raw(Box::into_raw(layout) as *mut UnsafeCell<ShmLayout>) };
        Self { cell }
    }
}

impl Default for HeapSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentMemory for HeapSegment {
    fn layout_ptr(&self) -> NonNull<ShmLayout> {
        // SAFETY: UnsafeCell::get on a live Box is never null
        unsafe { NonNull::new_unchecked(self.cell.get()) }
    }

    fn created(&self) -> bool {
        true
    }
}
