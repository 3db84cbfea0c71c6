//! Buffer frame: the fixed-size memory tile managed by the buffer pool.
//!
//! A frame holds at most one page. Metadata (page-id tag, pin count, dirty
//! flag) is accounting state owned by the buffer pool and mutated under the
//! pool's mutex; the page *content* is guarded by the frame's own
//! reader/writer latch so slow readers never block the pool.

use crate::{FrameId, PAGE_SIZE};
use bytes::BytesMut;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use surge_common::prelude::*;

/// Buffer frame holding a page and its metadata.
pub struct Frame {
    /// Slot index in the pool's frame array
    frame_id: FrameId,
    /// Page currently in this frame (`PageId::INVALID` when unoccupied)
    page_id: AtomicU64,
    /// Pin count (number of active references)
    pin_count: AtomicU32,
    /// Dirty flag
    dirty: AtomicBool,
    /// Page content, guarded by the frame latch
    data: RwLock<BytesMut>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU64::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(BytesMut::zeroed(PAGE_SIZE)),
        }
    }

    /// Slot index of this frame.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Get the page ID stored in this frame.
    /// Uses Acquire ordering to synchronize with page data.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    /// Tag the frame with the page it now holds.
    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    /// Current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Check if the frame is currently pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Check if the frame is dirty (modified since last flush).
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// OR `dirty` into the stored flag. The flag is sticky: once set it is
    /// only cleared by [`Frame::clear_dirty`] after a flush or reset.
    #[inline]
    pub fn mark_dirty(&self, dirty: bool) {
        if dirty {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Clear the dirty flag after flushing to disk.
    #[inline]
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Pin the frame, preventing eviction.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Unpin the frame. Returns the new pin count.
    ///
    /// Unpinning a frame whose count is already zero is a pool-internal
    /// contract violation; the pool checks before calling.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "unpin called when pin_count is 0");
        old - 1
    }

    /// Clear the frame's identity: page id to INVALID, pin count to zero,
    /// dirty flag off.
    pub fn reset_metadata(&self) {
        self.page_id.store(PageId::INVALID.0, Ordering::Release);
        self.pin_count.store(0, Ordering::Relaxed);
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Zero the content buffer.
    pub fn reset_memory(&self) {
        self.data.write().fill(0);
    }

    /// Acquire the frame latch in shared mode.
    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, BytesMut> {
        self.data.read()
    }

    /// Acquire the frame latch in exclusive mode.
    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, BytesMut> {
        self.data.write()
    }
}
