//! Buffer pool manager for SurgeDB.
//!
//! Mediates between the disk manager and a fixed array of in-memory frames:
//! - Page table mapping resident page ids to frames
//! - Free list of never-occupied frames
//! - LRU-K victim selection with write-back of dirty pages
//! - Pin counting to prevent eviction of pages in use
//! - Scoped guards pairing pin lifetime with the frame latch
//!
//! A single pool mutex serializes the page table, free list, pin accounting,
//! and replacer. Page content is latched per frame, and latches are only
//! acquired by guards after the pool mutex has been released (the eviction
//! write-back path takes a victim's latch while holding the mutex, which
//! cannot contend: victims have pin count zero).

use crate::disk::DiskManager;
use crate::frame::Frame;
use crate::replacer::LruKReplacer;
use crate::wal::LogManager;
use crate::FrameId;
use bytes::BytesMut;
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use surge_common::prelude::*;
use tracing::{debug, error, trace};

/// Buffer pool manager over a fixed set of frames.
pub struct BufferPoolManager {
    /// Buffer frames, allocated once at construction
    frames: Vec<Frame>,
    /// Page table and free list, behind the pool mutex
    state: Mutex<PoolState>,
    /// Victim selection; its internal mutex nests inside the pool mutex
    replacer: LruKReplacer,
    /// Next page id to hand out, monotonic from zero
    next_page_id: AtomicU64,
    /// Backing block device
    disk_manager: Arc<DiskManager>,
    /// WAL sink for higher layers; the pool itself never writes to it
    log_manager: Option<Arc<LogManager>>,
    /// Statistics
    stats: BufferPoolStatsInner,
}

struct PoolState {
    /// Resident page id -> frame id
    page_table: HashMap<PageId, FrameId>,
    /// Frames that have never held a page or were released by delete_page
    free_list: VecDeque<FrameId>,
}

/// Internal statistics with atomic counters
struct BufferPoolStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl BufferPoolStatsInner {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }
}

/// Buffer pool statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    pub pool_size: usize,
    pub resident_pages: usize,
    pub dirty_pages: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub flushes: u64,
}

impl BufferPoolManager {
    /// Create a new buffer pool.
    ///
    /// # Arguments
    /// * `pool_size` - Number of buffer frames
    /// * `disk_manager` - Backing block device
    /// * `replacer_k` - K parameter of the LRU-K replacement policy
    /// * `log_manager` - Optional WAL sink, held for higher layers
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        replacer_k: usize,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let frames = (0..pool_size).map(Frame::new).collect();
        let free_list = (0..pool_size).collect();

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            next_page_id: AtomicU64::new(0),
            disk_manager,
            log_manager,
            stats: BufferPoolStatsInner::new(),
        }
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Pin count of a resident page, `None` if the page is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let fid = *state.page_table.get(&page_id)?;
        Some(self.frames[fid].pin_count())
    }

    /// Get the disk manager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Get the WAL sink, if one was attached at construction.
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    // =========================================================================
    // Frame acquisition
    // =========================================================================

    /// Obtain an unoccupied frame: free list first, then eviction.
    ///
    /// On eviction the victim's page is written back if dirty and removed
    /// from the page table. Returns `None` when every frame is pinned.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(fid) = state.free_list.pop_front() {
            return Some(fid);
        }

        let fid = self.replacer.evict()?;
        let frame = &self.frames[fid];
        let old_page_id = frame.page_id();
        debug_assert!(old_page_id.is_valid(), "evicted frame holds no page");

        if frame.is_dirty() {
            let data = frame.read_data();
            if let Err(e) = self.disk_manager.write_page(old_page_id, &data) {
                error!(page_id = old_page_id.0, error = %e, "write-back failed, aborting eviction");
                drop(data);
                // Re-register the victim so the pool stays consistent; the
                // caller observes pool-full.
                self.replacer.record_access(fid);
                self.replacer.set_evictable(fid, true);
                return None;
            }
            self.stats.flushes.fetch_add(1, Ordering::Relaxed);
            frame.clear_dirty();
        }

        state.page_table.remove(&old_page_id);
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        trace!(page_id = old_page_id.0, frame_id = fid, "evicted page");

        frame.reset_metadata();
        frame.reset_memory();
        Some(fid)
    }

    /// Tag `fid` with `page_id`, pin it, and make it resident.
    fn install_frame(&self, state: &mut PoolState, fid: FrameId, page_id: PageId) {
        let frame = &self.frames[fid];
        frame.set_page_id(page_id);
        self.replacer.record_access(fid);
        self.replacer.set_evictable(fid, false);
        frame.pin();
        state.page_table.insert(page_id, fid);
    }

    /// Undo a just-performed install after a failed disk read.
    fn release_frame(&self, state: &mut PoolState, fid: FrameId, page_id: PageId) {
        let frame = &self.frames[fid];
        state.page_table.remove(&page_id);
        self.replacer.set_evictable(fid, true);
        self.replacer.remove(fid);
        frame.reset_metadata();
        state.free_list.push_back(fid);
    }

    /// Fetch the frame holding `page_id`, pinned, loading from disk on miss.
    fn fetch_frame(&self, page_id: PageId) -> Option<&Frame> {
        let mut state = self.state.lock();

        if let Some(&fid) = state.page_table.get(&page_id) {
            let frame = &self.frames[fid];
            frame.pin();
            self.replacer.set_evictable(fid, false);
            self.replacer.record_access(fid);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!(page_id = page_id.0, frame_id = fid, "buffer pool hit");
            return Some(frame);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(page_id = page_id.0, "buffer pool miss, loading from disk");

        let fid = self.acquire_frame(&mut state)?;
        self.install_frame(&mut state, fid, page_id);

        let frame = &self.frames[fid];
        let mut data = frame.write_data();
        if let Err(e) = self.disk_manager.read_page(page_id, &mut data) {
            error!(page_id = page_id.0, error = %e, "disk read failed");
            drop(data);
            frame.unpin();
            self.release_frame(&mut state, fid, page_id);
            return None;
        }
        drop(data);
        Some(frame)
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Allocate a brand-new page and return it pinned, without a latch.
    ///
    /// Returns `None` when no frame is free and nothing is evictable.
    pub fn new_page(&self) -> Option<PageGuard<'_>> {
        let mut state = self.state.lock();
        let fid = self.acquire_frame(&mut state)?;
        let page_id = PageId(self.next_page_id.fetch_add(1, Ordering::Relaxed));
        self.install_frame(&mut state, fid, page_id);
        drop(state);

        debug!(page_id = page_id.0, frame_id = fid, "allocated new page");
        Some(PageGuard::new(self, &self.frames[fid], page_id))
    }

    /// Fetch a page pinned, without a latch.
    pub fn fetch_page(&self, page_id: PageId) -> Option<PageGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        Some(PageGuard::new(self, frame, page_id))
    }

    /// Fetch a page pinned and read-latched.
    pub fn fetch_page_read(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        Some(PageReadGuard {
            pool: self,
            page_id,
            guard: Some(frame.read_data()),
        })
    }

    /// Fetch a page pinned and write-latched.
    pub fn fetch_page_write(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        Some(PageWriteGuard {
            pool: self,
            page_id,
            guard: Some(frame.write_data()),
            dirty: false,
        })
    }

    /// Drop one pin on `page_id`, OR-ing `is_dirty` into its dirty flag.
    ///
    /// Returns `false` if the page is not resident or its pin count is
    /// already zero. When the count reaches zero the frame becomes
    /// evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&fid) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[fid];
        if frame.pin_count() == 0 {
            return false;
        }
        frame.mark_dirty(is_dirty);
        if frame.unpin() == 0 {
            self.replacer.set_evictable(fid, true);
        }
        true
    }

    /// Write `page_id`'s buffer to disk and clear its dirty flag,
    /// regardless of pin count. Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let state = self.state.lock();
        let Some(&fid) = state.page_table.get(&page_id) else {
            return false;
        };
        self.flush_frame(page_id, &self.frames[fid])
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) {
        let state = self.state.lock();
        for (&page_id, &fid) in &state.page_table {
            self.flush_frame(page_id, &self.frames[fid]);
        }
    }

    fn flush_frame(&self, page_id: PageId, frame: &Frame) -> bool {
        let data = frame.read_data();
        if let Err(e) = self.disk_manager.write_page(page_id, &data) {
            error!(page_id = page_id.0, error = %e, "flush failed");
            return false;
        }
        drop(data);
        frame.clear_dirty();
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(page_id = page_id.0, "flushed page");
        true
    }

    /// Drop `page_id` from the pool and return its frame to the free list.
    ///
    /// Returns `true` if the page was not resident (vacuously deleted) or
    /// was deleted; `false` if it is pinned. The page id is not reused;
    /// reclaiming the block is the disk manager's concern.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&fid) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[fid];
        if frame.is_pinned() {
            return false;
        }

        self.replacer.remove(fid);
        state.page_table.remove(&page_id);
        frame.reset_metadata();
        frame.reset_memory();
        state.free_list.push_back(fid);
        debug!(page_id = page_id.0, frame_id = fid, "deleted page");
        true
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> BufferPoolStats {
        let mut resident = 0;
        let mut dirty = 0;
        for frame in &self.frames {
            if frame.page_id().is_valid() {
                resident += 1;
                if frame.is_dirty() {
                    dirty += 1;
                }
            }
        }

        BufferPoolStats {
            pool_size: self.frames.len(),
            resident_pages: resident,
            dirty_pages: dirty,
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Page guards
// =============================================================================

/// Pin-only guard for a page, without a latch.
///
/// Byte access goes through [`PageGuard::upgrade_read`] or
/// [`PageGuard::upgrade_write`], which latch the frame without releasing the
/// pin. Dropping the guard unpins the page.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    /// `None` once the guard has been consumed by an upgrade
    frame: Option<&'a Frame>,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPoolManager, frame: &'a Frame, page_id: PageId) -> Self {
        Self {
            pool,
            frame: Some(frame),
            page_id,
            dirty: false,
        }
    }

    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Record that the caller intends to dirty the page; reported to the
    /// pool when the pin is released.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Acquire the read latch, keeping the pin.
    pub fn upgrade_read(mut self) -> PageReadGuard<'a> {
        let frame = self.frame.take().expect("guard already consumed");
        // A dirty mark made through this guard must survive the upgrade;
        // read guards themselves always unpin clean.
        frame.mark_dirty(self.dirty);
        PageReadGuard {
            pool: self.pool,
            page_id: self.page_id,
            guard: Some(frame.read_data()),
        }
    }

    /// Acquire the write latch, keeping the pin.
    pub fn upgrade_write(mut self) -> PageWriteGuard<'a> {
        let frame = self.frame.take().expect("guard already consumed");
        PageWriteGuard {
            pool: self.pool,
            page_id: self.page_id,
            dirty: self.dirty,
            guard: Some(frame.write_data()),
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if self.frame.take().is_some() {
            self.pool.unpin_page(self.page_id, self.dirty);
        }
    }
}

/// Read guard for a page: shared latch plus a pin, released on drop.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    guard: Option<RwLockReadGuard<'a, BytesMut>>,
}

impl PageReadGuard<'_> {
    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Page content.
    pub fn data(&self) -> &[u8] {
        self.guard.as_ref().expect("read guard holds the latch")
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Release the latch before re-entering the pool: the pool mutex is
        // ordered strictly outside frame latches.
        drop(self.guard.take());
        self.pool.unpin_page(self.page_id, false);
    }
}

/// Write guard for a page: exclusive latch plus a pin, released on drop.
///
/// Mutable access marks the guard dirty; the flag reaches the frame when the
/// pin is released.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    guard: Option<RwLockWriteGuard<'a, BytesMut>>,
    dirty: bool,
}

impl PageWriteGuard<'_> {
    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Page content.
    pub fn data(&self) -> &[u8] {
        self.guard.as_ref().expect("write guard holds the latch")
    }

    /// Mutable page content; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        self.guard.as_mut().expect("write guard holds the latch")
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}
