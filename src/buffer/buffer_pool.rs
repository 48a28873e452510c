use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::page::{FrameId, Page, PageId, PageRef, INVALID_PAGE_ID};
use crate::config::BufferPoolConfig;
use crate::error::{VellumError, VellumResult};
use crate::recovery::{LogManager, Lsn};
use crate::storage::disk_scheduler::DiskCommandResultReceiver;
use crate::storage::DiskScheduler;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;
use crate::utils::hash::ExtendibleHashTable;

#[derive(Debug)]
struct PoolState {
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// Mediates access to a fixed array of page frames backed by a disk
/// file: resolves page ids through an extendible-hash page table,
/// evicts through an LRU-K replacer, and keeps pin counts and dirty
/// bits consistent across the three.
///
/// The pool latch serializes every public operation end-to-end; the
/// page table's and replacer's own latches are only ever acquired
/// nested inside it, so the lock order is pool → (table | replacer |
/// frame) and cannot invert.
#[derive(Debug)]
pub struct BufferPoolManager {
    pool: Vec<Arc<RwLock<Page>>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LRUKReplacer,
    disk_scheduler: Arc<DiskScheduler>,
    log_manager: RwLock<Option<Arc<dyn LogManager>>>,
    latch: Mutex<PoolState>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_scheduler: Arc<DiskScheduler>) -> Self {
        Self::new_with_config(
            BufferPoolConfig {
                pool_size,
                ..Default::default()
            },
            disk_scheduler,
        )
    }

    pub fn new_with_config(config: BufferPoolConfig, disk_scheduler: Arc<DiskScheduler>) -> Self {
        assert!(config.pool_size > 0, "pool_size must be positive");
        let mut free_list = VecDeque::with_capacity(config.pool_size);
        let mut pool = Vec::with_capacity(config.pool_size);
        for frame_id in 0..config.pool_size {
            free_list.push_back(frame_id);
            pool.push(Arc::new(RwLock::new(Page::empty())));
        }

        Self {
            pool,
            page_table: ExtendibleHashTable::new(config.bucket_size),
            replacer: LRUKReplacer::new(config.pool_size, config.replacer_k),
            disk_scheduler,
            log_manager: RwLock::new(None),
            latch: Mutex::new(PoolState {
                free_list,
                next_page_id: 0,
            }),
        }
    }

    /// Wire in a log manager; write-backs then enforce WAL-before-data.
    pub fn set_log_manager(&self, log_manager: Arc<dyn LogManager>) {
        *self.log_manager.write() = Some(log_manager);
    }

    /// Allocate a fresh page in a free or evicted frame, pinned once and
    /// zero-filled. `Ok(None)` when every frame is pinned.
    pub fn new_page(&self) -> VellumResult<Option<PageRef>> {
        let mut state = self.latch.lock();
        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let page_id = Self::bump_page_id(&mut state);
        self.page_table.insert(page_id, frame_id);
        {
            let mut page = self.pool[frame_id].write();
            page.reset();
            page.page_id = page_id;
            page.pin_count = 1;
        }
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some(PageRef::new(frame_id, self.pool[frame_id].clone())))
    }

    /// Pin `page_id`, reading it from disk on a miss. `Ok(None)` when
    /// the page is absent and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> VellumResult<Option<PageRef>> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "fetch_page: invalid page id".to_string(),
            ));
        }

        let mut state = self.latch.lock();
        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.pool[frame_id].write().pin_count += 1;
            // A hit is an access; keep the k-history current.
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Some(PageRef::new(frame_id, self.pool[frame_id].clone())));
        }

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let data = Self::wait(self.disk_scheduler.schedule_read(page_id)?)?;
        {
            let mut page = self.pool[frame_id].write();
            page.reset();
            page.page_id = page_id;
            page.pin_count = 1;
            page.data_mut().copy_from_slice(&data[..]);
        }
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        self.page_table.insert(page_id, frame_id);

        Ok(Some(PageRef::new(frame_id, self.pool[frame_id].clone())))
    }

    /// Drop one pin. `is_dirty` can only set the dirty bit, never clear
    /// it. Returns false when the page is absent or already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };

        let mut page = self.pool[frame_id].write();
        if page.pin_count == 0 {
            return false;
        }
        if is_dirty {
            page.is_dirty = true;
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            drop(page);
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write `page_id` back whether or not it is dirty, clearing the
    /// bit. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _state = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        self.write_back(frame_id, page_id)?;
        Ok(true)
    }

    /// Write back every dirty frame, clearing the bits.
    pub fn flush_all_pages(&self) -> VellumResult<()> {
        let _state = self.latch.lock();
        for frame_id in 0..self.pool.len() {
            let (page_id, is_dirty) = {
                let page = self.pool[frame_id].read();
                (page.page_id, page.is_dirty)
            };
            if is_dirty && page_id != INVALID_PAGE_ID {
                self.write_back(frame_id, page_id)?;
            }
        }
        Ok(())
    }

    /// Evict `page_id` from the pool and hand its on-disk space back.
    /// A non-resident page is vacuously deleted; a pinned one refuses.
    pub fn delete_page(&self, page_id: PageId) -> VellumResult<bool> {
        let mut state = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        if self.pool[frame_id].read().pin_count > 0 {
            return Ok(false);
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        self.pool[frame_id].write().reset();
        state.free_list.push_back(frame_id);
        Self::wait(self.disk_scheduler.schedule_deallocate(page_id)?)?;
        Ok(true)
    }

    pub fn allocate_page(&self) -> PageId {
        let mut state = self.latch.lock();
        Self::bump_page_id(&mut state)
    }

    /// Free-space hook; zeroes the on-disk page.
    pub fn deallocate_page(&self, page_id: PageId) -> VellumResult<()> {
        let _state = self.latch.lock();
        Self::wait(self.disk_scheduler.schedule_deallocate(page_id)?)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    pub fn resident_page_count(&self) -> usize {
        self.page_table.len()
    }

    pub fn evictable_frame_count(&self) -> usize {
        self.replacer.size()
    }

    fn bump_page_id(state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += 1;
        page_id
    }

    /// Hand out a frame for a new resident: the free list first, then a
    /// victim from the replacer, written back and unmapped if it held a
    /// dirty page. `Ok(None)` when neither yields a frame.
    fn acquire_frame(&self, state: &mut PoolState) -> VellumResult<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };

        let (old_page_id, dirty_payload) = {
            let mut page = self.pool[frame_id].write();
            let payload = if page.is_dirty {
                let payload = Some((Bytes::copy_from_slice(page.data()), page.lsn));
                page.is_dirty = false;
                payload
            } else {
                None
            };
            (page.page_id, payload)
        };
        if let Some((payload, lsn)) = dirty_payload {
            self.flush_wal_until(lsn)?;
            Self::wait(self.disk_scheduler.schedule_write(old_page_id, payload)?)?;
        }
        self.page_table.remove(&old_page_id);
        Ok(Some(frame_id))
    }

    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> VellumResult<()> {
        let (payload, lsn) = {
            let page = self.pool[frame_id].read();
            (Bytes::copy_from_slice(page.data()), page.lsn)
        };
        self.flush_wal_until(lsn)?;
        Self::wait(self.disk_scheduler.schedule_write(page_id, payload)?)?;
        self.pool[frame_id].write().is_dirty = false;
        Ok(())
    }

    fn flush_wal_until(&self, lsn: Lsn) -> VellumResult<()> {
        if lsn == 0 {
            return Ok(());
        }
        if let Some(log_manager) = self.log_manager.read().as_ref() {
            if log_manager.flushed_lsn() < lsn {
                log_manager.flush_until(lsn)?;
            }
        }
        Ok(())
    }

    fn wait<T>(receiver: DiskCommandResultReceiver<T>) -> VellumResult<T> {
        receiver
            .recv()
            .map_err(|e| VellumError::Internal(format!("Disk scheduler reply lost: {}", e)))?
    }
}
