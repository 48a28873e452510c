use crate::recovery::Lsn;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;

pub type PageId = i64;
pub type FrameId = usize;

pub const INVALID_PAGE_ID: PageId = -1;
pub const PAGE_SIZE: usize = 4096;

/// One frame's payload and metadata. Lives behind a per-frame `RwLock`
/// which doubles as the page latch handed to callers.
#[derive(Debug)]
pub struct Page {
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    // Number of outstanding references; the frame cannot be evicted
    // while this is non-zero.
    pub pin_count: u32,
    // Buffer differs from the on-disk page.
    pub is_dirty: bool,
    // Last WAL record touching this page; 0 when none.
    pub lsn: Lsn,
}

impl Page {
    pub fn empty() -> Self {
        Self::new(INVALID_PAGE_ID)
    }

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: [0; PAGE_SIZE],
            pin_count: 0,
            is_dirty: false,
            lsn: 0,
        }
    }

    /// Return the frame to its empty state: no page, zeroed bytes.
    pub fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.data = [0; PAGE_SIZE];
        self.pin_count = 0;
        self.is_dirty = false;
        self.lsn = 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable page bytes. Dirtiness is declared through
    /// `BufferPoolManager::unpin_page`, not tracked here.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Borrowed handle to a resident frame. Valid until the caller unpins
/// the page; dropping the handle does not unpin.
///
/// Derefs to the frame's `RwLock<Page>`. Callers must release any page
/// guard before re-entering the pool; the lock is not reentrant.
#[derive(Debug, Clone)]
pub struct PageRef {
    frame_id: FrameId,
    page: Arc<RwLock<Page>>,
}

impl PageRef {
    pub(crate) fn new(frame_id: FrameId, page: Arc<RwLock<Page>>) -> Self {
        Self { frame_id, page }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        self.page.read().page_id
    }
}

impl Deref for PageRef {
    type Target = RwLock<Page>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}
