use log::debug;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::buffer::{PageId, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

/// Page-granular store over a single database file.
///
/// Page ids are file offsets (`page_id * PAGE_SIZE`); the file holds no
/// metadata of its own. A mutex around the handle serializes seeks
/// against reads and writes from concurrent I/O workers.
#[derive(Debug)]
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> VellumResult<Self> {
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path.as_ref())?;

        let db_file_len = db_file.metadata()?.len();
        if db_file_len % PAGE_SIZE as u64 != 0 {
            return Err(VellumError::Internal(format!(
                "db file size {} not a multiple of page size {}",
                db_file_len, PAGE_SIZE
            )));
        }
        debug!(
            "opened {:?} holding {} pages",
            db_path.as_ref(),
            db_file_len / PAGE_SIZE as u64
        );

        Ok(Self {
            db_file: Mutex::new(db_file),
        })
    }

    fn page_offset(page_id: PageId) -> VellumResult<u64> {
        if page_id < 0 {
            return Err(VellumError::Storage(format!(
                "invalid page id {}",
                page_id
            )));
        }
        Ok(page_id as u64 * PAGE_SIZE as u64)
    }

    /// Read one page. A page that was allocated but never written lies
    /// past the end of the file and reads as zeroes.
    pub fn read_page(&self, page_id: PageId) -> VellumResult<[u8; PAGE_SIZE]> {
        let offset = Self::page_offset(page_id)?;
        let mut guard = self.db_file.lock();
        let mut page = [0u8; PAGE_SIZE];
        if offset >= guard.metadata()?.len() {
            return Ok(page);
        }
        guard.seek(SeekFrom::Start(offset))?;
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> VellumResult<()> {
        let offset = Self::page_offset(page_id)?;
        if data.len() != PAGE_SIZE {
            return Err(VellumError::Internal(format!(
                "page data is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }
        let mut guard = self.db_file.lock();
        guard.seek(SeekFrom::Start(offset))?;
        guard.write_all(data)?;
        guard.flush()?;
        Ok(())
    }

    /// Free-space hook: the page keeps its slot in the file but its
    /// bytes are zeroed.
    pub fn deallocate_page(&self, page_id: PageId) -> VellumResult<()> {
        self.write_page(page_id, &EMPTY_PAGE)
    }

    pub fn db_file_len(&self) -> VellumResult<u64> {
        Ok(self.db_file.lock().metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::DiskManager;
    use crate::buffer::PAGE_SIZE;
    use tempfile::TempDir;

    fn test_disk_manager() -> (TempDir, DiskManager) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, disk_manager)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_temp_dir, disk_manager) = test_disk_manager();

        let mut page0 = vec![1, 2, 3];
        page0.extend(vec![0; PAGE_SIZE - 3]);
        disk_manager.write_page(0, &page0).unwrap();
        assert_eq!(disk_manager.read_page(0).unwrap(), page0.as_slice());

        let mut page3 = vec![0; PAGE_SIZE - 3];
        page3.extend(vec![4, 5, 6]);
        disk_manager.write_page(3, &page3).unwrap();
        assert_eq!(disk_manager.read_page(3).unwrap(), page3.as_slice());

        // Writing page 3 extends the file across the never-written gap.
        assert_eq!(disk_manager.db_file_len().unwrap(), 4 * PAGE_SIZE as u64);
        assert!(disk_manager.read_page(1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn unwritten_page_reads_as_zeroes() {
        let (_temp_dir, disk_manager) = test_disk_manager();
        assert!(disk_manager.read_page(7).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn deallocate_zeroes_the_page() {
        let (_temp_dir, disk_manager) = test_disk_manager();
        disk_manager.write_page(2, &[0xAB; PAGE_SIZE]).unwrap();
        disk_manager.deallocate_page(2).unwrap();
        assert!(disk_manager.read_page(2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn negative_page_id_is_rejected() {
        let (_temp_dir, disk_manager) = test_disk_manager();
        assert!(disk_manager.read_page(-1).is_err());
        assert!(disk_manager.write_page(-1, &[0; PAGE_SIZE]).is_err());
    }

    #[test]
    fn short_page_write_is_rejected() {
        let (_temp_dir, disk_manager) = test_disk_manager();
        assert!(disk_manager.write_page(0, &[0; 16]).is_err());
    }
}
