use super::disk_manager::DiskManager;
use crate::buffer::PageId;
use crate::config::IoSchedulerConfig;
use crate::error::{VellumError, VellumResult};
use bytes::{Bytes, BytesMut};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

pub type DiskCommandResultSender<T> = Sender<VellumResult<T>>;
pub type DiskCommandResultReceiver<T> = Receiver<VellumResult<T>>;

// Commands sent from the buffer pool to the scheduler's workers.
#[derive(Debug, Clone)]
pub enum DiskRequest {
    ReadPage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<BytesMut>,
    },
    WritePage {
        page_id: PageId,
        data: Bytes,
        result_sender: DiskCommandResultSender<()>,
    },
    DeallocatePage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<()>,
    },
    Shutdown,
}

/// Background I/O in front of a [`DiskManager`]: a dispatcher thread
/// fans requests out round-robin to a fixed pool of workers, and each
/// request carries its own reply channel. Callers block on the receiver,
/// so a schedule-then-recv pair behaves like a synchronous call.
#[derive(Debug)]
pub struct DiskScheduler {
    request_sender: Sender<DiskRequest>,
    dispatcher_thread: Option<thread::JoinHandle<()>>,
    worker_threads: Vec<thread::JoinHandle<()>>,
    pub config: IoSchedulerConfig,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::new_with_config(disk_manager, IoSchedulerConfig::default())
    }

    pub fn new_with_config(disk_manager: Arc<DiskManager>, config: IoSchedulerConfig) -> Self {
        let worker_count = config.workers.max(1);
        let (request_sender, request_receiver) = mpsc::channel::<DiskRequest>();

        let mut worker_senders = Vec::with_capacity(worker_count);
        let mut worker_threads = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let (tx, rx) = mpsc::channel::<DiskRequest>();
            worker_senders.push(tx);
            let dm = disk_manager.clone();
            let handle = thread::Builder::new()
                .name(format!("disk-scheduler-worker-{}", i))
                .spawn(move || {
                    Self::io_worker_loop(rx, dm);
                })
                .expect("Failed to spawn DiskScheduler worker thread");
            worker_threads.push(handle);
        }

        let dispatcher_thread = thread::Builder::new()
            .name("disk-scheduler-dispatcher".to_string())
            .spawn(move || {
                Self::dispatcher_loop(request_receiver, worker_senders);
            })
            .expect("Failed to spawn DiskScheduler dispatcher thread");

        DiskScheduler {
            request_sender,
            dispatcher_thread: Some(dispatcher_thread),
            worker_threads,
            config,
        }
    }

    fn dispatcher_loop(receiver: Receiver<DiskRequest>, worker_senders: Vec<Sender<DiskRequest>>) {
        log::debug!("DiskScheduler dispatcher thread started.");
        let mut rr_idx: usize = 0;
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Shutdown => {
                    for tx in &worker_senders {
                        let _ = tx.send(DiskRequest::Shutdown);
                    }
                    break;
                }
                other => {
                    // Skip workers whose channel has closed.
                    let n = worker_senders.len();
                    let mut attempts = 0usize;
                    let mut sent = false;
                    while attempts < n {
                        let idx = rr_idx % n;
                        rr_idx = rr_idx.wrapping_add(1);
                        if worker_senders[idx].send(other.clone()).is_ok() {
                            sent = true;
                            break;
                        }
                        attempts += 1;
                    }
                    if !sent {
                        log::error!("All disk workers have exited; dropping request");
                        break;
                    }
                }
            }
        }
        log::debug!("DiskScheduler dispatcher thread finished.");
    }

    fn io_worker_loop(receiver: Receiver<DiskRequest>, disk_manager: Arc<DiskManager>) {
        log::debug!("Disk I/O worker thread started.");
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::ReadPage {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager
                        .read_page(page_id)
                        .map(|data| BytesMut::from(&data[..]));
                    if result_sender.send(result).is_err() {
                        log::error!("DiskScheduler failed to send ReadPage result for {}", page_id);
                    }
                }
                DiskRequest::WritePage {
                    page_id,
                    data,
                    result_sender,
                } => {
                    let result = disk_manager.write_page(page_id, &data);
                    if result_sender.send(result).is_err() {
                        log::error!(
                            "DiskScheduler failed to send WritePage result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::DeallocatePage {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager.deallocate_page(page_id);
                    if result_sender.send(result).is_err() {
                        log::error!(
                            "DiskScheduler failed to send DeallocatePage result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::Shutdown => break,
            }
        }
        log::debug!("Disk I/O worker thread finished.");
    }

    pub fn schedule_read(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<BytesMut>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::ReadPage {
                page_id,
                result_sender: tx,
            })
            .map_err(|e| VellumError::Internal(format!("Failed to send Read request: {}", e)))?;
        Ok(rx)
    }

    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Bytes,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::WritePage {
                page_id,
                data,
                result_sender: tx,
            })
            .map_err(|e| VellumError::Internal(format!("Failed to send Write request: {}", e)))?;
        Ok(rx)
    }

    pub fn schedule_deallocate(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::DeallocatePage {
                page_id,
                result_sender: tx,
            })
            .map_err(|e| {
                VellumError::Internal(format!("Failed to send Deallocate request: {}", e))
            })?;
        Ok(rx)
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_sender.send(DiskRequest::Shutdown);

        if let Some(handle) = self.dispatcher_thread.take() {
            if let Err(e) = handle.join() {
                log::error!("Disk dispatcher thread panicked: {:?}", e);
            }
        }
        for handle in self.worker_threads.drain(..) {
            if let Err(e) = handle.join() {
                log::error!("Disk worker thread panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PAGE_SIZE;
    use std::thread;
    use tempfile::TempDir;

    fn create_test_scheduler() -> (TempDir, Arc<DiskScheduler>, Arc<DiskManager>) {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        let dm = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let scheduler = Arc::new(DiskScheduler::new(dm.clone()));
        (temp_dir, scheduler, dm)
    }

    fn page_bytes(content: &str) -> Bytes {
        let mut data = BytesMut::zeroed(PAGE_SIZE);
        let content_bytes = content.as_bytes();
        data[..content_bytes.len()].copy_from_slice(content_bytes);
        data.freeze()
    }

    fn page_content(data: &BytesMut) -> String {
        let first_null = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..first_null]).to_string()
    }

    #[test]
    fn write_then_read_through_workers() -> VellumResult<()> {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        let content = "Hello DiskScheduler!";
        scheduler
            .schedule_write(0, page_bytes(content))?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let read_result = scheduler
            .schedule_read(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        assert_eq!(page_content(&read_result), content);
        Ok(())
    }

    #[test]
    fn deallocate_clears_page_bytes() -> VellumResult<()> {
        let (_temp_dir, scheduler, dm) = create_test_scheduler();

        scheduler
            .schedule_write(1, page_bytes("Test Data"))?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        scheduler
            .schedule_deallocate(1)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        assert!(dm.read_page(1)?.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn concurrent_reads_see_the_same_page() -> VellumResult<()> {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        scheduler
            .schedule_write(2, page_bytes("Concurrent Test"))?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let mut handles = vec![];
        for _ in 0..10 {
            let scheduler_clone = scheduler.clone();
            handles.push(thread::spawn(move || {
                scheduler_clone
                    .schedule_read(2)
                    .map_err(|e| e.to_string())
                    .and_then(|rx| rx.recv().map_err(|e| e.to_string()))
                    .and_then(|res| res.map_err(|e| e.to_string()))
            }));
        }
        for handle in handles {
            let read_data = handle.join().unwrap().expect("concurrent read failed");
            assert_eq!(page_content(&read_data), "Concurrent Test");
        }
        Ok(())
    }

    #[test]
    fn requests_after_shutdown_fail_cleanly() {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();
        let scheduler_clone = scheduler.clone();

        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(100));
            scheduler_clone
                .schedule_read(0)
                .map_err(|e| e.to_string())
                .and_then(|rx| rx.recv().map_err(|e| e.to_string()))
                .and_then(|res| res.map_err(|e| e.to_string()))
        });

        drop(scheduler);
        // Either outcome is fine; the send or the recv may observe the
        // closed channel first.
        let _ = handle.join().unwrap();
    }
}
