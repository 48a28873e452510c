#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Number of page frames owned by the pool.
    pub pool_size: usize,
    /// History depth of the LRU-K replacer.
    pub replacer_k: usize,
    /// Capacity of each extendible-hash bucket in the page table.
    pub bucket_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            pool_size: 5000,
            replacer_k: 2,
            bucket_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IoSchedulerConfig {
    /// Number of I/O worker threads.
    pub workers: usize,
}

impl IoSchedulerConfig {
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for IoSchedulerConfig {
    fn default() -> Self {
        IoSchedulerConfig {
            workers: Self::default_workers(),
        }
    }
}
