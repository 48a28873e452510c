//! Write-ahead-log integration point for the buffer pool.
//!
//! The pool never generates WAL records itself; it only enforces the
//! WAL-before-data rule on write-back. A storage engine wires its log
//! manager in through this trait.

use crate::error::VellumResult;

/// Log sequence number. 0 means "no WAL record touches this page".
pub type Lsn = u64;

pub trait LogManager: Send + Sync + std::fmt::Debug {
    /// Highest LSN known to be durable.
    fn flushed_lsn(&self) -> Lsn;

    /// Block until all records up to and including `lsn` are durable.
    fn flush_until(&self, lsn: Lsn) -> VellumResult<()>;
}
