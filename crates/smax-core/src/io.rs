// crates/smax-core/src/io.rs
// ============================================================================
// Module: Bounded Input Reads
// Description: Size, deadline, and cancellation limits for offline file reads.
// Purpose: Keep envelope and log ingestion bounded at every I/O boundary.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Envelope construction and log parsing are the only blocking operations in
//! the model. Every file read goes through an [`IoBudget`], which enforces a
//! hard size limit and checks an optional deadline and cancel flag before the
//! read starts. Budgets are cheap to clone and share one cancel flag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum size of a single input file (64 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised at a bounded I/O boundary.
#[derive(Debug, Error)]
pub enum IoBoundaryError {
    /// Underlying filesystem failure.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Source I/O error.
        #[source]
        source: std::io::Error,
    },
    /// File exceeds the configured size limit.
    #[error("{path} is {size} bytes, exceeding the {limit} byte limit")]
    TooLarge {
        /// Path being read.
        path: PathBuf,
        /// Observed size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
    /// File is not valid UTF-8 text.
    #[error("{path} is not valid utf-8")]
    NotUtf8 {
        /// Path being read.
        path: PathBuf,
    },
    /// The budget deadline elapsed before the read started.
    #[error("i/o deadline exceeded after {elapsed_ms} ms")]
    TimedOut {
        /// Milliseconds elapsed since the budget was created.
        elapsed_ms: u128,
    },
    /// The cancel flag was raised.
    #[error("i/o cancelled")]
    Cancelled,
}

// ============================================================================
// SECTION: Budget
// ============================================================================

/// Size, deadline, and cancellation limits applied to a batch of reads.
///
/// # Invariants
/// - `max_file_bytes` applies to each file independently.
/// - The deadline is absolute; it is fixed when the budget is created.
#[derive(Debug, Clone)]
pub struct IoBudget {
    /// Maximum bytes accepted from a single file.
    max_file_bytes: usize,
    /// Instant the budget was created.
    started: Instant,
    /// Absolute deadline for the whole batch.
    deadline: Option<Instant>,
    /// Shared cancel flag.
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for IoBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl IoBudget {
    /// Returns a budget with the default size limit and no deadline.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            started: Instant::now(),
            deadline: None,
            cancel: None,
        }
    }

    /// Overrides the per-file size limit.
    #[must_use]
    pub const fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Attaches a cancel flag shared with the caller.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the per-file size limit.
    #[must_use]
    pub const fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Fails when the batch has been cancelled or its deadline has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`IoBoundaryError::Cancelled`] or [`IoBoundaryError::TimedOut`].
    pub fn check(&self) -> Result<(), IoBoundaryError> {
        if let Some(cancel) = &self.cancel
            && cancel.load(Ordering::Relaxed)
        {
            return Err(IoBoundaryError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(IoBoundaryError::TimedOut {
                elapsed_ms: self.started.elapsed().as_millis(),
            });
        }
        Ok(())
    }

    /// Reads a file as UTF-8 text after checking the budget.
    ///
    /// # Errors
    ///
    /// Returns [`IoBoundaryError`] when the budget is exhausted, the file is
    /// too large, unreadable, or not UTF-8.
    pub fn read_to_string(&self, path: &Path) -> Result<String, IoBoundaryError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| IoBoundaryError::NotUtf8 {
            path: path.to_path_buf(),
        })
    }

    /// Reads a file's bytes after checking the budget.
    ///
    /// # Errors
    ///
    /// Returns [`IoBoundaryError`] when the budget is exhausted, the file is
    /// too large, or unreadable.
    pub fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, IoBoundaryError> {
        self.check()?;
        let io_err = |source| IoBoundaryError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        let limit = u64::try_from(self.max_file_bytes).unwrap_or(u64::MAX);
        if size > limit {
            return Err(IoBoundaryError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_file_bytes,
            });
        }

        let mut limited = file.take(limit.saturating_add(1));
        let mut bytes = Vec::new();
        limited.read_to_end(&mut bytes).map_err(io_err)?;
        if bytes.len() > self.max_file_bytes {
            return Err(IoBoundaryError::TooLarge {
                path: path.to_path_buf(),
                size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                limit: self.max_file_bytes,
            });
        }
        Ok(bytes)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only assertions are permitted."
    )]

    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::IoBoundaryError;
    use super::IoBudget;

    #[test]
    fn rejects_files_over_the_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.log");
        fs::write(&path, vec![b'x'; 32]).expect("write");
        let budget = IoBudget::unbounded().with_max_file_bytes(16);
        let err = budget.read_bytes(&path).expect_err("too large");
        assert!(matches!(err, IoBoundaryError::TooLarge { size: 32, limit: 16, .. }));
    }

    #[test]
    fn cancel_flag_stops_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.log");
        fs::write(&path, "hello").expect("write");
        let flag = Arc::new(AtomicBool::new(false));
        let budget = IoBudget::unbounded().with_cancel_flag(Arc::clone(&flag));
        assert_eq!(budget.read_to_string(&path).expect("read"), "hello");
        flag.store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(matches!(budget.read_to_string(&path), Err(IoBoundaryError::Cancelled)));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let budget = IoBudget::unbounded().with_timeout(Duration::ZERO);
        assert!(matches!(budget.check(), Err(IoBoundaryError::TimedOut { .. })));
    }
}
