//! Per-operation result accounting

use serde::Serialize;

use crate::error::Error;
use crate::manifest::TransferManifest;

/// Upper bound on failures kept in [`TransferResult::failures`]
///
/// Counters keep counting past this limit; only the detail list is capped.
pub const MAX_RECORDED_FAILURES: usize = 1000;

/// Progress callback invoked with `(processed, total)` after each object
pub type Progress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// One failed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    pub key: String,
    pub error: String,
}

/// Counters and failures of one batch operation
///
/// `succeeded` means imported for imports, exported for exports and copied
/// for sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub succeeded: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub failed: u64,
    pub failures: Vec<TransferFailure>,
}

impl TransferResult {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_delete(&mut self) {
        self.deleted += 1;
    }

    /// Count a failed object and keep its error if there is room
    pub fn record_failure(&mut self, key: impl Into<String>, error: &Error) {
        self.failed += 1;
        if self.failures.len() < MAX_RECORDED_FAILURES {
            self.failures.push(TransferFailure {
                key: key.into(),
                error: error.to_string(),
            });
        }
    }

    /// Number of objects attempted
    pub fn processed(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Outcome of an archive or directory export
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub manifest: TransferManifest,
    pub result: TransferResult,
}

/// Tracks `processed` and forwards it to an optional callback
pub(crate) struct ProgressTracker<'a> {
    callback: Option<Progress<'a>>,
    processed: u64,
    total: u64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(callback: Option<Progress<'a>>, total: u64) -> Self {
        Self {
            callback,
            processed: 0,
            total,
        }
    }

    pub(crate) fn tick(&mut self) {
        self.processed += 1;
        if let Some(callback) = self.callback {
            callback(self.processed, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_counters() {
        let mut result = TransferResult::default();
        result.record_success();
        result.record_success();
        result.record_skip();
        result.record_failure("bad", &Error::transfer("bad", "timeout"));

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.processed(), 4);
        assert!(result.has_failures());
        assert_eq!(result.failures[0].key, "bad");
        assert!(result.failures[0].error.contains("timeout"));
    }

    #[test]
    fn test_failure_list_is_bounded() {
        let mut result = TransferResult::default();
        let err = Error::General("x".into());
        for i in 0..(MAX_RECORDED_FAILURES + 5) {
            result.record_failure(format!("k{i}"), &err);
        }
        assert_eq!(result.failed, (MAX_RECORDED_FAILURES + 5) as u64);
        assert_eq!(result.failures.len(), MAX_RECORDED_FAILURES);
    }

    #[test]
    fn test_progress_tracker_is_monotonic() {
        let seen = Mutex::new(Vec::new());
        let callback = |done: u64, total: u64| seen.lock().unwrap().push((done, total));
        let mut tracker = ProgressTracker::new(Some(&callback), 3);
        tracker.tick();
        tracker.tick();
        tracker.tick();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }
}
