//! Catalog reconciliation
//!
//! [`diff_catalogs`] compares the catalog loaded from the previous snapshot
//! against the one produced by this run and reports which paths changed.
//!
//! Buckets are visited in index order. Within each bucket two passes are
//! made, with no state carried between them:
//!
//! 1. Every previous record in the bucket is looked up in the current
//!    catalog. A missing path is `Deleted`, a different digest is `Modified`.
//! 2. Every current record in the bucket is looked up in the previous
//!    catalog. A missing path is `Modified` (new file).
//!
//! Both catalogs share the bucket function, so a path lives in the same
//! bucket on either side.
//!
//! Only digests are compared. A file whose size or mtime changed but whose
//! content hashes the same is not reported.
//!
//! Once [`DiffPolicy::max_diffs`] records have been emitted the rest are
//! dropped, so the cap keeps changes from the lowest buckets.
//!
//! ## Example
//!
//! ```rust
//! use usbdiff::catalog::ContentCatalog;
//! use usbdiff::diff::{diff_catalogs, DiffPolicy};
//! use usbdiff::types::DiffStatus;
//!
//! let mut previous = ContentCatalog::new();
//! previous.upsert("gone.txt", "aa".repeat(32), 1, 1);
//!
//! let current = ContentCatalog::new();
//! let diffs = diff_catalogs(&previous, &current, &DiffPolicy::default()).unwrap();
//! assert_eq!(diffs[0].status, DiffStatus::Deleted);
//!
//! assert!(diff_catalogs(&current, &current, &DiffPolicy::default()).is_none());
//! ```

use crate::catalog::{ContentCatalog, BUCKET_COUNT};
use crate::types::{DiffRecord, MAX_DIFFS};
use tracing::{debug, trace};

/// Limits applied while emitting diff records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPolicy {
    /// Maximum number of records returned; later changes are dropped
    pub max_diffs: usize,
}

impl DiffPolicy {
    /// Policy with a custom cap
    pub fn with_max_diffs(max_diffs: usize) -> Self {
        Self { max_diffs }
    }
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self { max_diffs: MAX_DIFFS }
    }
}

/// Bounded output list that counts what it had to drop
struct Emitter {
    records: Vec<DiffRecord>,
    cap: usize,
    dropped: usize,
}

impl Emitter {
    fn new(cap: usize) -> Self {
        Self {
            records: Vec::with_capacity(cap.min(MAX_DIFFS)),
            cap,
            dropped: 0,
        }
    }

    fn emit(&mut self, record: DiffRecord) {
        if self.records.len() < self.cap {
            trace!("{} {}", record.status.marker(), record.path);
            self.records.push(record);
        } else {
            self.dropped += 1;
        }
    }
}

/// Compute the ordered changes between two catalogs
///
/// # Arguments
///
/// * `previous` - Catalog loaded from the last snapshot
/// * `current` - Catalog built by this run
/// * `policy` - Emission cap
///
/// # Returns
///
/// `None` when nothing was emitted, so callers can skip persistence and
/// replication. Otherwise the records in emission order.
pub fn diff_catalogs(
    previous: &ContentCatalog,
    current: &ContentCatalog,
    policy: &DiffPolicy,
) -> Option<Vec<DiffRecord>> {
    let mut out = Emitter::new(policy.max_diffs);

    for index in 0..BUCKET_COUNT {
        for old in previous.bucket(index) {
            match current.lookup(&old.path) {
                None => out.emit(DiffRecord::deleted(old.path.as_str())),
                Some(new) if new.content_hash != old.content_hash => {
                    out.emit(DiffRecord::modified(old.path.as_str()))
                }
                Some(_) => {}
            }
        }

        for new in current.bucket(index) {
            if !previous.contains(&new.path) {
                out.emit(DiffRecord::modified(new.path.as_str()));
            }
        }
    }

    if out.dropped > 0 {
        debug!(
            "Diff cap of {} reached, dropped {} further changes",
            policy.max_diffs, out.dropped
        );
    }

    if out.records.is_empty() {
        None
    } else {
        Some(out.records)
    }
}
