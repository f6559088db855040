//! Core data types used throughout usbdiff
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Catalog contents**: `ContentRecord`, `CandidateFile` - a file as hashed and as walked
//! - **Change detection**: `DiffRecord`, `DiffStatus`, `DiffSummary` - what changed between runs
//! - **Configuration**: `UsbdiffConfig`, `DecodeMode` - parameters of a run
//! - **Results**: `HashingStats`, `DecodeStats`, `ReplicationReport`, `RunReport`
//!
//! ## Examples
//!
//! ```rust
//! use usbdiff::types::{ContentRecord, DiffRecord, DiffStatus};
//!
//! let record = ContentRecord::new("docs/a.txt", "ab".repeat(32), 10, 1_700_000_000);
//! assert_eq!(record.content_hash.len(), 64);
//!
//! let change = DiffRecord::modified("docs/a.txt");
//! assert_eq!(change.status, DiffStatus::Modified);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default snapshot file name, relative to the working directory
pub const DEFAULT_SNAPSHOT_FILE: &str = ".usbdiff.json";

/// Default cap on emitted diff records
pub const MAX_DIFFS: usize = 1024;

/// Default number of candidates a hashing worker claims at once
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// A path's content hash, size and modification time at its last hashing
///
/// Records are never mutated in place; a changed file gets a whole new record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContentRecord {
    /// Path as supplied by the walker (not canonicalized)
    pub path: String,
    /// Lowercase hex SHA-256 of the file content (64 chars)
    pub content_hash: String,
    /// File size in bytes
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub mtime: i64,
}

impl ContentRecord {
    /// Create a new record
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            size,
            mtime,
        }
    }

    /// Whether `candidate` has the exact size and mtime this record was hashed at
    pub fn matches_stat(&self, candidate: &CandidateFile) -> bool {
        self.size == candidate.size && self.mtime == candidate.mtime
    }
}

/// A file discovered by the walker, waiting to be hashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path to open for hashing; also the catalog key
    pub path: String,
    /// Size reported by the filesystem
    pub size: u64,
    /// Modification time in epoch seconds
    pub mtime: i64,
}

impl CandidateFile {
    /// Create a new candidate
    pub fn new(path: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
        }
    }
}

/// Kind of change reported for a path
///
/// `Modified` covers both changed content and newly created files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Content changed, or the file is new
    Modified,
    /// File present in the previous snapshot but not in the current one
    Deleted,
}

impl DiffStatus {
    /// Single-character marker used in reports (`+` or `-`)
    pub fn marker(self) -> char {
        match self {
            DiffStatus::Modified => '+',
            DiffStatus::Deleted => '-',
        }
    }
}

/// One reported change between two catalogs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffRecord {
    /// Path of the changed file
    pub path: String,
    /// What happened to it
    pub status: DiffStatus,
}

impl DiffRecord {
    /// A `Modified` record
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: DiffStatus::Modified,
        }
    }

    /// A `Deleted` record
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: DiffStatus::Deleted,
        }
    }
}

/// Counts of each change kind in a diff
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of `Modified` records (changed or new)
    pub modified: usize,
    /// Number of `Deleted` records
    pub deleted: usize,
}

impl DiffSummary {
    /// Tally a list of diff records
    pub fn from_records(records: &[DiffRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                DiffStatus::Modified => acc.modified += 1,
                DiffStatus::Deleted => acc.deleted += 1,
            }
            acc
        })
    }

    /// Total number of records
    pub fn total(&self) -> usize {
        self.modified + self.deleted
    }
}

/// Counters produced by the hashing pipeline
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingStats {
    /// Files whose digest was computed from content
    pub hashed: usize,
    /// Files whose digest was reused from the previous catalog
    pub reused: usize,
    /// Files that could not be opened or read
    pub skipped: usize,
}

impl HashingStats {
    /// Number of files that made it into the catalog
    pub fn recorded(&self) -> usize {
        self.hashed + self.reused
    }
}

/// Progress information for long-running operations
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Number of items processed so far
    pub processed: usize,
    /// Total number of items (if known)
    pub total: Option<usize>,
}

/// Which snapshot decoder to use when loading the previous catalog
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Read the whole file (up to a ceiling) and parse it in one go
    Bulk,
    /// Read in chunks, parsing complete fragments as they arrive
    #[default]
    Streaming,
}

/// Statistics gathered while decoding a snapshot
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodeStats {
    /// Complete top-level values recognized and parsed
    pub fragments: usize,
    /// Fragments that were recognized but failed to parse
    pub failed_fragments: usize,
    /// Records upserted into the catalog
    pub records: usize,
    /// Document entries ignored because of a wrong shape
    pub skipped_entries: usize,
    /// Whether incomplete data was left over at end of input
    pub trailing_garbage: bool,
}

/// Outcome of copying changed files to a replication target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Files copied successfully
    pub files_copied: usize,
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Records not eligible for copying (deleted, or outside the root)
    pub files_skipped: usize,
    /// Per-file failures, as human-readable messages
    pub failures: Vec<String>,
}

/// Configuration for a usbdiff run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbdiffConfig {
    /// Directory to snapshot
    pub root: PathBuf,
    /// Where the snapshot is read from and written to
    pub snapshot_path: PathBuf,
    /// Copy `Modified` files here when set
    pub replicate_to: Option<PathBuf>,
    /// Number of hashing threads
    pub parallel_workers: usize,
    /// Candidates claimed per worker request
    pub batch_size: usize,
    /// Cap on emitted diff records
    pub max_diffs: usize,
    /// Decoder used for the previous snapshot
    pub decode_mode: DecodeMode,
    /// Hash every file even when size and mtime are unchanged
    pub force_rehash: bool,
    /// Compute and report the diff without writing the snapshot
    pub dry_run: bool,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Ordered changes, or `None` when nothing changed
    pub diffs: Option<Vec<DiffRecord>>,
    /// Hashing counters
    pub hashing: HashingStats,
    /// Result of replication, when a destination was configured and changes exist
    pub replication: Option<ReplicationReport>,
    /// Whether the current catalog was written to the snapshot path
    pub persisted: bool,
    /// Number of records loaded from the previous snapshot
    pub previous_records: usize,
    /// Number of records in the current catalog
    pub current_records: usize,
    /// Wall time of the run
    pub duration: Duration,
}

impl RunReport {
    /// Whether any change was detected
    pub fn has_changes(&self) -> bool {
        self.diffs.is_some()
    }

    /// Count of changes by kind
    pub fn summary(&self) -> DiffSummary {
        self.diffs
            .as_deref()
            .map(DiffSummary::from_records)
            .unwrap_or_default()
    }
}
