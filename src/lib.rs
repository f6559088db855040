//! # usbdiff - Content-hash snapshots and change detection for directory trees
//!
//! usbdiff records a content fingerprint of every file under a directory,
//! stores it as a JSON snapshot, and on the next run reports which files were
//! modified, added or deleted since then. Changed files can optionally be
//! copied to a second location, which makes it suitable for incremental
//! backups and removable-drive watchers.
//!
//! ## Overview
//!
//! A run goes through these stages:
//!
//! 1. **Load**: the previous snapshot is decoded into a [`ContentCatalog`].
//!    The streaming decoder recovers every complete fragment of a truncated
//!    file.
//! 2. **Scan**: the root is walked into a flat list of candidate files.
//! 3. **Hash**: a worker pool fills a second catalog with SHA-256 digests,
//!    reusing the previous digest when size and mtime are unchanged.
//! 4. **Diff**: the two catalogs are reconciled into an ordered, capped list
//!    of changes.
//! 5. **Replicate and persist**: changed files are copied if requested and
//!    the new catalog becomes the next snapshot.
//!
//! ## Architecture
//!
//! - **Catalog** ([`catalog`]): fixed 4096-bucket chained index with a stable
//!   iteration order
//! - **Snapshot codec** ([`snapshot`], [`fragment`]): bulk and bounded-memory
//!   streaming JSON decoding
//! - **Diff engine** ([`diff`]): two-pass reconciliation under a configurable
//!   cap
//! - **Hashing pipeline** ([`hashing`]): rayon workers sharing an atomic
//!   cursor and a single catalog lock
//! - **Session** ([`session`]): owns both catalogs for one run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use usbdiff::{DiffStatus, SessionBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionBuilder::new("/media/usb")
//!     .snapshot_path(".usbdiff.json")
//!     .replicate_to("/backup/usb")
//!     .build()?;
//!
//! let report = session.run()?;
//! match report.diffs {
//!     Some(diffs) => {
//!         for d in diffs {
//!             let kind = if d.status == DiffStatus::Deleted { "deleted" } else { "changed" };
//!             println!("{kind}: {}", d.path);
//!         }
//!     }
//!     None => println!("No changes"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the core directly
//!
//! ```rust
//! use usbdiff::{diff_catalogs, ContentCatalog, DiffPolicy, DiffRecord};
//!
//! let mut previous = ContentCatalog::new();
//! previous.upsert("a.txt", "11".repeat(32), 10, 100);
//!
//! let mut current = ContentCatalog::new();
//! current.upsert("a.txt", "22".repeat(32), 10, 100);
//! current.upsert("b.txt", "33".repeat(32), 5, 200);
//!
//! let diffs = diff_catalogs(&previous, &current, &DiffPolicy::default()).unwrap();
//! // Records follow bucket order, and b.txt hashes to an earlier bucket
//! assert_eq!(diffs, vec![DiffRecord::modified("b.txt"), DiffRecord::modified("a.txt")]);
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod diff;
pub mod error;
pub mod fragment;
pub mod hashing;
pub mod replicate;
pub mod scan;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod utils;

pub use catalog::ContentCatalog;
pub use diff::{diff_catalogs, DiffPolicy};
pub use error::{Result, UsbdiffError};
pub use hashing::{FileHasher, HashingPipeline, PipelineOptions, Sha256Hasher};
pub use session::{Session, SessionBuilder};
pub use snapshot::{CodecOptions, StreamDecoder};
pub use types::*;
