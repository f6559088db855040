//! One snapshot-and-diff run
//!
//! A [`Session`] ties the pieces together: it loads the previous catalog,
//! walks the root, hashes into a fresh catalog, diffs the two, optionally
//! replicates changed files and writes the new snapshot. Both catalogs live
//! only for the duration of [`Session::run`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use usbdiff::SessionBuilder;
//!
//! # fn main() -> usbdiff::Result<()> {
//! let session = SessionBuilder::new("/media/usb")
//!     .snapshot_path("/var/lib/usbdiff/usb.json")
//!     .parallel_workers(4)
//!     .build()?;
//!
//! let report = session.run()?;
//! for diff in report.diffs.unwrap_or_default() {
//!     println!("{}\t{}", diff.status.marker(), diff.path);
//! }
//! # Ok(())
//! # }
//! ```

use crate::catalog::ContentCatalog;
use crate::diff::{diff_catalogs, DiffPolicy};
use crate::error::{Result, UsbdiffError};
use crate::hashing::{HashingPipeline, PipelineOptions, ProgressCallback};
use crate::replicate::replicate;
use crate::scan::{scan_directory, ScanOptions};
use crate::snapshot::{load_snapshot, save_snapshot, CodecOptions};
use crate::types::{
    DecodeMode, RunReport, UsbdiffConfig, DEFAULT_BATCH_SIZE, DEFAULT_SNAPSHOT_FILE, MAX_DIFFS,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builder for configuring a [`Session`]
///
/// Defaults: snapshot at `.usbdiff.json`, one worker per CPU, batch size 8,
/// diff cap 1024, streaming decode, reuse heuristic on, snapshot written,
/// symbolic links not followed.
pub struct SessionBuilder {
    config: UsbdiffConfig,
    codec: CodecOptions,
    progress: Option<ProgressCallback>,
}

impl SessionBuilder {
    /// Start configuring a run over `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            config: UsbdiffConfig {
                root: root.into(),
                snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
                replicate_to: None,
                parallel_workers: num_cpus::get(),
                batch_size: DEFAULT_BATCH_SIZE,
                max_diffs: MAX_DIFFS,
                decode_mode: DecodeMode::default(),
                force_rehash: false,
                dry_run: false,
                follow_symlinks: false,
            },
            codec: CodecOptions::default(),
            progress: None,
        }
    }

    /// Start from a complete configuration
    pub fn from_config(config: UsbdiffConfig) -> Self {
        Self {
            config,
            codec: CodecOptions::default(),
            progress: None,
        }
    }

    /// Where the snapshot is read from and written to
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    /// Copy `Modified` files into `destination` when changes are found
    pub fn replicate_to(mut self, destination: impl Into<PathBuf>) -> Self {
        self.config.replicate_to = Some(destination.into());
        self
    }

    /// Number of hashing threads (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.config.parallel_workers = count.max(1);
        self
    }

    /// Candidates each worker claims at a time
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Cap on reported changes
    pub fn max_diffs(mut self, max: usize) -> Self {
        self.config.max_diffs = max;
        self
    }

    /// Decoder for the previous snapshot
    pub fn decode_mode(mut self, mode: DecodeMode) -> Self {
        self.config.decode_mode = mode;
        self
    }

    /// Hash every file even when size and mtime are unchanged
    pub fn force_rehash(mut self, force: bool) -> Self {
        self.config.force_rehash = force;
        self
    }

    /// Skip writing the snapshot
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Follow symbolic links while walking
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Decoder buffer settings
    pub fn codec_options(mut self, options: CodecOptions) -> Self {
        self.codec = options;
        self
    }

    /// Report hashing progress to `callback`
    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate the configuration and create the session
    ///
    /// # Errors
    ///
    /// [`UsbdiffError::InvalidConfiguration`] for a zero diff cap, a zero
    /// batch size or an empty snapshot path.
    pub fn build(self) -> Result<Session> {
        if self.config.max_diffs == 0 {
            return Err(UsbdiffError::invalid_config("max_diffs must be at least 1"));
        }
        if self.config.batch_size == 0 {
            return Err(UsbdiffError::invalid_config("batch_size must be at least 1"));
        }
        if self.config.snapshot_path.as_os_str().is_empty() {
            return Err(UsbdiffError::invalid_config("snapshot path is empty"));
        }

        debug!("Session configured: {:?}", self.config);
        Ok(Session {
            config: self.config,
            codec: self.codec,
            progress: self.progress,
        })
    }
}

/// A configured run, repeatable any number of times
pub struct Session {
    config: UsbdiffConfig,
    codec: CodecOptions,
    progress: Option<ProgressCallback>,
}

impl Session {
    /// Configuration in effect
    pub fn config(&self) -> &UsbdiffConfig {
        &self.config
    }

    /// Load, scan, hash, diff, replicate and persist
    ///
    /// # Errors
    ///
    /// - [`UsbdiffError::InvalidRoot`] if the root cannot be walked
    /// - [`UsbdiffError::ThreadPool`] if the hashing pool cannot start
    /// - [`UsbdiffError::Replication`] if the destination cannot be created
    ///
    /// A snapshot that fails to load or save is only logged.
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let config = &self.config;

        let (previous, _) = load_snapshot(&config.snapshot_path, config.decode_mode, &self.codec);
        info!("Loaded {} records from previous snapshot", previous.len());

        let scan_options = ScanOptions {
            follow_symlinks: config.follow_symlinks,
            exclude: vec![config.snapshot_path.clone()],
        };
        let candidates = scan_directory(&config.root, &scan_options)?;

        let mut pipeline = HashingPipeline::new(PipelineOptions {
            workers: config.parallel_workers,
            batch_size: config.batch_size,
            force_rehash: config.force_rehash,
        });
        if let Some(ref callback) = self.progress {
            pipeline = pipeline.with_progress(callback.clone());
        }

        let mut current = ContentCatalog::new();
        let hashing = pipeline.hash_candidates(&candidates, &previous, &mut current)?;

        let diffs = diff_catalogs(&previous, &current, &DiffPolicy::with_max_diffs(config.max_diffs));

        let replication = match (&diffs, &config.replicate_to) {
            (Some(records), Some(destination)) => Some(replicate(records, &config.root, destination)?),
            _ => None,
        };

        let stale = diffs.is_some() || stats_drifted(&previous, &current);
        let persisted = self.persist(&current, stale);

        Ok(RunReport {
            diffs,
            hashing,
            replication,
            persisted,
            previous_records: previous.len(),
            current_records: current.len(),
            duration: start.elapsed(),
        })
    }

    fn persist(&self, current: &ContentCatalog, stale: bool) -> bool {
        let path = &self.config.snapshot_path;
        if self.config.dry_run {
            debug!("Dry run, not writing {:?}", path);
            return false;
        }
        if !stale && path.exists() {
            debug!("Snapshot up to date, leaving {:?} as is", path);
            return false;
        }

        match save_snapshot(current, path) {
            Ok(()) => {
                info!("Saved snapshot with {} records to {:?}", current.len(), path);
                true
            }
            Err(e) => {
                warn!("Failed to save snapshot {:?}: {}", path, e);
                false
            }
        }
    }
}

/// Whether any known record changed size or mtime
///
/// Such records produce no diff but still have to be written back, or every
/// later run rehashes them.
fn stats_drifted(previous: &ContentCatalog, current: &ContentCatalog) -> bool {
    current.iter().any(|new| match previous.lookup(&new.path) {
        Some(old) => old.size != new.size || old.mtime != new.mtime,
        None => false,
    })
}
