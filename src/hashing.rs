//! Concurrent content hashing
//!
//! [`HashingPipeline`] turns the walker's flat list of [`CandidateFile`]s into
//! records in the current [`ContentCatalog`].
//!
//! ## How it works
//!
//! - A dedicated rayon pool runs `workers` threads inside one scope.
//! - Workers claim work by advancing a shared atomic cursor by `batch_size`,
//!   so each candidate is handled by exactly one worker.
//! - For each candidate a worker first checks the previous catalog. When the
//!   size and mtime match the previous record, its digest is reused and the
//!   file is not read.
//! - Otherwise the [`FileHasher`] computes a fresh digest. A file that cannot
//!   be read is logged and left out of the catalog.
//! - All writes to the current catalog go through a single mutex. Hashing
//!   itself happens outside the lock.
//!
//! [`HashingPipeline::hash_candidates`] returns only after every worker has
//! finished, so the catalog is complete when the caller sees it.
//!
//! ## Reuse heuristic
//!
//! Reuse trusts size and mtime. A file rewritten with the same length inside
//! the same second keeps its old digest and its change goes unreported. Set
//! [`PipelineOptions::force_rehash`] to hash every file regardless.

use crate::catalog::ContentCatalog;
use crate::error::Result;
use crate::types::{CandidateFile, ContentRecord, HashingStats, ProgressInfo, DEFAULT_BATCH_SIZE};
use crate::utils::{digest_file_content, digest_to_hex};
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Produces the 32-byte content digest of a file
pub trait FileHasher: Send + Sync {
    /// Digest the full content of the file at `path`
    fn digest_file(&self, path: &Path) -> io::Result<[u8; 32]>;
}

/// SHA-256 over the full file content
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl FileHasher for Sha256Hasher {
    fn digest_file(&self, path: &Path) -> io::Result<[u8; 32]> {
        digest_file_content(path)
    }
}

/// Callback invoked as candidates are processed
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Tunables for the hashing pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of worker threads
    pub workers: usize,
    /// Candidates claimed per cursor advance
    pub batch_size: usize,
    /// Ignore the previous catalog and hash every file
    pub force_rehash: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
            force_rehash: false,
        }
    }
}

#[derive(Default)]
struct Counters {
    hashed: AtomicUsize,
    reused: AtomicUsize,
    skipped: AtomicUsize,
    processed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> HashingStats {
        HashingStats {
            hashed: self.hashed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Worker pool that fills a catalog from candidate files
pub struct HashingPipeline<H: FileHasher = Sha256Hasher> {
    hasher: H,
    options: PipelineOptions,
    progress: Option<ProgressCallback>,
}

impl HashingPipeline<Sha256Hasher> {
    /// Pipeline using SHA-256
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_hasher(Sha256Hasher, options)
    }
}

impl<H: FileHasher> HashingPipeline<H> {
    /// Pipeline using a custom hasher
    pub fn with_hasher(hasher: H, options: PipelineOptions) -> Self {
        Self {
            hasher,
            options,
            progress: None,
        }
    }

    /// Report progress after every candidate
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Options in effect
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Hash or reuse every candidate and upsert the results into `current`
    ///
    /// # Arguments
    ///
    /// * `candidates` - Files found by the walker
    /// * `previous` - Catalog from the last snapshot, consulted for reuse
    /// * `current` - Catalog receiving one record per readable candidate
    ///
    /// # Returns
    ///
    /// Counts of hashed, reused and skipped files.
    ///
    /// # Errors
    ///
    /// Only a failure to start the worker pool. Per-file failures are logged
    /// and counted as skipped.
    pub fn hash_candidates(
        &self,
        candidates: &[CandidateFile],
        previous: &ContentCatalog,
        current: &mut ContentCatalog,
    ) -> Result<HashingStats> {
        if candidates.is_empty() {
            debug!("No candidates to hash");
            return Ok(HashingStats::default());
        }

        let start = Instant::now();
        let batch = self.options.batch_size.max(1);
        let workers = self
            .options
            .workers
            .max(1)
            .min(candidates.len().div_ceil(batch));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("usbdiff-hash-{i}"))
            .build()?;

        debug!(
            "Hashing {} candidates with {} workers (batch size {})",
            candidates.len(),
            workers,
            batch
        );

        let cursor = AtomicUsize::new(0);
        let counters = Counters::default();
        let sink = Mutex::new(current);

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| self.run_worker(candidates, previous, &sink, &cursor, batch, &counters));
            }
        });

        let stats = counters.snapshot();
        info!(
            "Hashed {} files, reused {}, skipped {} in {:?}",
            stats.hashed,
            stats.reused,
            stats.skipped,
            start.elapsed()
        );
        Ok(stats)
    }

    fn run_worker(
        &self,
        candidates: &[CandidateFile],
        previous: &ContentCatalog,
        sink: &Mutex<&mut ContentCatalog>,
        cursor: &AtomicUsize,
        batch: usize,
        counters: &Counters,
    ) {
        loop {
            let begin = cursor.fetch_add(batch, Ordering::Relaxed);
            if begin >= candidates.len() {
                break;
            }
            let end = (begin + batch).min(candidates.len());

            for candidate in &candidates[begin..end] {
                if let Some(record) = self.resolve(candidate, previous, counters) {
                    sink.lock().insert_record(record);
                }
                self.report(candidate, counters, candidates.len());
            }
        }
    }

    /// Produce the record for one candidate, or `None` when it is unreadable
    fn resolve(
        &self,
        candidate: &CandidateFile,
        previous: &ContentCatalog,
        counters: &Counters,
    ) -> Option<ContentRecord> {
        if !self.options.force_rehash {
            if let Some(old) = previous.lookup(&candidate.path) {
                if old.matches_stat(candidate) {
                    trace!("Reusing digest for {}", candidate.path);
                    counters.reused.fetch_add(1, Ordering::Relaxed);
                    return Some(ContentRecord::new(
                        candidate.path.as_str(),
                        old.content_hash.as_str(),
                        candidate.size,
                        candidate.mtime,
                    ));
                }
            }
        }

        match self.hasher.digest_file(Path::new(&candidate.path)) {
            Ok(digest) => {
                trace!("Hashed {}", candidate.path);
                counters.hashed.fetch_add(1, Ordering::Relaxed);
                Some(ContentRecord::new(
                    candidate.path.as_str(),
                    digest_to_hex(&digest),
                    candidate.size,
                    candidate.mtime,
                ))
            }
            Err(e) => {
                warn!("Failed to hash {}: {}", candidate.path, e);
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn report(&self, candidate: &CandidateFile, counters: &Counters, total: usize) {
        let processed = counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref callback) = self.progress {
            callback(ProgressInfo {
                operation: "Hashing files".to_string(),
                current_item: Some(candidate.path.clone()),
                processed,
                total: Some(total),
            });
        }
    }
}
