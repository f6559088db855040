//! Directory walking
//!
//! Produces the flat candidate list the hashing pipeline consumes. Only
//! regular files are reported. Paths are kept exactly as the walker builds
//! them from `root`, so running against `./usb` and `/media/usb` yields
//! different catalog keys.

use crate::error::{Result, UsbdiffError};
use crate::types::CandidateFile;
use crate::utils::mtime_secs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Options for [`scan_directory`]
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Follow symbolic links to files and directories
    pub follow_symlinks: bool,
    /// Files to leave out, such as the snapshot itself
    pub exclude: Vec<PathBuf>,
}

impl ScanOptions {
    /// Add a path to the exclusion list
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }
}

/// Matches walker entries against excluded files
struct Exclusions {
    literal: Vec<PathBuf>,
    canonical: Vec<PathBuf>,
}

impl Exclusions {
    fn new(paths: &[PathBuf]) -> Self {
        Self {
            literal: paths.to_vec(),
            canonical: paths.iter().filter_map(|p| p.canonicalize().ok()).collect(),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        if self.literal.iter().any(|p| p == path) {
            return true;
        }
        // Only pay for canonicalization when a file name matches
        let name = path.file_name();
        if !self.canonical.iter().any(|p| p.file_name() == name) {
            return false;
        }
        path.canonicalize()
            .map(|c| self.canonical.contains(&c))
            .unwrap_or(false)
    }
}

/// List every regular file under `root`
///
/// Unreadable entries are logged and skipped.
///
/// # Errors
///
/// [`UsbdiffError::InvalidRoot`] if `root` is missing or not a directory.
pub fn scan_directory(root: &Path, options: &ScanOptions) -> Result<Vec<CandidateFile>> {
    if !root.is_dir() {
        return Err(UsbdiffError::InvalidRoot(root.to_path_buf()));
    }

    let start = Instant::now();
    let exclusions = Exclusions::new(&options.exclude);
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).follow_links(options.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walk error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if exclusions.contains(entry.path()) {
            trace!("Excluding {:?}", entry.path());
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to stat {:?}: {}", entry.path(), e);
                continue;
            }
        };
        let mtime = match metadata.modified() {
            Ok(t) => mtime_secs(t),
            Err(e) => {
                warn!("No modification time for {:?}: {}", entry.path(), e);
                continue;
            }
        };

        candidates.push(CandidateFile::new(
            entry.path().to_string_lossy(),
            metadata.len(),
            mtime,
        ));
    }

    debug!(
        "Found {} files under {:?} in {:?}",
        candidates.len(),
        root,
        start.elapsed()
    );
    Ok(candidates)
}
