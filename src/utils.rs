//! Utility functions for usbdiff
//!
//! ## Categories of Utilities
//!
//! ### Hashing
//! - File content hashing (SHA-256, streamed in 4 KiB reads)
//! - Hashing of in-memory data
//!
//! ### Metadata
//! - Modification time as epoch seconds
//!
//! ### Paths and Display
//! - Converting walker paths to paths relative to the snapshot root
//! - Byte formatting (human-readable sizes)
//!
//! ## Thread Safety
//!
//! All functions are free of shared state and may be called from any number
//! of hashing workers at once.

use crate::error::{Result, UsbdiffError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read size used when hashing file content
pub const HASH_READ_SIZE: usize = 4 * 1024;

/// Hash a file's content using SHA-256
///
/// The file is read in [`HASH_READ_SIZE`] pieces, so memory use does not
/// depend on file size.
///
/// # Returns
///
/// The digest as a 64-character lowercase hexadecimal string.
///
/// # Errors
///
/// Any error opening or reading the file. Interrupted reads are retried.
///
/// # Example
///
/// ```rust,no_run
/// use usbdiff::utils::hash_file_content;
/// use std::path::Path;
///
/// # fn main() -> std::io::Result<()> {
/// let hash = hash_file_content(Path::new("notes.txt"))?;
/// assert_eq!(hash.len(), 64);
/// # Ok(())
/// # }
/// ```
pub fn hash_file_content(path: &Path) -> io::Result<String> {
    digest_file_content(path).map(|digest| digest_to_hex(&digest))
}

/// Raw SHA-256 digest of a file's content
pub fn digest_file_content(path: &Path) -> io::Result<[u8; 32]> {
    let mut file = File::open(path)?;
    digest_reader(&mut file)
}

/// Raw SHA-256 digest of everything a reader yields
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_READ_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

/// Raw SHA-256 digest of in-memory data
pub fn digest_data(data: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(data));
    digest
}

/// Hash arbitrary data using SHA-256, as lowercase hex
pub fn hash_data(data: &[u8]) -> String {
    digest_to_hex(&digest_data(data))
}

/// Lowercase hex rendering of a raw digest
pub fn digest_to_hex(digest: &[u8]) -> String {
    hex::encode(digest)
}

/// Modification time as whole seconds since the Unix epoch
///
/// Times before the epoch come out negative.
pub fn mtime_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => {
            let secs = before.duration().as_secs();
            i64::try_from(secs).map(|s| -s).unwrap_or(i64::MIN)
        }
    }
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links keep their own path, then
/// falls back to comparing canonical forms.
///
/// # Errors
///
/// - [`UsbdiffError::Internal`] if the path is not under the base path
/// - [`UsbdiffError::Io`] if canonicalization fails (fallback case only)
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            UsbdiffError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based). Values under 1 KB are whole numbers,
/// larger ones have two decimals.
///
/// ```rust
/// use usbdiff::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
