//! Copy changed files to a second location
//!
//! Every `Modified` record under the root is copied to the same relative
//! path beneath the destination. Deleted files are not removed from the
//! destination; replication only ever adds or overwrites.

use crate::error::{Result, UsbdiffError};
use crate::types::{DiffRecord, DiffStatus, ReplicationReport};
use crate::utils::make_relative;
use std::fs;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Copy the `Modified` files in `diffs` from `root` into `destination`
///
/// Per-file failures are logged, recorded in the report and do not stop the
/// remaining copies.
///
/// # Errors
///
/// [`UsbdiffError::Replication`] if the destination directory cannot be
/// created.
pub fn replicate(diffs: &[DiffRecord], root: &Path, destination: &Path) -> Result<ReplicationReport> {
    fs::create_dir_all(destination).map_err(|source| UsbdiffError::Replication {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut report = ReplicationReport::default();

    for diff in diffs {
        if diff.status == DiffStatus::Deleted {
            report.files_skipped += 1;
            continue;
        }

        let source = Path::new(&diff.path);
        let relative = match make_relative(source, root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => {
                debug!("Not replicating {:?}: outside {:?}", source, root);
                report.files_skipped += 1;
                continue;
            }
        };
        let target = destination.join(&relative);

        let copied = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(source, &target));

        match copied {
            Ok(bytes) => {
                trace!("Copied {:?} -> {:?} ({} bytes)", source, target, bytes);
                report.files_copied += 1;
                report.bytes_copied += bytes;
            }
            Err(e) => {
                warn!("Failed to replicate {:?}: {}", source, e);
                report.failures.push(format!("{}: {}", diff.path, e));
            }
        }
    }

    info!(
        "Replicated {} files ({} bytes) to {:?}, {} skipped, {} failed",
        report.files_copied,
        report.bytes_copied,
        destination,
        report.files_skipped,
        report.failures.len()
    );
    Ok(report)
}
