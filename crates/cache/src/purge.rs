//! Physical deletion of evicted payload files
//!
//! Runs entirely outside the index: callers take the output of
//! [`crate::CacheIndex::cleanup`] and purge it now, later, or in batches.
//! Nothing is retried here; failed files are handed back so the caller can
//! try again.

use crate::fs::Filesystem;
use crate::index::EvictedFile;
use crate::Error;
use std::io;

/// Outcome of a purge pass
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Files that were deleted
    pub removed: Vec<EvictedFile>,
    /// Files that were already gone
    pub missing: Vec<EvictedFile>,
    /// Files that could not be deleted, with the reason
    pub failed: Vec<(EvictedFile, Error)>,
}

impl PurgeReport {
    /// Whether every file is gone from disk
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Files worth handing to another purge attempt
    #[must_use]
    pub fn retryable(&self) -> Vec<EvictedFile> {
        self.failed.iter().map(|(file, _)| file.clone()).collect()
    }
}

/// Delete evicted payload files through `fs`.
pub fn purge(fs: &dyn Filesystem, files: impl IntoIterator<Item = EvictedFile>) -> PurgeReport {
    let mut report = PurgeReport::default();

    for file in files {
        match fs.remove_file(&file.path) {
            Ok(()) => {
                tracing::debug!(key = %file.key, path = %file.path.display(), "Removed evicted file");
                report.removed.push(file);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %file.path.display(), "Evicted file already gone");
                report.missing.push(file);
            }
            Err(e) => {
                tracing::warn!(
                    key = %file.key,
                    path = %file.path.display(),
                    "Failed to remove evicted file: {e}"
                );
                let err = Error::io(e, &file.path, "remove_file");
                report.failed.push((file, err));
            }
        }
    }

    report
}
