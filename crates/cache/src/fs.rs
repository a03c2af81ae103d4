//! Filesystem primitives the cache depends on
//!
//! The index only probes and creates its folder once, at construction.
//! Deleting payload files happens outside the index, see [`crate::purge`].

use std::io;
use std::path::Path;

/// Directory and file primitives used around the cache folder.
pub trait Filesystem {
    /// Whether `path` exists and is a directory
    fn directory_exists(&self, path: &Path) -> bool;

    /// Create `path` and any missing parents, returning whether it succeeded
    fn create_directory(&self, path: &Path) -> bool;

    /// Remove a single payload file
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `NotFound`.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_directory(&self, path: &Path) -> bool {
        match std::fs::create_dir_all(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), "create_dir_all failed: {e}");
                false
            }
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}
