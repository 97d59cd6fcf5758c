//! Local storage layout management.
//!
//! The [`StorageManager`] owns the on-disk layout: it creates the data and
//! PDF directories, verifies they are writable before the pipeline commits
//! to a run, accounts for used disk space, and sweeps temp-file leftovers
//! from interrupted downloads.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::CrawlerConfig;

/// Suffix used for in-progress download files.
pub const TEMP_SUFFIX: &str = ".part";

/// Name of the probe file used to verify writability.
const WRITE_PROBE_NAME: &str = ".write_probe";

/// Errors raised by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A required directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The storage directory exists but rejects writes.
    #[error("storage directory {path} is not writable: {source}")]
    NotWritable {
        /// The unwritable directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A file could not be removed.
    #[error("cannot remove {path}: {source}")]
    Remove {
        /// The file that could not be removed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Manages the local directory layout for one crawler installation.
#[derive(Debug)]
pub struct StorageManager {
    output_dir: PathBuf,
    pdfs_dir: PathBuf,
    index_parent: Option<PathBuf>,
}

impl StorageManager {
    /// Creates a manager for the directories named in the configuration.
    #[must_use]
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            output_dir: config.output_dir().to_path_buf(),
            pdfs_dir: config.pdfs_dir().to_path_buf(),
            index_parent: config.index_file().parent().map(Path::to_path_buf),
        }
    }

    /// Creates the directory layout and verifies it accepts writes.
    ///
    /// Called once at the start of a run so that an unwritable disk fails
    /// the pipeline before any network work happens. The writability check
    /// creates and removes a probe file in the PDF directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CreateDir`] or [`StorageError::NotWritable`];
    /// both are fatal to the run.
    pub fn prepare(&self) -> Result<(), StorageError> {
        for dir in self.managed_dirs() {
            std::fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        let probe = self.pdfs_dir.join(WRITE_PROBE_NAME);
        std::fs::write(&probe, b"probe").map_err(|source| StorageError::NotWritable {
            path: self.pdfs_dir.clone(),
            source,
        })?;
        if let Err(e) = std::fs::remove_file(&probe) {
            // The probe itself succeeded, so the directory is usable.
            warn!(path = %probe.display(), error = %e, "failed to remove write probe");
        }

        debug!(
            output_dir = %self.output_dir.display(),
            pdfs_dir = %self.pdfs_dir.display(),
            "storage prepared"
        );
        Ok(())
    }

    /// Directory where downloaded PDFs land.
    #[must_use]
    pub fn pdfs_dir(&self) -> &Path {
        &self.pdfs_dir
    }

    /// Total size in bytes of all files under the PDF directory.
    #[must_use]
    pub fn used_space(&self) -> u64 {
        WalkDir::new(&self.pdfs_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Removes leftover `.part` files from interrupted downloads.
    ///
    /// Returns how many files were removed. Individual removal failures are
    /// logged and skipped.
    pub fn cleanup_temp_files(&self) -> usize {
        let mut cleaned = 0;
        let entries = match std::fs::read_dir(&self.pdfs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.pdfs_dir.display(), error = %e, "cannot scan for temp files");
                return 0;
            }
        };

        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
            if !is_temp {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed stale temp file");
                    cleaned += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove temp file"),
            }
        }

        cleaned
    }

    /// Removes a stored file (used to discard duplicate downloads).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Remove`] if the file exists but cannot be
    /// deleted. A missing file is not an error.
    pub fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn managed_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.output_dir.clone(), self.pdfs_dir.clone()];
        if let Some(parent) = &self.index_parent
            && !parent.as_os_str().is_empty()
        {
            dirs.push(parent.clone());
        }
        dirs
    }
}
