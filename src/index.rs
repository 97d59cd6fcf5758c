//! Persistent document index.
//!
//! The index is a single JSON file holding every [`DocumentRecord`] plus a
//! metadata block (schema version, last-updated timestamp, total count).
//! Saves are atomic with respect to process crash: the new content is
//! written to a temp file and renamed over the index, after copying the
//! previous version to a `.backup` sibling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::document::{DocumentRecord, DocumentType};

/// Version written into the metadata block of new indexes.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Errors raised by index persistence.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index file exists but cannot be read.
    #[error("cannot read index file {path}: {source}")]
    Read {
        /// Path of the index file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The index file exists but is not valid JSON of the expected shape.
    ///
    /// Raised instead of silently discarding data; the operator must decide
    /// whether to restore the backup or delete the file.
    #[error("index file {path} is corrupt: {source}")]
    Corrupt {
        /// Path of the corrupt index file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the new index (temp file, rename, or backup copy) failed.
    #[error("cannot write index file {path}: {source}")]
    Write {
        /// Path being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Metadata block persisted alongside the documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_documents: usize,
}

impl Default for IndexMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: now,
            last_updated: now,
            total_documents: 0,
        }
    }
}

/// In-memory form of the persisted index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub metadata: IndexMetadata,
    pub documents: Vec<DocumentRecord>,
}

impl DocumentIndex {
    /// Creates an empty index with fresh metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends records and refreshes the metadata block.
    pub fn add_documents(&mut self, records: Vec<DocumentRecord>) {
        if records.is_empty() {
            return;
        }
        self.documents.extend(records);
        self.metadata.last_updated = Utc::now();
        self.metadata.total_documents = self.documents.len();
    }

    /// Iterator over the content hashes of indexed documents.
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .filter_map(|doc| doc.file_hash.as_deref())
    }

    /// Returns whether any indexed document has the given content hash.
    #[must_use]
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes().any(|h| h == hash)
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the index holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Filter for [`IndexManager::query`]; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub document_type: Option<DocumentType>,
    pub year: Option<u16>,
    pub source_domain: Option<String>,
}

impl DocumentFilter {
    /// Matches all documents.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts matches to one document type.
    #[must_use]
    pub fn with_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    /// Restricts matches to one year.
    #[must_use]
    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    /// Restricts matches to one source domain.
    #[must_use]
    pub fn with_source_domain(mut self, domain: impl Into<String>) -> Self {
        self.source_domain = Some(domain.into());
        self
    }

    fn matches(&self, record: &DocumentRecord) -> bool {
        if let Some(ty) = self.document_type
            && record.document_type != ty
        {
            return false;
        }
        if let Some(year) = self.year
            && record.year != Some(year)
        {
            return false;
        }
        if let Some(domain) = &self.source_domain
            && !record.source_domain.eq_ignore_ascii_case(domain)
        {
            return false;
        }
        true
    }
}

/// Per-type and per-year document counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub by_type: std::collections::BTreeMap<String, usize>,
    pub by_year: std::collections::BTreeMap<u16, usize>,
}

/// Owns the index file: loads it at startup, accumulates new records, and
/// saves atomically.
///
/// Only one writer is supported; the pipeline mutates the index solely from
/// the orchestrator task.
#[derive(Debug)]
pub struct IndexManager {
    path: PathBuf,
    index: DocumentIndex,
}

impl IndexManager {
    /// Loads the index from disk.
    ///
    /// A missing file yields an empty index; this is the normal first-run
    /// path, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Read`] if the file exists but cannot be read,
    /// or [`IndexError::Corrupt`] if it cannot be parsed.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no existing index, starting empty");
                return Ok(Self {
                    path: path.to_path_buf(),
                    index: DocumentIndex::new(),
                });
            }
            Err(source) => {
                return Err(IndexError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let index: DocumentIndex =
            serde_json::from_str(&text).map_err(|source| IndexError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        info!(documents = index.len(), "index loaded");
        Ok(Self {
            path: path.to_path_buf(),
            index,
        })
    }

    /// Read access to the in-memory index.
    #[must_use]
    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    /// Appends records to the in-memory index (persist with [`save`](Self::save)).
    pub fn add_documents(&mut self, records: Vec<DocumentRecord>) {
        debug!(added = records.len(), "adding documents to index");
        self.index.add_documents(records);
    }

    /// Documents matching the filter, in index order.
    #[must_use]
    pub fn query(&self, filter: &DocumentFilter) -> Vec<&DocumentRecord> {
        self.index
            .documents
            .iter()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Aggregate counts by document type and year.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            total_documents: self.index.len(),
            ..IndexStats::default()
        };
        for doc in &self.index.documents {
            *stats
                .by_type
                .entry(doc.document_type.as_str().to_string())
                .or_default() += 1;
            if let Some(year) = doc.year {
                *stats.by_year.entry(year).or_default() += 1;
            }
        }
        stats
    }

    /// Persists the index atomically.
    ///
    /// Writes the serialized index to `<path>.tmp`, then renames it over
    /// the index file, so a crash mid-save leaves either the old or the new
    /// index intact, never a torn file. An existing index is copied to
    /// `<path>.backup` first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Write`] on any IO failure; fatal to the run.
    #[instrument(skip(self), fields(path = %self.path.display(), documents = self.index.len()))]
    pub fn save(&self) -> Result<(), IndexError> {
        let json = serde_json::to_string_pretty(&self.index).map_err(|source| {
            // Serialization of an in-memory index failing means a bug, but
            // surface it as a write failure rather than panicking.
            IndexError::Write {
                path: self.path.clone(),
                source: std::io::Error::other(source),
            }
        })?;

        if self.path.exists() {
            let backup = backup_path(&self.path);
            std::fs::copy(&self.path, &backup).map_err(|source| IndexError::Write {
                path: backup,
                source,
            })?;
        }

        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, json.as_bytes()).map_err(|source| IndexError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| IndexError::Write {
            path: self.path.clone(),
            source,
        })?;

        info!(documents = self.index.len(), "index saved");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".backup");
    PathBuf::from(os)
}
