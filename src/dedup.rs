//! Content-hash deduplication.
//!
//! The [`DedupEngine`] owns the set of content hashes seen across runs. It
//! is seeded from the persisted index at startup, so a hash in the set
//! always corresponds to at least one indexed record. Hash equality is the
//! sole duplicate criterion; there is no fuzzy matching.

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use crate::document::DocumentRecord;
use crate::index::DocumentIndex;

/// Result of filtering one batch of downloaded records.
///
/// Every input record lands in exactly one of the three buckets, preserving
/// input order within each:
/// `unique.len() + duplicates.len() + errors.len() == input.len()`.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// First-seen records, in input order; their hashes are now known.
    pub unique: Vec<DocumentRecord>,
    /// Records whose hash was already known (within the batch or from a
    /// previous run).
    pub duplicates: Vec<DocumentRecord>,
    /// Records with no computable hash (e.g. the file became unreadable);
    /// counted in neither the unique nor the duplicate set.
    pub errors: Vec<DocumentRecord>,
}

/// Deduplication engine backed by a set of known content hashes.
#[derive(Debug, Default)]
pub struct DedupEngine {
    known_hashes: HashSet<String>,
}

impl DedupEngine {
    /// Creates an engine with no known hashes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine seeded from a persisted index.
    ///
    /// This is how the known-hash set survives restarts: it is rebuilt from
    /// the documents that actually made it into the index, never persisted
    /// separately.
    #[must_use]
    pub fn from_index(index: &DocumentIndex) -> Self {
        let known_hashes: HashSet<String> = index.hashes().map(str::to_string).collect();
        info!(known = known_hashes.len(), "seeded dedup engine from index");
        Self { known_hashes }
    }

    /// Returns whether the hash has been seen before.
    #[must_use]
    pub fn is_duplicate(&self, hash: &str) -> bool {
        self.known_hashes.contains(hash)
    }

    /// Inserts a hash; returns `false` if it was already present.
    ///
    /// Idempotent: inserting the same hash twice leaves the set unchanged.
    pub fn add_hash(&mut self, hash: impl Into<String>) -> bool {
        self.known_hashes.insert(hash.into())
    }

    /// Number of known hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known_hashes.len()
    }

    /// Whether no hashes are known yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known_hashes.is_empty()
    }

    /// Splits a batch into unique records, duplicates, and hash errors.
    ///
    /// Order is stable: records appear in each bucket in input order. Within
    /// a batch the first occurrence of a hash wins; later occurrences are
    /// duplicates even before anything is persisted. Records without a hash
    /// go to `errors` and do not affect the known-hash set.
    #[instrument(skip(self, records), fields(batch = records.len()))]
    pub fn filter_batch(&mut self, records: Vec<DocumentRecord>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();

        for record in records {
            let Some(hash) = record.file_hash.clone() else {
                debug!(url = %record.url, "record has no content hash, skipping");
                outcome.errors.push(record);
                continue;
            };

            if self.add_hash(hash) {
                outcome.unique.push(record);
            } else {
                debug!(url = %record.url, "duplicate content hash");
                outcome.duplicates.push(record);
            }
        }

        info!(
            unique = outcome.unique.len(),
            duplicates = outcome.duplicates.len(),
            errors = outcome.errors.len(),
            "batch filtered"
        );
        outcome
    }
}
