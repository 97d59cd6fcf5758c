//! Data model for discovered and downloaded documents.
//!
//! A [`CandidateLink`] is what discovery yields: a URL plus whatever metadata
//! can be inferred without fetching the document. A [`DocumentRecord`] is the
//! persisted form: created from a candidate, enriched by the download engine,
//! and finally stored in the index.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Category of an exam document, inferred from its URL and link text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Call for applications (exam announcement).
    Edital,
    /// Exam paper.
    Prova,
    /// Answer key.
    Gabarito,
    /// Results listing.
    Resultado,
    /// Anything that could not be classified.
    Other,
}

impl DocumentType {
    /// Stable lowercase name, matching the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edital => "edital",
            Self::Prova => "prova",
            Self::Gabarito => "gabarito",
            Self::Resultado => "resultado",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document URL discovered during crawling, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    /// Absolute URL of the candidate document.
    pub url: String,
    /// Title taken from the link text, or the last URL path segment.
    pub title: String,
    /// Document type inferred from URL and title keywords.
    pub document_type: DocumentType,
    /// Publication year inferred from a 4-digit token, when present.
    pub year: Option<u16>,
}

/// Metadata for one discovered/downloaded document.
///
/// Field names match the persisted index format. `local_path`, `file_hash`,
/// `file_size` and `download_date` are absent until the download engine
/// enriches the record via [`DocumentRecord::mark_downloaded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Opaque unique identifier, generated at creation, immutable.
    pub id: String,
    pub title: String,
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Origin URL, immutable once set.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Lowercase hex SHA-256 of the file bytes; the deduplication key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_date: Option<DateTime<Utc>>,
    pub source_domain: String,
    /// Open mapping for metadata that has no dedicated field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_metadata: BTreeMap<String, serde_json::Value>,
}

impl DocumentRecord {
    /// Creates a record from a discovered candidate link.
    ///
    /// The id is a fresh UUID v4; the source domain is taken from the URL
    /// host (empty string for URLs without one, which discovery never
    /// produces).
    #[must_use]
    pub fn from_candidate(link: &CandidateLink) -> Self {
        let source_domain = Url::parse(&link.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4().to_string(),
            title: link.title.clone(),
            document_type: link.document_type,
            year: link.year,
            url: link.url.clone(),
            local_path: None,
            file_hash: None,
            file_size: None,
            download_date: None,
            source_domain,
            additional_metadata: BTreeMap::new(),
        }
    }

    /// Enriches the record after a successful download.
    ///
    /// Sets the local path, content hash, size, and stamps the download
    /// date with the current UTC time.
    pub fn mark_downloaded(&mut self, local_path: PathBuf, file_hash: String, file_size: u64) {
        self.local_path = Some(local_path);
        self.file_hash = Some(file_hash);
        self.file_size = Some(file_size);
        self.download_date = Some(Utc::now());
    }

    /// Whether the record has been enriched with download results.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some() && self.file_hash.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn candidate() -> CandidateLink {
        CandidateLink {
            url: "https://www.cebraspe.org.br/concursos/edital_2024.pdf".to_string(),
            title: "Edital de Abertura 2024".to_string(),
            document_type: DocumentType::Edital,
            year: Some(2024),
        }
    }

    #[test]
    fn test_document_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DocumentType::Edital).unwrap(),
            "\"edital\""
        );
        assert_eq!(
            serde_json::to_string(&DocumentType::Other).unwrap(),
            "\"other\""
        );
    }

    #[test]
    fn test_document_type_round_trips() {
        for ty in [
            DocumentType::Edital,
            DocumentType::Prova,
            DocumentType::Gabarito,
            DocumentType::Resultado,
            DocumentType::Other,
        ] {
            let json = serde_json::to_string(&ty).unwrap();
            let back: DocumentType = serde_json::from_str(&json).unwrap();
            assert_eq!(ty, back);
        }
    }

    #[test]
    fn test_from_candidate_populates_identity_fields() {
        let record = DocumentRecord::from_candidate(&candidate());

        assert_eq!(record.title, "Edital de Abertura 2024");
        assert_eq!(record.document_type, DocumentType::Edital);
        assert_eq!(record.year, Some(2024));
        assert_eq!(record.source_domain, "www.cebraspe.org.br");
        assert!(!record.id.is_empty());
        assert!(!record.is_downloaded());
    }

    #[test]
    fn test_from_candidate_generates_unique_ids() {
        let a = DocumentRecord::from_candidate(&candidate());
        let b = DocumentRecord::from_candidate(&candidate());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_mark_downloaded_enriches_record() {
        let mut record = DocumentRecord::from_candidate(&candidate());
        record.mark_downloaded(PathBuf::from("/data/pdfs/edital_2024.pdf"), "ab12".into(), 4096);

        assert!(record.is_downloaded());
        assert_eq!(record.file_size, Some(4096));
        assert_eq!(record.file_hash.as_deref(), Some("ab12"));
        assert!(record.download_date.is_some());
    }

    #[test]
    fn test_record_json_round_trip() {
        let mut record = DocumentRecord::from_candidate(&candidate());
        record.mark_downloaded(PathBuf::from("/data/pdfs/edital_2024.pdf"), "ab12".into(), 4096);
        record
            .additional_metadata
            .insert("banca".to_string(), serde_json::json!("cebraspe"));

        let json = serde_json::to_string(&record).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_record_serialized_field_names() {
        let record = DocumentRecord::from_candidate(&candidate());
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();

        assert!(obj.contains_key("document_type"));
        assert!(obj.contains_key("source_domain"));
        // Absent-until-download fields are omitted entirely
        assert!(!obj.contains_key("file_hash"));
        assert!(!obj.contains_key("local_path"));
    }
}
