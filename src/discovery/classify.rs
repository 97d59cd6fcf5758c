//! Document-type and year inference from URLs and link text.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::DocumentType;

/// Any 4-digit token; candidates are range-checked before acceptance.
#[allow(clippy::expect_used)]
static YEAR_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year token regex is valid"));

/// Years outside this range are assumed to be codes, not publication years.
const YEAR_RANGE: std::ops::RangeInclusive<u16> = 1900..=2100;

/// Infers the document type from keywords in the URL and link text.
///
/// More specific keywords win: a "gabarito da prova" is a gabarito. Matching
/// is case-insensitive over both inputs; anything unmatched is
/// [`DocumentType::Other`].
#[must_use]
pub(crate) fn classify_document_type(url: &str, title: &str) -> DocumentType {
    let haystack = format!("{title} {url}").to_lowercase();

    if haystack.contains("edital") {
        DocumentType::Edital
    } else if haystack.contains("gabarito") {
        DocumentType::Gabarito
    } else if haystack.contains("resultado") {
        DocumentType::Resultado
    } else if haystack.contains("prova") || haystack.contains("caderno") {
        DocumentType::Prova
    } else {
        DocumentType::Other
    }
}

/// Infers the publication year: the first 4-digit token in [1900, 2100],
/// searching the title before the URL (titles carry the human-written
/// year; URLs are full of unrelated numeric ids).
#[must_use]
pub(crate) fn infer_year(url: &str, title: &str) -> Option<u16> {
    year_in(title).or_else(|| year_in(url))
}

fn year_in(text: &str) -> Option<u16> {
    YEAR_TOKEN_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u16>().ok())
        .find(|year| YEAR_RANGE.contains(year))
}

/// Returns whether the URL path ends in `.pdf` (case-insensitive).
#[must_use]
pub(crate) fn is_pdf_url(url: &url::Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}
