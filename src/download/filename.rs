//! Filename derivation, sanitization, and unique-path resolution.
//!
//! Filenames are derived deterministically from the candidate's title and
//! URL, so re-running the crawler over unchanged discovery output produces
//! the same layout. Collisions get a numeric `_1`, `_2`, ... suffix.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::document::CandidateLink;
use crate::hash::hash_str;

/// Longest title slug kept in a derived filename.
const MAX_TITLE_CHARS: usize = 60;

/// Derives the target filename for a candidate document.
///
/// Preference order for the stem:
/// 1. Sanitized link title (truncated to 60 chars)
/// 2. Sanitized, percent-decoded last URL path segment
/// 3. `documento_<first 12 hex chars of sha256(url)>`
///
/// The extension comes from the URL path (`.pdf` for every candidate the
/// discovery engine yields) and falls back to `.pdf`.
#[must_use]
pub(crate) fn derive_filename(link: &CandidateLink) -> String {
    let extension = extension_from_url(&link.url).unwrap_or_else(|| ".pdf".to_string());

    let title_stem = {
        let cleaned = sanitize_filename_component(&link.title);
        (!cleaned.is_empty()).then(|| cleaned.chars().take(MAX_TITLE_CHARS).collect::<String>())
    };

    let stem = title_stem
        .or_else(|| stem_from_url(&link.url))
        .unwrap_or_else(|| format!("documento_{}", &hash_str(&link.url)[..12]));

    format!("{stem}{extension}")
}

/// Extracts the lowercase extension (with leading dot) from a URL path.
pub(crate) fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index..];
    if ext.len() <= 1 || ext.len() > 12 {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Sanitized stem from the percent-decoded last URL path segment.
fn stem_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last_segment).ok()?;
    let without_ext = match decoded.rfind('.') {
        Some(pos) if pos > 0 => &decoded[..pos],
        _ => decoded.as_ref(),
    };
    let cleaned = sanitize_filename_component(without_ext);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Reduces a string to a filesystem-safe filename component.
///
/// Whitespace, control characters, and filesystem-reserved characters
/// collapse to single underscores; leading/trailing underscores are
/// trimmed.
pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// `doc.pdf` taken means `doc_1.pdf`, then `doc_2.pdf`, and so on.
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = if is_safe_filename_segment(filename) && !filename.is_empty() {
        filename.to_string()
    } else {
        // Defense in depth against path traversal; derive_filename never
        // produces separators, but callers may pass arbitrary names.
        "documento.pdf".to_string()
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    // Fallback (extremely unlikely): disambiguate by URL-independent counter
    // exhaustion; suffix with the stem's own hash.
    dir.join(format!("{stem}_{}{ext}", &hash_str(&filename)[..8]))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !name.contains('/')
        && !name.contains('\\')
        && !Path::new(name).components().any(|component| {
            matches!(
                component,
                Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        })
}
