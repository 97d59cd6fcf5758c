//! Content hashing utilities for deduplication and integrity checks.
//!
//! All digests are SHA-256, rendered as lowercase hex. Files are read in
//! fixed-size chunks so hashing a large PDF never loads it whole into memory.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read buffer size for chunked file hashing (8 KiB).
const HASH_CHUNK_SIZE: usize = 8192;

/// Computes the SHA-256 digest of a file's bytes.
///
/// The file is read in [`HASH_CHUNK_SIZE`] chunks. The same file always
/// produces the same digest; files with different content produce different
/// digests with overwhelming probability.
///
/// # Errors
///
/// Returns [`std::io::Error`] if the file cannot be opened or read.
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Computes the SHA-256 digest of a byte slice.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Computes the SHA-256 digest of a UTF-8 string.
#[must_use]
pub fn hash_str(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Verifies that a file's content matches an expected digest.
///
/// Comparison is case-insensitive on the hex encoding. Returns `false` for
/// unreadable files rather than erroring; callers that need the distinction
/// should use [`hash_file`] directly.
pub async fn verify_file_integrity(path: &Path, expected_hash: &str) -> bool {
    match hash_file(path).await {
        Ok(actual) => actual.eq_ignore_ascii_case(expected_hash),
        Err(_) => false,
    }
}
