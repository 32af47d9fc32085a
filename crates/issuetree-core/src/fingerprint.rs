//! Content fingerprints for cross-run duplicate detection.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Number of leading body characters that take part in the fingerprint.
pub const BODY_PREFIX_CHARS: usize = 100;

/// SHA-256 over `repo|title|body-prefix`, lowercase hex (64 chars).
///
/// The repository is trimmed and lowercased, the title trimmed, and only the
/// first [`BODY_PREFIX_CHARS`] characters of the trimmed body count. A missing
/// body and an empty body fingerprint identically.
pub fn fingerprint(repository: &str, title: &str, body: Option<&str>) -> String {
    let repo = repository.trim().to_lowercase();
    let title = title.trim();
    let body_preview: String = body
        .map(|b| b.trim().chars().take(BODY_PREFIX_CHARS).collect())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(repo.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(body_preview.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Streaming SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
