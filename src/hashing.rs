//! Centralized hashing utilities.
//!
//! Two digests with deliberately different widths: the file-level hash is the
//! change-detection gatekeeper, so a false negative silently skips
//! reindexing and the full 256 bits are worth paying for. The chunk-level
//! hash only deduplicates small snippets for embedding reuse, where a fast
//! 128-bit digest is plenty.

use std::io::Read;
use std::path::Path;

use md5::{Digest as Md5Digest, Md5};
use sha2::{Digest, Sha256};

use crate::domain::error::Result;

/// Hex-encoded SHA-256 over the exact file bytes.
///
/// Reads in binary mode in 64 KiB chunks, so the result is independent of OS
/// line endings and does not load large files into memory.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Hex-encoded SHA-256 over a byte slice already in memory.
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Hex-encoded 128-bit MD5 over the UTF-8 encoding of chunk text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Deterministic short identifier: first 16 hex chars of SHA-256.
pub fn id_hash(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let full = hex_encode(&hasher.finalize());
    full[..16].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn content_hash_is_deterministic_128_bit() {
        let a = content_hash("def f():\n    return 1\n");
        let b = content_hash("def f():\n    return 1\n");
        assert_eq!(a, b);
        // 128 bits = 32 hex chars
        assert_eq!(a.len(), 32);
        assert_ne!(a, content_hash("def f():\n    return 2\n"));
    }

    #[test]
    fn file_hash_matches_bytes_hash() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello\nworld\n").unwrap();
        let from_file = file_hash(tmp.path()).unwrap();
        let from_bytes = bytes_hash(b"hello\nworld\n");
        assert_eq!(from_file, from_bytes);
        // 256 bits = 64 hex chars
        assert_eq!(from_file.len(), 64);
    }

    #[test]
    fn id_hash_is_short_and_stable() {
        let id = id_hash("src/a.py:1:10:function");
        assert_eq!(id.len(), 16);
        assert_eq!(id, id_hash("src/a.py:1:10:function"));
    }
}
