//! Digest helpers.
//!
//! Object stores report SHA-256 checksums base64-encoded; everything inside
//! vellum compares lowercase hex.

use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Convert a base64 SHA-256 checksum to lowercase hex.
pub fn base64_to_hex(encoded: &str) -> Result<String, SyncError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| SyncError::InvalidChecksum {
            value: encoded.to_string(),
        })?;
    Ok(hex::encode(bytes))
}

/// Convert a lowercase hex digest to the base64 form object stores report.
pub fn hex_to_base64(digest: &str) -> Result<String, SyncError> {
    let bytes = hex::decode(digest.trim()).map_err(|_| SyncError::InvalidChecksum {
        value: digest.to_string(),
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Base64 form of a SHA-256 digest, as an object store reports it.
pub fn sha256_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a local file through SHA-256.
pub fn sha256_file(path: &Path) -> Result<String, SyncError> {
    let mut file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `true` when two hex digests name the same content.
pub fn digests_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_HEX: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn base64_checksum_becomes_hex() {
        let b64 = sha256_base64(b"hello");
        assert_eq!(base64_to_hex(&b64).expect("decode"), HELLO_HEX);
    }

    #[test]
    fn garbage_checksum_is_rejected() {
        assert!(base64_to_hex("not base64!!").is_err());
        assert!(hex_to_base64("zz").is_err());
    }

    #[test]
    fn hex_and_base64_forms_convert_both_ways() {
        let b64 = hex_to_base64(HELLO_HEX).expect("encode");
        assert_eq!(b64, sha256_base64(b"hello"));
        assert_eq!(base64_to_hex(&b64).expect("decode"), HELLO_HEX);
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(sha256_file(&path).expect("hash"), HELLO_HEX);
        assert_eq!(sha256_hex(b"hello"), HELLO_HEX);
    }

    #[test]
    fn digest_comparison_ignores_case() {
        assert!(digests_equal("ABCdef", "abcdef"));
        assert!(!digests_equal("abc", "abd"));
    }
}
