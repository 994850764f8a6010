//! CS-014: BLAKE3 hashing of user data and written files.

use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// First `n` hex digits of a `blake3:` hash, for tags and log lines.
pub fn short(hash: &str, n: usize) -> &str {
    let hex = hash.strip_prefix("blake3:").unwrap_or(hash);
    &hex[..n.min(hex.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sequence;
    use crate::core::types::SequenceBounds;

    #[test]
    fn test_cs014_hash_file_matches_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("numbers.txt");
        sequence::write_sequence(&path, SequenceBounds::default()).unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string(&sequence::render(SequenceBounds::default())));
    }

    #[test]
    fn test_cs014_hash_file_missing() {
        let err = hash_file(Path::new("/nonexistent/cloudstrap/numbers.txt")).unwrap_err();
        assert!(err.contains("cannot open"));
    }

    #[test]
    fn test_cs014_hash_string_distinguishes() {
        assert_eq!(hash_string("1\n2\n"), hash_string("1\n2\n"));
        assert_ne!(hash_string("1\n2\n"), hash_string("1\n2"));
    }

    #[test]
    fn test_cs014_short() {
        let h = hash_string("x");
        assert_eq!(short(&h, 12).len(), 12);
        assert!(h[7..].starts_with(short(&h, 12)));
        assert_eq!(short("abc", 12), "abc");
    }
}
