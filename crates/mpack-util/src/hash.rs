use std::path::Path;

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Compute the BLAKE3 hash of a string, returning the hex-encoded digest.
#[must_use]
pub fn blake3_str(data: &str) -> String {
    blake3_bytes(data.as_bytes())
}

/// Compute the BLAKE3 hash of a file, returning the hex-encoded digest.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn blake3_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(blake3_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_blake3_bytes_stable() {
        let hash = blake3_bytes(b"hello world");
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
        assert_eq!(hash, blake3_str("hello world"));
    }

    #[test]
    fn test_blake3_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "hello world").unwrap();

        assert_eq!(blake3_file(&path).unwrap(), blake3_str("hello world"));
    }

    #[test]
    fn test_blake3_file_not_found() {
        assert!(blake3_file(Path::new("/nonexistent/file")).is_err());
    }
}
