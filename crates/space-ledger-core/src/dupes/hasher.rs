use crate::error::EntryError;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// BLAKE3 of the whole file, streamed, as 64 lowercase hex chars.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a duplicate candidate after checking it still has the size it was
/// grouped under. A file that grew or shrank since the scan is not hashed.
pub fn hash_candidate(path: &str, expected_size: u64) -> Result<String, EntryError> {
    let file_path = Path::new(path);
    let metadata = fs::metadata(file_path).map_err(|source| EntryError::HashCompute {
        path: file_path.to_path_buf(),
        source,
    })?;

    if metadata.len() != expected_size {
        return Err(EntryError::SizeChanged {
            path: file_path.to_path_buf(),
            expected: expected_size,
            actual: metadata.len(),
        });
    }

    hash_file(file_path).map_err(|source| EntryError::HashCompute {
        path: file_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_file_is_deterministic() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        fs::write(&c, b"other byte").unwrap();

        let ha = hash_file(&a).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, hash_file(&b).unwrap());
        assert_ne!(ha, hash_file(&c).unwrap());
        assert_eq!(ha, blake3::hash(b"same bytes").to_hex().to_string());
    }

    #[test]
    fn test_hash_spans_multiple_buffers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big");
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            blake3::hash(&data).to_hex().to_string()
        );
    }

    #[test]
    fn test_hash_candidate_rejects_size_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grew");
        fs::write(&path, b"12345").unwrap();

        let err = hash_candidate(path.to_str().unwrap(), 3).unwrap_err();
        assert!(matches!(
            err,
            EntryError::SizeChanged {
                expected: 3,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_hash_candidate_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanished");
        let err = hash_candidate(path.to_str().unwrap(), 3).unwrap_err();
        assert!(matches!(err, EntryError::HashCompute { .. }));
    }
}
