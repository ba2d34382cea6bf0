//! Fingerprint generator.
//!
//! Fingerprints are plain SHA-256 digests of the content bytes, with no
//! domain tag, so anyone can reproduce them with standard tooling
//! (`sha256sum`, `openssl dgst -sha256`).

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use notary_types::Fingerprint;
use sha2::{Digest, Sha256};

const READ_CHUNK: usize = 64 * 1024;

/// Errors from fingerprinting.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// The content could not be read; no registration may be attempted.
    #[error("content unreadable{}: {source}", path_suffix(.path))]
    ContentUnreadable {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

/// Fingerprint an in-memory byte slice.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(Sha256::digest(data).into())
}

/// Fingerprint a stream, reading it in fixed-size chunks.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<Fingerprint, FingerprintError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(FingerprintError::ContentUnreadable { path: None, source })
            }
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint::from_digest(hasher.finalize().into()))
}

/// Fingerprint a file on disk.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<Fingerprint, FingerprintError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FingerprintError::ContentUnreadable {
        path: Some(path.to_path_buf()),
        source,
    })?;
    fingerprint_reader(file).map_err(|e| match e {
        FingerprintError::ContentUnreadable { source, .. } => FingerprintError::ContentUnreadable {
            path: Some(path.to_path_buf()),
            source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn matches_known_sha256_vector() {
        assert_eq!(
            fingerprint_bytes(b"hello world").to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            fingerprint_bytes(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn reader_matches_bytes_across_chunk_boundaries() {
        let data: Vec<u8> = (0..(READ_CHUNK * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = fingerprint_reader(&data[..]).unwrap();
        assert_eq!(streamed, fingerprint_bytes(&data));
    }

    #[test]
    fn file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"certificate me").unwrap();
        let fp = fingerprint_file(file.path()).unwrap();
        assert_eq!(fp, fingerprint_bytes(b"certificate me"));
    }

    #[test]
    fn missing_file_is_content_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        let err = fingerprint_file(&missing).unwrap_err();
        let FingerprintError::ContentUnreadable { path, source } = err;
        assert_eq!(path.as_deref(), Some(missing.as_path()));
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn read_error_is_content_unreadable() {
        let err = fingerprint_reader(FailingReader).unwrap_err();
        assert!(err.to_string().contains("content unreadable"));
    }

    #[test]
    fn single_bit_flip_changes_fingerprint() {
        let original = b"the quick brown fox".to_vec();
        let mut flipped = original.clone();
        flipped[3] ^= 0x01;
        assert_ne!(fingerprint_bytes(&original), fingerprint_bytes(&flipped));
    }

    proptest! {
        #[test]
        fn deterministic_for_any_input(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(fingerprint_bytes(&data), fingerprint_bytes(&data));
            prop_assert_eq!(fingerprint_bytes(&data).to_hex().len(), 64);
        }

        #[test]
        fn distinct_inputs_give_distinct_fingerprints(
            a in proptest::collection::vec(any::<u8>(), 0..256),
            b in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint_bytes(&a), fingerprint_bytes(&b));
        }
    }
}
