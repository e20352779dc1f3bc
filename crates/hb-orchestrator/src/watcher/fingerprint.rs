//! File fingerprints

use std::fmt;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Content fingerprint: length plus SHA-256 of the bytes.
///
/// Content hashing catches edits that keep size and mtime unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub digest: String,
}

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self {
            len: bytes.len() as u64,
            digest: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Fingerprint of the file at `path`, `None` if it does not exist
    pub async fn of_file(path: &Path) -> io::Result<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Self::of_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b/{}", self.len, &self.digest[..12.min(self.digest.len())])
    }
}
