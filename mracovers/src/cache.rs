//! Disk-backed cover cache keyed by content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use mramodel::CoverArtPayload;

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
}

/// Reference to one stored cover.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverHandle {
    pub key: String,
    pub url: String,
    pub mime: String,
}

#[derive(Clone, Debug)]
struct CoverEntry {
    path: PathBuf,
    mime: String,
}

/// Content-addressed cover store.
///
/// Ingesting the same bytes twice yields the same key, so chatty adapters
/// re-sending identical artwork cost one write.
pub struct CoverStore {
    dir: PathBuf,
    base_url: String,
    index: Mutex<HashMap<String, CoverEntry>>,
}

impl CoverStore {
    /// Opens (and creates if needed) the store under `dir`. `base_url` is
    /// the externally reachable prefix, e.g. `http://192.168.1.10:7091`.
    pub fn open(dir: impl AsRef<Path>, base_url: impl Into<String>) -> Result<Arc<Self>, CoverError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Arc::new(Self {
            dir,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: Mutex::new(HashMap::new()),
        }))
    }

    fn extension_for(mime: &str) -> Result<&'static str, CoverError> {
        match mime {
            "image/jpeg" | "image/jpg" => Ok("jpg"),
            "image/png" => Ok("png"),
            "image/webp" => Ok("webp"),
            "image/gif" => Ok("gif"),
            "image/bmp" => Ok("bmp"),
            other => Err(CoverError::UnsupportedMime(other.to_string())),
        }
    }

    /// Stable content key: the first 16 bytes of the SHA-256 digest, in
    /// hex. The same artwork always maps to the same key, across restarts
    /// and releases.
    fn content_key(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    /// Ingests raw artwork and returns the internal URL handle.
    pub async fn ingest(&self, payload: &CoverArtPayload) -> Result<CoverHandle, CoverError> {
        let extension = Self::extension_for(&payload.mime)?;
        let key = format!("{}.{}", Self::content_key(&payload.bytes), extension);

        let path = self.dir.join(&key);
        let already_known = self.index.lock().unwrap().contains_key(&key);
        if !already_known {
            tokio::fs::write(&path, &payload.bytes).await?;
            self.index.lock().unwrap().insert(
                key.clone(),
                CoverEntry {
                    path: path.clone(),
                    mime: payload.mime.clone(),
                },
            );
            debug!(key = %key, bytes = payload.bytes.len(), "cover stored");
        }

        Ok(CoverHandle {
            url: format!("{}/covers/{}", self.base_url, key),
            key,
            mime: payload.mime.clone(),
        })
    }

    /// Looks an entry up for serving.
    pub fn get(&self, key: &str) -> Option<(PathBuf, String)> {
        self.index
            .lock()
            .unwrap()
            .get(key)
            .map(|entry| (entry.path.clone(), entry.mime.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(bytes: &[u8]) -> CoverArtPayload {
        CoverArtPayload {
            bytes: bytes.to_vec(),
            mime: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::open(dir.path(), "http://10.0.0.2:7091/").unwrap();

        let first = store.ingest(&payload(b"artwork-bytes")).await.unwrap();
        let second = store.ingest(&payload(b"artwork-bytes")).await.unwrap();
        assert_eq!(first, second);
        assert!(first.url.starts_with("http://10.0.0.2:7091/covers/"));

        let other = store.ingest(&payload(b"different")).await.unwrap();
        assert_ne!(first.key, other.key);
    }

    #[tokio::test]
    async fn test_get_serves_stored_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::open(dir.path(), "http://localhost:7091").unwrap();

        let handle = store.ingest(&payload(b"data")).await.unwrap();
        let (path, mime) = store.get(&handle.key).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"data");
        assert_eq!(mime, "image/jpeg");
    }

    #[tokio::test]
    async fn test_unknown_mime_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::open(dir.path(), "http://localhost:7091").unwrap();

        let bad = CoverArtPayload {
            bytes: vec![1, 2, 3],
            mime: "application/octet-stream".to_string(),
        };
        assert!(store.ingest(&bad).await.is_err());
    }
}
