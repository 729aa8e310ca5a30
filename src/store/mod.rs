//! Content-addressed blob storage.
//!
//! Each accepted payload is written once into a flat directory under the
//! lowercase hex SHA-256 of its bytes, with no extension. Writes go to a
//! unique temp file first and are hard-linked into place, so a digest name
//! never points at a partial file and an existing blob is never overwritten.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::store::ContentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::open("./blobs").await?;
//! let stored = store.put(b"MZ\x90\x00").await?;
//! assert!(store.verify(&stored.hash).await?);
//! # Ok(())
//! # }
//! ```

mod error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

pub use error::StoreError;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

/// True if `hash` looks like a digest this store would produce.
#[must_use]
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

/// A blob that is present in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Hex SHA-256 digest, also the file name.
    pub hash: String,
    /// Full path of the blob.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// False when a blob with this digest already existed and was left untouched.
    pub newly_written: bool,
}

/// Flat directory of blobs named by content digest.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Opens the store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    #[instrument(level = "debug", skip(root), fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(root.clone(), e))?;
        Ok(Self { root })
    }

    /// Returns the path a blob with this digest lives at.
    #[must_use]
    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// True if a blob with this digest is present.
    pub async fn contains(&self, hash: &str) -> bool {
        tokio::fs::try_exists(self.path_for(hash))
            .await
            .unwrap_or(false)
    }

    /// Writes `bytes` under their digest. An existing blob is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the temp file cannot be written or linked
    /// into place. No file is left under the digest name on failure.
    #[instrument(level = "debug", skip(self, bytes), fields(len = bytes.len()))]
    pub async fn put(&self, bytes: &[u8]) -> Result<StoredFile, StoreError> {
        let hash = content_hash(bytes);
        let path = self.path_for(&hash);
        let size = bytes.len() as u64;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%hash, "blob already stored");
            return Ok(StoredFile {
                hash,
                path,
                size,
                newly_written: false,
            });
        }

        let temp = self.temp_path(&hash);
        if let Err(e) = write_fully(&temp, bytes).await {
            remove_temp(&temp).await;
            return Err(StoreError::io(temp, e));
        }

        let linked = link_into_place(&temp, &path).await;
        remove_temp(&temp).await;

        let newly_written = linked.map_err(|e| StoreError::io(path.clone(), e))?;
        debug!(%hash, newly_written, "blob write finished");
        Ok(StoredFile {
            hash,
            path,
            size,
            newly_written,
        })
    }

    /// Recomputes the digest of a stored blob and compares it with its name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHash`] for malformed names and
    /// [`StoreError::Io`] if the blob cannot be read.
    pub async fn verify(&self, hash: &str) -> Result<bool, StoreError> {
        if !is_valid_hash(hash) {
            return Err(StoreError::InvalidHash {
                hash: hash.to_string(),
            });
        }
        let path = self.path_for(hash);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        Ok(content_hash(&bytes) == hash)
    }

    fn temp_path(&self, hash: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{hash}.{}.{n}.part", std::process::id()))
    }
}

async fn write_fully(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Returns `Ok(true)` if the link created the blob, `Ok(false)` if it already existed.
async fn link_into_place(temp: &Path, path: &Path) -> std::io::Result<bool> {
    match tokio::fs::hard_link(temp, path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) if e.kind() == ErrorKind::Unsupported => {
            // Same digest means same bytes, so losing a rename race here is harmless.
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(false);
            }
            tokio::fs::rename(temp, path).await?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

async fn remove_temp(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %temp.display(), error = %e, "failed to remove temp file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_content_hash_known_vector() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_encode_length() {
        let encoded = hex_encode(&[1_u8, 255_u8, 16_u8]);
        assert_eq!(encoded, "01ff10");
    }

    #[test]
    fn test_is_valid_hash() {
        assert!(is_valid_hash(&content_hash(b"x")));
        assert!(!is_valid_hash("ABC"));
        assert!(!is_valid_hash(&"G".repeat(64)));
        assert!(!is_valid_hash(&content_hash(b"x").to_uppercase()));
    }

    #[tokio::test]
    async fn test_put_writes_blob_named_by_digest() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path().join("blobs")).await.unwrap();

        let stored = store.put(b"MZ payload").await.unwrap();

        assert!(stored.newly_written);
        assert_eq!(stored.hash, content_hash(b"MZ payload"));
        assert_eq!(stored.path.file_name().unwrap().to_str().unwrap(), stored.hash);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"MZ payload");
        assert!(store.verify(&stored.hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_existing_blob_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path()).await.unwrap();

        let first = store.put(b"same").await.unwrap();
        let second = store.put(b"same").await.unwrap();

        assert!(first.newly_written);
        assert!(!second.newly_written);
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path()).await.unwrap();
        store.put(b"one").await.unwrap();
        store.put(b"two").await.unwrap();
        store.put(b"one").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected entries: {names:?}");
        assert!(names.iter().all(|n| is_valid_hash(n)));
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_same_bytes_write_once() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ContentStore::open(temp.path()).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put(b"racing payload").await.unwrap()
            }));
        }

        let mut newly_written = 0;
        for handle in handles {
            if handle.await.unwrap().newly_written {
                newly_written += 1;
            }
        }
        assert_eq!(newly_written, 1);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_existing_blob_not_overwritten() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path()).await.unwrap();
        let hash = content_hash(b"original");
        std::fs::write(store.path_for(&hash), b"tampered").unwrap();

        let stored = store.put(b"original").await.unwrap();

        assert!(!stored.newly_written);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"tampered");
        assert!(!store.verify(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_malformed_hash() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path()).await.unwrap();
        let result = store.verify("../etc/passwd").await;
        assert!(matches!(result, Err(StoreError::InvalidHash { .. })));
    }

    #[tokio::test]
    async fn test_contains() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::open(temp.path()).await.unwrap();
        let stored = store.put(b"here").await.unwrap();
        assert!(store.contains(&stored.hash).await);
        assert!(!store.contains(&content_hash(b"absent")).await);
    }
}
