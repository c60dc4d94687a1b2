//! Content-addressable local blob store.
//!
//! Blobs are stored in a sharded directory tree under a configurable root.
//! The tree is a pure content-addressed cache: no header, no magic, no
//! versioning — it can be rebuilt from any peer. Writes are idempotent
//! (same key overwrites deterministically with the latest content), and
//! deletion removes the whole first-segment shard subtree.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> blobmesh::Result<()> {
//! use blobmesh::store::{ContentStore, StoreOpts};
//!
//! let store = ContentStore::new(StoreOpts::with_root("/var/lib/blobmesh"));
//! let written = store.write_bytes("config-backup", b"blob contents").await?;
//! assert_eq!(written, 13);
//!
//! let data = store.read("config-backup").await?;
//! assert_eq!(data, b"blob contents");
//! # Ok(())
//! # }
//! ```

pub mod path;

pub use path::{default_transform, sha1_path_transform, PathKey, PathTransform};

use crate::error::{MeshError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Store construction options.
///
/// The path transform is injected once and immutable thereafter.
#[derive(Clone)]
pub struct StoreOpts {
    /// Root directory the sharded tree lives under.
    pub root: PathBuf,
    /// Key-to-path derivation strategy.
    pub transform: PathTransform,
}

impl StoreOpts {
    /// Options with the default SHA-1 transform under the given root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            transform: default_transform(),
        }
    }
}

impl std::fmt::Debug for StoreOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOpts")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Content-addressable blob store backed by the local filesystem.
pub struct ContentStore {
    opts: StoreOpts,
}

impl ContentStore {
    /// Create a store. The root directory is created lazily on first write.
    pub fn new(opts: StoreOpts) -> Self {
        Self { opts }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.opts.root
    }

    /// Derive the on-disk location for a key.
    pub fn path_for(&self, key: &str) -> PathKey {
        (self.opts.transform)(key)
    }

    fn abs_full_path(&self, pk: &PathKey) -> PathBuf {
        self.opts.root.join(pk.full_path())
    }

    /// Check whether a blob exists for this key.
    ///
    /// Absence and stat failure are distinct: an unrelated I/O error
    /// (permissions, bad mount) propagates instead of reading as `false`.
    pub async fn has(&self, key: &str) -> Result<bool> {
        let path = self.abs_full_path(&self.path_for(key));
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MeshError::StoreIo { path, source: e }),
        }
    }

    /// Stream a blob into the store, returning the byte count written.
    ///
    /// Idempotent: writing the same key twice replaces the prior content.
    pub async fn write<R>(&self, key: &str, mut reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let pk = self.path_for(key);
        let dir = self.opts.root.join(pk.dir_path());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| MeshError::StoreWrite {
                path: dir.clone(),
                source: e,
            })?;

        let path = self.abs_full_path(&pk);
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| MeshError::StoreWrite {
                path: path.clone(),
                source: e,
            })?;

        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| MeshError::StoreWrite {
                path: path.clone(),
                source: e,
            })?;

        debug!(key = %key, bytes = written, path = %path.display(), "wrote blob");
        Ok(written)
    }

    /// Write an in-memory blob.
    pub async fn write_bytes(&self, key: &str, data: &[u8]) -> Result<u64> {
        self.write(key, data).await
    }

    /// Read a blob fully into memory.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut file = self.read_stream(key).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| MeshError::StoreIo {
                path: self.abs_full_path(&self.path_for(key)),
                source: e,
            })?;
        Ok(buf)
    }

    /// Open a blob for streaming. The caller owns closing the handle.
    pub async fn read_stream(&self, key: &str) -> Result<fs::File> {
        let path = self.abs_full_path(&self.path_for(key));
        match fs::File::open(&path).await {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(MeshError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(MeshError::StoreIo { path, source: e }),
        }
    }

    /// Delete the blob's entire shard subtree.
    ///
    /// Removes everything under the key's first path segment, not just the
    /// single file: many keys share the same outer directory and that
    /// segment is the deletion granularity. A transform yielding no
    /// segments stores the blob directly under the root, so deletion is
    /// just that file. Idempotent if already absent.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let pk = self.path_for(key);
        let (target, result) = match pk.first_segment() {
            Some(seg) => {
                let shard = self.opts.root.join(seg);
                let r = fs::remove_dir_all(&shard).await;
                (shard, r)
            }
            None => {
                let path = self.abs_full_path(&pk);
                let r = fs::remove_file(&path).await;
                (path, r)
            }
        };

        match result {
            Ok(()) => {
                debug!(key = %key, path = %target.display(), "deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MeshError::StoreDelete {
                path: target,
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(StoreOpts::with_root(dir.path()));
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (_dir, store) = temp_store();
        let data = b"some data blablalba";

        let written = store.write_bytes("password", data).await.unwrap();
        assert_eq!(written, data.len() as u64);

        let read = store.read("password").await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let (_dir, store) = temp_store();

        store.write_bytes("k", b"first").await.unwrap();
        store.write_bytes("k", b"second, longer").await.unwrap();

        assert_eq!(store.read("k").await.unwrap(), b"second, longer");
    }

    #[tokio::test]
    async fn test_has_absent_and_present() {
        let (_dir, store) = temp_store();

        assert!(!store.has("nothing-here").await.unwrap());
        store.write_bytes("nothing-here", b"now it is").await.unwrap();
        assert!(store.has("nothing-here").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = temp_store();

        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, MeshError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_removes_shard() {
        let (_dir, store) = temp_store();

        store.write_bytes("password", b"secret").await.unwrap();
        assert!(store.has("password").await.unwrap());

        store.delete("password").await.unwrap();
        assert!(!store.has("password").await.unwrap());

        let err = store.read("password").await.unwrap_err();
        assert!(matches!(err, MeshError::NotFound { .. }));

        // The whole first-segment directory is gone.
        let pk = store.path_for("password");
        let shard = store.root().join(pk.first_segment().unwrap());
        assert!(!shard.exists());
    }

    #[tokio::test]
    async fn test_delete_with_segmentless_transform() {
        let dir = tempfile::tempdir().unwrap();
        // A transform that keeps every blob flat under the root.
        let transform: PathTransform = std::sync::Arc::new(|key: &str| PathKey {
            segments: Vec::new(),
            file_name: key.to_string(),
        });
        let store = ContentStore::new(StoreOpts {
            root: dir.path().into(),
            transform,
        });

        store.write_bytes("flat", b"no shard here").await.unwrap();
        assert!(store.has("flat").await.unwrap());

        store.delete("flat").await.unwrap();
        assert!(!store.has("flat").await.unwrap());

        // Deleting again stays a no-op.
        store.delete("flat").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let (_dir, store) = temp_store();
        store.delete("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_stream_returns_open_file() {
        let (_dir, store) = temp_store();
        store.write_bytes("streamed", b"0123456789").await.unwrap();

        let mut f = store.read_stream("streamed").await.unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"0123456789");
    }

    #[tokio::test]
    async fn test_streaming_write_from_reader() {
        let (_dir, store) = temp_store();
        let data = vec![7u8; 64 * 1024];

        let written = store.write("large", data.as_slice()).await.unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(store.read("large").await.unwrap(), data);
    }
}
