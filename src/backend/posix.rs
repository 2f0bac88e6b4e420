//! POSIX object store
//!
//! Objects are plain files at `<root>/<bucket>/<key>`. Writes go to a
//! sibling temporary file and are renamed into place.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{ByteRange, ObjectInfo, ObjectStore};
use crate::error::{Error, Result};
use crate::tenant::isolation::ensure_within_root;

const TEMP_PREFIX: &str = ".tenantns-tmp-";

/// Object store over a directory tree.
#[derive(Debug, Clone)]
pub struct PosixObjectStore {
    root: PathBuf,
}

impl PosixObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `bucket/key`, rejecting names that leave the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        ensure_within_root(&self.root, &self.root.join(bucket).join(key))
    }

    pub(crate) async fn stat(&self, bucket: &str, key: &str, path: &Path) -> Result<ObjectInfo> {
        let meta = fs::metadata(path).await.map_err(|e| not_found(e, bucket, key))?;
        if !meta.is_file() {
            return Err(Error::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: meta.len(),
            last_modified: meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// Uniquely named temporary sibling of an object being written.
///
/// Removed on drop unless [`persist`](Self::persist) renamed it into place,
/// so an abandoned or failed write leaves nothing behind.
#[derive(Debug)]
pub(crate) struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    pub(crate) fn beside(target: &Path) -> Self {
        let name = format!("{}{}", TEMP_PREFIX, Uuid::new_v4());
        let path = match target.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        };
        Self { path, armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Rename onto `target`; on failure the file is still removed on drop.
    pub(crate) async fn persist(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temporary file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Temporary file cleanup failed"),
        }
    }
}

fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty()
        || bucket.starts_with('.')
        || bucket.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidObjectName(format!("bucket '{}'", bucket)));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    let bad_segment = key
        .split('/')
        .any(|s| s.is_empty() || s == "." || s == ".." || s.starts_with(TEMP_PREFIX));
    if key.is_empty() || key.contains('\0') || bad_segment {
        return Err(Error::InvalidObjectName(format!("key '{}'", key)));
    }
    Ok(())
}

fn not_found(err: std::io::Error, bucket: &str, key: &str) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        Error::Io(err)
    }
}

#[async_trait]
impl ObjectStore for PosixObjectStore {
    #[instrument(skip(self, data), fields(len = data.len()))]
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = TempFile::beside(&path);
        let mut file = fs::File::create(temp.path()).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        temp.persist(&path).await?;

        debug!(path = %path.display(), "Stored object");
        self.stat(bucket, key, &path).await
    }

    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let path = self.object_path(bucket, key)?;
        let mut file = fs::File::open(&path).await.map_err(|e| not_found(e, bucket, key))?;
        let size = file.metadata().await?.len();
        let (offset, length) = range.map_or((0, size), |r| r.resolve(size));

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let path = self.object_path(bucket, key)?;
        self.stat(bucket, key, &path).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        validate_bucket(bucket)?;
        let bucket_dir = self.root.join(bucket);
        let mut pending = vec![(bucket_dir, String::new())];
        let mut objects = Vec::new();

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(TEMP_PREFIX) {
                    continue;
                }
                let key = if rel.is_empty() {
                    name
                } else {
                    format!("{}/{}", rel, name)
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if file_type.is_file() && key.starts_with(prefix) {
                    objects.push(self.stat(bucket, &key, &entry.path()).await?);
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).await.map_err(|e| not_found(e, bucket, key))?;
        debug!(path = %path.display(), "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn store() -> (tempfile::TempDir, PosixObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PosixObjectStore::new(dir.path());
        (dir, store)
    }

    fn temp_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    #[test]
    fn test_temp_file_removed_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("obj");

        let abandoned = TempFile::beside(&target);
        std::fs::write(abandoned.path(), b"partial").unwrap();
        drop(abandoned);
        assert!(temp_entries(dir.path()).is_empty());

        let never_created = TempFile::beside(&target);
        drop(never_created);

        let kept = TempFile::beside(&target);
        std::fs::write(kept.path(), b"whole").unwrap();
        tokio_test::block_on(kept.persist(&target)).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"whole");
        assert!(temp_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_file() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("bkt/taken/child")).unwrap();

        let err = store
            .put("bkt", "taken", Bytes::from_static(b"data"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Io(_));
        assert!(temp_entries(&dir.path().join("bkt")).is_empty());
    }

    #[tokio::test]
    async fn test_put_get_head() {
        let (_dir, store) = store();
        let info = store
            .put("photos", "2024/cat.jpg", Bytes::from_static(b"meow meow"))
            .await
            .unwrap();
        assert_eq!(info.size, 9);

        let data = store.get("photos", "2024/cat.jpg", None).await.unwrap();
        assert_eq!(&data[..], b"meow meow");

        let part = store
            .get("photos", "2024/cat.jpg", Some(ByteRange::new(5, 100)))
            .await
            .unwrap();
        assert_eq!(&part[..], b"meow");

        assert_eq!(store.head("photos", "2024/cat.jpg").await.unwrap().size, 9);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_dir, store) = store();
        assert_matches!(
            store.get("b", "nope", None).await,
            Err(Error::ObjectNotFound { key, .. }) if key == "nope"
        );
        assert_matches!(store.delete("b", "nope").await, Err(Error::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, store) = store();
        assert_matches!(
            store.put("b", "../../etc/passwd", Bytes::new()).await,
            Err(Error::InvalidObjectName(_))
        );
        assert_matches!(store.head("..", "x").await, Err(Error::InvalidObjectName(_)));
        assert_matches!(store.head("b", "/abs").await, Err(Error::InvalidObjectName(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_dir, store) = store();
        for key in ["logs/a", "logs/b/c", "data/x"] {
            store.put("bkt", key, Bytes::from_static(b"1")).await.unwrap();
        }

        let keys: Vec<_> = store
            .list("bkt", "logs/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["logs/a", "logs/b/c"]);
        assert!(store.list("empty", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let (_dir, store) = store();
        store.put("b", "k", Bytes::from_static(b"first")).await.unwrap();
        store.put("b", "k", Bytes::from_static(b"2nd")).await.unwrap();
        assert_eq!(&store.get("b", "k", None).await.unwrap()[..], b"2nd");
        assert_eq!(store.list("b", "").await.unwrap().len(), 1);
    }
}
