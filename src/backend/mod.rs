//! Object Backends
//!
//! The contract every per-tenant backend implements, the POSIX store used
//! for local and mounted filesystems, and the revocable [`BackendHandle`]
//! the registry hands out.

mod handle;
mod posix;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use handle::BackendHandle;
pub use posix::PosixObjectStore;
pub(crate) use posix::TempFile;

/// Byte range of an object read; an absent length reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    pub fn from_offset(offset: u64) -> Self {
        Self { offset, length: None }
    }

    /// Clamp to an object of `size` bytes, returning `(offset, length)`.
    pub fn resolve(&self, size: u64) -> (u64, u64) {
        let offset = self.offset.min(size);
        let available = size - offset;
        let length = self.length.map_or(available, |l| l.min(available));
        (offset, length)
    }
}

/// Object metadata returned by `put`, `head` and `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Single-tenant object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `bucket/key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo>;

    /// Read an object, or a range of it.
    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectInfo>;

    /// Objects in `bucket` whose key starts with `prefix`, ordered by key.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_resolution() {
        assert_eq!(ByteRange::new(10, 5).resolve(100), (10, 5));
        assert_eq!(ByteRange::new(90, 50).resolve(100), (90, 10));
        assert_eq!(ByteRange::from_offset(40).resolve(100), (40, 60));
        assert_eq!(ByteRange::new(200, 5).resolve(100), (100, 0));
    }
}
