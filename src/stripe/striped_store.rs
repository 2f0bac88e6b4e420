//! Stripe-aware object store
//!
//! Decorates a [`PosixObjectStore`] on a striped filesystem. Large puts are
//! planned, pre-created with their layout and written in parallel; large
//! gets of striped files are read in parallel. Everything else delegates.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::layout::StripeLayoutTool;
use super::parallel_io::ParallelIo;
use super::planner::{large_object_threshold, plan_striping_for_size, StripeDescriptor};
use crate::backend::{ByteRange, ObjectInfo, ObjectStore, PosixObjectStore, TempFile};
use crate::config::StripingConfig;
use crate::error::{Error, Result};

/// [`ObjectStore`] decorator adding stripe-parallel transfers.
pub struct StripedObjectStore {
    inner: PosixObjectStore,
    layout: Arc<dyn StripeLayoutTool>,
    io: ParallelIo,
    stripe_size: u64,
    max_stripes: u32,
    threshold: u64,
}

impl StripedObjectStore {
    pub fn new(inner: PosixObjectStore, layout: Arc<dyn StripeLayoutTool>, config: &StripingConfig) -> Self {
        let threshold = if config.large_object_threshold > 0 {
            config.large_object_threshold
        } else {
            large_object_threshold(config.stripe_size)
        };
        Self {
            inner,
            layout,
            io: ParallelIo::new(config.max_parallelism),
            stripe_size: config.stripe_size,
            max_stripes: config.max_stripes,
            threshold,
        }
    }

    /// Objects strictly larger than this take the parallel path.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Layout for a new object of `size` bytes.
    pub fn plan(&self, size: u64) -> StripeDescriptor {
        let descriptor = plan_striping_for_size(size, self.max_stripes);
        if self.stripe_size > 0 {
            descriptor.with_stripe_size(self.stripe_size)
        } else {
            descriptor
        }
    }

    async fn hint_directory(&self, dir: &Path, descriptor: &StripeDescriptor) {
        if let Err(e) = self.layout.apply_layout(dir, descriptor).await {
            warn!(dir = %dir.display(), error = %e, "Failed to set directory striping, continuing");
        }
    }

    async fn put_striped(&self, bucket: &str, key: &str, path: &Path, data: Bytes, descriptor: StripeDescriptor) -> Result<ObjectInfo> {
        let temp = TempFile::beside(path);
        self.write_fresh(temp.path(), data, &descriptor).await?;
        temp.persist(path).await?;
        self.inner.stat(bucket, key, path).await
    }

    async fn write_fresh(&self, temp: &Path, data: Bytes, descriptor: &StripeDescriptor) -> Result<()> {
        // Layout can only be chosen before the first byte lands.
        self.layout.apply_layout(temp, descriptor).await?;

        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(temp)
            .await?;
        file.set_len(data.len() as u64).await?;
        let file = Arc::new(file.into_std().await);

        // queued chunks stop if the caller abandons the put
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        self.io.write(Arc::clone(&file), 0, data, descriptor, &cancel).await?;

        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(|e| Error::Internal(format!("sync task failed: {}", e)))??;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for StripedObjectStore {
    #[instrument(skip(self, data), fields(len = data.len()))]
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        let path = self.inner.object_path(bucket, key)?;
        let size = data.len() as u64;
        let descriptor = self.plan(size);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
            self.hint_directory(parent, &descriptor).await;
        }

        if size > self.threshold {
            debug!(stripes = descriptor.stripe_count, stripe_size = descriptor.stripe_size, "Striped put");
            self.put_striped(bucket, key, &path, data, descriptor).await
        } else {
            self.inner.put(bucket, key, data).await
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let path = self.inner.object_path(bucket, key)?;
        let info = self.inner.stat(bucket, key, &path).await?;
        if info.size <= self.threshold {
            return self.inner.get(bucket, key, range).await;
        }

        let descriptor = match self.layout.query_layout(&path).await {
            Ok(d) if d.is_parallel() => d,
            Ok(_) => return self.inner.get(bucket, key, range).await,
            Err(e) => {
                debug!(error = %e, "Stripe layout unavailable, reading sequentially");
                return self.inner.get(bucket, key, range).await;
            }
        };

        let (offset, length) = range.map_or((0, info.size), |r| r.resolve(info.size));
        let file = fs::File::open(&path).await?.into_std().await;
        debug!(offset, length, stripes = descriptor.stripe_count, "Striped get");
        self.io
            .read(Arc::new(file), offset, length, &descriptor, &CancellationToken::new())
            .await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        self.inner.head(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.inner.list(bucket, prefix).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner.delete(bucket, key).await
    }
}
