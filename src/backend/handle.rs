//! Backend handle
//!
//! The capability the registry issues for one tenant. Clones share the same
//! revocation state: once the tenant is released every clone fails with
//! `BackendRevoked`.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ByteRange, ObjectInfo, ObjectStore};
use crate::domain::ports::{publish_quietly, EventPublisher};
use crate::domain::DomainEvent;
use crate::error::{Error, Result};
use crate::tenant::{check_quota, update_used_space, BackendKind, StorageRecord, TenantId};

struct HandleInner {
    tenant: TenantId,
    kind: BackendKind,
    store: Arc<dyn ObjectStore>,
    record: Arc<RwLock<StorageRecord>>,
    events: Arc<dyn EventPublisher>,
    revoked: CancellationToken,
}

/// Quota-enforcing, revocable access to one tenant's backend.
#[derive(Clone)]
pub struct BackendHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("tenant", &self.inner.tenant)
            .field("kind", &self.inner.kind)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl BackendHandle {
    pub(crate) fn new(
        tenant: TenantId,
        kind: BackendKind,
        store: Arc<dyn ObjectStore>,
        record: Arc<RwLock<StorageRecord>>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                tenant,
                kind,
                store,
                record,
                events,
                revoked: CancellationToken::new(),
            }),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.inner.tenant
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.kind
    }

    pub fn storage_path(&self) -> PathBuf {
        self.inner.record.read().storage_path.clone()
    }

    /// Current used bytes as tracked by this process.
    pub fn used_bytes(&self) -> u64 {
        self.inner.record.read().used_bytes
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.revoked.is_cancelled()
    }

    /// Whether both handles come from the same construction.
    pub fn same_as(&self, other: &BackendHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn revoke(&self) {
        if !self.inner.revoked.is_cancelled() {
            debug!(tenant = %self.inner.tenant, "Revoking backend handle");
            self.inner.revoked.cancel();
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_revoked() {
            return Err(Error::BackendRevoked {
                tenant: self.inner.tenant.to_string(),
            });
        }
        self.inner.record.write().touch();
        Ok(())
    }

    async fn apply_delta(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        let used = update_used_space(&mut self.inner.record.write(), delta);
        publish_quietly(
            self.inner.events.as_ref(),
            DomainEvent::usage_updated(&self.inner.tenant, delta, used),
        )
        .await;
    }

    async fn size_if_exists(&self, bucket: &str, key: &str) -> Result<u64> {
        match self.inner.store.head(bucket, key).await {
            Ok(info) => Ok(info.size),
            Err(Error::ObjectNotFound { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Store an object after the quota pre-flight; usage follows the size change.
    pub async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<ObjectInfo> {
        self.ensure_live()?;

        let verdict = check_quota(&self.inner.record.read(), data.len() as u64);
        if let Err(err) = verdict {
            if let Error::QuotaExceeded {
                used_bytes,
                requested_bytes,
                quota_bytes,
                ..
            } = &err
            {
                publish_quietly(
                    self.inner.events.as_ref(),
                    DomainEvent::quota_rejected(&self.inner.tenant, *used_bytes, *requested_bytes, *quota_bytes),
                )
                .await;
            }
            return Err(err);
        }

        let previous = self.size_if_exists(bucket, key).await?;
        let info = self.inner.store.put(bucket, key, data).await?;
        self.apply_delta(info.size as i64 - previous as i64).await;
        Ok(info)
    }

    pub async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes> {
        self.ensure_live()?;
        self.inner.store.get(bucket, key, range).await
    }

    pub async fn head(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        self.ensure_live()?;
        self.inner.store.head(bucket, key).await
    }

    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.ensure_live()?;
        self.inner.store.list(bucket, prefix).await
    }

    /// Delete an object and release its bytes from the tenant's usage.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_live()?;
        let size = self.inner.store.head(bucket, key).await?.size;
        self.inner.store.delete(bucket, key).await?;
        self.apply_delta(-(size as i64)).await;
        Ok(())
    }
}
