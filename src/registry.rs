//! Namespace Registry
//!
//! Maps tenants to their live backends, constructing each backend lazily on
//! first use and tearing it down on release, removal, idle expiry or
//! shutdown.
//!
//! # Concurrency
//!
//! ```text
//! acquire_backend ──► map (shared) ──► slot.handle ready? ──► clone
//!        │ miss
//!        ▼
//!   map (exclusive, insert slot) ──► slot mutex ──► spawned construction
//! ```
//!
//! The tenant map lock is held only for lookups and slot insertion or
//! removal. Construction and teardown of one tenant are serialised by the
//! slot's async mutex; construction runs in a spawned task that owns the
//! mutex guard, so a caller that goes away neither aborts a mount halfway
//! nor lets a second attempt start beside it. Callers that queued behind an
//! attempt get its handle, or the same shared error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::BackendHandle;
use crate::domain::ports::{publish_quietly, EventPublisher, TenantConfigProvider};
use crate::domain::{DomainEvent, ReleaseReason};
use crate::error::{Error, Result};
use crate::lifecycle::BackendLifecycle;
use crate::tenant::{quota, MountState, StorageRecord, TenantId};

// =============================================================================
// Tenant Slot
// =============================================================================

/// State guarded by the slot's async mutex.
#[derive(Default)]
struct SlotState {
    /// An OS mount exists at the storage path
    mounted: bool,
    /// Construction attempts started under this mutex
    generation: u64,
    /// Failure of the most recent attempt, tagged with its generation
    last_error: Option<(u64, Arc<Error>)>,
    /// Slot was removed from the map; callers must look up a fresh one
    retired: bool,
}

struct TenantSlot {
    tenant: TenantId,
    created_at: DateTime<Utc>,
    record: RwLock<Option<Arc<RwLock<StorageRecord>>>>,
    handle: RwLock<Option<BackendHandle>>,
    /// Last finished generation, published after the slot mutex is released
    attempts: AtomicU64,
    state: Arc<Mutex<SlotState>>,
}

impl TenantSlot {
    fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            created_at: Utc::now(),
            record: RwLock::new(None),
            handle: RwLock::new(None),
            attempts: AtomicU64::new(0),
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    fn live_handle(&self) -> Option<BackendHandle> {
        self.handle
            .read()
            .as_ref()
            .filter(|h| !h.is_revoked())
            .cloned()
    }

    fn record(&self) -> Option<Arc<RwLock<StorageRecord>>> {
        self.record.read().clone()
    }

    fn touch(&self) {
        if let Some(record) = self.record() {
            record.write().touch();
        }
    }

    fn mount_state(&self) -> MountState {
        match self.record() {
            Some(record) => record.read().mount_state(),
            None => MountState::Pending,
        }
    }

    fn last_activity(&self) -> DateTime<Utc> {
        self.record()
            .map(|r| r.read().last_accessed)
            .unwrap_or(self.created_at)
    }
}

// =============================================================================
// Registry
// =============================================================================

struct RegistryInner {
    provider: Arc<dyn TenantConfigProvider>,
    lifecycle: BackendLifecycle,
    events: Arc<dyn EventPublisher>,
    max_tenants: usize,
    tenants: RwLock<HashMap<TenantId, Arc<TenantSlot>>>,
}

/// Summary of one tenant known to the registry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TenantStatus {
    pub tenant_id: TenantId,
    pub state: MountState,
    pub used_bytes: u64,
    pub quota_bytes: u64,
    /// Bytes left before the quota; `None` when unlimited
    pub remaining_bytes: Option<u64>,
    pub last_accessed: DateTime<Utc>,
}

/// Registry of per-tenant backends.
#[derive(Clone)]
pub struct NamespaceRegistry {
    inner: Arc<RegistryInner>,
}

impl NamespaceRegistry {
    /// `max_tenants == 0` disables the admission limit.
    pub fn new(
        lifecycle: BackendLifecycle,
        provider: Arc<dyn TenantConfigProvider>,
        events: Arc<dyn EventPublisher>,
        max_tenants: usize,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                provider,
                lifecycle,
                events,
                max_tenants,
                tenants: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn lookup(&self, tenant: &TenantId) -> Option<Arc<TenantSlot>> {
        self.inner.tenants.read().get(tenant).cloned()
    }

    fn slot_for(&self, tenant: &TenantId) -> Result<Arc<TenantSlot>> {
        if let Some(slot) = self.lookup(tenant) {
            return Ok(slot);
        }

        let mut tenants = self.inner.tenants.write();
        if let Some(slot) = tenants.get(tenant) {
            return Ok(Arc::clone(slot));
        }
        if self.inner.max_tenants > 0 && tenants.len() >= self.inner.max_tenants {
            warn!(tenant = %tenant, limit = self.inner.max_tenants, "Tenant limit reached");
            return Err(Error::TenantLimitReached {
                limit: self.inner.max_tenants,
            });
        }
        let slot = Arc::new(TenantSlot::new(tenant.clone()));
        tenants.insert(tenant.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Remove `slot` from the map unless it has already been replaced.
    fn unlink(&self, slot: &Arc<TenantSlot>) {
        let mut tenants = self.inner.tenants.write();
        if tenants.get(&slot.tenant).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            tenants.remove(&slot.tenant);
        }
    }

    // =========================================================================
    // Acquire
    // =========================================================================

    /// Return the tenant's backend, provisioning it on first use.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn acquire_backend(&self, tenant: &TenantId) -> Result<BackendHandle> {
        loop {
            if let Some(handle) = self.lookup(tenant).and_then(|s| {
                let handle = s.live_handle();
                if handle.is_some() {
                    s.touch();
                }
                handle
            }) {
                return Ok(handle);
            }

            let slot = self.slot_for(tenant)?;
            let observed = slot.attempts.load(Ordering::Acquire);
            let guard = Arc::clone(&slot.state).lock_owned().await;

            if let Some((attempt, err)) = &guard.last_error {
                if *attempt > observed {
                    return Err(Error::shared(tenant.as_str(), Arc::clone(err)));
                }
            }
            if guard.retired {
                continue;
            }
            if let Some(handle) = slot.live_handle() {
                slot.touch();
                return Ok(handle);
            }

            return self.construct(slot, guard).await;
        }
    }

    async fn construct(&self, slot: Arc<TenantSlot>, mut guard: OwnedMutexGuard<SlotState>) -> Result<BackendHandle> {
        let registry = self.clone();
        let task_slot = Arc::clone(&slot);

        let task = tokio::spawn(async move {
            guard.generation += 1;
            let attempt = guard.generation;
            let outcome = match registry.build(&task_slot, &mut guard).await {
                Ok(handle) => {
                    guard.last_error = None;
                    *task_slot.handle.write() = Some(handle.clone());
                    Ok(handle)
                }
                Err(e) => {
                    let shared = Arc::new(e);
                    guard.last_error = Some((attempt, Arc::clone(&shared)));
                    if task_slot.record().is_none() {
                        // no record was ever stored; release the admission slot
                        guard.retired = true;
                        registry.unlink(&task_slot);
                    }
                    Err(shared)
                }
            };
            drop(guard);
            task_slot.attempts.store(attempt, Ordering::Release);
            outcome
        });

        match task.await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(Error::shared(slot.tenant.as_str(), e)),
            Err(e) => Err(Error::Internal(format!("backend construction task failed: {}", e))),
        }
    }

    async fn build(&self, slot: &TenantSlot, state: &mut SlotState) -> Result<BackendHandle> {
        let tenant = &slot.tenant;
        let record = match slot.record() {
            Some(record) => record,
            None => {
                let record = Arc::new(RwLock::new(self.load_or_create(tenant).await?));
                *slot.record.write() = Some(Arc::clone(&record));
                record
            }
        };

        let kind = record.read().backend_kind;
        match self.inner.lifecycle.provision(tenant, &record).await {
            Ok(provisioned) => {
                state.mounted = provisioned.mounted;
                let storage_path = record.read().storage_path.clone();
                publish_quietly(
                    self.inner.events.as_ref(),
                    DomainEvent::backend_mounted(tenant, kind, &storage_path, provisioned.elapsed),
                )
                .await;
                Ok(BackendHandle::new(
                    tenant.clone(),
                    kind,
                    provisioned.store,
                    record,
                    Arc::clone(&self.inner.events),
                ))
            }
            Err(e) => {
                publish_quietly(
                    self.inner.events.as_ref(),
                    DomainEvent::mount_failed(tenant, kind, e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn load_or_create(&self, tenant: &TenantId) -> Result<StorageRecord> {
        match self.inner.provider.load_record(tenant).await {
            Ok(mut record) => {
                record.reset_mount_state();
                record.touch();
                Ok(record)
            }
            Err(Error::NotFound { .. }) => {
                let record = self.inner.provider.create_default_record(tenant).await?;
                self.inner.provider.save_record(&record).await?;
                info!(tenant = %tenant, kind = %record.backend_kind, "Created default storage record");
                publish_quietly(
                    self.inner.events.as_ref(),
                    DomainEvent::record_created(tenant, record.backend_kind, &record.storage_path),
                )
                .await;
                Ok(record)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Tear down the tenant's backend. Unknown or already released tenants are `Ok`.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn release_backend(&self, tenant: &TenantId) -> Result<()> {
        self.release_with(tenant, ReleaseReason::Explicit).await
    }

    async fn release_with(&self, tenant: &TenantId, reason: ReleaseReason) -> Result<()> {
        let Some(slot) = self.lookup(tenant) else {
            return Ok(());
        };
        let guard = Arc::clone(&slot.state).lock_owned().await;
        self.release_locked(&slot, guard, reason, false).await
    }

    /// Revoke, tear down, persist usage and unlink. Revocation and unlinking
    /// happen even when the unmount fails.
    async fn release_locked(
        &self,
        slot: &Arc<TenantSlot>,
        mut guard: OwnedMutexGuard<SlotState>,
        reason: ReleaseReason,
        forced: bool,
    ) -> Result<()> {
        if guard.retired {
            return Ok(());
        }

        let tenant = &slot.tenant;
        if let Some(handle) = slot.handle.write().take() {
            handle.revoke();
        }

        let mut result = Ok(());
        if let Some(record) = slot.record() {
            let kind = record.read().backend_kind;
            match self.inner.lifecycle.teardown(tenant, &record, guard.mounted, forced).await {
                Ok(()) => {
                    guard.mounted = false;
                    publish_quietly(
                        self.inner.events.as_ref(),
                        DomainEvent::backend_released(tenant, kind, reason),
                    )
                    .await;
                }
                Err(e) => {
                    error!(tenant = %tenant, error = %e, "Backend teardown failed");
                    let storage_path = record.read().storage_path.clone();
                    publish_quietly(
                        self.inner.events.as_ref(),
                        DomainEvent::unmount_failed(tenant, &storage_path, e.to_string()),
                    )
                    .await;
                    result = Err(e);
                }
            }

            if reason != ReleaseReason::Removed {
                let snapshot = record.read().clone();
                if let Err(e) = self.inner.provider.save_record(&snapshot).await {
                    warn!(tenant = %tenant, error = %e, "Failed to persist storage record on release");
                }
            }
        }

        guard.retired = true;
        self.unlink(slot);
        debug!(tenant = %tenant, ?reason, "Tenant slot released");
        result
    }

    /// Force-unmount the tenant's backend and delete its record.
    ///
    /// The record is kept when the unmount fails.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn remove_namespace(&self, tenant: &TenantId) -> Result<()> {
        if let Some(slot) = self.lookup(tenant) {
            let guard = Arc::clone(&slot.state).lock_owned().await;
            self.release_locked(&slot, guard, ReleaseReason::Removed, true).await?;
        }

        self.inner.provider.delete_record(tenant).await?;
        publish_quietly(self.inner.events.as_ref(), DomainEvent::namespace_removed(tenant)).await;
        info!(tenant = %tenant, "Namespace removed");
        Ok(())
    }

    /// Release every tenant, returning the first failure after trying all.
    pub async fn release_all(&self) -> Result<()> {
        let tenants: Vec<TenantId> = self.inner.tenants.read().keys().cloned().collect();
        info!(count = tenants.len(), "Releasing all tenants");

        let results = join_all(
            tenants
                .iter()
                .map(|tenant| self.release_with(tenant, ReleaseReason::Shutdown)),
        )
        .await;
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    // =========================================================================
    // Idle Reaping
    // =========================================================================

    /// Release tenants with no activity for `idle_timeout`; busy slots are skipped.
    pub async fn reap_idle(&self, idle_timeout: Duration) -> Vec<TenantId> {
        let now = Utc::now();
        let candidates: Vec<Arc<TenantSlot>> = self
            .inner
            .tenants
            .read()
            .values()
            .filter(|slot| {
                (now - slot.last_activity())
                    .to_std()
                    .map(|idle| idle >= idle_timeout)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut reaped = Vec::new();
        for slot in candidates {
            let Ok(guard) = Arc::clone(&slot.state).try_lock_owned() else {
                continue;
            };
            match self.release_locked(&slot, guard, ReleaseReason::Idle, false).await {
                Ok(()) => info!(tenant = %slot.tenant, "Released idle tenant"),
                Err(e) => warn!(tenant = %slot.tenant, error = %e, "Idle release failed"),
            }
            reaped.push(slot.tenant.clone());
        }
        reaped
    }

    /// Reap idle tenants every `period` until `shutdown` is cancelled.
    pub async fn run_idle_reaper(&self, period: Duration, idle_timeout: Duration, shutdown: CancellationToken) {
        info!(?period, ?idle_timeout, "Starting idle reaper");
        let mut tick = interval(period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Idle reaper shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let reaped = self.reap_idle(idle_timeout).await;
                    if !reaped.is_empty() {
                        debug!(count = reaped.len(), "Idle sweep finished");
                    }
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Mount state of a known tenant.
    pub fn tenant_state(&self, tenant: &TenantId) -> Option<MountState> {
        self.lookup(tenant).map(|slot| slot.mount_state())
    }

    /// Snapshot of a known tenant's record.
    pub fn record(&self, tenant: &TenantId) -> Option<StorageRecord> {
        self.lookup(tenant)
            .and_then(|slot| slot.record())
            .map(|record| record.read().clone())
    }

    /// Tenants with a ready backend, sorted.
    pub fn active_tenants(&self) -> Vec<TenantId> {
        let mut active: Vec<TenantId> = self
            .inner
            .tenants
            .read()
            .values()
            .filter(|slot| slot.live_handle().is_some())
            .map(|slot| slot.tenant.clone())
            .collect();
        active.sort();
        active
    }

    /// Every tenant the registry tracks, sorted.
    pub fn tenant_statuses(&self) -> Vec<TenantStatus> {
        let mut statuses: Vec<TenantStatus> = self
            .inner
            .tenants
            .read()
            .values()
            .map(|slot| {
                let (used_bytes, quota_bytes, remaining_bytes) = slot
                    .record()
                    .map(|r| {
                        let r = r.read();
                        (r.used_bytes, r.quota_bytes, quota::remaining(&r))
                    })
                    .unwrap_or((0, 0, None));
                TenantStatus {
                    tenant_id: slot.tenant.clone(),
                    state: slot.mount_state(),
                    used_bytes,
                    quota_bytes,
                    remaining_bytes,
                    last_accessed: slot.last_activity(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.inner.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
