//! Domain Events
//!
//! Immutable records of things that happened to a tenant namespace.
//! Collaborators (audit, metrics, billing) subscribe through an
//! [`EventPublisher`](super::ports::EventPublisher) instead of this crate
//! emitting those concerns itself.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::backend_mounted("tenant-a", BackendKind::Nfs, &path, elapsed);
//! event_publisher.publish(event).await?;
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::{BackendKind, TenantId};

/// Why a backend was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Explicit,
    Idle,
    Shutdown,
    Removed,
}

/// Domain event representing a significant occurrence in a tenant namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Record Events
    // =========================================================================
    /// A default storage record was created for a first-time tenant.
    RecordCreated {
        tenant_id: String,
        backend_kind: String,
        storage_path: String,
        timestamp: DateTime<Utc>,
    },

    /// The tenant's record was deleted.
    NamespaceRemoved {
        tenant_id: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Lifecycle Events
    // =========================================================================
    /// The backend reached `Ready`.
    BackendMounted {
        tenant_id: String,
        backend_kind: String,
        storage_path: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Mounting, probing or construction failed.
    MountFailed {
        tenant_id: String,
        backend_kind: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The backend was torn down and its handles revoked.
    BackendReleased {
        tenant_id: String,
        backend_kind: String,
        reason: ReleaseReason,
        timestamp: DateTime<Utc>,
    },

    /// Graceful and forced unmount both failed.
    UnmountFailed {
        tenant_id: String,
        storage_path: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Usage Events
    // =========================================================================
    /// A write was rejected by the quota guard.
    QuotaRejected {
        tenant_id: String,
        used_bytes: u64,
        requested_bytes: u64,
        quota_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// Used space changed after a write or delete.
    UsageUpdated {
        tenant_id: String,
        delta_bytes: i64,
        used_bytes: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::RecordCreated { timestamp, .. } => *timestamp,
            DomainEvent::NamespaceRemoved { timestamp, .. } => *timestamp,
            DomainEvent::BackendMounted { timestamp, .. } => *timestamp,
            DomainEvent::MountFailed { timestamp, .. } => *timestamp,
            DomainEvent::BackendReleased { timestamp, .. } => *timestamp,
            DomainEvent::UnmountFailed { timestamp, .. } => *timestamp,
            DomainEvent::QuotaRejected { timestamp, .. } => *timestamp,
            DomainEvent::UsageUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::RecordCreated { .. } => "RecordCreated",
            DomainEvent::NamespaceRemoved { .. } => "NamespaceRemoved",
            DomainEvent::BackendMounted { .. } => "BackendMounted",
            DomainEvent::MountFailed { .. } => "MountFailed",
            DomainEvent::BackendReleased { .. } => "BackendReleased",
            DomainEvent::UnmountFailed { .. } => "UnmountFailed",
            DomainEvent::QuotaRejected { .. } => "QuotaRejected",
            DomainEvent::UsageUpdated { .. } => "UsageUpdated",
        }
    }

    /// Tenant the event concerns.
    pub fn tenant_id(&self) -> &str {
        match self {
            DomainEvent::RecordCreated { tenant_id, .. }
            | DomainEvent::NamespaceRemoved { tenant_id, .. }
            | DomainEvent::BackendMounted { tenant_id, .. }
            | DomainEvent::MountFailed { tenant_id, .. }
            | DomainEvent::BackendReleased { tenant_id, .. }
            | DomainEvent::UnmountFailed { tenant_id, .. }
            | DomainEvent::QuotaRejected { tenant_id, .. }
            | DomainEvent::UsageUpdated { tenant_id, .. } => tenant_id,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn record_created(tenant: &TenantId, kind: BackendKind, storage_path: &Path) -> Self {
        DomainEvent::RecordCreated {
            tenant_id: tenant.to_string(),
            backend_kind: kind.to_string(),
            storage_path: storage_path.display().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn namespace_removed(tenant: &TenantId) -> Self {
        DomainEvent::NamespaceRemoved {
            tenant_id: tenant.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn backend_mounted(tenant: &TenantId, kind: BackendKind, storage_path: &Path, elapsed: Duration) -> Self {
        DomainEvent::BackendMounted {
            tenant_id: tenant.to_string(),
            backend_kind: kind.to_string(),
            storage_path: storage_path.display().to_string(),
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    pub fn mount_failed(tenant: &TenantId, kind: BackendKind, reason: impl Into<String>) -> Self {
        DomainEvent::MountFailed {
            tenant_id: tenant.to_string(),
            backend_kind: kind.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn backend_released(tenant: &TenantId, kind: BackendKind, reason: ReleaseReason) -> Self {
        DomainEvent::BackendReleased {
            tenant_id: tenant.to_string(),
            backend_kind: kind.to_string(),
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn unmount_failed(tenant: &TenantId, storage_path: &Path, reason: impl Into<String>) -> Self {
        DomainEvent::UnmountFailed {
            tenant_id: tenant.to_string(),
            storage_path: storage_path.display().to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn quota_rejected(tenant: &TenantId, used_bytes: u64, requested_bytes: u64, quota_bytes: u64) -> Self {
        DomainEvent::QuotaRejected {
            tenant_id: tenant.to_string(),
            used_bytes,
            requested_bytes,
            quota_bytes,
            timestamp: Utc::now(),
        }
    }

    pub fn usage_updated(tenant: &TenantId, delta_bytes: i64, used_bytes: u64) -> Self {
        DomainEvent::UsageUpdated {
            tenant_id: tenant.to_string(),
            delta_bytes,
            used_bytes,
            timestamp: Utc::now(),
        }
    }
}
