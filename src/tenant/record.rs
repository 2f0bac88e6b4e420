//! Storage Record
//!
//! Per-tenant configuration and usage snapshot. The mount state is private:
//! only the lifecycle module moves it through [`MountState::can_transition_to`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Tenant Identifier
// =============================================================================

/// Tenant identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Backend Kind
// =============================================================================

/// Storage backend kinds known to the namespace manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local POSIX directory
    Posix,
    /// Ceph distributed filesystem
    #[serde(rename = "cephfs")]
    CephFs,
    /// Network File System
    Nfs,
    /// Lustre parallel filesystem
    Lustre,
    /// MinIO S3-compatible endpoint
    #[serde(rename = "minio")]
    MinIo,
    /// RustFS S3-compatible endpoint
    #[serde(rename = "rustfs")]
    RustFs,
}

impl BackendKind {
    /// Every accepted kind, in configuration spelling.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Posix,
        BackendKind::CephFs,
        BackendKind::Nfs,
        BackendKind::Lustre,
        BackendKind::MinIo,
        BackendKind::RustFs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Posix => "posix",
            BackendKind::CephFs => "cephfs",
            BackendKind::Nfs => "nfs",
            BackendKind::Lustre => "lustre",
            BackendKind::MinIo => "minio",
            BackendKind::RustFs => "rustfs",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| Error::InvalidBackendKind(s.to_string()))
    }
}

// =============================================================================
// Mount State
// =============================================================================

/// Per-tenant lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    #[default]
    Unmounted,
    Pending,
    Mounting,
    Ready,
    Error,
    Unmounting,
}

impl MountState {
    /// Allowed edges of the lifecycle state machine.
    ///
    /// `Pending -> Ready` is the proxy path (probe, no mount). `Error -> Pending`
    /// is an explicit caller retry, `Error -> Unmounting` a teardown after failure.
    pub fn can_transition_to(&self, next: MountState) -> bool {
        use MountState::*;
        matches!(
            (self, next),
            (Unmounted, Pending)
                | (Pending, Mounting)
                | (Pending, Ready)
                | (Pending, Error)
                | (Mounting, Ready)
                | (Mounting, Error)
                | (Ready, Unmounting)
                | (Unmounting, Unmounted)
                | (Unmounting, Error)
                | (Error, Pending)
                | (Error, Unmounting)
        )
    }
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountState::Unmounted => write!(f, "unmounted"),
            MountState::Pending => write!(f, "pending"),
            MountState::Mounting => write!(f, "mounting"),
            MountState::Ready => write!(f, "ready"),
            MountState::Error => write!(f, "error"),
            MountState::Unmounting => write!(f, "unmounting"),
        }
    }
}

// =============================================================================
// Storage Record
// =============================================================================

/// Configuration and usage snapshot for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub tenant_id: TenantId,
    pub backend_kind: BackendKind,
    #[serde(default)]
    pub backend_parameters: BTreeMap<String, serde_json::Value>,
    pub storage_path: PathBuf,
    /// 0 means unlimited
    #[serde(default)]
    pub quota_bytes: u64,
    #[serde(default)]
    pub used_bytes: u64,
    #[serde(default)]
    mount_state: MountState,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StorageRecord {
    /// Create an unmounted record.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        backend_kind: BackendKind,
        storage_path: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            backend_kind,
            backend_parameters: BTreeMap::new(),
            storage_path: storage_path.into(),
            quota_bytes: 0,
            used_bytes: 0,
            mount_state: MountState::Unmounted,
            created_at: now,
            last_accessed: now,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn with_used(mut self, used_bytes: u64) -> Self {
        self.used_bytes = used_bytes;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.backend_parameters.insert(key.into(), value);
        self
    }

    pub fn mount_state(&self) -> MountState {
        self.mount_state
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Move the record to `next`, rejecting edges the state machine does not have.
    pub(crate) fn transition(&mut self, next: MountState) -> Result<MountState> {
        let previous = self.mount_state;
        if !previous.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                tenant: self.tenant_id.to_string(),
                from: previous.to_string(),
                to: next.to_string(),
            });
        }
        self.mount_state = next;
        Ok(previous)
    }

    /// Records loaded from persistence start a fresh lifecycle in this process.
    pub(crate) fn reset_mount_state(&mut self) {
        self.mount_state = MountState::Unmounted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("posix".parse::<BackendKind>().unwrap(), BackendKind::Posix);
        assert_eq!("CephFS".parse::<BackendKind>().unwrap(), BackendKind::CephFs);
        assert_eq!(" lustre ".parse::<BackendKind>().unwrap(), BackendKind::Lustre);
        assert_matches!(
            "gpfs".parse::<BackendKind>(),
            Err(Error::InvalidBackendKind(k)) if k == "gpfs"
        );
    }

    #[test]
    fn test_backend_kind_serde_matches_display() {
        for kind in BackendKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut record = StorageRecord::new("t1", BackendKind::Nfs, "/mnt/users/t1");
        for next in [
            MountState::Pending,
            MountState::Mounting,
            MountState::Ready,
            MountState::Unmounting,
            MountState::Unmounted,
        ] {
            record.transition(next).unwrap();
        }
        assert_eq!(record.mount_state(), MountState::Unmounted);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut record = StorageRecord::new("t1", BackendKind::Posix, "/mnt/users/t1");
        assert_matches!(
            record.transition(MountState::Ready),
            Err(Error::InvalidTransition { .. })
        );
        assert_eq!(record.mount_state(), MountState::Unmounted);

        record.transition(MountState::Pending).unwrap();
        record.transition(MountState::Mounting).unwrap();
        assert!(record.transition(MountState::Unmounting).is_err());
    }

    #[test]
    fn test_error_allows_retry_and_teardown() {
        assert!(MountState::Error.can_transition_to(MountState::Pending));
        assert!(MountState::Error.can_transition_to(MountState::Unmounting));
        assert!(!MountState::Error.can_transition_to(MountState::Ready));
    }

    #[test]
    fn test_record_roundtrip_keeps_state_private() {
        let record = StorageRecord::new("t1", BackendKind::Lustre, "/mnt/users/t1/storage")
            .with_quota(1024)
            .with_parameter("filesystem", serde_json::json!("lfs01"));
        let json = serde_json::to_string(&record).unwrap();
        let back: StorageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tenant_id, record.tenant_id);
        assert_eq!(back.quota_bytes, 1024);
        assert_eq!(back.mount_state(), MountState::Unmounted);
        assert_eq!(back.backend_parameters["filesystem"], "lfs01");
    }
}
