//! In-memory tenant configuration
//!
//! Implements `TenantConfigProvider` over a `DashMap`. Default records are
//! derived from the namespace configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::NamespaceConfig;
use crate::domain::ports::TenantConfigProvider;
use crate::error::{Error, Result};
use crate::tenant::isolation::tenant_base_path;
use crate::tenant::{BackendKind, StorageRecord, TenantId};

/// Values applied to first-time tenants.
#[derive(Debug, Clone)]
pub struct TenantDefaults {
    pub base_mount_path: PathBuf,
    pub backend_kind: BackendKind,
    pub quota_bytes: u64,
    pub backend_parameters: BTreeMap<String, serde_json::Value>,
}

impl TenantDefaults {
    pub fn from_config(config: &NamespaceConfig) -> Result<Self> {
        Ok(Self {
            base_mount_path: config.base_mount_path.clone(),
            backend_kind: config.default_backend_kind()?,
            quota_bytes: config.default_quota_bytes,
            backend_parameters: config.backend_defaults.clone(),
        })
    }
}

/// Record store kept in process memory.
#[derive(Debug)]
pub struct InMemoryConfigProvider {
    defaults: TenantDefaults,
    records: DashMap<TenantId, StorageRecord>,
}

impl InMemoryConfigProvider {
    pub fn new(defaults: TenantDefaults) -> Self {
        Self {
            defaults,
            records: DashMap::new(),
        }
    }

    /// Seed a record.
    pub fn insert(&self, record: StorageRecord) {
        self.records.insert(record.tenant_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.records.contains_key(tenant)
    }
}

#[async_trait]
impl TenantConfigProvider for InMemoryConfigProvider {
    async fn load_record(&self, tenant: &TenantId) -> Result<StorageRecord> {
        self.records
            .get(tenant)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound {
                tenant: tenant.to_string(),
            })
    }

    async fn save_record(&self, record: &StorageRecord) -> Result<()> {
        self.records.insert(record.tenant_id.clone(), record.clone());
        Ok(())
    }

    async fn create_default_record(&self, tenant: &TenantId) -> Result<StorageRecord> {
        let storage_path = tenant_base_path(&self.defaults.base_mount_path, tenant)?.join("storage");
        let mut record = StorageRecord::new(tenant.clone(), self.defaults.backend_kind, storage_path)
            .with_quota(self.defaults.quota_bytes);
        record.backend_parameters = self.defaults.backend_parameters.clone();
        debug!(tenant = %tenant, kind = %record.backend_kind, "Built default storage record");
        Ok(record)
    }

    async fn delete_record(&self, tenant: &TenantId) -> Result<()> {
        self.records.remove(tenant);
        Ok(())
    }
}
