//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the namespace core depends on. Infrastructure adapters
//! implement these traits; the registry and lifecycle only see the traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Namespace Core                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │ TenantConfigProvider │ ProxyConnector │ EventPublisher│   │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  InMemoryConfigProvider │ LoggingEventPublisher │ ...        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::events::DomainEvent;
use crate::backend::ObjectStore;
use crate::error::Result;
use crate::tenant::{ProxyParams, StorageRecord, TenantId};

// =============================================================================
// Tenant Configuration Port
// =============================================================================

/// Source of per-tenant storage records.
///
/// Persistence format and location are the implementor's concern.
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    /// Load a tenant's record; `Error::NotFound` when none exists.
    async fn load_record(&self, tenant: &TenantId) -> Result<StorageRecord>;

    /// Persist a record, replacing any previous one.
    async fn save_record(&self, record: &StorageRecord) -> Result<()>;

    /// Build (without saving) the record a first-time tenant gets.
    async fn create_default_record(&self, tenant: &TenantId) -> Result<StorageRecord>;

    /// Remove a tenant's record. Removing an absent record is not an error.
    async fn delete_record(&self, tenant: &TenantId) -> Result<()>;
}

// =============================================================================
// Object Proxy Port
// =============================================================================

/// Builds object stores for the proxy backend kinds.
///
/// The S3 client stack lives outside this crate; the lifecycle only checks
/// that the endpoint answers before asking for a store.
#[async_trait]
pub trait ProxyConnector: Send + Sync {
    async fn connect(&self, tenant: &TenantId, params: &ProxyParams) -> Result<Arc<dyn ObjectStore>>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}

/// Publish, logging instead of failing the caller's operation.
pub(crate) async fn publish_quietly(publisher: &dyn EventPublisher, event: DomainEvent) {
    let event_type = event.event_type();
    if let Err(e) = publisher.publish(event).await {
        warn!(event_type, error = %e, "Failed to publish domain event");
    }
}
