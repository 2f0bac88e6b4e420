//! Domain Layer
//!
//! - **Ports** (`ports.rs`) - trait abstractions for external collaborators
//! - **Events** (`events.rs`) - domain events for audit and decoupling
//!
//! # Usage
//!
//! ```ignore
//! use tenantns::domain::{DomainEvent, EventPublisher, TenantConfigProvider};
//!
//! async fn provision<C: TenantConfigProvider>(config: &C, tenant: &TenantId) -> Result<()> {
//!     let record = config.create_default_record(tenant).await?;
//!     config.save_record(&record).await
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{DomainEvent, ReleaseReason};
pub use ports::{EventPublisher, ProxyConnector, TenantConfigProvider};
