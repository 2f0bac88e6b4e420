//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Domain Ports                            │
//! │        TenantConfigProvider   │   EventPublisher               │
//! └───────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   Adapters (This Module)                       │
//! │  InMemoryConfigProvider │ LoggingEventPublisher │              │
//! │  InMemoryEventCollector │ CompositeEventPublisher              │
//! └───────────────────────────────────────────────────────────────┘
//! ```

mod config_provider;
mod event_publisher;

pub use config_provider::{InMemoryConfigProvider, TenantDefaults};
pub use event_publisher::{CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher};
