//! tenantns - Multi-Tenant Storage Namespace Manager
//!
//! Lazily provisions, mounts, isolates, quota-limits and tears down
//! per-tenant storage backends, with a stripe-aware parallel I/O engine for
//! large objects on striped parallel filesystems.
//!
//! # Architecture
//!
//! ```text
//! NamespaceRegistry ──► BackendLifecycle ──► MountExecutor ──► CommandRunner
//!        │                     │
//!        ▼                     ▼
//!  BackendHandle ──► ObjectStore (PosixObjectStore │ StripedObjectStore │ proxy)
//!        │                                              │
//!        ▼                                              ▼
//!   Quota Guard                               StripePlanner + ParallelIo
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory config provider and event publishers
//! - [`backend`] - Object store contract, POSIX store and backend handles
//! - [`config`] - Namespace configuration and duration parsing
//! - [`domain`] - Ports and domain events
//! - [`error`] - Error types
//! - [`lifecycle`] - Mount state machine and backend provisioning
//! - [`mount`] - Mount/unmount process orchestration
//! - [`registry`] - Tenant to backend registry
//! - [`stripe`] - Stripe planning and parallel I/O
//! - [`tenant`] - Storage records, quotas and path isolation

pub mod adapters;
pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod mount;
pub mod registry;
pub mod stripe;
pub mod tenant;

// Re-export commonly used types
pub use backend::{BackendHandle, ByteRange, ObjectInfo, ObjectStore};
pub use config::NamespaceConfig;
pub use error::{Error, Result};
pub use lifecycle::BackendLifecycle;
pub use registry::{NamespaceRegistry, TenantStatus};
pub use tenant::{BackendKind, MountState, StorageRecord, TenantId};
