//! Backend Lifecycle
//!
//! Mount-state machine and the manager that provisions and tears down a
//! tenant's backend. Per-tenant serialisation is the registry's job.

mod manager;
mod state;

pub use manager::{BackendLifecycle, Provisioned};
