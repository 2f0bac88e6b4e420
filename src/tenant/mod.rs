//! Tenant Domain
//!
//! Storage records, backend parameters, the quota guard and path
//! isolation rules. Everything here is synchronous and free of I/O.

pub mod isolation;
pub mod params;
pub mod quota;
pub mod record;

pub use params::{BackendParams, CephFsParams, LustreParams, NfsParams, NfsVersion, ProxyParams};
pub use quota::{check_quota, update_used_space};
pub use record::{BackendKind, MountState, StorageRecord, TenantId};
