//! Error types for the tenant namespace manager

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tenant namespace manager
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    // =========================================================================
    // Tenant Errors
    // =========================================================================
    /// Storage record (or tenant) absent
    #[error("Storage record not found for tenant: {tenant}")]
    NotFound { tenant: String },

    /// Write rejected by the quota guard
    #[error(
        "Quota exceeded for tenant {tenant}: used {used_bytes} + requested {requested_bytes} > quota {quota_bytes}"
    )]
    QuotaExceeded {
        tenant: String,
        used_bytes: u64,
        requested_bytes: u64,
        quota_bytes: u64,
    },

    /// Storage path resolves outside the base mount root
    #[error("Path {path} escapes namespace root {root}")]
    PathEscapesRoot { path: PathBuf, root: PathBuf },

    /// Admission limit on concurrently active tenants
    #[error("Active tenant limit of {limit} reached")]
    TenantLimitReached { limit: usize },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Unknown backend kind in configuration
    #[error("Invalid backend kind: {0}")]
    InvalidBackendKind(String),

    /// Backend parameters could not be decoded for the kind
    #[error("Invalid {kind} backend configuration: {reason}")]
    InvalidBackendConfig { kind: String, reason: String },

    /// Backend construction failed; shared by every caller that waited on the attempt
    #[error("Backend construction failed for tenant {tenant}: {source}")]
    BackendConstruction {
        tenant: String,
        #[source]
        source: Arc<Error>,
    },

    /// Backend cannot be built or reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Handle used after the tenant was released
    #[error("Backend handle for tenant {tenant} has been revoked")]
    BackendRevoked { tenant: String },

    /// Mount state machine violation
    #[error("Invalid mount state transition for tenant {tenant}: {from} -> {to}")]
    InvalidTransition {
        tenant: String,
        from: String,
        to: String,
    },

    // =========================================================================
    // Mount Errors
    // =========================================================================
    /// Mount command failed or timed out
    #[error("Mount of {target} failed: {reason}")]
    MountFailed {
        target: PathBuf,
        reason: String,
        output: String,
    },

    /// Unmount command failed or timed out
    #[error("Unmount of {target} failed: {reason}")]
    UnmountFailed {
        target: PathBuf,
        reason: String,
        output: String,
    },

    /// External helper command (other than mount/umount) failed
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed {
        command: String,
        reason: String,
        output: String,
    },

    // =========================================================================
    // Striping / Parallel I/O Errors
    // =========================================================================
    /// Stripe descriptor cannot be used for decomposition
    #[error("Invalid stripe layout: {0}")]
    InvalidStripeLayout(String),

    /// A chunk of a parallel read failed
    #[error("Chunk {chunk_index} read at offset {offset} failed: {source}")]
    ChunkReadFailed {
        chunk_index: usize,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A chunk of a parallel write failed
    #[error("Chunk {chunk_index} write at offset {offset} failed: {source}")]
    ChunkWriteFailed {
        chunk_index: usize,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Request cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    // =========================================================================
    // Object Errors
    // =========================================================================
    /// Object does not exist
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Bucket or key name rejected
    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),
}

impl Error {
    /// Whether the caller may retry the same operation without changing configuration.
    ///
    /// Mount and unmount failures are retriable after operator intervention;
    /// chunk failures abort the whole transfer and may be reissued.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::MountFailed { .. }
            | Error::UnmountFailed { .. }
            | Error::CommandFailed { .. }
            | Error::ChunkReadFailed { .. }
            | Error::ChunkWriteFailed { .. }
            | Error::BackendUnavailable(_)
            | Error::TenantLimitReached { .. }
            | Error::Cancelled => true,
            Error::BackendConstruction { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether the error can only be resolved by fixing configuration.
    pub fn needs_config_fix(&self) -> bool {
        match self {
            Error::Config(_)
            | Error::DurationParse(_)
            | Error::InvalidBackendKind(_)
            | Error::InvalidBackendConfig { .. }
            | Error::PathEscapesRoot { .. }
            | Error::InvalidStripeLayout(_) => true,
            Error::BackendConstruction { source, .. } => source.needs_config_fix(),
            _ => false,
        }
    }

    /// Wrap an error so it can be handed to several waiting callers.
    pub(crate) fn shared(tenant: &str, err: Arc<Error>) -> Self {
        Error::BackendConstruction {
            tenant: tenant.to_string(),
            source: err,
        }
    }
}
