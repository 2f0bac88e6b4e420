//! Namespace Manager Configuration
//!
//! Global settings shared by every tenant: where namespaces are rooted,
//! which backend new tenants receive, lifecycle timeouts and striping
//! policy. Loaded from YAML or JSON; durations are human strings such as
//! `30s`, `15m`, `1h30m` or `250ms`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stripe::DEFAULT_STRIPE_SIZE;
use crate::tenant::BackendKind;

// =============================================================================
// Defaults
// =============================================================================

/// Default root under which every tenant namespace lives
pub const DEFAULT_BASE_MOUNT_PATH: &str = "/var/lib/tenantns/mounts";

/// Default maximum number of simultaneously active tenants
pub const DEFAULT_MAX_TENANTS: usize = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Global configuration of the namespace manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Root directory; every tenant storage path must stay beneath it
    pub base_mount_path: PathBuf,

    /// Backend kind assigned to tenants without a record
    pub default_backend: String,

    /// Quota for new tenants in bytes (0 = unlimited)
    pub default_quota_bytes: u64,

    /// Parameters copied into every default record
    pub backend_defaults: BTreeMap<String, serde_json::Value>,

    /// Hard deadline for a mount command
    pub mount_timeout: String,

    /// Hard deadline for each unmount attempt
    pub unmount_timeout: String,

    /// Deadline for object-proxy connectivity probes
    pub probe_timeout: String,

    /// Tenants idle for longer than this are released by the reaper
    pub idle_timeout: String,

    /// Maximum number of active tenants (0 = unlimited)
    pub max_tenants: usize,

    /// Striping policy for parallel-filesystem tenants
    pub striping: StripingConfig,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            base_mount_path: PathBuf::from(DEFAULT_BASE_MOUNT_PATH),
            default_backend: "posix".to_string(),
            default_quota_bytes: 0,
            backend_defaults: BTreeMap::new(),
            mount_timeout: "30s".to_string(),
            unmount_timeout: "15s".to_string(),
            probe_timeout: "5s".to_string(),
            idle_timeout: "30m".to_string(),
            max_tenants: DEFAULT_MAX_TENANTS,
            striping: StripingConfig::default(),
        }
    }
}

/// Striping policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripingConfig {
    /// Stripe size in bytes used when planning new objects
    pub stripe_size: u64,

    /// Upper bound on planned stripe count (0 = tier policy only)
    pub max_stripes: u32,

    /// Objects larger than this use the parallel path (0 = 2 x stripe size)
    pub large_object_threshold: u64,

    /// Worker ceiling for parallel I/O (0 = available parallelism)
    pub max_parallelism: usize,
}

impl Default for StripingConfig {
    fn default() -> Self {
        Self {
            stripe_size: DEFAULT_STRIPE_SIZE,
            max_stripes: 0,
            large_object_threshold: 0,
            max_parallelism: 0,
        }
    }
}

/// Timeouts used by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimeouts {
    pub mount: Duration,
    pub unmount: Duration,
    pub probe: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            mount: Duration::from_secs(30),
            unmount: Duration::from_secs(15),
            probe: Duration::from_secs(5),
        }
    }
}

impl NamespaceConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension).
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            _ => serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if !self.base_mount_path.is_absolute() {
            return Err(Error::Config(format!(
                "base_mount_path must be absolute: {}",
                self.base_mount_path.display()
            )));
        }
        self.default_backend_kind()?;
        self.timeouts()?;
        self.idle_timeout()?;
        if self.striping.stripe_size == 0 {
            return Err(Error::Config("striping.stripe_size must be > 0".into()));
        }
        Ok(())
    }

    /// Decode the default backend kind.
    pub fn default_backend_kind(&self) -> Result<BackendKind> {
        self.default_backend.parse()
    }

    /// Parsed lifecycle timeouts.
    pub fn timeouts(&self) -> Result<LifecycleTimeouts> {
        Ok(LifecycleTimeouts {
            mount: parse_duration(&self.mount_timeout)?,
            unmount: parse_duration(&self.unmount_timeout)?,
            probe: parse_duration(&self.probe_timeout)?,
        })
    }

    /// Parsed idle timeout.
    pub fn idle_timeout(&self) -> Result<Duration> {
        parse_duration(&self.idle_timeout)
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration string like "30s", "15m", "1h30m" or "250ms".
///
/// A trailing bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let multiplier = match c {
            'm' | 'M' if matches!(chars.peek(), Some('s') | Some('S')) => {
                chars.next();
                1
            }
            'h' | 'H' => 3_600_000,
            'm' | 'M' => 60_000,
            's' | 'S' => 1_000,
            'd' | 'D' => 86_400_000,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_ms = total_ms.saturating_add(num.saturating_mul(multiplier));
    }

    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_ms = total_ms.saturating_add(num.saturating_mul(1_000));
    }

    if total_ms == 0 {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }

    Ok(Duration::from_millis(total_ms))
}
