//! Mount Executor
//!
//! Builds `mount`/`umount` invocations for the filesystem backend kinds and
//! runs them under a deadline. Knows nothing about tenants.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::command::{redact_argv, CommandRunner};
use crate::error::{Error, Result};
use crate::tenant::{BackendParams, NfsVersion};

/// A filesystem-specific mount invocation, independent of the target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Value passed to `mount -t`
    pub fs_type: String,
    /// Device / remote source specification
    pub source: String,
    /// Options folded into a single `-o` list
    pub options: Vec<String>,
}

impl MountRequest {
    /// Build the mount request for a backend, or `None` for kinds that are not mounted.
    pub fn from_params(params: &BackendParams) -> Option<Self> {
        match params {
            BackendParams::Posix | BackendParams::Proxy(_) => None,
            BackendParams::CephFs(p) => {
                let mut options = Vec::new();
                if let Some(user) = p.username.as_deref().filter(|u| !u.is_empty()) {
                    options.push(format!("name={}", user));
                }
                if let Some(secret) = p.secret_key.as_deref().filter(|s| !s.is_empty()) {
                    options.push(format!("secret={}", secret));
                }
                options.extend(p.options.iter().cloned());
                Some(Self {
                    fs_type: "ceph".to_string(),
                    source: format!("{}:{}", p.monitor_addresses.join(","), p.path),
                    options,
                })
            }
            BackendParams::Nfs(p) => Some(Self {
                fs_type: match p.version {
                    NfsVersion::Nfs3 => "nfs",
                    NfsVersion::Nfs4 => "nfs4",
                }
                .to_string(),
                source: format!("{}:{}", p.server_address, p.export_path),
                options: p.options.clone(),
            }),
            BackendParams::Lustre(p) => Some(Self {
                fs_type: "lustre".to_string(),
                source: format!("{}:/{}", p.mgs_nodes.join(","), p.filesystem),
                options: p.options.clone(),
            }),
        }
    }

    /// Full argv for mounting at `target`.
    pub fn argv(&self, target: &Path) -> Vec<String> {
        let mut argv = vec![
            "mount".to_string(),
            "-t".to_string(),
            self.fs_type.clone(),
            self.source.clone(),
            target.display().to_string(),
        ];
        if !self.options.is_empty() {
            argv.push("-o".to_string());
            argv.push(self.options.join(","));
        }
        argv
    }
}

/// Argv for unmounting `target`.
pub fn unmount_argv(target: &Path, forced: bool) -> Vec<String> {
    let mut argv = vec!["umount".to_string()];
    if forced {
        argv.push("-f".to_string());
    }
    argv.push(target.display().to_string());
    argv
}

/// Runs mount and unmount commands with deadlines.
#[derive(Clone)]
pub struct MountExecutor {
    runner: Arc<dyn CommandRunner>,
}

impl MountExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Mount `request` at `target`, creating the mount point first.
    #[instrument(skip(self, request), fields(fs_type = %request.fs_type, target = %target.display()))]
    pub async fn mount(&self, request: &MountRequest, target: &Path, timeout: Duration) -> Result<()> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| Error::MountFailed {
                target: target.to_path_buf(),
                reason: format!("cannot create mount point: {}", e),
                output: String::new(),
            })?;

        let argv = request.argv(target);
        debug!(command = %redact_argv(&argv), "Mounting");

        let out = self.runner.run(&argv, timeout).await.map_err(|e| Error::MountFailed {
            target: target.to_path_buf(),
            reason: e.to_string(),
            output: String::new(),
        })?;

        if !out.success() {
            warn!(output = %out.output.trim(), "Mount failed");
            return Err(Error::MountFailed {
                target: target.to_path_buf(),
                reason: out.failure_reason(timeout),
                output: out.output,
            });
        }

        info!(elapsed_ms = out.duration.as_millis() as u64, "Mounted");
        Ok(())
    }

    /// Unmount `target`; `forced` adds `-f`.
    #[instrument(skip(self), fields(target = %target.display()))]
    pub async fn unmount(&self, target: &Path, timeout: Duration, forced: bool) -> Result<()> {
        let argv = unmount_argv(target, forced);
        let out = self.runner.run(&argv, timeout).await.map_err(|e| Error::UnmountFailed {
            target: target.to_path_buf(),
            reason: e.to_string(),
            output: String::new(),
        })?;

        if !out.success() {
            return Err(Error::UnmountFailed {
                target: target.to_path_buf(),
                reason: out.failure_reason(timeout),
                output: out.output,
            });
        }

        debug!("Unmounted");
        Ok(())
    }
}
