//! Backend Lifecycle Manager
//!
//! Drives one tenant's backend through its mount states:
//!
//! ```text
//! Unmounted ──► Pending ──► Mounting ──► Ready ──► Unmounting ──► Unmounted
//!                  │  │         │                       │
//!                  │  └─► Ready (posix, proxy)          │
//!                  ▼            ▼                       ▼
//!                Error ◄────────┴───────────────────────┘
//! ```
//!
//! Callers serialise provision/teardown per tenant; this type holds no
//! per-tenant state of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::state::{advance, current, fail};
use crate::backend::{ObjectStore, PosixObjectStore};
use crate::config::{LifecycleTimeouts, NamespaceConfig, StripingConfig};
use crate::domain::ports::ProxyConnector;
use crate::error::{Error, Result};
use crate::mount::{CommandRunner, MountExecutor, MountRequest};
use crate::stripe::{LfsStripeTool, StripeLayoutTool, StripedObjectStore};
use crate::tenant::isolation::ensure_within_root;
use crate::tenant::{BackendParams, LustreParams, MountState, ProxyParams, StorageRecord, TenantId};

/// A backend that reached `Ready`.
pub struct Provisioned {
    pub store: Arc<dyn ObjectStore>,
    /// Whether an OS-level mount now exists at the storage path
    pub mounted: bool,
    pub elapsed: Duration,
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("mounted", &self.mounted)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// Builds and tears down tenant backends.
pub struct BackendLifecycle {
    executor: MountExecutor,
    layout: Arc<dyn StripeLayoutTool>,
    proxy: Option<Arc<dyn ProxyConnector>>,
    http: reqwest::Client,
    base_mount_path: PathBuf,
    timeouts: LifecycleTimeouts,
    striping: StripingConfig,
}

impl BackendLifecycle {
    pub fn new(config: &NamespaceConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let timeouts = config.timeouts()?;
        let http = reqwest::Client::builder()
            .timeout(timeouts.probe)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            layout: Arc::new(LfsStripeTool::new(Arc::clone(&runner), timeouts.mount)),
            executor: MountExecutor::new(runner),
            proxy: None,
            http,
            base_mount_path: config.base_mount_path.clone(),
            timeouts,
            striping: config.striping.clone(),
        })
    }

    /// Connector used to build object-proxy stores.
    pub fn with_proxy_connector(mut self, connector: Arc<dyn ProxyConnector>) -> Self {
        self.proxy = Some(connector);
        self
    }

    pub fn with_layout_tool(mut self, layout: Arc<dyn StripeLayoutTool>) -> Self {
        self.layout = layout;
        self
    }

    /// Bring the backend from `Unmounted` or `Error` to `Ready`.
    ///
    /// On failure the record is left in `Error`.
    #[instrument(skip(self, record), fields(tenant = %tenant))]
    pub async fn provision(&self, tenant: &TenantId, record: &RwLock<StorageRecord>) -> Result<Provisioned> {
        advance(record, MountState::Pending)?;
        let start = Instant::now();

        match self.bring_up(tenant, record).await {
            Ok((store, mounted)) => {
                let elapsed = start.elapsed();
                info!(mounted, elapsed_ms = elapsed.as_millis() as u64, "Backend ready");
                Ok(Provisioned {
                    store,
                    mounted,
                    elapsed,
                })
            }
            Err(e) => {
                warn!(error = %e, "Backend provisioning failed");
                fail(record);
                Err(e)
            }
        }
    }

    async fn bring_up(&self, tenant: &TenantId, record: &RwLock<StorageRecord>) -> Result<(Arc<dyn ObjectStore>, bool)> {
        let snapshot = record.read().clone();
        let path = ensure_within_root(&self.base_mount_path, &snapshot.storage_path)?;
        let params = BackendParams::decode(&snapshot)?;

        match &params {
            BackendParams::Posix => {
                tokio::fs::create_dir_all(&path).await?;
                advance(record, MountState::Ready)?;
                Ok((Arc::new(PosixObjectStore::new(path)), false))
            }
            BackendParams::Proxy(proxy) => {
                let connector = self.proxy.as_ref().ok_or_else(|| {
                    Error::BackendUnavailable(format!("no connector for {} backends", snapshot.backend_kind))
                })?;
                self.probe(proxy).await?;
                let store = connector.connect(tenant, proxy).await?;
                advance(record, MountState::Ready)?;
                Ok((store, false))
            }
            BackendParams::CephFs(_) | BackendParams::Nfs(_) | BackendParams::Lustre(_) => {
                let request = MountRequest::from_params(&params)
                    .ok_or_else(|| Error::Internal(format!("no mount request for {}", snapshot.backend_kind)))?;
                advance(record, MountState::Mounting)?;
                self.executor.mount(&request, &path, self.timeouts.mount).await?;

                let posix = PosixObjectStore::new(path);
                let store: Arc<dyn ObjectStore> = match &params {
                    BackendParams::Lustre(lustre) => Arc::new(StripedObjectStore::new(
                        posix,
                        Arc::clone(&self.layout),
                        &self.striping_for(lustre),
                    )),
                    _ => Arc::new(posix),
                };
                advance(record, MountState::Ready)?;
                Ok((store, true))
            }
        }
    }

    /// Tenant stripe settings override the global policy.
    fn striping_for(&self, lustre: &LustreParams) -> StripingConfig {
        let mut striping = self.striping.clone();
        if lustre.stripe_size > 0 {
            striping.stripe_size = lustre.stripe_size;
        }
        if lustre.stripe_count > 0 {
            striping.max_stripes = lustre.stripe_count;
        }
        striping
    }

    /// Any HTTP answer counts as reachable; auth is the connector's concern.
    async fn probe(&self, proxy: &ProxyParams) -> Result<()> {
        let url = proxy.endpoint_url();
        match self.http.get(&url).timeout(self.timeouts.probe).send().await {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Object endpoint reachable");
                Ok(())
            }
            Err(e) => Err(Error::BackendUnavailable(format!("{} unreachable: {}", url, e))),
        }
    }

    /// Take the backend from `Ready` or `Error` back to `Unmounted`.
    ///
    /// Graceful teardown tries `umount` then `umount -f`; forced teardown
    /// goes straight to `umount -f`. If unmounting fails the record ends in
    /// `Error` and the mount is still considered present.
    #[instrument(skip(self, record), fields(tenant = %tenant))]
    pub async fn teardown(&self, tenant: &TenantId, record: &RwLock<StorageRecord>, mounted: bool, forced: bool) -> Result<()> {
        if current(record) == MountState::Unmounted {
            return Ok(());
        }
        advance(record, MountState::Unmounting)?;

        if mounted {
            let path = record.read().storage_path.clone();
            if let Err(e) = self.unmount(&path, forced).await {
                fail(record);
                return Err(e);
            }
        }

        advance(record, MountState::Unmounted)?;
        info!("Backend torn down");
        Ok(())
    }

    async fn unmount(&self, path: &Path, forced: bool) -> Result<()> {
        if !forced {
            match self.executor.unmount(path, self.timeouts.unmount, false).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(error = %e, "Graceful unmount failed, forcing"),
            }
        }
        self.executor.unmount(path, self.timeouts.unmount, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::ScriptedRunner;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct LocalConnector(PathBuf);

    #[async_trait]
    impl ProxyConnector for LocalConnector {
        async fn connect(&self, _tenant: &TenantId, _params: &ProxyParams) -> Result<Arc<dyn ObjectStore>> {
            Ok(Arc::new(PosixObjectStore::new(&self.0)))
        }
    }

    fn lifecycle(base: &Path, runner: Arc<ScriptedRunner>) -> BackendLifecycle {
        let config = NamespaceConfig {
            base_mount_path: base.to_path_buf(),
            mount_timeout: "1s".into(),
            unmount_timeout: "1s".into(),
            probe_timeout: "2s".into(),
            ..NamespaceConfig::default()
        };
        BackendLifecycle::new(&config, runner).unwrap()
    }

    fn record(base: &Path, kind: crate::tenant::BackendKind) -> RwLock<StorageRecord> {
        RwLock::new(StorageRecord::new("t1", kind, base.join("users/t1/storage")))
    }

    async fn http_stub() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_posix_provision_skips_mount() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let lc = lifecycle(dir.path(), runner.clone());
        let rec = record(dir.path(), crate::tenant::BackendKind::Posix);

        let up = lc.provision(&TenantId::new("t1"), &rec).await.unwrap();
        assert!(!up.mounted);
        assert_eq!(current(&rec), MountState::Ready);
        assert!(runner.calls().is_empty());

        up.store.put("b", "k", Bytes::from_static(b"v")).await.unwrap();
        assert!(dir.path().join("users/t1/storage/b/k").is_file());
    }

    #[tokio::test]
    async fn test_nfs_provision_and_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let lc = lifecycle(dir.path(), runner.clone());
        let rec = record(dir.path(), crate::tenant::BackendKind::Nfs);
        {
            let mut r = rec.write();
            r.backend_parameters.insert("server_address".into(), json!("nfs1"));
            r.backend_parameters.insert("export_path".into(), json!("/exports/t1"));
        }
        let tenant = TenantId::new("t1");

        let up = lc.provision(&tenant, &rec).await.unwrap();
        assert!(up.mounted);
        assert_eq!(runner.count("mount -t nfs nfs1:/exports/t1"), 1);

        lc.teardown(&tenant, &rec, true, false).await.unwrap();
        assert_eq!(current(&rec), MountState::Unmounted);
        assert_eq!(runner.count("umount"), 1);
    }

    #[tokio::test]
    async fn test_mount_failure_leaves_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("mount", 32, "mount error(2): No such file or directory");
        let lc = lifecycle(dir.path(), runner);
        let rec = record(dir.path(), crate::tenant::BackendKind::CephFs);
        rec.write()
            .backend_parameters
            .insert("monitor_addresses".into(), json!(["mon1:6789"]));

        let err = lc.provision(&TenantId::new("t1"), &rec).await.unwrap_err();
        assert_matches!(err, Error::MountFailed { .. });
        assert_eq!(current(&rec), MountState::Error);
    }

    #[tokio::test]
    async fn test_path_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let lc = lifecycle(&dir.path().join("base"), Arc::new(ScriptedRunner::new()));
        let rec = RwLock::new(StorageRecord::new(
            "t1",
            crate::tenant::BackendKind::Posix,
            dir.path().join("base/../elsewhere"),
        ));

        let err = lc.provision(&TenantId::new("t1"), &rec).await.unwrap_err();
        assert_matches!(err, Error::PathEscapesRoot { .. });
        assert_eq!(current(&rec), MountState::Error);
    }

    #[tokio::test]
    async fn test_graceful_unmount_falls_back_to_forced() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("umount /", 32, "target is busy");
        let lc = lifecycle(dir.path(), runner.clone());
        let rec = record(dir.path(), crate::tenant::BackendKind::Lustre);
        rec.write()
            .backend_parameters
            .insert("mgs_nodes".into(), json!(["mgs@tcp"]));
        rec.write().backend_parameters.insert("filesystem".into(), json!("lfs"));
        let tenant = TenantId::new("t1");

        lc.provision(&tenant, &rec).await.unwrap();
        lc.teardown(&tenant, &rec, true, false).await.unwrap();
        assert_eq!(runner.count("umount /"), 1);
        assert_eq!(runner.count("umount -f"), 1);
        assert_eq!(current(&rec), MountState::Unmounted);
    }

    #[tokio::test]
    async fn test_unmount_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("umount", 16, "device is busy");
        let lc = lifecycle(dir.path(), runner.clone());
        let rec = record(dir.path(), crate::tenant::BackendKind::Nfs);
        rec.write().backend_parameters.insert("server_address".into(), json!("s"));
        rec.write().backend_parameters.insert("export_path".into(), json!("/e"));
        let tenant = TenantId::new("t1");

        lc.provision(&tenant, &rec).await.unwrap();
        let err = lc.teardown(&tenant, &rec, true, true).await.unwrap_err();
        assert_matches!(err, Error::UnmountFailed { .. });
        assert_eq!(current(&rec), MountState::Error);
        assert_eq!(runner.count("umount -f"), 1);
        assert_eq!(runner.count("umount /"), 0);
    }

    #[tokio::test]
    async fn test_proxy_without_connector_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lc = lifecycle(dir.path(), Arc::new(ScriptedRunner::new()));
        let rec = record(dir.path(), crate::tenant::BackendKind::MinIo);
        rec.write().backend_parameters.insert("endpoint".into(), json!("127.0.0.1:1"));

        let err = lc.provision(&TenantId::new("t1"), &rec).await.unwrap_err();
        assert_matches!(err, Error::BackendUnavailable(_));
        assert_eq!(current(&rec), MountState::Error);
    }

    #[tokio::test]
    async fn test_proxy_probe_then_connect() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = http_stub().await;
        let lc = lifecycle(dir.path(), Arc::new(ScriptedRunner::new()))
            .with_proxy_connector(Arc::new(LocalConnector(dir.path().to_path_buf())));
        let rec = record(dir.path(), crate::tenant::BackendKind::RustFs);
        rec.write().backend_parameters.insert("endpoint".into(), json!(endpoint));

        let up = lc.provision(&TenantId::new("t1"), &rec).await.unwrap();
        assert!(!up.mounted);
        assert_eq!(current(&rec), MountState::Ready);
    }

    #[tokio::test]
    async fn test_proxy_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let lc = lifecycle(dir.path(), Arc::new(ScriptedRunner::new()))
            .with_proxy_connector(Arc::new(LocalConnector(dir.path().to_path_buf())));
        let rec = record(dir.path(), crate::tenant::BackendKind::MinIo);
        rec.write().backend_parameters.insert("endpoint".into(), json!(closed));

        let err = lc.provision(&TenantId::new("t1"), &rec).await.unwrap_err();
        assert_matches!(err, Error::BackendUnavailable(msg) if msg.contains("unreachable"));
    }

    #[tokio::test]
    async fn test_teardown_of_unmounted_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let lc = lifecycle(dir.path(), runner.clone());
        let rec = record(dir.path(), crate::tenant::BackendKind::Nfs);
        lc.teardown(&TenantId::new("t1"), &rec, false, false).await.unwrap();
        assert!(runner.calls().is_empty());
    }
}
