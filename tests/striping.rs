//! Striped I/O integration tests
//!
//! Covers stripe planning, parallel reads against plain reads, and the
//! Lustre tenant path through the registry with a scripted `lfs`.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use tenantns::adapters::{InMemoryConfigProvider, InMemoryEventCollector, TenantDefaults};
use tenantns::config::StripingConfig;
use tenantns::mount::ScriptedRunner;
use tenantns::stripe::{decompose_range, plan_striping_for_size, ParallelIo, StripeDescriptor};
use tenantns::{
    BackendKind, BackendLifecycle, ByteRange, NamespaceConfig, NamespaceRegistry, StorageRecord, TenantId,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// =============================================================================
// Planning
// =============================================================================

mod planning_tests {
    use super::*;

    #[test]
    fn test_size_tiers() {
        assert_eq!(plan_striping_for_size(500 * 1024, 0).stripe_count, 1);
        assert_eq!(plan_striping_for_size(50 * MIB, 0).stripe_count, 2);
        assert_eq!(plan_striping_for_size(500 * MIB, 0).stripe_count, 4);
        assert_eq!(plan_striping_for_size(2 * GIB, 0).stripe_count, 8);
    }

    #[test]
    fn test_configured_cap() {
        assert_eq!(plan_striping_for_size(2 * GIB, 3).stripe_count, 3);
        assert_eq!(plan_striping_for_size(500 * 1024, 3).stripe_count, 1);
    }

    #[test]
    fn test_unaligned_range_decomposition() {
        let descriptor = StripeDescriptor::new(4, 1024);
        let chunks = decompose_range(1000, 2100, &descriptor).unwrap();

        let spans: Vec<_> = chunks.iter().map(|c| (c.offset, c.len, c.stripe_index)).collect();
        assert_eq!(spans, vec![(1000, 24, 0), (1024, 1024, 1), (2048, 1024, 2), (3072, 28, 3)]);
    }
}

// =============================================================================
// Parallel I/O
// =============================================================================

mod parallel_io_tests {
    use super::*;

    #[tokio::test]
    async fn test_parallel_read_matches_plain_read() {
        let data = payload(64 * 1024 + 17);
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&data).unwrap();
        let file = Arc::new(file);

        let io = ParallelIo::new(4);
        let descriptor = StripeDescriptor::new(4, 4096);
        let cancel = CancellationToken::new();

        let whole = io
            .read(Arc::clone(&file), 0, data.len() as u64, &descriptor, &cancel)
            .await
            .unwrap();
        assert_eq!(whole.as_ref(), data.as_slice());

        let middle = io.read(Arc::clone(&file), 5000, 20_000, &descriptor, &cancel).await.unwrap();
        assert_eq!(middle.as_ref(), &data[5000..25_000]);
    }

    #[tokio::test]
    async fn test_parallel_write_lands_every_chunk() {
        let data = payload(10 * 1024);
        let file = Arc::new(tempfile::tempfile().unwrap());
        file.set_len(data.len() as u64).unwrap();

        let io = ParallelIo::new(3);
        let descriptor = StripeDescriptor::new(3, 1024);
        let cancel = CancellationToken::new();

        io.write(Arc::clone(&file), 0, Bytes::from(data.clone()), &descriptor, &cancel)
            .await
            .unwrap();
        let back = io
            .read(Arc::clone(&file), 0, data.len() as u64, &StripeDescriptor::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
    }
}

// =============================================================================
// Lustre Tenants
// =============================================================================

mod lustre_tests {
    use super::*;

    struct Lustre {
        dir: tempfile::TempDir,
        registry: NamespaceRegistry,
        runner: Arc<ScriptedRunner>,
        provider: Arc<InMemoryConfigProvider>,
    }

    fn lustre() -> Lustre {
        let dir = tempfile::tempdir().unwrap();
        let mut defaults = BTreeMap::new();
        defaults.insert("mgs_nodes".to_string(), serde_json::json!(["mgs1@tcp"]));
        defaults.insert("filesystem".to_string(), serde_json::json!("lfs01"));
        let config = NamespaceConfig {
            base_mount_path: dir.path().to_path_buf(),
            default_backend: "lustre".to_string(),
            backend_defaults: defaults,
            striping: StripingConfig {
                stripe_size: 1024,
                max_stripes: 0,
                large_object_threshold: 0,
                max_parallelism: 4,
            },
            ..NamespaceConfig::default()
        };

        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("lfs getstripe", "2\n1024\n-1\n");
        let provider = Arc::new(InMemoryConfigProvider::new(TenantDefaults::from_config(&config).unwrap()));
        let lifecycle = BackendLifecycle::new(&config, runner.clone()).unwrap();
        let registry = NamespaceRegistry::new(
            lifecycle,
            provider.clone(),
            Arc::new(InMemoryEventCollector::new()),
            0,
        );
        Lustre {
            dir,
            registry,
            runner,
            provider,
        }
    }

    #[tokio::test]
    async fn test_large_object_round_trips_through_striped_path() {
        let l = lustre();
        let tenant = TenantId::new("hpc");
        let handle = l.registry.acquire_backend(&tenant).await.unwrap();
        assert_eq!(l.runner.count("mount -t lustre"), 1);

        let data = payload(10_000);
        let info = handle.put("runs", "out.bin", Bytes::from(data.clone())).await.unwrap();
        assert_eq!(info.size, 10_000);
        // directory hint plus the pre-created file
        assert_eq!(l.runner.count("lfs setstripe"), 2);

        let back = handle.get("runs", "out.bin", None).await.unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
        let range = handle
            .get("runs", "out.bin", Some(ByteRange::new(1500, 3000)))
            .await
            .unwrap();
        assert_eq!(range.as_ref(), &data[1500..4500]);
        assert!(l.runner.count("lfs getstripe") >= 2);
        assert_eq!(handle.used_bytes(), 10_000);
    }

    #[tokio::test]
    async fn test_small_object_skips_layout_query() {
        let l = lustre();
        let handle = l.registry.acquire_backend(&TenantId::new("hpc")).await.unwrap();

        handle.put("runs", "tiny", Bytes::from_static(b"small")).await.unwrap();
        let back = handle.get("runs", "tiny", None).await.unwrap();

        assert_eq!(back, Bytes::from_static(b"small"));
        assert_eq!(l.runner.count("lfs setstripe"), 1);
        assert_eq!(l.runner.count("lfs getstripe"), 0);
    }

    #[tokio::test]
    async fn test_layout_failure_on_get_falls_back_to_plain_read() {
        let l = lustre();
        let handle = l.registry.acquire_backend(&TenantId::new("hpc")).await.unwrap();
        let data = payload(8192);
        handle.put("runs", "obj", Bytes::from(data.clone())).await.unwrap();

        l.runner.clear_rules();
        l.runner.fail("lfs getstripe", 2, "No such device");
        let back = handle.get("runs", "obj", None).await.unwrap();
        assert_eq!(back.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_tenant_stripe_size_overrides_global() {
        let l = lustre();
        let tenant = TenantId::new("tuned");
        let storage = l.dir.path().join("users").join("tuned").join("storage");
        l.provider.insert(
            StorageRecord::new("tuned", BackendKind::Lustre, storage)
                .with_parameter("mgs_nodes", serde_json::json!(["mgs1@tcp"]))
                .with_parameter("filesystem", serde_json::json!("lfs01"))
                .with_parameter("stripe_size", serde_json::json!(4096)),
        );

        let handle = l.registry.acquire_backend(&tenant).await.unwrap();
        handle
            .put("runs", "big", Bytes::from(payload(20_000)))
            .await
            .unwrap();

        assert_eq!(l.runner.count("lfs setstripe -c 1 -S 4096"), 2);
        assert_eq!(l.runner.count("lfs setstripe -c 1 -S 1024"), 0);
    }
}
