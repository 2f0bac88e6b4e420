//! Typed backend parameters
//!
//! `StorageRecord::backend_parameters` is an open string map; each kind
//! decodes it once into its own struct so that missing or malformed keys
//! fail at setup time with `InvalidBackendConfig`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::record::{BackendKind, StorageRecord};

/// CephFS mount parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CephFsParams {
    pub monitor_addresses: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default = "default_ceph_path")]
    pub path: String,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_ceph_path() -> String {
    "/".to_string()
}

/// NFS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfsVersion {
    #[default]
    Nfs3,
    Nfs4,
}

/// NFS mount parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfsParams {
    pub server_address: String,
    pub export_path: String,
    #[serde(default)]
    pub version: NfsVersion,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Lustre mount and striping parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LustreParams {
    pub mgs_nodes: Vec<String>,
    pub filesystem: String,
    /// Ceiling on planned stripe count (0 = tier policy only)
    #[serde(default)]
    pub stripe_count: u32,
    /// Stripe size in bytes (0 = global default)
    #[serde(default)]
    pub stripe_size: u64,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Object-proxy endpoint parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyParams {
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub bucket_prefix: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub use_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ProxyParams {
    /// Endpoint URL with a scheme, honouring `ssl` when none is given.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.ssl {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Decoded parameters, one variant per backend family.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendParams {
    Posix,
    CephFs(CephFsParams),
    Nfs(NfsParams),
    Lustre(LustreParams),
    Proxy(ProxyParams),
}

impl BackendParams {
    /// Decode the record's parameter map according to its kind.
    pub fn decode(record: &StorageRecord) -> Result<Self> {
        let kind = record.backend_kind;
        Ok(match kind {
            BackendKind::Posix => BackendParams::Posix,
            BackendKind::CephFs => {
                let params: CephFsParams = from_map(kind, record)?;
                if params.monitor_addresses.is_empty() {
                    return Err(invalid(kind, "monitor_addresses must not be empty"));
                }
                BackendParams::CephFs(params)
            }
            BackendKind::Nfs => BackendParams::Nfs(from_map(kind, record)?),
            BackendKind::Lustre => {
                let params: LustreParams = from_map(kind, record)?;
                if params.mgs_nodes.is_empty() {
                    return Err(invalid(kind, "mgs_nodes must not be empty"));
                }
                BackendParams::Lustre(params)
            }
            BackendKind::MinIo | BackendKind::RustFs => BackendParams::Proxy(from_map(kind, record)?),
        })
    }
}

fn from_map<T: DeserializeOwned>(kind: BackendKind, record: &StorageRecord) -> Result<T> {
    let map: serde_json::Map<String, serde_json::Value> = record
        .backend_parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| invalid(kind, &e.to_string()))
}

fn invalid(kind: BackendKind, reason: &str) -> Error {
    Error::InvalidBackendConfig {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_decode_nfs() {
        let record = StorageRecord::new("t1", BackendKind::Nfs, "/mnt/users/t1")
            .with_parameter("server_address", json!("nfs.example.com"))
            .with_parameter("export_path", json!("/exports/t1"))
            .with_parameter("version", json!("nfs4"))
            .with_parameter("options", json!(["rw", "sync"]));

        let params = BackendParams::decode(&record).unwrap();
        assert_matches!(params, BackendParams::Nfs(p) => {
            assert_eq!(p.version, NfsVersion::Nfs4);
            assert_eq!(p.options, vec!["rw", "sync"]);
        });
    }

    #[test]
    fn test_decode_missing_field() {
        let record = StorageRecord::new("t1", BackendKind::Nfs, "/mnt/users/t1")
            .with_parameter("server_address", json!("nfs.example.com"));
        assert_matches!(
            BackendParams::decode(&record),
            Err(Error::InvalidBackendConfig { kind, .. }) if kind == "nfs"
        );
    }

    #[test]
    fn test_decode_lustre_requires_mgs() {
        let record = StorageRecord::new("t1", BackendKind::Lustre, "/mnt/users/t1")
            .with_parameter("mgs_nodes", json!([]))
            .with_parameter("filesystem", json!("lfs01"));
        assert!(BackendParams::decode(&record).is_err());
    }

    #[test]
    fn test_proxy_endpoint_url() {
        let params = ProxyParams {
            endpoint: "minio.local:9000".into(),
            access_key: String::new(),
            secret_key: String::new(),
            region: default_region(),
            bucket_prefix: "vgw".into(),
            ssl: false,
            use_path_style: true,
        };
        assert_eq!(params.endpoint_url(), "http://minio.local:9000");
    }

    #[test]
    fn test_posix_ignores_parameters() {
        let record = StorageRecord::new("t1", BackendKind::Posix, "/mnt/users/t1")
            .with_parameter("anything", json!(1));
        assert_eq!(BackendParams::decode(&record).unwrap(), BackendParams::Posix);
    }
}
