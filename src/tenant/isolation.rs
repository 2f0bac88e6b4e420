//! Namespace isolation
//!
//! Containment is decided on normalised path components, never by string
//! prefix: `/mnt/users/t10` is not inside `/mnt/users/t1`, and `..` segments
//! are resolved before comparing.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

use super::record::TenantId;

/// Lexically normalise a path: drop `.` segments and resolve `..` against
/// preceding normal components. `..` at the root is discarded.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Whether `path` is `root` itself or lies beneath it.
pub fn is_within(root: &Path, path: &Path) -> bool {
    let root = normalize(root);
    let path = normalize(path);
    match path.strip_prefix(&root) {
        Ok(rel) => !rel
            .components()
            .any(|c| matches!(c, Component::ParentDir)),
        Err(_) => false,
    }
}

/// Return the normalised `path` if it is absolute and contained in `root`.
pub fn ensure_within_root(root: &Path, path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() || !is_within(root, path) {
        return Err(Error::PathEscapesRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(normalize(path))
}

/// Base directory of a tenant: `<root>/users/<tenant>`.
///
/// Tenant identifiers that are empty or contain path syntax are rejected.
pub fn tenant_base_path(root: &Path, tenant: &TenantId) -> Result<PathBuf> {
    let id = tenant.as_str();
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains('/')
        && !id.contains('\\')
        && !id.contains('\0');
    if !valid {
        return Err(Error::PathEscapesRoot {
            path: root.join("users").join(id),
            root: root.to_path_buf(),
        });
    }
    ensure_within_root(root, &root.join("users").join(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_normalize_resolves_parent_segments() {
        assert_eq!(
            normalize(Path::new("/mnt/users/t1/../t2/./data")),
            PathBuf::from("/mnt/users/t2/data")
        );
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_outside() {
        let root = Path::new("/mnt/users/t1");
        assert!(!is_within(root, Path::new("/mnt/users/t10/data")));
        assert!(is_within(root, Path::new("/mnt/users/t1/data")));
        assert!(is_within(root, Path::new("/mnt/users/t1")));
    }

    #[test]
    fn test_escape_via_dotdot_rejected() {
        let root = Path::new("/mnt");
        assert_matches!(
            ensure_within_root(root, Path::new("/mnt/users/../../etc/passwd")),
            Err(Error::PathEscapesRoot { .. })
        );
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(ensure_within_root(Path::new("/mnt"), Path::new("users/t1")).is_err());
    }

    #[test]
    fn test_tenant_base_path() {
        let root = Path::new("/var/lib/tenantns/mounts");
        assert_eq!(
            tenant_base_path(root, &TenantId::new("alice")).unwrap(),
            PathBuf::from("/var/lib/tenantns/mounts/users/alice")
        );
        assert!(tenant_base_path(root, &TenantId::new("..")).is_err());
        assert!(tenant_base_path(root, &TenantId::new("a/b")).is_err());
        assert!(tenant_base_path(root, &TenantId::new("")).is_err());
    }
}
