//! The persisted registry of installed versions and active bindings.
//!
//! The whole document is rewritten on every mutation. Writes go to a
//! sibling temporary file which is then renamed over `registry.json`, so a
//! crash mid-write leaves the previous registry intact. There is no locking
//! across load and save; a single writer per base directory is assumed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PluginError;
use crate::runtime::Runtime;

pub const REGISTRY_FILE: &str = "registry.json";

/// A specific package version, written as `<org>/<name>@<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    pub org: String,
    pub name: String,
    pub version: String,
}

impl PackageRef {
    pub fn new(org: &str, name: &str, version: &str) -> Self {
        Self {
            org: org.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    pub fn package_key(&self) -> String {
        package_key(&self.org, &self.name)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.org, self.name, self.version)
    }
}

impl FromStr for PackageRef {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PluginError::InvalidPackageRef(s.to_string());
        let (key, version) = s.rsplit_once('@').ok_or_else(invalid)?;
        let (org, name) = key.split_once('/').ok_or_else(invalid)?;
        if org.is_empty() || name.is_empty() || version.is_empty() {
            return Err(invalid());
        }
        Ok(PackageRef::new(org, name, version))
    }
}

pub fn package_key(org: &str, name: &str) -> String {
    format!("{}/{}", org, name)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Registry {
    /// "org/name" -> installed versions, in install order
    #[serde(default)]
    pub plugins: BTreeMap<String, Vec<String>>,
    /// vmid -> "org/name@version"
    #[serde(default)]
    pub active: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            plugins: BTreeMap::new(),
            active: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Registry {
    /// Load the registry, or start an empty one if the file does not exist yet.
    /// A registry that exists but cannot be parsed is an error.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            debug!("No registry at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read registry {:?}", path))?;
        let registry = serde_json::from_str(&content).map_err(|source| PluginError::RegistryParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(registry)
    }

    /// Stamp `updated_at` and replace the registry file.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&mut self, runtime: &R, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(self).context("Failed to serialize registry")?;

        let tmp_path = temp_path_for(path);
        runtime
            .write(&tmp_path, content.as_bytes())
            .with_context(|| format!("Failed to write registry to {:?}", tmp_path))?;
        runtime
            .rename(&tmp_path, path)
            .with_context(|| format!("Failed to move registry into place at {:?}", path))
    }

    /// Append a version to a package's list unless it is already recorded.
    pub fn record_version(&mut self, org: &str, name: &str, version: &str) {
        let versions = self.plugins.entry(package_key(org, name)).or_default();
        if !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
        }
    }

    /// Forget a version. The package key is dropped once no versions remain.
    pub fn remove_version(&mut self, org: &str, name: &str, version: &str) {
        let key = package_key(org, name);
        if let Some(versions) = self.plugins.get_mut(&key) {
            versions.retain(|v| v != version);
            if versions.is_empty() {
                self.plugins.remove(&key);
            }
        }
    }

    pub fn versions(&self, org: &str, name: &str) -> &[String] {
        self.plugins
            .get(&package_key(org, name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn bind(&mut self, vmid: &str, org: &str, name: &str, version: &str) {
        self.active.insert(
            vmid.to_string(),
            PackageRef::new(org, name, version).to_string(),
        );
    }

    pub fn unbind(&mut self, vmid: &str) {
        self.active.remove(vmid);
    }

    /// The package version bound to `vmid`, if the binding is well formed.
    pub fn binding(&self, vmid: &str) -> Option<PackageRef> {
        self.active.get(vmid).and_then(|r| r.parse().ok())
    }

    /// Every recorded (org, name, version), skipping malformed package keys.
    pub fn installed(&self) -> Vec<PackageRef> {
        self.plugins
            .iter()
            .filter_map(|(key, versions)| {
                let (org, name) = key.split_once('/')?;
                Some(
                    versions
                        .iter()
                        .map(|v| PackageRef::new(org, name, v))
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
            .collect()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| REGISTRY_FILE.into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    #[test]
    fn test_package_ref_parse_and_display() {
        let r: PackageRef = "luxfi/evm@v1.0.0".parse().unwrap();
        assert_eq!(r, PackageRef::new("luxfi", "evm", "v1.0.0"));
        assert_eq!(r.to_string(), "luxfi/evm@v1.0.0");
        assert_eq!(r.package_key(), "luxfi/evm");
    }

    #[test]
    fn test_package_ref_splits_on_last_at() {
        let r: PackageRef = "luxfi/evm@beta@v2".parse().unwrap();
        assert_eq!(r.name, "evm@beta");
        assert_eq!(r.version, "v2");
    }

    #[test]
    fn test_package_ref_invalid() {
        for bad in ["luxfi/evm", "evm@v1", "/evm@v1", "luxfi/@v1", "luxfi/evm@", ""] {
            assert!(
                matches!(bad.parse::<PackageRef>(), Err(PluginError::InvalidPackageRef(_))),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_record_version_is_idempotent() {
        let mut registry = Registry::default();
        registry.record_version("luxfi", "evm", "v1.0.0");
        registry.record_version("luxfi", "evm", "v1.1.0");
        registry.record_version("luxfi", "evm", "v1.0.0");
        assert_eq!(registry.versions("luxfi", "evm"), ["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn test_remove_last_version_drops_key() {
        let mut registry = Registry::default();
        registry.record_version("luxfi", "evm", "v1.0.0");
        registry.record_version("luxfi", "evm", "v1.1.0");

        registry.remove_version("luxfi", "evm", "v1.0.0");
        assert_eq!(registry.versions("luxfi", "evm"), ["v1.1.0"]);

        registry.remove_version("luxfi", "evm", "v1.1.0");
        assert!(!registry.plugins.contains_key("luxfi/evm"));
        assert!(registry.versions("luxfi", "evm").is_empty());

        // Removing from an unknown package is a no-op
        registry.remove_version("nobody", "nothing", "v0");
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut registry = Registry::default();
        registry.bind("vmid-1", "luxfi", "evm", "v1.0.0");
        assert_eq!(registry.active["vmid-1"], "luxfi/evm@v1.0.0");
        assert_eq!(
            registry.binding("vmid-1"),
            Some(PackageRef::new("luxfi", "evm", "v1.0.0"))
        );

        registry.bind("vmid-1", "luxfi", "evm", "v2.0.0");
        assert_eq!(registry.active["vmid-1"], "luxfi/evm@v2.0.0");

        registry.unbind("vmid-1");
        assert!(registry.binding("vmid-1").is_none());
    }

    #[test]
    fn test_installed_flattens_versions() {
        let mut registry = Registry::default();
        registry.record_version("luxfi", "evm", "v1.0.0");
        registry.record_version("luxfi", "evm", "v1.1.0");
        registry.record_version("me", "myvm", "v0.1.0");
        registry.plugins.insert("malformed".into(), vec!["v1".into()]);

        let installed = registry.installed();
        assert_eq!(installed.len(), 3);
        assert!(installed.contains(&PackageRef::new("me", "myvm", "v0.1.0")));
    }

    #[test]
    fn test_load_absent_registry_is_empty() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/registry.json");
        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| false);

        let registry = Registry::load(&runtime, &path).unwrap();
        assert!(registry.plugins.is_empty());
        assert!(registry.active.is_empty());
    }

    #[test]
    fn test_load_corrupt_registry_is_error() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/registry.json");
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{\"plugins\": [".into()));

        let err = Registry::load(&runtime, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::RegistryParse { .. })
        ));
    }

    #[test]
    fn test_save_writes_temp_then_renames() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/registry.json");
        let tmp = PathBuf::from("/plugins/registry.json.tmp");
        let mut seq = mockall::Sequence::new();

        runtime
            .expect_write()
            .with(eq(tmp.clone()), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        runtime
            .expect_rename()
            .with(eq(tmp), eq(path.clone()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mut registry = Registry::default();
        registry.save(&runtime, &path).unwrap();
    }

    #[test]
    fn test_save_and_reload_on_disk() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = dir.path().join(REGISTRY_FILE);

        let mut registry = Registry::default();
        registry.record_version("luxfi", "evm", "v1.0.0");
        registry.bind("vmid-1", "luxfi", "evm", "v1.0.0");
        registry.save(&runtime, &path).unwrap();

        assert!(!dir.path().join("registry.json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["plugins"]["luxfi/evm"][0], "v1.0.0");
        assert_eq!(raw["active"]["vmid-1"], "luxfi/evm@v1.0.0");
        assert!(raw["updated_at"].is_string());

        let reloaded = Registry::load(&runtime, &path).unwrap();
        assert_eq!(reloaded, registry);
    }
}
