use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PluginError;
use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Metadata stored next to each installed package version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    /// Package name (e.g., "evm")
    pub name: String,
    /// Organization or user (e.g., "luxfi")
    pub org: String,
    /// Version directory name (e.g., "v1.0.0")
    pub version: String,
    pub vmid: String,
    /// Canonical VM name the vmid was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Executable filename inside the version directory
    #[serde(default)]
    pub binary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default)]
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Manifest {
    pub fn new(org: &str, name: &str, version: &str, vmid: &str) -> Self {
        Manifest {
            org: org.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            vmid: vmid.to_string(),
            ..Default::default()
        }
    }

    /// `"<org>/<name>"`, the registry key for this package.
    pub fn package_key(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }

    /// Binary filename, falling back to the package name.
    pub fn binary_name(&self) -> &str {
        if self.binary.is_empty() {
            &self.name
        } else {
            &self.binary
        }
    }

    /// Check the fields every stored manifest must carry.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.org.is_empty() || self.name.is_empty() || self.version.is_empty() {
            return Err(PluginError::Validation(
                "manifest must have org, name, and version".into(),
            ));
        }
        if self.vmid.is_empty() {
            return Err(PluginError::Validation("manifest must have vmid".into()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            return Err(PluginError::ManifestNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        let manifest = serde_json::from_str(&content).map_err(|source| PluginError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(manifest)
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        runtime
            .write(path, content.as_bytes())
            .with_context(|| format!("Failed to write manifest to {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn evm_manifest() -> Manifest {
        Manifest {
            binary: "evm".into(),
            vm_name: Some("Lux EVM".into()),
            ..Manifest::new("luxfi", "evm", "v1.0.0", "vmid-1")
        }
    }

    #[test]
    fn test_validate_requires_identity_fields() {
        assert!(evm_manifest().validate().is_ok());

        for blank in ["org", "name", "version", "vmid"] {
            let mut m = evm_manifest();
            match blank {
                "org" => m.org.clear(),
                "name" => m.name.clear(),
                "version" => m.version.clear(),
                _ => m.vmid.clear(),
            }
            assert!(
                matches!(m.validate(), Err(PluginError::Validation(_))),
                "blank {} should fail validation",
                blank
            );
        }
    }

    #[test]
    fn test_binary_name_falls_back_to_package_name() {
        let mut m = evm_manifest();
        assert_eq!(m.binary_name(), "evm");
        m.binary.clear();
        m.name = "subnetevm".into();
        assert_eq!(m.binary_name(), "subnetevm");
    }

    #[test]
    fn test_serialized_field_names() {
        let m = Manifest {
            size: 42,
            aliases: vec!["evm".into()],
            ..evm_manifest()
        };
        let value: serde_json::Value = serde_json::to_value(&m).unwrap();
        for key in ["name", "org", "version", "vmid", "vm_name", "aliases", "binary", "installed_at", "size"] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert!(value.get("description").is_none());
        assert!(value.get("repository").is_none());
    }

    #[test]
    fn test_empty_optionals_are_omitted() {
        let m = Manifest::new("luxfi", "evm", "v1.0.0", "vmid-1");
        let value: serde_json::Value = serde_json::to_value(&m).unwrap();
        assert!(value.get("aliases").is_none());
        assert!(value.get("vm_name").is_none());
        assert!(value.get("size").is_none());
    }

    #[test]
    fn test_load_missing_manifest() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/packages/luxfi/evm/v1.0.0/manifest.json");
        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| false);

        let err = Manifest::load(&runtime, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::ManifestNotFound { .. })
        ));
    }

    #[test]
    fn test_load_corrupt_manifest() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/packages/luxfi/evm/v1.0.0/manifest.json");
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(path.clone()))
            .returning(|_| Ok("{ not json".into()));

        let err = Manifest::load(&runtime, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::ManifestParse { .. })
        ));
    }

    #[test]
    fn test_load_parses_written_manifest() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/plugins/packages/luxfi/evm/v1.0.0/manifest.json");
        let json = serde_json::to_string_pretty(&evm_manifest()).unwrap();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(move |_| Ok(json.clone()));

        let loaded = Manifest::load(&runtime, &path).unwrap();
        assert_eq!(loaded, evm_manifest());
    }
}
