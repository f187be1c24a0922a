use anyhow::{Result, bail};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::PluginManager;
use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::PluginError;
use crate::legacy::{self, LegacyEntry, MigrationReport};
use crate::manifest::Manifest;
use crate::registry::{PackageRef, Registry};

/// In-memory [`PluginManager`] with the same binding rules as
/// [`super::PackageManager`] but no file system behind it.
///
/// Binaries are never read; a source path is recorded as given.
#[derive(Debug)]
pub struct MemoryPluginManager {
    config: Config,
    registry: Registry,
    manifests: BTreeMap<String, Manifest>,
    sources: BTreeMap<String, PathBuf>,
    legacy: BTreeMap<PathBuf, Vec<LegacyEntry>>,
}

impl MemoryPluginManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: Config::new(base_dir),
            registry: Registry::default(),
            manifests: BTreeMap::new(),
            sources: BTreeMap::new(),
            legacy: BTreeMap::new(),
        }
    }

    /// Entries returned when `legacy_dir` is migrated.
    pub fn with_legacy_entries(mut self, legacy_dir: impl Into<PathBuf>, entries: Vec<LegacyEntry>) -> Self {
        self.legacy.insert(legacy_dir.into(), entries);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The path a package version was installed or linked from.
    pub fn source_of(&self, package: &PackageRef) -> Option<&Path> {
        self.sources.get(&package.to_string()).map(PathBuf::as_path)
    }

    fn store(&mut self, mut manifest: Manifest, binary: &Path) -> Manifest {
        manifest.installed_at = Utc::now();
        let package = PackageRef::new(&manifest.org, &manifest.name, &manifest.version);
        self.registry
            .record_version(&manifest.org, &manifest.name, &manifest.version);
        self.registry
            .bind(&manifest.vmid, &manifest.org, &manifest.name, &manifest.version);
        self.sources.insert(package.to_string(), binary.to_path_buf());
        self.manifests.insert(package.to_string(), manifest.clone());
        manifest
    }

    fn binary_path(&self, manifest: &Manifest) -> PathBuf {
        self.config
            .packages_dir()
            .join(&manifest.org)
            .join(&manifest.name)
            .join(&manifest.version)
            .join(manifest.binary_name())
    }
}

impl PluginManager for MemoryPluginManager {
    fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    fn active_dir(&self) -> PathBuf {
        self.config.current_dir()
    }

    fn install(&mut self, manifest: Manifest, binary: &Path, cancel: &CancelFlag) -> Result<Manifest> {
        manifest.validate()?;
        if cancel.is_cancelled() {
            return Err(PluginError::Cancelled.into());
        }
        Ok(self.store(manifest, binary))
    }

    fn link(&mut self, manifest: Manifest, binary: &Path) -> Result<Manifest> {
        manifest.validate()?;
        Ok(self.store(manifest, binary))
    }

    fn activate(&mut self, package: &PackageRef) -> Result<Manifest> {
        let manifest = self.get_manifest(package)?;
        self.registry
            .bind(&manifest.vmid, &package.org, &package.name, &package.version);
        Ok(manifest)
    }

    fn uninstall(&mut self, package: &PackageRef) -> Result<()> {
        if let Some(manifest) = self.manifests.remove(&package.to_string())
            && self.registry.binding(&manifest.vmid).as_ref() == Some(package)
        {
            self.registry.unbind(&manifest.vmid);
        }
        self.sources.remove(&package.to_string());
        self.registry
            .remove_version(&package.org, &package.name, &package.version);
        Ok(())
    }

    fn get_manifest(&self, package: &PackageRef) -> Result<Manifest> {
        match self.manifests.get(&package.to_string()) {
            Some(manifest) => Ok(manifest.clone()),
            None => Err(PluginError::ManifestNotFound {
                path: self
                    .config
                    .packages_dir()
                    .join(&package.org)
                    .join(&package.name)
                    .join(&package.version),
            }
            .into()),
        }
    }

    fn list(&self) -> Result<Vec<Manifest>> {
        Ok(self
            .registry
            .installed()
            .iter()
            .filter_map(|p| self.manifests.get(&p.to_string()).cloned())
            .collect())
    }

    fn list_active(&self) -> Result<BTreeMap<String, Manifest>> {
        let mut active = BTreeMap::new();
        for vmid in self.registry.active.keys() {
            if let Some(package) = self.registry.binding(vmid)
                && let Some(manifest) = self.manifests.get(&package.to_string())
            {
                active.insert(vmid.clone(), manifest.clone());
            }
        }
        Ok(active)
    }

    fn verify(&self, vmid: &str) -> Result<PathBuf> {
        let Some(package) = self.registry.binding(vmid) else {
            return Err(PluginError::NotActive(vmid.to_string()).into());
        };
        let Some(manifest) = self.manifests.get(&package.to_string()) else {
            bail!("registry binds {} to unknown package {}", vmid, package);
        };
        Ok(self.binary_path(manifest))
    }

    fn migrate_from_legacy(&mut self, legacy_dir: &Path, cancel: &CancelFlag) -> Result<MigrationReport> {
        let entries = self.legacy.get(legacy_dir).cloned().unwrap_or_default();
        legacy::migrate_entries(self, entries, cancel)
    }
}
