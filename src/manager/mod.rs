//! Plugin package manager.
//!
//! [`PluginManager`] is the capability the CLI works against. [`PackageManager`]
//! is the file system implementation; [`MemoryPluginManager`] keeps everything
//! in memory for tests of code that drives a manager.

mod memory;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::activation::ActivationManager;
use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::PluginError;
use crate::legacy::{self, MigrationReport};
use crate::manifest::Manifest;
use crate::registry::{PackageRef, Registry};
use crate::runtime::Runtime;
use crate::store::PackageStore;

pub use memory::MemoryPluginManager;

pub trait PluginManager {
    fn base_dir(&self) -> &Path;

    /// Directory of `<vmid>` symlinks the host process loads plugins from.
    fn active_dir(&self) -> PathBuf;

    /// Copy `binary` into the store and make it the active binary for its VMID.
    fn install(&mut self, manifest: Manifest, binary: &Path, cancel: &CancelFlag) -> Result<Manifest>;

    /// Like [`PluginManager::install`] but symlinks `binary` in place instead of copying it.
    fn link(&mut self, manifest: Manifest, binary: &Path) -> Result<Manifest>;

    /// Bind the version's VMID to it.
    fn activate(&mut self, package: &PackageRef) -> Result<Manifest>;

    /// Remove one version. If it was active its VMID is left unbound.
    fn uninstall(&mut self, package: &PackageRef) -> Result<()>;

    fn get_manifest(&self, package: &PackageRef) -> Result<Manifest>;

    /// Manifests of every installed version.
    fn list(&self) -> Result<Vec<Manifest>>;

    /// Manifest bound to each active VMID.
    fn list_active(&self) -> Result<BTreeMap<String, Manifest>>;

    /// Check that the active binary for `vmid` exists and is executable.
    /// Returns the binary path the host process will load.
    fn verify(&self, vmid: &str) -> Result<PathBuf>;

    fn migrate_from_legacy(&mut self, legacy_dir: &Path, cancel: &CancelFlag) -> Result<MigrationReport>;
}

/// File system backed plugin manager.
///
/// The registry is loaded once in [`PackageManager::new`] and written back after
/// every mutating call.
pub struct PackageManager<R: Runtime> {
    runtime: R,
    config: Config,
    registry: Registry,
}

impl<R: Runtime> PackageManager<R> {
    #[tracing::instrument(skip(runtime))]
    pub fn new(runtime: R, config: Config) -> Result<Self> {
        for dir in [
            config.base_dir.clone(),
            config.packages_dir(),
            config.current_dir(),
        ] {
            runtime
                .create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }

        let registry = Registry::load(&runtime, &config.registry_path())?;
        debug!(
            "Loaded registry with {} package(s), {} active",
            registry.plugins.len(),
            registry.active.len()
        );

        Ok(Self {
            runtime,
            config,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> PackageStore<'_, R> {
        PackageStore::new(&self.runtime, self.config.packages_dir())
    }

    fn activation(&self) -> ActivationManager<'_, R> {
        ActivationManager::new(&self.runtime, self.config.current_dir())
    }

    fn save_registry(&mut self) -> Result<()> {
        self.registry
            .save(&self.runtime, &self.config.registry_path())
    }

    /// Swap the VMID symlink and the registry binding to `manifest`'s version.
    fn bind(&mut self, manifest: &Manifest) -> Result<()> {
        let version_dir = self
            .store()
            .package_path(&manifest.org, &manifest.name, &manifest.version);
        self.activation().activate(manifest, &version_dir)?;

        if let Some(previous) = self.registry.binding(&manifest.vmid)
            && previous.package_key() != manifest.package_key()
        {
            warn!(
                "VMID {} was bound to {}, rebinding to {}/{}",
                manifest.vmid,
                previous,
                manifest.package_key(),
                manifest.version
            );
        }
        self.registry
            .bind(&manifest.vmid, &manifest.org, &manifest.name, &manifest.version);
        Ok(())
    }
}

impl<R: Runtime> PluginManager for PackageManager<R> {
    fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    fn active_dir(&self) -> PathBuf {
        self.config.current_dir()
    }

    #[tracing::instrument(skip(self, manifest, cancel), fields(package = %manifest.package_key(), version = %manifest.version))]
    fn install(&mut self, mut manifest: Manifest, binary: &Path, cancel: &CancelFlag) -> Result<Manifest> {
        self.store().install(&mut manifest, binary, cancel)?;
        self.registry
            .record_version(&manifest.org, &manifest.name, &manifest.version);
        self.bind(&manifest)
            .context("Failed to activate plugin")?;
        self.save_registry()?;

        info!(
            "Installed {}/{}@{} as {}",
            manifest.org, manifest.name, manifest.version, manifest.vmid
        );
        Ok(manifest)
    }

    #[tracing::instrument(skip(self, manifest), fields(package = %manifest.package_key(), version = %manifest.version))]
    fn link(&mut self, mut manifest: Manifest, binary: &Path) -> Result<Manifest> {
        let source = self.store().link(&mut manifest, binary)?;
        self.registry
            .record_version(&manifest.org, &manifest.name, &manifest.version);
        self.bind(&manifest)
            .context("Failed to activate plugin")?;
        self.save_registry()?;

        info!(
            "Linked {}/{}@{} to {:?} as {}",
            manifest.org, manifest.name, manifest.version, source, manifest.vmid
        );
        Ok(manifest)
    }

    #[tracing::instrument(skip(self))]
    fn activate(&mut self, package: &PackageRef) -> Result<Manifest> {
        let manifest = self
            .get_manifest(package)
            .context("Failed to load manifest")?;
        self.bind(&manifest)?;
        self.save_registry()?;
        Ok(manifest)
    }

    #[tracing::instrument(skip(self))]
    fn uninstall(&mut self, package: &PackageRef) -> Result<()> {
        let PackageRef { org, name, version } = package;

        match self.get_manifest(package) {
            Ok(manifest) if !manifest.vmid.is_empty() => {
                if self.registry.binding(&manifest.vmid).as_ref() == Some(package) {
                    debug!("{} is active for {}, unbinding", package, manifest.vmid);
                    self.activation().deactivate(&manifest.vmid)?;
                    self.registry.unbind(&manifest.vmid);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping VMID cleanup for {}: {:#}", package, e),
        }

        // borrows only the runtime so the registry stays mutable below
        let store = PackageStore::new(&self.runtime, self.config.packages_dir());
        store.remove_version(org, name, version)?;
        self.registry.remove_version(org, name, version);

        if store.latest_version(org, name).as_deref() == Some(version.as_str()) {
            match self.registry.versions(org, name).last() {
                Some(remaining) => store.point_latest(org, name, remaining),
                None => store.clear_latest(org, name),
            }
        }
        store.prune_empty_dirs(org, name);

        self.save_registry()?;
        info!("Uninstalled {}", package);
        Ok(())
    }

    fn get_manifest(&self, package: &PackageRef) -> Result<Manifest> {
        self.store()
            .get_manifest(&package.org, &package.name, &package.version)
    }

    fn list(&self) -> Result<Vec<Manifest>> {
        let store = self.store();
        let mut manifests = Vec::new();
        for package in self.registry.installed() {
            match store.get_manifest(&package.org, &package.name, &package.version) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => debug!("Skipping {}: {:#}", package, e),
            }
        }
        Ok(manifests)
    }

    fn list_active(&self) -> Result<BTreeMap<String, Manifest>> {
        let mut active = BTreeMap::new();
        for vmid in self.activation().entries()? {
            let Some(package) = self.registry.binding(&vmid) else {
                continue;
            };
            match self.get_manifest(&package) {
                Ok(manifest) => {
                    active.insert(vmid, manifest);
                }
                Err(e) => debug!("Skipping active {}: {:#}", vmid, e),
            }
        }
        Ok(active)
    }

    #[tracing::instrument(skip(self))]
    fn verify(&self, vmid: &str) -> Result<PathBuf> {
        let link = self.activation().link_path(vmid);
        let is_symlink = self.runtime.is_symlink(&link);
        if !is_symlink && !self.runtime.exists(&link) {
            return Err(PluginError::NotActive(vmid.to_string()).into());
        }

        let binary = if is_symlink {
            let target = self.runtime.resolve_link(&link)?;
            if !self.runtime.exists(&target) {
                return Err(PluginError::BrokenLink { link, target }.into());
            }
            target
        } else {
            link
        };

        if !self.runtime.is_executable(&binary) {
            return Err(PluginError::NotExecutable(binary).into());
        }
        Ok(binary)
    }

    #[tracing::instrument(skip(self, cancel))]
    fn migrate_from_legacy(&mut self, legacy_dir: &Path, cancel: &CancelFlag) -> Result<MigrationReport> {
        let entries = legacy::scan(&self.runtime, legacy_dir)?;
        info!("Found {} legacy plugin(s) in {:?}", entries.len(), legacy_dir);
        legacy::migrate_entries(self, entries, cancel)
    }
}
