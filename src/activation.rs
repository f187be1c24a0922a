//! VMID symlinks in `current/`.
//!
//! `current/<vmid>` always names exactly one binary: the one chosen by the
//! most recent activation of that VMID. Installed packages are linked with a
//! relative path into `packages/`; linked (development) packages point
//! straight at their absolute source binary.

use anyhow::{Context, Result, bail};
use log::debug;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;
use crate::runtime::{Runtime, relative_symlink_path};

pub struct ActivationManager<'a, R: Runtime> {
    runtime: &'a R,
    current_dir: PathBuf,
}

impl<'a, R: Runtime> ActivationManager<'a, R> {
    pub fn new(runtime: &'a R, current_dir: PathBuf) -> Self {
        Self {
            runtime,
            current_dir,
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Returns: `<base>/current/<vmid>`
    pub fn link_path(&self, vmid: &str) -> PathBuf {
        self.current_dir.join(vmid)
    }

    /// Point `current/<vmid>` at the binary of the version in `version_dir`.
    ///
    /// Returns the target written into the symlink.
    #[tracing::instrument(skip(self, manifest), fields(vmid = %manifest.vmid))]
    pub fn activate(&self, manifest: &Manifest, version_dir: &Path) -> Result<PathBuf> {
        let binary = version_dir.join(manifest.binary_name());
        let link = self.link_path(&manifest.vmid);

        let target = if self.runtime.is_symlink(&binary) {
            // Linked package: skip the package directory entirely
            self.runtime
                .resolve_link(&binary)
                .with_context(|| format!("Failed to resolve linked binary {:?}", binary))?
        } else {
            relative_symlink_path(&link, &binary).unwrap_or(binary)
        };

        if !self.runtime.exists(&self.current_dir) {
            self.runtime
                .create_dir_all(&self.current_dir)
                .with_context(|| format!("Failed to create {:?}", self.current_dir))?;
        }

        debug!("Activating {} -> {:?}", manifest.vmid, target);
        swap_symlink(self.runtime, &target, &link)
            .with_context(|| format!("Failed to create VMID symlink {:?}", link))?;
        Ok(target)
    }

    /// Remove `current/<vmid>` if present.
    #[tracing::instrument(skip(self))]
    pub fn deactivate(&self, vmid: &str) -> Result<()> {
        let link = self.link_path(vmid);
        remove_entry(self.runtime, &link)
            .with_context(|| format!("Failed to remove VMID symlink {:?}", link))
    }

    /// VMIDs that currently have an entry in `current/`.
    pub fn entries(&self) -> Result<Vec<String>> {
        if !self.runtime.is_dir(&self.current_dir) {
            return Ok(vec![]);
        }
        let mut vmids: Vec<String> = self
            .runtime
            .read_dir(&self.current_dir)?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .filter(|name| !name.starts_with('.'))
            .collect();
        vmids.sort();
        Ok(vmids)
    }
}

/// Replace `link` with a symlink to `target`.
///
/// The new link is created under a temporary name and renamed over `link`,
/// so readers see either the old or the new target. Platforms that refuse to
/// rename over an existing entry fall back to remove-then-rename.
pub(crate) fn swap_symlink<R: Runtime>(runtime: &R, target: &Path, link: &Path) -> Result<()> {
    let file_name = link
        .file_name()
        .with_context(|| format!("Invalid symlink path {:?}", link))?;
    let tmp = link.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    remove_entry(runtime, &tmp)?;
    runtime.symlink(target, &tmp)?;

    if let Err(e) = runtime.rename(&tmp, link) {
        debug!("Rename over {:?} failed ({}), replacing in place", link, e);
        if let Err(e) = remove_entry(runtime, link) {
            let _ = runtime.remove_symlink(&tmp);
            return Err(e);
        }
        runtime.rename(&tmp, link)?;
    }
    Ok(())
}

/// Remove a symlink or file at `path`. Absent paths are fine; directories are not touched.
pub(crate) fn remove_entry<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if runtime.is_symlink(path) {
        runtime.remove_symlink(path)
    } else if runtime.is_dir(path) {
        bail!("{:?} is a directory, refusing to replace it", path)
    } else if runtime.exists(path) {
        runtime.remove_file(path)
    } else {
        Ok(())
    }
}
