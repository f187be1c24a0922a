//! On-disk package layout.
//!
//! ```text
//! packages/<org>/<name>/<version>/<binary>
//! packages/<org>/<name>/<version>/manifest.json
//! packages/<org>/<name>/latest -> <version>
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, warn};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::activation::{remove_entry, swap_symlink};
use crate::cancel::CancelFlag;
use crate::error::PluginError;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::runtime::{Runtime, absolute_path};

pub const LATEST_LINK: &str = "latest";

const COPY_BUFFER_SIZE: usize = 32 * 1024;
const EXECUTABLE_MODE: u32 = 0o755;

pub struct PackageStore<'a, R: Runtime> {
    runtime: &'a R,
    packages_dir: PathBuf,
}

impl<'a, R: Runtime> PackageStore<'a, R> {
    pub fn new(runtime: &'a R, packages_dir: PathBuf) -> Self {
        Self {
            runtime,
            packages_dir,
        }
    }

    /// Returns: `<packages>/<org>/<name>`
    pub fn package_dir(&self, org: &str, name: &str) -> PathBuf {
        self.packages_dir.join(org).join(name)
    }

    /// Returns: `<packages>/<org>/<name>/<version>`
    pub fn package_path(&self, org: &str, name: &str, version: &str) -> PathBuf {
        self.package_dir(org, name).join(version)
    }

    pub fn manifest_path(&self, org: &str, name: &str, version: &str) -> PathBuf {
        self.package_path(org, name, version).join(MANIFEST_FILE)
    }

    pub fn latest_link(&self, org: &str, name: &str) -> PathBuf {
        self.package_dir(org, name).join(LATEST_LINK)
    }

    /// Copy `source` into the store as a new package version.
    ///
    /// Fills in `size` and `installed_at` on the manifest before writing it.
    /// Returns the path of the installed binary.
    #[tracing::instrument(skip(self, manifest, cancel), fields(package = %manifest.package_key(), version = %manifest.version))]
    pub fn install(
        &self,
        manifest: &mut Manifest,
        source: &Path,
        cancel: &CancelFlag,
    ) -> Result<PathBuf> {
        manifest.validate()?;

        let version_dir = self.package_path(&manifest.org, &manifest.name, &manifest.version);
        let created_version_dir = !self.runtime.is_dir(&version_dir);
        self.runtime
            .create_dir_all(&version_dir)
            .with_context(|| format!("Failed to create package directory {:?}", version_dir))?;

        let dest = version_dir.join(manifest.binary_name());
        debug!("Copying {:?} to {:?}", source, dest);
        let copied = self
            .copy_binary(source, &dest, cancel)
            .with_context(|| format!("Failed to copy binary {:?}", source));
        let size = match copied {
            Ok(size) => size,
            Err(e) => {
                if created_version_dir {
                    self.discard_version_dir(&manifest.org, &manifest.name, &version_dir);
                }
                return Err(e);
            }
        };
        manifest.size = size;
        manifest.installed_at = Utc::now();
        manifest.save(self.runtime, &version_dir.join(MANIFEST_FILE))?;

        self.point_latest(&manifest.org, &manifest.name, &manifest.version);
        Ok(dest)
    }

    /// Register `source` as a package version without copying it.
    ///
    /// The package binary becomes a symlink to the absolute source path, so
    /// rebuilding the source updates the installed plugin in place.
    /// Returns the absolute source path.
    #[tracing::instrument(skip(self, manifest), fields(package = %manifest.package_key(), version = %manifest.version))]
    pub fn link(&self, manifest: &mut Manifest, source: &Path) -> Result<PathBuf> {
        manifest.validate()?;

        let cwd = self.runtime.current_dir()?;
        let abs_source = absolute_path(&cwd, source);
        if !self.runtime.exists(&abs_source) {
            anyhow::bail!("binary not found: {:?}", abs_source);
        }
        manifest.size = self
            .runtime
            .file_size(&abs_source)
            .with_context(|| format!("Failed to stat binary {:?}", abs_source))?;
        manifest.installed_at = Utc::now();

        let version_dir = self.package_path(&manifest.org, &manifest.name, &manifest.version);
        self.runtime
            .create_dir_all(&version_dir)
            .with_context(|| format!("Failed to create package directory {:?}", version_dir))?;

        let dest = version_dir.join(manifest.binary_name());
        remove_entry(self.runtime, &dest).context("Failed to remove existing binary")?;
        self.runtime
            .symlink(&abs_source, &dest)
            .with_context(|| format!("Failed to create binary symlink {:?}", dest))?;

        manifest.save(self.runtime, &version_dir.join(MANIFEST_FILE))?;

        self.point_latest(&manifest.org, &manifest.name, &manifest.version);
        Ok(abs_source)
    }

    pub fn get_manifest(&self, org: &str, name: &str, version: &str) -> Result<Manifest> {
        Manifest::load(self.runtime, &self.manifest_path(org, name, version))
    }

    /// Delete a version directory. An absent version is not an error.
    #[tracing::instrument(skip(self))]
    pub fn remove_version(&self, org: &str, name: &str, version: &str) -> Result<()> {
        let version_dir = self.package_path(org, name, version);
        if self.runtime.is_symlink(&version_dir) {
            self.runtime.remove_symlink(&version_dir)?;
        } else if self.runtime.exists(&version_dir) {
            self.runtime
                .remove_dir_all(&version_dir)
                .with_context(|| format!("Failed to remove package {:?}", version_dir))?;
        }
        Ok(())
    }

    /// Best-effort: point `latest` at `version`.
    pub fn point_latest(&self, org: &str, name: &str, version: &str) {
        let latest = self.latest_link(org, name);
        if let Err(e) = swap_symlink(self.runtime, Path::new(version), &latest) {
            warn!("Failed to update latest symlink {:?}: {:#}", latest, e);
        }
    }

    /// Best-effort: remove the `latest` pointer.
    pub fn clear_latest(&self, org: &str, name: &str) {
        let latest = self.latest_link(org, name);
        if let Err(e) = remove_entry(self.runtime, &latest) {
            warn!("Failed to remove latest symlink {:?}: {:#}", latest, e);
        }
    }

    /// The version directory name `latest` points at, even if that directory is gone.
    pub fn latest_version(&self, org: &str, name: &str) -> Option<String> {
        self.runtime
            .read_link(&self.latest_link(org, name))
            .ok()
            .and_then(|target| {
                target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(String::from)
            })
    }

    /// Best-effort: remove the package and org directories once they are empty.
    pub fn prune_empty_dirs(&self, org: &str, name: &str) {
        let package_dir = self.package_dir(org, name);
        let org_dir = self.packages_dir.join(org);
        for dir in [package_dir, org_dir] {
            match self.runtime.read_dir(&dir) {
                Ok(entries) if entries.is_empty() => {
                    debug!("Removing empty directory {:?}", dir);
                    if let Err(e) = self.runtime.remove_dir(&dir) {
                        debug!("Could not remove {:?}: {}", dir, e);
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Best-effort: remove an empty version directory left by a failed install.
    fn discard_version_dir(&self, org: &str, name: &str, version_dir: &Path) {
        debug!("Removing version directory {:?}", version_dir);
        if let Err(e) = self.runtime.remove_dir(version_dir) {
            warn!("Failed to remove version directory {:?}: {}", version_dir, e);
            return;
        }
        self.prune_empty_dirs(org, name);
    }

    /// Stream `source` into a staging file next to `dest`, polling `cancel`
    /// between reads, then rename it over `dest`.
    ///
    /// `dest` is never opened for writing, so a source that resolves to
    /// `dest` itself (or a binary the host is running) is left intact until
    /// the rename. A failed or cancelled copy removes the staging file.
    fn copy_binary(&self, source: &Path, dest: &Path, cancel: &CancelFlag) -> Result<u64> {
        let mut reader = self.runtime.open(source)?;
        let staging = staging_path(dest);
        let mut writer = self.runtime.create_file(&staging)?;

        let copied = copy_with_cancel(reader.as_mut(), writer.as_mut(), cancel);
        drop(writer);

        let result = copied.and_then(|size| {
            self.runtime
                .set_permissions(&staging, EXECUTABLE_MODE)
                .context("Failed to make binary executable")?;
            self.runtime
                .rename(&staging, dest)
                .with_context(|| format!("Failed to move binary into place {:?}", dest))?;
            Ok(size)
        });

        if result.is_err() {
            debug!("Removing partial file {:?}", staging);
            if let Err(e) = self.runtime.remove_file(&staging) {
                warn!("Failed to remove partial file {:?}: {}", staging, e);
            }
        }
        result
    }
}

/// Returns: `<dir>/.<binary>.tmp` for a binary at `<dir>/<binary>`
fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.tmp", name))
}

pub(crate) fn copy_with_cancel<Rd, W>(reader: &mut Rd, writer: &mut W, cancel: &CancelFlag) -> Result<u64>
where
    Rd: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(PluginError::Cancelled.into());
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read source binary"),
        };
        writer
            .write_all(&buf[..n])
            .context("Failed to write plugin binary")?;
        total += n as u64;
    }
    writer.flush().context("Failed to flush plugin binary")?;
    Ok(total)
}
