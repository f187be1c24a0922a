//! Import of the old flat plugin directory, where each plugin was a bare
//! `<vmid>` symlink with no package metadata.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::cancel::CancelFlag;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::manifest::Manifest;
use crate::runtime::Runtime;

pub const LEGACY_ORG: &str = "legacy";
pub const LEGACY_VERSION: &str = "v0.0.0";
const LEGACY_NAME_PREFIX_LEN: usize = 8;

/// One `<vmid>` symlink found in a legacy directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEntry {
    pub vmid: String,
    /// Where the symlink points, resolved against the legacy directory.
    pub target: Result<PathBuf, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFailure {
    pub vmid: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub failed: Vec<MigrationFailure>,
}

impl LegacyEntry {
    /// The manifest a legacy plugin is installed under.
    pub fn manifest(&self, target: &Path) -> Manifest {
        let short: String = self.vmid.chars().take(LEGACY_NAME_PREFIX_LEN).collect();
        Manifest {
            binary: target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Manifest::new(LEGACY_ORG, &format!("{}...", short), LEGACY_VERSION, &self.vmid)
        }
    }
}

/// List the symlinks in `legacy_dir`. Directories and regular files are skipped;
/// a missing directory yields nothing.
#[tracing::instrument(skip(runtime))]
pub fn scan<R: Runtime>(runtime: &R, legacy_dir: &Path) -> Result<Vec<LegacyEntry>> {
    if !runtime.is_dir(legacy_dir) {
        debug!("No legacy plugin directory at {:?}", legacy_dir);
        return Ok(vec![]);
    }

    let mut paths = runtime
        .read_dir(legacy_dir)
        .with_context(|| format!("Failed to read legacy directory {:?}", legacy_dir))?;
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        if !runtime.is_symlink(&path) {
            debug!("Skipping non-symlink {:?}", path);
            continue;
        }
        let Some(vmid) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let target = runtime
            .resolve_link(&path)
            .map_err(|e| format!("{:#}", e));
        entries.push(LegacyEntry {
            vmid: vmid.to_string(),
            target,
        });
    }
    Ok(entries)
}

/// Install every legacy entry through `manager`. Failures are recorded and
/// migration moves on to the next entry.
///
/// Cancellation stops the migration with [`PluginError::Cancelled`]; entries
/// already migrated stay installed.
pub fn migrate_entries<M: PluginManager + ?Sized>(
    manager: &mut M,
    entries: Vec<LegacyEntry>,
    cancel: &CancelFlag,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for entry in entries {
        if cancel.is_cancelled() {
            warn!(
                "Legacy migration cancelled after {} plugin(s)",
                report.migrated.len()
            );
            return Err(PluginError::Cancelled.into());
        }

        let result = match &entry.target {
            Ok(target) => match manager.install(entry.manifest(target), target, cancel) {
                Ok(_) => Ok(()),
                Err(e) if PluginError::is_cancelled(&e) => {
                    warn!(
                        "Legacy migration cancelled while installing {}",
                        entry.vmid
                    );
                    return Err(e);
                }
                Err(e) => Err(format!("{:#}", e)),
            },
            Err(e) => Err(e.clone()),
        };

        match result {
            Ok(()) => {
                info!("Migrated legacy plugin {}", entry.vmid);
                report.migrated.push(entry.vmid);
            }
            Err(error) => {
                warn!("Failed to migrate legacy plugin {}: {}", entry.vmid, error);
                report.failed.push(MigrationFailure {
                    vmid: entry.vmid,
                    error,
                });
            }
        }
    }

    Ok(report)
}
