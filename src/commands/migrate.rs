use anyhow::{Result, bail};
use std::path::Path;

use crate::cancel::CancelFlag;
use crate::manager::PluginManager;

/// Import `<vmid>` symlinks from a legacy flat plugin directory.
///
/// Entries that fail are reported and skipped; the command fails only when
/// nothing could be migrated.
#[tracing::instrument(skip(manager, cancel))]
pub fn migrate<M: PluginManager>(manager: &mut M, legacy_dir: &Path, cancel: &CancelFlag) -> Result<()> {
    let report = manager.migrate_from_legacy(legacy_dir, cancel)?;

    if report.migrated.is_empty() && report.failed.is_empty() {
        println!("No legacy plugins found in {}", legacy_dir.display());
        return Ok(());
    }

    for vmid in &report.migrated {
        println!("  [OK] {}", vmid);
    }
    for failure in &report.failed {
        println!("  [FAILED] {}: {}", failure.vmid, failure.error);
    }
    println!(
        "Migrated {} plugin(s), {} failed",
        report.migrated.len(),
        report.failed.len()
    );

    if report.migrated.is_empty() {
        bail!("no legacy plugins could be migrated");
    }
    Ok(())
}
