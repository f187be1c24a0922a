use anyhow::Result;
use log::debug;

use crate::manager::PluginManager;

/// List every installed version, marking the ones bound to a VMID
#[tracing::instrument(skip(manager))]
pub fn list<M: PluginManager>(manager: &M) -> Result<()> {
    let manifests = manager.list()?;
    if manifests.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }
    debug!("Found {} installed version(s)", manifests.len());

    let active = manager.list_active()?;
    for manifest in manifests {
        let is_active = active.get(&manifest.vmid).is_some_and(|m| {
            m.package_key() == manifest.package_key() && m.version == manifest.version
        });
        println!(
            "{}@{} {}{}",
            manifest.package_key(),
            manifest.version,
            manifest.vmid,
            if is_active { " (active)" } else { "" }
        );
    }
    Ok(())
}

/// List every VMID with an active binary
#[tracing::instrument(skip(manager))]
pub fn active<M: PluginManager>(manager: &M) -> Result<()> {
    let active = manager.list_active()?;
    if active.is_empty() {
        println!("No active plugins.");
        return Ok(());
    }

    for (vmid, manifest) in active {
        let label = manifest.vm_name.as_deref().unwrap_or(manifest.name.as_str());
        println!(
            "{} {}@{} ({})",
            vmid,
            manifest.package_key(),
            manifest.version,
            label
        );
    }
    Ok(())
}
