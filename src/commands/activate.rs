use anyhow::Result;

use crate::manager::PluginManager;
use crate::registry::PackageRef;

/// Make `<org>/<name>@<version>` the active binary for its VMID
#[tracing::instrument(skip(manager))]
pub fn activate<M: PluginManager>(manager: &mut M, package: &str) -> Result<()> {
    let package: PackageRef = package.parse()?;
    let manifest = manager.activate(&package)?;
    println!("Activated {} for VMID {}", package, manifest.vmid);
    Ok(())
}
