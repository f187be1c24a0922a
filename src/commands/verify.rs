use anyhow::Result;

use crate::manager::PluginManager;

/// Check that the host process can load the active binary for `vmid`
#[tracing::instrument(skip(manager))]
pub fn verify<M: PluginManager>(manager: &M, vmid: &str) -> Result<()> {
    let binary = manager.verify(vmid)?;
    println!("{} -> {}", vmid, binary.display());
    Ok(())
}
