use anyhow::Result;
use log::debug;

use crate::manager::PluginManager;
use crate::registry::PackageRef;
use crate::runtime::Runtime;

/// Remove one installed version
#[tracing::instrument(skip(runtime, manager))]
pub fn uninstall<R: Runtime, M: PluginManager>(
    runtime: &R,
    manager: &mut M,
    package: &str,
    yes: bool,
) -> Result<()> {
    let package: PackageRef = package.parse()?;

    // Look up the binding first so the user is told what stops working
    let active_vmid = manager
        .list_active()?
        .into_iter()
        .find(|(_, m)| m.org == package.org && m.name == package.name && m.version == package.version)
        .map(|(vmid, _)| vmid);

    if !yes {
        show_removal_plan(manager, &package, active_vmid.as_deref());
        if !runtime.confirm("Proceed with removal?")? {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    debug!("Uninstalling {}", package);
    manager.uninstall(&package)?;
    println!("Removed {}", package);

    if let Some(vmid) = active_vmid {
        println!(
            "Warning: {} was active. No version is now active for VMID {}.",
            package, vmid
        );
    }
    Ok(())
}

fn show_removal_plan<M: PluginManager>(manager: &M, package: &PackageRef, active_vmid: Option<&str>) {
    println!();
    println!("=== Removal Plan ===");
    println!();
    println!("Package: {}/{}", package.org, package.name);
    println!("Version: {}", package.version);
    println!();
    println!("Directories to remove:");
    println!(
        "  [DEL] {}",
        manager
            .base_dir()
            .join("packages")
            .join(&package.org)
            .join(&package.name)
            .join(&package.version)
            .display()
    );
    if let Some(vmid) = active_vmid {
        println!();
        println!("Symlinks to remove:");
        println!("  [DEL] {}", manager.active_dir().join(vmid).display());
    }
    println!();
}
