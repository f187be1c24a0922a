use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::cancel::CancelFlag;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::manifest::Manifest;
use crate::vmid;

/// Package fields shared by `install` and `link`.
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct PackageArgs {
    /// Organization that publishes the plugin (e.g., "luxfi")
    #[arg(long)]
    pub org: String,

    /// Package name (e.g., "evm")
    #[arg(long)]
    pub name: String,

    /// Version directory name (e.g., "v1.0.0")
    #[arg(long = "version", value_name = "VERSION")]
    pub version: String,

    /// Canonical VM name; the VMID is derived from it
    #[arg(long, conflicts_with = "vmid")]
    pub vm_name: Option<String>,

    /// Explicit VMID, used as is
    #[arg(long)]
    pub vmid: Option<String>,

    /// Executable filename inside the package (defaults to the package name)
    #[arg(long)]
    pub binary_name: Option<String>,

    /// Additional names for the VM
    #[arg(long = "alias", value_name = "ALIAS")]
    pub aliases: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub repository: Option<String>,
}

impl PackageArgs {
    /// Build the manifest, deriving the VMID from `--vm-name` when no `--vmid` is given.
    pub fn into_manifest(self) -> Result<Manifest, PluginError> {
        let vmid = match (&self.vmid, &self.vm_name) {
            (Some(id), _) => id.clone(),
            (None, Some(vm_name)) => vmid::vmid(vm_name),
            (None, None) => {
                return Err(PluginError::Validation(
                    "either --vm-name or --vmid is required".into(),
                ));
            }
        };

        let manifest = Manifest {
            vm_name: self.vm_name,
            aliases: self.aliases,
            binary: self.binary_name.unwrap_or_default(),
            description: self.description,
            repository: self.repository,
            ..Manifest::new(&self.org, &self.name, &self.version, &vmid)
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

#[tracing::instrument(skip(manager, args, cancel))]
pub fn install<M: PluginManager>(
    manager: &mut M,
    binary: &Path,
    args: PackageArgs,
    cancel: &CancelFlag,
) -> Result<()> {
    let manifest = args.into_manifest()?;
    debug!("Installing {:?} as {}", binary, manifest.package_key());

    let manifest = manager.install(manifest, binary, cancel)?;
    println!(
        "Installed {}@{} ({} bytes)",
        manifest.package_key(),
        manifest.version,
        manifest.size
    );
    println!("  VMID: {}", manifest.vmid);
    println!("  Active: {}", manager.active_dir().join(&manifest.vmid).display());
    Ok(())
}

#[tracing::instrument(skip(manager, args))]
pub fn link<M: PluginManager>(manager: &mut M, binary: &Path, args: PackageArgs) -> Result<()> {
    let manifest = args.into_manifest()?;
    debug!("Linking {:?} as {}", binary, manifest.package_key());

    let manifest = manager.link(manifest, binary)?;
    println!(
        "Linked {}@{} -> {}",
        manifest.package_key(),
        manifest.version,
        binary.display()
    );
    println!("  VMID: {}", manifest.vmid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::MemoryPluginManager;
    use crate::registry::PackageRef;

    fn args() -> PackageArgs {
        PackageArgs {
            org: "luxfi".into(),
            name: "evm".into(),
            version: "v1.0.0".into(),
            vm_name: Some("Lux EVM".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_into_manifest_derives_vmid() {
        let manifest = args().into_manifest().unwrap();
        assert_eq!(manifest.vmid, "1w6NFdmhtgbUAZkwwKza7xxWjojJyGA1s7FrNJTgM6H9LrVA11");
        assert_eq!(manifest.vm_name.as_deref(), Some("Lux EVM"));
        assert_eq!(manifest.binary_name(), "evm");
    }

    #[test]
    fn test_into_manifest_explicit_vmid_wins() {
        let manifest = PackageArgs {
            vmid: Some("custom-id".into()),
            binary_name: Some("luxevm".into()),
            aliases: vec!["evm".into()],
            ..args()
        }
        .into_manifest()
        .unwrap();
        assert_eq!(manifest.vmid, "custom-id");
        assert_eq!(manifest.binary, "luxevm");
        assert_eq!(manifest.aliases, vec!["evm".to_string()]);
    }

    #[test]
    fn test_into_manifest_requires_identifier() {
        let err = PackageArgs {
            vm_name: None,
            ..args()
        }
        .into_manifest()
        .unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
    }

    #[test]
    fn test_into_manifest_requires_version() {
        let err = PackageArgs {
            version: String::new(),
            ..args()
        }
        .into_manifest()
        .unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
    }

    #[test]
    fn test_install_and_link_activate() {
        let mut manager = MemoryPluginManager::new("/plugins");
        install(&mut manager, Path::new("/build/evm"), args(), &CancelFlag::new()).unwrap();

        let dev = PackageArgs {
            version: "dev".into(),
            ..args()
        };
        link(&mut manager, Path::new("/src/evm/build/evm"), dev).unwrap();

        let vmid = vmid::vmid("Lux EVM");
        assert_eq!(
            manager.registry().binding(&vmid),
            Some(PackageRef::new("luxfi", "evm", "dev"))
        );
        assert_eq!(
            manager.source_of(&PackageRef::new("luxfi", "evm", "dev")),
            Some(Path::new("/src/evm/build/evm"))
        );
    }
}
