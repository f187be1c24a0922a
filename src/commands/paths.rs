use anyhow::Result;

use crate::config::Config;

/// Print the directories plugins are stored in and loaded from
pub fn paths(config: &Config) -> Result<()> {
    println!("Base directory:     {}", config.base_dir.display());
    println!("Packages directory: {}", config.packages_dir().display());
    println!("Active directory:   {}", config.current_dir().display());
    println!("Registry:           {}", config.registry_path().display());
    Ok(())
}
