//! Resolution of the plugin base directory.
//!
//! The resolved [`Config`] is built once at startup and handed to every
//! component that needs a path; nothing reads the environment after that.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::registry::REGISTRY_FILE;
use crate::runtime::Runtime;

pub const PACKAGES_DIR: &str = "packages";
/// VMID symlinks read by the host process.
pub const CURRENT_DIR: &str = "current";

const PLUGIN_DIR_VARS: [&str; 2] = ["LUX_PLUGIN_DIR", "LUXD_PLUGIN_DIR"];
const DATA_DIR_VARS: [&str; 2] = ["LUX_DATA_DIR", "LUXD_DATA_DIR"];
const DEFAULT_DATA_DIR: &str = ".lux";
const PLUGINS_SUBDIR: &str = "plugins";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_dir: PathBuf,
}

impl Config {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve the base directory.
    ///
    /// Order: explicit value, `LUX_PLUGIN_DIR`, `LUXD_PLUGIN_DIR`,
    /// `$LUX_DATA_DIR/plugins`, `$LUXD_DATA_DIR/plugins`, `~/.lux/plugins`.
    #[tracing::instrument(skip(runtime))]
    pub fn resolve<R: Runtime>(runtime: &R, base_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = base_dir {
            debug!("Using base directory from command line: {:?}", dir);
            return Ok(Self::new(expand_home(runtime, &dir)?));
        }

        for var in PLUGIN_DIR_VARS {
            if let Some(dir) = non_empty_var(runtime, var) {
                debug!("Using base directory from {}: {}", var, dir);
                return Ok(Self::new(expand_home(runtime, Path::new(&dir))?));
            }
        }

        for var in DATA_DIR_VARS {
            if let Some(dir) = non_empty_var(runtime, var) {
                debug!("Using data directory from {}: {}", var, dir);
                let data_dir = expand_home(runtime, Path::new(&dir))?;
                return Ok(Self::new(data_dir.join(PLUGINS_SUBDIR)));
            }
        }

        let home = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(Self::new(home.join(DEFAULT_DATA_DIR).join(PLUGINS_SUBDIR)))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.base_dir.join(PACKAGES_DIR)
    }

    /// The directory of VMID symlinks the host process loads plugins from.
    pub fn current_dir(&self) -> PathBuf {
        self.base_dir.join(CURRENT_DIR)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.base_dir.join(REGISTRY_FILE)
    }
}

fn non_empty_var<R: Runtime>(runtime: &R, key: &str) -> Option<String> {
    runtime.env_var(key).ok().filter(|v| !v.is_empty())
}

fn expand_home<R: Runtime>(runtime: &R, path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = runtime
                .home_dir()
                .context("Could not find home directory to expand '~'")?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
