//! Domain errors that callers need to tell apart.
//!
//! Operations return `anyhow::Result`; these variants travel inside the
//! `anyhow::Error` and can be recovered with `downcast_ref::<PluginError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// A required manifest field is missing. Raised before any file system change.
    #[error("invalid manifest: {0}")]
    Validation(String),

    #[error("manifest not found at {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("failed to parse manifest at {}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse registry at {}", path.display())]
    RegistryParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid package reference '{0}', expected <org>/<name>@<version>")]
    InvalidPackageRef(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no active plugin for {0}")]
    NotActive(String),

    #[error("plugin binary {} is not executable", .0.display())]
    NotExecutable(PathBuf),

    #[error("plugin link {} points to missing target {}", link.display(), target.display())]
    BrokenLink { link: PathBuf, target: PathBuf },
}

impl PluginError {
    /// True when `err` carries a [`PluginError::Cancelled`] anywhere in its chain.
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<PluginError>(), Some(PluginError::Cancelled)))
    }
}
