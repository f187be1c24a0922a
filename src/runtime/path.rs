//! Path utility functions for normalization and symlink targets.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the file system and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(component),
            },
            _ => {
                result.push(component);
            }
        }
    }
    result
}

/// Make `path` absolute against `cwd` and normalize it lexically.
///
/// Symlinks in the path are left untouched, so a linked plugin keeps
/// pointing at the exact location the developer named.
pub fn absolute_path(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&cwd.join(path))
    }
}

/// Calculate the relative path from a symlink location to a target.
///
/// For example, a link at `<base>/current/<vmid>` pointing to
/// `<base>/packages/luxfi/evm/v1.0.0/evm` yields
/// `../packages/luxfi/evm/v1.0.0/evm`.
///
/// Returns `None` if a relative path cannot be computed (e.g., different drive letters on Windows).
pub fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    let result = pathdiff::diff_paths(to_target, from_dir)?;

    if result.is_absolute() {
        return None;
    }

    Some(result)
}
