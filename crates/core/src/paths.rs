//! Path normalization for user-supplied vault paths

use std::path::{Component, Path, PathBuf};

/// Rejected restore path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path escapes the vault: {0}")]
    Traversal(String),
    #[error("path must be relative to the vault: {0}")]
    Absolute(String),
}

/// Normalize a path for use inside the vault
///
/// - Removes `./` components
/// - Rejects `..`, absolute paths and empty paths
pub fn normalize_path(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PathError::Traversal(path.display().to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(path.display().to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    Ok(normalized)
}
