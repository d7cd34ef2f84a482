use crate::error::VcsError;
use std::path::{Path, PathBuf};

/// Splits a checkout destination into the directory a clone must run in and
/// the name of the directory the clone creates there.
///
/// The parent is returned as given. `..` and symlinks in it are left for the
/// filesystem to resolve when the command's working directory is prepared.
pub fn checkout_target(into: &Path) -> Result<(PathBuf, String), VcsError> {
    let name = into
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VcsError::InvalidPath(into.to_path_buf()))?
        .to_string();

    let parent = match into.parent() {
        Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
        Some(p) => p.to_path_buf(),
        None => return Err(VcsError::InvalidPath(into.to_path_buf())),
    };

    Ok((parent, name))
}
