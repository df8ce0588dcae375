//! Plugin discovery - locate plugin binaries by declared name

use std::path::{Path, PathBuf};

/// Locate the executable for a declared plugin
///
/// Looks for `<dir>/<name>/<name>` first, then `<dir>/<name>`. Returns `None`
/// if neither is a regular file.
#[must_use]
pub fn find_binary(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        tracing::warn!(plugin = %name, "refusing to resolve plugin with a path-like name");
        return None;
    }

    let candidates = [dir.join(name).join(name), dir.join(name)];

    let found = candidates.into_iter().find(|p| p.is_file());
    match &found {
        Some(path) => tracing::debug!(plugin = %name, path = %path.display(), "discovered plugin binary"),
        None => tracing::debug!(plugin = %name, dir = %dir.display(), "plugin binary not found"),
    }
    found
}
