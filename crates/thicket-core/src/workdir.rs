//! Working directory for persisted state (.thicket/)

use std::path::{Path, PathBuf};

/// Default working directory, relative to the build root.
pub const DEFAULT_WORKDIR: &str = ".thicket";

/// Subdirectory holding invalidation records.
const INVALIDATOR_DIR: &str = "build_invalidator";

/// Resolve the working directory; absolute `workdir` values are used as-is.
pub fn workdir_path(root: &Path, workdir: &str) -> PathBuf {
    root.join(workdir)
}

/// Directory the `BuildInvalidator` records keys under.
pub fn invalidator_dir(root: &Path, workdir: &str) -> PathBuf {
    workdir_path(root, workdir).join(INVALIDATOR_DIR)
}

/// Remove the working directory and everything in it
pub fn clear_workdir(root: &Path, workdir: &str) -> std::io::Result<bool> {
    let dir = workdir_path(root, workdir);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
        return Ok(true);
    }
    Ok(false)
}
