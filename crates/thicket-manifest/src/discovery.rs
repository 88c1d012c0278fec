//! Find manifest files under the build root

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::config::Config;
use crate::error::ManifestError;

/// Every manifest under `root`, as sorted root-relative paths.
///
/// Honours `.gitignore` (even outside a git checkout), skips hidden
/// directories, the workdir and anything matching `ignore` in the config.
pub fn find_manifests(root: &Path, config: &Config) -> Result<Vec<PathBuf>, ManifestError> {
    let build_files = config.build_file_matcher()?;
    let ignored = config.ignore_matcher()?;
    let workdir = root.join(&config.workdir);
    let filter_root = root.to_path_buf();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let path = entry.path();
            if path == workdir {
                return false;
            }
            match path.strip_prefix(&filter_root) {
                Ok(relative) if !relative.as_os_str().is_empty() => !ignored.is_match(relative),
                _ => true,
            }
        })
        .build();

    let mut manifests = Vec::new();
    for result in walker {
        let entry = result?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if !build_files.is_match(entry.file_name()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            manifests.push(relative.to_path_buf());
        }
    }

    manifests.sort();
    tracing::debug!("Found {} manifests under {}", manifests.len(), root.display());
    Ok(manifests)
}
