//! Locating the build root

use std::env;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// File whose presence marks the top of a thicket workspace.
pub const BUILD_ROOT_MARKER: &str = "thicket.toml";

/// The directory all addresses are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRoot(PathBuf);

impl Deref for BuildRoot {
    type Target = PathBuf;

    fn deref(&self) -> &PathBuf {
        &self.0
    }
}

impl BuildRoot {
    /// Use `path` as the build root without searching.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        BuildRoot(path.into())
    }

    /// Finds the build root containing the current working directory.
    ///
    /// # Errors
    ///
    /// If the current directory cannot be read, or no ancestor contains
    /// `thicket.toml`.
    pub fn find() -> io::Result<BuildRoot> {
        let current_dir = env::current_dir()?;
        Self::find_from(&current_dir)
    }

    /// Walk up from `start` until a directory holding `thicket.toml` is found.
    pub fn find_from(start: &Path) -> io::Result<BuildRoot> {
        let mut here = start;
        loop {
            if here.join(BUILD_ROOT_MARKER).is_file() {
                return Ok(BuildRoot(here.to_path_buf()));
            } else if let Some(parent) = here.parent() {
                here = parent;
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "Failed to find build root ({}) starting from {}",
                        BUILD_ROOT_MARKER,
                        start.display()
                    ),
                ));
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
