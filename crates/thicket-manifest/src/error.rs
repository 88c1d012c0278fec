//! Error types for thicket-manifest

use std::fmt;
use std::io;
use std::path::PathBuf;

use thicket_core::{AddressError, ResolveErrors};
use thiserror::Error;

/// Syntax error in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}:{line}:{column}: {message}", .file.display())]
pub struct ParseError {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// A well-formed call that does not describe a valid target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{}:{line}: {alias}() requires a `name` argument", .file.display())]
    MissingName { file: PathBuf, line: u32, alias: String },

    #[error("{}:{line}: {alias}() does not take positional arguments", .file.display())]
    Positional { file: PathBuf, line: u32, alias: String },

    #[error("{}:{line}: `{field}` must be {expected}, found {found}", .file.display())]
    WrongType {
        file: PathBuf,
        line: u32,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{}:{line}: {source}", .file.display())]
    Address {
        file: PathBuf,
        line: u32,
        #[source]
        source: AddressError,
    },

    #[error("{}:{line}: {message}", .file.display())]
    Invalid { file: PathBuf, line: u32, message: String },
}

/// Problems expanding a target's source patterns.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source pattern `{pattern}` in {spec_path}: {source}")]
    Pattern {
        spec_path: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("source pattern `{pattern}` in {spec_path} escapes the build root")]
    Escapes { spec_path: String, pattern: String },

    #[error("failed to list sources under {}: {source}", .dir.display())]
    Walk {
        dir: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

/// Problems reading `thicket.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid pattern `{pattern}` in config: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Anything that can go wrong loading a single manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Sources(#[from] SourceError),

    #[error("failed to walk the build root: {0}")]
    Walk(#[from] ignore::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Every manifest problem found in one load, reported together.
#[derive(Debug)]
pub struct ManifestErrors(pub Vec<ManifestError>);

impl fmt::Display for ManifestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s) loading manifests", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ManifestErrors {}

/// Failure to produce a resolved graph from a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Manifests(#[from] ManifestErrors),

    #[error(transparent)]
    Resolve(#[from] ResolveErrors),
}

impl WorkspaceError {
    /// One line per problem, for reporting.
    pub fn problems(&self) -> Vec<String> {
        match self {
            WorkspaceError::Manifests(errors) => errors.0.iter().map(|e| e.to_string()).collect(),
            WorkspaceError::Resolve(errors) => errors.0.iter().map(|e| e.to_string()).collect(),
        }
    }
}
