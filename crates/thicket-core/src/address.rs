//! Target addresses: `spec/path:name`

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while parsing an address spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address spec")]
    Empty,

    #[error("address `{0}` contains more than one `:`")]
    MultipleColons(String),

    #[error("address `{0}` has an empty target name")]
    EmptyName(String),

    #[error("address `{spec}` has invalid target name `{name}`: names may not contain `/` or `:`")]
    InvalidName { spec: String, name: String },

    #[error("address `{0}` names the build root but gives no target name")]
    MissingName(String),

    #[error("address `{spec}` has an invalid path: {reason}")]
    InvalidPath { spec: String, reason: &'static str },
}

/// Identity of a target: the directory of its manifest plus its name.
///
/// `spec_path` is relative to the build root, `/`-separated, and empty for
/// targets declared at the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub spec_path: String,
    pub name: String,
}

impl Address {
    /// Build an address from an already-normalised directory and a name.
    pub fn new(spec_path: impl Into<String>, name: impl Into<String>) -> Result<Self, AddressError> {
        let spec_path = spec_path.into();
        let name = name.into();
        let spec = format!("{}:{}", spec_path, name);
        let spec_path = normalize_spec_path(&spec_path, &spec)?;
        validate_name(&name, &spec)?;
        Ok(Address { spec_path, name })
    }

    /// Parse a dependency spec as written in a manifest.
    ///
    /// `relative_to` is the spec path of the manifest the reference appears
    /// in; it is used for `:name` references.
    pub fn parse(spec: &str, relative_to: &str) -> Result<Self, AddressError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(AddressError::Empty);
        }

        let (path_part, name_part) = match spec.split_once(':') {
            Some((_, rest)) if rest.contains(':') => {
                return Err(AddressError::MultipleColons(spec.to_string()));
            }
            Some((path, name)) => (path, Some(name)),
            None => (spec, None),
        };

        let spec_path = if path_part.is_empty() {
            relative_to.to_string()
        } else {
            normalize_spec_path(path_part, spec)?
        };

        let name = match name_part {
            Some(name) => {
                validate_name(name, spec)?;
                name.to_string()
            }
            None => match spec_path.rsplit('/').next() {
                Some(last) if !last.is_empty() => last.to_string(),
                _ => return Err(AddressError::MissingName(spec.to_string())),
            },
        };

        Ok(Address { spec_path, name })
    }

    /// True for targets declared in the root manifest.
    pub fn is_root(&self) -> bool {
        self.spec_path.is_empty()
    }

    /// A filesystem-safe identifier, e.g. `src.python.util.strutil`.
    pub fn id(&self) -> String {
        if self.spec_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.spec_path.replace('/', "."), self.name)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.spec_path.is_empty() {
            write!(f, "//:{}", self.name)
        } else {
            write!(f, "{}:{}", self.spec_path, self.name)
        }
    }
}

fn validate_name(name: &str, spec: &str) -> Result<(), AddressError> {
    if name.is_empty() {
        return Err(AddressError::EmptyName(spec.to_string()));
    }
    if name.contains('/') || name.contains(':') {
        return Err(AddressError::InvalidName {
            spec: spec.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Strip `//`, `./` segments and trailing slashes; reject escapes from the root.
fn normalize_spec_path(path: &str, spec: &str) -> Result<String, AddressError> {
    let stripped = path.strip_prefix("//").unwrap_or(path);
    if stripped.starts_with('/') {
        return Err(AddressError::InvalidPath {
            spec: spec.to_string(),
            reason: "absolute paths are not allowed",
        });
    }

    let mut components = Vec::new();
    for component in stripped.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(AddressError::InvalidPath {
                    spec: spec.to_string(),
                    reason: "`..` is not allowed",
                });
            }
            other => components.push(other),
        }
    }
    Ok(components.join("/"))
}
