//! Manifest parsing, loading and discovery

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod parser;
pub mod sources;


#[cfg(test)]
pub mod test_utils;

pub use config::{Config, WatchConfig, CONFIG_FILE};
pub use coordinator::Coordinator;
pub use discovery::find_manifests;
pub use error::{ConfigError, LoadError, ManifestError, ManifestErrors, ParseError, SourceError, WorkspaceError};
pub use loader::load_calls;
pub use parser::{parse_manifest, CallSite};
pub use sources::expand_sources;
