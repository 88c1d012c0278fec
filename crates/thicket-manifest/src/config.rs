//! Workspace configuration (`thicket.toml`)

use std::collections::BTreeMap;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thicket_core::{DEFAULT_WORKDIR, TargetKind};

use crate::error::ConfigError;

/// Config file name, looked up at the build root.
pub const CONFIG_FILE: &str = "thicket.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// File-name globs that identify manifests.
    pub build_file_names: Vec<String>,
    /// Globs (relative to the build root) never searched for manifests.
    pub ignore: Vec<String>,
    /// Where persisted state lives, relative to the build root.
    pub workdir: String,
    /// Override the kind inferred from an alias, e.g. `scala_specs = "test-suite"`.
    pub aliases: BTreeMap<String, TargetKind>,
    /// Aliases whose calls are skipped entirely.
    pub ignored_aliases: Vec<String>,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period after the last manifest change before reloading.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            build_file_names: vec!["BUILD".to_string(), "BUILD.*".to_string()],
            ignore: Vec::new(),
            workdir: DEFAULT_WORKDIR.to_string(),
            aliases: BTreeMap::new(),
            ignored_aliases: Vec::new(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig { debounce_ms: 200 }
    }
}

impl Config {
    /// Load `thicket.toml` from the build root, or defaults if it is absent.
    pub fn load(root: &Path) -> Result<Config, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("No {} at {}, using defaults", CONFIG_FILE, root.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        // fail early on bad patterns rather than at first use
        config.build_file_matcher()?;
        config.ignore_matcher()?;
        Ok(config)
    }

    /// Kind for an alias, honouring `aliases` overrides.
    pub fn kind_for(&self, alias: &str) -> TargetKind {
        self.aliases
            .get(alias)
            .copied()
            .unwrap_or_else(|| TargetKind::from_alias(alias))
    }

    pub fn is_ignored_alias(&self, alias: &str) -> bool {
        self.ignored_aliases.iter().any(|a| a == alias)
    }

    /// Matches manifest file names.
    pub fn build_file_matcher(&self) -> Result<GlobSet, ConfigError> {
        build_globset(&self.build_file_names)
    }

    /// Matches root-relative paths to skip during discovery.
    pub fn ignore_matcher(&self) -> Result<GlobSet, ConfigError> {
        build_globset(&self.ignore)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ConfigError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConfigError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.workdir, ".thicket");
        assert_eq!(config.watch.debounce_ms, 200);
    }

    #[test]
    fn parses_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"
ignore = ["dist/**", "node_modules"]
ignored_aliases = ["jvm_prep_command"]

[aliases]
scala_specs = "test-suite"
docs = "page"

[watch]
debounce_ms = 50
"#,
        )
        .unwrap();

        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config.build_file_names, vec!["BUILD", "BUILD.*"]);
        assert_eq!(config.kind_for("scala_specs"), TargetKind::TestSuite);
        assert_eq!(config.kind_for("docs"), TargetKind::Page);
        assert_eq!(config.kind_for("java_library"), TargetKind::Library);
        assert!(config.is_ignored_alias("jvm_prep_command"));
        assert_eq!(config.watch.debounce_ms, 50);
        assert!(config.ignore_matcher().unwrap().is_match("dist/app/BUILD"));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_globs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);

        std::fs::write(&path, "build_files = [\"BUILD\"]\n").unwrap();
        assert!(matches!(Config::load(temp_dir.path()), Err(ConfigError::Parse { .. })));

        std::fs::write(&path, "ignore = [\"a[\"]\n").unwrap();
        assert!(matches!(Config::load(temp_dir.path()), Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn build_file_matcher_uses_file_names() {
        let matcher = Config::default().build_file_matcher().unwrap();
        assert!(matcher.is_match("BUILD"));
        assert!(matcher.is_match("BUILD.tools"));
        assert!(!matcher.is_match("BUILDING"));
        assert!(!matcher.is_match("build.rs"));
    }
}
