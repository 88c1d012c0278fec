//! Fingerprint-based invalidation of targets
//!
//! A [`CacheKey`] identifies one version of a target: its id plus a hash of
//! every input that could change what building it produces (the declaration
//! itself, its source files, and optionally everything it depends on).
//! [`BuildInvalidator`] remembers the last key recorded for each target so a
//! caller can ask whether a target needs rebuilding.

use crate::address::Address;
use crate::graph::BuildGraph;
use crate::model::TargetDecl;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bump to invalidate every key recorded by earlier versions of thicket.
pub const GLOBAL_CACHE_KEY_GEN_VERSION: &str = "1";

const UNCACHEABLE_HASH: &str = "__UNCACHEABLE_HASH__";

/// Ids longer than this are hashed before being used as file names.
const MAX_FILE_NAME_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum InvalidatorError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown target {0}")]
    UnknownTarget(Address),

    #[error("failed to serialize fingerprint input: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> InvalidatorError + '_ {
    move |source| InvalidatorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A version of a target (or set of targets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub id: String,
    pub hash: String,
}

impl CacheKey {
    pub fn new(id: impl Into<String>, hash: impl Into<String>) -> Self {
        CacheKey {
            id: id.into(),
            hash: hash.into(),
        }
    }

    /// A key that is never considered valid.
    pub fn uncacheable(id: impl Into<String>) -> Self {
        CacheKey::new(id, UNCACHEABLE_HASH)
    }

    pub fn cacheable(&self) -> bool {
        self.hash != UNCACHEABLE_HASH
    }

    /// Combine keys for several targets into one key for the set.
    ///
    /// A single key comes back unchanged. The result does not depend on the
    /// order of `keys`. Combining is not associative.
    pub fn combine(keys: &[CacheKey]) -> Option<CacheKey> {
        match keys {
            [] => None,
            [single] => Some(single.clone()),
            _ => {
                let mut ids: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
                ids.sort_unstable();
                let id = if ids.len() <= 5 {
                    ids.join(",")
                } else {
                    let mut hasher = Sha256::new();
                    for id in &ids {
                        hasher.update(id.as_bytes());
                        hasher.update([0u8]);
                    }
                    hex::encode(hasher.finalize())
                };

                if keys.iter().any(|k| !k.cacheable()) {
                    return Some(CacheKey::uncacheable(id));
                }

                let mut hashes: Vec<&str> = keys.iter().map(|k| k.hash.as_str()).collect();
                hashes.sort_unstable();
                let mut hasher = Sha256::new();
                for hash in hashes {
                    hasher.update(hash.as_bytes());
                    hasher.update([0u8]);
                }
                Some(CacheKey::new(id, hex::encode(hasher.finalize())))
            }
        }
    }
}

/// The declaration fields that feed a fingerprint.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    address: String,
    alias: &'a str,
    sources: &'a [crate::model::SourceSpec],
    dependencies: Vec<String>,
    tags: &'a BTreeSet<String>,
    timeout: Option<u64>,
    extra: &'a BTreeMap<String, crate::model::Value>,
}

/// Generates cache keys for targets in a resolved graph.
pub struct CacheKeyGenerator {
    root: PathBuf,
    key_suffix: String,
}

impl CacheKeyGenerator {
    /// `base_inputs` are mixed into every key this generator produces.
    pub fn new(root: impl Into<PathBuf>, base_inputs: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(GLOBAL_CACHE_KEY_GEN_VERSION.as_bytes());
        for input in base_inputs {
            hasher.update(input);
        }
        let digest = hex::encode(hasher.finalize());
        CacheKeyGenerator {
            root: root.into(),
            key_suffix: digest[..12].to_string(),
        }
    }

    /// Key for one target. With `transitive`, the key also covers every
    /// target it depends on.
    pub fn key_for_target(
        &self,
        graph: &BuildGraph,
        address: &Address,
        transitive: bool,
    ) -> Result<CacheKey, InvalidatorError> {
        let mut memo = HashMap::new();
        self.key_with_memo(graph, address, transitive, &mut memo)
    }

    /// Keys for many targets, sharing fingerprint work between them.
    pub fn keys_for_targets<'a>(
        &self,
        graph: &BuildGraph,
        addresses: impl IntoIterator<Item = &'a Address>,
        transitive: bool,
    ) -> Result<Vec<CacheKey>, InvalidatorError> {
        let mut memo = HashMap::new();
        addresses
            .into_iter()
            .map(|address| self.key_with_memo(graph, address, transitive, &mut memo))
            .collect()
    }

    fn key_with_memo(
        &self,
        graph: &BuildGraph,
        address: &Address,
        transitive: bool,
        memo: &mut HashMap<Address, Option<String>>,
    ) -> Result<CacheKey, InvalidatorError> {
        let fingerprint = if transitive {
            self.transitive_fingerprint(graph, address, memo)?
        } else {
            let decl = graph
                .target(address)
                .ok_or_else(|| InvalidatorError::UnknownTarget(address.clone()))?;
            self.fingerprint(decl)?
        };

        Ok(match fingerprint {
            Some(fp) => CacheKey::new(address.id(), format!("{}_{}", fp, self.key_suffix)),
            None => CacheKey::uncacheable(address.id()),
        })
    }

    /// Fingerprint of a declaration and the contents of its sources.
    /// `None` when a source file has disappeared since loading.
    pub fn fingerprint(&self, decl: &TargetDecl) -> Result<Option<String>, InvalidatorError> {
        let input = FingerprintInput {
            address: decl.address.to_string(),
            alias: &decl.alias,
            sources: &decl.sources,
            dependencies: decl.dependencies.iter().map(|d| d.address.to_string()).collect(),
            tags: &decl.tags,
            timeout: decl.timeout,
            extra: &decl.extra,
        };

        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&input)?);

        for file in &decl.source_files {
            let path = self.root.join(file);
            let content = match std::fs::read(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!("Source {} of {} is missing", file, decl.address);
                    return Ok(None);
                }
                Err(e) => return Err(io_error(&path)(e)),
            };
            hasher.update(file.as_bytes());
            hasher.update([0u8]);
            hasher.update(Sha256::digest(&content));
        }

        Ok(Some(hex::encode(hasher.finalize())))
    }

    fn transitive_fingerprint(
        &self,
        graph: &BuildGraph,
        address: &Address,
        memo: &mut HashMap<Address, Option<String>>,
    ) -> Result<Option<String>, InvalidatorError> {
        if let Some(cached) = memo.get(address) {
            return Ok(cached.clone());
        }

        let decl = graph
            .target(address)
            .ok_or_else(|| InvalidatorError::UnknownTarget(address.clone()))?;

        let result = match self.fingerprint(decl)? {
            None => None,
            Some(own) => {
                let mut hasher = Sha256::new();
                hasher.update(own.as_bytes());
                let mut complete = true;
                // dependencies are kept sorted by address
                for dep in &decl.dependencies {
                    match self.transitive_fingerprint(graph, &dep.address, memo)? {
                        Some(fp) => {
                            hasher.update([0u8]);
                            hasher.update(fp.as_bytes());
                        }
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                complete.then(|| hex::encode(hasher.finalize()))
            }
        };

        memo.insert(address.clone(), result.clone());
        Ok(result)
    }
}

/// Persistent map from target id to the key of its last successful build.
pub struct BuildInvalidator {
    root: PathBuf,
}

impl BuildInvalidator {
    /// Keys are stored under `root/<version>[/<scope>]`; a scope keeps one
    /// task's records separate from another's.
    pub fn new(root: impl AsRef<Path>, scope: Option<&str>) -> Result<Self, InvalidatorError> {
        let mut root = root.as_ref().join(GLOBAL_CACHE_KEY_GEN_VERSION);
        if let Some(scope) = scope {
            root = root.join(scope);
        }
        std::fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(BuildInvalidator { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The key recorded by the last `update` for this id, if any.
    pub fn previous_key(&self, key: &CacheKey) -> Result<Option<CacheKey>, InvalidatorError> {
        if !key.cacheable() {
            return Ok(None);
        }
        Ok(self
            .read_hash(&key.id)?
            .map(|hash| CacheKey::new(key.id.clone(), hash)))
    }

    /// True when the recorded version differs from `key`. Uncacheable keys
    /// always need an update.
    pub fn needs_update(&self, key: &CacheKey) -> Result<bool, InvalidatorError> {
        if !key.cacheable() {
            return Ok(true);
        }
        Ok(self.read_hash(&key.id)?.as_deref() != Some(key.hash.as_str()))
    }

    /// Record `key` as the valid version of its target.
    pub fn update(&self, key: &CacheKey) -> Result<(), InvalidatorError> {
        if !key.cacheable() {
            return Ok(());
        }
        let path = self.hash_file(&key.id);
        std::fs::write(&path, &key.hash).map_err(io_error(&path))
    }

    /// Forget the recorded version of one target.
    pub fn force_invalidate(&self, key: &CacheKey) -> Result<(), InvalidatorError> {
        if !key.cacheable() {
            return Ok(());
        }
        let path = self.hash_file(&key.id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Forget everything.
    pub fn force_invalidate_all(&self) -> Result<(), InvalidatorError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(io_error(&self.root))?;
        }
        std::fs::create_dir_all(&self.root).map_err(io_error(&self.root))
    }

    fn hash_file(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.hash", safe_file_name(id)))
    }

    fn read_hash(&self, id: &str) -> Result<Option<String>, InvalidatorError> {
        let path = self.hash_file(id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

fn safe_file_name(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ',') { c } else { '_' })
        .collect();
    if sanitized.len() > MAX_FILE_NAME_LEN {
        hex::encode(Sha256::digest(id.as_bytes()))
    } else {
        sanitized
    }
}
