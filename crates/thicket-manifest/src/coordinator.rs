//! Orchestrates parallel manifest loading

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thicket_core::{BuildGraph, TargetDecl};

use crate::config::Config;
use crate::discovery::find_manifests;
use crate::error::{ManifestError, ManifestErrors, WorkspaceError};
use crate::loader::load_calls;
use crate::parser::parse_manifest;
use crate::sources::expand_sources;

pub struct Coordinator {
    root: PathBuf,
    config: Config,
}

impl Coordinator {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Coordinator {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse and load one manifest, given relative to the build root.
    pub fn load_manifest(&self, relative: &Path) -> Result<Vec<TargetDecl>, Vec<ManifestError>> {
        let path = self.root.join(relative);
        let source = std::fs::read_to_string(&path).map_err(|source| vec![ManifestError::Read { path, source }])?;

        let calls = parse_manifest(&source, relative).map_err(|e| vec![ManifestError::from(e)])?;
        let mut decls = load_calls(&calls, relative, &self.config)
            .map_err(|errors| errors.into_iter().map(ManifestError::from).collect::<Vec<_>>())?;

        let mut errors: Vec<ManifestError> = Vec::new();
        for decl in &mut decls {
            match expand_sources(&self.root, &decl.address.spec_path, &decl.sources) {
                Ok(files) => decl.source_files = files,
                Err(e) => errors.push(ManifestError::from(e)),
            }
        }

        if errors.is_empty() {
            tracing::debug!("Loaded {} targets from {}", decls.len(), relative.display());
            Ok(decls)
        } else {
            Err(errors)
        }
    }

    /// Load every manifest under the root. Problems from all manifests are
    /// gathered before failing.
    pub fn load_declarations(&self) -> Result<Vec<TargetDecl>, ManifestErrors> {
        let manifests = find_manifests(&self.root, &self.config).map_err(|e| ManifestErrors(vec![e]))?;
        tracing::info!("Loading {} manifests from {}", manifests.len(), self.root.display());

        let results: Vec<_> = manifests
            .par_iter()
            .map(|manifest| self.load_manifest(manifest))
            .collect();

        let mut decls = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(loaded) => decls.extend(loaded),
                Err(problems) => errors.extend(problems),
            }
        }

        if errors.is_empty() {
            Ok(decls)
        } else {
            Err(ManifestErrors(errors))
        }
    }

    /// Load every manifest and resolve the result into a graph.
    pub fn load_graph(&self) -> Result<BuildGraph, WorkspaceError> {
        let decls = self.load_declarations()?;
        let graph = BuildGraph::resolve(decls)?;
        tracing::info!(
            "Resolved {} targets with {} dependencies",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
