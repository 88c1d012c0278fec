//! Thicket Core: target model, address resolution, dependency graph and invalidation

pub mod address;
pub mod build_root;
pub mod diff;
pub mod graph;
pub mod invalidation;
pub mod model;
pub mod suggest;
pub mod symbols;
pub mod workdir;


#[cfg(test)]
pub mod test_utils;

pub use address::{Address, AddressError};
pub use build_root::{BuildRoot, BUILD_ROOT_MARKER};
pub use diff::{DiffEngine, GraphDiff};
pub use graph::{BuildGraph, QueryError, ResolveError, ResolveErrors};
pub use invalidation::{
    BuildInvalidator, CacheKey, CacheKeyGenerator, InvalidatorError, GLOBAL_CACHE_KEY_GEN_VERSION,
};
pub use model::{
    Call, DependencyEdge, DependencyRef, SourceSpec, TargetDecl, TargetId, TargetKind, Value,
};
pub use symbols::AddressTable;
pub use workdir::{DEFAULT_WORKDIR, clear_workdir, invalidator_dir, workdir_path};
