//! Test utilities for thicket-core

use crate::address::Address;
use crate::model::{DependencyRef, SourceSpec, TargetDecl};
use std::path::PathBuf;

/// Parse an address relative to the root, panicking on bad input.
pub fn addr(spec: &str) -> Address {
    Address::parse(spec, "").unwrap()
}

/// Declare a target at `spec` with dependencies given as specs relative
/// to the target's own directory.
pub fn decl(spec: &str, alias: &str, deps: &[&str]) -> TargetDecl {
    let address = addr(spec);
    let manifest = PathBuf::from(&address.spec_path).join("BUILD");
    let mut target = TargetDecl::new(address.clone(), alias, manifest, 1);
    for dep in deps {
        target.add_dependency(DependencyRef {
            raw: dep.to_string(),
            address: Address::parse(dep, &address.spec_path).unwrap(),
        });
    }
    target
}

/// Same as `decl`, with literal source files (paths relative to the root).
pub fn decl_with_sources(spec: &str, deps: &[&str], files: &[&str]) -> TargetDecl {
    let mut target = decl(spec, "python_library", deps);
    let spec_path = target.address.spec_path.clone();
    let relative: Vec<String> = files
        .iter()
        .map(|f| {
            f.strip_prefix(&format!("{}/", spec_path))
                .unwrap_or(f)
                .to_string()
        })
        .collect();
    target.sources = vec![SourceSpec::Files(relative)];
    target.source_files = files.iter().map(|f| f.to_string()).collect();
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decl_normalises_relative_dependencies() {
        let target = decl("src/app:main", "python_binary", &[":lib", "3rdparty:six"]);
        let deps: Vec<String> = target
            .dependencies
            .iter()
            .map(|d| d.address.to_string())
            .collect();
        assert_eq!(deps, vec!["3rdparty:six", "src/app:lib"]);
        assert_eq!(target.manifest, PathBuf::from("src/app/BUILD"));
    }
}
