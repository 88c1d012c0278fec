//! Expand a target's source patterns into concrete files

use std::collections::BTreeSet;
use std::path::{Component, Path};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use thicket_core::SourceSpec;

use crate::error::SourceError;
use crate::loader::recursive_pattern;

/// Resolve `specs` declared in `spec_path` to files on disk.
///
/// Returns sorted, de-duplicated, root-relative `/`-separated paths. Literal
/// files that do not exist are dropped with a warning, as are globs that
/// match nothing. `*` never crosses a `/`; use `**` or `rglobs` for that.
pub fn expand_sources(root: &Path, spec_path: &str, specs: &[SourceSpec]) -> Result<Vec<String>, SourceError> {
    let dir = root.join(spec_path);
    let mut files = BTreeSet::new();

    for spec in specs {
        match spec {
            SourceSpec::Files(names) => {
                for name in names {
                    check_contained(spec_path, name)?;
                    if dir.join(name).is_file() {
                        files.insert(join(spec_path, name));
                    } else {
                        tracing::warn!("Source {} declared in {} does not exist", name, display_dir(spec_path));
                    }
                }
            }
            SourceSpec::Globs {
                include,
                exclude,
                recursive,
            } => {
                let include_patterns: Vec<String> =
                    include.iter().map(|p| recursive_pattern(p, *recursive)).collect();
                let includes = compile(spec_path, &include_patterns)?;
                let excludes = compile(spec_path, exclude)?;

                let matched = walk_matching(&dir, spec_path, &includes, &excludes)?;
                if matched.is_empty() {
                    tracing::warn!(
                        "Source globs [{}] in {} matched no files",
                        include_patterns.join(", "),
                        display_dir(spec_path)
                    );
                }
                files.extend(matched);
            }
        }
    }

    Ok(files.into_iter().collect())
}

fn display_dir(spec_path: &str) -> &str {
    if spec_path.is_empty() { "//" } else { spec_path }
}

fn join(spec_path: &str, relative: &str) -> String {
    if spec_path.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", spec_path, relative)
    }
}

fn check_contained(spec_path: &str, pattern: &str) -> Result<(), SourceError> {
    let escapes = Path::new(pattern)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(SourceError::Escapes {
            spec_path: spec_path.to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

fn compile(spec_path: &str, patterns: &[String]) -> Result<GlobSet, SourceError> {
    let pattern_error = |pattern: &str, source| SourceError::Pattern {
        spec_path: spec_path.to_string(),
        pattern: pattern.to_string(),
        source,
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        check_contained(spec_path, pattern)?;
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| pattern_error(pattern, e))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| pattern_error(&patterns.join(", "), e))
}

/// Files under `dir` matching `includes` but not `excludes`, as root-relative paths.
fn walk_matching(dir: &Path, spec_path: &str, includes: &GlobSet, excludes: &GlobSet) -> Result<Vec<String>, SourceError> {
    if includes.is_empty() || !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut matched = Vec::new();
    let walker = WalkBuilder::new(dir).standard_filters(false).hidden(true).build();
    for result in walker {
        let entry = result.map_err(|source| SourceError::Walk {
            dir: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if includes.is_match(&relative) && !excludes.is_match(&relative) {
            matched.push(join(spec_path, &relative));
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_files;
    use tempfile::TempDir;

    fn globs(include: &[&str], exclude: &[&str], recursive: bool) -> SourceSpec {
        SourceSpec::Globs {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            recursive,
        }
    }

    fn python_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        write_files(
            temp_dir.path(),
            &[
                ("src/app/main.py", ""),
                ("src/app/util.py", ""),
                ("src/app/test_util.py", ""),
                ("src/app/nested/deep.py", ""),
                ("src/app/README.md", ""),
            ],
        );
        temp_dir
    }

    #[test]
    fn star_does_not_cross_directories() {
        let temp_dir = python_tree();
        let files = expand_sources(temp_dir.path(), "src/app", &[globs(&["*.py"], &[], false)]).unwrap();
        assert_eq!(files, vec!["src/app/main.py", "src/app/test_util.py", "src/app/util.py"]);
    }

    #[test]
    fn rglobs_recurse_and_exclude() {
        let temp_dir = python_tree();
        let files = expand_sources(
            temp_dir.path(),
            "src/app",
            &[globs(&["*.py"], &["test_*.py"], true)],
        )
        .unwrap();
        assert_eq!(files, vec!["src/app/main.py", "src/app/nested/deep.py", "src/app/util.py"]);
    }

    #[test]
    fn literal_files_are_checked_and_merged() {
        let temp_dir = python_tree();
        let files = expand_sources(
            temp_dir.path(),
            "src/app",
            &[
                SourceSpec::Files(vec!["README.md".into(), "missing.py".into(), "main.py".into()]),
                globs(&["main.py"], &[], false),
            ],
        )
        .unwrap();
        assert_eq!(files, vec!["src/app/README.md", "src/app/main.py"]);
    }

    #[test]
    fn rejects_patterns_outside_the_root() {
        let temp_dir = python_tree();
        let err = expand_sources(temp_dir.path(), "src/app", &[SourceSpec::Files(vec!["../secret".into()])]).unwrap_err();
        assert!(matches!(err, SourceError::Escapes { .. }));

        let err = expand_sources(temp_dir.path(), "src/app", &[globs(&["[oops"], &[], false)]).unwrap_err();
        assert!(matches!(err, SourceError::Pattern { .. }));
    }

    #[test]
    fn root_spec_path_has_no_prefix() {
        let temp_dir = TempDir::new().unwrap();
        write_files(temp_dir.path(), &[("setup.py", ""), ("lib/x.py", "")]);
        let files = expand_sources(temp_dir.path(), "", &[globs(&["*.py"], &[], false)]).unwrap();
        assert_eq!(files, vec!["setup.py"]);
    }
}
