//! Test utilities for thicket-manifest

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Write `(relative path, contents)` pairs under `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

/// A small Python repository: a library, its tests, a binary and a
/// third-party requirement.
pub fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    write_files(
        temp_dir.path(),
        &[
            ("thicket.toml", "ignored_aliases = [\"python_requirements\"]\n"),
            ("3rdparty/python/BUILD", r#"
python_requirements()

python_requirement_library(
  name='six',
  requirements=[python_requirement('six==1.16.0')],
)
"#),
            ("src/python/util/BUILD", r#"
python_library(
  name='util',
  sources=globs('*.py', exclude=['test_*.py']),
  dependencies=['3rdparty/python:six'],
  tags=['partially_type_checked'],
)

python_tests(
  name='tests',
  sources=['test_strutil.py'],
  dependencies=[':util'],
  timeout=60,
)
"#),
            ("src/python/util/strutil.py", "import six\n"),
            ("src/python/util/fileutil.py", ""),
            ("src/python/util/test_strutil.py", ""),
            ("src/python/app/BUILD", r#"
python_binary(
  name='app',
  source='main.py',
  dependencies=['src/python/util'],
  description="""Command line entry point""",
)
"#),
            ("src/python/app/main.py", ""),
        ],
    );
    temp_dir
}
