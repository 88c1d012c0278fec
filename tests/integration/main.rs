//! Integration tests for Thicket
//!
//! These tests drive the `thicket` binary against fixture repositories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// lib:lib <- app:app <- app:tests
fn create_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "thicket.toml", "");
    write(root, "lib/BUILD", "python_library(name='lib', sources=['lib.py'])\n");
    write(root, "lib/lib.py", "VALUE = 1\n");
    write(
        root,
        "app/BUILD",
        r#"
python_binary(
  name='app',
  sources=globs('*.py'),
  dependencies=['lib'],
)

python_tests(
  name='tests',
  dependencies=[':app'],
  tags=['slow'],
)
"#,
    );
    write(root, "app/main.py", "import lib\n");
    temp_dir
}

fn thicket(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_thicket"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("THICKET_LOG")
        .output()
        .expect("Failed to execute thicket")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn lines(output: &Output) -> Vec<String> {
    stdout(output).lines().map(str::to_string).collect()
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_thicket"))
        .arg("--help")
        .output()
        .expect("Failed to execute thicket");

    let help = stdout(&output);
    assert!(output.status.success());
    assert!(help.contains("Load, validate and query BUILD manifests"));
    for command in ["list", "validate", "deps", "dependees", "order", "path", "keys", "changed", "mark", "watch", "clear"] {
        assert!(help.contains(command), "help is missing `{}`", command);
    }

    let output = Command::new(env!("CARGO_BIN_EXE_thicket"))
        .arg("version")
        .output()
        .expect("Failed to execute thicket");
    assert_eq!(stdout(&output).trim(), format!("thicket v{}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_validate_valid_repo() {
    let repo = create_repo();
    let output = thicket(repo.path(), &["validate"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "OK: 3 targets, 2 dependencies");

    let output = thicket(repo.path(), &["--json", "validate"]);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["targets"], 3);
}

#[test]
fn test_validate_reports_cycles_and_unresolved() {
    let repo = create_repo();
    write(
        repo.path(),
        "lib/BUILD",
        "python_library(name='lib', sources=['lib.py'], dependencies=['app', 'lib:helpres'])\npython_library(name='helpers')\n",
    );

    let output = thicket(repo.path(), &["validate"]);
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.contains("lib:lib depends on `lib:helpres`, but no target lib:helpres is declared (did you mean lib:helpers?)"));
    assert!(text.contains("dependency cycle: app:app -> lib:lib -> app:app"));
    assert!(text.contains("2 problem(s) found"));

    let output = thicket(repo.path(), &["--json", "validate"]);
    assert!(!output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], false);
    assert_eq!(report["problems"].as_array().unwrap().len(), 2);
}

#[test]
fn test_validate_reports_syntax_errors() {
    let repo = create_repo();
    write(repo.path(), "broken/BUILD", "page(name='docs', sources=[)\n");

    let output = thicket(repo.path(), &["validate"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("broken/BUILD:1:28: "));

    write(repo.path(), "broken/BUILD", &format!("page(name='docs', sources={}])\n", "[".repeat(100)));
    let output = thicket(repo.path(), &["validate"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("broken/BUILD:1:90: nesting too deep"));
}

#[test]
fn test_list_filters() {
    let repo = create_repo();

    let output = thicket(repo.path(), &["list"]);
    let addresses: Vec<String> = lines(&output)
        .iter()
        .map(|line| line.split_whitespace().next().unwrap().to_string())
        .collect();
    assert_eq!(addresses, vec!["app:app", "app:tests", "lib:lib"]);

    let output = thicket(repo.path(), &["list", "--kind", "test-suite"]);
    assert_eq!(lines(&output).len(), 1);
    assert!(stdout(&output).starts_with("app:tests"));

    let output = thicket(repo.path(), &["list", "--tag", "slow", "--json"]);
    let targets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(targets[0]["address"]["name"], "tests");
    assert_eq!(targets[0]["kind"], "test-suite");
}

#[test]
fn test_graph_queries() {
    let repo = create_repo();

    let output = thicket(repo.path(), &["deps", "app:tests"]);
    assert_eq!(lines(&output), vec!["app:app"]);

    let output = thicket(repo.path(), &["deps", "app:tests", "--transitive"]);
    assert_eq!(lines(&output), vec!["app:app", "lib:lib"]);

    let output = thicket(repo.path(), &["dependees", "lib", "--transitive"]);
    assert_eq!(lines(&output), vec!["app:app", "app:tests"]);

    let output = thicket(repo.path(), &["order"]);
    assert_eq!(lines(&output), vec!["lib:lib", "app:app", "app:tests"]);

    let output = thicket(repo.path(), &["path", "app:tests", "lib"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "app:tests -> app:app -> lib:lib");

    let output = thicket(repo.path(), &["path", "lib", "app:tests"]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_target_suggests_alternative() {
    let repo = create_repo();
    let output = thicket(repo.path(), &["deps", "app:test"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown target app:test (did you mean app:tests?)"));
}

#[test]
fn test_keys_mark_and_changed() {
    let repo = create_repo();

    let output = thicket(repo.path(), &["--json", "keys", "lib"]);
    let keys: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(keys[0]["id"], "lib.lib");
    assert_eq!(keys[0]["cacheable"], true);

    // nothing has been recorded yet
    assert_eq!(lines(&thicket(repo.path(), &["changed"])).len(), 3);

    let output = thicket(repo.path(), &["mark"]);
    assert_eq!(stdout(&output).trim(), "Recorded 3 of 3 keys");
    let output = thicket(repo.path(), &["mark", "--transitive"]);
    assert!(output.status.success());
    assert!(lines(&thicket(repo.path(), &["changed"])).is_empty());

    write(repo.path(), "lib/lib.py", "VALUE = 2\n");
    assert_eq!(lines(&thicket(repo.path(), &["changed"])), vec!["lib:lib"]);
    assert_eq!(
        lines(&thicket(repo.path(), &["changed", "--transitive"])),
        vec!["app:app", "app:tests", "lib:lib"]
    );

    // a new file matched by globs('*.py') changes app's key
    thicket(repo.path(), &["mark"]);
    write(repo.path(), "app/cli.py", "");
    assert_eq!(lines(&thicket(repo.path(), &["changed"])), vec!["app:app"]);
}

#[test]
fn test_clear_removes_workdir() {
    let repo = create_repo();
    thicket(repo.path(), &["mark"]);
    assert!(repo.path().join(".thicket").is_dir());

    let output = thicket(repo.path(), &["clear"]);
    assert_eq!(stdout(&output).trim(), "Removed .thicket");
    assert!(!repo.path().join(".thicket").exists());

    let output = thicket(repo.path(), &["clear"]);
    assert_eq!(stdout(&output).trim(), "Nothing to clear");
}

#[test]
fn test_build_root_found_from_subdirectory() {
    let repo = create_repo();
    let output = Command::new(env!("CARGO_BIN_EXE_thicket"))
        .arg("order")
        .current_dir(repo.path().join("app"))
        .output()
        .expect("Failed to execute thicket");
    assert!(output.status.success());
    assert_eq!(lines(&output), vec!["lib:lib", "app:app", "app:tests"]);
}
