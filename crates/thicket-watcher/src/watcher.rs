//! Filesystem watcher that reloads the build graph when manifests change

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use globset::GlobSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thicket_core::{BuildGraph, DiffEngine, GraphDiff, workdir_path};
use thicket_manifest::{Config, Coordinator};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// A manifest change seen by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Manifest created or modified
    Changed(PathBuf),
    /// Manifest removed
    Removed(PathBuf),
}

/// Decides which filesystem paths are manifests worth reloading for.
///
/// Mirrors discovery: hidden entries, the workdir and configured `ignore`
/// globs are skipped, all judged on the path relative to the build root.
/// `.gitignore` is not consulted; an ignored manifest only costs a reload.
#[derive(Clone)]
struct ManifestFilter {
    root: PathBuf,
    workdir: PathBuf,
    build_files: GlobSet,
    ignored: GlobSet,
}

impl ManifestFilter {
    fn new(root: PathBuf, config: &Config) -> Result<Self> {
        Ok(ManifestFilter {
            workdir: workdir_path(&root, &config.workdir),
            root,
            build_files: config.build_file_matcher()?,
            ignored: config.ignore_matcher()?,
        })
    }

    fn matches(&self, path: &Path) -> bool {
        if path.starts_with(&self.workdir) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if is_hidden(relative) {
            return false;
        }
        let ignored = relative
            .ancestors()
            .any(|p| !p.as_os_str().is_empty() && self.ignored.is_match(p));
        if ignored {
            return false;
        }
        relative.file_name().is_some_and(|name| self.build_files.is_match(name))
    }
}

/// Keeps a resolved `BuildGraph` in sync with the manifests on disk.
///
/// Events are debounced: after the first manifest change the watcher waits
/// until no further change arrives for `watch.debounce_ms` before reloading.
/// A reload that fails keeps the last good graph.
pub struct ManifestWatcher {
    coordinator: Arc<Coordinator>,
    /// Canonical build root; notify reports paths under the watched path.
    root: PathBuf,
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    debounce: Duration,
    graph: Arc<BuildGraph>,
    diff_engine: DiffEngine,
    diff_tx: Option<broadcast::Sender<GraphDiff>>,
}

impl ManifestWatcher {
    pub fn new(coordinator: Coordinator) -> Result<Self> {
        let root = std::fs::canonicalize(coordinator.root())
            .with_context(|| format!("cannot watch {}", coordinator.root().display()))?;
        let config = coordinator.config();
        let filter = ManifestFilter::new(root.clone(), config)?;
        let debounce = Duration::from_millis(config.watch.debounce_ms);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                handle_notify_event(event, &filter, &event_tx);
            }
            Err(e) => {
                error!("File system watch error: {}", e);
            }
        })?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            root,
            watcher,
            event_rx,
            debounce,
            graph: Arc::new(BuildGraph::new()),
            diff_engine: DiffEngine::new(),
            diff_tx: None,
        })
    }

    /// Create a watcher that also publishes every successful reload's diff.
    pub fn with_broadcast(coordinator: Coordinator, diff_tx: broadcast::Sender<GraphDiff>) -> Result<Self> {
        let mut watcher = Self::new(coordinator)?;
        watcher.diff_tx = Some(diff_tx);
        Ok(watcher)
    }

    /// The last successfully resolved graph.
    pub fn graph(&self) -> Arc<BuildGraph> {
        Arc::clone(&self.graph)
    }

    /// Start receiving events for everything under the build root.
    pub fn start(&mut self) -> Result<()> {
        self.watcher.watch(&self.root, RecursiveMode::Recursive)?;
        info!("Watching manifests under {}", self.root.display());
        Ok(())
    }

    /// Reload every manifest and swap in the new graph.
    ///
    /// Returns the diff against the previous graph, or `None` if loading or
    /// resolving failed; failures are logged and the previous graph kept.
    pub async fn reload(&mut self) -> Option<GraphDiff> {
        let coordinator = Arc::clone(&self.coordinator);
        let loaded = tokio::task::spawn_blocking(move || coordinator.load_graph()).await;

        let graph = match loaded {
            Ok(Ok(graph)) => graph,
            Ok(Err(err)) => {
                let problems = err.problems();
                warn!("Reload failed with {} problem(s); keeping the previous graph", problems.len());
                for problem in problems {
                    warn!("  {}", problem);
                }
                return None;
            }
            Err(e) => {
                error!("Manifest reload task failed: {}", e);
                return None;
            }
        };

        let diff = self.diff_engine.compute_diff(&self.graph, &graph);
        if diff.is_empty() {
            debug!("Reload #{} changed nothing", diff.sequence);
        } else {
            info!(
                "Reload #{}: {} added, {} removed, {} modified",
                diff.sequence,
                diff.added.len(),
                diff.removed.len(),
                diff.modified.len()
            );
            for address in &diff.added {
                info!("  + {}", address);
            }
            for address in &diff.removed {
                info!("  - {}", address);
            }
            for address in &diff.modified {
                info!("  ~ {}", address);
            }
        }
        self.graph = Arc::new(graph);
        if let Some(diff_tx) = &self.diff_tx {
            // no subscribers is fine
            let _ = diff_tx.send(diff.clone());
        }
        Some(diff)
    }

    /// Load once, then reload after every debounced batch of manifest changes.
    /// Runs until the underlying watcher goes away.
    pub async fn run(&mut self) -> Result<()> {
        self.start()?;
        self.reload().await;

        while let Some(event) = self.event_rx.recv().await {
            debug!("Manifest event: {:?}", event);
            let mut batch = 1usize;
            loop {
                match tokio::time::timeout(self.debounce, self.event_rx.recv()).await {
                    Ok(Some(event)) => {
                        debug!("Manifest event: {:?}", event);
                        batch += 1;
                    }
                    Ok(None) => return Ok(()),
                    Err(_) => break,
                }
            }
            info!("{} manifest change(s), reloading", batch);
            self.reload().await;
        }

        Ok(())
    }
}

fn handle_notify_event(event: notify::Event, filter: &ManifestFilter, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
    let removed = match event.kind {
        notify::EventKind::Create(_) | notify::EventKind::Modify(_) => false,
        notify::EventKind::Remove(_) => true,
        _ => return,
    };
    for path in event.paths {
        if !filter.matches(&path) {
            continue;
        }
        let watch_event = if removed {
            WatchEvent::Removed(path)
        } else {
            WatchEvent::Changed(path)
        };
        if let Err(e) = event_tx.send(watch_event) {
            warn!("Failed to send manifest event: {}", e);
        }
    }
}

/// Any component starting with `.`, as the discovery walk skips them.
fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|component| component.as_os_str().to_str().is_some_and(|name| name.starts_with('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use thicket_core::Address;
    use tokio::task::JoinHandle;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn watcher_for(root: &Path) -> ManifestWatcher {
        let coordinator = Coordinator::new(root, Config::load(root).unwrap());
        ManifestWatcher::new(coordinator).unwrap()
    }

    fn addr(spec: &str) -> Address {
        Address::parse(spec, "").unwrap()
    }

    #[test]
    fn test_manifest_filter() {
        let mut config = Config::default();
        config.ignore.push("vendor".to_string());
        let filter = ManifestFilter::new(PathBuf::from("/repo"), &config).unwrap();
        assert!(filter.matches(Path::new("/repo/src/BUILD")));
        assert!(filter.matches(Path::new("/repo/BUILD.tools")));
        assert!(filter.matches(Path::new("/repo/src/target/BUILD")));
        assert!(filter.matches(Path::new("/repo/node_modules/pkg/BUILD")));
        assert!(!filter.matches(Path::new("/repo/src/main.py")));
        assert!(!filter.matches(Path::new("/repo/.thicket/BUILD")));
        assert!(!filter.matches(Path::new("/repo/.git/BUILD")));
        assert!(!filter.matches(Path::new("/repo/vendor/lib/BUILD")));
        assert!(!filter.matches(Path::new("/elsewhere/BUILD")));
    }

    #[test]
    fn test_manifest_filter_judges_paths_below_the_root() {
        let filter = ManifestFilter::new(PathBuf::from("/work/target/.cache/repo"), &Config::default()).unwrap();
        assert!(filter.matches(Path::new("/work/target/.cache/repo/src/BUILD")));
        assert!(!filter.matches(Path::new("/work/target/.cache/repo/.hidden/BUILD")));
    }

    #[tokio::test]
    async fn test_reload_reports_diffs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "lib/BUILD", "library(name='lib')\n");
        write(root, "app/BUILD", "python_binary(name='app', dependencies=['lib'])\n");

        let mut watcher = watcher_for(root);
        let first = watcher.reload().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.added, vec![addr("app:app"), addr("lib:lib")]);
        assert_eq!(watcher.graph().node_count(), 2);

        write(root, "app/BUILD", "python_binary(name='app', dependencies=['lib'], timeout=10)\n");
        write(root, "docs/BUILD", "page(name='docs')\n");
        let second = watcher.reload().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.added, vec![addr("docs:docs")]);
        assert_eq!(second.modified, vec![addr("app:app")]);
        assert!(second.removed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_graph() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "lib/BUILD", "library(name='lib')\n");

        let mut watcher = watcher_for(root);
        watcher.reload().await.unwrap();

        write(root, "lib/BUILD", "library(name='lib', dependencies=[':missing'])\n");
        assert!(watcher.reload().await.is_none());
        assert!(watcher.graph().contains(&addr("lib:lib")));

        write(root, "lib/BUILD", "library(name='renamed')\n");
        let diff = watcher.reload().await.unwrap();
        assert_eq!(diff.removed, vec![addr("lib:lib")]);
        assert_eq!(diff.added, vec![addr("lib:renamed")]);
    }

    fn spawn_watcher(root: &Path) -> (broadcast::Receiver<GraphDiff>, JoinHandle<()>) {
        let (diff_tx, diff_rx) = broadcast::channel(16);
        let coordinator = Coordinator::new(root, Config::load(root).unwrap());
        let mut watcher = ManifestWatcher::with_broadcast(coordinator, diff_tx).unwrap();
        let handle = tokio::spawn(async move {
            watcher.run().await.unwrap();
        });
        (diff_rx, handle)
    }

    async fn next_change(diff_rx: &mut broadcast::Receiver<GraphDiff>) -> GraphDiff {
        loop {
            let diff = tokio::time::timeout(Duration::from_secs(10), diff_rx.recv())
                .await
                .expect("no reload within 10s")
                .unwrap();
            if !diff.is_empty() {
                return diff;
            }
        }
    }

    /// Start `run()` on `root`, edit a manifest and wait for the debounced reload.
    async fn assert_reloads_on_edit(root: &Path) {
        write(root, "thicket.toml", "[watch]\ndebounce_ms = 50\n");
        write(root, "lib/BUILD", "library(name='lib')\n");

        let (mut diff_rx, handle) = spawn_watcher(root);
        let initial = next_change(&mut diff_rx).await;
        assert_eq!(initial.added, vec![addr("lib:lib")]);

        write(root, "lib/BUILD", "library(name='lib')\nlibrary(name='extra')\n");
        let diff = next_change(&mut diff_rx).await;
        assert_eq!(diff.added, vec![addr("lib:extra")]);
        assert!(diff.removed.is_empty());

        handle.abort();
    }

    #[tokio::test]
    async fn test_run_reloads_after_manifest_change() {
        let temp_dir = TempDir::new().unwrap();
        assert_reloads_on_edit(temp_dir.path()).await;
    }

    #[tokio::test]
    async fn test_run_with_root_under_ignored_looking_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("target/repo");
        assert_reloads_on_edit(&root).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_with_symlinked_root() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        let link = temp_dir.path().join("link");
        fs::create_dir_all(&real).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert_reloads_on_edit(&link).await;
    }

    #[tokio::test]
    async fn test_start_watching() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = watcher_for(temp_dir.path());
        assert!(watcher.start().is_ok());
    }
}
