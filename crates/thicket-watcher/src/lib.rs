//! Thicket Watcher: re-resolve the build graph as manifests change

pub mod watcher;

pub use watcher::{ManifestWatcher, WatchEvent};
