//! CLI command implementations

use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thicket_core::{
    Address, BuildGraph, BuildInvalidator, BuildRoot, CacheKey, CacheKeyGenerator, GraphDiff, QueryError, TargetDecl,
    TargetKind, clear_workdir, invalidator_dir,
};
use thicket_manifest::{Config, Coordinator};
use thicket_watcher::ManifestWatcher;
use tokio::sync::broadcast;

/// `--root` if given, otherwise the nearest ancestor of the cwd holding thicket.toml.
pub fn build_root(root: Option<PathBuf>) -> anyhow::Result<BuildRoot> {
    match root {
        Some(root) => {
            anyhow::ensure!(root.is_dir(), "build root {} is not a directory", root.display());
            Ok(BuildRoot::at(root))
        }
        None => Ok(BuildRoot::find().context("pass --root or run inside a thicket workspace")?),
    }
}

fn load(root: &Path) -> anyhow::Result<(Config, BuildGraph)> {
    let config = Config::load(root)?;
    let coordinator = Coordinator::new(root, config.clone());
    let graph = coordinator.load_graph()?;
    Ok((config, graph))
}

fn parse_address(spec: &str) -> anyhow::Result<Address> {
    Address::parse(spec, "").with_context(|| format!("invalid target address `{}`", spec))
}

fn print_targets(targets: &[&TargetDecl], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(targets)?);
    } else {
        for target in targets {
            println!("{}", target.address);
        }
    }
    Ok(())
}

pub fn list(root: &Path, kind: Option<TargetKind>, tag: Option<&str>, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    let targets: Vec<&TargetDecl> = graph
        .targets()
        .into_iter()
        .filter(|t| kind.is_none_or(|k| t.kind == k))
        .filter(|t| tag.is_none_or(|tag| t.tags.contains(tag)))
        .collect();

    if json {
        print_targets(&targets, true)?;
    } else {
        for target in &targets {
            println!("{:<48} {}", target.address.to_string(), target.kind);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn validate(root: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load(root)?;
    let coordinator = Coordinator::new(root, config);

    match coordinator.load_graph() {
        Ok(graph) => {
            if json {
                let report = json!({
                    "valid": true,
                    "targets": graph.node_count(),
                    "dependencies": graph.edge_count(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "OK: {} targets, {} dependencies",
                    graph.node_count(),
                    graph.edge_count()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let problems = err.problems();
            tracing::error!("Validation failed with {} problem(s)", problems.len());
            if json {
                let report = json!({ "valid": false, "problems": problems });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for problem in &problems {
                    println!("{}", problem);
                }
                println!("{} problem(s) found", problems.len());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn deps(root: &Path, address: &str, transitive: bool, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    let address = parse_address(address)?;
    let targets = if transitive {
        graph.transitive_dependencies(&address)?
    } else {
        graph.dependencies(&address)?
    };
    print_targets(&targets, json)?;
    Ok(ExitCode::SUCCESS)
}

pub fn dependees(root: &Path, address: &str, transitive: bool, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    let address = parse_address(address)?;
    let targets = if transitive {
        graph.transitive_dependees(&address)?
    } else {
        graph.dependees(&address)?
    };
    print_targets(&targets, json)?;
    Ok(ExitCode::SUCCESS)
}

pub fn order(root: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    print_targets(&graph.topological_order(), json)?;
    Ok(ExitCode::SUCCESS)
}

pub fn path(root: &Path, from: &str, to: &str, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    let from = parse_address(from)?;
    let to = parse_address(to)?;

    match graph.path_between(&from, &to)? {
        Some(path) if json => {
            let addresses: Vec<String> = path.iter().map(|t| t.address.to_string()).collect();
            println!("{}", serde_json::to_string_pretty(&addresses)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(path) => {
            let rendered: Vec<String> = path.iter().map(|t| t.address.to_string()).collect();
            println!("{}", rendered.join(" -> "));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            if json {
                println!("null");
            } else {
                println!("{} does not depend on {}", from, to);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Serialize)]
struct KeyReport<'a> {
    address: String,
    id: &'a str,
    hash: &'a str,
    cacheable: bool,
}

fn key_generator(root: &Path) -> CacheKeyGenerator {
    CacheKeyGenerator::new(root, &[env!("CARGO_PKG_VERSION").as_bytes()])
}

/// Keys for `addresses`, or for every target when empty.
fn target_keys(root: &Path, graph: &BuildGraph, addresses: Vec<Address>, transitive: bool) -> anyhow::Result<Vec<(Address, CacheKey)>> {
    let addresses = if addresses.is_empty() {
        graph.targets().into_iter().map(|t| t.address.clone()).collect()
    } else {
        if let Some(missing) = addresses.iter().find(|a| !graph.contains(a)) {
            return Err(QueryError::UnknownTarget {
                address: missing.clone(),
                suggestion: graph.suggest(missing),
            }
            .into());
        }
        addresses
    };
    let keys = key_generator(root).keys_for_targets(graph, &addresses, transitive)?;
    Ok(addresses.into_iter().zip(keys).collect())
}

fn invalidator(root: &Path, config: &Config, transitive: bool) -> anyhow::Result<BuildInvalidator> {
    let scope = if transitive { "transitive" } else { "direct" };
    Ok(BuildInvalidator::new(invalidator_dir(root, &config.workdir), Some(scope))?)
}

pub fn keys(root: &Path, specs: &[String], transitive: bool, json: bool) -> anyhow::Result<ExitCode> {
    let (_, graph) = load(root)?;
    let addresses = specs.iter().map(|s| parse_address(s)).collect::<anyhow::Result<Vec<_>>>()?;
    let keys = target_keys(root, &graph, addresses, transitive)?;

    if json {
        let report: Vec<KeyReport> = keys
            .iter()
            .map(|(address, key)| KeyReport {
                address: address.to_string(),
                id: &key.id,
                hash: &key.hash,
                cacheable: key.cacheable(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (address, key) in &keys {
            println!("{:<48} {}", address.to_string(), key.hash);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn changed(root: &Path, transitive: bool, json: bool) -> anyhow::Result<ExitCode> {
    let (config, graph) = load(root)?;
    let invalidator = invalidator(root, &config, transitive)?;

    let mut changed = Vec::new();
    for (address, key) in target_keys(root, &graph, Vec::new(), transitive)? {
        if invalidator.needs_update(&key)? {
            changed.push(address);
        }
    }
    tracing::info!("{} of {} targets changed", changed.len(), graph.node_count());

    if json {
        let addresses: Vec<String> = changed.iter().map(|a| a.to_string()).collect();
        println!("{}", serde_json::to_string_pretty(&addresses)?);
    } else {
        for address in &changed {
            println!("{}", address);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn mark(root: &Path, transitive: bool) -> anyhow::Result<ExitCode> {
    let (config, graph) = load(root)?;
    let invalidator = invalidator(root, &config, transitive)?;

    let keys = target_keys(root, &graph, Vec::new(), transitive)?;
    let mut recorded = 0;
    for (address, key) in &keys {
        if key.cacheable() {
            invalidator.update(key)?;
            recorded += 1;
        } else {
            tracing::warn!("Not recording {}: its key is uncacheable", address);
        }
    }
    println!("Recorded {} of {} keys", recorded, keys.len());
    Ok(ExitCode::SUCCESS)
}

pub async fn watch(root: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load(root)?;
    let coordinator = Coordinator::new(root, config);
    let mut watcher = if json {
        let (diff_tx, mut diff_rx) = broadcast::channel::<GraphDiff>(64);
        tokio::spawn(async move {
            while let Ok(diff) = diff_rx.recv().await {
                match serde_json::to_string(&diff) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!("Failed to serialize diff: {}", e),
                }
            }
        });
        ManifestWatcher::with_broadcast(coordinator, diff_tx)?
    } else {
        ManifestWatcher::new(coordinator)?
    };

    tokio::select! {
        result = watcher.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Stopping watcher"),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn clear(root: &Path) -> anyhow::Result<ExitCode> {
    let config = Config::load(root)?;
    tracing::info!("Clearing {} under {}", config.workdir, root.display());

    if clear_workdir(root, &config.workdir)? {
        println!("Removed {}", config.workdir);
    } else {
        println!("Nothing to clear");
    }
    Ok(ExitCode::SUCCESS)
}
