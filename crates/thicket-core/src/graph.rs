//! Resolved dependency graph over petgraph::StableDiGraph

use crate::address::Address;
use crate::model::*;
use crate::suggest::did_you_mean;
use crate::symbols::AddressTable;
use petgraph::Direction;
use petgraph::algo::{astar, tarjan_scc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, Reversed};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

/// A single problem found while resolving declarations into a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("duplicate target {address}: declared at {first} and {second}")]
    Duplicate {
        address: Address,
        first: String,
        second: String,
    },

    #[error("{from} depends on `{raw}`, but no target {address} is declared{}", suggestion_hint(.suggestion))]
    Unresolved {
        from: Address,
        raw: String,
        address: Address,
        suggestion: Option<Address>,
    },

    #[error("{0} depends on itself")]
    SelfDependency(Address),

    #[error("dependency cycle: {}", render_cycle(.0))]
    Cycle(Vec<Address>),
}

fn suggestion_hint(suggestion: &Option<Address>) -> String {
    match suggestion {
        Some(addr) => format!(" (did you mean {}?)", addr),
        None => String::new(),
    }
}

fn render_cycle(cycle: &[Address]) -> String {
    cycle
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Every problem found while resolving, reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveErrors(pub Vec<ResolveError>);

impl fmt::Display for ResolveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s) resolving the build graph", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveErrors {}

/// Errors from querying a resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown target {address}{}", suggestion_hint(.suggestion))]
    UnknownTarget {
        address: Address,
        suggestion: Option<Address>,
    },
}

/// The resolved target graph. Edges point from a dependent to its dependency.
pub struct BuildGraph {
    inner: StableDiGraph<TargetDecl, DependencyEdge>,
    table: AddressTable,
}

impl fmt::Debug for BuildGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

fn index(id: TargetId) -> NodeIndex {
    NodeIndex::new(id.0 as usize)
}

fn target_id(idx: NodeIndex) -> TargetId {
    TargetId(idx.index() as u32)
}

impl BuildGraph {
    pub fn new() -> Self {
        BuildGraph {
            inner: StableDiGraph::new(),
            table: AddressTable::new(),
        }
    }

    /// Resolve declarations into a graph.
    ///
    /// Duplicate addresses, unresolved references, self-dependencies and
    /// cycles are all collected; if any are found none of the graph is
    /// returned.
    pub fn resolve(decls: Vec<TargetDecl>) -> Result<BuildGraph, ResolveErrors> {
        let mut errors = Vec::new();
        let mut graph = BuildGraph::new();

        let mut decls = decls;
        decls.sort_by(|a, b| a.address.cmp(&b.address).then(a.location().cmp(&b.location())));

        for decl in decls {
            if let Some(existing) = graph.table.lookup(&decl.address) {
                let first = graph.inner[index(existing)].location();
                errors.push(ResolveError::Duplicate {
                    address: decl.address.clone(),
                    first,
                    second: decl.location(),
                });
                continue;
            }
            let address = decl.address.clone();
            let idx = graph.inner.add_node(decl);
            graph.table.insert(address, target_id(idx));
        }

        let nodes: Vec<NodeIndex> = graph.inner.node_indices().collect();
        for idx in nodes {
            let from = graph.inner[idx].address.clone();
            let deps = graph.inner[idx].dependencies.clone();
            for dep in deps {
                if dep.address == from {
                    errors.push(ResolveError::SelfDependency(from.clone()));
                    continue;
                }
                match graph.table.lookup(&dep.address) {
                    Some(target) => {
                        graph
                            .inner
                            .add_edge(idx, index(target), DependencyEdge { raw: dep.raw });
                    }
                    None => {
                        let suggestion = graph.suggest(&dep.address);
                        errors.push(ResolveError::Unresolved {
                            from: from.clone(),
                            raw: dep.raw,
                            address: dep.address,
                            suggestion,
                        });
                    }
                }
            }
        }

        let mut cycles: Vec<Vec<Address>> = tarjan_scc(&graph.inner)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| graph.cycle_path(&scc))
            .collect();
        cycles.sort();
        errors.extend(cycles.into_iter().map(ResolveError::Cycle));

        if errors.is_empty() {
            tracing::debug!(
                "Resolved {} targets, {} dependency edges",
                graph.node_count(),
                graph.edge_count()
            );
            Ok(graph)
        } else {
            Err(ResolveErrors(errors))
        }
    }

    /// Order a strongly connected component as a readable cycle, starting
    /// and ending at its smallest address.
    fn cycle_path(&self, scc: &[NodeIndex]) -> Vec<Address> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let Some(&start) = scc.iter().min_by(|a, b| self.inner[**a].address.cmp(&self.inner[**b].address)) else {
            return Vec::new();
        };

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::new();
        for next in self.sorted_neighbors(start, Direction::Outgoing) {
            if members.contains(&next) && !parents.contains_key(&next) {
                parents.insert(next, start);
                queue.push_back(next);
            }
        }

        while let Some(current) = queue.pop_front() {
            if current == start {
                let mut path = vec![start];
                let mut cursor = parents[&start];
                while cursor != start {
                    path.push(cursor);
                    cursor = parents[&cursor];
                }
                path.push(start);
                path.reverse();
                return path.into_iter().map(|idx| self.inner[idx].address.clone()).collect();
            }
            for next in self.sorted_neighbors(current, Direction::Outgoing) {
                if members.contains(&next) && !parents.contains_key(&next) {
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        // Unreachable for a real SCC; fall back to the member list.
        let mut addresses: Vec<Address> = scc.iter().map(|idx| self.inner[*idx].address.clone()).collect();
        addresses.sort();
        addresses
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.inner.neighbors_directed(idx, direction).collect();
        neighbors.sort_by(|a, b| self.inner[*a].address.cmp(&self.inner[*b].address));
        neighbors.dedup();
        neighbors
    }

    /// Closest declared address to one that does not exist.
    pub fn suggest(&self, missing: &Address) -> Option<Address> {
        let names = self.table.names_in_dir(&missing.spec_path);
        if !names.is_empty() {
            return did_you_mean(&missing.name, names.iter().map(String::as_str)).map(|name| Address {
                spec_path: missing.spec_path.clone(),
                name: name.to_string(),
            });
        }

        let spec_paths = self.table.spec_paths();
        let spec_path = did_you_mean(&missing.spec_path, spec_paths.iter().map(String::as_str))?;
        let names = self.table.names_in_dir(spec_path);
        let name = if names.iter().any(|n| *n == missing.name) {
            missing.name.clone()
        } else {
            names.into_iter().next()?
        };
        Some(Address {
            spec_path: spec_path.to_string(),
            name,
        })
    }

    fn lookup(&self, address: &Address) -> Result<NodeIndex, QueryError> {
        self.table
            .lookup(address)
            .map(index)
            .ok_or_else(|| QueryError::UnknownTarget {
                address: address.clone(),
                suggestion: self.suggest(address),
            })
    }

    /// Get a target by address.
    pub fn target(&self, address: &Address) -> Option<&TargetDecl> {
        self.table
            .lookup(address)
            .and_then(|id| self.inner.node_weight(index(id)))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.table.contains(address)
    }

    /// Total number of targets.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All targets, sorted by address.
    pub fn targets(&self) -> Vec<&TargetDecl> {
        let mut targets: Vec<&TargetDecl> = self.inner.node_indices().map(|idx| &self.inner[idx]).collect();
        targets.sort_by(|a, b| a.address.cmp(&b.address));
        targets
    }

    /// All `(dependent, dependency)` pairs, sorted.
    pub fn edges(&self) -> Vec<(&Address, &Address)> {
        let mut edges: Vec<(&Address, &Address)> = self
            .inner
            .edge_indices()
            .filter_map(|e| self.inner.edge_endpoints(e))
            .map(|(source, target)| (&self.inner[source].address, &self.inner[target].address))
            .collect();
        edges.sort();
        edges
    }

    fn collect_sorted(&self, indices: impl Iterator<Item = NodeIndex>) -> Vec<&TargetDecl> {
        let mut targets: Vec<&TargetDecl> = indices.map(|idx| &self.inner[idx]).collect();
        targets.sort_by(|a, b| a.address.cmp(&b.address));
        targets.dedup_by(|a, b| a.address == b.address);
        targets
    }

    /// Direct dependencies of a target.
    pub fn dependencies(&self, address: &Address) -> Result<Vec<&TargetDecl>, QueryError> {
        let idx = self.lookup(address)?;
        Ok(self.collect_sorted(self.inner.neighbors_directed(idx, Direction::Outgoing)))
    }

    /// Targets that directly depend on a target.
    pub fn dependees(&self, address: &Address) -> Result<Vec<&TargetDecl>, QueryError> {
        let idx = self.lookup(address)?;
        Ok(self.collect_sorted(self.inner.neighbors_directed(idx, Direction::Incoming)))
    }

    /// Everything a target depends on, directly or not.
    pub fn transitive_dependencies(&self, address: &Address) -> Result<Vec<&TargetDecl>, QueryError> {
        let start = self.lookup(address)?;
        let mut dfs = Dfs::new(&self.inner, start);
        let mut reached = Vec::new();
        while let Some(idx) = dfs.next(&self.inner) {
            if idx != start {
                reached.push(idx);
            }
        }
        Ok(self.collect_sorted(reached.into_iter()))
    }

    /// Everything that depends on a target, directly or not.
    pub fn transitive_dependees(&self, address: &Address) -> Result<Vec<&TargetDecl>, QueryError> {
        let start = self.lookup(address)?;
        let reversed = Reversed(&self.inner);
        let mut dfs = Dfs::new(reversed, start);
        let mut reached = Vec::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                reached.push(idx);
            }
        }
        Ok(self.collect_sorted(reached.into_iter()))
    }

    /// Targets ordered so every dependency precedes its dependents.
    /// Ties are broken by address so the order is stable.
    pub fn topological_order(&self) -> Vec<&TargetDecl> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .inner
            .node_indices()
            .map(|idx| (idx, self.sorted_neighbors(idx, Direction::Outgoing).len()))
            .collect();

        let mut ready: BTreeSet<(&Address, NodeIndex)> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| (&self.inner[*idx].address, *idx))
            .collect();

        let mut order = Vec::with_capacity(self.inner.node_count());
        while let Some(entry) = ready.pop_first() {
            let (_, idx) = entry;
            order.push(&self.inner[idx]);
            for dependee in self.sorted_neighbors(idx, Direction::Incoming) {
                if let Some(count) = remaining.get_mut(&dependee) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((&self.inner[dependee].address, dependee));
                    }
                }
            }
        }
        order
    }

    /// Targets nothing else depends on.
    pub fn roots(&self) -> Vec<&TargetDecl> {
        self.collect_sorted(self.inner.node_indices().filter(|idx| {
            self.inner
                .neighbors_directed(*idx, Direction::Incoming)
                .next()
                .is_none()
        }))
    }

    pub fn targets_of_kind(&self, kind: TargetKind) -> Vec<&TargetDecl> {
        self.targets().into_iter().filter(|t| t.kind == kind).collect()
    }

    pub fn targets_with_tag(&self, tag: &str) -> Vec<&TargetDecl> {
        self.targets().into_iter().filter(|t| t.tags.contains(tag)).collect()
    }

    /// Shortest dependency path from `from` to `to`, both ends included.
    pub fn path_between(&self, from: &Address, to: &Address) -> Result<Option<Vec<&TargetDecl>>, QueryError> {
        let start = self.lookup(from)?;
        let goal = self.lookup(to)?;
        let path = astar(&self.inner, start, |idx| idx == goal, |_| 1usize, |_| 0usize)
            .map(|(_, path)| path.into_iter().map(|idx| &self.inner[idx]).collect());
        Ok(path)
    }
}

impl Default for BuildGraph {
    fn default() -> Self {
        Self::new()
    }
}
