//! Graph diff computation for incremental reloads

use crate::address::Address;
use crate::graph::BuildGraph;
use serde::{Deserialize, Serialize};

/// What changed between two resolutions of the build graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDiff {
    /// Monotonically increasing diff sequence number.
    pub sequence: u64,
    /// Targets declared now but not before.
    pub added: Vec<Address>,
    /// Targets no longer declared.
    pub removed: Vec<Address>,
    /// Targets whose declaration changed.
    pub modified: Vec<Address>,
}

impl GraphDiff {
    /// Create an empty diff with given sequence number.
    pub fn new(sequence: u64) -> Self {
        GraphDiff {
            sequence,
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
        }
    }

    /// Check if this diff is empty (no changes).
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Compare two graphs. All lists come out sorted.
    pub fn between(old_graph: &BuildGraph, new_graph: &BuildGraph, sequence: u64) -> Self {
        let mut diff = GraphDiff::new(sequence);

        for target in new_graph.targets() {
            match old_graph.target(&target.address) {
                None => diff.added.push(target.address.clone()),
                Some(previous) if !previous.same_declaration(target) => {
                    diff.modified.push(target.address.clone())
                }
                Some(_) => {}
            }
        }

        for target in old_graph.targets() {
            if !new_graph.contains(&target.address) {
                diff.removed.push(target.address.clone());
            }
        }

        diff
    }
}

/// Hands out sequence numbers for successive diffs.
pub struct DiffEngine {
    sequence: u64,
}

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine { sequence: 0 }
    }

    /// Compute the difference between two graph states.
    /// Returns a GraphDiff with the sequence number incremented.
    pub fn compute_diff(&mut self, old_graph: &BuildGraph, new_graph: &BuildGraph) -> GraphDiff {
        self.sequence += 1;
        GraphDiff::between(old_graph, new_graph, self.sequence)
    }

    /// Get current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}
