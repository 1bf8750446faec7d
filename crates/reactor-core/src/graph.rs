//! The incrementally maintained dependency DAG.
//!
//! Nodes are cell ids; an edge `A -> B` means "B reads a variable that A
//! currently writes". The graph is never transiently cyclic: every mutation
//! is preceded by a full validation pass over the edges it would introduce,
//! and the update is rejected wholesale (with the graph left byte-identical)
//! if any of them would close a cycle.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::cell::CellId;
use crate::error::{Error, Result};
use crate::extractor::NameSet;

/// Directed graph of cell dependencies, plus the per-variable writer map
/// that drives incremental edge maintenance.
#[derive(Default)]
pub struct DependencyGraph {
    graph: DiGraph<CellId, ()>,
    nodes: FxHashMap<CellId, NodeIndex>,
    reads: FxHashMap<CellId, NameSet>,
    writes: FxHashMap<CellId, NameSet>,
    /// Current producer of each variable name (last `update_cell` wins).
    writer_of: FxHashMap<String, CellId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn reads_of(&self, id: &CellId) -> Option<&NameSet> {
        self.reads.get(id)
    }

    pub fn writes_of(&self, id: &CellId) -> Option<&NameSet> {
        self.writes.get(id)
    }

    pub fn writer_of(&self, name: &str) -> Option<&CellId> {
        self.writer_of.get(name)
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = &CellId> {
        self.nodes.keys()
    }

    fn node_of(&mut self, id: &CellId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.nodes.insert(id.clone(), idx);
        idx
    }

    /// Incrementally update `id`'s reads/writes.
    ///
    /// Computes every prospective edge the new sets would introduce, checks
    /// each one against the *current* graph (including `id`'s own
    /// about-to-be-replaced edges — an edge that is simultaneously removed
    /// and whose reversal is proposed is still a cycle until it's gone), and
    /// rejects the entire update before mutating anything if any prospective
    /// edge `U -> V` would close a cycle (a path `V ⇝ U` already exists).
    pub fn update_cell(&mut self, id: &CellId, reads: NameSet, writes: NameSet) -> Result<()> {
        let c_idx = self.node_of(id);

        let mut prospective: Vec<(CellId, CellId)> = Vec::new();
        for name in &reads {
            if let Some(writer) = self.writer_of.get(name) {
                if writer != id {
                    prospective.push((writer.clone(), id.clone()));
                }
            }
        }
        for name in &writes {
            for (other_id, other_reads) in &self.reads {
                if other_id != id && other_reads.contains(name) {
                    prospective.push((id.clone(), other_id.clone()));
                }
            }
        }

        for (u, v) in &prospective {
            let u_idx = self.nodes[u];
            let v_idx = self.nodes[v];
            if has_path_connecting(&self.graph, v_idx, u_idx, None) {
                return Err(Error::CycleDetected(u.to_string(), v.to_string()));
            }
        }

        // Validation passed: now mutate. Drop C's existing incident edges
        // first so stale producer/consumer relationships don't survive.
        let stale_edges: Vec<_> = self
            .graph
            .edges_directed(c_idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(c_idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        for e in stale_edges {
            self.graph.remove_edge(e);
        }

        // Release writer claims on names C no longer writes.
        if let Some(old_writes) = self.writes.get(id) {
            for name in old_writes {
                if !writes.contains(name) && self.writer_of.get(name) == Some(id) {
                    self.writer_of.remove(name);
                }
            }
        }
        for name in &writes {
            self.writer_of.insert(name.clone(), id.clone());
        }

        self.reads.insert(id.clone(), reads);
        self.writes.insert(id.clone(), writes);

        for (u, v) in prospective {
            let u_idx = self.node_of(&u);
            let v_idx = self.node_of(&v);
            self.graph.update_edge(u_idx, v_idx, ());
        }

        Ok(())
    }

    /// Remove a cell and its edges. No-op if the cell has no node.
    pub fn remove_cell(&mut self, id: &CellId) {
        let Some(idx) = self.nodes.remove(id) else {
            return;
        };
        self.graph.remove_node(idx);
        self.reads.remove(id);
        self.writes.remove(id);
        self.writer_of.retain(|_, writer| writer != id);

        // `remove_node` swaps the last node into the freed slot on a
        // Vec-backed graph, invalidating that node's old `NodeIndex`.
        // Rebuild the lookup table rather than reason about which one moved.
        self.nodes = self
            .graph
            .node_indices()
            .map(|i| (self.graph[i].clone(), i))
            .collect();
    }

    /// All ancestors (transitive upstream producers) of `id`.
    pub fn ancestors(&self, id: &CellId) -> HashSet<CellId> {
        self.collect_related(id, Direction::Incoming)
    }

    /// All descendants (transitive downstream consumers) of `id`.
    pub fn descendants(&self, id: &CellId) -> HashSet<CellId> {
        self.collect_related(id, Direction::Outgoing)
    }

    fn collect_related(&self, id: &CellId, dir: Direction) -> HashSet<CellId> {
        let mut out = HashSet::new();
        let Some(&start) = self.nodes.get(id) else {
            return out;
        };
        let mut seen = HashSet::new();
        seen.insert(start);
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(n, dir) {
                if seen.insert(neighbor) {
                    out.insert(self.graph[neighbor].clone());
                    stack.push(neighbor);
                }
            }
        }
        out
    }

    /// Topological sort of the subgraph induced by `{id} ∪ descendants(id)`.
    ///
    /// Tie-breaking among independent peers is whatever the underlying
    /// toposort produces; callers must not depend on a specific order among
    /// cells with no path between them.
    pub fn get_execution_order(&self, id: &CellId) -> Vec<CellId> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        let mut set = self.descendants(id);
        set.insert(id.clone());
        self.topological_subset(&set)
    }

    /// Topological sort restricted to an arbitrary subset of registered
    /// cells. Used by the kernel's stale-filtered cascade, which executes
    /// `{stale ancestors} ∪ {C} ∪ descendants(C)`.
    pub fn topological_subset(&self, ids: &HashSet<CellId>) -> Vec<CellId> {
        match toposort(&self.graph, None) {
            Ok(order) => order
                .into_iter()
                .map(|i| self.graph[i].clone())
                .filter(|cid| ids.contains(cid))
                .collect(),
            // The graph is acyclic by construction; this arm is unreachable
            // in practice and only guards against that invariant somehow
            // not holding.
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CellId {
        CellId::new(s)
    }

    fn names(vals: &[&str]) -> NameSet {
        vals.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn linear_chain_edge_correctness() {
        let mut g = DependencyGraph::new();
        g.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&["y"])).unwrap();
        g.update_cell(&id("c3"), names(&["y"]), names(&[])).unwrap();

        assert_eq!(g.get_execution_order(&id("c1")), vec![id("c1"), id("c2"), id("c3")]);
        assert_eq!(g.ancestors(&id("c3")), HashSet::from([id("c1"), id("c2")]));
        assert_eq!(g.descendants(&id("c1")), HashSet::from([id("c2"), id("c3")]));
    }

    #[test]
    fn diamond_order_respects_both_branches() {
        let mut g = DependencyGraph::new();
        g.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&["y"])).unwrap();
        g.update_cell(&id("c3"), names(&["x"]), names(&["z"])).unwrap();
        g.update_cell(&id("c4"), names(&["y", "z"]), names(&[])).unwrap();

        let order = g.get_execution_order(&id("c1"));
        let pos = |cid: &CellId| order.iter().position(|x| x == cid).unwrap();
        assert!(pos(&id("c1")) < pos(&id("c2")));
        assert!(pos(&id("c1")) < pos(&id("c3")));
        assert!(pos(&id("c2")) < pos(&id("c4")));
        assert!(pos(&id("c3")) < pos(&id("c4")));
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut g = DependencyGraph::new();
        g.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&["y"])).unwrap();

        let before_writer = g.writer_of("x").cloned();
        let result = g.update_cell(&id("c1"), names(&["y"]), names(&["x"]));
        assert!(matches!(result, Err(Error::CycleDetected(_, _))));

        // Rolled back: c1 is still the writer of x, c2 still reads x.
        assert_eq!(g.writer_of("x").cloned(), before_writer);
        assert_eq!(g.reads_of(&id("c2")), Some(&names(&["x"])));
        assert!(g.descendants(&id("c1")).contains(&id("c2")));

        // c2 is unaffected and still executes on its own.
        assert_eq!(g.get_execution_order(&id("c2")), vec![id("c2")]);
    }

    #[test]
    fn repeated_identical_update_is_idempotent() {
        let mut g = DependencyGraph::new();
        g.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&["y"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&["y"])).unwrap();

        assert_eq!(g.get_execution_order(&id("c1")), vec![id("c1"), id("c2")]);
        assert_eq!(g.ancestors(&id("c2")), HashSet::from([id("c1")]));
    }

    #[test]
    fn remove_then_update_matches_fresh_update() {
        let mut fresh = DependencyGraph::new();
        fresh.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();

        let mut removed = DependencyGraph::new();
        removed.update_cell(&id("c1"), names(&[]), names(&["y"])).unwrap();
        removed.remove_cell(&id("c1"));
        removed.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();

        assert_eq!(fresh.writer_of("x"), removed.writer_of("x"));
        assert_eq!(fresh.reads_of(&id("c1")), removed.reads_of(&id("c1")));
        assert_eq!(fresh.writes_of(&id("c1")), removed.writes_of(&id("c1")));
    }

    #[test]
    fn shadowing_redirects_writer() {
        let mut g = DependencyGraph::new();
        g.update_cell(&id("c1"), names(&[]), names(&["x"])).unwrap();
        g.update_cell(&id("c2"), names(&["x"]), names(&[])).unwrap();
        assert_eq!(g.writer_of("x"), Some(&id("c1")));

        // c3 now also writes x; it supersedes c1 as the current writer.
        g.update_cell(&id("c3"), names(&[]), names(&["x"])).unwrap();
        assert_eq!(g.writer_of("x"), Some(&id("c3")));

        // Re-registering c2 should now pick up c3 as its ancestor.
        g.update_cell(&id("c2"), names(&["x"]), names(&[])).unwrap();
        assert!(g.ancestors(&id("c2")).contains(&id("c3")));
    }

    #[test]
    fn self_write_and_read_does_not_self_edge() {
        let mut g = DependencyGraph::new();
        // `x = x + 1` nets to reads=∅, writes={x} per the extractor contract,
        // but even if a caller passed x in both sets the graph must not
        // wire a cell to itself.
        g.update_cell(&id("c1"), names(&["x"]), names(&["x"])).unwrap();
        assert!(!g.descendants(&id("c1")).contains(&id("c1")));
        assert!(!g.ancestors(&id("c1")).contains(&id("c1")));
    }

    #[test]
    fn remove_cell_is_noop_when_absent() {
        let mut g = DependencyGraph::new();
        g.remove_cell(&id("ghost"));
        assert!(!g.contains(&id("ghost")));
    }
}
