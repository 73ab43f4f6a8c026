//! Lineage graph and impact traversal.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef
};
use serde::Serialize;
use tracing::debug;

use super::types::{ImpactDirection, LineageEdge, LineageNode, NodeType};
use crate::ast::{MergeBranch, StatementId};

/// Identity of an edge. Edges of different statements or MERGE branches are
/// kept apart so any one statement's graph can be recovered exactly.
type EdgeKey = (LineageNode, LineageNode, String, StatementId, Option<MergeBranch>);

fn edge_key(edge: &LineageEdge) -> EdgeKey {
    (
        edge.source.clone(),
        edge.target.clone(),
        edge.expression.clone(),
        edge.producing_statement_id,
        edge.branch
    )
}

/// Directed multigraph of lineage nodes.
///
/// Adjacency in both directions comes from the underlying `petgraph`
/// graph; `node_map` turns a node into its index in O(1).
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    graph:    DiGraph<LineageNode, LineageEdge>,
    node_map: HashMap<LineageNode, NodeIndex>,
    keys:     HashSet<EdgeKey>
}

/// Plain node/edge list for consumers that render or persist the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageExport {
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, node: &LineageNode) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_map.insert(node.clone(), idx);
        idx
    }

    /// Insert `edge` unless an identical one is present. Returns whether it
    /// was added.
    pub fn add_edge(&mut self, edge: LineageEdge) -> bool {
        if !self.keys.insert(edge_key(&edge)) {
            return false;
        }
        let from = self.add_node(&edge.source);
        let to = self.add_node(&edge.target);
        self.graph.add_edge(from, to, edge);
        true
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, node: &LineageNode) -> bool {
        self.node_map.contains_key(node)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &LineageNode> {
        self.graph.node_weights()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &LineageEdge> {
        self.graph.edge_weights()
    }

    /// Edges as a set, for order-independent comparison
    pub fn edge_set(&self) -> HashSet<&LineageEdge> {
        self.edges().collect()
    }

    /// Direct neighbors of `node`, sorted by name
    pub fn neighbors(&self, node: &LineageNode, direction: ImpactDirection) -> Vec<&LineageNode> {
        let Some(&idx) = self.node_map.get(node) else {
            return Vec::new();
        };
        let found: BTreeSet<&LineageNode> = self
            .graph
            .edges_directed(idx, direction.into())
            .map(|edge| match direction {
                ImpactDirection::Forward => &self.graph[edge.target()],
                ImpactDirection::Backward => &self.graph[edge.source()]
            })
            .collect();
        found.into_iter().collect()
    }

    /// Rebuild the graph from the edges produced by one statement
    pub fn filter_statement(&self, id: StatementId) -> LineageGraph {
        build(
            self.edges()
                .filter(|edge| edge.producing_statement_id == id)
                .cloned()
                .collect()
        )
    }

    /// Table-level view: one edge per (source table, target table) pair
    pub fn table_edges(&self) -> Vec<(String, String)> {
        let pairs: BTreeSet<(String, String)> = self
            .edges()
            .map(|edge| (edge.source.table_name().to_string(), edge.target.table_name().to_string()))
            .filter(|(source, target)| source != target)
            .collect();
        pairs.into_iter().collect()
    }

    pub fn export(&self) -> LineageExport {
        LineageExport {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().cloned().collect()
        }
    }

    /// Column nodes grouped under their table, tables in name order
    pub fn columns_by_table(&self) -> Vec<(String, Vec<&LineageNode>)> {
        let mut tables: Vec<(String, Vec<&LineageNode>)> = Vec::new();
        let mut nodes: Vec<&LineageNode> = self
            .nodes()
            .filter(|n| n.node_type == NodeType::Column)
            .collect();
        nodes.sort();
        for node in nodes {
            let table = node.table_name();
            match tables.iter_mut().find(|(name, _)| name == table) {
                Some((_, columns)) => columns.push(node),
                None => tables.push((table.to_string(), vec![node]))
            }
        }
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        tables
    }
}

/// Build a graph from edges, dropping duplicates.
pub fn build(edges: Vec<LineageEdge>) -> LineageGraph {
    let mut graph = LineageGraph::new();
    let total = edges.len();
    for edge in edges {
        graph.add_edge(edge);
    }
    debug!(
        edges = graph.edge_count(),
        duplicates = total - graph.edge_count(),
        nodes = graph.node_count(),
        "lineage graph built"
    );
    graph
}

/// Breadth-first impact analysis.
///
/// Returns one list per depth level, nearest first, each sorted by name.
/// Stops at `max_depth` or when a level finds no unvisited node; cycles
/// terminate because every node is visited at most once. An unknown start
/// node yields no levels.
pub fn impact(
    graph: &LineageGraph,
    node: &LineageNode,
    direction: ImpactDirection,
    max_depth: usize
) -> Vec<Vec<LineageNode>> {
    let mut levels = Vec::new();
    if !graph.contains(node) {
        return levels;
    }

    let mut visited: HashSet<&LineageNode> = HashSet::new();
    visited.insert(node);
    let mut frontier: Vec<&LineageNode> = vec![node];

    for _ in 0..max_depth {
        let mut next: BTreeSet<&LineageNode> = BTreeSet::new();
        for current in &frontier {
            for neighbor in graph.neighbors(current, direction) {
                if !visited.contains(neighbor) {
                    next.insert(neighbor);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        visited.extend(next.iter().copied());
        frontier = next.into_iter().collect();
        levels.push(frontier.iter().map(|n| (*n).clone()).collect());
    }
    levels
}
