//! Mermaid flowchart rendering.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    graph::LineageGraph,
    types::{EdgeKind, LineageNode, NodeType}
};

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;").replace('\n', " ")
}

/// Column-level flowchart with one subgraph per table.
///
/// Tables with more than `max_columns` column nodes show the first ones
/// and a summary node for the rest.
pub fn column_flowchart(graph: &LineageGraph, max_columns: usize) -> String {
    let mut lines = vec![String::from("flowchart LR")];
    let mut shown = BTreeSet::new();

    for (table, columns) in graph.columns_by_table() {
        let table_id = sanitize_id(&format!("t_{}", table));
        lines.push(format!("    subgraph {}[\"{}\"]", table_id, escape_label(&table)));
        for node in columns.iter().take(max_columns) {
            let id = sanitize_id(&format!("c_{}", node.qualified_name));
            let label = node.column_name().unwrap_or(&node.qualified_name);
            lines.push(format!("        {}[\"{}\"]", id, escape_label(label)));
            shown.insert(node.qualified_name.to_string());
        }
        if columns.len() > max_columns {
            lines.push(format!(
                "        {}_more[\"... {} more\"]",
                table_id,
                columns.len() - max_columns
            ));
        }
        lines.push(String::from("    end"));
    }

    let mut seen = BTreeSet::new();
    for edge in graph.edges() {
        let (Some(source_id), Some(target_id)) =
            (node_id(&edge.source, &shown), node_id(&edge.target, &shown))
        else {
            continue;
        };
        let arrow = match edge.kind {
            EdgeKind::Join | EdgeKind::Filter => "-.->",
            _ => "-->"
        };
        let line = format!("    {} {}|{}| {}", source_id, arrow, edge.kind, target_id);
        if seen.insert(line.clone()) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Table nodes (join and filter sinks) point at their subgraph; columns
/// hidden by the per-table cap have no id
fn node_id(node: &LineageNode, shown: &BTreeSet<String>) -> Option<String> {
    match node.node_type {
        NodeType::Table => Some(sanitize_id(&format!("t_{}", node.qualified_name))),
        NodeType::Column if shown.contains(node.qualified_name.as_str()) => {
            Some(sanitize_id(&format!("c_{}", node.qualified_name)))
        }
        NodeType::Column => None
    }
}

/// Table-level flowchart; edge labels list the edge kinds between tables.
pub fn table_flowchart(graph: &LineageGraph) -> String {
    let mut lines = vec![String::from("flowchart LR")];
    let mut kinds: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
    for edge in graph.edges() {
        let source = edge.source.table_name().to_string();
        let target = edge.target.table_name().to_string();
        if source != target {
            kinds
                .entry((source, target))
                .or_default()
                .insert(edge.kind.to_string());
        }
    }

    let tables: BTreeSet<&String> = kinds.keys().flat_map(|(s, t)| [s, t]).collect();
    for table in tables {
        lines.push(format!("    {}[\"{}\"]", sanitize_id(table), escape_label(table)));
    }
    for ((source, target), labels) in &kinds {
        let label = labels.iter().cloned().collect::<Vec<_>>().join(", ");
        lines.push(format!("    {} -->|{}| {}", sanitize_id(source), label, sanitize_id(target)));
    }
    lines.join("\n")
}
