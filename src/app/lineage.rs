//! `lineage`: extract lineage from a script and optionally walk the impact
//! of one node.

use tracing::{debug, info};

use super::{
    convert::{convert_direction, resolve_dialect},
    helpers::{create_output_options, load_catalog, read_sql_input},
    types::{CommandOutput, LineageParams}
};
use crate::{
    config::Config,
    error::AppResult,
    lineage::{LineageGraph, LineageNode, build, extract_batch, impact},
    output::{ImpactReport, LineageReport, MermaidView, format_impact, format_lineage},
    parser::parse_batch
};

/// Extracts lineage and renders it, or the impact report when a node is
/// given.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, or the catalog
/// cannot be loaded.
pub fn run_lineage(params: LineageParams, config: Config) -> AppResult<CommandOutput> {
    let dialect = resolve_dialect(params.dialect, config.pipeline.dialect);
    let catalog = params
        .catalog_path
        .as_deref()
        .map(|path| load_catalog(path, dialect))
        .transpose()?;
    let sql = read_sql_input(&params.query)?;
    let statements = parse_batch(&sql, dialect)?;

    let extraction = extract_batch(&statements, catalog.as_ref());
    let graph = build(extraction.edges.clone());
    info!(
        statements = statements.len(),
        edges = graph.edge_count(),
        partial = extraction.partial,
        "lineage built"
    );

    let opts = create_output_options(params.output_format, params.no_color, params.verbose);
    let output = match &params.node {
        Some(name) => {
            let node = resolve_node(&graph, name);
            let max_depth = params.depth.unwrap_or(config.lineage.max_depth);
            let direction = convert_direction(params.direction);
            let report = ImpactReport {
                found:  graph.contains(&node),
                levels: impact(&graph, &node, direction, max_depth),
                node,
                direction,
                max_depth
            };
            format_impact(&report, &opts)?
        }
        None => {
            let report = LineageReport::new(statements.len(), &extraction, &graph);
            let view = if params.tables {
                MermaidView::Tables
            } else {
                MermaidView::Columns(config.lineage.mermaid_max_columns)
            };
            format_lineage(&report, &graph, &opts, view)
        }
    };

    Ok(CommandOutput {
        exit_code: 0,
        output
    })
}

/// `A.B` names a column unless only a table `A.B` (schema-qualified) occurs
/// in the graph.
pub fn resolve_node(graph: &LineageGraph, name: &str) -> LineageNode {
    let parsed = LineageNode::parse(name);
    if graph.contains(&parsed) {
        return parsed;
    }
    let table = LineageNode::table(&name.trim().to_uppercase());
    if graph.contains(&table) {
        debug!(node = %table, "impact node resolved as table");
        return table;
    }
    parsed
}
