use colored::Colorize;
use serde::Serialize;

use crate::{
    error::{AppResult, config_error},
    lineage::{
        ImpactDirection, LineageEdge, LineageExtraction, LineageGraph, LineageNode,
        column_flowchart, table_flowchart
    },
    pipeline::{AttemptOutcome, PipelineAttempt, PipelineRun},
    policy::{PolicyViolation, Severity}
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
    /// Lineage only
    Mermaid
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Which Mermaid flowchart a lineage report renders as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MermaidView {
    /// Column nodes, at most this many per table
    Columns(usize),
    Tables
}

/// Lineage of a script, for serialization
#[derive(Debug, Serialize)]
pub struct LineageReport {
    pub statements: usize,
    pub partial:    bool,
    pub notes:      Vec<String>,
    pub nodes:      Vec<LineageNode>,
    pub edges:      Vec<LineageEdge>
}

impl LineageReport {
    pub fn new(statements: usize, extraction: &LineageExtraction, graph: &LineageGraph) -> Self {
        let export = graph.export();
        Self {
            statements,
            partial: extraction.partial,
            notes: extraction.notes.clone(),
            nodes: export.nodes,
            edges: export.edges
        }
    }
}

/// Impact analysis result, for serialization
#[derive(Debug, Serialize)]
pub struct ImpactReport {
    pub node:      LineageNode,
    pub direction: ImpactDirection,
    pub max_depth: usize,
    /// Whether the node occurs in the graph at all
    pub found:     bool,
    /// Nodes per depth level, nearest first
    pub levels:    Vec<Vec<LineageNode>>
}

fn paint(text: &str, opts: &OutputOptions, style: fn(&str) -> colored::ColoredString) -> String {
    if opts.colored {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

/// Format a pipeline run based on output options
pub fn format_run(run: &PipelineRun, opts: &OutputOptions) -> AppResult<String> {
    match opts.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(run).unwrap_or_default()),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(run).unwrap_or_default()),
        OutputFormat::Text => Ok(format_run_text(run, opts)),
        OutputFormat::Mermaid => Err(config_error("Mermaid output is only available for lineage"))
    }
}

fn format_run_text(run: &PipelineRun, opts: &OutputOptions) -> String {
    let mut output = paint("=== SQL Policy Gate ===", opts, |s| s.bold());
    output.push_str("\n\n");

    for attempt in &run.attempts {
        format_attempt(attempt, opts, &mut output);
    }

    let summary = match (&run.accepted, run.outcome()) {
        (Some(accepted), _) => {
            let line = format!(
                "ACCEPTED ({}) after {} attempt(s)",
                accepted.kind(),
                run.attempt_count()
            );
            let mut text = paint(&line, opts, |s| s.green().bold());
            text.push('\n');
            text.push_str(accepted.sql());
            text
        }
        (None, Some(AttemptOutcome::Exhausted)) => paint(
            &format!("REJECTED: retry budget exhausted after {} attempt(s)", run.attempt_count()),
            opts,
            |s| s.red().bold()
        ),
        (None, _) => paint("REJECTED: no candidate was judged", opts, |s| s.red().bold())
    };
    output.push_str(&summary);
    output.push('\n');
    output
}

fn format_attempt(attempt: &PipelineAttempt, opts: &OutputOptions, output: &mut String) {
    let header = format!(
        "Attempt #{} ({}): {}",
        attempt.attempt_index + 1,
        attempt.statement_kind,
        attempt.outcome
    );
    output.push_str(&paint(&header, opts, |s| s.cyan().bold()));
    output.push('\n');

    if opts.verbose || attempt.violations.iter().any(PolicyViolation::is_critical) {
        output.push_str(&format!("  {}\n", attempt.candidate_sql.trim()));
    }
    for violation in &attempt.violations {
        let line = format!("  {}", violation);
        let line = match violation.severity {
            Severity::Critical => paint(&line, opts, |s| s.red()),
            Severity::Warning => paint(&line, opts, |s| s.yellow())
        };
        output.push_str(&line);
        output.push('\n');
    }
    if let Some(rewritten) = &attempt.rewritten_sql {
        output.push_str(&format!("  Row limit added: {}\n", rewritten));
    }
    output.push('\n');
}

/// Format extracted lineage
pub fn format_lineage(
    report: &LineageReport,
    graph: &LineageGraph,
    opts: &OutputOptions,
    view: MermaidView
) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Mermaid => match view {
            MermaidView::Columns(max) => column_flowchart(graph, max),
            MermaidView::Tables => table_flowchart(graph)
        },
        OutputFormat::Text => format_lineage_text(report, opts)
    }
}

fn format_lineage_text(report: &LineageReport, opts: &OutputOptions) -> String {
    let mut output = paint("=== Lineage ===", opts, |s| s.bold());
    output.push_str("\n\n");

    if report.edges.is_empty() {
        output.push_str("No lineage edges\n");
    }
    for edge in &report.edges {
        output.push_str(&format!("  {}", edge));
        if opts.verbose {
            output.push_str(&format!("  <- {}", edge.expression));
        }
        output.push('\n');
    }

    if report.partial {
        output.push('\n');
        output.push_str(&paint("Partial lineage:", opts, |s| s.yellow().bold()));
        output.push('\n');
        for note in &report.notes {
            output.push_str(&format!("  - {}\n", note));
        }
    }

    output.push_str(&format!(
        "\n{} statement(s), {} node(s), {} edge(s)\n",
        report.statements,
        report.nodes.len(),
        report.edges.len()
    ));
    output
}

/// Format an impact analysis result
pub fn format_impact(report: &ImpactReport, opts: &OutputOptions) -> AppResult<String> {
    match opts.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report).unwrap_or_default()),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report).unwrap_or_default()),
        OutputFormat::Mermaid => {
            Err(config_error("Mermaid output is not available for impact analysis"))
        }
        OutputFormat::Text => Ok(format_impact_text(report, opts))
    }
}

fn format_impact_text(report: &ImpactReport, opts: &OutputOptions) -> String {
    let direction = match report.direction {
        ImpactDirection::Forward => "downstream of",
        ImpactDirection::Backward => "upstream of"
    };
    let header = format!("Nodes {} {} (depth {})", direction, report.node, report.max_depth);
    let mut output = paint(&header, opts, |s| s.bold());
    output.push('\n');

    if !report.found {
        output.push_str(&format!("  {} does not occur in the lineage graph\n", report.node));
        return output;
    }
    if report.levels.is_empty() {
        output.push_str("  none\n");
    }
    for (depth, level) in report.levels.iter().enumerate() {
        let names: Vec<String> = level.iter().map(ToString::to_string).collect();
        output.push_str(&format!("  {}: {}\n", depth + 1, names.join(", ")));
    }
    output
}
