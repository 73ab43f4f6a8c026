//! Lineage nodes, edges and extraction results.

use std::fmt;

use compact_str::{CompactString, format_compact};
use serde::{Deserialize, Serialize};

use crate::ast::{MergeBranch, StatementId};

/// Prefix of the implicit result-set node of a plain SELECT
pub const RESULT_PREFIX: &str = "RESULT#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Table,
    Column
}

/// A table or a column, identified by its qualified name.
///
/// Columns are named `TABLE.COLUMN`; CTEs and derived tables use their
/// alias as table part and a SELECT's result set is `RESULT#<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageNode {
    pub node_type:      NodeType,
    pub qualified_name: CompactString
}

impl LineageNode {
    pub fn table(name: &str) -> Self {
        Self {
            node_type:      NodeType::Table,
            qualified_name: name.into()
        }
    }

    pub fn column(table: &str, column: &str) -> Self {
        Self {
            node_type:      NodeType::Column,
            qualified_name: format_compact!("{}.{}", table, column)
        }
    }

    /// Result-set table node of statement `id`
    pub fn result(id: StatementId) -> Self {
        Self::table(&result_name(id))
    }

    /// Parse `TABLE.COLUMN` into a column node, anything else into a table
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_uppercase();
        match name.rsplit_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Self::column(table, column)
            }
            _ => Self::table(&name)
        }
    }

    /// Table part of a column node, or the table node's own name
    pub fn table_name(&self) -> &str {
        match self.node_type {
            NodeType::Table => &self.qualified_name,
            NodeType::Column => self
                .qualified_name
                .rsplit_once('.')
                .map_or(self.qualified_name.as_str(), |(table, _)| table)
        }
    }

    /// Column part of a column node
    pub fn column_name(&self) -> Option<&str> {
        match self.node_type {
            NodeType::Table => None,
            NodeType::Column => self.qualified_name.rsplit_once('.').map(|(_, column)| column)
        }
    }

    pub fn is_result(&self) -> bool {
        self.table_name().starts_with(RESULT_PREFIX)
    }
}

impl fmt::Display for LineageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

pub(crate) fn result_name(id: StatementId) -> CompactString {
    format_compact!("{}{}", RESULT_PREFIX, id)
}

/// How data moves along an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Bare column reference
    DirectCopy,
    /// Scalar expression
    Transform,
    /// Expression with an aggregate function
    Aggregate,
    /// Column used in a join condition
    Join,
    /// Column used in a WHERE clause or subquery predicate
    Filter
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DirectCopy => "direct_copy",
            Self::Transform => "transform",
            Self::Aggregate => "aggregate",
            Self::Join => "join",
            Self::Filter => "filter"
        };
        f.write_str(name)
    }
}

/// Directed dependency induced by one statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source:                 LineageNode,
    pub target:                 LineageNode,
    pub kind:                   EdgeKind,
    /// Literal source expression, kept for audit
    pub expression:             String,
    pub producing_statement_id: StatementId,
    /// MERGE path that produced the edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch:                 Option<MergeBranch>
}

impl fmt::Display for LineageEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}]", self.source, self.target, self.kind)?;
        if let Some(branch) = self.branch {
            write!(f, " ({})", branch)?;
        }
        Ok(())
    }
}

/// Best-effort extraction result.
///
/// `partial` is set whenever part of the statement could not be turned into
/// edges; `notes` says which part. Nothing is guessed to fill the gap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineageExtraction {
    pub edges:   Vec<LineageEdge>,
    pub partial: bool,
    pub notes:   Vec<String>
}

impl LineageExtraction {
    pub(crate) fn note(&mut self, note: impl Into<String>) {
        self.partial = true;
        self.notes.push(note.into());
    }

    /// Append another extraction, keeping edge order
    pub fn merge(&mut self, other: LineageExtraction) {
        self.edges.extend(other.edges);
        self.partial |= other.partial;
        self.notes.extend(other.notes);
    }
}

/// Traversal direction for impact analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactDirection {
    /// Follow edges source to target: what depends on the node
    Forward,
    /// Follow edges target to source: what the node depends on
    Backward
}

impl From<ImpactDirection> for petgraph::Direction {
    fn from(direction: ImpactDirection) -> Self {
        match direction {
            ImpactDirection::Forward => petgraph::Direction::Outgoing,
            ImpactDirection::Backward => petgraph::Direction::Incoming
        }
    }
}
