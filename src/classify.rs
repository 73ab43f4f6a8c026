//! Statement-kind verdict over a whole statement tree.
//!
//! Every nested node is visited and the most privileged kind wins, so a
//! SELECT wrapping a data-modifying CTE or an embedded DML body is never
//! classified as a plain read.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{NodeKind, Statement, StatementVisitor, VisitContext, walk};

/// Privilege level of a statement, ordered from least to most restrictive.
///
/// `Unknown` sorts last: a node the parser could not type poisons the whole
/// verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Dml,
    Ddl,
    Unknown
}

impl StatementKind {
    pub fn is_read_only(self) -> bool {
        self == Self::Select
    }
}

impl From<NodeKind> for StatementKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Select => Self::Select,
            NodeKind::Insert | NodeKind::Update | NodeKind::Delete | NodeKind::Merge => Self::Dml,
            NodeKind::Ddl => Self::Ddl,
            NodeKind::Unknown => Self::Unknown
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Dml => write!(f, "DML"),
            Self::Ddl => write!(f, "DDL"),
            Self::Unknown => write!(f, "UNKNOWN")
        }
    }
}

struct PrivilegeVisitor {
    kind:  StatementKind,
    depth: usize
}

impl<'a> StatementVisitor<'a> for PrivilegeVisitor {
    fn visit(&mut self, stmt: &'a Statement, ctx: VisitContext<'a>) {
        let kind = StatementKind::from(stmt.node_kind());
        if kind > self.kind {
            self.kind = kind;
            self.depth = ctx.depth;
        }
    }
}

/// Classify `stmt` by the most privileged node anywhere in its tree
pub fn classify(stmt: &Statement) -> StatementKind {
    let mut visitor = PrivilegeVisitor {
        kind:  StatementKind::Select,
        depth: 0
    };
    walk(stmt, &mut visitor);
    debug!(kind = %visitor.kind, depth = visitor.depth, "classified statement");
    visitor.kind
}
