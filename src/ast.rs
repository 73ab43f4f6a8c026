//! Dialect-neutral statement tree produced by [`crate::parser`].
//!
//! The tree is a sum type over statement kinds. Every node carries the tables
//! it references (its own plus those of all nested sub-statements), so callers
//! that only care about "what does this touch" never have to walk it.

mod visit;

use std::{fmt, ops::Range};

use compact_str::CompactString;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
pub use visit::{StatementVisitor, VisitContext, walk};

/// Identifier of a top-level statement within one parsed batch (1-based).
/// Nested sub-statements carry the id of their root.
pub type StatementId = u32;

/// Ordered set of function names used by an expression
pub type FunctionList = SmallVec<[CompactString; 4]>;

/// SQL dialect accepted by the parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Oracle,
    Maria,
    Postgres
}

impl SqlDialect {
    /// Row-limit clause this dialect expects, used in prompts and rewrites
    pub fn limit_syntax(self) -> LimitSyntax {
        match self {
            Self::Oracle => LimitSyntax::FetchFirst,
            Self::Maria | Self::Postgres => LimitSyntax::Limit
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Maria => "maria",
            Self::Postgres => "postgres"
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oracle" => Ok(Self::Oracle),
            "maria" | "mariadb" | "mysql" => Ok(Self::Maria),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(format!("unknown SQL dialect '{}'", other))
        }
    }
}

/// Reference to a column, with the table it was resolved to when known.
///
/// `table` is the canonical (upper-case) name of a physical table, CTE or
/// derived-table alias. `None` means the reference could not be attributed
/// to a single source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table:  Option<CompactString>,
    pub column: CompactString
}

impl ColumnRef {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table:  table.map(CompactString::from),
            column: column.into()
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.table.is_some()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column)
        }
    }
}

/// Shape of a projection expression, used to type lineage edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    /// Bare column reference
    Column,
    /// Scalar expression over one or more columns
    Scalar,
    /// Expression containing an aggregate function
    Aggregate,
    /// Constant or pseudo-column; no source columns
    Literal,
    /// `*` or `t.*`
    Wildcard
}

/// MERGE action path an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeBranch {
    Matched,
    NotMatched,
    /// Target rows the source has no match for
    NotMatchedBySource
}

impl fmt::Display for MergeBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => f.write_str("WHEN MATCHED"),
            Self::NotMatched => f.write_str("WHEN NOT MATCHED"),
            Self::NotMatchedBySource => f.write_str("WHEN NOT MATCHED BY SOURCE")
        }
    }
}

/// One output column of a SELECT, INSERT source, MERGE action or assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub output_name:       CompactString,
    /// Literal source text of the expression
    pub source_expression: String,
    pub source_columns:    IndexSet<ColumnRef>,
    pub kind:              ExpressionKind,
    /// Normalized function names appearing in the expression
    pub functions:         FunctionList,
    /// Qualifier of a `t.*` wildcard, resolved to its table
    pub wildcard_table:    Option<CompactString>,
    pub branch:            Option<MergeBranch>
}

impl ProjectionItem {
    pub fn is_wildcard(&self) -> bool {
        self.kind == ExpressionKind::Wildcard
    }
}

/// Dialect-specific row-limiting syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSyntax {
    Limit,
    FetchFirst,
    Rownum,
    Top
}

/// Row-limiting clause normalized across dialects.
///
/// `rows` is `None` when the limit is not a numeric literal (a bind
/// parameter or expression).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLimit {
    pub rows:   Option<u64>,
    pub syntax: LimitSyntax
}

/// How a source enters the FROM clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    From,
    Join,
    /// Target of UPDATE/DELETE/MERGE
    Target,
    /// `USING` source of a MERGE
    MergeSource
}

/// What a source name points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Table,
    Cte,
    Derived
}

/// Relation visible in a statement's scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSource {
    /// Canonical table name, or the alias of a CTE/derived table
    pub name:           CompactString,
    pub alias:          Option<CompactString>,
    pub kind:           SourceKind,
    pub role:           SourceRole,
    /// Literal join condition text, if any
    pub condition:      Option<String>,
    /// `false` for joins that carry neither ON nor USING (and are not
    /// NATURAL or explicit CROSS joins)
    pub has_condition:  bool,
    pub explicit_cross: bool
}

impl TableSource {
    pub fn is_physical(&self) -> bool {
        self.kind == SourceKind::Table
    }
}

/// Body of a SELECT (also the source part of INSERT ... SELECT and CTAS)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub projection:     Vec<ProjectionItem>,
    /// Projections of the 2nd..n set-operation branches
    pub set_branches:   Vec<Vec<ProjectionItem>>,
    pub sources:        Vec<TableSource>,
    pub filter:         Option<String>,
    pub filter_columns: IndexSet<ColumnRef>,
    pub join_columns:   IndexSet<ColumnRef>,
    pub group_columns:  IndexSet<ColumnRef>,
    pub row_limit:      Option<RowLimit>,
    pub distinct:       bool
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub target:  CompactString,
    /// Explicit column list; empty when omitted
    pub columns: Vec<CompactString>,
    /// Rows being inserted, when they come from a query or VALUES list
    pub source:  Option<SelectStatement>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub target:         CompactString,
    /// `SET col = expr` pairs, output name is the assigned column
    pub assignments:    Vec<ProjectionItem>,
    pub sources:        Vec<TableSource>,
    pub filter:         Option<String>,
    pub filter_columns: IndexSet<ColumnRef>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub targets:        Vec<CompactString>,
    pub sources:        Vec<TableSource>,
    pub filter:         Option<String>,
    pub filter_columns: IndexSet<ColumnRef>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStatement {
    pub target:             CompactString,
    pub sources:            Vec<TableSource>,
    pub on_expression:      String,
    pub on_columns:         IndexSet<ColumnRef>,
    /// Update and insert actions, each tagged with its branch
    pub projection:         Vec<ProjectionItem>,
    /// Projection ranges of INSERT actions written without a column list;
    /// their values map onto the target's columns by position
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positional_inserts: Vec<Range<usize>>,
    pub deletes_matched:    bool
}

impl MergeStatement {
    /// Items naming their target column, and the value lists of
    /// INSERT actions without a column list
    pub fn split_projection(&self) -> (Vec<ProjectionItem>, Vec<&[ProjectionItem]>) {
        let mut named = Vec::with_capacity(self.projection.len());
        let mut positional = Vec::with_capacity(self.positional_inserts.len());
        let mut start = 0;
        for range in &self.positional_inserts {
            named.extend_from_slice(&self.projection[start..range.start]);
            positional.push(&self.projection[range.clone()]);
            start = range.end;
        }
        named.extend_from_slice(&self.projection[start..]);
        (named, positional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlStatement {
    /// Leading keywords, e.g. `CREATE TABLE`, `DROP VIEW`
    pub operation: CompactString,
    pub objects:   Vec<CompactString>,
    /// Query feeding `CREATE TABLE ... AS` / `CREATE VIEW ... AS`
    pub source:    Option<SelectStatement>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownStatement {
    pub reason: String
}

/// Kind-specific payload of a [`Statement`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementBody {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Merge(MergeStatement),
    Ddl(DdlStatement),
    Unknown(UnknownStatement)
}

/// Node type tag, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Ddl,
    Unknown
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Merge => "MERGE",
            Self::Ddl => "DDL",
            Self::Unknown => "UNKNOWN"
        };
        f.write_str(name)
    }
}

/// Where a statement sits in its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementRole {
    Root,
    Cte,
    /// Derived table in FROM
    Derived,
    /// Scalar, IN or EXISTS subquery
    Subquery,
    /// Data-modifying statement embedded in a query body
    Embedded
}

/// Dialect-specific fragment kept verbatim because it has no neutral form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectLiteral {
    pub kind: LiteralKind,
    pub text: String
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    /// Optimizer hint comment `/*+ ... */`
    Hint,
    /// Vendor function kept under its own name (`NVL2`, `DECODE`)
    Function,
    /// Vendor pseudo-column (`ROWNUM`, `ROWID`)
    PseudoColumn
}

/// Parsed statement node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id:                StatementId,
    pub role:              StatementRole,
    /// CTE name or derived-table alias
    pub alias:             Option<CompactString>,
    /// Caller's text for a statement from `parse`, rendered by `sqlparser`
    /// for nested and batch statements
    pub sql:               String,
    pub body:              StatementBody,
    /// Physical tables touched by this node and every nested node
    pub referenced_tables: IndexSet<CompactString>,
    pub nested:            Vec<Statement>,
    pub dialect_literals:  Vec<DialectLiteral>
}

impl Statement {
    pub fn node_kind(&self) -> NodeKind {
        match &self.body {
            StatementBody::Select(_) => NodeKind::Select,
            StatementBody::Insert(_) => NodeKind::Insert,
            StatementBody::Update(_) => NodeKind::Update,
            StatementBody::Delete(_) => NodeKind::Delete,
            StatementBody::Merge(_) => NodeKind::Merge,
            StatementBody::Ddl(_) => NodeKind::Ddl,
            StatementBody::Unknown(_) => NodeKind::Unknown
        }
    }

    pub fn as_select(&self) -> Option<&SelectStatement> {
        match &self.body {
            StatementBody::Select(select) => Some(select),
            _ => None
        }
    }

    /// Tables written by this node (empty for SELECT and UNKNOWN)
    pub fn target_tables(&self) -> Vec<&str> {
        match &self.body {
            StatementBody::Insert(insert) => vec![insert.target.as_str()],
            StatementBody::Update(update) => vec![update.target.as_str()],
            StatementBody::Delete(delete) => delete.targets.iter().map(|t| t.as_str()).collect(),
            StatementBody::Merge(merge) => vec![merge.target.as_str()],
            StatementBody::Ddl(ddl) => ddl.objects.iter().map(|t| t.as_str()).collect(),
            StatementBody::Select(_) | StatementBody::Unknown(_) => Vec::new()
        }
    }

    /// Ordered output items for SELECT, INSERT and MERGE nodes.
    /// INSERT and CTAS return the projection of their source query.
    pub fn projection(&self) -> &[ProjectionItem] {
        match &self.body {
            StatementBody::Select(select) => &select.projection,
            StatementBody::Insert(insert) => insert
                .source
                .as_ref()
                .map_or(&[][..], |s| s.projection.as_slice()),
            StatementBody::Merge(merge) => &merge.projection,
            StatementBody::Ddl(ddl) => ddl
                .source
                .as_ref()
                .map_or(&[][..], |s| s.projection.as_slice()),
            StatementBody::Update(_) | StatementBody::Delete(_) | StatementBody::Unknown(_) => &[]
        }
    }

    /// Sources visible in this node's own scope
    pub fn sources(&self) -> &[TableSource] {
        match &self.body {
            StatementBody::Select(select) => &select.sources,
            StatementBody::Insert(insert) => insert
                .source
                .as_ref()
                .map_or(&[][..], |s| s.sources.as_slice()),
            StatementBody::Update(update) => &update.sources,
            StatementBody::Delete(delete) => &delete.sources,
            StatementBody::Merge(merge) => &merge.sources,
            StatementBody::Ddl(ddl) => ddl
                .source
                .as_ref()
                .map_or(&[][..], |s| s.sources.as_slice()),
            StatementBody::Unknown(_) => &[]
        }
    }

    /// Output column names, used to resolve references to CTEs and derived tables
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.projection()
            .iter()
            .filter(|item| !item.is_wildcard())
            .map(|item| item.output_name.as_str())
    }

    /// Find a nested CTE or derived table by alias (direct children only)
    pub fn nested_by_alias(&self, alias: &str) -> Option<&Statement> {
        self.nested
            .iter()
            .find(|n| n.alias.as_deref() == Some(alias) && n.role != StatementRole::Subquery)
    }

    /// Every node of the tree, depth-first, starting with `self`
    pub fn descendants(&self) -> Vec<&Statement> {
        let mut out = vec![self];
        for child in &self.nested {
            out.extend(child.descendants());
        }
        out
    }
}
