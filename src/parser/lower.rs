//! Lowering of `sqlparser` trees into [`crate::ast`] nodes.
//!
//! Each query gets a [`Scope`] mapping aliases to canonical source names so
//! that column references come out attributed to a table. CTE bodies,
//! derived tables and expression subqueries become nested [`Statement`]s.

mod dml;
mod expr;
mod set_expr;
mod table;

use std::cell::Cell;

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use sqlparser::ast::{self as sql, Query, SetExpr};

use super::{canonical_name, raw_relations};
use crate::ast::{
    ColumnRef, SelectStatement, Statement, StatementBody, StatementId, StatementRole, TableSource
};

/// Names visible while lowering one query
#[derive(Debug, Clone, Default)]
pub(crate) struct Env {
    pub ctes:  IndexSet<CompactString>,
    /// Aliases of enclosing queries, for correlated references
    pub outer: IndexMap<CompactString, CompactString>
}

/// Sources of one SELECT/UPDATE/DELETE/MERGE and the names they answer to
#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub sources: Vec<TableSource>,
    names:       IndexMap<CompactString, CompactString>,
    outer:       IndexMap<CompactString, CompactString>
}

impl Scope {
    pub fn new(env: &Env) -> Self {
        Self {
            sources: Vec::new(),
            names:   IndexMap::new(),
            outer:   env.outer.clone()
        }
    }

    pub fn add(&mut self, source: TableSource) {
        if let Some(alias) = &source.alias {
            self.names.insert(alias.clone(), source.name.clone());
        }
        self.names
            .entry(source.name.clone())
            .or_insert_with(|| source.name.clone());
        if let Some((_, bare)) = source.name.rsplit_once('.') {
            self.names
                .entry(bare.into())
                .or_insert_with(|| source.name.clone());
        }
        self.sources.push(source);
    }

    /// Canonical source name for a qualifier, falling back to enclosing scopes
    pub fn resolve_table(&self, qualifier: &str) -> CompactString {
        let key = canonical_name(qualifier);
        self.names
            .get(&key)
            .or_else(|| self.outer.get(&key))
            .cloned()
            .unwrap_or(key)
    }

    /// Attribute a column reference. Unqualified references bind only when
    /// exactly one source is in scope.
    pub fn resolve(&self, qualifier: Option<&str>, column: &str) -> ColumnRef {
        let table = match qualifier {
            Some(q) => Some(self.resolve_table(q)),
            None => match self.sources.as_slice() {
                [only] => Some(only.name.clone()),
                _ => None
            }
        };
        ColumnRef {
            table,
            column: column.into()
        }
    }

    /// Environment for a subquery correlated with this scope
    pub fn child_env(&self, env: &Env) -> Env {
        let mut outer = self.outer.clone();
        for (alias, name) in &self.names {
            outer.insert(alias.clone(), name.clone());
        }
        Env {
            ctes: env.ctes.clone(),
            outer
        }
    }
}

pub(crate) struct Lowerer {
    id:          StatementId,
    derived_seq: Cell<u32>
}

impl Lowerer {
    pub fn new(id: StatementId) -> Self {
        Self {
            id,
            derived_seq: Cell::new(0)
        }
    }

    /// Lower a top-level statement and make sure no relation `sqlparser`
    /// knows about is missing from `referenced_tables`.
    pub fn lower_root(&self, stmt: &sql::Statement) -> Statement {
        let mut root = self.lower_statement(stmt, StatementRole::Root, None, &Env::default());

        let cte_names: IndexSet<CompactString> = root
            .descendants()
            .into_iter()
            .filter(|n| n.role == StatementRole::Cte)
            .filter_map(|n| n.alias.clone())
            .collect();
        for relation in raw_relations(stmt) {
            if !cte_names.contains(&relation) {
                root.referenced_tables.insert(relation);
            }
        }
        root
    }

    pub(super) fn lower_statement(
        &self,
        stmt: &sql::Statement,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        match stmt {
            sql::Statement::Query(query) => self.lower_query(query, role, alias, env),
            sql::Statement::Insert(insert) => self.lower_insert(stmt, insert, role, alias, env),
            sql::Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => self.lower_update(
                stmt,
                dml::UpdateParts {
                    table,
                    assignments,
                    from: from.as_ref(),
                    selection: selection.as_ref()
                },
                role,
                alias,
                env
            ),
            sql::Statement::Delete(delete) => self.lower_delete(stmt, delete, role, alias, env),
            sql::Statement::Merge {
                table,
                source,
                on,
                clauses,
                ..
            } => self.lower_merge(
                stmt,
                dml::MergeParts {
                    table,
                    source,
                    on,
                    clauses
                },
                role,
                alias,
                env
            ),
            other => self.lower_other(other, role, alias, env)
        }
    }

    pub(super) fn lower_query(
        &self,
        query: &Query,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let mut env = env.clone();
        let mut nested = Vec::new();

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let name = ident_upper(&cte.alias.name);
                if with.recursive {
                    env.ctes.insert(name.clone());
                }
                nested.push(self.lower_query(
                    &cte.query,
                    StatementRole::Cte,
                    Some(name.clone()),
                    &env
                ));
                env.ctes.insert(name);
            }
        }

        match query.body.as_ref() {
            SetExpr::Insert(inner)
            | SetExpr::Update(inner)
            | SetExpr::Delete(inner)
            | SetExpr::Merge(inner) => {
                let mut stmt = self.lower_statement(inner, role, alias, &env);
                for cte in nested.into_iter().rev() {
                    stmt.referenced_tables
                        .extend(cte.referenced_tables.iter().cloned());
                    stmt.nested.insert(0, cte);
                }
                stmt
            }
            body => {
                let mut select = self.lower_set_expr(body, &env, &mut nested);
                if let Some(limit) = expr::query_row_limit(query) {
                    select.row_limit = Some(limit);
                }
                self.finish(
                    role,
                    alias,
                    query.to_string(),
                    StatementBody::Select(select),
                    nested
                )
            }
        }
    }

    /// Lower a query whose SELECT body is absorbed by the caller (INSERT
    /// source, CTAS, parenthesized set operand). Data-modifying bodies are
    /// kept as embedded nodes instead.
    pub(super) fn lower_inline_query(
        &self,
        query: &Query,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> Option<SelectStatement> {
        let node = self.lower_query(query, StatementRole::Root, None, env);
        match node.body {
            StatementBody::Select(select) => {
                nested.extend(node.nested);
                Some(select)
            }
            body => {
                nested.push(Statement {
                    role: StatementRole::Embedded,
                    body,
                    ..node
                });
                None
            }
        }
    }

    fn next_derived_name(&self) -> CompactString {
        let seq = self.derived_seq.get() + 1;
        self.derived_seq.set(seq);
        compact_str::format_compact!("DERIVED_{}", seq)
    }

    /// Assemble a node; `referenced_tables` collects physical sources,
    /// DML targets and everything nested.
    pub(super) fn finish(
        &self,
        role: StatementRole,
        alias: Option<CompactString>,
        sql: String,
        body: StatementBody,
        nested: Vec<Statement>
    ) -> Statement {
        let mut stmt = Statement {
            id: self.id,
            role,
            alias,
            sql,
            body,
            referenced_tables: IndexSet::new(),
            nested,
            dialect_literals: Vec::new()
        };

        let mut referenced = IndexSet::new();
        if !matches!(stmt.body, StatementBody::Ddl(_)) {
            for target in stmt.target_tables() {
                referenced.insert(CompactString::from(target));
            }
        }
        for source in stmt.sources() {
            if source.is_physical() {
                referenced.insert(source.name.clone());
            }
        }
        for child in &stmt.nested {
            referenced.extend(child.referenced_tables.iter().cloned());
        }
        stmt.referenced_tables = referenced;
        stmt
    }
}

pub(crate) fn ident_upper(ident: &sql::Ident) -> CompactString {
    ident.value.to_uppercase().into()
}

/// Last segment of a possibly qualified column name
pub(crate) fn column_name(raw: &str) -> CompactString {
    let canonical = canonical_name(raw);
    match canonical.rsplit_once('.') {
        Some((_, last)) => last.into(),
        None => canonical
    }
}
