use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};

use super::SchemaCatalog;
use crate::ast::{
    ColumnRef, ProjectionItem, SelectStatement, SourceKind, Statement, StatementBody,
    StatementRole
};

/// Source names in scope with the columns they expose. `None` means the
/// column set is open: a table missing from the catalog or a CTE/derived
/// table projecting `*`.
pub(crate) type Visible = Vec<(CompactString, Option<Vec<CompactString>>)>;

/// Output columns of the CTEs defined so far, by name
pub(crate) type CteOutputs = IndexMap<CompactString, Option<Vec<CompactString>>>;

impl SchemaCatalog {
    /// Copy of `stmt` in which unqualified column references are attributed
    /// to the single in-scope source declaring them.
    ///
    /// Physical sources are looked up in the catalog, CTEs and derived
    /// tables by their output names. Ambiguous or unknown references stay
    /// unattributed.
    pub fn resolve_columns(&self, stmt: &Statement) -> Statement {
        let mut resolved = stmt.clone();
        self.resolve_node(&mut resolved, &CteOutputs::new(), &[]);
        resolved
    }

    fn resolve_node(&self, node: &mut Statement, ctes: &CteOutputs, outer: &[(CompactString, Option<Vec<CompactString>>)]) {
        let (ctes, visible) = self.scope_of(node, ctes);

        for_each_column_set(&mut node.body, |set| {
            *set = set
                .iter()
                .map(|column| attribute(column, &visible, outer))
                .collect::<IndexSet<_>>();
        });

        let mut inner_outer = visible;
        inner_outer.extend(outer.iter().cloned());
        for child in &mut node.nested {
            self.resolve_node(child, &ctes, &inner_outer);
        }
    }

    /// CTEs visible to `node`'s children and the sources in `node`'s own scope
    pub(crate) fn scope_of(&self, node: &Statement, ctes: &CteOutputs) -> (CteOutputs, Visible) {
        let mut ctes = ctes.clone();
        for child in &node.nested {
            if child.role == StatementRole::Cte
                && let Some(alias) = &child.alias
            {
                ctes.insert(alias.clone(), output_columns(child));
            }
        }

        let visible = node
            .sources()
            .iter()
            .map(|source| {
                let columns = match source.kind {
                    SourceKind::Table => self.table(&source.name).map(|table| {
                        table
                            .columns
                            .iter()
                            .map(|c| CompactString::from(c.name.as_str()))
                            .collect()
                    }),
                    SourceKind::Cte => ctes.get(&source.name).cloned().flatten(),
                    SourceKind::Derived => node
                        .nested_by_alias(&source.name)
                        .and_then(output_columns)
                };
                (source.name.clone(), columns)
            })
            .collect();
        (ctes, visible)
    }
}

fn output_columns(stmt: &Statement) -> Option<Vec<CompactString>> {
    if stmt.projection().iter().any(ProjectionItem::is_wildcard) {
        return None;
    }
    Some(stmt.output_names().map(CompactString::from).collect())
}

fn attribute(column: &ColumnRef, visible: &Visible, outer: &[(CompactString, Option<Vec<CompactString>>)]) -> ColumnRef {
    if column.is_resolved() {
        return column.clone();
    }
    let owner = match owners(&column.column, visible) {
        Some(found) if found.len() == 1 => found.into_iter().next(),
        Some(found) if found.is_empty() => match owners(&column.column, outer) {
            Some(outer_found) if outer_found.len() == 1 => outer_found.into_iter().next(),
            _ => None
        },
        _ => None
    };
    ColumnRef {
        table:  owner,
        column: column.column.clone()
    }
}

/// Sources declaring `column`; `None` when an open source could also hold it
fn owners(column: &str, sources: &[(CompactString, Option<Vec<CompactString>>)]) -> Option<Vec<CompactString>> {
    let mut found = Vec::new();
    for (name, columns) in sources {
        match columns {
            Some(columns) if columns.iter().any(|c| c.as_str() == column) => found.push(name.clone()),
            Some(_) => {}
            None => return None
        }
    }
    Some(found)
}

fn for_each_column_set(body: &mut StatementBody, mut f: impl FnMut(&mut IndexSet<ColumnRef>)) {
    fn items(items: &mut [ProjectionItem], f: &mut impl FnMut(&mut IndexSet<ColumnRef>)) {
        for item in items {
            f(&mut item.source_columns);
        }
    }

    fn select(select: &mut SelectStatement, f: &mut impl FnMut(&mut IndexSet<ColumnRef>)) {
        items(&mut select.projection, f);
        for branch in &mut select.set_branches {
            items(branch, f);
        }
        f(&mut select.filter_columns);
        f(&mut select.join_columns);
        f(&mut select.group_columns);
    }

    match body {
        StatementBody::Select(s) => select(s, &mut f),
        StatementBody::Insert(insert) => {
            if let Some(source) = &mut insert.source {
                select(source, &mut f);
            }
        }
        StatementBody::Update(update) => {
            items(&mut update.assignments, &mut f);
            f(&mut update.filter_columns);
        }
        StatementBody::Delete(delete) => f(&mut delete.filter_columns),
        StatementBody::Merge(merge) => {
            f(&mut merge.on_columns);
            items(&mut merge.projection, &mut f);
        }
        StatementBody::Ddl(ddl) => {
            if let Some(source) = &mut ddl.source {
                select(source, &mut f);
            }
        }
        StatementBody::Unknown(_) => {}
    }
}
