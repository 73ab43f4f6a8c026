//! Statement tree to lineage edges.

use std::collections::HashSet;

use compact_str::CompactString;
use indexmap::IndexSet;

use super::types::{EdgeKind, LineageEdge, LineageExtraction, LineageNode, RESULT_PREFIX, result_name};
use crate::{
    ast::{
        ColumnRef, ExpressionKind, MergeBranch, ProjectionItem, SelectStatement, Statement,
        StatementBody, StatementId, StatementRole, TableSource
    },
    catalog::{CteOutputs, SchemaCatalog, Visible}
};

/// Output column after wildcard expansion
struct FlatItem {
    output_name: CompactString,
    expression:  String,
    kind:        EdgeKind,
    sources:     Vec<ColumnRef>,
    branch:      Option<MergeBranch>,
    /// Index within its own branch, for positional INSERT mapping
    position:    usize
}

/// Where a node's rows land
struct Sink {
    table:   CompactString,
    /// Explicit INSERT column list, mapped by position
    columns: Option<Vec<CompactString>>
}

pub(super) struct Extractor<'a> {
    catalog:       &'a SchemaCatalog,
    /// Catalog was supplied by the caller; unknown physical columns are dropped
    strict:        bool,
    id:            StatementId,
    intermediates: HashSet<CompactString>,
    edges:         IndexSet<LineageEdge>,
    out:           LineageExtraction
}

impl<'a> Extractor<'a> {
    pub(super) fn new(catalog: &'a SchemaCatalog, strict: bool, root: &Statement) -> Self {
        let intermediates = root
            .descendants()
            .into_iter()
            .filter(|n| matches!(n.role, StatementRole::Cte | StatementRole::Derived))
            .filter_map(|n| n.alias.clone())
            .collect();
        Self {
            catalog,
            strict,
            id: root.id,
            intermediates,
            edges: IndexSet::new(),
            out: LineageExtraction::default()
        }
    }

    pub(super) fn run(mut self, root: &Statement) -> LineageExtraction {
        if let StatementBody::Unknown(unknown) = &root.body {
            self.out
                .note(format!("statement {}: unsupported construct ({})", self.id, unknown.reason));
            return self.out;
        }

        let sink = match self.sink(root) {
            Some(sink) => sink,
            None => Sink {
                table:   result_name(self.id),
                columns: None
            }
        };
        self.node(root, &sink, &CteOutputs::new());

        let has_flow = !root.projection().is_empty()
            || matches!(&root.body, StatementBody::Update(u) if !u.assignments.is_empty());
        if self.edges.is_empty() && !has_flow {
            self.out
                .note(format!("statement {}: no column-level data flow to extract", self.id));
        }
        self.out.edges = self.edges.into_iter().collect();
        self.out
    }

    /// Own output of a node, `None` for a plain SELECT
    fn sink(&self, node: &Statement) -> Option<Sink> {
        match &node.body {
            StatementBody::Insert(insert) => Some(Sink {
                table:   insert.target.clone(),
                columns: (!insert.columns.is_empty()).then(|| insert.columns.clone())
            }),
            StatementBody::Ddl(ddl) if ddl.source.is_some() => ddl.objects.first().map(|t| Sink {
                table:   t.clone(),
                columns: None
            }),
            StatementBody::Update(update) => Some(Sink {
                table:   update.target.clone(),
                columns: None
            }),
            StatementBody::Merge(merge) => Some(Sink {
                table:   merge.target.clone(),
                columns: None
            }),
            StatementBody::Delete(delete) => delete.targets.first().map(|t| Sink {
                table:   t.clone(),
                columns: None
            }),
            _ => None
        }
    }

    fn node(&mut self, node: &Statement, sink: &Sink, ctes: &CteOutputs) {
        let (child_ctes, visible) = self.catalog.scope_of(node, ctes);

        match &node.body {
            StatementBody::Select(select) => self.query(select, &visible, sink),
            StatementBody::Insert(insert) => {
                if let Some(source) = &insert.source {
                    self.query(source, &visible, sink);
                }
            }
            StatementBody::Ddl(ddl) => {
                if let Some(source) = &ddl.source {
                    self.query(source, &visible, sink);
                }
            }
            StatementBody::Update(update) => {
                let items = self.flatten(&update.assignments, &visible);
                self.emit_items(items, sink);
                self.filters(update.filter.as_deref(), &update.filter_columns, &sink.table);
            }
            StatementBody::Delete(delete) => {
                self.filters(delete.filter.as_deref(), &delete.filter_columns, &sink.table);
            }
            StatementBody::Merge(merge) => {
                let (named, positional) = merge.split_projection();
                let items = self.flatten(&named, &visible);
                self.emit_items(items, sink);
                for values in positional {
                    let items = self.flatten(values, &visible);
                    self.positional_insert(items, &sink.table);
                }
                let target = LineageNode::table(&sink.table);
                for column in &merge.on_columns {
                    self.emit(column, target.clone(), EdgeKind::Join, &merge.on_expression, None);
                }
            }
            StatementBody::Unknown(unknown) => {
                self.out.note(format!("nested statement skipped: {}", unknown.reason));
            }
        }

        for child in &node.nested {
            match child.role {
                StatementRole::Cte | StatementRole::Derived => match &child.alias {
                    Some(alias) => {
                        let child_sink = Sink {
                            table:   alias.clone(),
                            columns: None
                        };
                        self.node(child, &child_sink, &child_ctes);
                    }
                    None => self.out.note("derived table without alias skipped")
                },
                StatementRole::Subquery => self.subquery(child, &sink.table, &child_ctes),
                StatementRole::Embedded | StatementRole::Root => {
                    let child_sink = self.sink(child).unwrap_or_else(|| Sink {
                        table:   sink.table.clone(),
                        columns: None
                    });
                    self.node(child, &child_sink, &child_ctes);
                }
            }
        }
    }

    /// A subquery's projected columns already count as sources of the
    /// enclosing expression; only its own predicates are added, as filters
    /// on the enclosing sink.
    fn subquery(&mut self, node: &Statement, sink_table: &str, ctes: &CteOutputs) {
        let (child_ctes, _) = self.catalog.scope_of(node, ctes);
        if let Some(select) = node.as_select() {
            for column in select.join_columns.iter().chain(&select.filter_columns) {
                self.emit(column, LineageNode::table(sink_table), EdgeKind::Filter, &node.sql, None);
            }
        }
        for child in &node.nested {
            self.subquery(child, sink_table, &child_ctes);
        }
    }

    /// Projection, set-operation branches and predicates of a query body
    fn query(&mut self, select: &SelectStatement, visible: &Visible, sink: &Sink) {
        let first = self.flatten(&select.projection, visible);
        let names: Vec<CompactString> = first.iter().map(|i| i.output_name.clone()).collect();

        let mut items = first;
        for branch in &select.set_branches {
            let mut flat = self.flatten(branch, visible);
            if flat.len() != names.len() {
                self.out.note(format!(
                    "set operation branch has {} columns, first branch has {}",
                    flat.len(),
                    names.len()
                ));
            }
            flat.truncate(names.len());
            for (item, name) in flat.iter_mut().zip(&names) {
                item.output_name = name.clone();
            }
            items.extend(flat);
        }
        self.emit_items(items, sink);

        let target = LineageNode::table(&sink.table);
        for column in &select.join_columns {
            let condition = join_condition(&select.sources, column);
            self.emit(column, target.clone(), EdgeKind::Join, &condition, None);
        }
        self.filters(select.filter.as_deref(), &select.filter_columns, &sink.table);
    }

    fn filters(&mut self, filter: Option<&str>, columns: &IndexSet<ColumnRef>, sink_table: &str) {
        let Some(filter) = filter else {
            return;
        };
        let target = LineageNode::table(sink_table);
        for column in columns {
            self.emit(column, target.clone(), EdgeKind::Filter, filter, None);
        }
    }

    fn emit_items(&mut self, items: Vec<FlatItem>, sink: &Sink) {
        for item in items {
            let column = match &sink.columns {
                Some(columns) => match columns.get(item.position) {
                    Some(column) => column.clone(),
                    None => {
                        self.out.note(format!(
                            "{}: more values than target columns, '{}' not mapped",
                            sink.table, item.expression
                        ));
                        continue;
                    }
                },
                None => item.output_name.clone()
            };
            if self.strict
                && !self.is_intermediate(&sink.table)
                && !sink.table.starts_with(RESULT_PREFIX)
                && self.catalog.column(&sink.table, &column).is_none()
            {
                self.out
                    .note(format!("target column {}.{} is not in the catalog", sink.table, column));
                continue;
            }
            let target = LineageNode::column(&sink.table, &column);
            for source in &item.sources {
                self.emit(source, target.clone(), item.kind, &item.expression, item.branch);
            }
        }
    }

    /// INSERT values without a column list land on the target's catalog
    /// columns in declaration order
    fn positional_insert(&mut self, items: Vec<FlatItem>, table: &CompactString) {
        let columns = self
            .catalog
            .table(table)
            .map(|t| t.columns.iter().map(|c| CompactString::from(c.name.as_str())).collect());
        match columns {
            Some(columns) => {
                let sink = Sink {
                    table:   table.clone(),
                    columns: Some(columns)
                };
                self.emit_items(items, &sink);
            }
            None => self.out.note(format!(
                "{}: INSERT without a column list and the catalog has no column order, {} values not mapped",
                table,
                items.len()
            ))
        }
    }

    /// Expand wildcards through `visible` and type every item
    fn flatten(&mut self, items: &[ProjectionItem], visible: &Visible) -> Vec<FlatItem> {
        let mut flat = Vec::with_capacity(items.len());
        for item in items {
            let kind = match item.kind {
                ExpressionKind::Column => EdgeKind::DirectCopy,
                ExpressionKind::Scalar => EdgeKind::Transform,
                ExpressionKind::Aggregate => EdgeKind::Aggregate,
                ExpressionKind::Literal => EdgeKind::Transform,
                ExpressionKind::Wildcard => {
                    self.expand_wildcard(item, visible, &mut flat);
                    continue;
                }
            };
            flat.push(FlatItem {
                output_name: item.output_name.clone(),
                expression: item.source_expression.clone(),
                kind,
                sources: item.source_columns.iter().cloned().collect(),
                branch: item.branch,
                position: flat.len()
            });
        }
        flat
    }

    fn expand_wildcard(&mut self, item: &ProjectionItem, visible: &Visible, flat: &mut Vec<FlatItem>) {
        let selected = visible
            .iter()
            .filter(|(name, _)| item.wildcard_table.as_ref().is_none_or(|t| t == name));
        for (table, columns) in selected {
            let Some(columns) = columns else {
                self.out.note(format!(
                    "wildcard '{}' over {} not expanded: column list unknown",
                    item.source_expression, table
                ));
                continue;
            };
            for column in columns {
                flat.push(FlatItem {
                    output_name: column.clone(),
                    expression:  item.source_expression.clone(),
                    kind:        EdgeKind::DirectCopy,
                    sources:     vec![ColumnRef::new(Some(table), column)],
                    branch:      item.branch,
                    position:    flat.len()
                });
            }
        }
    }

    fn emit(
        &mut self,
        source: &ColumnRef,
        target: LineageNode,
        kind: EdgeKind,
        expression: &str,
        branch: Option<MergeBranch>
    ) {
        let Some(table) = &source.table else {
            self.out
                .note(format!("column '{}' could not be attributed to a table", source.column));
            return;
        };
        if self.strict
            && !self.is_intermediate(table)
            && self.catalog.column(table, &source.column).is_none()
        {
            self.out.note(format!("source column {} is not in the catalog", source));
            return;
        }
        let edge = LineageEdge {
            source: LineageNode::column(table, &source.column),
            target,
            kind,
            expression: expression.to_string(),
            producing_statement_id: self.id,
            branch
        };
        self.edges.insert(edge);
    }

    fn is_intermediate(&self, name: &str) -> bool {
        self.intermediates.contains(name)
    }
}

/// Join condition text that mentions `column`, falling back to the column
fn join_condition(sources: &[TableSource], column: &ColumnRef) -> String {
    let owned = sources
        .iter()
        .filter(|s| column.table.as_deref() == Some(s.name.as_str()))
        .find_map(|s| s.condition.clone());
    owned
        .or_else(|| {
            sources
                .iter()
                .filter_map(|s| s.condition.as_deref())
                .find(|c| c.to_uppercase().contains(column.column.as_str()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| column.to_string())
}
