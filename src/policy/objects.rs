use compact_str::CompactString;

use super::{PolicyContext, PolicyRule, PolicyViolation, RuleInfo, Severity, column_refs, violation};
use crate::{
    ast::{SourceKind, Statement, StatementBody},
    catalog::{CteOutputs, Visible}
};

/// Every table and column must exist in the catalog. Repairs have to
/// re-derive the SQL from the schema; nothing is guessed.
pub struct UndefinedObject;

impl PolicyRule for UndefinedObject {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL005",
            name:     "Undefined object",
            severity: Severity::Critical,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        let mut found = Vec::new();
        check_node(ctx, ctx.stmt, &CteOutputs::new(), &[], &mut found);

        let info = self.info();
        let mut violations: Vec<PolicyViolation> = found
            .into_iter()
            .map(|object| {
                violation(
                    &info,
                    format!("undefined object: {} '{}'", object.kind, object.name),
                    Some(object.name)
                )
            })
            .collect();
        violations.dedup();
        violations
    }
}

struct Missing {
    kind: &'static str,
    name: String
}

fn check_node(
    ctx: &PolicyContext<'_>,
    node: &Statement,
    ctes: &CteOutputs,
    outer: &[(CompactString, Option<Vec<CompactString>>)],
    found: &mut Vec<Missing>
) {
    let catalog = ctx.catalog;
    let (child_ctes, visible) = catalog.scope_of(node, ctes);

    for source in node.sources() {
        if source.kind == SourceKind::Table && !catalog.contains_table(&source.name) {
            found.push(Missing {
                kind: "table",
                name: source.name.to_string()
            });
        }
    }

    // written columns must exist on the target
    match &node.body {
        StatementBody::Insert(insert) => match catalog.table(&insert.target) {
            None => found.push(Missing {
                kind: "table",
                name: insert.target.to_string()
            }),
            Some(table) => {
                for column in &insert.columns {
                    if !table.has_column(column) {
                        found.push(Missing {
                            kind: "column",
                            name: format!("{}.{}", insert.target, column)
                        });
                    }
                }
            }
        },
        StatementBody::Update(_) | StatementBody::Merge(_) => {
            let target = node.target_tables().first().map(|t| t.to_string()).unwrap_or_default();
            if let Some(table) = catalog.table(&target) {
                for item in super::projected_items(node) {
                    let single = !item.output_name.contains(',');
                    if single && !table.has_column(&item.output_name) {
                        found.push(Missing {
                            kind: "column",
                            name: format!("{}.{}", target, item.output_name)
                        });
                    }
                }
            }
        }
        _ => {}
    }

    let output_names: Vec<&str> = node.output_names().collect();
    for column in column_refs(node) {
        let known = match &column.table {
            Some(table) => qualified_known(ctx, table, &column.column, &visible, outer),
            None => {
                output_names.contains(&column.column.as_str())
                    || declared_anywhere(&column.column, &visible)
                    || declared_anywhere(&column.column, outer)
            }
        };
        if !known {
            found.push(Missing {
                kind: "column",
                name: column.to_string()
            });
        }
    }

    let mut inner_outer = visible;
    inner_outer.extend(outer.iter().cloned());
    for child in &node.nested {
        check_node(ctx, child, &child_ctes, &inner_outer, found);
    }
}

/// `T.C` where `T` is a source in some enclosing scope. Qualifiers that name
/// no source (package calls, sequences) are not judged here.
fn qualified_known(
    ctx: &PolicyContext<'_>,
    table: &str,
    column: &str,
    visible: &Visible,
    outer: &[(CompactString, Option<Vec<CompactString>>)]
) -> bool {
    let scoped = visible
        .iter()
        .chain(outer.iter())
        .find(|(name, _)| name.as_str() == table);
    match scoped {
        Some((_, Some(columns))) => columns.iter().any(|c| c.as_str() == column),
        // open column set or a table already reported as undefined
        Some((_, None)) => true,
        None => ctx
            .catalog
            .table(table)
            .is_none_or(|t| t.has_column(column))
    }
}

fn declared_anywhere(column: &str, sources: &[(CompactString, Option<Vec<CompactString>>)]) -> bool {
    sources.iter().any(|(_, columns)| match columns {
        Some(columns) => columns.iter().any(|c| c.as_str() == column),
        None => true
    })
}
