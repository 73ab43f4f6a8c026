use super::{
    PolicyContext, PolicyRule, PolicyViolation, RuleInfo, Severity, projected_items, violation
};
use crate::ast::{ProjectionItem, Statement};

/// `*` and `t.*` hide which columns leave the database
pub struct ExplicitColumns;

impl PolicyRule for ExplicitColumns {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL002",
            name:     "Explicit columns required",
            severity: Severity::Critical,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        let info = self.info();
        ctx.stmt
            .descendants()
            .into_iter()
            .flat_map(projected_items)
            .filter(|item| item.is_wildcard())
            .map(|item| {
                violation(
                    &info,
                    "explicit columns required: wildcard projection".to_string(),
                    Some(item.source_expression.clone())
                )
            })
            .collect()
    }
}

/// Restricted (e.g. PII) columns may not be projected, directly or through
/// a wildcard over their table
pub struct RestrictedColumnAccess;

impl PolicyRule for RestrictedColumnAccess {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL004",
            name:     "Restricted column accessed",
            severity: Severity::Critical,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        if ctx.config.restricted_columns.is_empty() {
            return vec![];
        }
        let info = self.info();
        let mut violations = Vec::new();
        for node in ctx.stmt.descendants() {
            for item in projected_items(node) {
                for (table, column) in restricted_hits(ctx, node, item) {
                    violations.push(violation(
                        &info,
                        format!("restricted column accessed: {}.{}", table, column),
                        Some(item.source_expression.clone())
                    ));
                }
            }
        }
        violations
    }
}

/// Restricted `(table, column)` pairs an item exposes
fn restricted_hits(
    ctx: &PolicyContext<'_>,
    node: &Statement,
    item: &ProjectionItem
) -> Vec<(String, String)> {
    let physical = || {
        node.sources()
            .iter()
            .filter(|s| s.is_physical())
            .map(|s| s.name.as_str())
    };

    if item.is_wildcard() {
        let tables: Vec<&str> = match &item.wildcard_table {
            Some(table) => vec![table.as_str()],
            None => physical().collect()
        };
        return ctx
            .config
            .restricted_columns
            .iter()
            .filter_map(|r| {
                tables
                    .iter()
                    .find(|t| r.matches_table(t))
                    .map(|t| (t.to_string(), r.column.to_string()))
            })
            .collect();
    }

    item.source_columns
        .iter()
        .filter_map(|col| match &col.table {
            Some(table) => ctx
                .config
                .is_restricted(table, &col.column)
                .then(|| (table.to_string(), col.column.to_string())),
            // unattributed: any physical source holding a restricted column
            // of that name counts
            None => physical()
                .find(|table| ctx.config.is_restricted(table, &col.column))
                .map(|table| (table.to_string(), col.column.to_string()))
        })
        .collect()
}
