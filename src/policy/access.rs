use super::{PolicyContext, PolicyRule, PolicyViolation, RuleInfo, Severity, violation};
use crate::{
    ast::{Statement, StatementBody},
    classify::StatementKind
};

/// Writes and schema changes are refused unless `allow_dml` is set
pub struct DmlForbidden;

impl PolicyRule for DmlForbidden {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL001",
            name:     "DML/DDL forbidden",
            severity: Severity::Critical,
            gate:     true
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        if ctx.config.allow_dml || !matches!(ctx.kind, StatementKind::Dml | StatementKind::Ddl) {
            return vec![];
        }
        let offending = ctx
            .stmt
            .descendants()
            .into_iter()
            .find(|n| StatementKind::from(n.node_kind()) == ctx.kind);
        let (node_kind, targets) = match offending {
            Some(node) => (node.node_kind().to_string(), node.target_tables().join(", ")),
            None => (ctx.kind.to_string(), String::new())
        };
        vec![violation(
            &self.info(),
            format!("DML/DDL forbidden: {} statement is not allowed", node_kind),
            (!targets.is_empty()).then_some(targets)
        )]
    }
}

/// The parser produced no typed node somewhere in the tree
pub struct Unclassifiable;

impl PolicyRule for Unclassifiable {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL006",
            name:     "Unclassifiable statement",
            severity: Severity::Critical,
            gate:     true
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        if ctx.kind != StatementKind::Unknown {
            return vec![];
        }
        let reason = ctx
            .stmt
            .descendants()
            .into_iter()
            .find_map(|n| match &n.body {
                StatementBody::Unknown(unknown) => Some(unknown.reason.clone()),
                _ => None
            })
            .unwrap_or_else(|| "statement kind could not be determined".to_string());
        vec![violation(
            &self.info(),
            format!("unclassifiable statement: {}", reason),
            Some(first_line(&ctx.stmt.sql))
        )]
    }
}

/// UPDATE/DELETE without WHERE affects every row. Only reachable when DML is
/// allowed at all.
pub struct MissingWhere;

impl PolicyRule for MissingWhere {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL007",
            name:     "UPDATE/DELETE without WHERE",
            severity: Severity::Critical,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        if !ctx.config.allow_dml {
            return vec![];
        }
        let info = self.info();
        ctx.stmt
            .descendants()
            .into_iter()
            .filter_map(|node| unbounded_write(node).map(|(verb, table)| (node, verb, table)))
            .map(|(node, verb, table)| {
                violation(
                    &info,
                    format!("{} without WHERE affects every row of '{}'", verb, table),
                    Some(first_line(&node.sql))
                )
            })
            .collect()
    }
}

fn unbounded_write(node: &Statement) -> Option<(&'static str, String)> {
    match &node.body {
        StatementBody::Update(update) if update.filter.is_none() => {
            Some(("UPDATE", update.target.to_string()))
        }
        StatementBody::Delete(delete) if delete.filter.is_none() => {
            let targets: Vec<&str> = delete.targets.iter().map(|t| t.as_str()).collect();
            Some(("DELETE", targets.join(", ")))
        }
        _ => None
    }
}

fn first_line(sql: &str) -> String {
    sql.lines().next().unwrap_or_default().trim().to_string()
}
