use super::{PolicyContext, PolicyRule, PolicyViolation, RuleInfo, Severity, violation};
use crate::{
    ast::{LimitSyntax, SqlDialect, Statement},
    classify::StatementKind,
    preprocessor::strip_terminators
};

pub(super) const RULE_ID: &str = "POL003";

/// Read queries must carry a literal row limit no larger than `max_rows`.
/// Only the outermost SELECT is judged; nested limits do not bound the
/// result.
pub struct RowLimitRequired;

impl PolicyRule for RowLimitRequired {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       RULE_ID,
            name:     "Row limit exceeded/missing",
            severity: Severity::Critical,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        if ctx.kind != StatementKind::Select {
            return vec![];
        }
        let Some(select) = ctx.stmt.as_select() else {
            return vec![];
        };
        let max = ctx.config.max_rows;
        let message = match select.row_limit {
            None => format!("row limit missing: at most {} rows may be returned", max),
            Some(limit) => match limit.rows {
                Some(rows) if rows <= max => return vec![],
                Some(rows) => format!("row limit exceeded: {} rows requested, at most {} allowed", rows, max),
                None => format!(
                    "row limit missing: {} bound is not a literal, at most {} rows may be returned",
                    syntax_name(limit.syntax),
                    max
                )
            }
        };
        vec![violation(&self.info(), message, None)]
    }
}

/// A root SELECT with no row-limiting clause at all
pub(super) fn is_missing(stmt: &Statement, kind: StatementKind) -> bool {
    kind == StatementKind::Select && stmt.as_select().is_some_and(|s| s.row_limit.is_none())
}

pub(super) fn within_bound(stmt: &Statement, max_rows: u64) -> bool {
    stmt.as_select()
        .and_then(|s| s.row_limit)
        .and_then(|l| l.rows)
        .is_some_and(|rows| rows <= max_rows)
}

/// Append the dialect's row-limit clause to `sql`
pub fn inject(sql: &str, dialect: SqlDialect, max_rows: u64) -> String {
    let base = strip_terminators(sql);
    let clause = match dialect.limit_syntax() {
        LimitSyntax::FetchFirst => format!("FETCH FIRST {} ROWS ONLY", max_rows),
        _ => format!("LIMIT {}", max_rows)
    };
    // a trailing line comment would swallow the clause
    let last_line = base.lines().last().unwrap_or_default();
    let separator = if last_line.contains("--") { "\n" } else { " " };
    format!("{}{}{}", base, separator, clause)
}

fn syntax_name(syntax: LimitSyntax) -> &'static str {
    match syntax {
        LimitSyntax::Limit => "LIMIT",
        LimitSyntax::FetchFirst => "FETCH FIRST",
        LimitSyntax::Rownum => "ROWNUM",
        LimitSyntax::Top => "TOP"
    }
}
