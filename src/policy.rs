//! Security policy engine for candidate SQL.
//!
//! Rules implement [`PolicyRule`] and run in parallel with [`rayon`]. Each
//! rule sees the whole statement tree (with columns attributed through the
//! catalog) and reports [`PolicyViolation`]s; the engine applies severity
//! overrides, sorts the result deterministically and handles the auto-limit
//! rewrite.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Statement  │────▶│ PolicyEngine │────▶│ PolicyReport │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!                            │
//!                     ┌──────┴──────┐
//!                     │    Rules    │
//!                     │  (parallel) │
//!                     └─────────────┘
//! ```
//!
//! # Rules
//!
//! | Id | Severity | Checks |
//! |----|----------|--------|
//! | `POL001` | Critical | DML/DDL while `allow_dml` is off |
//! | `POL002` | Critical | `*` projections |
//! | `POL003` | Critical | missing or excessive row limit |
//! | `POL004` | Critical | restricted columns in projections |
//! | `POL005` | Critical | tables/columns missing from the catalog |
//! | `POL006` | Critical | unclassifiable statements |
//! | `POL007` | Critical | UPDATE/DELETE without WHERE |
//! | `POL008` | Warning  | joins without a condition |
//!
//! `POL001` and `POL006` are gates: configuration can neither disable nor
//! demote them.

mod access;
mod joins;
mod limit;
mod objects;
mod projection;
mod types;

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};
pub use types::{PolicyReport, PolicyViolation, RuleInfo, Severity};

use crate::{
    ast::{ColumnRef, ProjectionItem, SqlDialect, Statement, StatementBody},
    catalog::SchemaCatalog,
    classify::StatementKind,
    config::PolicyConfig,
    parser::parse
};

/// Everything a rule may look at
pub struct PolicyContext<'a> {
    /// Statement with columns attributed through the catalog
    pub stmt:    &'a Statement,
    pub kind:    StatementKind,
    pub catalog: &'a SchemaCatalog,
    pub config:  &'a PolicyConfig
}

/// A stateless policy check. Must be `Send + Sync` for parallel execution.
pub trait PolicyRule: Send + Sync {
    fn info(&self) -> RuleInfo;

    /// Violations of this rule, empty if the statement passes
    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation>;
}

/// Configured rule set
pub struct PolicyEngine {
    rules:          Vec<Box<dyn PolicyRule>>,
    severity_cache: HashMap<&'static str, Severity>,
    config:         PolicyConfig,
    dialect:        SqlDialect
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig, dialect: SqlDialect) -> Self {
        let all_rules: Vec<Box<dyn PolicyRule>> = vec![
            Box::new(access::DmlForbidden),
            Box::new(projection::ExplicitColumns),
            Box::new(limit::RowLimitRequired),
            Box::new(projection::RestrictedColumnAccess),
            Box::new(objects::UndefinedObject),
            Box::new(access::Unclassifiable),
            Box::new(access::MissingWhere),
            Box::new(joins::CartesianJoin),
        ];

        let rules: Vec<Box<dyn PolicyRule>> = all_rules
            .into_iter()
            .filter(|r| {
                let info = r.info();
                info.gate
                    || !config
                        .disabled
                        .iter()
                        .any(|d| d.eq_ignore_ascii_case(info.id))
            })
            .collect();

        let mut severity_cache = HashMap::new();
        for rule in &rules {
            let info = rule.info();
            if info.gate {
                continue;
            }
            if let Some(sev_str) = config
                .severity
                .iter()
                .find(|(id, _)| id.eq_ignore_ascii_case(info.id))
                .map(|(_, sev)| sev)
                && let Some(sev) = types::parse_severity(sev_str)
            {
                severity_cache.insert(info.id, sev);
            }
        }

        Self {
            rules,
            severity_cache,
            config,
            dialect
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.info().id).collect()
    }

    /// Evaluate `stmt` and, when allowed, inject a missing row limit.
    ///
    /// The rewrite only replaces `POL003` violations; everything else is
    /// judged on the statement as written.
    pub fn evaluate(
        &self,
        stmt: &Statement,
        kind: StatementKind,
        catalog: &SchemaCatalog
    ) -> PolicyReport {
        let mut violations = self.run_rules(stmt, kind, catalog);
        let mut rewritten_sql = None;
        let mut rewritten_statement = None;

        if self.config.auto_limit
            && violations.iter().any(|v| v.rule_id == limit::RULE_ID)
            && limit::is_missing(stmt, kind)
        {
            let candidate = limit::inject(&stmt.sql, self.dialect, self.config.max_rows);
            match parse(&candidate, self.dialect) {
                Ok(limited) if limit::within_bound(&limited, self.config.max_rows) => {
                    debug!(sql = %candidate, "row limit injected");
                    violations.retain(|v| v.rule_id != limit::RULE_ID);
                    rewritten_sql = Some(candidate);
                    rewritten_statement = Some(limited);
                }
                Ok(_) => debug!("injected row limit not recognized, keeping violation"),
                Err(err) => debug!(error = %err, "row limit rewrite does not parse")
            }
        }

        let report = PolicyReport {
            violations,
            rewritten_sql,
            rewritten_statement
        };
        info!(
            kind = %kind,
            critical = report.critical_count(),
            warnings = report.warning_count(),
            rewritten = report.rewritten_sql.is_some(),
            "policy evaluated"
        );
        report
    }

    fn run_rules(
        &self,
        stmt: &Statement,
        kind: StatementKind,
        catalog: &SchemaCatalog
    ) -> Vec<PolicyViolation> {
        let resolved = catalog.resolve_columns(stmt);
        let ctx = PolicyContext {
            stmt: &resolved,
            kind,
            catalog,
            config: &self.config
        };

        let mut violations: Vec<PolicyViolation> = self
            .rules
            .par_iter()
            .flat_map(|rule| rule.check(&ctx))
            .collect();

        for violation in &mut violations {
            if let Some(&severity) = self.severity_cache.get(violation.rule_id) {
                violation.severity = severity;
            }
        }

        violations.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.rule_id.cmp(b.rule_id))
                .then_with(|| a.message.cmp(&b.message))
                .then_with(|| a.offending_fragment.cmp(&b.offending_fragment))
        });
        violations.dedup();
        violations
    }
}

/// Evaluate `stmt` against `policy`, using the catalog's dialect for any
/// rewrite. See [`PolicyEngine::evaluate`] for the rewritten SQL.
pub fn evaluate(
    stmt: &Statement,
    kind: StatementKind,
    catalog: &SchemaCatalog,
    policy: &PolicyConfig
) -> Vec<PolicyViolation> {
    PolicyEngine::new(policy.clone(), catalog.dialect)
        .evaluate(stmt, kind, catalog)
        .violations
}

pub(crate) fn violation(
    info: &RuleInfo,
    message: String,
    fragment: Option<String>
) -> PolicyViolation {
    PolicyViolation {
        rule_id: info.id,
        severity: info.severity,
        message,
        offending_fragment: fragment
    }
}

/// Output items of a node: projections, set-operation branches, INSERT and
/// CTAS sources, MERGE actions and UPDATE assignments
pub(crate) fn projected_items(node: &Statement) -> Vec<&ProjectionItem> {
    let select = match &node.body {
        StatementBody::Select(select) => Some(select),
        StatementBody::Insert(insert) => insert.source.as_ref(),
        StatementBody::Ddl(ddl) => ddl.source.as_ref(),
        StatementBody::Merge(merge) => return merge.projection.iter().collect(),
        StatementBody::Update(update) => return update.assignments.iter().collect(),
        StatementBody::Delete(_) | StatementBody::Unknown(_) => None
    };
    select
        .map(|s| {
            s.projection
                .iter()
                .chain(s.set_branches.iter().flatten())
                .collect()
        })
        .unwrap_or_default()
}

/// Every column reference a node reads
pub(crate) fn column_refs(node: &Statement) -> Vec<&ColumnRef> {
    let mut refs: Vec<&ColumnRef> = projected_items(node)
        .into_iter()
        .flat_map(|item| item.source_columns.iter())
        .collect();
    let select = match &node.body {
        StatementBody::Select(select) => Some(select),
        StatementBody::Insert(insert) => insert.source.as_ref(),
        StatementBody::Ddl(ddl) => ddl.source.as_ref(),
        StatementBody::Update(update) => {
            refs.extend(update.filter_columns.iter());
            None
        }
        StatementBody::Delete(delete) => {
            refs.extend(delete.filter_columns.iter());
            None
        }
        StatementBody::Merge(merge) => {
            refs.extend(merge.on_columns.iter());
            None
        }
        StatementBody::Unknown(_) => None
    };
    if let Some(select) = select {
        refs.extend(select.filter_columns.iter());
        refs.extend(select.join_columns.iter());
        refs.extend(select.group_columns.iter());
    }
    refs
}
