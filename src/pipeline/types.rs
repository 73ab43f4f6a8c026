//! Attempt log and run results of the generation pipeline.

use serde::Serialize;

use crate::{
    ast::Statement,
    classify::StatementKind,
    error::ParseError,
    policy::{PolicyViolation, Severity}
};

/// Rule id used for candidates that do not parse
pub const SYNTAX_RULE_ID: &str = "SYNTAX";

/// Verdict recorded on an attempt.
///
/// `Rejected` is the verdict between the policy check and the transition
/// that follows it; a finished log only holds `Accepted`, `Repaired` and
/// `Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Accepted,
    Repaired,
    Rejected,
    Exhausted
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::Repaired => "repaired",
            Self::Rejected => "rejected",
            Self::Exhausted => "exhausted"
        };
        f.write_str(name)
    }
}

/// One candidate and how it was judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineAttempt {
    /// 0-based position in the run
    pub attempt_index:  u32,
    pub candidate_sql:  String,
    /// `Unknown` when the candidate did not parse
    pub statement_kind: StatementKind,
    pub violations:     Vec<PolicyViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error:    Option<ParseError>,
    /// Candidate with an injected row limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_sql:  Option<String>,
    pub outcome:        AttemptOutcome
}

impl PipelineAttempt {
    pub(crate) fn pending(attempt_index: u32, candidate_sql: String) -> Self {
        Self {
            attempt_index,
            candidate_sql,
            statement_kind: StatementKind::Unknown,
            violations: Vec::new(),
            parse_error: None,
            rewritten_sql: None,
            outcome: AttemptOutcome::Rejected
        }
    }

    /// Record a parse failure as a critical violation so it drives the
    /// repair loop like any other
    pub(crate) fn record_parse_error(&mut self, err: ParseError) {
        self.violations = vec![PolicyViolation {
            rule_id:            SYNTAX_RULE_ID,
            severity:           Severity::Critical,
            message:            err.to_string(),
            offending_fragment: None
        }];
        self.parse_error = Some(err);
    }

    pub fn critical_violations(&self) -> impl Iterator<Item = &PolicyViolation> {
        self.violations.iter().filter(|v| v.is_critical())
    }

    /// SQL that was judged: the rewrite when a limit was injected
    pub fn effective_sql(&self) -> &str {
        self.rewritten_sql.as_deref().unwrap_or(&self.candidate_sql)
    }
}

/// SQL that passed the policy gate.
///
/// Only the pipeline can build one, so an executor taking `&AcceptedSql`
/// never sees unvalidated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedSql {
    sql:           String,
    kind:          StatementKind,
    #[serde(skip)]
    statement:     Statement,
    attempt_index: u32
}

impl AcceptedSql {
    pub(crate) fn new(sql: String, kind: StatementKind, statement: Statement, attempt_index: u32) -> Self {
        Self {
            sql,
            kind,
            statement,
            attempt_index
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Parsed form, ready for lineage extraction
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }
}

/// Finished run: the full attempt log plus the accepted SQL, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub attempts: Vec<PipelineAttempt>,
    pub accepted: Option<AcceptedSql>
}

impl PipelineRun {
    pub fn is_accepted(&self) -> bool {
        self.accepted.is_some()
    }

    /// Outcome of the last attempt
    pub fn outcome(&self) -> Option<AttemptOutcome> {
        self.attempts.last().map(|a| a.outcome)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Violations of the last attempt, returned verbatim on give-up
    pub fn last_violations(&self) -> &[PolicyViolation] {
        self.attempts
            .last()
            .map_or(&[][..], |a| a.violations.as_slice())
    }
}
