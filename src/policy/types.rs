//! Type definitions for the security policy engine.

use serde::Serialize;

use crate::ast::Statement;

/// Severity of a policy violation.
///
/// Ordered from lowest to highest. Only `Critical` blocks acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, never blocks acceptance
    Warning,
    /// Blocks acceptance and triggers a repair
    Critical
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "WARN"),
            Self::Critical => write!(f, "CRITICAL")
        }
    }
}

/// A single breach of a policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PolicyViolation {
    /// Unique rule identifier (e.g., "POL002")
    pub rule_id:            &'static str,
    pub severity:           Severity,
    pub message:            String,
    /// SQL text or object name that triggered the rule
    pub offending_fragment: Option<String>
}

impl PolicyViolation {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.rule_id, self.severity, self.message)?;
        if let Some(fragment) = &self.offending_fragment {
            write!(f, " ({})", fragment)?;
        }
        Ok(())
    }
}

/// Metadata about a rule for identification and configuration.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    /// Unique rule identifier (e.g., "POL001")
    pub id:       &'static str,
    /// Human-readable rule name
    pub name:     &'static str,
    /// Default severity level
    pub severity: Severity,
    /// Gate rules cannot be disabled or demoted by configuration
    pub gate:     bool
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    /// Violations in display order (critical first, then rule id)
    pub violations:          Vec<PolicyViolation>,
    /// Candidate with an injected row limit, when auto-limit applied
    pub rewritten_sql:       Option<String>,
    /// Parsed form of `rewritten_sql`
    #[serde(skip)]
    pub rewritten_statement: Option<Statement>
}

impl PolicyReport {
    /// No critical violation remains
    pub fn is_accepted(&self) -> bool {
        !self.violations.iter().any(PolicyViolation::is_critical)
    }

    pub fn critical_count(&self) -> usize {
        self.violations.iter().filter(|v| v.is_critical()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .count()
    }
}

pub(crate) fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_lowercase().as_str() {
        "critical" | "error" => Some(Severity::Critical),
        "warning" | "warn" => Some(Severity::Warning),
        _ => None
    }
}
