//! Prompt assembly and candidate extraction for HTTP generators.

use std::{fmt::Write, sync::LazyLock};

use regex::Regex;

use super::GenerationRequest;
use crate::ast::{LimitSyntax, SqlDialect};

static SQL_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?[ \t]*\r?\n(.*?)```").expect("valid regex"));

fn limit_clause(dialect: SqlDialect, rows: u64) -> String {
    match dialect.limit_syntax() {
        LimitSyntax::FetchFirst => format!("FETCH FIRST {} ROWS ONLY", rows),
        LimitSyntax::Limit => format!("LIMIT {}", rows),
        LimitSyntax::Rownum => format!("ROWNUM <= {}", rows),
        LimitSyntax::Top => format!("TOP {}", rows)
    }
}

/// Render the full prompt for one request, including repair feedback.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "You are a {dialect} SQL generator. Write exactly one SQL statement that \
         answers the question below.\n\n\
         === QUESTION ===\n{question}\n\n\
         === DATABASE SCHEMA ===\n{schema}\n\
         === POLICY (MUST FOLLOW) ===\n\
         1. SELECT only. No INSERT/UPDATE/DELETE/MERGE or DDL.\n\
         2. No SELECT *. Always list columns explicitly.\n\
         3. Return at most {max_rows} rows: {limit}\n\
         4. Use only tables and columns listed in the schema.\n",
        dialect = request.dialect,
        question = request.instruction.trim(),
        max_rows = request.max_rows,
        schema = request.schema.text,
        limit = limit_clause(request.dialect, request.max_rows)
    );

    if !request.history.is_empty() {
        prompt.push_str("\n=== PREVIOUS ATTEMPTS (FIX THESE) ===\n");
        for attempt in &request.history {
            let _ = writeln!(prompt, "Attempt {}:", attempt.attempt_index + 1);
            let _ = writeln!(prompt, "```sql\n{}\n```", attempt.candidate_sql.trim());
            for violation in &attempt.violations {
                let _ = writeln!(prompt, "- {}", violation);
            }
        }
    }

    prompt.push_str("\nReturn the SQL in a single ```sql fenced block with no explanation.");
    prompt
}

/// Pull the SQL out of a generator response: the first ```sql fence if
/// there is one, otherwise the whole trimmed text. `None` for blank input.
pub fn extract_sql(response: &str) -> Option<String> {
    let sql = SQL_FENCE_REGEX
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map_or(response, |m| m.as_str())
        .trim();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{ColumnDescriptor, SchemaCatalog, TableDescriptor},
        classify::StatementKind,
        pipeline::{AttemptOutcome, PipelineAttempt},
        policy::{PolicyViolation, Severity}
    };

    fn request(history: Vec<PipelineAttempt>) -> GenerationRequest {
        let catalog = SchemaCatalog::new(SqlDialect::Oracle).with_table(TableDescriptor::new(
            "EMPLOYEE",
            vec![ColumnDescriptor::new("EMP_ID", "NUMBER")]
        ));
        GenerationRequest {
            instruction: "list employees".into(),
            dialect:     SqlDialect::Oracle,
            schema:      catalog.summary(),
            max_rows:    100,
            history
        }
    }

    #[test]
    fn test_extract_fenced() {
        let response = "Here you go:\n```sql\nSELECT 1 FROM DUAL\n```\nDone.";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT 1 FROM DUAL"));
    }

    #[test]
    fn test_extract_plain_and_blank() {
        assert_eq!(extract_sql("  SELECT 1  \n").as_deref(), Some("SELECT 1"));
        assert_eq!(extract_sql("   "), None);
        assert_eq!(extract_sql("```sql\n\n```"), None);
    }

    #[test]
    fn test_prompt_contains_context() {
        let prompt = build_prompt(&request(Vec::new()));
        assert!(prompt.contains("oracle SQL generator"));
        assert!(prompt.contains("list employees"));
        assert!(prompt.contains("EMPLOYEE"));
        assert!(prompt.contains("FETCH FIRST 100 ROWS ONLY"));
        assert!(!prompt.contains("PREVIOUS ATTEMPTS"));
    }

    #[test]
    fn test_repair_prompt_lists_violations() {
        let attempt = PipelineAttempt {
            attempt_index:  0,
            candidate_sql:  "SELECT * FROM EMPLOYEE".into(),
            statement_kind: StatementKind::Select,
            violations:     vec![PolicyViolation {
                rule_id:            "POL002",
                severity:           Severity::Critical,
                message:            "explicit columns required: wildcard projection".into(),
                offending_fragment: Some("*".into())
            }],
            parse_error:    None,
            rewritten_sql:  None,
            outcome:        AttemptOutcome::Repaired
        };
        let prompt = build_prompt(&request(vec![attempt]));
        assert!(prompt.contains("PREVIOUS ATTEMPTS"));
        assert!(prompt.contains("SELECT * FROM EMPLOYEE"));
        assert!(prompt.contains("[POL002] CRITICAL: explicit columns required"));
    }
}
