//! SQL text to [`Statement`] tree.
//!
//! `sqlparser` does the tokenizing and parsing; [`lower`] turns its tree into
//! the dialect-neutral model in [`crate::ast`]. Parsing is pure: unknown
//! tables and columns are not errors here.

mod lower;

use compact_str::CompactString;
use indexmap::IndexSet;
use sqlparser::{
    ast::{ObjectName, visit_relations},
    dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect},
    parser::Parser
};
use tracing::debug;

pub use crate::ast::SqlDialect;
use crate::{
    ast::{Statement, StatementId},
    error::ParseError,
    preprocessor::{Preprocessor, strip_terminators}
};

impl SqlDialect {
    /// `sqlparser` dialect used for this vendor. Oracle has no dedicated
    /// dialect upstream; the generic one accepts its query syntax.
    pub fn parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Oracle => Box::new(GenericDialect {}),
            Self::Maria => Box::new(MySqlDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {})
        }
    }
}

/// Parse exactly one statement.
///
/// [`Statement::sql`] holds the caller's text without trailing terminators,
/// not the preprocessed form, so rewrites built on it run as written.
///
/// Input holding several statements is rejected: a candidate such as
/// `SELECT 1; DROP TABLE T` must never be judged by its first half.
pub fn parse(sql: &str, dialect: SqlDialect) -> Result<Statement, ParseError> {
    let prepared = Preprocessor::new(dialect).process(sql);
    let parsed = Parser::parse_sql(dialect.parser_dialect().as_ref(), &prepared.sql)?;

    match parsed.as_slice() {
        [single] => {
            let mut stmt = lower::Lowerer::new(1).lower_root(single);
            stmt.sql = strip_terminators(sql).to_string();
            stmt.dialect_literals = prepared.literals;
            debug!(
                kind = %stmt.node_kind(),
                tables = stmt.referenced_tables.len(),
                nested = stmt.nested.len(),
                "parsed statement"
            );
            Ok(stmt)
        }
        [] => Err(ParseError::new("no SQL statement found")),
        many => Err(ParseError::new(format!(
            "expected a single statement, found {}",
            many.len()
        )))
    }
}

/// Parse a script of `;`-separated statements, numbering them from 1.
///
/// Hints are attributed to the first statement; they cannot be located
/// per statement once the script is split.
pub fn parse_batch(sql: &str, dialect: SqlDialect) -> Result<Vec<Statement>, ParseError> {
    let prepared = Preprocessor::new(dialect).process(sql);
    let parsed = Parser::parse_sql(dialect.parser_dialect().as_ref(), &prepared.sql)?;
    let mut literals = Some(prepared.literals);

    let statements: Vec<Statement> = parsed
        .iter()
        .zip(1..)
        .map(|(stmt, id): (_, StatementId)| {
            let mut lowered = lower::Lowerer::new(id).lower_root(stmt);
            if let Some(lits) = literals.take() {
                lowered.dialect_literals = lits;
            }
            lowered
        })
        .collect();

    if statements.is_empty() {
        return Err(ParseError::new("no SQL statement found"));
    }
    debug!(count = statements.len(), "parsed batch");
    Ok(statements)
}

/// Upper-case, unquoted form of a possibly qualified name
pub fn canonical_name(raw: &str) -> CompactString {
    let mut out = CompactString::default();
    for (i, part) in raw.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        let part = part
            .trim()
            .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
        out.push_str(&part.to_uppercase());
    }
    out
}

pub(crate) fn object_name(name: &ObjectName) -> CompactString {
    canonical_name(&name.to_string())
}

/// Every relation name `sqlparser` can see in `stmt`, CTE names included
pub(crate) fn raw_relations(stmt: &sqlparser::ast::Statement) -> IndexSet<CompactString> {
    let mut relations = IndexSet::new();
    let _ = visit_relations(stmt, |relation| {
        relations.insert(object_name(relation));
        std::ops::ControlFlow::<()>::Continue(())
    });
    relations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeKind, StatementBody};

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("hr.\"Employee\""), "HR.EMPLOYEE");
        assert_eq!(canonical_name("`orders`"), "ORDERS");
        assert_eq!(canonical_name("[dbo].[t]"), "DBO.T");
    }

    #[test]
    fn test_parse_rejects_multiple_statements() {
        let err = parse("SELECT 1; DROP TABLE T", SqlDialect::Postgres).unwrap_err();
        assert!(err.message.contains("single statement"));
    }

    #[test]
    fn test_parse_error_has_position() {
        let err = parse("SELECT ID FROM T WHERE ID = = 3", SqlDialect::Postgres).unwrap_err();
        assert!(err.position.is_some());
    }

    #[test]
    fn test_parse_keeps_original_text() {
        let stmt = parse("SELECT ID FROM T;", SqlDialect::Maria).unwrap();
        assert_eq!(stmt.sql, "SELECT ID FROM T");
    }

    #[test]
    fn test_oracle_outer_join_text_survives() {
        let sql = "SELECT E.ID FROM EMP E, DEPT D WHERE E.DEPT_ID = D.ID(+);";
        let stmt = parse(sql, SqlDialect::Oracle).unwrap();
        assert_eq!(stmt.sql, "SELECT E.ID FROM EMP E, DEPT D WHERE E.DEPT_ID = D.ID(+)");
        assert!(stmt.dialect_literals.iter().any(|l| l.text == "(+)"));
    }

    #[test]
    fn test_parse_batch_numbers_statements() {
        let stmts =
            parse_batch("SELECT A FROM T1; INSERT INTO T2 (A) SELECT A FROM T1", SqlDialect::Postgres)
                .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].id, 1);
        assert_eq!(stmts[1].id, 2);
        assert_eq!(stmts[1].node_kind(), NodeKind::Insert);
    }

    #[test]
    fn test_unsupported_statement_is_unknown() {
        let stmt = parse("SET search_path TO public", SqlDialect::Postgres).unwrap();
        assert!(matches!(stmt.body, StatementBody::Unknown(_)));
    }

    #[test]
    fn test_raw_relations_includes_cte_names() {
        let ast = Parser::parse_sql(
            &GenericDialect {},
            "WITH X AS (SELECT A FROM T) SELECT A FROM X"
        )
        .unwrap();
        let rel = raw_relations(&ast[0]);
        assert!(rel.contains("T"));
        assert!(rel.contains("X"));
    }
}
