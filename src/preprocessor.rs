//! Dialect-specific preprocessing ahead of `sqlparser`.
//!
//! Vendor constructs that have no dialect-neutral form are captured as
//! [`DialectLiteral`]s so they survive into the statement tree. Constructs
//! `sqlparser` cannot read at all are removed from the parser's input. That
//! input is never executed: statements keep the caller's text.
//!
//! # Example
//!
//! ```
//! use sql_lineage_guard::{ast::SqlDialect, preprocessor::Preprocessor};
//!
//! let result = Preprocessor::new(SqlDialect::Oracle)
//!     .process("SELECT /*+ INDEX(e EMP_IX) */ NVL2(BONUS, 1, 0) FROM EMPLOYEE e;");
//!
//! assert!(!result.sql.ends_with(';'));
//! assert_eq!(result.literals.len(), 2);
//! ```

pub mod oracle;

use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{DialectLiteral, LiteralKind, SqlDialect};

/// Optimizer hint comment: `/*+ ... */`
static HINT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*\+[\s\S]*?\*/").expect("valid regex"));

/// Preprocessor for dialect-specific SQL transformations.
#[derive(Debug)]
pub struct Preprocessor {
    dialect: SqlDialect
}

/// Result of SQL preprocessing.
#[derive(Debug, Clone)]
pub struct PreprocessorResult {
    /// SQL ready for parsing, not for execution
    pub sql:      String,
    /// Fragments retained verbatim, in order of appearance
    pub literals: Vec<DialectLiteral>
}

impl Preprocessor {
    #[must_use]
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect
        }
    }

    /// Extract hints, strip trailing terminators, then apply dialect rules.
    #[must_use]
    pub fn process(&self, sql: &str) -> PreprocessorResult {
        let mut literals: Vec<DialectLiteral> = HINT_REGEX
            .find_iter(sql)
            .map(|m| DialectLiteral {
                kind: LiteralKind::Hint,
                text: m.as_str().to_string()
            })
            .collect();

        let trimmed = strip_terminators(sql);
        let sql = match self.dialect {
            SqlDialect::Oracle => oracle::preprocess(trimmed, &mut literals),
            SqlDialect::Maria | SqlDialect::Postgres => trimmed.to_string()
        };

        PreprocessorResult {
            sql,
            literals
        }
    }
}

/// Remove surrounding whitespace and trailing `;` (Oracle tools also use `/`).
pub fn strip_terminators(sql: &str) -> &str {
    let mut s = sql.trim();
    loop {
        let next = s
            .strip_suffix(';')
            .or_else(|| s.strip_suffix("\n/"))
            .map(str::trim_end);
        match next {
            Some(rest) => s = rest,
            None => return s
        }
    }
}
