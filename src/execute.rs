//! Query execution boundary.
//!
//! Executors receive [`AcceptedSql`], which only the pipeline can produce,
//! so the policy engine stays the single gate in front of a database.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::ExecError,
    pipeline::{AcceptedSql, PipelineRun}
};

/// Rows returned by an executor, values already rendered by the driver
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns:   Vec<String>,
    pub rows:      Vec<Vec<serde_json::Value>>,
    /// More rows were available than the cap allowed
    pub truncated: bool
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop rows beyond `row_cap`, marking the set as truncated
    pub fn cap(mut self, row_cap: u64) -> Self {
        let cap = usize::try_from(row_cap).unwrap_or(usize::MAX);
        if self.rows.len() > cap {
            self.rows.truncate(cap);
            self.truncated = true;
        }
        self
    }
}

/// Database connection that runs validated statements.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `sql`, returning at most `row_cap` rows
    async fn execute(&self, sql: &AcceptedSql, row_cap: u64) -> Result<RowSet, ExecError>;
}

/// Execute the accepted statement of a run.
///
/// Fails with [`ExecError::NotAccepted`] when the run gave up. The row cap
/// is enforced again on the returned set, whatever the executor did.
pub async fn execute_run(
    executor: &dyn QueryExecutor,
    run: &PipelineRun,
    row_cap: u64
) -> Result<RowSet, ExecError> {
    let accepted = run.accepted.as_ref().ok_or(ExecError::NotAccepted)?;
    debug!(sql = %accepted.sql(), row_cap, "executing accepted statement");
    let rows = executor.execute(accepted, row_cap).await?;
    Ok(rows.cap(row_cap))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cap_marks_truncation() {
        let rows = RowSet {
            columns:   vec!["ID".into()],
            rows:      (0..5).map(|i| vec![json!(i)]).collect(),
            truncated: false
        };
        let capped = rows.clone().cap(3);
        assert_eq!(capped.len(), 3);
        assert!(capped.truncated);
        assert!(!rows.cap(10).truncated);
    }
}
