use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering}
};

use async_trait::async_trait;
use serde_json::json;
use sql_lineage_guard::{
    ast::SqlDialect,
    catalog::{ColumnDescriptor, SchemaCatalog, TableDescriptor},
    classify::StatementKind,
    config::{PipelineConfig, PolicyConfig},
    error::ExecError,
    execute::{QueryExecutor, RowSet, execute_run},
    llm::ScriptedGenerator,
    pipeline::{AcceptedSql, Pipeline, PipelineRun}
};

/// Returns `rows` rows no matter the cap, counting calls
struct Greedy {
    rows:  usize,
    calls: AtomicUsize
}

impl Greedy {
    fn new(rows: usize) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0)
        }
    }
}

#[async_trait]
impl QueryExecutor for Greedy {
    async fn execute(&self, sql: &AcceptedSql, _row_cap: u64) -> Result<RowSet, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(sql.kind(), StatementKind::Select);
        Ok(RowSet {
            columns:   vec!["EMP_ID".into()],
            rows:      (0..self.rows).map(|i| vec![json!(i)]).collect(),
            truncated: false
        })
    }
}

struct Broken;

#[async_trait]
impl QueryExecutor for Broken {
    async fn execute(&self, _: &AcceptedSql, _: u64) -> Result<RowSet, ExecError> {
        Err(ExecError::Database("connection reset".into()))
    }
}

async fn run(candidates: &[&str], max_rows: u64) -> PipelineRun {
    let catalog = SchemaCatalog::new(SqlDialect::Postgres).with_table(TableDescriptor::new(
        "EMPLOYEE",
        vec![ColumnDescriptor::new("EMP_ID", "INT")]
    ));
    let policy = PolicyConfig {
        max_rows,
        ..PolicyConfig::default()
    };
    let config = PipelineConfig {
        max_retries:           0,
        generation_timeout_ms: 1_000,
        dialect:               SqlDialect::Postgres
    };
    let generator = ScriptedGenerator::new(candidates.iter().map(|s| s.to_string()));
    Pipeline::new(Arc::new(generator), Arc::new(catalog), policy, config)
        .run("employee ids")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_rejected_run_never_reaches_executor() {
    let run = run(&["DELETE FROM EMPLOYEE"], 10).await;
    let executor = Greedy::new(3);

    let err = execute_run(&executor, &run, 10).await.unwrap_err();
    assert!(matches!(err, ExecError::NotAccepted));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_row_cap_enforced_on_result() {
    let run = run(&["SELECT EMP_ID FROM EMPLOYEE"], 10).await;
    assert!(run.is_accepted());
    let executor = Greedy::new(25);

    let rows = execute_run(&executor, &run, 10).await.unwrap();
    assert_eq!(rows.len(), 10);
    assert!(rows.truncated);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_database_errors_propagate() {
    let run = run(&["SELECT EMP_ID FROM EMPLOYEE"], 10).await;
    let err = execute_run(&Broken, &run, 10).await.unwrap_err();
    assert_eq!(err.to_string(), "database error: connection reset");
}
