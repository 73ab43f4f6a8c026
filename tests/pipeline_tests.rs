use std::{
    sync::{Arc, Mutex},
    time::Duration
};

use async_trait::async_trait;
use sql_lineage_guard::{
    ast::SqlDialect,
    catalog::{ColumnDescriptor, SchemaCatalog, TableDescriptor},
    config::{PipelineConfig, PolicyConfig},
    error::{GenerationError, PipelineError},
    llm::{CandidateSql, GenerationRequest, ScriptedGenerator, TextGenerator},
    pipeline::{AttemptOutcome, Pipeline}
};

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new(SqlDialect::Postgres).with_table(TableDescriptor::new(
        "EMPLOYEE",
        vec![
            ColumnDescriptor::new("EMP_ID", "INT").primary_key(),
            ColumnDescriptor::new("EMP_NAME", "TEXT"),
        ]
    ))
}

fn config(max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        max_retries,
        generation_timeout_ms: 1_000,
        dialect: SqlDialect::Postgres
    }
}

fn pipeline(generator: Arc<dyn TextGenerator>, max_retries: u32) -> Pipeline {
    Pipeline::new(generator, Arc::new(catalog()), PolicyConfig::default(), config(max_retries))
}

/// Answers every request with the same SQL and keeps the requests
struct Recording {
    sql:      String,
    requests: Mutex<Vec<GenerationRequest>>
}

impl Recording {
    fn new(sql: &str) -> Self {
        Self {
            sql:      sql.to_string(),
            requests: Mutex::new(Vec::new())
        }
    }
}

#[async_trait]
impl TextGenerator for Recording {
    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CandidateSql::new(self.sql.clone()))
    }
}

struct Slow;

#[async_trait]
impl TextGenerator for Slow {
    async fn generate(&self, _: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(CandidateSql::new("SELECT EMP_ID FROM EMPLOYEE"))
    }
}

#[tokio::test]
async fn test_wildcard_repair_scenario() {
    let generator = Arc::new(ScriptedGenerator::new([
        "SELECT * FROM EMPLOYEE",
        "SELECT EMP_ID, EMP_NAME FROM EMPLOYEE"
    ]));
    let run = pipeline(generator.clone(), 2).run("all employees").await.unwrap();

    assert_eq!(generator.remaining(), 0);
    assert_eq!(run.attempt_count(), 2);
    assert_eq!(run.outcome(), Some(AttemptOutcome::Accepted));
    assert!(run.attempts[1].critical_violations().next().is_none());
    assert_eq!(
        run.accepted.as_ref().map(|a| a.sql()),
        Some("SELECT EMP_ID, EMP_NAME FROM EMPLOYEE LIMIT 1000")
    );
}

#[tokio::test]
async fn test_attempts_never_exceed_budget() {
    for max_retries in 0..4 {
        let generator = Arc::new(Recording::new("SELECT * FROM EMPLOYEE"));
        let run = pipeline(generator.clone(), max_retries)
            .run("all employees")
            .await
            .unwrap();

        assert_eq!(run.attempt_count(), max_retries as usize + 1);
        assert_eq!(run.outcome(), Some(AttemptOutcome::Exhausted));
        assert!(!run.last_violations().is_empty());
        for attempt in &run.attempts[..run.attempt_count() - 1] {
            assert_eq!(attempt.outcome, AttemptOutcome::Repaired);
        }
        assert_eq!(generator.requests.lock().unwrap().len(), max_retries as usize + 1);
    }
}

#[tokio::test]
async fn test_repair_request_carries_history() {
    let generator = Arc::new(Recording::new("SELECT * FROM EMPLOYEE"));
    pipeline(generator.clone(), 1).run("all employees").await.unwrap();

    let requests = generator.requests.lock().unwrap();
    assert!(!requests[0].is_repair());
    assert!(requests[1].is_repair());
    assert_eq!(requests[1].history.len(), 1);
    assert!(
        requests[1].history[0]
            .violations
            .iter()
            .any(|v| v.rule_id == "POL002")
    );
    assert_eq!(requests[1].max_rows, 1000);
    assert!(requests[1].schema.text.contains("EMPLOYEE"));
}

#[tokio::test]
async fn test_timeout_aborts_without_attempts() {
    let err = pipeline(Arc::new(Slow), 2).run("ids").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Generation {
            error: GenerationError::Timeout(1_000),
            ..
        }
    ));
    assert!(err.attempts().is_empty());
}

#[tokio::test]
async fn test_generation_failure_keeps_earlier_attempts() {
    // second request finds the script empty
    let generator = ScriptedGenerator::new(["SELECT * FROM EMPLOYEE"]);
    let err = pipeline(Arc::new(generator), 2).run("ids").await.unwrap_err();
    assert_eq!(err.attempts().len(), 1);
    assert_eq!(err.attempts()[0].outcome, AttemptOutcome::Repaired);
}

#[tokio::test]
async fn test_concurrent_runs_share_catalog() {
    let catalog = Arc::new(catalog());
    let mut handles = Vec::new();
    for i in 0..4 {
        let catalog = Arc::clone(&catalog);
        handles.push(tokio::spawn(async move {
            let generator = ScriptedGenerator::new([format!("SELECT EMP_ID FROM EMPLOYEE LIMIT {}", i + 1)]);
            let pipeline = Pipeline::new(
                Arc::new(generator),
                catalog,
                PolicyConfig::default(),
                config(0)
            );
            pipeline.run("ids").await.unwrap()
        }));
    }
    for handle in handles {
        let run = handle.await.unwrap();
        assert!(run.is_accepted());
    }
    assert_eq!(catalog.len(), 1);
}
