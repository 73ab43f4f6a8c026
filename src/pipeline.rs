//! Generation-validation-repair state machine.
//!
//! One run turns an instruction into at most `max_retries + 1` candidates,
//! strictly in sequence:
//!
//! ```text
//! AwaitCandidate ──► Classify ──► PolicyCheck ──► Accept
//!       ▲                │             │
//!       │                ▼             ▼
//!       └──────── RequestRepair ◄──────┤
//!                                      ▼
//!                                   GiveUp
//! ```
//!
//! A candidate that does not parse is rejected like a policy failure.
//! Generator failures and timeouts end the run at once with
//! [`PipelineError::Generation`]; they never consume the retry budget.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sql_lineage_guard::{
//!     ast::SqlDialect,
//!     catalog::{ColumnDescriptor, SchemaCatalog, TableDescriptor},
//!     config::{PipelineConfig, PolicyConfig},
//!     llm::ScriptedGenerator,
//!     pipeline::{AttemptOutcome, Pipeline}
//! };
//!
//! # tokio_test_block(async {
//! let catalog = SchemaCatalog::new(SqlDialect::Postgres).with_table(TableDescriptor::new(
//!     "EMPLOYEE",
//!     vec![ColumnDescriptor::new("EMP_ID", "INT")]
//! ));
//! let generator = ScriptedGenerator::new(["SELECT EMP_ID FROM EMPLOYEE LIMIT 10"]);
//! let config = PipelineConfig {
//!     dialect: SqlDialect::Postgres,
//!     ..PipelineConfig::default()
//! };
//!
//! let pipeline = Pipeline::new(
//!     Arc::new(generator),
//!     Arc::new(catalog),
//!     PolicyConfig::default(),
//!     config
//! );
//! let run = pipeline.run("list employee ids").await.unwrap();
//! assert_eq!(run.outcome(), Some(AttemptOutcome::Accepted));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod types;

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
pub use types::{AcceptedSql, AttemptOutcome, PipelineAttempt, PipelineRun, SYNTAX_RULE_ID};

use crate::{
    ast::Statement,
    catalog::SchemaCatalog,
    classify::classify,
    config::{PipelineConfig, PolicyConfig},
    error::{GenerationError, PipelineError},
    llm::{CandidateSql, GenerationRequest, TextGenerator},
    parser::parse,
    policy::PolicyEngine
};

/// Machine state. Every state after `AwaitCandidate` owns the attempt being
/// judged; it joins the log when the attempt's verdict is final.
enum State {
    AwaitCandidate,
    Classify(PipelineAttempt),
    PolicyCheck(PipelineAttempt, Statement),
    Accept(PipelineAttempt, AcceptedSql),
    RequestRepair(PipelineAttempt),
    GiveUp(PipelineAttempt)
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitCandidate => "await_candidate",
            Self::Classify(_) => "classify",
            Self::PolicyCheck(..) => "policy_check",
            Self::Accept(..) => "accept",
            Self::RequestRepair(_) => "request_repair",
            Self::GiveUp(_) => "give_up"
        }
    }
}

/// Bounded-retry pipeline bound to one catalog snapshot and policy.
///
/// A `Pipeline` holds no per-run state; concurrent runs share it freely.
pub struct Pipeline {
    generator: Arc<dyn TextGenerator>,
    catalog:   Arc<SchemaCatalog>,
    engine:    PolicyEngine,
    config:    PipelineConfig
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<SchemaCatalog>,
        policy: PolicyConfig,
        config: PipelineConfig
    ) -> Self {
        let engine = PolicyEngine::new(policy, config.dialect);
        Self {
            generator,
            catalog,
            engine,
            config
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the machine to `Accept` or `GiveUp`.
    ///
    /// Both terminal states return `Ok`; only a generator failure is an
    /// error, and it carries the attempts made so far.
    pub async fn run(&self, instruction: &str) -> Result<PipelineRun, PipelineError> {
        let mut attempts: Vec<PipelineAttempt> = Vec::new();
        let mut state = State::AwaitCandidate;

        loop {
            let from = state.name();
            state = match state {
                State::AwaitCandidate => {
                    let request = self.request(instruction, &attempts);
                    match self.generate(&request).await {
                        Ok(candidate) => {
                            let index = attempts.len() as u32;
                            State::Classify(PipelineAttempt::pending(index, candidate.sql))
                        }
                        Err(error) => {
                            warn!(error = %error, attempts = attempts.len(), "generation failed, aborting run");
                            return Err(PipelineError::Generation {
                                error,
                                attempts
                            });
                        }
                    }
                }
                State::Classify(mut attempt) => match parse(&attempt.candidate_sql, self.config.dialect) {
                    Ok(stmt) => {
                        attempt.statement_kind = classify(&stmt);
                        State::PolicyCheck(attempt, stmt)
                    }
                    Err(err) => {
                        debug!(error = %err, "candidate does not parse");
                        attempt.record_parse_error(err);
                        self.reject(attempt)
                    }
                },
                State::PolicyCheck(mut attempt, stmt) => {
                    let report = self.engine.evaluate(&stmt, attempt.statement_kind, &self.catalog);
                    let accepted = report.is_accepted();
                    attempt.violations = report.violations;
                    attempt.rewritten_sql = report.rewritten_sql;
                    if accepted {
                        let sql = attempt.effective_sql().to_string();
                        let statement = report.rewritten_statement.unwrap_or(stmt);
                        let accepted =
                            AcceptedSql::new(sql, attempt.statement_kind, statement, attempt.attempt_index);
                        State::Accept(attempt, accepted)
                    } else {
                        self.reject(attempt)
                    }
                }
                State::Accept(mut attempt, accepted) => {
                    attempt.outcome = AttemptOutcome::Accepted;
                    info!(
                        attempt = attempt.attempt_index,
                        warnings = attempt.violations.len(),
                        "candidate accepted"
                    );
                    attempts.push(attempt);
                    return Ok(PipelineRun {
                        attempts,
                        accepted: Some(accepted)
                    });
                }
                State::RequestRepair(mut attempt) => {
                    attempt.outcome = AttemptOutcome::Repaired;
                    info!(
                        attempt = attempt.attempt_index,
                        critical = attempt.critical_violations().count(),
                        "requesting repair"
                    );
                    attempts.push(attempt);
                    State::AwaitCandidate
                }
                State::GiveUp(mut attempt) => {
                    attempt.outcome = AttemptOutcome::Exhausted;
                    warn!(
                        attempts = attempt.attempt_index + 1,
                        critical = attempt.critical_violations().count(),
                        "retry budget exhausted"
                    );
                    attempts.push(attempt);
                    return Ok(PipelineRun {
                        attempts,
                        accepted: None
                    });
                }
            };
            debug!(from, to = state.name(), "pipeline transition");
        }
    }

    fn reject(&self, mut attempt: PipelineAttempt) -> State {
        attempt.outcome = AttemptOutcome::Rejected;
        if attempt.attempt_index < self.config.max_retries {
            State::RequestRepair(attempt)
        } else {
            State::GiveUp(attempt)
        }
    }

    fn request(&self, instruction: &str, history: &[PipelineAttempt]) -> GenerationRequest {
        GenerationRequest {
            instruction: instruction.to_string(),
            dialect:     self.config.dialect,
            schema:      self.catalog.summary(),
            max_rows:    self.engine.config().max_rows,
            history:     history.to_vec()
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
        let limit = Duration::from_millis(self.config.generation_timeout_ms);
        match tokio::time::timeout(limit, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.config.generation_timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        ast::SqlDialect,
        catalog::{ColumnDescriptor, TableDescriptor},
        classify::StatementKind,
        config::RestrictedColumn,
        llm::ScriptedGenerator
    };

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(SqlDialect::Oracle).with_table(TableDescriptor::new(
            "EMPLOYEE",
            vec![
                ColumnDescriptor::new("EMP_ID", "NUMBER").primary_key(),
                ColumnDescriptor::new("EMP_NAME", "VARCHAR2(100)"),
                ColumnDescriptor::new("RRN_BACK", "VARCHAR2(7)"),
            ]
        ))
    }

    fn pipeline(generator: impl TextGenerator + 'static, policy: PolicyConfig) -> Pipeline {
        Pipeline::new(
            Arc::new(generator),
            Arc::new(catalog()),
            policy,
            PipelineConfig::default()
        )
    }

    #[tokio::test]
    async fn test_wildcard_repaired_on_second_attempt() {
        let generator = ScriptedGenerator::new([
            "SELECT * FROM EMPLOYEE",
            "SELECT EMP_ID, EMP_NAME FROM EMPLOYEE"
        ]);
        let run = pipeline(generator, PolicyConfig::default())
            .run("show employees")
            .await
            .unwrap();

        assert_eq!(run.attempt_count(), 2);
        assert_eq!(run.attempts[0].outcome, AttemptOutcome::Repaired);
        assert!(run.attempts[0].violations.iter().any(|v| v.rule_id == "POL002"));
        assert_eq!(run.outcome(), Some(AttemptOutcome::Accepted));
        let accepted = run.accepted.unwrap();
        assert_eq!(accepted.sql(), "SELECT EMP_ID, EMP_NAME FROM EMPLOYEE FETCH FIRST 1000 ROWS ONLY");
        assert_eq!(accepted.kind(), StatementKind::Select);
        assert_eq!(accepted.attempt_index(), 1);
    }

    #[tokio::test]
    async fn test_restricted_column_never_accepted() {
        let policy = PolicyConfig {
            restricted_columns: vec![RestrictedColumn::new("EMPLOYEE", "RRN_BACK")],
            ..PolicyConfig::default()
        };
        let generator = ScriptedGenerator::new(["SELECT RRN_BACK FROM EMPLOYEE"; 3]);
        let run = pipeline(generator, policy).run("resident numbers").await.unwrap();

        assert!(!run.is_accepted());
        assert_eq!(run.attempt_count(), 3);
        assert_eq!(run.outcome(), Some(AttemptOutcome::Exhausted));
        let critical: Vec<_> = run.last_violations().iter().filter(|v| v.is_critical()).collect();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].message.starts_with("restricted column accessed"));
    }

    #[tokio::test]
    async fn test_parse_error_consumes_an_attempt() {
        let generator = ScriptedGenerator::new(["SELEC EMP_ID FROM", "SELECT EMP_ID FROM EMPLOYEE"]);
        let run = pipeline(generator, PolicyConfig::default())
            .run("ids")
            .await
            .unwrap();
        assert_eq!(run.attempts[0].statement_kind, StatementKind::Unknown);
        assert_eq!(run.attempts[0].violations[0].rule_id, SYNTAX_RULE_ID);
        assert!(run.is_accepted());
    }

    #[tokio::test]
    async fn test_zero_retries_gives_up_on_first_failure() {
        let generator = ScriptedGenerator::new(["DELETE FROM EMPLOYEE"]);
        let pipeline = Pipeline::new(
            Arc::new(generator),
            Arc::new(catalog()),
            PolicyConfig::default(),
            PipelineConfig {
                max_retries: 0,
                ..PipelineConfig::default()
            }
        );
        let run = pipeline.run("purge").await.unwrap();
        assert_eq!(run.attempt_count(), 1);
        assert_eq!(run.outcome(), Some(AttemptOutcome::Exhausted));
        assert_eq!(run.attempts[0].statement_kind, StatementKind::Dml);
    }

    struct Unreachable;

    #[async_trait]
    impl TextGenerator for Unreachable {
        async fn generate(&self, _: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
            Err(GenerationError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let err = pipeline(Unreachable, PolicyConfig::default())
            .run("anything")
            .await
            .unwrap_err();
        assert!(err.attempts().is_empty());
        assert!(matches!(
            err,
            PipelineError::Generation {
                error: GenerationError::Transport(_),
                ..
            }
        ));
    }
}
