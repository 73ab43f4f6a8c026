//! Error types and constructors.
//!
//! Domain failures that callers branch on ([`ParseError`], [`GenerationError`],
//! [`PipelineError`], [`ExecError`]) are typed enums. Everything that only
//! needs to be reported (file IO, configuration, HTTP plumbing) goes through
//! [`AppError`] via the helper constructors below.

use std::{fmt, sync::LazyLock};

pub use masterror::{AppError, AppResult};
use regex::Regex;
use serde::Serialize;

use crate::pipeline::PipelineAttempt;

/// Line/column pair reported by the SQL tokenizer or parser (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SqlPosition {
    pub line:   u64,
    pub column: u64
}

impl fmt::Display for SqlPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Malformed SQL. Fatal to the attempt that produced it, never to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub position: Option<SqlPosition>,
    pub message:  String
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "SQL parse error at {}: {}", pos, self.message),
            None => write!(f, "SQL parse error: {}", self.message)
        }
    }
}

impl std::error::Error for ParseError {}

static POSITION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Line: (\d+), Column:? (\d+)").expect("valid regex")
});

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            position: None,
            message:  message.into()
        }
    }

    /// Build from a `sqlparser` error, recovering the position when the
    /// message carries one (`... at Line: X, Column: Y`).
    pub fn from_parser_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            position: extract_position(&message),
            message
        }
    }
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::from_parser_message(err.to_string())
    }
}

fn extract_position(message: &str) -> Option<SqlPosition> {
    let caps = POSITION_REGEX.captures(message)?;
    let line = caps.get(1)?.as_str().parse().ok()?;
    let column = caps.get(2)?.as_str().parse().ok()?;
    Some(SqlPosition {
        line,
        column
    })
}

/// Failure of the external text-generation collaborator.
///
/// Never retried by the pipeline; it terminates the run immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("text generator transport failure: {0}")]
    Transport(String),
    #[error("text generator did not answer within {0} ms")]
    Timeout(u64),
    #[error("text generator returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("text generator returned an empty response")]
    EmptyResponse
}

/// Run-level failure with the attempt log captured up to the failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("generation aborted after {} attempt(s): {error}", .attempts.len())]
    Generation {
        error:    GenerationError,
        attempts: Vec<PipelineAttempt>
    }
}

impl PipelineError {
    pub fn attempts(&self) -> &[PipelineAttempt] {
        match self {
            Self::Generation {
                attempts, ..
            } => attempts
        }
    }
}

/// Failure reported by a query execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("statement was not accepted by the policy gate")]
    NotAccepted,
    #[error("database error: {0}")]
    Database(String)
}

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create catalog parse error
pub fn catalog_parse_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(format!("Catalog parse error:\n  {}", message.into()))
}

/// Create LLM API error
pub fn llm_api_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Map an HTTP client error onto the generation taxonomy
pub fn http_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Transport(format!("request timeout: {}", err))
    } else if err.is_connect() {
        GenerationError::Transport(format!("connection failed: {}", err))
    } else if let Some(status) = err.status() {
        GenerationError::Provider {
            status: status.as_u16(),
            body:   err.to_string()
        }
    } else {
        GenerationError::Transport(err.to_string())
    }
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        llm_api_error(err.to_string())
    }
}

impl From<ExecError> for AppError {
    fn from(err: ExecError) -> Self {
        AppError::service(err.to_string())
    }
}
