//! Parameters and results of the CLI commands.

use std::path::PathBuf;

use crate::cli::{Dialect, Direction, Format, Provider};

/// Parameters for the check command.
///
/// # Example
///
/// ```
/// use sql_lineage_guard::{app::CheckParams, cli::Format};
///
/// let params = CheckParams {
///     catalog_path:  "schema.sql".into(),
///     query:         "SELECT EMP_ID FROM EMPLOYEE".to_string(),
///     dialect:       None,
///     max_rows:      None,
///     allow_dml:     false,
///     output_format: Format::Text,
///     verbose:       false,
///     no_color:      true
/// };
/// assert!(!params.allow_dml);
/// ```
#[derive(Debug, Clone)]
pub struct CheckParams {
    /// DDL file or JSON/YAML catalog snapshot
    pub catalog_path:  PathBuf,
    /// SQL text, a file path, or "-" for stdin
    pub query:         String,
    pub dialect:       Option<Dialect>,
    pub max_rows:      Option<u64>,
    pub allow_dml:     bool,
    pub output_format: Format,
    pub verbose:       bool,
    pub no_color:      bool
}

/// Parameters for the lineage command.
#[derive(Debug, Clone)]
pub struct LineageParams {
    /// SQL script, a file path, or "-" for stdin
    pub query:         String,
    pub catalog_path:  Option<PathBuf>,
    pub dialect:       Option<Dialect>,
    /// Start node for impact analysis
    pub node:          Option<String>,
    pub direction:     Direction,
    pub depth:         Option<usize>,
    /// Table-level Mermaid chart
    pub tables:        bool,
    pub output_format: Format,
    pub verbose:       bool,
    pub no_color:      bool
}

/// Parameters for the generate command.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub catalog_path:  PathBuf,
    /// Natural-language instruction
    pub prompt:        String,
    pub provider:      Option<Provider>,
    pub api_key:       Option<String>,
    pub model:         Option<String>,
    pub ollama_url:    Option<String>,
    pub dialect:       Option<Dialect>,
    pub max_retries:   Option<u32>,
    pub max_rows:      Option<u64>,
    pub output_format: Format,
    pub verbose:       bool,
    pub no_color:      bool
}

/// Rendered output of a command and the process exit code it maps to.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// 0 on success, 2 when the policy gate rejected the SQL
    pub exit_code: i32,
    pub output:    String
}
