//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.sql-lineage-guard.toml` in current directory
//! 4. `~/.config/sql-lineage-guard/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! provider = "ollama"          # openai, anthropic, ollama
//! model = "llama3.2"
//! api_key = "sk-..."           # or use LLM_API_KEY env var
//! ollama_url = "http://localhost:11434"
//!
//! [pipeline]
//! max_retries = 2
//! generation_timeout_ms = 120000
//! dialect = "oracle"           # oracle, maria, postgres
//!
//! [policy]
//! allow_dml = false
//! max_rows = 1000
//! auto_limit = true
//! restricted_columns = ["EMPLOYEE.RRN_BACK", "EMPLOYEE.SALARY"]
//! disabled = ["POL008"]
//!
//! [policy.severity]
//! POL005 = "warning"
//!
//! [lineage]
//! max_depth = 5
//! mermaid_max_columns = 20
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LLM_API_KEY` | API key for OpenAI/Anthropic |
//! | `LLM_PROVIDER` | Provider name |
//! | `LLM_MODEL` | Model identifier |
//! | `OLLAMA_URL` | Ollama base URL |
//! | `SQL_GUARD_DIALECT` | Default SQL dialect |
//! | `SQL_GUARD_MAX_ROWS` | Row cap enforced by the policy |

use std::{collections::HashMap, env, fmt, fs, path::PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::{
    ast::SqlDialect,
    error::{AppResult, config_error},
    parser::canonical_name
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm:      LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub policy:   PolicyConfig,
    #[serde(default)]
    pub lineage:  LineageConfig
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider:   Option<String>,
    pub api_key:    Option<String>,
    pub model:      Option<String>,
    pub ollama_url: Option<String>
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider:   None,
            api_key:    None,
            model:      None,
            ollama_url: Some(String::from("http://localhost:11434"))
        }
    }
}

/// Generation-validation-repair loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Repairs allowed after the first candidate
    pub max_retries:           u32,
    pub generation_timeout_ms: u64,
    pub dialect:               SqlDialect
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries:           2,
            generation_timeout_ms: 120_000,
            dialect:               SqlDialect::Oracle
        }
    }
}

/// Column that may never be projected, written `TABLE.COLUMN`
/// (`SCHEMA.TABLE.COLUMN` also accepted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RestrictedColumn {
    pub table:  CompactString,
    pub column: CompactString
}

impl RestrictedColumn {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table:  canonical_name(table),
            column: canonical_name(column)
        }
    }

    /// Whether `table` names this column's table, bare or schema-qualified
    pub fn matches_table(&self, table: &str) -> bool {
        let table = canonical_name(table);
        table == self.table
            || table.ends_with(&format!(".{}", self.table))
            || self.table.ends_with(&format!(".{}", table))
    }
}

impl TryFrom<String> for RestrictedColumn {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.rsplit_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(Self::new(table, column))
            }
            _ => Err(format!("restricted column '{}' must be written TABLE.COLUMN", value))
        }
    }
}

impl From<RestrictedColumn> for String {
    fn from(value: RestrictedColumn) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RestrictedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Security policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allow_dml:          bool,
    pub max_rows:           u64,
    /// Rewrite a missing row limit instead of failing
    pub auto_limit:         bool,
    pub restricted_columns: Vec<RestrictedColumn>,
    /// Disabled rule IDs
    pub disabled:           Vec<String>,
    /// Severity overrides (rule_id -> severity)
    pub severity:           HashMap<String, String>
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_dml:          false,
            max_rows:           1000,
            auto_limit:         true,
            restricted_columns: Vec::new(),
            disabled:           Vec::new(),
            severity:           HashMap::new()
        }
    }
}

impl PolicyConfig {
    pub fn is_restricted(&self, table: &str, column: &str) -> bool {
        self.restricted_columns
            .iter()
            .any(|r| r.column.eq_ignore_ascii_case(column) && r.matches_table(table))
    }
}

/// Lineage extraction and rendering settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    /// Default depth for impact analysis
    pub max_depth:           usize,
    /// Column-level Mermaid output lists at most this many columns per table
    pub mermaid_max_columns: usize
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            max_depth:           5,
            mermaid_max_columns: 20
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.sql-lineage-guard.toml)
    /// 3. Config file in home directory (~/.config/sql-lineage-guard/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // Try to load from home directory config
        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-lineage-guard")
                .join("config.toml");

            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        // Try to load from current directory config (overrides home config)
        let local_config = PathBuf::from(".sql-lineage-guard.toml");
        if local_config.exists() {
            config = Self::from_file(&local_config)?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &PathBuf) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse a TOML document; missing sections take their defaults
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Override with environment variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>
    {
        if let Some(api_key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = Some(provider);
        }

        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }

        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = Some(url);
        }

        if let Some(dialect) = lookup("SQL_GUARD_DIALECT") {
            self.pipeline.dialect = dialect.parse().map_err(config_error)?;
        }

        if let Some(max_rows) = lookup("SQL_GUARD_MAX_ROWS") {
            self.policy.max_rows = max_rows
                .parse()
                .map_err(|e| config_error(format!("Invalid SQL_GUARD_MAX_ROWS: {}", e)))?;
        }

        Ok(())
    }
}
