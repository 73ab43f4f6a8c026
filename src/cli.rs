use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// SQL Lineage Guard - policy-gated SQL generation and column lineage
#[derive(Parser, Debug)]
#[command(name = "sql-lineage-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log pipeline transitions and policy decisions to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate hand-written SQL against the catalog and policy
    Check {
        /// Catalog file: DDL, or a JSON/YAML snapshot
        #[arg(short, long)]
        catalog: PathBuf,

        /// SQL text, a file holding it, or - for stdin
        #[arg(short, long)]
        query: String,

        /// SQL dialect (defaults to the configured one)
        #[arg(short, long, value_enum)]
        dialect: Option<Dialect>,

        /// Row cap enforced by the policy
        #[arg(long)]
        max_rows: Option<u64>,

        /// Accept INSERT/UPDATE/DELETE/MERGE
        #[arg(long)]
        allow_dml: bool,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    },

    /// Extract table and column lineage, optionally walking the impact of one node
    Lineage {
        /// SQL script, a file holding it, or - for stdin
        #[arg(short, long)]
        query: String,

        /// Catalog used to attribute columns and expand wildcards
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// SQL dialect (defaults to the configured one)
        #[arg(short, long, value_enum)]
        dialect: Option<Dialect>,

        /// Start node for impact analysis: TABLE.COLUMN or TABLE
        #[arg(short, long)]
        node: Option<String>,

        /// Impact direction
        #[arg(long, value_enum, default_value = "forward")]
        direction: Direction,

        /// Maximum number of levels to walk
        #[arg(long)]
        depth: Option<usize>,

        /// Render Mermaid at table level instead of column level
        #[arg(long)]
        tables: bool,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    },

    /// Generate SQL from an instruction and repair it until the policy accepts it
    Generate {
        /// Catalog file: DDL, or a JSON/YAML snapshot
        #[arg(short, long)]
        catalog: PathBuf,

        /// Natural-language instruction
        #[arg(long)]
        prompt: String,

        /// LLM provider to use
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// API key for OpenAI or Anthropic
        #[arg(short, long, env = "LLM_API_KEY")]
        api_key: Option<String>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Ollama base URL
        #[arg(long)]
        ollama_url: Option<String>,

        /// SQL dialect (defaults to the configured one)
        #[arg(short, long, value_enum)]
        dialect: Option<Dialect>,

        /// Repairs allowed after the first candidate
        #[arg(long)]
        max_retries: Option<u32>,

        /// Row cap enforced by the policy
        #[arg(long)]
        max_rows: Option<u64>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama
}

impl Provider {
    /// Get default model for provider
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI => "gpt-4",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Ollama => "llama3.2"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dialect {
    Oracle,
    Maria,
    Postgres
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml,
    Mermaid
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Forward,
    Backward
}
