//! Helper functions for CLI operations.
//!
//! Reading SQL input, loading the catalog, mapping runs to exit codes and
//! assembling the LLM provider from CLI flags and configuration.

use std::{
    fs::read_to_string,
    io::{self, Read},
    path::Path,
    time::Duration
};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::convert::convert_format;
use crate::{
    ast::SqlDialect,
    catalog::SchemaCatalog,
    cli::{Format, Provider},
    error::{AppResult, config_error, file_read_error},
    llm::LlmProvider,
    output::OutputOptions,
    pipeline::PipelineRun
};

/// Exit code of an accepted run
pub const EXIT_ACCEPTED: i32 = 0;

/// Exit code of a run that ended without accepted SQL
pub const EXIT_REJECTED: i32 = 2;

/// Maps a finished run onto the process exit code.
///
/// # Example
///
/// ```
/// use sql_lineage_guard::{app::calculate_exit_code, pipeline::PipelineRun};
///
/// let run = PipelineRun {
///     attempts: Vec::new(),
///     accepted: None
/// };
/// assert_eq!(calculate_exit_code(&run), 2);
/// ```
pub fn calculate_exit_code(run: &PipelineRun) -> i32 {
    if run.is_accepted() {
        EXIT_ACCEPTED
    } else {
        EXIT_REJECTED
    }
}

/// Reads SQL from stdin (`-`), from a file, or takes the argument as SQL.
///
/// An argument naming an existing file is read; anything else is treated
/// as the SQL text itself.
///
/// # Errors
///
/// Returns an error if stdin or the file cannot be read, or the input is
/// empty.
pub fn read_sql_input(arg: &str) -> AppResult<String> {
    let sql = if arg == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| file_read_error("stdin", e))?;
        buffer
    } else if Path::new(arg).is_file() {
        debug!(path = arg, "reading SQL from file");
        read_to_string(arg).map_err(|e| file_read_error(arg, e))?
    } else {
        arg.to_string()
    };

    if sql.trim().is_empty() {
        return Err(config_error("No SQL given"));
    }
    Ok(sql)
}

/// Loads the catalog snapshot; DDL files are parsed with `dialect`.
pub fn load_catalog(path: &Path, dialect: SqlDialect) -> AppResult<SchemaCatalog> {
    let mut catalog = SchemaCatalog::load(path, dialect)?;
    catalog.dialect = dialect;
    debug!(
        path = %path.display(),
        tables = catalog.len(),
        dialect = %dialect,
        "catalog loaded"
    );
    Ok(catalog)
}

/// Creates output options from CLI parameters.
pub fn create_output_options(format: Format, no_color: bool, verbose: bool) -> OutputOptions {
    OutputOptions {
        format: convert_format(format),
        colored: !no_color,
        verbose
    }
}

/// Builds an LLM provider configuration from CLI parameters.
///
/// # Errors
///
/// Returns an error if a cloud provider is selected without an API key.
pub fn build_llm_provider(
    provider: Provider,
    api_key: Option<String>,
    model: String,
    ollama_url: String
) -> AppResult<LlmProvider> {
    match provider {
        Provider::OpenAI => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for OpenAI (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::OpenAI {
                api_key: key,
                model
            })
        }
        Provider::Anthropic => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for Anthropic (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::Anthropic {
                api_key: key,
                model
            })
        }
        Provider::Ollama => Ok(LlmProvider::Ollama {
            base_url: ollama_url,
            model
        })
    }
}

/// Gets the effective model name: explicit flag, then configuration, then
/// the provider default.
pub fn get_effective_model(
    model: Option<String>,
    config_model: Option<String>,
    provider: &Provider
) -> String {
    model
        .or(config_model)
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Gets the effective Ollama URL: explicit flag, then configuration, then
/// the local default.
pub fn get_effective_ollama_url(url: Option<String>, config_url: Option<String>) -> String {
    url.or(config_url)
        .unwrap_or_else(|| String::from("http://localhost:11434"))
}

/// Spinner shown while waiting on the text generator
pub fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
