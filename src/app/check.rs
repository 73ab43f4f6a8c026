//! `check`: run hand-written SQL through the policy gate.
//!
//! The SQL goes through the same state machine as generated candidates,
//! fed by a [`ScriptedGenerator`] holding that single candidate and with no
//! repair budget, so the verdict is exactly the one a generated statement
//! would get.

use std::sync::Arc;

use tracing::info;

use super::{
    convert::resolve_dialect,
    helpers::{calculate_exit_code, create_output_options, load_catalog, read_sql_input},
    types::{CheckParams, CommandOutput}
};
use crate::{
    config::{Config, PipelineConfig},
    error::AppResult,
    llm::ScriptedGenerator,
    output::format_run,
    pipeline::Pipeline
};

/// Instruction recorded for runs that validate supplied SQL
const CHECK_INSTRUCTION: &str = "validate supplied SQL";

/// Validates SQL against the catalog and policy.
///
/// # Errors
///
/// Returns an error if the catalog or SQL cannot be read, or the output
/// format does not apply to a pipeline run.
pub async fn run_check(params: CheckParams, config: Config) -> AppResult<CommandOutput> {
    let dialect = resolve_dialect(params.dialect, config.pipeline.dialect);
    let catalog = load_catalog(&params.catalog_path, dialect)?;
    let sql = read_sql_input(&params.query)?;

    let mut policy = config.policy;
    if let Some(max_rows) = params.max_rows {
        policy.max_rows = max_rows;
    }
    policy.allow_dml |= params.allow_dml;

    let pipeline_config = PipelineConfig {
        max_retries: 0,
        dialect,
        ..config.pipeline
    };
    let generator = ScriptedGenerator::new([sql]);
    let pipeline = Pipeline::new(Arc::new(generator), Arc::new(catalog), policy, pipeline_config);
    let run = pipeline.run(CHECK_INSTRUCTION).await?;
    info!(accepted = run.is_accepted(), "check finished");

    let opts = create_output_options(params.output_format, params.no_color, params.verbose);
    Ok(CommandOutput {
        exit_code: calculate_exit_code(&run),
        output:    format_run(&run, &opts)?
    })
}
