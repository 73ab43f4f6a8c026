//! `generate`: the full generation-validation-repair loop against an LLM.

use std::{sync::Arc, time::Duration};

use tracing::info;

use super::{
    convert::{resolve_dialect, resolve_provider},
    helpers::{
        build_llm_provider, calculate_exit_code, create_output_options, get_effective_model,
        get_effective_ollama_url, load_catalog, spinner
    },
    types::{CommandOutput, GenerateParams}
};
use crate::{
    config::{Config, PipelineConfig},
    error::AppResult,
    llm::LlmClient,
    output::format_run,
    pipeline::Pipeline
};

/// Generates SQL for the instruction and gates it through the policy.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded, the provider is
/// misconfigured, or the provider fails; a provider failure ends the run
/// without spending the repair budget.
///
/// # Example
///
/// ```no_run
/// use sql_lineage_guard::{
///     app::{GenerateParams, run_generate},
///     cli::{Format, Provider},
///     config::Config
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let params = GenerateParams {
///     catalog_path:  "schema.sql".into(),
///     prompt:        "names of employees hired this year".to_string(),
///     provider:      Some(Provider::Ollama),
///     api_key:       None,
///     model:         None,
///     ollama_url:    None,
///     dialect:       None,
///     max_retries:   None,
///     max_rows:      Some(100),
///     output_format: Format::Text,
///     verbose:       false,
///     no_color:      false
/// };
/// let result = run_generate(params, Config::default()).await?;
/// println!("{}", result.output);
/// # Ok(())
/// # }
/// ```
pub async fn run_generate(params: GenerateParams, config: Config) -> AppResult<CommandOutput> {
    let dialect = resolve_dialect(params.dialect, config.pipeline.dialect);
    let catalog = load_catalog(&params.catalog_path, dialect)?;
    let opts = create_output_options(params.output_format, params.no_color, params.verbose);

    let provider = resolve_provider(params.provider, config.llm.provider.as_deref())?;
    let api_key = params.api_key.or(config.llm.api_key);
    let model = get_effective_model(params.model, config.llm.model, &provider);
    let ollama_url = get_effective_ollama_url(params.ollama_url, config.llm.ollama_url);
    let llm_provider = build_llm_provider(provider, api_key, model, ollama_url)?;

    let mut policy = config.policy;
    if let Some(max_rows) = params.max_rows {
        policy.max_rows = max_rows;
    }
    let pipeline_config = PipelineConfig {
        max_retries: params.max_retries.unwrap_or(config.pipeline.max_retries),
        dialect,
        ..config.pipeline
    };

    let client = LlmClient::with_timeout(
        llm_provider,
        Duration::from_millis(pipeline_config.generation_timeout_ms)
    );
    let message = format!("Generating SQL with {}...", client.provider().name());
    let pipeline = Pipeline::new(Arc::new(client), Arc::new(catalog), policy, pipeline_config);

    let pb = spinner(message);
    let result = pipeline.run(&params.prompt).await;
    pb.finish_and_clear();
    let run = result?;
    info!(
        accepted = run.is_accepted(),
        attempts = run.attempt_count(),
        "generation finished"
    );

    Ok(CommandOutput {
        exit_code: calculate_exit_code(&run),
        output:    format_run(&run, &opts)?
    })
}
