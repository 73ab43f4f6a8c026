//! Conversions from CLI-facing enums to domain types.

use clap::ValueEnum;

use crate::{
    ast::SqlDialect,
    cli::{Dialect, Direction, Format, Provider},
    error::{AppResult, config_error},
    lineage::ImpactDirection,
    output::OutputFormat
};

/// Converts a CLI dialect to the parser dialect.
///
/// # Example
///
/// ```
/// use sql_lineage_guard::{app::convert_dialect, ast::SqlDialect, cli::Dialect};
///
/// assert_eq!(convert_dialect(Dialect::Maria), SqlDialect::Maria);
/// ```
pub fn convert_dialect(dialect: Dialect) -> SqlDialect {
    match dialect {
        Dialect::Oracle => SqlDialect::Oracle,
        Dialect::Maria => SqlDialect::Maria,
        Dialect::Postgres => SqlDialect::Postgres
    }
}

/// Converts a CLI format to the output format.
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml,
        Format::Mermaid => OutputFormat::Mermaid
    }
}

pub fn convert_direction(direction: Direction) -> ImpactDirection {
    match direction {
        Direction::Forward => ImpactDirection::Forward,
        Direction::Backward => ImpactDirection::Backward
    }
}

/// Resolves the provider: CLI flag, then the configured name, then Ollama.
///
/// # Errors
///
/// Returns an error if the configured provider name is not recognized.
pub fn resolve_provider(cli: Option<Provider>, configured: Option<&str>) -> AppResult<Provider> {
    if let Some(provider) = cli {
        return Ok(provider);
    }
    match configured {
        Some(name) => Provider::from_str(name, true)
            .map_err(|_| config_error(format!("Unknown LLM provider '{}'", name))),
        None => Ok(Provider::Ollama)
    }
}

/// Resolves the dialect: CLI flag, then the configured one.
pub fn resolve_dialect(cli: Option<Dialect>, configured: SqlDialect) -> SqlDialect {
    cli.map_or(configured, convert_dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_dialect() {
        assert_eq!(convert_dialect(Dialect::Oracle), SqlDialect::Oracle);
        assert_eq!(convert_dialect(Dialect::Postgres), SqlDialect::Postgres);
    }

    #[test]
    fn test_convert_format_mermaid() {
        assert!(matches!(convert_format(Format::Mermaid), OutputFormat::Mermaid));
    }

    #[test]
    fn test_resolve_provider_precedence() {
        assert_eq!(
            resolve_provider(Some(Provider::OpenAI), Some("anthropic")).unwrap(),
            Provider::OpenAI
        );
        assert_eq!(resolve_provider(None, Some("Anthropic")).unwrap(), Provider::Anthropic);
        assert_eq!(resolve_provider(None, None).unwrap(), Provider::Ollama);
        assert!(resolve_provider(None, Some("bard")).is_err());
    }

    #[test]
    fn test_resolve_dialect_falls_back_to_config() {
        assert_eq!(resolve_dialect(None, SqlDialect::Maria), SqlDialect::Maria);
        assert_eq!(
            resolve_dialect(Some(Dialect::Postgres), SqlDialect::Maria),
            SqlDialect::Postgres
        );
    }
}
