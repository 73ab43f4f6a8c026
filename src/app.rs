//! Application logic for the `sql-lineage-guard` CLI.
//!
//! Each subcommand lives in its own module and returns a [`CommandOutput`]
//! instead of printing, so commands can be driven from tests.
//!
//! | Command | Module | Exit code |
//! |---------|--------|-----------|
//! | `check` | `check` | 0 accepted, 2 rejected |
//! | `lineage` | `lineage` | 0 |
//! | `generate` | `generate` | 0 accepted, 2 rejected |
//!
//! Any error (unreadable input, bad configuration, provider failure) exits
//! with 1.

mod check;
mod convert;
mod generate;
mod helpers;
mod lineage;
mod types;

pub use check::run_check;
pub use convert::{convert_dialect, convert_direction, convert_format, resolve_dialect, resolve_provider};
pub use generate::run_generate;
pub use helpers::{
    EXIT_ACCEPTED, EXIT_REJECTED, build_llm_provider, calculate_exit_code, create_output_options,
    get_effective_model, get_effective_ollama_url, load_catalog, read_sql_input
};
pub use lineage::{resolve_node, run_lineage};
pub use types::{CheckParams, CommandOutput, GenerateParams, LineageParams};

use crate::{cli::Commands, config::Config, error::AppResult};

/// Runs one subcommand with the loaded configuration.
pub async fn run_command(
    command: Commands,
    verbose: bool,
    no_color: bool,
    config: Config
) -> AppResult<CommandOutput> {
    match command {
        Commands::Check {
            catalog,
            query,
            dialect,
            max_rows,
            allow_dml,
            output_format
        } => {
            let params = CheckParams {
                catalog_path: catalog,
                query,
                dialect,
                max_rows,
                allow_dml,
                output_format,
                verbose,
                no_color
            };
            run_check(params, config).await
        }
        Commands::Lineage {
            query,
            catalog,
            dialect,
            node,
            direction,
            depth,
            tables,
            output_format
        } => {
            let params = LineageParams {
                query,
                catalog_path: catalog,
                dialect,
                node,
                direction,
                depth,
                tables,
                output_format,
                verbose,
                no_color
            };
            run_lineage(params, config)
        }
        Commands::Generate {
            catalog,
            prompt,
            provider,
            api_key,
            model,
            ollama_url,
            dialect,
            max_retries,
            max_rows,
            output_format
        } => {
            let params = GenerateParams {
                catalog_path: catalog,
                prompt,
                provider,
                api_key,
                model,
                ollama_url,
                dialect,
                max_retries,
                max_rows,
                output_format,
                verbose,
                no_color
            };
            run_generate(params, config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::cli::{Direction, Format};

    const DDL: &str = "CREATE TABLE EMPLOYEE (\
        EMP_ID INT PRIMARY KEY, \
        EMP_NAME VARCHAR(100), \
        RRN_BACK VARCHAR(20))";

    fn catalog_file() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".sql").unwrap();
        file.write_all(DDL.as_bytes()).unwrap();
        file
    }

    fn check_params(catalog: &NamedTempFile, query: &str) -> CheckParams {
        CheckParams {
            catalog_path:  catalog.path().to_path_buf(),
            query:         query.to_string(),
            dialect:       Some(crate::cli::Dialect::Postgres),
            max_rows:      None,
            allow_dml:     false,
            output_format: Format::Text,
            verbose:       false,
            no_color:      true
        }
    }

    #[tokio::test]
    async fn test_check_accepts_with_limit_rewrite() {
        let catalog = catalog_file();
        let result = run_check(check_params(&catalog, "SELECT EMP_ID FROM EMPLOYEE"), Config::default())
            .await
            .unwrap();
        assert_eq!(result.exit_code, EXIT_ACCEPTED);
        assert!(result.output.contains("SELECT EMP_ID FROM EMPLOYEE LIMIT 1000"));
    }

    #[tokio::test]
    async fn test_check_rejects_wildcard() {
        let catalog = catalog_file();
        let result = run_check(check_params(&catalog, "SELECT * FROM EMPLOYEE"), Config::default())
            .await
            .unwrap();
        assert_eq!(result.exit_code, EXIT_REJECTED);
        assert!(result.output.contains("POL002"));
    }

    #[tokio::test]
    async fn test_check_rejects_dml_unless_allowed() {
        let catalog = catalog_file();
        let sql = "UPDATE EMPLOYEE SET EMP_NAME = 'X' WHERE EMP_ID = 1";
        let rejected = run_check(check_params(&catalog, sql), Config::default())
            .await
            .unwrap();
        assert_eq!(rejected.exit_code, EXIT_REJECTED);

        let mut params = check_params(&catalog, sql);
        params.allow_dml = true;
        let accepted = run_check(params, Config::default()).await.unwrap();
        assert_eq!(accepted.exit_code, EXIT_ACCEPTED);
    }

    #[test]
    fn test_lineage_impact_json() {
        let params = LineageParams {
            query:         "INSERT INTO B (X) SELECT A.X FROM A; INSERT INTO C (X) SELECT B.X FROM B"
                .to_string(),
            catalog_path:  None,
            dialect:       Some(crate::cli::Dialect::Postgres),
            node:          Some("a.x".to_string()),
            direction:     Direction::Forward,
            depth:         None,
            tables:        false,
            output_format: Format::Json,
            verbose:       false,
            no_color:      true
        };
        let result = run_lineage(params, Config::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(json["found"], true);
        assert_eq!(json["levels"][0][0]["qualified_name"], "B.X");
        assert_eq!(json["levels"][1][0]["qualified_name"], "C.X");
    }
}
