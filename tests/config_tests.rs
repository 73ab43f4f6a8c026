use sql_lineage_guard::{
    ast::SqlDialect,
    config::{Config, RestrictedColumn}
};

#[test]
fn test_empty_document_gives_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.pipeline.max_retries, 2);
    assert_eq!(config.pipeline.generation_timeout_ms, 120_000);
    assert_eq!(config.pipeline.dialect, SqlDialect::Oracle);
    assert!(!config.policy.allow_dml);
    assert_eq!(config.policy.max_rows, 1000);
    assert!(config.policy.auto_limit);
    assert_eq!(config.lineage.max_depth, 5);
    assert_eq!(config.llm.ollama_url.as_deref(), Some("http://localhost:11434"));
}

#[test]
fn test_full_document() {
    let config = Config::from_toml(
        r#"
        [llm]
        provider = "anthropic"
        model = "claude-sonnet-4-20250514"

        [pipeline]
        max_retries = 4
        dialect = "postgres"

        [policy]
        max_rows = 200
        auto_limit = false
        restricted_columns = ["EMPLOYEE.RRN_BACK", "hr.employee.salary"]
        disabled = ["POL008"]

        [policy.severity]
        POL005 = "warning"

        [lineage]
        mermaid_max_columns = 8
        "#
    )
    .unwrap();

    assert_eq!(config.llm.provider.as_deref(), Some("anthropic"));
    assert_eq!(config.pipeline.max_retries, 4);
    assert_eq!(config.pipeline.generation_timeout_ms, 120_000);
    assert_eq!(config.pipeline.dialect, SqlDialect::Postgres);
    assert_eq!(config.policy.max_rows, 200);
    assert!(!config.policy.auto_limit);
    assert_eq!(
        config.policy.restricted_columns,
        vec![
            RestrictedColumn::new("EMPLOYEE", "RRN_BACK"),
            RestrictedColumn::new("HR.EMPLOYEE", "SALARY"),
        ]
    );
    assert!(config.policy.is_restricted("employee", "salary"));
    assert!(!config.policy.is_restricted("DEPT", "SALARY"));
    assert_eq!(config.policy.disabled, vec!["POL008".to_string()]);
    assert_eq!(config.policy.severity.get("POL005").map(String::as_str), Some("warning"));
    assert_eq!(config.lineage.mermaid_max_columns, 8);
    assert_eq!(config.lineage.max_depth, 5);
}

#[test]
fn test_malformed_restricted_column_is_rejected() {
    let result = Config::from_toml("[policy]\nrestricted_columns = [\"RRN_BACK\"]\n");
    assert!(result.is_err());
}

#[test]
fn test_environment_wins_over_file() {
    let mut config = Config::from_toml("[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n").unwrap();
    config
        .apply_env(|key| match key {
            "LLM_PROVIDER" => Some("openai".into()),
            "LLM_API_KEY" => Some("sk-test".into()),
            _ => None
        })
        .unwrap();
    assert_eq!(config.llm.provider.as_deref(), Some("openai"));
    assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.llm.model.as_deref(), Some("llama3.2"));
}

#[test]
fn test_unknown_dialect_in_environment() {
    let mut config = Config::default();
    assert!(
        config
            .apply_env(|key| (key == "SQL_GUARD_DIALECT").then(|| "sqlite".into()))
            .is_err()
    );
}
