//! # SQL Lineage Guard
//!
//! Policy-gated SQL generation and table/column lineage for Oracle, MariaDB
//! and PostgreSQL.
//!
//! Every statement, generated or hand-written, passes the same gate: it is
//! parsed, classified by the most privileged operation anywhere in its tree,
//! and checked against the catalog and security policy. Generated candidates
//! that fail are sent back to the model with the violations, a bounded
//! number of times.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate hand-written SQL
//! sql-lineage-guard check -c schema.sql -q "SELECT EMP_ID FROM EMPLOYEE"
//!
//! # Column lineage of a script, as a Mermaid chart
//! sql-lineage-guard lineage -q etl.sql -c schema.sql -f mermaid
//!
//! # What depends on a column
//! sql-lineage-guard lineage -q etl.sql --node EMPLOYEE.EMP_NAME --direction forward
//!
//! # Generate SQL with a local model
//! sql-lineage-guard generate -c schema.sql --prompt "ten newest hires" --provider ollama
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`LLM_API_KEY`, `SQL_GUARD_DIALECT`, etc.)
//! 3. `.sql-lineage-guard.toml` in current directory
//! 4. `~/.config/sql-lineage-guard/config.toml`
//!
//! # Policy Rules
//!
//! | ID | Name | Severity |
//! |----|------|----------|
//! | POL001 | DML/DDL forbidden | Critical |
//! | POL002 | Explicit columns required | Critical |
//! | POL003 | Row limit exceeded/missing | Critical |
//! | POL004 | Restricted column accessed | Critical |
//! | POL005 | Undefined object | Critical |
//! | POL006 | Unclassifiable statement | Critical |
//! | POL007 | UPDATE/DELETE without WHERE | Critical |
//! | POL008 | Join without condition | Warning |
//!
//! # Exit Codes
//!
//! - `0` - SQL accepted (or lineage extracted)
//! - `1` - Error: unreadable input, bad configuration, provider failure
//! - `2` - SQL rejected by the policy gate
//!
//! # Logging
//!
//! Logs go to stderr and follow `RUST_LOG`; the default level is `warn`,
//! `-v` raises it to `debug`.

use std::process;

use clap::Parser;
use sql_lineage_guard::{app::run_command, cli::Cli, config::Config, error::AppResult};
use tokio::main;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> AppResult<i32> {
    let config = Config::load()?;
    let result = run_command(cli.command, cli.verbose, cli.no_color, config).await?;
    println!("{}", result.output);
    Ok(result.exit_code)
}
