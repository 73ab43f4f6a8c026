//! Integration tests for the sql-lineage-guard binary.

use std::{fs, path::PathBuf};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated working directory holding a Postgres DDL catalog
struct Workspace {
    dir: TempDir
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("schema.sql"),
            "CREATE TABLE EMPLOYEE (EMP_ID INT PRIMARY KEY, EMP_NAME VARCHAR(100), RRN_BACK VARCHAR(7));\n\
             CREATE TABLE ARCHIVE (ID INT, NAME VARCHAR(100));\n"
        )
        .unwrap();
        Self {
            dir
        }
    }

    fn catalog(&self) -> String {
        self.path("schema.sql").to_string_lossy().into_owned()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("sql-lineage-guard");
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env_remove("LLM_API_KEY")
            .env_remove("LLM_PROVIDER")
            .env_remove("LLM_MODEL")
            .env_remove("SQL_GUARD_DIALECT")
            .env_remove("SQL_GUARD_MAX_ROWS")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_check_accepts_and_limits() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--no-color", "check", "-c", &ws.catalog(), "-d", "postgres"])
        .args(["-q", "SELECT EMP_ID, EMP_NAME FROM EMPLOYEE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ACCEPTED"))
        .stdout(predicate::str::contains("LIMIT 1000"));
}

#[test]
fn test_check_rejects_wildcard() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--no-color", "check", "-c", &ws.catalog(), "-d", "postgres"])
        .args(["-q", "SELECT * FROM EMPLOYEE"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("POL002"));
}

#[test]
fn test_check_reads_stdin() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--no-color", "check", "-c", &ws.catalog(), "-d", "postgres", "-q", "-"])
        .args(["--max-rows", "50", "-f", "json"])
        .write_stdin("SELECT EMP_ID FROM EMPLOYEE\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("LIMIT 50"));
}

#[test]
fn test_check_dml_needs_flag() {
    let ws = Workspace::new();
    let update = "UPDATE EMPLOYEE SET EMP_NAME = 'X' WHERE EMP_ID = 1";
    ws.cmd()
        .args(["--no-color", "check", "-c", &ws.catalog(), "-d", "postgres", "-q", update])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("POL001"));
    ws.cmd()
        .args(["--no-color", "check", "-c", &ws.catalog(), "-d", "postgres", "-q", update])
        .arg("--allow-dml")
        .assert()
        .success();
}

#[test]
fn test_check_mermaid_is_an_error() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["check", "-c", &ws.catalog(), "-d", "postgres", "-f", "mermaid"])
        .args(["-q", "SELECT EMP_ID FROM EMPLOYEE"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_check_missing_catalog() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["check", "-c", "/nonexistent/schema.sql", "-q", "SELECT 1 FROM DUAL"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_lineage_json_and_mermaid() {
    let ws = Workspace::new();
    fs::write(
        ws.path("load.sql"),
        "INSERT INTO ARCHIVE (ID, NAME) SELECT EMP_ID, UPPER(EMP_NAME) FROM EMPLOYEE;\n"
    )
    .unwrap();
    let script = ws.path("load.sql").to_string_lossy().into_owned();

    ws.cmd()
        .args(["lineage", "-q", &script, "-d", "postgres", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"edges\""))
        .stdout(predicate::str::contains("ARCHIVE.NAME"))
        .stdout(predicate::str::contains("transform"));

    ws.cmd()
        .args(["lineage", "-q", &script, "-d", "postgres", "-f", "mermaid", "--tables"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("flowchart LR"));
}

#[test]
fn test_lineage_impact_text() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--no-color", "lineage", "-d", "postgres", "-n", "employee.emp_id"])
        .args(["-q", "INSERT INTO ARCHIVE (ID) SELECT EMP_ID FROM EMPLOYEE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nodes downstream of EMPLOYEE.EMP_ID"))
        .stdout(predicate::str::contains("ARCHIVE.ID"));
}

#[test]
fn test_generate_requires_api_key() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["generate", "-c", &ws.catalog(), "--prompt", "all employee ids", "-p", "openai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key required"));
}

#[test]
fn test_help_lists_commands() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("lineage"))
        .stdout(predicate::str::contains("generate"));
}
