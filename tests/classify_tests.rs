use sql_lineage_guard::{
    ast::SqlDialect,
    classify::{StatementKind, classify},
    parser::parse
};

fn kind(sql: &str, dialect: SqlDialect) -> StatementKind {
    classify(&parse(sql, dialect).unwrap())
}

#[test]
fn test_nested_reads_stay_select() {
    let sql = "WITH T AS (SELECT DEPT_ID FROM EMPLOYEE) \
               SELECT D.NAME FROM DEPT D WHERE D.ID IN (SELECT DEPT_ID FROM T) \
               UNION SELECT NAME FROM (SELECT NAME FROM ARCHIVE) A";
    assert_eq!(kind(sql, SqlDialect::Postgres), StatementKind::Select);
}

#[test]
fn test_dml_under_cte_is_dml() {
    let sql = "WITH SRC AS (SELECT EMP_ID FROM EMPLOYEE) INSERT INTO ARCHIVE (ID) SELECT EMP_ID FROM SRC";
    assert_eq!(kind(sql, SqlDialect::Postgres), StatementKind::Dml);
}

#[test]
fn test_privilege_is_monotone_under_wrapping() {
    // each wrapper keeps the inner statement reachable; the verdict may only
    // stay the same or grow
    let inner = [
        ("SELECT ID FROM T", StatementKind::Select),
        ("INSERT INTO T (ID) SELECT ID FROM U", StatementKind::Dml),
        ("UPDATE T SET ID = 1 WHERE ID = 2", StatementKind::Dml),
        ("DELETE FROM T WHERE ID = 1", StatementKind::Dml),
        ("DROP TABLE T", StatementKind::Ddl)
    ];
    for (sql, inner_kind) in inner {
        assert!(kind(sql, SqlDialect::Postgres) >= inner_kind, "{}", sql);
    }

    let wrapped = kind(
        "WITH X AS (SELECT ID FROM U) INSERT INTO T (ID) SELECT ID FROM X",
        SqlDialect::Postgres
    );
    assert!(wrapped >= kind("SELECT ID FROM U", SqlDialect::Postgres));
    assert_eq!(wrapped, StatementKind::Dml);
}

#[test]
fn test_merge_and_ctas() {
    let merge = "MERGE INTO DIM D USING STG S ON (D.ID = S.ID) \
                 WHEN MATCHED THEN UPDATE SET D.NAME = S.NAME";
    assert_eq!(kind(merge, SqlDialect::Oracle), StatementKind::Dml);
    assert_eq!(
        kind("CREATE TABLE COPY AS SELECT ID FROM T", SqlDialect::Postgres),
        StatementKind::Ddl
    );
}

#[test]
fn test_select_into_creates_a_table() {
    assert_eq!(
        kind("SELECT ID INTO EMP_COPY FROM EMP LIMIT 5", SqlDialect::Postgres),
        StatementKind::Ddl
    );
    assert_eq!(
        kind(
            "SELECT ID FROM DEPT WHERE ID IN (SELECT DEPT_ID FROM EMP) LIMIT 5",
            SqlDialect::Postgres
        ),
        StatementKind::Select
    );
}

#[test]
fn test_unknown_is_never_read_only() {
    let kind = kind("SET search_path TO public", SqlDialect::Postgres);
    assert_eq!(kind, StatementKind::Unknown);
    assert!(!kind.is_read_only());
}
