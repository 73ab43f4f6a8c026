//! Table and column lineage.
//!
//! [`extract`] turns one statement into [`LineageEdge`]s; [`build`] indexes
//! edges into a [`LineageGraph`] and [`impact`] walks it.
//!
//! # Node naming
//!
//! | Node | Name |
//! |------|------|
//! | Physical column | `EMPLOYEE.EMP_ID` |
//! | CTE or derived-table column | `<ALIAS>.<COLUMN>` |
//! | Result column of a SELECT | `RESULT#<statement id>.<COLUMN>` |
//! | Join/filter sink | table node: `RESULT#<id>` or the written table |
//!
//! Anything that cannot be turned into an edge (unknown statements,
//! wildcards over tables the catalog does not know, unattributable columns)
//! sets [`LineageExtraction::partial`] instead of producing a guess.
//!
//! # Example
//!
//! ```
//! use sql_lineage_guard::{
//!     ast::SqlDialect,
//!     lineage::{ImpactDirection, LineageNode, build, extract, impact},
//!     parser::parse
//! };
//!
//! let stmt = parse(
//!     "INSERT INTO EMP_ARCHIVE (ID, NAME) SELECT E.EMP_ID, UPPER(E.EMP_NAME) FROM EMPLOYEE E",
//!     SqlDialect::Postgres
//! )
//! .unwrap();
//! let graph = build(extract(&stmt).edges);
//!
//! let downstream = impact(
//!     &graph,
//!     &LineageNode::column("EMPLOYEE", "EMP_NAME"),
//!     ImpactDirection::Forward,
//!     5
//! );
//! assert_eq!(downstream, vec![vec![LineageNode::column("EMP_ARCHIVE", "NAME")]]);
//! ```

mod extract;
mod graph;
mod mermaid;
mod types;

pub use graph::{LineageExport, LineageGraph, build, impact};
pub use mermaid::{column_flowchart, table_flowchart};
use tracing::debug;
pub use types::{
    EdgeKind, ImpactDirection, LineageEdge, LineageExtraction, LineageNode, NodeType, RESULT_PREFIX
};

use crate::{ast::Statement, catalog::SchemaCatalog};

/// Extract edges from `stmt` as written.
///
/// Wildcards over physical tables cannot be expanded without a catalog and
/// mark the result partial.
pub fn extract(stmt: &Statement) -> LineageExtraction {
    let empty = SchemaCatalog::default();
    extract::Extractor::new(&empty, false, stmt).run(stmt)
}

/// Extract edges using `catalog` to attribute unqualified columns and
/// expand wildcards. Physical columns the catalog does not list are left
/// out and noted.
pub fn extract_with_catalog(stmt: &Statement, catalog: &SchemaCatalog) -> LineageExtraction {
    let resolved = catalog.resolve_columns(stmt);
    extract::Extractor::new(catalog, true, &resolved).run(&resolved)
}

/// Extract and concatenate the edges of several statements
pub fn extract_batch(stmts: &[Statement], catalog: Option<&SchemaCatalog>) -> LineageExtraction {
    let mut all = LineageExtraction::default();
    for stmt in stmts {
        let extraction = match catalog {
            Some(catalog) => extract_with_catalog(stmt, catalog),
            None => extract(stmt)
        };
        debug!(
            statement = stmt.id,
            edges = extraction.edges.len(),
            partial = extraction.partial,
            "lineage extracted"
        );
        all.merge(extraction);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{MergeBranch, SqlDialect},
        catalog::{ColumnDescriptor, TableDescriptor},
        parser::parse
    };

    fn edges(sql: &str) -> Vec<(String, String, EdgeKind)> {
        let stmt = parse(sql, SqlDialect::Postgres).unwrap();
        extract(&stmt)
            .edges
            .into_iter()
            .map(|e| (e.source.to_string(), e.target.to_string(), e.kind))
            .collect()
    }

    fn has(found: &[(String, String, EdgeKind)], source: &str, target: &str, kind: EdgeKind) -> bool {
        found
            .iter()
            .any(|(s, t, k)| s == source && t == target && *k == kind)
    }

    #[test]
    fn test_select_kinds() {
        let found = edges(
            "SELECT E.EMP_ID, UPPER(E.EMP_NAME) AS NAME, SUM(E.SALARY) AS TOTAL \
             FROM EMPLOYEE E GROUP BY E.EMP_ID, E.EMP_NAME"
        );
        assert!(has(&found, "EMPLOYEE.EMP_ID", "RESULT#1.EMP_ID", EdgeKind::DirectCopy));
        assert!(has(&found, "EMPLOYEE.EMP_NAME", "RESULT#1.NAME", EdgeKind::Transform));
        assert!(has(&found, "EMPLOYEE.SALARY", "RESULT#1.TOTAL", EdgeKind::Aggregate));
    }

    #[test]
    fn test_join_and_filter_contributions() {
        let found = edges(
            "SELECT E.EMP_NAME FROM EMPLOYEE E JOIN DEPT D ON E.DEPT_ID = D.ID WHERE D.REGION = 'EU'"
        );
        assert!(has(&found, "DEPT.ID", "RESULT#1", EdgeKind::Join));
        assert!(has(&found, "EMPLOYEE.DEPT_ID", "RESULT#1", EdgeKind::Join));
        assert!(has(&found, "DEPT.REGION", "RESULT#1", EdgeKind::Filter));
    }

    #[test]
    fn test_insert_positional_mapping() {
        let found = edges("INSERT INTO ARCHIVE (ID, LABEL) SELECT EMP_ID, EMP_NAME FROM EMPLOYEE");
        assert!(has(&found, "EMPLOYEE.EMP_ID", "ARCHIVE.ID", EdgeKind::DirectCopy));
        assert!(has(&found, "EMPLOYEE.EMP_NAME", "ARCHIVE.LABEL", EdgeKind::DirectCopy));
    }

    #[test]
    fn test_merge_branches_tagged() {
        let stmt = parse(
            "MERGE INTO DIM_CUSTOMER D USING STG_CUSTOMER S ON (D.ID = S.ID) \
             WHEN MATCHED THEN UPDATE SET D.NAME = S.NAME \
             WHEN NOT MATCHED THEN INSERT (ID, NAME) VALUES (S.ID, S.NAME)",
            SqlDialect::Oracle
        )
        .unwrap();
        let extraction = extract(&stmt);
        let name_edges: Vec<_> = extraction
            .edges
            .iter()
            .filter(|e| e.target == LineageNode::column("DIM_CUSTOMER", "NAME"))
            .collect();
        assert_eq!(name_edges.len(), 2);
        assert_eq!(name_edges[0].branch, Some(MergeBranch::Matched));
        assert_eq!(name_edges[1].branch, Some(MergeBranch::NotMatched));
        assert!(name_edges.iter().all(|e| e.producing_statement_id == 1));
    }

    #[test]
    fn test_merge_not_matched_by_source_branch() {
        let stmt = parse(
            "MERGE INTO DIM_CUSTOMER D USING STG_CUSTOMER S ON D.ID = S.ID \
             WHEN MATCHED THEN UPDATE SET D.NAME = S.NAME \
             WHEN NOT MATCHED BY SOURCE THEN UPDATE SET D.ACTIVE = D.ACTIVE - 1",
            SqlDialect::Postgres
        )
        .unwrap();
        let extraction = extract(&stmt);
        let active: Vec<_> = extraction
            .edges
            .iter()
            .filter(|e| e.target == LineageNode::column("DIM_CUSTOMER", "ACTIVE"))
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].branch, Some(MergeBranch::NotMatchedBySource));
        assert!(active[0].to_string().ends_with("(WHEN NOT MATCHED BY SOURCE)"));
    }

    #[test]
    fn test_merge_insert_without_columns() {
        let stmt = parse(
            "MERGE INTO DIM_CUSTOMER D USING STG_CUSTOMER S ON D.ID = S.ID \
             WHEN MATCHED THEN UPDATE SET D.NAME = S.NAME \
             WHEN NOT MATCHED THEN INSERT VALUES (S.ID, UPPER(S.NAME))",
            SqlDialect::Postgres
        )
        .unwrap();

        let bare = extract(&stmt);
        assert!(bare.partial);
        assert!(bare.notes.iter().any(|n| n.contains("without a column list")));
        assert!(bare.edges.iter().all(|e| e.branch != Some(MergeBranch::NotMatched)));

        let catalog = SchemaCatalog::new(SqlDialect::Postgres)
            .with_table(TableDescriptor::new(
                "DIM_CUSTOMER",
                vec![ColumnDescriptor::new("ID", "INT"), ColumnDescriptor::new("NAME", "TEXT")]
            ))
            .with_table(TableDescriptor::new(
                "STG_CUSTOMER",
                vec![ColumnDescriptor::new("ID", "INT"), ColumnDescriptor::new("NAME", "TEXT")]
            ));
        let mapped = extract_with_catalog(&stmt, &catalog);
        assert!(!mapped.partial, "{:?}", mapped.notes);
        let inserted: Vec<_> = mapped
            .edges
            .iter()
            .filter(|e| e.branch == Some(MergeBranch::NotMatched))
            .map(|e| (e.source.to_string(), e.target.to_string(), e.kind))
            .collect();
        assert_eq!(
            inserted,
            vec![
                ("STG_CUSTOMER.ID".to_string(), "DIM_CUSTOMER.ID".to_string(), EdgeKind::DirectCopy),
                ("STG_CUSTOMER.NAME".to_string(), "DIM_CUSTOMER.NAME".to_string(), EdgeKind::Transform),
            ]
        );
    }

    #[test]
    fn test_repeated_edges_kept_once() {
        let stmt = parse("SELECT A.X AS V FROM A UNION SELECT A.X FROM A", SqlDialect::Postgres).unwrap();
        let extraction = extract(&stmt);
        assert_eq!(extraction.edges.len(), 1);
        assert_eq!(extraction.edges[0].target, LineageNode::column("RESULT#1", "V"));
    }

    #[test]
    fn test_cte_is_an_intermediate() {
        let found = edges(
            "WITH T AS (SELECT DEPT_ID, SUM(SALARY) AS TOTAL FROM EMPLOYEE GROUP BY DEPT_ID) \
             SELECT T.TOTAL FROM T"
        );
        assert!(has(&found, "EMPLOYEE.SALARY", "T.TOTAL", EdgeKind::Aggregate));
        assert!(has(&found, "T.TOTAL", "RESULT#1.TOTAL", EdgeKind::DirectCopy));
    }

    #[test]
    fn test_union_maps_positionally() {
        let found = edges("SELECT A.X AS V FROM A UNION ALL SELECT B.Y FROM B");
        assert!(has(&found, "A.X", "RESULT#1.V", EdgeKind::DirectCopy));
        assert!(has(&found, "B.Y", "RESULT#1.V", EdgeKind::DirectCopy));
    }

    #[test]
    fn test_ctas_targets_created_table() {
        let found = edges("CREATE TABLE HIGH_EARNERS AS SELECT ID, SAL FROM EMPLOYEE WHERE SAL > 1000");
        assert!(has(&found, "EMPLOYEE.SAL", "HIGH_EARNERS.SAL", EdgeKind::DirectCopy));
        assert!(has(&found, "EMPLOYEE.SAL", "HIGH_EARNERS", EdgeKind::Filter));
    }

    #[test]
    fn test_wildcard_needs_catalog() {
        let stmt = parse("SELECT * FROM EMPLOYEE", SqlDialect::Postgres).unwrap();
        let bare = extract(&stmt);
        assert!(bare.partial);
        assert!(bare.edges.is_empty());

        let catalog = SchemaCatalog::new(SqlDialect::Postgres).with_table(TableDescriptor::new(
            "EMPLOYEE",
            vec![ColumnDescriptor::new("EMP_ID", "INT"), ColumnDescriptor::new("EMP_NAME", "TEXT")]
        ));
        let expanded = extract_with_catalog(&stmt, &catalog);
        assert!(!expanded.partial);
        assert_eq!(expanded.edges.len(), 2);
        assert_eq!(expanded.edges[1].target, LineageNode::column("RESULT#1", "EMP_NAME"));
    }

    #[test]
    fn test_catalog_never_fabricates_nodes() {
        let catalog = SchemaCatalog::new(SqlDialect::Postgres).with_table(TableDescriptor::new(
            "EMPLOYEE",
            vec![ColumnDescriptor::new("EMP_ID", "INT")]
        ));
        let stmt = parse("SELECT EMP_ID, BONUS FROM EMPLOYEE", SqlDialect::Postgres).unwrap();
        let extraction = extract_with_catalog(&stmt, &catalog);
        assert!(extraction.partial);
        assert_eq!(extraction.edges.len(), 1);
        assert!(extraction.edges.iter().all(|e| e.source.table_name() == "EMPLOYEE"));
    }

    #[test]
    fn test_drop_is_partial_without_edges() {
        let stmt = parse("DROP TABLE EMPLOYEE", SqlDialect::Postgres).unwrap();
        let extraction = extract(&stmt);
        assert!(extraction.partial);
        assert!(extraction.edges.is_empty());
    }
}
