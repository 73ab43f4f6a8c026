use compact_str::{CompactString, format_compact};
use indexmap::IndexSet;
use sqlparser::ast::{
    self as sql, Assignment, AssignmentTarget, Delete, Expr, FromTable, Insert, MergeAction,
    MergeClause, MergeClauseKind, MergeInsertKind, TableFactor, TableWithJoins, UpdateTableFromKind
};

use super::{Env, Lowerer, Scope, column_name, table::JoinPredicates};
use crate::{
    ast::{
        DdlStatement, DeleteStatement, InsertStatement, MergeBranch, MergeStatement,
        ProjectionItem, SelectStatement, SourceRole, Statement, StatementBody, StatementRole,
        UnknownStatement, UpdateStatement
    },
    parser::{canonical_name, object_name}
};

/// Leading keywords that mark schema-changing statements
const DDL_KEYWORDS: &[&str] = &[
    "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "GRANT", "REVOKE", "COMMENT"
];

pub(crate) struct UpdateParts<'q> {
    pub table:       &'q TableWithJoins,
    pub assignments: &'q [Assignment],
    pub from:        Option<&'q UpdateTableFromKind>,
    pub selection:   Option<&'q Expr>
}

pub(crate) struct MergeParts<'q> {
    pub table:   &'q TableFactor,
    pub source:  &'q TableFactor,
    pub on:      &'q Expr,
    pub clauses: &'q [MergeClause]
}

impl Lowerer {
    pub(super) fn lower_insert(
        &self,
        stmt: &sql::Statement,
        insert: &Insert,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let mut nested = Vec::new();
        let source = match &insert.source {
            Some(query) => self.lower_inline_query(query, env, &mut nested),
            None if !insert.assignments.is_empty() => {
                let scope = Scope::new(env);
                let projection = self.lower_assignments(&insert.assignments, &scope, env, &mut nested);
                Some(SelectStatement {
                    projection,
                    ..SelectStatement::default()
                })
            }
            None => None
        };

        let body = InsertStatement {
            target: canonical_name(&insert.table.to_string()),
            columns: insert
                .columns
                .iter()
                .map(|c| column_name(&c.to_string()))
                .collect(),
            source
        };
        self.finish(role, alias, stmt.to_string(), StatementBody::Insert(body), nested)
    }

    pub(super) fn lower_update(
        &self,
        stmt: &sql::Statement,
        parts: UpdateParts<'_>,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let mut nested = Vec::new();
        let mut scope = Scope::new(env);
        let mut predicates = JoinPredicates::default();
        self.register_table_with_joins(
            parts.table,
            SourceRole::Target,
            &mut scope,
            env,
            &mut nested,
            &mut predicates
        );
        if let Some(from) = parts.from {
            let tables = match from {
                UpdateTableFromKind::BeforeSet(tables) | UpdateTableFromKind::AfterSet(tables) => {
                    tables
                }
            };
            for twj in tables {
                self.register_table_with_joins(
                    twj,
                    SourceRole::From,
                    &mut scope,
                    env,
                    &mut nested,
                    &mut predicates
                );
            }
        }

        let target = scope
            .sources
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let assignments = self.lower_assignments(parts.assignments, &scope, env, &mut nested);

        let mut filter_columns = IndexSet::new();
        for on in &predicates.on {
            filter_columns.extend(self.analyze_expr(on, &scope, env, &mut nested).columns);
        }
        if let Some(selection) = parts.selection {
            filter_columns.extend(self.analyze_expr(selection, &scope, env, &mut nested).columns);
        }

        let body = UpdateStatement {
            target,
            assignments,
            sources: scope.sources,
            filter: parts.selection.map(|s| s.to_string()),
            filter_columns
        };
        self.finish(role, alias, stmt.to_string(), StatementBody::Update(body), nested)
    }

    pub(super) fn lower_delete(
        &self,
        stmt: &sql::Statement,
        delete: &Delete,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let mut nested = Vec::new();
        let mut scope = Scope::new(env);
        let mut predicates = JoinPredicates::default();

        let from = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables
        };
        for (i, twj) in from.iter().enumerate() {
            let role = if i == 0 {
                SourceRole::Target
            } else {
                SourceRole::From
            };
            self.register_table_with_joins(
                twj,
                role,
                &mut scope,
                env,
                &mut nested,
                &mut predicates
            );
        }
        if let Some(using) = &delete.using {
            for twj in using {
                self.register_table_with_joins(
                    twj,
                    SourceRole::From,
                    &mut scope,
                    env,
                    &mut nested,
                    &mut predicates
                );
            }
        }

        let targets = if delete.tables.is_empty() {
            scope
                .sources
                .first()
                .map(|s| vec![s.name.clone()])
                .unwrap_or_default()
        } else {
            delete
                .tables
                .iter()
                .map(|t| scope.resolve_table(&t.to_string()))
                .collect()
        };

        let mut filter_columns = IndexSet::new();
        for on in &predicates.on {
            filter_columns.extend(self.analyze_expr(on, &scope, env, &mut nested).columns);
        }
        if let Some(selection) = &delete.selection {
            filter_columns.extend(self.analyze_expr(selection, &scope, env, &mut nested).columns);
        }

        let body = DeleteStatement {
            targets,
            sources: scope.sources,
            filter: delete.selection.as_ref().map(|s| s.to_string()),
            filter_columns
        };
        self.finish(role, alias, stmt.to_string(), StatementBody::Delete(body), nested)
    }

    pub(super) fn lower_merge(
        &self,
        stmt: &sql::Statement,
        parts: MergeParts<'_>,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let mut nested = Vec::new();
        let mut scope = Scope::new(env);
        let mut predicates = JoinPredicates::default();

        self.register_factor(
            parts.table,
            SourceRole::Target,
            &mut scope,
            env,
            &mut nested,
            &mut predicates
        );
        self.register_factor(
            parts.source,
            SourceRole::MergeSource,
            &mut scope,
            env,
            &mut nested,
            &mut predicates
        );

        let target = scope
            .sources
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let mut on_columns = self.analyze_expr(parts.on, &scope, env, &mut nested).columns;

        let mut projection = Vec::new();
        let mut positional_inserts = Vec::new();
        let mut deletes_matched = false;
        for clause in parts.clauses {
            let branch = match clause.clause_kind {
                MergeClauseKind::Matched => MergeBranch::Matched,
                MergeClauseKind::NotMatchedBySource => MergeBranch::NotMatchedBySource,
                MergeClauseKind::NotMatched | MergeClauseKind::NotMatchedByTarget => {
                    MergeBranch::NotMatched
                }
            };
            if let Some(predicate) = &clause.predicate {
                on_columns.extend(self.analyze_expr(predicate, &scope, env, &mut nested).columns);
            }

            match &clause.action {
                MergeAction::Update {
                    assignments, ..
                } => {
                    let mut items = self.lower_assignments(assignments, &scope, env, &mut nested);
                    for item in &mut items {
                        item.branch = Some(branch);
                    }
                    projection.extend(items);
                }
                MergeAction::Insert(insert) => {
                    if let MergeInsertKind::Values(values) = &insert.kind
                        && let Some(row) = values.rows.first()
                    {
                        let start = projection.len();
                        for (pos, expr) in row.iter().enumerate() {
                            let name = match insert.columns.get(pos) {
                                Some(column) => column_name(&column.to_string()),
                                None if insert.columns.is_empty() => format_compact!("COLUMN{}", pos + 1),
                                None => continue
                            };
                            let mut item = self.project_expr(expr, name, &scope, env, &mut nested);
                            item.branch = Some(branch);
                            projection.push(item);
                        }
                        if insert.columns.is_empty() {
                            positional_inserts.push(start..projection.len());
                        }
                    }
                }
                _ => deletes_matched = true
            }
        }

        let body = MergeStatement {
            target,
            sources: scope.sources,
            on_expression: parts.on.to_string(),
            on_columns,
            projection,
            positional_inserts,
            deletes_matched
        };
        self.finish(role, alias, stmt.to_string(), StatementBody::Merge(body), nested)
    }

    fn lower_assignments(
        &self,
        assignments: &[Assignment],
        scope: &Scope,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> Vec<ProjectionItem> {
        assignments
            .iter()
            .map(|assignment| {
                let name = match &assignment.target {
                    AssignmentTarget::ColumnName(name) => column_name(&name.to_string()),
                    AssignmentTarget::Tuple(names) => names
                        .iter()
                        .map(|n| column_name(&n.to_string()))
                        .collect::<Vec<_>>()
                        .join(", ")
                        .into()
                };
                self.project_expr(&assignment.value, name, scope, env, nested)
            })
            .collect()
    }

    /// DDL and everything the model has no typed node for
    pub(super) fn lower_other(
        &self,
        stmt: &sql::Statement,
        role: StatementRole,
        alias: Option<CompactString>,
        env: &Env
    ) -> Statement {
        let text = stmt.to_string();
        let mut nested = Vec::new();

        let body = match stmt {
            sql::Statement::CreateTable(create) => StatementBody::Ddl(DdlStatement {
                operation: "CREATE TABLE".into(),
                objects:   vec![object_name(&create.name)],
                source:    create
                    .query
                    .as_ref()
                    .and_then(|q| self.lower_inline_query(q, env, &mut nested))
            }),
            sql::Statement::CreateView {
                name,
                query,
                ..
            } => StatementBody::Ddl(DdlStatement {
                operation: "CREATE VIEW".into(),
                objects:   vec![object_name(name)],
                source:    self.lower_inline_query(query, env, &mut nested)
            }),
            sql::Statement::Drop {
                object_type,
                names,
                ..
            } => StatementBody::Ddl(DdlStatement {
                operation: compact_str::format_compact!("DROP {}", object_type),
                objects:   names.iter().map(object_name).collect(),
                source:    None
            }),
            sql::Statement::CreateIndex(index) => StatementBody::Ddl(DdlStatement {
                operation: "CREATE INDEX".into(),
                objects:   vec![object_name(&index.table_name)],
                source:    None
            }),
            _ => match ddl_from_text(&text) {
                Some(ddl) => StatementBody::Ddl(ddl),
                None => StatementBody::Unknown(UnknownStatement {
                    reason: format!(
                        "unsupported statement: {}",
                        text.split_whitespace().next().unwrap_or_default()
                    )
                })
            }
        };

        self.finish(role, alias, text, body, nested)
    }
}

/// Recognize DDL by its leading keyword; the object is the first name after
/// the object-type keywords.
fn ddl_from_text(text: &str) -> Option<DdlStatement> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let first = words.first()?.to_ascii_uppercase();
    if !DDL_KEYWORDS.contains(&first.as_str()) {
        return None;
    }

    const SKIP: &[&str] = &[
        "OR", "REPLACE", "IF", "NOT", "EXISTS", "TABLE", "VIEW", "INDEX", "SCHEMA", "DATABASE",
        "SEQUENCE", "ONLY", "UNIQUE", "MATERIALIZED", "ON", "COLUMN"
    ];
    let mut operation = CompactString::from(first.as_str());
    let mut object = None;
    for (i, word) in words.iter().enumerate().skip(1) {
        let upper = word.to_ascii_uppercase();
        if SKIP.contains(&upper.as_str()) {
            if i == 1 {
                operation.push(' ');
                operation.push_str(&upper);
            }
            continue;
        }
        if matches!(first.as_str(), "GRANT" | "REVOKE") {
            break;
        }
        object = Some(canonical_name(word.trim_end_matches([',', '(', ';'])));
        break;
    }

    Some(DdlStatement {
        operation,
        objects: object.into_iter().collect(),
        source: None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{MergeBranch, NodeKind},
        parser::{SqlDialect, parse}
    };

    #[test]
    fn test_insert_select_columns_and_source() {
        let stmt = parse(
            "INSERT INTO EMP_ARCHIVE (ID, NAME) SELECT E.ID, E.NAME FROM EMPLOYEE E WHERE E.ACTIVE = 0",
            SqlDialect::Postgres
        )
        .unwrap();
        let StatementBody::Insert(insert) = &stmt.body else {
            panic!("expected insert");
        };
        assert_eq!(insert.target, "EMP_ARCHIVE");
        assert_eq!(insert.columns, vec!["ID", "NAME"]);
        assert_eq!(stmt.projection().len(), 2);
        assert!(stmt.referenced_tables.contains("EMPLOYEE"));
        assert!(stmt.referenced_tables.contains("EMP_ARCHIVE"));
    }

    #[test]
    fn test_update_without_where() {
        let stmt = parse("UPDATE EMPLOYEE SET SAL = SAL * 2", SqlDialect::Maria).unwrap();
        let StatementBody::Update(update) = &stmt.body else {
            panic!("expected update");
        };
        assert_eq!(update.target, "EMPLOYEE");
        assert!(update.filter.is_none());
        assert_eq!(update.assignments[0].output_name, "SAL");
    }

    #[test]
    fn test_delete_with_where() {
        let stmt = parse("DELETE FROM LOGS WHERE CREATED < '2020-01-01'", SqlDialect::Postgres).unwrap();
        let StatementBody::Delete(delete) = &stmt.body else {
            panic!("expected delete");
        };
        assert_eq!(delete.targets, vec!["LOGS"]);
        assert!(delete.filter.is_some());
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
        let StatementBody::Merge(merge) = &stmt.body else {
            panic!("expected merge");
        };
        assert_eq!(merge.target, "DIM_CUSTOMER");
        let branches: Vec<_> = merge.projection.iter().map(|p| p.branch).collect();
        assert_eq!(
            branches,
            vec![
                Some(MergeBranch::Matched),
                Some(MergeBranch::NotMatched),
                Some(MergeBranch::NotMatched)
            ]
        );
        assert_eq!(merge.projection[0].output_name, "NAME");
    }

    #[test]
    fn test_merge_by_source_and_positional_insert() {
        let stmt = parse(
            "MERGE INTO DIM_CUSTOMER D USING STG_CUSTOMER S ON D.ID = S.ID \
             WHEN NOT MATCHED BY SOURCE THEN UPDATE SET D.ACTIVE = 0 \
             WHEN NOT MATCHED THEN INSERT VALUES (S.ID, S.NAME)",
            SqlDialect::Postgres
        )
        .unwrap();
        let StatementBody::Merge(merge) = &stmt.body else {
            panic!("expected merge");
        };
        assert_eq!(merge.projection[0].branch, Some(MergeBranch::NotMatchedBySource));
        assert_eq!(merge.positional_inserts, vec![1..3]);
        let (named, positional) = merge.split_projection();
        assert_eq!(named.len(), 1);
        assert_eq!(positional[0].len(), 2);
        assert_eq!(positional[0][1].output_name, "COLUMN2");
    }

    #[test]
    fn test_ctas_keeps_source_query() {
        let stmt = parse(
            "CREATE TABLE HIGH_EARNERS AS SELECT ID, SAL FROM EMPLOYEE WHERE SAL > 1000",
            SqlDialect::Postgres
        )
        .unwrap();
        assert_eq!(stmt.node_kind(), NodeKind::Ddl);
        assert_eq!(stmt.target_tables(), vec!["HIGH_EARNERS"]);
        assert_eq!(stmt.projection().len(), 2);
        assert!(stmt.referenced_tables.contains("EMPLOYEE"));
    }

    #[test]
    fn test_drop_and_truncate_are_ddl() {
        let drop = parse("DROP TABLE EMPLOYEE", SqlDialect::Postgres).unwrap();
        assert_eq!(drop.node_kind(), NodeKind::Ddl);
        assert_eq!(drop.target_tables(), vec!["EMPLOYEE"]);

        let truncate = parse("TRUNCATE TABLE EMPLOYEE", SqlDialect::Postgres).unwrap();
        assert_eq!(truncate.node_kind(), NodeKind::Ddl);
        assert_eq!(truncate.target_tables(), vec!["EMPLOYEE"]);
    }

    #[test]
    fn test_ddl_from_text() {
        let ddl = ddl_from_text("ALTER TABLE hr.emp ADD COLUMN x INT").unwrap();
        assert_eq!(ddl.operation, "ALTER TABLE");
        assert_eq!(ddl.objects, vec!["HR.EMP"]);
        let grant = ddl_from_text("GRANT SELECT ON EMP TO bob").unwrap();
        assert_eq!(grant.operation, "GRANT");
        assert!(ddl_from_text("SHOW TABLES").is_none());
    }
}
