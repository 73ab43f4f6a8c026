use compact_str::{CompactString, format_compact};
use indexmap::IndexSet;
use smallvec::SmallVec;
use sqlparser::ast::{GroupByExpr, Select, SelectItem, SetExpr, Values};

use super::{
    Env, Lowerer, Scope,
    expr::{default_output_name, rownum_limit},
    ident_upper,
    table::{JoinPredicates, new_source}
};
use crate::{
    ast::{
        ColumnRef, DdlStatement, ExpressionKind, LimitSyntax, ProjectionItem, RowLimit,
        SelectStatement, SourceKind, SourceRole, Statement, StatementBody, StatementRole
    },
    parser::{canonical_name, object_name}
};

impl Lowerer {
    pub(super) fn lower_set_expr(
        &self,
        body: &SetExpr,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> SelectStatement {
        match body {
            SetExpr::Select(select) => self.lower_select(select, env, nested),
            SetExpr::Query(query) => self
                .lower_inline_query(query, env, nested)
                .unwrap_or_default(),
            SetExpr::SetOperation {
                left,
                right,
                ..
            } => {
                let mut merged = self.lower_set_expr(left, env, nested);
                let other = self.lower_set_expr(right, env, nested);
                merged.set_branches.push(other.projection);
                merged.set_branches.extend(other.set_branches);
                merged.sources.extend(other.sources);
                merged.filter = merged.filter.or(other.filter);
                merged.filter_columns.extend(other.filter_columns);
                merged.join_columns.extend(other.join_columns);
                merged.group_columns.extend(other.group_columns);
                merged.distinct |= other.distinct;
                // a branch limit does not bound the combined result
                merged.row_limit = None;
                merged
            }
            SetExpr::Values(values) => self.lower_values(values, env, nested),
            SetExpr::Insert(inner)
            | SetExpr::Update(inner)
            | SetExpr::Delete(inner)
            | SetExpr::Merge(inner) => {
                nested.push(self.lower_statement(inner, StatementRole::Embedded, None, env));
                SelectStatement::default()
            }
            SetExpr::Table(_) => {
                let text = body.to_string();
                let name = canonical_name(text.trim_start_matches("TABLE").trim());
                let kind = if env.ctes.contains(&name) {
                    SourceKind::Cte
                } else {
                    SourceKind::Table
                };
                SelectStatement {
                    projection: vec![wildcard_item("*".to_string(), Some(name.clone()))],
                    sources: vec![new_source(name, None, kind, SourceRole::From)],
                    ..SelectStatement::default()
                }
            }
        }
    }

    fn lower_select(
        &self,
        select: &Select,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> SelectStatement {
        let mut scope = Scope::new(env);
        let mut predicates = JoinPredicates::default();
        for twj in &select.from {
            self.register_table_with_joins(
                twj,
                SourceRole::From,
                &mut scope,
                env,
                nested,
                &mut predicates
            );
        }

        let mut projection = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            let lowered = match item {
                SelectItem::UnnamedExpr(expr) => {
                    self.project_expr(expr, default_output_name(expr), &scope, env, nested)
                }
                SelectItem::ExprWithAlias {
                    expr,
                    alias
                } => self.project_expr(expr, ident_upper(alias), &scope, env, nested),
                SelectItem::QualifiedWildcard(..) => {
                    let text = item.to_string();
                    let qualifier = text.split(".*").next().unwrap_or_default();
                    wildcard_item(text.clone(), Some(scope.resolve_table(qualifier)))
                }
                SelectItem::Wildcard(..) => wildcard_item(item.to_string(), None)
            };
            projection.push(lowered);
        }

        let mut join_columns = IndexSet::new();
        for on in &predicates.on {
            join_columns.extend(self.analyze_expr(on, &scope, env, nested).columns);
        }
        join_columns.extend(predicates.using);

        let mut filter_columns = IndexSet::new();
        let mut row_limit = None;
        if let Some(selection) = &select.selection {
            filter_columns.extend(self.analyze_expr(selection, &scope, env, nested).columns);
            row_limit = rownum_limit(selection);
        }
        if let Some(having) = &select.having {
            filter_columns.extend(self.analyze_expr(having, &scope, env, nested).columns);
        }

        let mut group_columns: IndexSet<ColumnRef> = IndexSet::new();
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                group_columns.extend(self.analyze_expr(expr, &scope, env, nested).columns);
            }
        }

        if let Some(top) = &select.top {
            let digits: String = top
                .to_string()
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            row_limit = Some(RowLimit {
                rows:   digits.parse().ok(),
                syntax: LimitSyntax::Top
            });
        }

        // SELECT ... INTO creates its target; the node keeps the query from
        // passing as a read
        if let Some(into) = &select.into {
            let ddl = DdlStatement {
                operation: "CREATE TABLE".into(),
                objects:   vec![object_name(&into.name)],
                source:    None
            };
            nested.push(self.finish(
                StatementRole::Embedded,
                None,
                into.to_string(),
                StatementBody::Ddl(ddl),
                Vec::new()
            ));
        }

        SelectStatement {
            projection,
            set_branches: Vec::new(),
            sources: scope.sources,
            filter: select.selection.as_ref().map(|s| s.to_string()),
            filter_columns,
            join_columns,
            group_columns,
            row_limit,
            distinct: select.distinct.is_some()
        }
    }

    /// VALUES rows; the first row is the projection, the rest are branches
    fn lower_values(
        &self,
        values: &Values,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> SelectStatement {
        let scope = Scope::new(env);
        let mut rows = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            let mut items = Vec::with_capacity(row.len());
            for (pos, expr) in row.iter().enumerate() {
                let name = format_compact!("COLUMN{}", pos + 1);
                items.push(self.project_expr(expr, name, &scope, env, nested));
            }
            rows.push(items);
        }
        let mut rows = rows.into_iter();
        let projection = rows.next().unwrap_or_default();
        let set_branches = rows.collect();
        SelectStatement {
            projection,
            set_branches,
            ..SelectStatement::default()
        }
    }
}

pub(crate) fn wildcard_item(text: String, table: Option<CompactString>) -> ProjectionItem {
    ProjectionItem {
        output_name:       "*".into(),
        source_expression: text,
        source_columns:    IndexSet::new(),
        kind:              ExpressionKind::Wildcard,
        functions:         SmallVec::new(),
        wildcard_table:    table,
        branch:            None
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{ExpressionKind, LimitSyntax, SourceKind, StatementBody, StatementRole},
        parser::{SqlDialect, parse}
    };

    #[test]
    fn test_projection_kinds() {
        let stmt = parse(
            "SELECT E.ID, E.SAL * 12 AS ANNUAL, COUNT(*) AS N, 'x' AS TAG FROM EMPLOYEE E GROUP BY E.ID, E.SAL",
            SqlDialect::Postgres
        )
        .unwrap();
        let kinds: Vec<_> = stmt.projection().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ExpressionKind::Column,
                ExpressionKind::Scalar,
                ExpressionKind::Aggregate,
                ExpressionKind::Literal
            ]
        );
        assert_eq!(stmt.projection()[1].output_name, "ANNUAL");
        assert_eq!(
            stmt.projection()[1].source_columns[0].table.as_deref(),
            Some("EMPLOYEE")
        );
    }

    #[test]
    fn test_qualified_wildcard_resolves_alias() {
        let stmt = parse(
            "SELECT e.* FROM EMPLOYEE e JOIN DEPT d ON e.DEPT_ID = d.ID",
            SqlDialect::Postgres
        )
        .unwrap();
        let item = &stmt.projection()[0];
        assert!(item.is_wildcard());
        assert_eq!(item.wildcard_table.as_deref(), Some("EMPLOYEE"));
        let select = stmt.as_select().unwrap();
        assert_eq!(select.join_columns.len(), 2);
    }

    #[test]
    fn test_union_branches_and_tables() {
        let stmt = parse(
            "SELECT ID FROM A UNION ALL SELECT ID FROM B",
            SqlDialect::Postgres
        )
        .unwrap();
        let select = stmt.as_select().unwrap();
        assert_eq!(select.set_branches.len(), 1);
        assert!(stmt.referenced_tables.contains("A"));
        assert!(stmt.referenced_tables.contains("B"));
    }

    #[test]
    fn test_cte_and_derived_tables_are_nested() {
        let stmt = parse(
            "WITH RECENT AS (SELECT ID FROM ORDERS) \
             SELECT R.ID, D.TOTAL FROM RECENT R JOIN (SELECT ID, SUM(AMT) AS TOTAL FROM PAYMENTS GROUP BY ID) D ON R.ID = D.ID",
            SqlDialect::Postgres
        )
        .unwrap();
        assert_eq!(stmt.nested.len(), 2);
        assert_eq!(stmt.nested[0].role, StatementRole::Cte);
        assert_eq!(stmt.nested[1].role, StatementRole::Derived);
        let select = stmt.as_select().unwrap();
        assert_eq!(select.sources[0].kind, SourceKind::Cte);
        assert_eq!(select.sources[1].kind, SourceKind::Derived);
        assert!(stmt.referenced_tables.contains("ORDERS"));
        assert!(stmt.referenced_tables.contains("PAYMENTS"));
        assert!(!stmt.referenced_tables.contains("RECENT"));
    }

    #[test]
    fn test_where_subquery_tables_are_referenced() {
        let stmt = parse(
            "SELECT NAME FROM EMPLOYEE WHERE DEPT_ID IN (SELECT ID FROM DEPT WHERE REGION = 'EU')",
            SqlDialect::Oracle
        )
        .unwrap();
        assert!(stmt.referenced_tables.contains("DEPT"));
        assert_eq!(stmt.nested[0].role, StatementRole::Subquery);
    }

    #[test]
    fn test_row_limits_per_dialect() {
        let pg = parse("SELECT ID FROM T LIMIT 10", SqlDialect::Postgres).unwrap();
        let limit = pg.as_select().unwrap().row_limit.unwrap();
        assert_eq!((limit.rows, limit.syntax), (Some(10), LimitSyntax::Limit));

        let ora = parse("SELECT ID FROM T FETCH FIRST 5 ROWS ONLY", SqlDialect::Oracle).unwrap();
        let limit = ora.as_select().unwrap().row_limit.unwrap();
        assert_eq!((limit.rows, limit.syntax), (Some(5), LimitSyntax::FetchFirst));

        let rownum = parse("SELECT ID FROM T WHERE ROWNUM <= 20", SqlDialect::Oracle).unwrap();
        let limit = rownum.as_select().unwrap().row_limit.unwrap();
        assert_eq!((limit.rows, limit.syntax), (Some(20), LimitSyntax::Rownum));
    }

    #[test]
    fn test_select_into_nests_table_creation() {
        let stmt = parse("SELECT ID INTO EMP_COPY FROM EMP LIMIT 5", SqlDialect::Postgres).unwrap();
        assert!(stmt.as_select().is_some());
        assert_eq!(stmt.nested.len(), 1);
        assert_eq!(stmt.nested[0].role, StatementRole::Embedded);
        match &stmt.nested[0].body {
            StatementBody::Ddl(ddl) => {
                assert_eq!(ddl.operation, "CREATE TABLE");
                assert_eq!(ddl.objects.len(), 1);
                assert_eq!(ddl.objects[0], "EMP_COPY");
            }
            other => panic!("expected DDL, got {other:?}")
        }
    }
}
