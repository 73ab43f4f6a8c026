use std::ops::ControlFlow;

use compact_str::CompactString;
use indexmap::IndexSet;
use sqlparser::ast::{BinaryOperator, Expr, LimitClause, Query, Value, Visit, Visitor};

use super::{Env, Lowerer, Scope};
use crate::{
    ast::{
        ColumnRef, ExpressionKind, FunctionList, LimitSyntax, ProjectionItem, RowLimit, Statement,
        StatementRole
    },
    parser::canonical_name
};

/// Identifiers that parse as columns but are not
const PSEUDO_COLUMNS: &[&str] = &[
    "ROWNUM",
    "ROWID",
    "SYSDATE",
    "SYSTIMESTAMP",
    "LEVEL",
    "USER",
    "CURRENT_DATE",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "NULL",
    "TRUE",
    "FALSE"
];

const AGGREGATES: &[&str] = &[
    "COUNT",
    "SUM",
    "AVG",
    "MIN",
    "MAX",
    "LISTAGG",
    "STRING_AGG",
    "GROUP_CONCAT",
    "ARRAY_AGG",
    "JSON_AGG",
    "JSONB_AGG",
    "JSON_ARRAYAGG",
    "JSON_OBJECTAGG",
    "XMLAGG",
    "STDDEV",
    "STDDEV_POP",
    "STDDEV_SAMP",
    "VARIANCE",
    "VAR_POP",
    "VAR_SAMP",
    "MEDIAN",
    "BIT_AND",
    "BIT_OR",
    "BOOL_AND",
    "BOOL_OR",
    "PERCENTILE_CONT",
    "PERCENTILE_DISC",
    "CORR",
    "COVAR_POP",
    "COVAR_SAMP"
];

pub fn is_pseudo_column(name: &str) -> bool {
    PSEUDO_COLUMNS.contains(&name)
}

pub fn is_aggregate(function: &str) -> bool {
    AGGREGATES.contains(&function)
}

/// Map vendor spellings onto one neutral function name
pub fn normalize_function(name: &str) -> CompactString {
    let upper = canonical_name(name);
    match upper.as_str() {
        "NVL" | "IFNULL" | "ISNULL" => "COALESCE".into(),
        "SUBSTR" => "SUBSTRING".into(),
        _ => upper
    }
}

/// Top-level (depth 0) facts about an expression; subqueries are captured
/// whole and not looked into.
#[derive(Debug, Default)]
struct ExprScan {
    columns:    Vec<(Option<CompactString>, CompactString)>,
    functions:  FunctionList,
    aggregate:  bool,
    subqueries: Vec<Query>,
    depth:      usize
}

impl Visitor for ExprScan {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if self.depth == 0 {
            self.subqueries.push(query.clone());
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        match expr {
            Expr::Identifier(ident) => {
                let column = CompactString::from(ident.value.to_uppercase());
                if !is_pseudo_column(&column) {
                    self.columns.push((None, column));
                }
            }
            Expr::CompoundIdentifier(idents) => {
                if let Some((last, qualifier)) = idents.split_last() {
                    let qualifier = qualifier
                        .iter()
                        .map(|i| i.value.to_uppercase())
                        .collect::<Vec<_>>()
                        .join(".");
                    let qualifier = (!qualifier.is_empty()).then(|| qualifier.into());
                    self.columns
                        .push((qualifier, last.value.to_uppercase().into()));
                }
            }
            Expr::Function(func) => {
                let name = normalize_function(&func.name.to_string());
                if is_aggregate(&name) {
                    self.aggregate = true;
                }
                if !self.functions.contains(&name) {
                    self.functions.push(name);
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// Expression facts after scope resolution
#[derive(Debug, Default)]
pub(crate) struct Analyzed {
    pub columns:      IndexSet<ColumnRef>,
    pub functions:    FunctionList,
    pub aggregate:    bool,
    pub has_subquery: bool
}

impl Lowerer {
    /// Resolve an expression's columns against `scope` and lower its
    /// subqueries into `nested`. Columns projected by a subquery count as
    /// sources of the enclosing expression.
    pub(super) fn analyze_expr(
        &self,
        expr: &Expr,
        scope: &Scope,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> Analyzed {
        let mut scan = ExprScan::default();
        let _ = expr.visit(&mut scan);

        let mut columns: IndexSet<ColumnRef> = scan
            .columns
            .iter()
            .map(|(qualifier, column)| scope.resolve(qualifier.as_deref(), column))
            .collect();

        let has_subquery = !scan.subqueries.is_empty();
        if has_subquery {
            let child_env = scope.child_env(env);
            for query in &scan.subqueries {
                let node = self.lower_query(query, StatementRole::Subquery, None, &child_env);
                for item in node.projection() {
                    columns.extend(item.source_columns.iter().cloned());
                }
                nested.push(node);
            }
        }

        Analyzed {
            columns,
            functions: scan.functions,
            aggregate: scan.aggregate,
            has_subquery
        }
    }

    pub(super) fn project_expr(
        &self,
        expr: &Expr,
        output_name: CompactString,
        scope: &Scope,
        env: &Env,
        nested: &mut Vec<Statement>
    ) -> ProjectionItem {
        let analyzed = self.analyze_expr(expr, scope, env, nested);
        let kind = if is_column_expr(expr) && !analyzed.columns.is_empty() {
            ExpressionKind::Column
        } else if analyzed.aggregate {
            ExpressionKind::Aggregate
        } else if analyzed.columns.is_empty() && !analyzed.has_subquery {
            ExpressionKind::Literal
        } else {
            ExpressionKind::Scalar
        };

        ProjectionItem {
            output_name,
            source_expression: expr.to_string(),
            source_columns: analyzed.columns,
            kind,
            functions: analyzed.functions,
            wildcard_table: None,
            branch: None
        }
    }
}

fn is_column_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => true,
        Expr::Nested(inner) => is_column_expr(inner),
        _ => false
    }
}

/// Name a projection gets when it has no alias
pub fn default_output_name(expr: &Expr) -> CompactString {
    match expr {
        Expr::Identifier(ident) => ident.value.to_uppercase().into(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|i| CompactString::from(i.value.to_uppercase()))
            .unwrap_or_default(),
        Expr::Nested(inner) => default_output_name(inner),
        other => other.to_string().to_uppercase().into()
    }
}

pub fn literal_u64(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::Value(v) => match &v.value {
            Value::Number(n, _) => n.parse().ok(),
            _ => None
        },
        Expr::Nested(inner) => literal_u64(inner),
        _ => None
    }
}

/// `LIMIT n` / `FETCH FIRST n ROWS` on the query
pub fn query_row_limit(query: &Query) -> Option<RowLimit> {
    if let Some(clause) = &query.limit_clause {
        let limit = match clause {
            LimitClause::LimitOffset {
                limit, ..
            } => limit.as_ref(),
            LimitClause::OffsetCommaLimit {
                limit, ..
            } => Some(limit)
        };
        if let Some(limit) = limit {
            return Some(RowLimit {
                rows:   literal_u64(limit),
                syntax: LimitSyntax::Limit
            });
        }
    }
    let fetch = query.fetch.as_ref()?;
    Some(RowLimit {
        rows:   fetch.quantity.as_ref().and_then(literal_u64),
        syntax: LimitSyntax::FetchFirst
    })
}

/// `ROWNUM <= n` (or `<`, `=`, mirrored forms) among the top-level
/// conjuncts of a WHERE clause
pub fn rownum_limit(filter: &Expr) -> Option<RowLimit> {
    match filter {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right
        } => rownum_limit(left).or_else(|| rownum_limit(right)),
        Expr::Nested(inner) => rownum_limit(inner),
        Expr::BinaryOp {
            left,
            op,
            right
        } => {
            let (bound, op) = if is_rownum(left) {
                (right.as_ref(), op.clone())
            } else if is_rownum(right) {
                (left.as_ref(), mirror(op)?)
            } else {
                return None;
            };
            let n = literal_u64(bound);
            let rows = match op {
                BinaryOperator::LtEq => n,
                BinaryOperator::Lt => n.map(|n| n.saturating_sub(1)),
                BinaryOperator::Eq if n == Some(1) => n,
                _ => return None
            };
            Some(RowLimit {
                rows,
                syntax: LimitSyntax::Rownum
            })
        }
        _ => None
    }
}

fn is_rownum(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("ROWNUM"))
}

fn mirror(op: &BinaryOperator) -> Option<BinaryOperator> {
    match op {
        BinaryOperator::Gt => Some(BinaryOperator::Lt),
        BinaryOperator::GtEq => Some(BinaryOperator::LtEq),
        BinaryOperator::Eq => Some(BinaryOperator::Eq),
        _ => None
    }
}
