use compact_str::CompactString;
use sqlparser::ast::{Expr, JoinConstraint, JoinOperator, TableFactor, TableWithJoins};

use super::{Env, Lowerer, Scope, ident_upper};
use crate::{
    ast::{ColumnRef, SourceKind, SourceRole, Statement, StatementRole, TableSource},
    parser::object_name
};

/// Join predicates gathered while registering sources; resolved once the
/// whole FROM clause is in scope.
#[derive(Debug, Default)]
pub(crate) struct JoinPredicates<'q> {
    pub on:    Vec<&'q Expr>,
    pub using: Vec<ColumnRef>
}

impl Lowerer {
    pub(super) fn register_table_with_joins<'q>(
        &self,
        twj: &'q TableWithJoins,
        role: SourceRole,
        scope: &mut Scope,
        env: &Env,
        nested: &mut Vec<Statement>,
        predicates: &mut JoinPredicates<'q>
    ) {
        self.register_factor(&twj.relation, role, scope, env, nested, predicates);

        for join in &twj.joins {
            let first_new = scope.sources.len();
            self.register_factor(&join.relation, SourceRole::Join, scope, env, nested, predicates);
            let Some(source) = scope.sources.get_mut(first_new) else {
                continue;
            };

            match join_constraint(&join.join_operator) {
                Some(JoinConstraint::On(expr)) => {
                    source.condition = Some(expr.to_string());
                    predicates.on.push(expr);
                }
                Some(JoinConstraint::Using(names)) => {
                    let columns: Vec<String> = names.iter().map(|n| n.to_string()).collect();
                    source.condition = Some(format!("USING ({})", columns.join(", ")));
                    let table = source.name.clone();
                    for column in &columns {
                        predicates.using.push(ColumnRef {
                            table:  Some(table.clone()),
                            column: super::column_name(column)
                        });
                    }
                }
                Some(JoinConstraint::Natural) => {
                    source.condition = Some("NATURAL".to_string());
                }
                Some(JoinConstraint::None) => {
                    source.has_condition = false;
                    source.explicit_cross =
                        matches!(join.join_operator, JoinOperator::CrossJoin(_));
                }
                None => {}
            }
        }
    }

    pub(super) fn register_factor<'q>(
        &self,
        factor: &'q TableFactor,
        role: SourceRole,
        scope: &mut Scope,
        env: &Env,
        nested: &mut Vec<Statement>,
        predicates: &mut JoinPredicates<'q>
    ) {
        match factor {
            TableFactor::Table {
                name,
                alias,
                ..
            } => {
                let name = object_name(name);
                let kind = if env.ctes.contains(&name) {
                    SourceKind::Cte
                } else {
                    SourceKind::Table
                };
                scope.add(new_source(
                    name,
                    alias.as_ref().map(|a| ident_upper(&a.name)),
                    kind,
                    role
                ));
            }
            TableFactor::Derived {
                subquery,
                alias,
                ..
            } => {
                let name = alias
                    .as_ref()
                    .map(|a| ident_upper(&a.name))
                    .unwrap_or_else(|| self.next_derived_name());
                nested.push(self.lower_query(
                    subquery,
                    StatementRole::Derived,
                    Some(name.clone()),
                    env
                ));
                scope.add(new_source(name, None, SourceKind::Derived, role));
            }
            TableFactor::NestedJoin {
                table_with_joins,
                ..
            } => {
                self.register_table_with_joins(
                    table_with_joins,
                    role,
                    scope,
                    env,
                    nested,
                    predicates
                );
            }
            _ => {}
        }
    }
}

pub(crate) fn new_source(
    name: CompactString,
    alias: Option<CompactString>,
    kind: SourceKind,
    role: SourceRole
) -> TableSource {
    TableSource {
        name,
        alias,
        kind,
        role,
        condition: None,
        has_condition: true,
        explicit_cross: false
    }
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::CrossJoin(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint)
        | JoinOperator::StraightJoin(constraint) => Some(constraint),
        JoinOperator::AsOf {
            constraint, ..
        } => Some(constraint),
        JoinOperator::CrossApply | JoinOperator::OuterApply => None
    }
}
