use super::{PolicyContext, PolicyRule, PolicyViolation, RuleInfo, Severity, violation};
use crate::ast::{SourceRole, StatementBody};

/// Joins without ON/USING, or several FROM items with no WHERE, multiply
/// row counts
pub struct CartesianJoin;

impl PolicyRule for CartesianJoin {
    fn info(&self) -> RuleInfo {
        RuleInfo {
            id:       "POL008",
            name:     "Join without condition",
            severity: Severity::Warning,
            gate:     false
        }
    }

    fn check(&self, ctx: &PolicyContext<'_>) -> Vec<PolicyViolation> {
        let info = self.info();
        let mut violations = Vec::new();
        for node in ctx.stmt.descendants() {
            for source in node.sources() {
                if source.role == SourceRole::Join && !source.has_condition && !source.explicit_cross {
                    violations.push(violation(
                        &info,
                        format!("join without condition on '{}' produces a cartesian product", source.name),
                        Some(source.name.to_string())
                    ));
                }
            }

            let StatementBody::Select(select) = &node.body else {
                continue;
            };
            let from_items: Vec<&str> = select
                .sources
                .iter()
                .filter(|s| s.role == SourceRole::From)
                .map(|s| s.name.as_str())
                .collect();
            if from_items.len() > 1 && select.filter.is_none() {
                violations.push(violation(
                    &info,
                    format!(
                        "tables {} are listed without a join predicate",
                        from_items.join(", ")
                    ),
                    None
                ));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::SqlDialect, catalog::SchemaCatalog, classify::classify, config::PolicyConfig,
        parser::parse
    };

    fn check(sql: &str) -> Vec<PolicyViolation> {
        let stmt = parse(sql, SqlDialect::Maria).unwrap();
        let catalog = SchemaCatalog::default();
        let config = PolicyConfig::default();
        CartesianJoin.check(&PolicyContext {
            stmt:    &stmt,
            kind:    classify(&stmt),
            catalog: &catalog,
            config:  &config
        })
    }

    #[test]
    fn test_comma_join_without_where() {
        let v = check("SELECT A.ID FROM A, B");
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].severity, Severity::Warning);
        assert!(check("SELECT A.ID FROM A, B WHERE A.ID = B.A_ID").is_empty());
    }

    #[test]
    fn test_explicit_cross_join_is_intended() {
        assert!(check("SELECT A.ID FROM A CROSS JOIN B").is_empty());
        assert!(check("SELECT A.ID FROM A JOIN B ON A.ID = B.A_ID").is_empty());
    }
}
