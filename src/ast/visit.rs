use super::Statement;

/// Position of a node during a walk
#[derive(Debug, Clone, Copy)]
pub struct VisitContext<'a> {
    pub depth:  usize,
    pub parent: Option<&'a Statement>
}

/// Callback invoked once per node by [`walk`], parents before children.
///
/// Shared by the classifier, the policy rules and the lineage extractor so
/// that no component can forget a nesting level.
pub trait StatementVisitor<'a> {
    fn visit(&mut self, stmt: &'a Statement, ctx: VisitContext<'a>);
}

/// Visit `root` and every nested sub-statement depth-first
pub fn walk<'a, V>(root: &'a Statement, visitor: &mut V)
where
    V: StatementVisitor<'a> + ?Sized
{
    walk_node(
        root,
        VisitContext {
            depth:  0,
            parent: None
        },
        visitor
    );
}

fn walk_node<'a, V>(stmt: &'a Statement, ctx: VisitContext<'a>, visitor: &mut V)
where
    V: StatementVisitor<'a> + ?Sized
{
    visitor.visit(stmt, ctx);
    for child in &stmt.nested {
        walk_node(
            child,
            VisitContext {
                depth:  ctx.depth + 1,
                parent: Some(stmt)
            },
            visitor
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SqlDialect, parse};

    struct DepthCollector(Vec<(usize, Option<String>)>);

    impl<'a> StatementVisitor<'a> for DepthCollector {
        fn visit(&mut self, stmt: &'a Statement, ctx: VisitContext<'a>) {
            self.0
                .push((ctx.depth, stmt.alias.as_ref().map(|a| a.to_string())));
        }
    }

    #[test]
    fn test_walk_visits_ctes_before_body_subqueries() {
        let stmt = parse(
            "WITH A AS (SELECT ID FROM T1) SELECT ID FROM A WHERE ID IN (SELECT ID FROM T2)",
            SqlDialect::Postgres
        )
        .unwrap();
        let mut collector = DepthCollector(Vec::new());
        walk(&stmt, &mut collector);
        assert_eq!(collector.0.len(), 3);
        assert_eq!(collector.0[0], (0, None));
        assert_eq!(collector.0[1], (1, Some("A".to_string())));
        assert_eq!(collector.0[2].0, 1);
    }
}
