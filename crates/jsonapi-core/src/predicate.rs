//! Predicate construction shared between the query builder (already-flat
//! `ResolvedFilter`s) and the read planner's `searchSchema` resolution
//! (whose `actualField`/`oneOf`/`polymorphic` targets build the same
//! comparison shapes against a dotted path rather than a plain column).
//!
//! Kept out of both `plan` and `query` so neither has to depend on the
//! other's internals to share it.

use crate::request::{FilterOperator, FilterValue, QualifiedIdentifier};
use jsonapi_sql::{escape_ident, Expr, SqlFragment, SqlParam};

/// A (possibly join-aliased) column reference. `alias` empty means the
/// query's own root table.
pub(crate) fn column_expr(alias: &str, column: &str) -> Expr {
    if alias.is_empty() {
        Expr::column(column)
    } else {
        Expr::qualified_column(alias, column)
    }
}

/// The comparison predicate for one alias/column/operator/value term, the
/// same shape `filter[field]`/`filter[field][op]` always resolves to
/// regardless of whether the column came from a plain field or a
/// `searchSchema actualField`.
pub(crate) fn predicate_for(alias: &str, column: &str, operator: &FilterOperator, value: &FilterValue) -> Expr {
    let col = column_expr(alias, column);
    match (operator, value) {
        (FilterOperator::Eq, FilterValue::Scalar(v)) => Expr::compare(col, " = ", v.clone()),
        (FilterOperator::Ne, FilterValue::Scalar(v)) => Expr::compare(col, " <> ", v.clone()),
        (FilterOperator::Gt, FilterValue::Scalar(v)) => Expr::compare(col, " > ", v.clone()),
        (FilterOperator::Gte, FilterValue::Scalar(v)) => Expr::compare(col, " >= ", v.clone()),
        (FilterOperator::Lt, FilterValue::Scalar(v)) => Expr::compare(col, " < ", v.clone()),
        (FilterOperator::Lte, FilterValue::Scalar(v)) => Expr::compare(col, " <= ", v.clone()),
        (FilterOperator::Like, FilterValue::Scalar(v)) => Expr::compare(col, " LIKE ", format!("%{v}%")),
        (FilterOperator::In, FilterValue::List(values)) => {
            Expr::compare_in(col, values.iter().cloned().map(SqlParam::Text).collect())
        }
        (FilterOperator::Between, FilterValue::List(values)) if values.len() == 2 => {
            Expr::compare(col.clone(), " >= ", values[0].clone()).and(Expr::compare(col, " <= ", values[1].clone()))
        }
        // Shapes the query-string parser already rejects (e.g. `in` with a
        // scalar value) fall back to a predicate that is always false
        // rather than silently matching every row.
        _ => Expr::compare(col.clone(), " = ", "__invalid_filter_shape__".to_string()).and(Expr::compare_is_null(col).not()),
    }
}

/// An OR-across-columns `ILIKE '%needle%'` predicate — the shape both
/// `filter[search]` (ranked across `SearchDescriptor.columns`) and a
/// `oneOf` searchSchema field (ranked across its own field list) share.
pub(crate) fn ilike_any(refs: &[(String, String)], needle: &str) -> Expr {
    Expr::or_all(
        refs.iter()
            .map(|(alias, column)| Expr::compare(column_expr(alias, column), " ILIKE ", format!("%{needle}%"))),
    )
}

/// An OR-across-target-types predicate for a `searchSchema` `polymorphic`
/// target: `(root.type_column = 'posts' AND EXISTS (SELECT 1 FROM posts
/// WHERE posts.id = root.id_column AND posts.title ILIKE '%needle%')) OR
/// ...`. The root table is referenced by its own name rather than an
/// alias since the primary resource's `FROM` clause is never aliased.
pub(crate) fn polymorphic_any(
    root_table: &QualifiedIdentifier,
    id_column: &str,
    type_column: &str,
    branches: &[(String, QualifiedIdentifier, String, String)],
    needle: &str,
) -> Expr {
    let root_sql = qi_sql(root_table);
    let branch_exprs = branches.iter().map(|(type_name, table, pk, column)| {
        let table_sql = qi_sql(table);
        let mut frag = SqlFragment::new();
        frag.push("(");
        frag.push(&root_sql);
        frag.push(".");
        frag.push(&escape_ident(type_column));
        frag.push(" = ");
        frag.push_param(type_name.clone());
        frag.push(" AND EXISTS (SELECT 1 FROM ");
        frag.push(&table_sql);
        frag.push(" WHERE ");
        frag.push(&table_sql);
        frag.push(".");
        frag.push(&escape_ident(pk));
        frag.push(" = ");
        frag.push(&root_sql);
        frag.push(".");
        frag.push(&escape_ident(id_column));
        frag.push(" AND ");
        frag.push(&table_sql);
        frag.push(".");
        frag.push(&escape_ident(column));
        frag.push(" ILIKE ");
        frag.push_param(format!("%{needle}%"));
        frag.push("))");
        Expr::from_fragment(frag)
    });
    Expr::or_all(branch_exprs)
}

fn qi_sql(qi: &QualifiedIdentifier) -> String {
    format!("{}.{}", escape_ident(&qi.schema), escape_ident(&qi.name))
}
