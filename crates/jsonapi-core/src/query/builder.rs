//! Translates a resolved plan into parameterized SQL via `jsonapi_sql`.

use crate::error::Result;
use crate::plan::{MutatePlan, PaginationPlan, ReadPlan, RelationshipWrite, ResolvedFilter, ResolvedSort};
use crate::predicate::{column_expr, predicate_for};
use crate::relationships::LinkageStatement;
use crate::request::SortDirection;
use crate::schema::CompiledSchema;
use jsonapi_sql::{
    escape_ident, identifier::QualifiedIdentifier as SqlQi, DeleteBuilder, Expr, InsertBuilder, SelectBuilder,
    SqlFragment, SqlParam, UpdateBuilder,
};

/// Query builder for converting plans to SQL.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Build a SELECT for a [`ReadPlan`]. `extra` is an additional
    /// predicate the caller wants ANDed in — used by the relationship
    /// engine to inject the `foreign_key = parent_id` linkage condition
    /// that the planner deliberately leaves out of a bare `ReadPlan`.
    pub fn build_read(plan: &ReadPlan, extra: Option<Expr>) -> Result<SqlFragment> {
        let qi = to_sql_qi(&plan.table);
        let mut builder = SelectBuilder::new().from_table(&qi);
        if plan.distinct {
            builder = builder.distinct();
        }

        for col in &plan.select {
            builder = match &col.expression {
                Some(expr) => {
                    let mut frag = SqlFragment::new();
                    frag.push(expr);
                    frag.push(" AS ");
                    frag.push(&escape_ident(&col.output_name));
                    builder.column_raw(frag)
                }
                None if col.alias.is_empty() => builder.column_as(&col.column, &col.output_name),
                None => builder.qualified_column(&col.alias, &col.column),
            };
        }

        for join in &plan.joins {
            builder = builder.left_join_as(&to_sql_qi(&join.table), &join.alias, &join_condition(&qi, join));
        }

        let mut predicate = combined_filter_expr(plan);
        if let Some(extra) = extra {
            predicate = match predicate {
                Some(p) => Some(p.and(extra)),
                None => Some(extra),
            };
        }
        if let Some(pagination) = &plan.pagination {
            if let Some(cursor_expr) = cursor_predicate(pagination, &plan.sort) {
                predicate = match predicate {
                    Some(p) => Some(p.and(cursor_expr)),
                    None => Some(cursor_expr),
                };
            }
        }
        if let Some(predicate) = predicate {
            builder = builder.where_expr(predicate);
        }

        for sort in &plan.sort {
            builder = builder.order_by_raw(order_fragment(sort));
        }

        if let Some(pagination) = &plan.pagination {
            if let PaginationPlan::Offset { limit, offset, .. } = pagination {
                builder = builder.limit(*limit).offset(*offset);
            } else if let PaginationPlan::Cursor { limit, .. } = pagination {
                builder = builder.limit(*limit);
            }
        }

        Ok(builder.build())
    }

    /// Build a `SELECT COUNT(*)` for offset-mode pagination totals.
    pub fn build_count(plan: &ReadPlan) -> Result<SqlFragment> {
        let qi = to_sql_qi(&plan.table);
        let mut builder = SelectBuilder::new().from_table(&qi).column_raw(count_column(plan));

        for join in &plan.joins {
            builder = builder.left_join_as(&to_sql_qi(&join.table), &join.alias, &join_condition(&qi, join));
        }

        if let Some(predicate) = combined_filter_expr(plan) {
            builder = builder.where_expr(predicate);
        }

        Ok(builder.build())
    }

    /// Build an INSERT/UPDATE/DELETE for a [`MutatePlan`].
    pub fn build_mutate(plan: &MutatePlan) -> Result<SqlFragment> {
        match plan {
            MutatePlan::Create { table, columns, .. } => {
                let qi = to_sql_qi(table);
                let names: Vec<String> = columns.iter().map(|(c, _)| c.clone()).collect();
                let values: Vec<SqlParam> = columns.iter().map(|(_, v)| json_to_param(v)).collect();
                Ok(InsertBuilder::new().into_table(&qi).columns(names).values(values).returning_all().build())
            }
            MutatePlan::Update { table, id, pk_columns, columns, .. } => {
                let qi = to_sql_qi(table);
                let mut builder = UpdateBuilder::new().table(&qi);
                for (col, value) in columns {
                    builder = builder.set(col, json_to_param(value));
                }
                builder = builder.where_expr(pk_predicate(pk_columns, id));
                Ok(builder.returning_all().build())
            }
            MutatePlan::Upsert { table, id, pk_columns, columns, .. } => {
                let qi = to_sql_qi(table);
                let mut names: Vec<String> = pk_columns.clone();
                let mut values: Vec<SqlParam> = vec![SqlParam::Text(id.clone())];
                for (col, value) in columns {
                    names.push(col.clone());
                    values.push(json_to_param(value));
                }
                let set_cols: Vec<(String, SqlFragment)> = columns
                    .iter()
                    .map(|(col, _)| {
                        let mut frag = SqlFragment::new();
                        frag.push("EXCLUDED.");
                        frag.push(&escape_ident(col));
                        (col.clone(), frag)
                    })
                    .collect();
                Ok(InsertBuilder::new()
                    .into_table(&qi)
                    .columns(names)
                    .values(values)
                    .on_conflict_do_update(pk_columns.clone(), set_cols)
                    .returning_all()
                    .build())
            }
            MutatePlan::Delete { table, id, pk_columns, .. } => {
                let qi = to_sql_qi(table);
                Ok(DeleteBuilder::new().from_table(&qi).where_expr(pk_predicate(pk_columns, id)).returning_all().build())
            }
        }
    }

    /// Build the SQL for a relationship-engine linkage write. Returns one
    /// statement per entry — a repoint with `clear_others` or a multi-row
    /// join insert needs more than one UPDATE/INSERT, and each must bind its
    /// own `$1, $2, ...` run rather than share one parameter list, so the
    /// caller runs them in sequence inside the same transaction.
    pub fn build_linkage(stmt: &LinkageStatement) -> Result<Vec<SqlFragment>> {
        match stmt {
            LinkageStatement::SetForeignKey { table, id, foreign_key, value } => {
                let qi = to_sql_qi(table);
                let builder = UpdateBuilder::new()
                    .table(&qi)
                    .set(foreign_key, value.clone().map(SqlParam::Text).unwrap_or(SqlParam::Null))
                    .where_expr(Expr::eq("id", id.clone()));
                Ok(vec![builder.build()])
            }
            LinkageStatement::RepointForeignKeys { table, foreign_key, parent_id, ids, clear_others } => {
                let qi = to_sql_qi(table);
                let mut statements = vec![UpdateBuilder::new()
                    .table(&qi)
                    .set(foreign_key, SqlParam::Text(parent_id.clone()))
                    .where_expr(Expr::in_list("id", ids.iter().cloned().map(SqlParam::Text).collect()))
                    .build()];
                if *clear_others {
                    statements.push(
                        UpdateBuilder::new()
                            .table(&qi)
                            .set(foreign_key, SqlParam::Null)
                            .where_expr(
                                Expr::eq(foreign_key, parent_id.clone())
                                    .and(Expr::in_list("id", ids.iter().cloned().map(SqlParam::Text).collect()).not()),
                            )
                            .build(),
                    );
                }
                Ok(statements)
            }
            LinkageStatement::InsertJoinRows { join_table, source_fk, source_id, target_fk, target_ids } => {
                let qi = to_sql_qi(join_table);
                Ok(target_ids
                    .iter()
                    .map(|target_id| {
                        InsertBuilder::new()
                            .into_table(&qi)
                            .columns(vec![source_fk.clone(), target_fk.clone()])
                            .values(vec![SqlParam::Text(source_id.clone()), SqlParam::Text(target_id.clone())])
                            .on_conflict_do_nothing()
                            .build()
                    })
                    .collect())
            }
            LinkageStatement::DeleteJoinRows { join_table, source_fk, source_id, target_fk, target_ids } => {
                let qi = to_sql_qi(join_table);
                let mut predicate = Expr::eq(source_fk, source_id.clone());
                if let Some(ids) = target_ids {
                    predicate = predicate.and(Expr::in_list(target_fk, ids.iter().cloned().map(SqlParam::Text).collect()));
                }
                Ok(vec![DeleteBuilder::new().from_table(&qi).where_expr(predicate).build()])
            }
        }
    }

    /// Build the SQL for a nested relationship write produced alongside a
    /// create/update/upsert body. Unlike [`Self::build_linkage`] (which
    /// works off the parent's own schema-declared table), this resolves the
    /// target table from `target_type` since the write only names the
    /// related resource by its JSON:API type.
    pub fn build_relationship_write(write: &RelationshipWrite, schema: &CompiledSchema, parent_id: &str) -> Result<Vec<SqlFragment>> {
        match write {
            RelationshipWrite::ReplaceHasOne { target_type, foreign_key, id } => {
                let qi = to_sql_qi(&schema.require(target_type)?.descriptor.table);
                let mut statements = Vec::new();
                if let Some(target_id) = id {
                    statements.push(
                        UpdateBuilder::new()
                            .table(&qi)
                            .set(foreign_key, SqlParam::Text(target_id.clone()))
                            .where_expr(Expr::eq("id", target_id.clone()))
                            .build(),
                    );
                    statements.push(
                        UpdateBuilder::new()
                            .table(&qi)
                            .set(foreign_key, SqlParam::Null)
                            .where_expr(
                                Expr::eq(foreign_key, parent_id.to_string())
                                    .and(Expr::eq("id", target_id.clone()).not()),
                            )
                            .build(),
                    );
                } else {
                    statements.push(
                        UpdateBuilder::new()
                            .table(&qi)
                            .set(foreign_key, SqlParam::Null)
                            .where_expr(Expr::eq(foreign_key, parent_id.to_string()))
                            .build(),
                    );
                }
                Ok(statements)
            }
            RelationshipWrite::ReplaceHasMany { target_type, foreign_key, ids } => {
                let qi = to_sql_qi(&schema.require(target_type)?.descriptor.table);
                Self::repoint(&qi, foreign_key, parent_id, ids, &[])
            }
            RelationshipWrite::ReplaceHasManyPolymorphic { target_type, foreign_key, foreign_type_column, discriminant, ids } => {
                let qi = to_sql_qi(&schema.require(target_type)?.descriptor.table);
                Self::repoint(&qi, foreign_key, parent_id, ids, &[(foreign_type_column.clone(), discriminant.clone())])
            }
            RelationshipWrite::ReplaceManyToMany { join_table, source_fk, target_fk, ids } => {
                let qi = to_sql_qi(join_table);
                let mut statements = vec![DeleteBuilder::new()
                    .from_table(&qi)
                    .where_expr(Expr::eq(source_fk, parent_id.to_string()))
                    .build()];
                statements.extend(ids.iter().map(|target_id| {
                    InsertBuilder::new()
                        .into_table(&qi)
                        .columns(vec![source_fk.clone(), target_fk.clone()])
                        .values(vec![SqlParam::Text(parent_id.to_string()), SqlParam::Text(target_id.clone())])
                        .on_conflict_do_nothing()
                        .build()
                }));
                Ok(statements)
            }
        }
    }

    /// Point every row in `ids` at `parent_id` and clear every other row
    /// currently pointing there, optionally stamping extra literal columns
    /// (the polymorphic discriminant) on the repointed rows.
    fn repoint(table: &SqlQi, foreign_key: &str, parent_id: &str, ids: &[String], extra: &[(String, String)]) -> Result<Vec<SqlFragment>> {
        let mut statements = Vec::new();
        if !ids.is_empty() {
            let mut set_builder = UpdateBuilder::new().table(table).set(foreign_key, SqlParam::Text(parent_id.to_string()));
            for (col, value) in extra {
                set_builder = set_builder.set(col, SqlParam::Text(value.clone()));
            }
            statements.push(
                set_builder
                    .where_expr(Expr::in_list("id", ids.iter().cloned().map(SqlParam::Text).collect()))
                    .build(),
            );
        }
        let mut clear = Expr::eq(foreign_key, parent_id.to_string());
        if !ids.is_empty() {
            clear = clear.and(Expr::in_list("id", ids.iter().cloned().map(SqlParam::Text).collect()).not());
        }
        statements.push(UpdateBuilder::new().table(table).set(foreign_key, SqlParam::Null).where_expr(clear).build());
        Ok(statements)
    }

    /// Build the DELETEs that clear a row's many-to-many join rows before
    /// the primary row itself is deleted.
    pub fn build_cascade_deletes(cascades: &[(crate::request::QualifiedIdentifier, String)], id: &str) -> Vec<SqlFragment> {
        cascades
            .iter()
            .map(|(table, source_fk)| {
                DeleteBuilder::new()
                    .from_table(&to_sql_qi(table))
                    .where_expr(Expr::eq(source_fk, id.to_string()))
                    .build()
            })
            .collect()
    }
}

fn to_sql_qi(qi: &crate::request::QualifiedIdentifier) -> SqlQi {
    SqlQi::new(&qi.schema, &qi.name)
}

fn from_qi_str(qi: &SqlQi) -> String {
    jsonapi_sql::from_qi(qi)
}

fn pk_predicate(pk_columns: &[String], id: &str) -> Expr {
    if pk_columns.len() == 1 {
        return Expr::eq(&pk_columns[0], id.to_string());
    }
    // Composite keys are passed as a single `:`-joined id, per the same
    // convention the relationship-linkage paths use for resource identifiers.
    let parts: Vec<&str> = id.split(':').collect();
    Expr::and_all(pk_columns.iter().zip(parts).map(|(col, part)| Expr::eq(col, part.to_string())))
}

/// The join's ON condition. Every hop but the first joins against a prior
/// hop's own alias (`join.left_alias`); the first hop joins against the
/// query's root table.
fn join_condition(root: &SqlQi, join: &crate::plan::PlannedJoin) -> String {
    let left = match &join.left_alias {
        Some(alias) => escape_ident(alias),
        None => from_qi_str(root),
    };
    format!(
        "{}.{} = {}.{}",
        escape_ident(&join.alias),
        escape_ident(&join.on_right_column),
        left,
        escape_ident(&join.on_left_column),
    )
}

/// `COUNT(*)`, or `COUNT(DISTINCT pk)` when the plan joins through a
/// to-many hop — a plain `COUNT(*)` over a fanned-out join would
/// over-count the root rows the duplicate-suppressing `DISTINCT` on
/// `build_read` is there to collapse.
fn count_column(plan: &ReadPlan) -> SqlFragment {
    if !plan.distinct {
        return SqlFragment::raw("COUNT(*) AS count");
    }
    let mut frag = SqlFragment::raw("COUNT(DISTINCT ");
    if plan.pk_columns.len() == 1 {
        frag.push(&escape_ident(&plan.pk_columns[0]));
    } else {
        frag.push("(");
        for (i, col) in plan.pk_columns.iter().enumerate() {
            if i > 0 {
                frag.push(", ");
            }
            frag.push(&escape_ident(col));
        }
        frag.push(")");
    }
    frag.push(") AS count");
    frag
}

fn combined_filter_expr(plan: &ReadPlan) -> Option<Expr> {
    let mut exprs: Vec<Expr> = plan.filters.iter().map(filter_to_expr).collect();
    exprs.extend(plan.raw_filters.iter().cloned());
    if exprs.is_empty() {
        None
    } else {
        Some(Expr::and_all(exprs))
    }
}

fn filter_to_expr(filter: &ResolvedFilter) -> Expr {
    predicate_for(&filter.alias, &filter.column, &filter.operator, &filter.value)
}

fn order_fragment(sort: &ResolvedSort) -> SqlFragment {
    let mut frag = column_expr(&sort.alias, &sort.column).into_fragment();
    frag.push(match sort.direction {
        SortDirection::Asc => " ASC",
        SortDirection::Desc => " DESC",
    });
    frag
}

/// Build the `(sort cols) > (cursor values)` resume predicate for cursor
/// pagination, expanded as the lexicographic OR-of-AND-prefix chain: row
/// `k` resumes past the cursor iff its first sort key strictly passes the
/// cursor's, OR its first key ties and its second key strictly passes, and
/// so on. A plain per-axis OR (no equality prefix) would let rows that tie
/// on the leading key but fall behind on a later one leak back in.
fn cursor_predicate(pagination: &PaginationPlan, sort: &[ResolvedSort]) -> Option<Expr> {
    let (cursor, _forward) = match pagination {
        PaginationPlan::Cursor { after: Some(c), .. } => (c, true),
        PaginationPlan::Cursor { before: Some(c), .. } => (c, false),
        _ => return None,
    };

    if sort.is_empty() || cursor.axes.is_empty() {
        return None;
    }

    let n = sort.len().min(cursor.axes.len());

    let mut clauses = Vec::with_capacity(n);
    for i in 0..n {
        let term = &sort[i];
        let axis = &cursor.axes[i];
        let column = column_expr(&term.alias, &term.column);
        let tail = match (term.direction.clone(), cursor.forward) {
            (SortDirection::Asc, true) | (SortDirection::Desc, false) => Expr::compare(column, " > ", axis.value.clone()),
            (SortDirection::Desc, true) | (SortDirection::Asc, false) => Expr::compare(column, " < ", axis.value.clone()),
        };
        let prefix_eq = Expr::and_all(sort[..i].iter().zip(cursor.axes[..i].iter()).map(|(t, a)| {
            Expr::compare(column_expr(&t.alias, &t.column), " = ", a.value.clone())
        }));
        clauses.push(if i == 0 { tail } else { prefix_eq.and(tail) });
    }

    Some(Expr::or_all(clauses))
}

fn json_to_param(value: &serde_json::Value) -> SqlParam {
    match value {
        serde_json::Value::Null => SqlParam::Null,
        serde_json::Value::Bool(b) => SqlParam::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlParam::Int(i)
            } else {
                SqlParam::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => SqlParam::Text(s.clone()),
        other => SqlParam::Json(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SelectColumn;
    use crate::request::QualifiedIdentifier;

    #[test]
    fn test_build_read_simple() {
        let plan = ReadPlan {
            type_name: "articles".into(),
            table: QualifiedIdentifier::new("public", "articles"),
            pk_columns: vec!["id".into()],
            select: vec![SelectColumn {
                alias: String::new(),
                column: "id".into(),
                output_name: "id".into(),
                expression: None,
                is_relationship_key: false,
            }],
            joins: vec![],
            filters: vec![],
            raw_filters: vec![],
            sort: vec![],
            pagination: None,
            distinct: false,
        };
        let sql = QueryBuilder::build_read(&plan, None).unwrap();
        let (query, _params) = sql.build();
        assert!(query.contains("SELECT"));
        assert!(query.contains("articles"));
    }

    #[test]
    fn test_json_to_param_number() {
        assert!(matches!(json_to_param(&serde_json::json!(5)), SqlParam::Int(5)));
        assert!(matches!(json_to_param(&serde_json::json!(null)), SqlParam::Null));
    }

    #[test]
    fn test_build_read_distinct_joins_use_left_alias() {
        let plan = ReadPlan {
            type_name: "comments".into(),
            table: QualifiedIdentifier::new("public", "comments"),
            pk_columns: vec!["id".into()],
            select: vec![SelectColumn {
                alias: String::new(),
                column: "id".into(),
                output_name: "id".into(),
                expression: None,
                is_relationship_key: false,
            }],
            joins: vec![
                crate::plan::PlannedJoin {
                    alias: "j_article".into(),
                    table: QualifiedIdentifier::new("public", "articles"),
                    on_left_column: "article_id".into(),
                    on_right_column: "id".into(),
                    left_alias: None,
                    one_to_many: false,
                },
                crate::plan::PlannedJoin {
                    alias: "j_article_tags".into(),
                    table: QualifiedIdentifier::new("public", "articles_tags"),
                    on_left_column: "id".into(),
                    on_right_column: "article_id".into(),
                    left_alias: Some("j_article".into()),
                    one_to_many: true,
                },
            ],
            filters: vec![],
            raw_filters: vec![],
            sort: vec![],
            pagination: None,
            distinct: true,
        };
        let sql = QueryBuilder::build_read(&plan, None).unwrap();
        let (query, _params) = sql.build();
        assert!(query.contains("SELECT DISTINCT"));
        assert!(query.contains("\"j_article\".\"id\" = \"public\".\"comments\".\"article_id\""));
        assert!(query.contains("\"j_article_tags\".\"article_id\" = \"j_article\".\"id\""));

        let count_sql = QueryBuilder::build_count(&plan).unwrap();
        assert!(count_sql.sql().contains("COUNT(DISTINCT \"id\")"));
    }
}
