use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder};

use super::remote::{EmbeddedSelect, Filter, Order, RemoteStore, Row};
use crate::{
    config::Config,
    error::{StoreError, StoreResult},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database_url())
            .await?;
        tracing::info!(
            "Connected to PostgreSQL at {}:{}",
            config.database.host,
            config.database.port
        );
        Ok(Self { pool })
    }

    /// Creates the record relations if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    alias: &str,
    filters: &[Filter],
    keyword: &str,
) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { keyword } else { " AND " });
        qb.push(format!("to_jsonb({}.{}) = ", alias, quote_ident(&filter.column)));
        qb.push_bind(Json(filter.value.clone()));
    }
}

/// Sorted union of the columns present in `rows`.
fn column_list(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn quoted_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_query(
    relation: &str,
    filters: &[Filter],
    order: Option<&Order>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT to_jsonb(t.*) FROM ");
    qb.push(quote_ident(relation)).push(" AS t");
    push_filters(&mut qb, "t", filters, " WHERE ");
    if let Some(order) = order {
        qb.push(format!(
            " ORDER BY t.{} {}",
            quote_ident(&order.column),
            if order.ascending { "ASC" } else { "DESC" }
        ));
    }
    qb
}

fn insert_query(
    relation: &str,
    rows: Vec<Row>,
    conflict: Option<&[&str]>,
) -> QueryBuilder<'static, Postgres> {
    let columns = quoted_columns(&column_list(&rows));
    let payload = Value::Array(rows.into_iter().map(Value::Object).collect());
    let table = quote_ident(relation);

    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} AS t ({}) SELECT {} FROM jsonb_populate_recordset(NULL::{}, ",
        table, columns, columns, table
    ));
    qb.push_bind(Json(payload));
    qb.push(")");
    match conflict {
        Some(target) => {
            let target: Vec<String> = target.iter().map(|c| c.to_string()).collect();
            qb.push(format!(" ON CONFLICT ({}) DO NOTHING", quoted_columns(&target)));
        }
        None => {
            qb.push(" RETURNING to_jsonb(t.*)");
        }
    }
    qb
}

fn update_query(
    relation: &str,
    changes: Row,
    filters: &[Filter],
) -> QueryBuilder<'static, Postgres> {
    let table = quote_ident(relation);
    let assignments = changes
        .keys()
        .map(|c| format!("{} = r.{}", quote_ident(c), quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut qb = QueryBuilder::new(format!(
        "UPDATE {} AS t SET {} FROM jsonb_populate_record(NULL::{}, ",
        table, assignments, table
    ));
    qb.push_bind(Json(Value::Object(changes)));
    qb.push(") AS r");
    push_filters(&mut qb, "t", filters, " WHERE ");
    qb.push(" RETURNING to_jsonb(t.*)");
    qb
}

fn delete_query(relation: &str, filters: &[Filter]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} AS t", quote_ident(relation)));
    push_filters(&mut qb, "t", filters, " WHERE ");
    qb
}

fn embedded_query(query: &EmbeddedSelect) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT to_jsonb(p.*) || jsonb_build_object(");
    qb.push_bind(query.through.clone());
    qb.push("::text, COALESCE((SELECT jsonb_agg(jsonb_build_object(");
    qb.push_bind(query.target.clone());
    qb.push(format!(
        "::text, CASE WHEN x.{tk} IS NULL THEN 'null'::jsonb ELSE to_jsonb(x.*) END)) FROM {through} AS j LEFT JOIN {target} AS x ON x.{tk} = j.{tt} WHERE j.{tp} = p.{pk}",
        tk = quote_ident(&query.target_key),
        through = quote_ident(&query.through),
        target = quote_ident(&query.target),
        tt = quote_ident(&query.through_target),
        tp = quote_ident(&query.through_parent),
        pk = quote_ident(&query.parent_key),
    ));
    push_filters(&mut qb, "j", &query.through_filters, " AND ");
    qb.push("), '[]'::jsonb)) FROM ");
    qb.push(quote_ident(&query.relation)).push(" AS p");
    push_filters(&mut qb, "p", &query.filters, " WHERE ");
    qb
}

fn into_rows(values: Vec<Value>) -> StoreResult<Vec<Row>> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(row) => Ok(row),
            other => Err(StoreError::Rejected(format!("Expected a row object, got {}", other))),
        })
        .collect()
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> StoreResult<Vec<Row>> {
        let mut qb = select_query(relation, filters, order);
        let values: Vec<Value> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        into_rows(values)
    }

    async fn select_embedded(&self, query: &EmbeddedSelect) -> StoreResult<Vec<Row>> {
        let mut qb = embedded_query(query);
        let values: Vec<Value> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        into_rows(values)
    }

    async fn insert(&self, relation: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = insert_query(relation, rows, None);
        let values: Vec<Value> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        into_rows(values)
    }

    async fn update(
        &self,
        relation: &str,
        changes: Row,
        filters: &[Filter],
    ) -> StoreResult<Vec<Row>> {
        if changes.is_empty() {
            return self.select(relation, filters, None).await;
        }
        let mut qb = update_query(relation, changes, filters);
        let values: Vec<Value> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        into_rows(values)
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> StoreResult<()> {
        let mut qb = delete_query(relation, filters);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, relation: &str, rows: Vec<Row>, conflict: &[&str]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = insert_query(relation, rows, Some(conflict));
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("fullName"), "\"fullName\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn select_binds_filters_and_orders() {
        let qb = select_query(
            "promo",
            &[Filter::eq("user_id", "u1"), Filter::eq("promo_id", "p1")],
            Some(&Order::desc("inserted_at")),
        );
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(t.*) FROM \"promo\" AS t WHERE to_jsonb(t.\"user_id\") = $1 \
             AND to_jsonb(t.\"promo_id\") = $2 ORDER BY t.\"inserted_at\" DESC"
        );
    }

    #[test]
    fn insert_names_only_supplied_columns() {
        let qb = insert_query(
            "cards",
            vec![row(json!({ "card_id": "c1", "display_name": "Pikachu" }))],
            None,
        );
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"cards\" AS t (\"card_id\", \"display_name\") SELECT \"card_id\", \"display_name\" \
             FROM jsonb_populate_recordset(NULL::\"cards\", $1) RETURNING to_jsonb(t.*)"
        );
    }

    #[test]
    fn upsert_does_nothing_on_conflict() {
        let qb = insert_query(
            "repack_promo",
            vec![row(json!({ "repack_id": "r1", "promo_id": "p1", "user_id": "u1" }))],
            Some(&["repack_id", "promo_id"]),
        );
        assert!(qb.sql().ends_with("ON CONFLICT (\"repack_id\", \"promo_id\") DO NOTHING"));
    }

    #[test]
    fn update_assigns_from_populated_record() {
        let qb = update_query(
            "players",
            row(json!({ "name": "Alex" })),
            &[Filter::eq("player_id", "pl1")],
        );
        assert_eq!(
            qb.sql(),
            "UPDATE \"players\" AS t SET \"name\" = r.\"name\" FROM jsonb_populate_record(NULL::\"players\", $1) AS r \
             WHERE to_jsonb(t.\"player_id\") = $2 RETURNING to_jsonb(t.*)"
        );
    }

    #[test]
    fn embedded_query_filters_join_rows() {
        let query = EmbeddedSelect {
            relation: "repacks".into(),
            filters: vec![Filter::eq("repacks_id", "r1")],
            parent_key: "repacks_id".into(),
            through: "repack_promo".into(),
            through_parent: "repack_id".into(),
            through_target: "promo_id".into(),
            through_filters: vec![Filter::eq("user_id", "u1")],
            target: "promo".into(),
            target_key: "promo_id".into(),
        };
        let qb = embedded_query(&query);
        let sql = qb.sql();

        assert!(sql.contains("LEFT JOIN \"promo\" AS x ON x.\"promo_id\" = j.\"promo_id\""));
        assert!(sql.contains("WHERE j.\"repack_id\" = p.\"repacks_id\" AND to_jsonb(j.\"user_id\") = $3"));
        assert!(sql.ends_with("FROM \"repacks\" AS p WHERE to_jsonb(p.\"repacks_id\") = $4"));
    }
}
