//! SQLite adapter
//!
//! Implements [`OrmAdapter`] on top of `sqlx`. A resolved query runs as one
//! statement; relations and connections are assembled by SQLite's JSON functions
//! and shaped into Relay connections after the fetch.
//!
//! ```rust,ignore
//! let adapter = SqliteAdapter::new()
//!     .model(ModelDef::of::<User>().has_many("posts", "post", "user_id"))
//!     .model(ModelDef::of::<Post>().belongs_to("author", "user", "user_id"));
//!
//! let query = resolver.resolve(adapter.query("user")?, "User", &selection, &variables)?;
//! let users = resolver.adapter().fetch_all(&pool, query).await?;
//! ```

mod entity;
mod query;
mod shape;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::adapter::{Operator, OrderDirection, OrmAdapter, RelationSpec};
use crate::error::{ResolveError, ResolveResult};
use crate::filter::FilterValue;
use crate::pagination::{Connection, PageRequest, PaginationContext};

pub use entity::{DatabaseEntity, ModelDef, RelationDef, RelationKind, SqlValue};
pub use graph_resolver_macros::DatabaseEntity;
pub use query::{SqliteQuery, quote_ident};

use query::{Fragment, Join, RelationSelect, Window};

/// Bookkeeping carried from a relation subquery to the outer query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlitePageState {
    pub offset: u64,
    pub limit: u64,
}

/// Model registry plus the query operations the engine drives.
#[derive(Debug, Clone, Default)]
pub struct SqliteAdapter {
    models: HashMap<String, ModelDef>,
}

impl SqliteAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table
    pub fn model(mut self, model: ModelDef) -> Self {
        self.models.insert(model.table.clone(), model);
        self
    }

    fn model_def(&self, table: &str) -> ResolveResult<&ModelDef> {
        self.models
            .get(table)
            .ok_or_else(|| ResolveError::UnknownModel(table.to_string()))
    }

    /// Start a root query on `table`
    pub fn query(&self, table: &str) -> ResolveResult<SqliteQuery> {
        Ok(SqliteQuery::for_model(self.model_def(table)?, 0))
    }

    /// Execute the query and return one JSON document per row.
    pub async fn fetch_all(&self, pool: &SqlitePool, query: SqliteQuery) -> ResolveResult<Vec<Value>> {
        let (sql, params) = query.to_sql();
        tracing::debug!(sql = %sql, params = params.len(), "Executing graph query");

        let mut statement = sqlx::query(&sql);
        for value in &params {
            statement = value.bind_to_query(statement);
        }

        let rows = statement.fetch_all(pool).await?;
        rows.iter()
            .map(|row| -> ResolveResult<Value> {
                let node: String = row.try_get("node")?;
                let mut node: Value = serde_json::from_str(&node)?;
                shape::shape_node(&query, &mut node)?;
                Ok(node)
            })
            .collect()
    }

    /// Execute the query and return the first row, if any.
    pub async fn fetch_optional(
        &self,
        pool: &SqlitePool,
        query: SqliteQuery,
    ) -> ResolveResult<Option<Value>> {
        let query = query.limit(1);
        Ok(self.fetch_all(pool, query).await?.into_iter().next())
    }

    /// Execute a paginated root query and return a Relay-style connection.
    ///
    /// The page rows and the total count come back from the same statement.
    pub async fn fetch_connection(
        &self,
        pool: &SqlitePool,
        query: SqliteQuery,
    ) -> ResolveResult<Connection<Value>> {
        let (sql, params) = query.to_page_sql();
        tracing::debug!(sql = %sql, params = params.len(), "Executing graph page query");

        let mut statement = sqlx::query(&sql);
        for value in &params {
            statement = value.bind_to_query(statement);
        }

        let row = statement.fetch_one(pool).await?;
        let page: String = row.try_get("node")?;
        let page: Value = serde_json::from_str(&page)?;
        shape::shape_connection(&query, page, query.offset_value())
    }

    /// Insert a row from a serializable entity, returning the new rowid.
    ///
    /// A null or missing primary key is left for SQLite to assign.
    pub async fn insert<E>(&self, pool: &SqlitePool, entity: &E) -> ResolveResult<i64>
    where
        E: DatabaseEntity + Serialize,
    {
        let value = serde_json::to_value(entity)?;
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for column in E::column_names() {
            let field = value.get(*column).unwrap_or(&Value::Null);
            if *column == E::PRIMARY_KEY && field.is_null() {
                continue;
            }
            columns.push(quote_ident(column));
            values.push(SqlValue::from_json(field));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(E::TABLE_NAME))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(E::TABLE_NAME),
                columns.join(", "),
                vec!["?"; values.len()].join(", ")
            )
        };
        tracing::debug!(sql = %sql, "Inserting row");

        let mut statement = sqlx::query(&sql);
        for value in &values {
            statement = value.bind_to_query(statement);
        }
        let result = statement.execute(pool).await?;
        Ok(result.last_insert_rowid())
    }

    fn require_column(&self, query: &SqliteQuery, column: &str) -> ResolveResult<()> {
        if query.has_column(column) {
            Ok(())
        } else {
            Err(ResolveError::unknown_field(query.table(), column))
        }
    }
}

impl OrmAdapter for SqliteAdapter {
    type Query = SqliteQuery;
    type PageState = SqlitePageState;

    fn select_relation<F>(
        &self,
        mut query: SqliteQuery,
        relation: RelationSpec<'_>,
        modify: F,
    ) -> ResolveResult<SqliteQuery>
    where
        F: FnOnce(SqliteQuery) -> ResolveResult<SqliteQuery>,
    {
        let model = self.model_def(query.table())?;
        let def = model
            .relations
            .get(relation.relation)
            .ok_or_else(|| ResolveError::UnknownRelation {
                table: model.table.clone(),
                relation: relation.relation.to_string(),
            })?;
        let target = self.model_def(&def.table)?;

        let join = match def.kind {
            RelationKind::BelongsTo => Join {
                child_column: target.primary_key.clone(),
                parent_column: def.foreign_key.clone(),
            },
            RelationKind::HasOne | RelationKind::HasMany => Join {
                child_column: def.foreign_key.clone(),
                parent_column: model.primary_key.clone(),
            },
        };

        let subquery = modify(SqliteQuery::for_model(target, query.depth() + 1))?;
        query.push_relation(RelationSelect {
            alias: relation.alias.to_string(),
            kind: def.kind,
            join,
            query: subquery,
            page: None,
        });
        Ok(query)
    }

    fn where_field(
        &self,
        mut query: SqliteQuery,
        field: &str,
        operator: Option<&str>,
        value: &FilterValue,
    ) -> ResolveResult<SqliteQuery> {
        let op = Operator::parse(field, operator)?;
        self.require_column(&query, field)?;
        let condition = condition(&query.column_ref(field), field, op, value)?;
        query.push_condition(condition);
        Ok(query)
    }

    fn select_column(
        &self,
        mut query: SqliteQuery,
        column: &str,
        alias: &str,
    ) -> ResolveResult<SqliteQuery> {
        self.require_column(&query, column)?;
        query.push_column(column.to_string(), alias.to_string());
        Ok(query)
    }

    fn order_by(
        &self,
        mut query: SqliteQuery,
        column: &str,
        direction: OrderDirection,
    ) -> ResolveResult<SqliteQuery> {
        self.require_column(&query, column)?;
        query.push_order(column.to_string(), direction);
        Ok(query)
    }

    fn modify_subquery_pagination(
        &self,
        mut subquery: SqliteQuery,
        page: &PageRequest,
        pagination: &mut PaginationContext<SqlitePageState>,
    ) -> ResolveResult<SqliteQuery> {
        pagination.record(SqlitePageState {
            offset: page.offset,
            limit: page.limit,
        })?;
        subquery.set_window(Window {
            offset: page.offset,
            limit: Some(page.limit),
        });
        Ok(subquery)
    }

    fn finish_query_pagination(
        &self,
        mut query: SqliteQuery,
        field: &str,
        pagination: &mut PaginationContext<SqlitePageState>,
    ) -> ResolveResult<SqliteQuery> {
        let state = pagination.take(field)?;
        let table = query.table().to_string();
        let relation = query
            .relation_mut(field)
            .ok_or_else(|| ResolveError::UnknownRelation {
                table,
                relation: field.to_string(),
            })?;
        relation.page = Some(state);
        Ok(query)
    }
}

/// Compile one filter entry into a WHERE fragment
fn condition(
    column: &str,
    field: &str,
    op: Operator,
    value: &FilterValue,
) -> ResolveResult<Fragment> {
    let invalid = |reason: &str| ResolveError::invalid_filter_value(field, op.as_str(), reason);

    let fragment = match (op, value) {
        (Operator::Eq, FilterValue::Null) => Fragment {
            sql: format!("{column} IS NULL"),
            params: Vec::new(),
        },
        (Operator::Ne, FilterValue::Null) => Fragment {
            sql: format!("{column} IS NOT NULL"),
            params: Vec::new(),
        },
        (_, FilterValue::Null) => return Err(invalid("null is only valid for eq and ne")),
        (Operator::In | Operator::NotIn, FilterValue::List(items)) if items.is_empty() => {
            // Nothing is in an empty list
            Fragment {
                sql: if op == Operator::In { "0" } else { "1" }.to_string(),
                params: Vec::new(),
            }
        }
        (Operator::In | Operator::NotIn, FilterValue::List(items)) => Fragment {
            sql: format!(
                "{column} {} ({})",
                if op == Operator::In { "IN" } else { "NOT IN" },
                vec!["?"; items.len()].join(", ")
            ),
            params: items.iter().map(SqlValue::from).collect(),
        },
        (Operator::In | Operator::NotIn, FilterValue::Scalar(_)) => {
            return Err(invalid("expected a list"));
        }
        (_, FilterValue::List(_)) => return Err(invalid("expected a single value")),
        (op, FilterValue::Scalar(scalar)) => Fragment {
            sql: format!("{column} {} ?", comparison(op)),
            params: vec![SqlValue::from(scalar)],
        },
    };
    Ok(fragment)
}

fn comparison(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "<>",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
    }
}
