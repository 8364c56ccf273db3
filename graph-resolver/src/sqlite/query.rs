//! SQLite query object and compilation
//!
//! A resolved [`SqliteQuery`] compiles into a single statement returning one JSON
//! document per root row. Relations become correlated subqueries:
//!
//! ```sql
//! SELECT json_object('id', t0."id", 'posts', json((
//!     SELECT json_group_array(json(_r1.node)) FROM (
//!         SELECT json_object('id', t1."id") AS node
//!         FROM "post" AS t1 WHERE t1."user_id" = t0."id" ORDER BY t1."id" ASC LIMIT 25
//!     ) AS _r1
//! ))) AS node FROM "user" AS t0
//! ```
//!
//! Parameters are positional `?` placeholders bound in textual order.

use crate::adapter::OrderDirection;

use super::SqlitePageState;
use super::entity::{ModelDef, RelationKind, SqlValue};

/// SQL fragment with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone)]
enum Select {
    Column { column: String, alias: String },
    Raw { expr: Fragment, alias: String },
}

/// Correlation between a relation subquery and its parent row
#[derive(Debug, Clone)]
pub(crate) struct Join {
    /// Column on the related table
    pub child_column: String,
    /// Column on the parent table
    pub parent_column: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RelationSelect {
    pub alias: String,
    pub kind: RelationKind,
    pub join: Join,
    pub query: SqliteQuery,
    /// Set by `finish_query_pagination`
    pub page: Option<SqlitePageState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub offset: u64,
    pub limit: Option<u64>,
}

/// The adapter query object: one table plus everything the engine folded into it.
#[derive(Debug, Clone)]
pub struct SqliteQuery {
    table: String,
    depth: usize,
    columns: Vec<String>,
    selects: Vec<Select>,
    conditions: Vec<Fragment>,
    order: Vec<(String, OrderDirection)>,
    window: Option<Window>,
    relations: Vec<RelationSelect>,
}

impl SqliteQuery {
    pub(crate) fn for_model(model: &ModelDef, depth: usize) -> Self {
        Self {
            table: model.table.clone(),
            depth,
            columns: model.columns.clone(),
            selects: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            window: None,
            relations: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Alias of this query's table in the compiled statement (`t0` for the root)
    pub fn alias(&self) -> String {
        format!("t{}", self.depth)
    }

    /// Qualified reference to one of this query's columns, for raw expressions
    pub fn column_ref(&self, column: &str) -> String {
        format!("{}.{}", self.alias(), quote_ident(column))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Add a raw expression under `alias`
    pub fn select_raw(self, expr: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select_raw_with(expr, alias, Vec::new())
    }

    /// Add a raw expression with `?` parameters under `alias`
    pub fn select_raw_with(
        mut self,
        expr: impl Into<String>,
        alias: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Self {
        self.selects.push(Select::Raw {
            expr: Fragment {
                sql: expr.into(),
                params,
            },
            alias: alias.into(),
        });
        self
    }

    /// Add a raw WHERE clause condition
    pub fn where_raw(mut self, condition: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.conditions.push(Fragment {
            sql: condition.into(),
            params,
        });
        self
    }

    /// Restrict to the row with the given primary key value
    pub fn find_by(self, column: &str, value: impl Into<SqlValue>) -> Self {
        let condition = format!("{} = ?", self.column_ref(column));
        self.where_raw(condition, vec![value.into()])
    }

    /// Set limit directly.
    pub fn limit(mut self, limit: u64) -> Self {
        let offset = self.window.map(|w| w.offset).unwrap_or(0);
        self.window = Some(Window {
            offset,
            limit: Some(limit),
        });
        self
    }

    /// Set offset directly.
    pub fn offset(mut self, offset: u64) -> Self {
        let limit = self.window.and_then(|w| w.limit);
        self.window = Some(Window { offset, limit });
        self
    }

    pub(crate) fn push_column(&mut self, column: String, alias: String) {
        self.selects.push(Select::Column { column, alias });
    }

    pub(crate) fn push_condition(&mut self, condition: Fragment) {
        self.conditions.push(condition);
    }

    pub(crate) fn push_order(&mut self, column: String, direction: OrderDirection) {
        self.order.push((column, direction));
    }

    pub(crate) fn push_relation(&mut self, relation: RelationSelect) {
        self.relations.push(relation);
    }

    pub(crate) fn relation_mut(&mut self, alias: &str) -> Option<&mut RelationSelect> {
        self.relations.iter_mut().find(|r| r.alias == alias)
    }

    pub(crate) fn relations(&self) -> &[RelationSelect] {
        &self.relations
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_window(&mut self, window: Window) {
        self.window = Some(window);
    }

    pub(crate) fn offset_value(&self) -> u64 {
        self.window.map(|w| w.offset).unwrap_or(0)
    }

    /// Statement returning one `node` JSON document per row
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut w = SqlWriter::default();
        w.push("SELECT ");
        self.write_node(&mut w);
        w.push(" AS node");
        self.write_from(&mut w, None);
        self.write_tail(&mut w, self.window);
        w.finish()
    }

    /// Statement returning a single `{nodes, totalCount}` document
    pub fn to_page_sql(&self) -> (String, Vec<SqlValue>) {
        let mut w = SqlWriter::default();
        w.push("SELECT ");
        self.write_page(&mut w, None);
        w.push(" AS node");
        w.finish()
    }

    fn write_node(&self, w: &mut SqlWriter) {
        let alias = self.alias();
        w.push("json_object(");
        let mut first = true;
        let mut key = |w: &mut SqlWriter, name: &str| {
            if !first {
                w.push(", ");
            }
            first = false;
            w.push(&quote_literal(name));
            w.push(", ");
        };

        for column in &self.columns {
            key(w, column);
            w.push(&format!("{alias}.{}", quote_ident(column)));
        }
        for select in &self.selects {
            match select {
                Select::Column { column, alias: key_name } => {
                    key(w, key_name);
                    w.push(&format!("{alias}.{}", quote_ident(column)));
                }
                Select::Raw { expr, alias: key_name } => {
                    key(w, key_name);
                    w.push("(");
                    w.push_fragment(expr);
                    w.push(")");
                }
            }
        }
        for relation in &self.relations {
            key(w, &relation.alias);
            relation.write(w, &alias);
        }
        w.push(")");
    }

    fn write_from(&self, w: &mut SqlWriter, join: Option<(&Join, &str)>) {
        let alias = self.alias();
        w.push(&format!(" FROM {} AS {alias}", quote_ident(&self.table)));

        let mut first = true;
        let mut and = |w: &mut SqlWriter| {
            w.push(if first { " WHERE " } else { " AND " });
            first = false;
        };
        if let Some((join, parent)) = join {
            and(w);
            w.push(&format!(
                "{alias}.{} = {parent}.{}",
                quote_ident(&join.child_column),
                quote_ident(&join.parent_column)
            ));
        }
        for condition in &self.conditions {
            and(w);
            w.push("(");
            w.push_fragment(condition);
            w.push(")");
        }
    }

    fn write_tail(&self, w: &mut SqlWriter, window: Option<Window>) {
        let alias = self.alias();
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, direction)| {
                    format!("{alias}.{} {}", quote_ident(column), direction.to_sql())
                })
                .collect::<Vec<_>>()
                .join(", ");
            w.push(" ORDER BY ");
            w.push(&order);
        }

        if let Some(window) = window {
            match window.limit {
                Some(limit) => w.push(&format!(" LIMIT {limit}")),
                None if window.offset > 0 => w.push(" LIMIT -1"),
                None => {}
            }
            if window.offset > 0 {
                w.push(&format!(" OFFSET {}", window.offset));
            }
        }
    }

    fn write_collection(&self, w: &mut SqlWriter, join: Option<(&Join, &str)>) {
        let rows = format!("_r{}", self.depth);
        w.push(&format!("json((SELECT json_group_array(json({rows}.node)) FROM (SELECT "));
        self.write_node(w);
        w.push(" AS node");
        self.write_from(w, join);
        self.write_tail(w, self.window);
        w.push(&format!(") AS {rows}))"));
    }

    fn write_count(&self, w: &mut SqlWriter, join: Option<(&Join, &str)>) {
        w.push("(SELECT count(*)");
        self.write_from(w, join);
        w.push(")");
    }

    fn write_page(&self, w: &mut SqlWriter, join: Option<(&Join, &str)>) {
        w.push("json_object('nodes', ");
        self.write_collection(w, join);
        w.push(", 'totalCount', ");
        self.write_count(w, join);
        w.push(")");
    }

    fn write_single(&self, w: &mut SqlWriter, join: Option<(&Join, &str)>) {
        w.push("json((SELECT ");
        self.write_node(w);
        self.write_from(w, join);
        let window = Window {
            offset: self.offset_value(),
            limit: Some(1),
        };
        self.write_tail(w, Some(window));
        w.push("))");
    }
}

impl RelationSelect {
    fn write(&self, w: &mut SqlWriter, parent_alias: &str) {
        let join = Some((&self.join, parent_alias));
        if self.page.is_some() {
            self.query.write_page(w, join);
        } else if self.kind.is_multiple() {
            self.query.write_collection(w, join);
        } else {
            self.query.write_single(w, join);
        }
    }
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn push_fragment(&mut self, fragment: &Fragment) {
        self.sql.push_str(&fragment.sql);
        self.params.extend(fragment.params.iter().cloned());
    }

    fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

/// Quote an identifier for SQLite
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
