//! Table metadata for the SQLite adapter
//!
//! `DatabaseEntity` is implemented by `#[derive(DatabaseEntity)]`; `ModelDef` adds
//! the relations the engine may traverse.

use indexmap::IndexMap;
use serde_json::Value;

use crate::filter::FilterScalar;

/// Metadata about a database entity (table).
///
/// Implemented by `#[derive(DatabaseEntity)]` macro.
pub trait DatabaseEntity: Sized + Send + Sync {
    /// The SQL table name (e.g., "post")
    const TABLE_NAME: &'static str;

    /// The primary key column name (e.g., "id")
    const PRIMARY_KEY: &'static str;

    /// List of all column names in the table
    fn column_names() -> &'static [&'static str];
}

/// How a relation joins its target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Foreign key on this table points at the target's primary key
    BelongsTo,
    /// Foreign key on the target table points at this table's primary key, one row
    HasOne,
    /// Foreign key on the target table points at this table's primary key
    HasMany,
}

impl RelationKind {
    pub fn is_multiple(&self) -> bool {
        matches!(self, RelationKind::HasMany)
    }
}

/// A named relation from one model to another.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub kind: RelationKind,
    /// Target table
    pub table: String,
    /// Foreign key column (on this table for `BelongsTo`, on the target otherwise)
    pub foreign_key: String,
}

/// A table registered with the adapter.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub relations: IndexMap<String, RelationDef>,
}

impl ModelDef {
    pub fn new<I, S>(table: impl Into<String>, primary_key: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            relations: IndexMap::new(),
        }
    }

    /// Model definition from a derived entity
    pub fn of<E: DatabaseEntity>() -> Self {
        Self::new(
            E::TABLE_NAME,
            E::PRIMARY_KEY,
            E::column_names().iter().copied(),
        )
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::BelongsTo, table, foreign_key)
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::HasOne, table, foreign_key)
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::HasMany, table, foreign_key)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            name.into(),
            RelationDef {
                kind,
                table: table.into(),
                foreign_key: foreign_key.into(),
            },
        );
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Represents a SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Bind this value to a sqlx query
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    /// Convert a serialized field; arrays and objects are stored as JSON text
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::String(s.clone()),
            other => SqlValue::String(other.to_string()),
        }
    }
}

impl From<&FilterScalar> for SqlValue {
    fn from(value: &FilterScalar) -> Self {
        match value {
            FilterScalar::String(s) => SqlValue::String(s.clone()),
            FilterScalar::Int(i) => SqlValue::Int(*i),
            FilterScalar::Float(f) => SqlValue::Float(*f),
            FilterScalar::Bool(b) => SqlValue::Bool(*b),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(crate::sqlite::DatabaseEntity)]
    #[allow(dead_code)]
    struct BlogPost {
        #[primary_key]
        post_id: i64,
        title: String,
        #[skip]
        cached_html: String,
    }

    #[derive(crate::sqlite::DatabaseEntity)]
    #[database_entity(table = "people")]
    #[allow(dead_code)]
    struct Person {
        id: i64,
        name: String,
    }

    #[test]
    fn test_derived_metadata() {
        assert_eq!(BlogPost::TABLE_NAME, "blog_post");
        assert_eq!(BlogPost::PRIMARY_KEY, "post_id");
        assert_eq!(BlogPost::column_names(), &["post_id", "title"]);

        assert_eq!(Person::TABLE_NAME, "people");
        assert_eq!(Person::PRIMARY_KEY, "id");
        assert_eq!(Person::column_names(), &["id", "name"]);
    }

    #[test]
    fn test_model_def_relations() {
        let model = ModelDef::of::<Person>()
            .has_many("posts", "blog_post", "author_id")
            .has_one("profile", "profile", "person_id");
        assert!(model.has_column("name"));
        assert!(!model.has_column("posts"));
        assert_eq!(model.relations["posts"].kind, RelationKind::HasMany);
        assert!(model.relations["posts"].kind.is_multiple());
        assert!(!model.relations["profile"].kind.is_multiple());
    }

    #[test]
    fn test_sql_value_from_json() {
        assert_eq!(SqlValue::from_json(&json!(3)), SqlValue::Int(3));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from_json(&json!(["a"])),
            SqlValue::String("[\"a\"]".into())
        );
    }
}
