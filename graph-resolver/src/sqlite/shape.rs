//! Post-fetch shaping
//!
//! Paged relations come back as `{nodes, totalCount}`; they are rewritten into
//! connection documents using the bookkeeping recorded on the query plan.

use serde_json::Value;

use crate::error::ResolveResult;
use crate::pagination::Connection;

use super::query::SqliteQuery;

pub(crate) fn shape_node(query: &SqliteQuery, node: &mut Value) -> ResolveResult<()> {
    let Some(object) = node.as_object_mut() else {
        return Ok(());
    };

    for relation in query.relations() {
        let Some(value) = object.get_mut(&relation.alias) else {
            continue;
        };
        match relation.page {
            Some(state) => {
                let connection = shape_connection(&relation.query, value.take(), state.offset)?;
                *value = serde_json::to_value(connection)?;
            }
            None if relation.kind.is_multiple() => {
                if let Some(items) = value.as_array_mut() {
                    for item in items {
                        shape_node(&relation.query, item)?;
                    }
                }
            }
            None => shape_node(&relation.query, value)?,
        }
    }
    Ok(())
}

pub(crate) fn shape_connection(
    query: &SqliteQuery,
    mut page: Value,
    offset: u64,
) -> ResolveResult<Connection<Value>> {
    let total = page.get("totalCount").and_then(Value::as_i64).unwrap_or(0);
    let mut nodes = match page.get_mut("nodes").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    for node in &mut nodes {
        shape_node(query, node)?;
    }
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    Ok(Connection::from_items(nodes, offset, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{OrmAdapter, RelationSpec};
    use crate::pagination::{PageRequest, PaginationContext, encode_cursor};
    use crate::sqlite::{ModelDef, SqliteAdapter};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn adapter() -> SqliteAdapter {
        SqliteAdapter::new()
            .model(ModelDef::new("user", "id", ["id"]).has_many("posts", "post", "user_id"))
            .model(ModelDef::new("post", "id", ["id", "user_id"]).belongs_to("author", "user", "user_id"))
    }

    #[test]
    fn test_paged_relation_becomes_connection() {
        let adapter = adapter();
        let mut pagination = PaginationContext::new();
        let page = PageRequest {
            offset: 2,
            limit: 2,
            order: vec![],
        };
        let query = adapter
            .select_relation(
                adapter.query("user").unwrap(),
                RelationSpec {
                    relation: "posts",
                    alias: "posts",
                },
                |sub| {
                    let sub = adapter.select_relation(
                        sub,
                        RelationSpec {
                            relation: "author",
                            alias: "author",
                        },
                        Ok,
                    )?;
                    adapter.modify_subquery_pagination(sub, &page, &mut pagination)
                },
            )
            .unwrap();
        let query = adapter
            .finish_query_pagination(query, "posts", &mut pagination)
            .unwrap();

        let mut node = json!({
            "id": 1,
            "posts": {
                "nodes": [{ "id": 3, "author": { "id": 1 } }],
                "totalCount": 3
            }
        });
        shape_node(&query, &mut node).unwrap();

        assert_eq!(
            node,
            json!({
                "id": 1,
                "posts": {
                    "edges": [{ "node": { "id": 3, "author": { "id": 1 } }, "cursor": encode_cursor(2) }],
                    "nodes": [{ "id": 3, "author": { "id": 1 } }],
                    "pageInfo": {
                        "hasNextPage": false,
                        "hasPreviousPage": true,
                        "startCursor": encode_cursor(2),
                        "endCursor": encode_cursor(2),
                        "totalCount": 3
                    },
                    "totalCount": 3
                }
            })
        );
    }

    #[test]
    fn test_missing_single_relation_stays_null() {
        let adapter = adapter();
        let query = adapter
            .select_relation(
                adapter.query("post").unwrap(),
                RelationSpec {
                    relation: "author",
                    alias: "author",
                },
                Ok,
            )
            .unwrap();
        let mut node = json!({ "id": 1, "author": null });
        shape_node(&query, &mut node).unwrap();
        assert_eq!(node, json!({ "id": 1, "author": null }));
    }
}
