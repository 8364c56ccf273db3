//! Cursor-based pagination
//!
//! Implements the Relay Connection shapes plus the paginator seam used by page
//! fields. A [`Paginator`] decides the window for a page; the adapter applies it
//! and records bookkeeping in a [`PaginationContext`] that is read once when the
//! outer query is finished.

use async_graphql::SimpleObject;
use async_graphql_value::ConstValue;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::adapter::{OrmAdapter, OrderDirection};
use crate::config::ResolverConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::graph::ResolveContext;

/// Information about pagination in a connection
#[derive(SimpleObject, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// When paginating forwards, are there more items?
    pub has_next_page: bool,
    /// When paginating backwards, are there more items?
    pub has_previous_page: bool,
    /// Cursor of the first item in this page
    pub start_cursor: Option<String>,
    /// Cursor of the last item in this page
    pub end_cursor: Option<String>,
    /// Total count of items (if available)
    pub total_count: Option<i64>,
}

/// An edge in a connection, containing a node and cursor
#[derive(Serialize, Debug, Clone)]
pub struct Edge<T> {
    /// The item at the end of the edge
    pub node: T,
    /// A cursor for pagination
    pub cursor: String,
}

/// A paginated connection result
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    /// The edges in this connection
    pub edges: Vec<Edge<T>>,
    /// The nodes without their cursors
    pub nodes: Vec<T>,
    /// Pagination information
    pub page_info: PageInfo,
    /// Total count of items matching the query
    pub total_count: i64,
}

impl<T: Clone> Connection<T> {
    /// Create an empty connection
    pub fn empty() -> Self {
        Self::from_items(Vec::new(), 0, 0)
    }

    /// Create a connection from a list of items
    ///
    /// # Arguments
    /// * `items` - The items to include in this page
    /// * `offset` - The offset of the first item (for cursor generation)
    /// * `total` - Total count of items matching the query
    pub fn from_items(items: Vec<T>, offset: i64, total: i64) -> Self {
        let has_next_page = (offset + items.len() as i64) < total;
        let has_previous_page = offset > 0;

        let edges: Vec<Edge<T>> = items
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, node)| Edge {
                cursor: encode_cursor(offset + i as i64),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            total_count: Some(total),
        };

        Self {
            edges,
            nodes: items,
            page_info,
            total_count: total,
        }
    }
}

/// Macro to define a GraphQL connection type for a specific node type
///
/// The generated types deserialize from the connection documents produced by the
/// SQLite adapter.
///
/// Usage:
/// ```ignore
/// define_connection!(PostConnection, PostEdge, Post);
/// ```
#[macro_export]
macro_rules! define_connection {
    ($conn_name:ident, $edge_name:ident, $node_type:ty) => {
        /// Edge containing a node and cursor
        #[derive(async_graphql::SimpleObject, serde::Deserialize, Debug, Clone)]
        pub struct $edge_name {
            /// The item at the end of the edge
            pub node: $node_type,
            /// A cursor for pagination
            pub cursor: String,
        }

        /// Connection containing edges and page info
        #[derive(async_graphql::SimpleObject, serde::Deserialize, Debug, Clone)]
        #[serde(rename_all = "camelCase")]
        pub struct $conn_name {
            /// The edges in this connection
            pub edges: Vec<$edge_name>,
            /// The nodes without their cursors
            pub nodes: Vec<$node_type>,
            /// Pagination information
            pub page_info: $crate::pagination::PageInfo,
            /// Total count of items matching the query
            pub total_count: i64,
        }
    };
}

/// Encode an offset as a cursor string
pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("cursor:{}", offset))
}

/// Decode a cursor string to an offset
pub fn decode_cursor(cursor: &str) -> Result<i64, &'static str> {
    let decoded = BASE64.decode(cursor).map_err(|_| "invalid cursor format")?;

    let s = String::from_utf8(decoded).map_err(|_| "invalid cursor encoding")?;

    let Some(value) = s.strip_prefix("cursor:") else {
        return Err("invalid cursor prefix");
    };

    value.parse().map_err(|_| "invalid cursor value")
}

/// The window a paginator selected for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Rows to skip
    pub offset: u64,
    /// Rows to return
    pub limit: u64,
    /// Ordering that makes the offsets stable
    pub order: Vec<(String, OrderDirection)>,
}

/// Single-write, single-read bookkeeping channel for one paginated relation.
///
/// Created empty per relation field; the adapter writes it while composing the
/// subquery and reads it once while finishing the outer query.
#[derive(Debug)]
pub struct PaginationContext<S> {
    state: Option<S>,
    written: bool,
}

impl<S> Default for PaginationContext<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PaginationContext<S> {
    pub fn new() -> Self {
        Self {
            state: None,
            written: false,
        }
    }

    /// Store the bookkeeping. Fails if the context was already written.
    pub fn record(&mut self, state: S) -> ResolveResult<()> {
        if self.written {
            return Err(ResolveError::PaginationContextReused);
        }
        self.written = true;
        self.state = Some(state);
        Ok(())
    }

    /// Take the bookkeeping for `field`. Fails if nothing was recorded or it was
    /// already taken.
    pub fn take(&mut self, field: &str) -> ResolveResult<S> {
        match self.state.take() {
            Some(state) => Ok(state),
            None if self.written => Err(ResolveError::PaginationContextReused),
            None => Err(ResolveError::PaginationContextMissing {
                field: field.to_string(),
            }),
        }
    }

    /// Whether bookkeeping has been recorded
    pub fn is_written(&self) -> bool {
        self.written
    }
}

/// Decides how a page field's subquery is windowed.
pub trait Paginator<A: OrmAdapter>: Send + Sync {
    /// Shape `query` for the requested page, ending with the adapter's
    /// `modify_subquery_pagination`.
    fn paginate(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
        pagination: &mut PaginationContext<A::PageState>,
    ) -> ResolveResult<A::Query>;
}

/// Forward pagination over `first` / `after` with opaque offset cursors.
///
/// Ordering columns prefixed with `-` sort descending.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    order: Vec<(String, OrderDirection)>,
}

impl Default for CursorPaginator {
    fn default() -> Self {
        Self::new(["id"])
    }
}

impl CursorPaginator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let order = fields
            .into_iter()
            .map(|field| {
                let field = field.as_ref();
                match field.strip_prefix('-') {
                    Some(column) => (column.to_string(), OrderDirection::Desc),
                    None => (field.to_string(), OrderDirection::Asc),
                }
            })
            .collect();
        Self { order }
    }

    /// Translate `first` / `after` into a page window
    pub fn page_request(
        &self,
        first: Option<ConstValue>,
        after: Option<ConstValue>,
        config: &ResolverConfig,
    ) -> ResolveResult<PageRequest> {
        let requested = match first {
            None | Some(ConstValue::Null) => None,
            Some(ConstValue::Number(n)) => Some(n.as_u64().ok_or_else(|| {
                ResolveError::invalid_argument("first", format!("{n} is not a non-negative integer"))
            })?),
            Some(other) => {
                return Err(ResolveError::invalid_argument(
                    "first",
                    format!("{other} is not an integer"),
                ));
            }
        };

        let offset = match after {
            None | Some(ConstValue::Null) => 0,
            Some(ConstValue::String(cursor)) => {
                let position = decode_cursor(&cursor)
                    .map_err(|reason| ResolveError::invalid_argument("after", reason))?;
                u64::try_from(position)
                    .map_err(|_| ResolveError::invalid_argument("after", "negative cursor"))?
                    + 1 // Start after the cursor
            }
            Some(other) => {
                return Err(ResolveError::invalid_argument(
                    "after",
                    format!("{other} is not a cursor"),
                ));
            }
        };

        Ok(PageRequest {
            offset,
            limit: config.page_size(requested),
            order: self.order.clone(),
        })
    }
}

impl<A: OrmAdapter> Paginator<A> for CursorPaginator {
    fn paginate(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
        pagination: &mut PaginationContext<A::PageState>,
    ) -> ResolveResult<A::Query> {
        let page = self.page_request(
            context.argument("first"),
            context.argument("after"),
            context.graph().config(),
        )?;

        tracing::trace!(
            field = context.field(),
            offset = page.offset,
            limit = page.limit,
            "Paginating"
        );

        let adapter = context.graph().adapter();
        let mut query = query;
        for (column, direction) in &page.order {
            query = adapter.order_by(query, column, *direction)?;
        }
        adapter.modify_subquery_pagination(query, &page, pagination)
    }
}
