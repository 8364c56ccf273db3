//! Graph resolver
//!
//! Resolves a GraphQL selection tree into one composite query plan instead of one
//! round trip per field. Fields are declared per GraphQL type in a
//! [`GraphResolver`]; the engine folds every selected field, filter and page into
//! the query of an [`OrmAdapter`], and the caller executes the result once.
//!
//! ```rust,ignore
//! let resolver = GraphResolver::new(adapter)
//!     .model("User", ModelResolver::new()
//!         .field("posts", PageResolver::new("Post", CursorPaginator::default()).filters(true).into()))
//!     .model("Post", ModelResolver::new());
//!
//! let query = resolver.resolve(resolver.adapter().query("user")?, "User", &selection, &variables)?;
//! ```

// Lets derive output refer to `::graph_resolver` from inside this crate
extern crate self as graph_resolver;

pub mod adapter;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod pagination;
pub mod resolver;
pub mod selection;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod testing;

pub use adapter::{Operator, OrderDirection, OrmAdapter, RelationSpec};
pub use config::ResolverConfig;
pub use error::{ResolveError, ResolveResult};
pub use filter::{Filter, FilterOptions, FilterScalar, FilterValue, apply_filters};
pub use graph::{Graph, GraphResolver, ResolveContext};
pub use pagination::{
    Connection, CursorPaginator, Edge, PageInfo, PageRequest, PaginationContext, Paginator,
};
pub use resolver::{
    FieldOptions, FieldResolver, ModelResolver, PageResolver, QueryModifier, RelationResolver,
    define_page_resolver, define_relation_resolver,
};
pub use selection::{Selection, SelectionSet};
