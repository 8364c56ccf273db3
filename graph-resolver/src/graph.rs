//! Graph resolution engine
//!
//! Walks a [`Selection`] tree depth-first, in query order, and folds every selected
//! field into one adapter query through the registered [`ModelResolver`]s. Relation
//! fields recurse inside the adapter's `select_relation` callback so nested
//! subqueries are attached together with their parent.
//!
//! The engine never executes anything; the caller runs the returned query.

use std::collections::HashMap;

use async_graphql_value::{ConstValue, Variables};

use crate::adapter::OrmAdapter;
use crate::config::ResolverConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::filter::{FilterOptions, apply_filters};
use crate::pagination::{PaginationContext, Paginator};
use crate::resolver::ModelResolver;
use crate::selection::Selection;

/// Type name used for contexts of root fields
pub const ROOT_TYPE: &str = "Query";

/// Registry of model resolvers bound to one adapter.
///
/// Built once at schema-definition time and shared by every operation.
pub struct GraphResolver<A: OrmAdapter> {
    adapter: A,
    models: HashMap<String, ModelResolver<A>>,
    config: ResolverConfig,
}

impl<A: OrmAdapter> GraphResolver<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            models: HashMap::new(),
            config: ResolverConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the resolver for a GraphQL object type
    pub fn model(mut self, type_name: impl Into<String>, model: ModelResolver<A>) -> Self {
        self.models.insert(type_name.into(), model);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run `f` with a graph façade scoped to one operation
    pub fn with_graph<R>(&self, variables: &Variables, f: impl FnOnce(&Graph<'_, A>) -> R) -> R {
        let graph = Graph {
            resolver: self,
            variables,
        };
        f(&graph)
    }

    /// Resolve `selection` (a root field of type `type_name`) into `query`
    pub fn resolve(
        &self,
        query: A::Query,
        type_name: &str,
        selection: &Selection,
        variables: &Variables,
    ) -> ResolveResult<A::Query> {
        self.resolve_with(query, type_name, selection, variables, &FilterOptions::disabled())
    }

    /// Like [`resolve`](Self::resolve), applying the root field's `filter` argument first
    pub fn resolve_with(
        &self,
        query: A::Query,
        type_name: &str,
        selection: &Selection,
        variables: &Variables,
        filters: &FilterOptions<A>,
    ) -> ResolveResult<A::Query> {
        self.with_graph(variables, |graph| {
            let context = graph.context(selection, ROOT_TYPE);
            let query = apply_filters(query, filters, &context)?;
            graph.resolve_type(query, type_name, selection)
        })
    }

    /// Resolve a root connection field: the root query itself is paginated
    pub fn resolve_page<P>(
        &self,
        query: A::Query,
        type_name: &str,
        selection: &Selection,
        variables: &Variables,
        paginator: &P,
        filters: &FilterOptions<A>,
    ) -> ResolveResult<A::Query>
    where
        P: Paginator<A> + ?Sized,
    {
        self.with_graph(variables, |graph| {
            let context = graph.context(selection, ROOT_TYPE);
            let query = apply_filters(query, filters, &context)?;
            let mut pagination = PaginationContext::new();
            let query = graph.resolve_page(query, type_name, paginator, &context, &mut pagination)?;
            // A root page has no outer query to finish; the adapter reads the window
            // back from the query itself when it executes the connection
            if !pagination.is_written() {
                return Err(ResolveError::PaginationContextMissing {
                    field: context.field().to_string(),
                });
            }
            Ok(query)
        })
    }
}

/// Per-operation façade: the adapter plus the engine helpers resolvers call back into.
pub struct Graph<'g, A: OrmAdapter> {
    resolver: &'g GraphResolver<A>,
    variables: &'g Variables,
}

impl<'g, A: OrmAdapter> Graph<'g, A> {
    pub fn adapter(&self) -> &'g A {
        &self.resolver.adapter
    }

    pub fn config(&self) -> &'g ResolverConfig {
        &self.resolver.config
    }

    /// Variables of the operation being resolved
    pub fn variables(&self) -> &'g Variables {
        self.variables
    }

    /// Context for one field of `type_name`
    pub fn context<'c>(&'c self, selection: &'c Selection, type_name: &'c str) -> ResolveContext<'c, A>
    where
        'g: 'c,
    {
        ResolveContext {
            graph: self,
            selection,
            type_name,
        }
    }

    /// Apply the resolvers of every field selected on `type_name`
    pub fn resolve_type(
        &self,
        query: A::Query,
        type_name: &str,
        selection: &Selection,
    ) -> ResolveResult<A::Query> {
        let model = self
            .resolver
            .models
            .get(type_name)
            .ok_or_else(|| ResolveError::UnknownType(type_name.to_string()))?;

        let mut query = model.modify_query(query, &self.context(selection, type_name))?;

        for child in selection.children() {
            if child.name().starts_with("__") {
                continue;
            }
            let context = self.context(child, type_name);
            query = match model.field_resolver(child.name()) {
                Some(resolver) => resolver.resolve(query, &context)?,
                None if model.is_strict() => {
                    return Err(ResolveError::unknown_field(type_name, child.name()));
                }
                None => query,
            };
        }

        Ok(query)
    }

    /// Resolve the node type behind a connection field, then let the paginator
    /// window the query
    pub fn resolve_page<P>(
        &self,
        subquery: A::Query,
        type_name: &str,
        paginator: &P,
        context: &ResolveContext<'_, A>,
        pagination: &mut PaginationContext<A::PageState>,
    ) -> ResolveResult<A::Query>
    where
        P: Paginator<A> + ?Sized,
    {
        let nodes = context.selection().connection_nodes();
        let subquery = self.resolve_type(subquery, type_name, &nodes)?;
        paginator.paginate(subquery, context, pagination)
    }
}

/// The Selection Context handed to every field resolver.
pub struct ResolveContext<'a, A: OrmAdapter> {
    graph: &'a Graph<'a, A>,
    selection: &'a Selection,
    type_name: &'a str,
}

impl<'a, A: OrmAdapter> ResolveContext<'a, A> {
    pub fn graph(&self) -> &'a Graph<'a, A> {
        self.graph
    }

    pub fn selection(&self) -> &'a Selection {
        self.selection
    }

    /// Response key of the field (alias or name)
    pub fn field(&self) -> &'a str {
        self.selection.response_key()
    }

    /// Schema name of the field
    pub fn field_name(&self) -> &'a str {
        self.selection.name()
    }

    /// Type that declares the field
    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    /// Argument resolved against the operation variables
    pub fn argument(&self, name: &str) -> Option<ConstValue> {
        self.selection.argument(name, self.graph.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterValue;
    use crate::pagination::CursorPaginator;
    use crate::resolver::{FieldResolver, PageResolver, RelationResolver};
    use crate::testing::{Call, RecordingAdapter};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blog() -> GraphResolver<RecordingAdapter> {
        GraphResolver::new(RecordingAdapter::default())
            .model(
                "User",
                ModelResolver::new()
                    .field("id", FieldResolver::scalar())
                    .field("name", FieldResolver::scalar())
                    .field(
                        "upper_name",
                        FieldResolver::computed(|mut query: Vec<Call>, context: &ResolveContext<'_, RecordingAdapter>| {
                            query.push(Call::Raw(format!("upper(name) as {}", context.field())));
                            Ok(query)
                        }),
                    )
                    .field(
                        "posts",
                        FieldResolver::page(
                            PageResolver::new("Post", CursorPaginator::default()).filters(true),
                        ),
                    )
                    .strict(),
            )
            .model(
                "Post",
                ModelResolver::new().field(
                    "author",
                    FieldResolver::relation(RelationResolver::new("User").table_field("user")),
                ),
            )
    }

    fn resolve(query: &str, variables: serde_json::Value) -> ResolveResult<Vec<Call>> {
        let set = Selection::from_query(query, Variables::from_json(variables), None)?;
        let root = &set.fields[0];
        blog().resolve(Vec::new(), "User", root, &set.variables)
    }

    #[test]
    fn test_scalars_do_not_touch_the_query() {
        let calls = resolve("{ user { id name __typename } }", json!({})).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_computed_field_uses_alias() {
        let calls = resolve("{ user { shout: upper_name } }", json!({})).unwrap();
        assert_eq!(calls, vec![Call::Raw("upper(name) as shout".into())]);
    }

    #[test]
    fn test_strict_model_rejects_unknown_fields() {
        let err = resolve("{ user { password } }", json!({})).unwrap_err();
        assert_matches!(
            err,
            ResolveError::UnknownField { ref type_name, ref field }
                if type_name == "User" && field == "password"
        );
    }

    #[test]
    fn test_unknown_type() {
        let set = Selection::from_query("{ thing { id } }", Variables::default(), None).unwrap();
        let err = blog()
            .resolve(Vec::new(), "Thing", &set.fields[0], &set.variables)
            .unwrap_err();
        assert_matches!(err, ResolveError::UnknownType(ref t) if t == "Thing");
    }

    #[test]
    fn test_page_sequencing() {
        let calls = resolve(
            r#"{ user { posts(first: 2, filter: { published: true }) {
                    edges { node { author { name } } }
                } } }"#,
            json!({}),
        )
        .unwrap();

        assert_eq!(
            calls,
            vec![Call::Relation {
                relation: "posts".into(),
                alias: "posts".into(),
                subquery: vec![
                    Call::Where {
                        field: "published".into(),
                        operator: None,
                        value: FilterValue::from(true),
                    },
                    Call::Relation {
                        relation: "user".into(),
                        alias: "author".into(),
                        subquery: vec![],
                    },
                    Call::OrderBy("id ASC".into()),
                    Call::ModifyPagination {
                        offset: 0,
                        limit: 2,
                        context: 1,
                    },
                ],
            }, Call::FinishPagination {
                field: "posts".into(),
                context: 1,
            }]
        );
    }

    #[test]
    fn test_each_page_field_gets_a_fresh_context() {
        let calls = resolve(
            "{ user { a: posts(first: 1) { nodes { id } } b: posts(first: 3) { nodes { id } } } }",
            json!({}),
        )
        .unwrap();

        let finished: Vec<_> = calls
            .iter()
            .filter_map(|call| match call {
                Call::FinishPagination { field, context } => Some((field.as_str(), *context)),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_filter_error_aborts_the_subtree() {
        let err = resolve(
            "{ user { posts(filter: [1, 2]) { nodes { id } } } }",
            json!({}),
        )
        .unwrap_err();
        assert_matches!(err, ResolveError::InvalidFilter(_));
    }

    #[test]
    fn test_root_filters_and_root_page() {
        let set = Selection::from_query(
            "query ($after: String) { users(filter: { age__gte: 21 }, after: $after) { nodes { id } } }",
            Variables::from_json(json!({ "after": crate::pagination::encode_cursor(4) })),
            None,
        )
        .unwrap();
        let calls = blog()
            .resolve_page(
                Vec::new(),
                "User",
                &set.fields[0],
                &set.variables,
                &CursorPaginator::default(),
                &FilterOptions::enabled(),
            )
            .unwrap();
        assert_eq!(
            calls,
            vec![
                Call::Where {
                    field: "age".into(),
                    operator: Some("gte".into()),
                    value: FilterValue::from(21i64),
                },
                Call::OrderBy("id ASC".into()),
                Call::ModifyPagination {
                    offset: 5,
                    limit: 25,
                    context: 1,
                },
            ]
        );
    }

    struct OrderOnly;

    impl Paginator<RecordingAdapter> for OrderOnly {
        fn paginate(
            &self,
            query: Vec<Call>,
            context: &ResolveContext<'_, RecordingAdapter>,
            _pagination: &mut PaginationContext<usize>,
        ) -> ResolveResult<Vec<Call>> {
            context
                .graph()
                .adapter()
                .order_by(query, "id", crate::adapter::OrderDirection::Asc)
        }
    }

    #[test]
    fn test_root_page_requires_pagination_bookkeeping() {
        let set = Selection::from_query("{ users { nodes { id } } }", Variables::default(), None)
            .unwrap();
        let err = blog()
            .resolve_page(
                Vec::new(),
                "User",
                &set.fields[0],
                &set.variables,
                &OrderOnly,
                &FilterOptions::disabled(),
            )
            .unwrap_err();
        assert_matches!(err, ResolveError::PaginationContextMissing { ref field } if field == "users");
    }
}
