//! Field resolver registry
//!
//! Every resolvable field of a GraphQL type is declared up front as one of:
//! - a scalar passthrough (no query change)
//! - an aliased column
//! - a computed field (raw/derived expression attached by a closure)
//! - a nested relation
//! - a nested paginated relation (connection)
//!
//! Resolution composes outer-to-inner: child subqueries are built inside the
//! adapter's relation callback so they are attached together with the parent.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::adapter::{OrmAdapter, RelationSpec};
use crate::error::ResolveResult;
use crate::filter::{FilterOptions, FilterValue, apply_filters};
use crate::graph::ResolveContext;
use crate::pagination::{PaginationContext, Paginator};

/// Arbitrary query transform bound to a field or model
pub type QueryModifier<A> = Arc<
    dyn Fn(<A as OrmAdapter>::Query, &ResolveContext<'_, A>) -> ResolveResult<<A as OrmAdapter>::Query>
        + Send
        + Sync,
>;

/// Options shared by relation and page fields.
pub struct FieldOptions<A: OrmAdapter> {
    /// Underlying relation/column name when it differs from the field name
    pub table_field: Option<String>,
    /// Runs on the relation subquery before filters and pagination
    pub modify: Option<QueryModifier<A>>,
    /// Filter handling for the field's `filter` argument
    pub filters: FilterOptions<A>,
}

impl<A: OrmAdapter> Default for FieldOptions<A> {
    fn default() -> Self {
        Self {
            table_field: None,
            modify: None,
            filters: FilterOptions::disabled(),
        }
    }
}

impl<A: OrmAdapter> Clone for FieldOptions<A> {
    fn clone(&self) -> Self {
        Self {
            table_field: self.table_field.clone(),
            modify: self.modify.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<A: OrmAdapter> FieldOptions<A> {
    /// Relation name for a field: the `table_field` override, else the field name
    fn relation_name<'a>(&'a self, context: &ResolveContext<'a, A>) -> &'a str {
        self.table_field.as_deref().unwrap_or(context.field_name())
    }

    /// `modify` hook first, then filters
    fn modify_subquery(
        &self,
        subquery: A::Query,
        context: &ResolveContext<'_, A>,
    ) -> ResolveResult<A::Query> {
        let subquery = match &self.modify {
            Some(modify) => modify(subquery, context)?,
            None => subquery,
        };
        apply_filters(subquery, &self.filters, context)
    }
}

/// Generates the option builder methods shared by relation and page resolvers
macro_rules! field_option_builders {
    () => {
        /// Use a differently named relation
        pub fn table_field(mut self, name: impl Into<String>) -> Self {
            self.options.table_field = Some(name.into());
            self
        }

        /// Transform the relation subquery before filters and pagination
        pub fn modify<F>(mut self, modify: F) -> Self
        where
            F: Fn(A::Query, &ResolveContext<'_, A>) -> ResolveResult<A::Query>
                + Send
                + Sync
                + 'static,
        {
            self.options.modify = Some(Arc::new(modify));
            self
        }

        /// Enable or disable the `filter` argument
        pub fn filters(mut self, enabled: bool) -> Self {
            self.options.filters = if enabled {
                FilterOptions::enabled()
            } else {
                FilterOptions::disabled()
            };
            self
        }

        /// Replace the filter options, including custom modifiers
        pub fn filter_options(mut self, filters: FilterOptions<A>) -> Self {
            self.options.filters = filters;
            self
        }

        /// Register a custom handler for one filter key (enables filters)
        pub fn filter_modifier<F>(mut self, key: impl Into<String>, modifier: F) -> Self
        where
            F: Fn(A::Query, &FilterValue, &ResolveContext<'_, A>) -> ResolveResult<A::Query>
                + Send
                + Sync
                + 'static,
        {
            let filters = std::mem::take(&mut self.options.filters);
            let filters = if filters.is_enabled() {
                filters
            } else {
                FilterOptions::enabled()
            };
            self.options.filters = filters.modifier(key, modifier);
            self
        }
    };
}

/// A nested single or multi-row relation without pagination.
pub struct RelationResolver<A: OrmAdapter> {
    target: String,
    options: FieldOptions<A>,
}

impl<A: OrmAdapter> Clone for RelationResolver<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            options: self.options.clone(),
        }
    }
}

impl<A: OrmAdapter> RelationResolver<A> {
    /// Relation whose rows are of GraphQL type `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            options: FieldOptions::default(),
        }
    }

    field_option_builders!();

    pub fn resolve(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
    ) -> ResolveResult<A::Query> {
        let graph = context.graph();
        let relation = RelationSpec {
            relation: self.options.relation_name(context),
            alias: context.field(),
        };

        tracing::debug!(
            type_name = context.type_name(),
            relation = relation.relation,
            alias = relation.alias,
            target = %self.target,
            "Resolving relation"
        );

        graph.adapter().select_relation(query, relation, |subquery| {
            let subquery = self.options.modify_subquery(subquery, context)?;
            graph.resolve_type(subquery, &self.target, context.selection())
        })
    }
}

/// A nested relation materialised as a connection.
pub struct PageResolver<A: OrmAdapter> {
    target: String,
    paginator: Arc<dyn Paginator<A>>,
    options: FieldOptions<A>,
}

impl<A: OrmAdapter> Clone for PageResolver<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            paginator: self.paginator.clone(),
            options: self.options.clone(),
        }
    }
}

impl<A: OrmAdapter> PageResolver<A> {
    /// Paginated relation whose nodes are of GraphQL type `target`
    pub fn new<P>(target: impl Into<String>, paginator: P) -> Self
    where
        P: Paginator<A> + 'static,
    {
        Self {
            target: target.into(),
            paginator: Arc::new(paginator),
            options: FieldOptions::default(),
        }
    }

    field_option_builders!();

    /// Two-phase resolution: the relation subquery is windowed inside
    /// `select_relation`, then the outer query is finished with the same
    /// pagination context.
    pub fn resolve(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
    ) -> ResolveResult<A::Query> {
        let graph = context.graph();
        let adapter = graph.adapter();
        let relation = RelationSpec {
            relation: self.options.relation_name(context),
            alias: context.field(),
        };

        tracing::debug!(
            type_name = context.type_name(),
            relation = relation.relation,
            alias = relation.alias,
            target = %self.target,
            "Resolving page"
        );

        let mut pagination = PaginationContext::new();
        let query = adapter.select_relation(query, relation, |subquery| {
            let subquery = self.options.modify_subquery(subquery, context)?;
            graph.resolve_page(
                subquery,
                &self.target,
                self.paginator.as_ref(),
                context,
                &mut pagination,
            )
        })?;
        adapter.finish_query_pagination(query, context.field(), &mut pagination)
    }
}

/// Resolution strategy for one field.
pub enum FieldResolver<A: OrmAdapter> {
    /// Plain column, no query change
    Scalar,
    /// Column selected under the field's response key
    Column(String),
    /// Derived expression attached by a closure
    Computed(QueryModifier<A>),
    /// Nested relation
    Relation(RelationResolver<A>),
    /// Nested paginated relation
    Page(PageResolver<A>),
}

impl<A: OrmAdapter> Clone for FieldResolver<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Scalar => Self::Scalar,
            Self::Column(column) => Self::Column(column.clone()),
            Self::Computed(f) => Self::Computed(f.clone()),
            Self::Relation(r) => Self::Relation(r.clone()),
            Self::Page(p) => Self::Page(p.clone()),
        }
    }
}

impl<A: OrmAdapter> From<RelationResolver<A>> for FieldResolver<A> {
    fn from(resolver: RelationResolver<A>) -> Self {
        Self::Relation(resolver)
    }
}

impl<A: OrmAdapter> From<PageResolver<A>> for FieldResolver<A> {
    fn from(resolver: PageResolver<A>) -> Self {
        Self::Page(resolver)
    }
}

impl<A: OrmAdapter> fmt::Debug for FieldResolver<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("Scalar"),
            Self::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Self::Computed(_) => f.write_str("Computed"),
            Self::Relation(r) => f.debug_tuple("Relation").field(&r.target).finish(),
            Self::Page(p) => f.debug_tuple("Page").field(&p.target).finish(),
        }
    }
}

impl<A: OrmAdapter> FieldResolver<A> {
    pub fn scalar() -> Self {
        Self::Scalar
    }

    /// Field backed by a differently named column
    pub fn column(table_field: impl Into<String>) -> Self {
        Self::Column(table_field.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(A::Query, &ResolveContext<'_, A>) -> ResolveResult<A::Query> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn relation(resolver: RelationResolver<A>) -> Self {
        Self::Relation(resolver)
    }

    pub fn page(resolver: PageResolver<A>) -> Self {
        Self::Page(resolver)
    }

    /// Fold this field into `query`
    pub fn resolve(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
    ) -> ResolveResult<A::Query> {
        match self {
            Self::Scalar => {
                tracing::trace!(field = context.field(), "Scalar passthrough");
                Ok(query)
            }
            Self::Column(column) => {
                context
                    .graph()
                    .adapter()
                    .select_column(query, column, context.field())
            }
            Self::Computed(f) => {
                tracing::trace!(field = context.field(), "Computed field");
                f(query, context)
            }
            Self::Relation(resolver) => resolver.resolve(query, context),
            Self::Page(resolver) => resolver.resolve(query, context),
        }
    }
}

/// Build a page field resolver for `paginator`
pub fn define_page_resolver<A, P>(
    target: impl Into<String>,
    paginator: P,
    options: FieldOptions<A>,
) -> FieldResolver<A>
where
    A: OrmAdapter,
    P: Paginator<A> + 'static,
{
    FieldResolver::Page(PageResolver {
        target: target.into(),
        paginator: Arc::new(paginator),
        options,
    })
}

/// Build a relation field resolver
pub fn define_relation_resolver<A: OrmAdapter>(
    target: impl Into<String>,
    options: FieldOptions<A>,
) -> FieldResolver<A> {
    FieldResolver::Relation(RelationResolver {
        target: target.into(),
        options,
    })
}

/// Field resolvers of one GraphQL object type.
///
/// Open models treat every undeclared field as a scalar passthrough; strict models
/// reject undeclared fields.
pub struct ModelResolver<A: OrmAdapter> {
    fields: IndexMap<String, FieldResolver<A>>,
    strict: bool,
    modify: Option<QueryModifier<A>>,
}

impl<A: OrmAdapter> Default for ModelResolver<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: OrmAdapter> ModelResolver<A> {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
            strict: false,
            modify: None,
        }
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, resolver: FieldResolver<A>) -> Self {
        self.fields.insert(name.into(), resolver);
        self
    }

    /// Only declared fields may be selected
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Transform every query of this type before its fields are resolved
    pub fn modify<F>(mut self, modify: F) -> Self
    where
        F: Fn(A::Query, &ResolveContext<'_, A>) -> ResolveResult<A::Query> + Send + Sync + 'static,
    {
        self.modify = Some(Arc::new(modify));
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Declared resolver for `name`
    pub fn field_resolver(&self, name: &str) -> Option<&FieldResolver<A>> {
        self.fields.get(name)
    }

    pub(crate) fn modify_query(
        &self,
        query: A::Query,
        context: &ResolveContext<'_, A>,
    ) -> ResolveResult<A::Query> {
        match &self.modify {
            Some(modify) => modify(query, context),
            None => Ok(query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphResolver;
    use crate::pagination::CursorPaginator;
    use crate::selection::Selection;
    use crate::testing::{Call, RecordingAdapter};
    use async_graphql_value::Variables;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Resolver = GraphResolver<RecordingAdapter>;

    fn resolve(resolver: &Resolver, type_name: &str, query: &str) -> ResolveResult<Vec<Call>> {
        let set = Selection::from_query(query, Variables::from_json(json!({})), None)?;
        resolver.resolve(Vec::new(), type_name, &set.fields[0], &set.variables)
    }

    #[test]
    fn test_column_resolver_aliases_column() {
        let resolver = Resolver::new(RecordingAdapter::default()).model(
            "User",
            ModelResolver::new().field("displayName", FieldResolver::column("display_name")),
        );
        let calls = resolve(&resolver, "User", "{ user { displayName } }").unwrap();
        assert_eq!(
            calls,
            vec![Call::Column {
                column: "display_name".into(),
                alias: "displayName".into(),
            }]
        );
    }

    #[test]
    fn test_relation_modify_runs_before_filters() {
        let resolver = Resolver::new(RecordingAdapter::default())
            .model(
                "User",
                ModelResolver::new().field(
                    "posts",
                    RelationResolver::new("Post")
                        .modify(|mut query: Vec<Call>, _: &ResolveContext<'_, RecordingAdapter>| {
                            query.push(Call::Raw("published only".into()));
                            Ok(query)
                        })
                        .filters(true)
                        .into(),
                ),
            )
            .model("Post", ModelResolver::new());

        let calls = resolve(
            &resolver,
            "User",
            "{ user { posts(filter: { title__ne: \"draft\" }) { id } } }",
        )
        .unwrap();

        assert_eq!(
            calls,
            vec![Call::Relation {
                relation: "posts".into(),
                alias: "posts".into(),
                subquery: vec![
                    Call::Raw("published only".into()),
                    Call::Where {
                        field: "title".into(),
                        operator: Some("ne".into()),
                        value: FilterValue::from("draft"),
                    },
                ],
            }]
        );
    }

    #[test]
    fn test_filter_modifier_on_page() {
        let resolver = Resolver::new(RecordingAdapter::default())
            .model(
                "User",
                ModelResolver::new().field(
                    "posts",
                    PageResolver::new("Post", CursorPaginator::new(["-id"]))
                        .filter_modifier("search", |mut query: Vec<Call>, value: &FilterValue, _: &ResolveContext<'_, RecordingAdapter>| {
                            query.push(Call::Raw(format!("match {value}")));
                            Ok(query)
                        })
                        .into(),
                ),
            )
            .model("Post", ModelResolver::new());

        let calls = resolve(
            &resolver,
            "User",
            "{ user { posts(first: 3, filter: { search: \"rust\" }) { nodes { id } } } }",
        )
        .unwrap();

        assert_eq!(
            calls,
            vec![
                Call::Relation {
                    relation: "posts".into(),
                    alias: "posts".into(),
                    subquery: vec![
                        Call::Raw("match \"rust\"".into()),
                        Call::OrderBy("id DESC".into()),
                        Call::ModifyPagination {
                            offset: 0,
                            limit: 3,
                            context: 1,
                        },
                    ],
                },
                Call::FinishPagination {
                    field: "posts".into(),
                    context: 1,
                },
            ]
        );
    }

    #[test]
    fn test_model_modify_runs_before_fields() {
        let resolver = Resolver::new(RecordingAdapter::default()).model(
            "User",
            ModelResolver::new()
                .modify(|mut query: Vec<Call>, _: &ResolveContext<'_, RecordingAdapter>| {
                    query.push(Call::Raw("active users".into()));
                    Ok(query)
                })
                .field("nick", FieldResolver::column("nickname")),
        );
        let calls = resolve(&resolver, "User", "{ user { nick } }").unwrap();
        assert_eq!(
            calls,
            vec![
                Call::Raw("active users".into()),
                Call::Column {
                    column: "nickname".into(),
                    alias: "nick".into(),
                },
            ]
        );
    }

    #[test]
    fn test_define_helpers() {
        let relation: FieldResolver<RecordingAdapter> =
            define_relation_resolver("User", FieldOptions::default());
        assert!(matches!(relation, FieldResolver::Relation(_)));

        let page: FieldResolver<RecordingAdapter> = define_page_resolver(
            "Post",
            CursorPaginator::default(),
            FieldOptions {
                table_field: Some("articles".into()),
                ..Default::default()
            },
        );
        assert_eq!(format!("{page:?}"), "Page(\"Post\")");
    }
}
