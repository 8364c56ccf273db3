//! Graph resolver demo
//!
//! Mounts the resolver inside an async-graphql schema backed by SQLite, seeds a
//! small blog and runs a few operations. Each GraphQL request below is answered by
//! a single SQL statement.

use std::sync::Arc;

use async_graphql::{
    ComplexObject, Context, EmptySubscription, Json, Object, Result, Schema, SimpleObject,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use graph_resolver::sqlite::{DatabaseEntity, ModelDef, SqliteAdapter, SqliteQuery};
use graph_resolver::{
    CursorPaginator, FieldResolver, FilterOptions, GraphResolver, ModelResolver, PageResolver,
    RelationResolver, ResolveContext, ResolverConfig, Selection, define_connection,
};

// ============================================================================
// Rows
// ============================================================================

#[derive(DatabaseEntity, Serialize)]
#[database_entity(table = "user")]
struct UserRow {
    #[primary_key]
    id: Option<i64>,
    name: String,
}

#[derive(DatabaseEntity, Serialize)]
#[database_entity(table = "post")]
struct PostRow {
    #[primary_key]
    id: Option<i64>,
    text: String,
    user_id: i64,
}

// ============================================================================
// GraphQL types
// ============================================================================

#[derive(SimpleObject, Deserialize, Debug, Clone)]
#[graphql(complex, rename_fields = "snake_case")]
struct User {
    id: i64,
    name: String,
    #[serde(default)]
    upper_name: Option<String>,
    #[graphql(skip)]
    #[serde(default)]
    posts: Option<PostConnection>,
}

// Arguments are declared for validation only; the resolver reads them from the selection
#[ComplexObject(rename_fields = "snake_case", rename_args = "snake_case")]
impl User {
    async fn posts(
        &self,
        #[graphql(name = "filter")] _filter: Option<Json<serde_json::Value>>,
        #[graphql(name = "first")] _first: Option<i32>,
        #[graphql(name = "after")] _after: Option<String>,
    ) -> Option<PostConnection> {
        self.posts.clone()
    }
}

#[derive(SimpleObject, Deserialize, Debug, Clone)]
#[graphql(rename_fields = "snake_case")]
struct Post {
    id: i64,
    text: String,
    #[serde(default)]
    author: Option<Box<User>>,
}

define_connection!(PostConnection, PostEdge, Post);
define_connection!(UserConnection, UserEdge, User);

type DemoGraph = GraphResolver<SqliteAdapter>;
type DemoSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

fn build_graph(config: ResolverConfig) -> DemoGraph {
    let adapter = SqliteAdapter::new()
        .model(ModelDef::of::<UserRow>().has_many("posts", "post", "user_id"))
        .model(ModelDef::of::<PostRow>().belongs_to("user", "user", "user_id"));

    GraphResolver::new(adapter)
        .with_config(config)
        .model(
            "User",
            ModelResolver::new()
                .field(
                    "upper_name",
                    FieldResolver::computed(
                        |query: SqliteQuery, context: &ResolveContext<'_, SqliteAdapter>| {
                            let expr = format!("upper({})", query.column_ref("name"));
                            Ok(query.select_raw(expr, context.field_name()))
                        },
                    ),
                )
                .field(
                    "posts",
                    PageResolver::new("Post", CursorPaginator::new(["-id"]))
                        .filters(true)
                        .into(),
                ),
        )
        .model(
            "Post",
            ModelResolver::new().field(
                "author",
                RelationResolver::new("User").table_field("user").into(),
            ),
        )
}

// ============================================================================
// Schema
// ============================================================================

struct QueryRoot;

// Field names must match the names registered on the resolver
#[Object(rename_fields = "snake_case", rename_args = "snake_case")]
impl QueryRoot {
    /// Users, newest posts first on every user
    async fn users(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "filter")] _filter: Option<Json<serde_json::Value>>,
        #[graphql(name = "first")] _first: Option<i32>,
        #[graphql(name = "after")] _after: Option<String>,
    ) -> Result<UserConnection> {
        let graph = ctx.data::<Arc<DemoGraph>>()?;
        let pool = ctx.data::<SqlitePool>()?;
        let set = Selection::from_context(ctx)?;

        let query = graph.resolve_page(
            graph.adapter().query(UserRow::TABLE_NAME)?,
            "User",
            &set.fields[0],
            &set.variables,
            &CursorPaginator::default(),
            &FilterOptions::enabled(),
        )?;
        let connection = graph.adapter().fetch_connection(pool, query).await?;
        Ok(serde_json::from_value(serde_json::to_value(connection)?)?)
    }

    /// Get a user by ID
    async fn user(&self, ctx: &Context<'_>, id: i64) -> Result<Option<User>> {
        let graph = ctx.data::<Arc<DemoGraph>>()?;
        let pool = ctx.data::<SqlitePool>()?;
        let set = Selection::from_context(ctx)?;

        let root = graph
            .adapter()
            .query(UserRow::TABLE_NAME)?
            .find_by(UserRow::PRIMARY_KEY, id);
        let query = graph.resolve(root, "User", &set.fields[0], &set.variables)?;
        match graph.adapter().fetch_optional(pool, query).await? {
            Some(user) => Ok(Some(serde_json::from_value(user)?)),
            None => Ok(None),
        }
    }
}

struct MutationRoot;

#[Object(rename_fields = "snake_case", rename_args = "snake_case")]
impl MutationRoot {
    /// Create a post and return it through the resolver
    async fn create_post(&self, ctx: &Context<'_>, text: String, user_id: i64) -> Result<Post> {
        let graph = ctx.data::<Arc<DemoGraph>>()?;
        let pool = ctx.data::<SqlitePool>()?;

        let row = PostRow {
            id: None,
            text,
            user_id,
        };
        let id = graph.adapter().insert(pool, &row).await?;
        tracing::info!(post_id = id, "Post created");

        let set = Selection::from_context(ctx)?;
        let root = graph
            .adapter()
            .query(PostRow::TABLE_NAME)?
            .find_by(PostRow::PRIMARY_KEY, id);
        let query = graph.resolve(root, "Post", &set.fields[0], &set.variables)?;
        let post = graph
            .adapter()
            .fetch_optional(pool, query)
            .await?
            .ok_or_else(|| async_graphql::Error::new("Created post not found"))?;
        Ok(serde_json::from_value(post)?)
    }
}

async fn seed(graph: &DemoGraph, pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS user (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS post (id INTEGER PRIMARY KEY AUTOINCREMENT, text TEXT NOT NULL, user_id INTEGER NOT NULL REFERENCES user(id))",
    )
    .execute(pool)
    .await?;

    for name in ["Alice", "Bob"] {
        let user_id = graph
            .adapter()
            .insert(
                pool,
                &UserRow {
                    id: None,
                    name: name.to_string(),
                },
            )
            .await?;
        for n in 1..=3 {
            graph
                .adapter()
                .insert(
                    pool,
                    &PostRow {
                        id: None,
                        text: format!("{name}'s post #{n}"),
                        user_id,
                    },
                )
                .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graph_resolver=debug,graph_resolver_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = ResolverConfig::from_env()?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    tracing::info!(?config, database_url = %database_url, "Starting graph resolver demo");

    // A single connection keeps an in-memory database alive and shared
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let graph = Arc::new(build_graph(config));
    seed(&graph, &pool).await?;

    let schema: DemoSchema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(graph)
        .data(pool)
        .finish();

    let requests = [
        r#"mutation { create_post(text: "Hello, world!", user_id: 2) { id text author { name } } }"#,
        r#"{ user(id: 1) { name upper_name posts(first: 2) { nodes { id text } pageInfo { hasNextPage endCursor } totalCount } } }"#,
        r#"{ users(filter: { name__ne: "Bob" }) { edges { cursor node { name posts(filter: { text__ne: "Alice's post #2" }) { totalCount } } } } }"#,
        // $name is never supplied, so the entry is skipped and every user comes back
        r#"query ($name: String) { users(filter: { name: $name }) { totalCount nodes { name } } }"#,
    ];

    for request in requests {
        let response = schema.execute(request).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
