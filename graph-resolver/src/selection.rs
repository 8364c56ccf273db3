//! Selection trees: the per-field view of the GraphQL node being resolved
//!
//! A [`Selection`] is built either from raw query text (parsed with
//! `async-graphql-parser`) or from inside an `async-graphql` resolver via
//! [`Selection::from_context`]. Arguments are kept unresolved so that a filter entry
//! bound to an unsupplied variable can be told apart from an explicit `null`.

use std::collections::HashMap;

use async_graphql::Context;
use async_graphql_parser::parse_query;
use async_graphql_parser::types::{
    Directive, DocumentOperations, ExecutableDocument, Field, FragmentDefinition,
    OperationDefinition, Selection as AstSelection, SelectionSet as AstSelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Name, Value, Variables};
use indexmap::IndexMap;

use crate::error::{ResolveError, ResolveResult};

type Fragments = HashMap<Name, Positioned<FragmentDefinition>>;

/// One selected field with its arguments and sub-selection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    name: String,
    alias: Option<String>,
    arguments: IndexMap<String, Value>,
    children: Vec<Selection>,
}

impl Selection {
    /// Create a selection for a field with no arguments or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an argument
    #[cfg(test)]
    pub(crate) fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Field name as declared in the schema
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias given in the query, if any
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Key under which this field appears in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Sub-selections, in query order
    pub fn children(&self) -> &[Selection] {
        &self.children
    }

    /// Find a direct child by response key
    #[cfg(test)]
    pub(crate) fn child(&self, response_key: &str) -> Option<&Selection> {
        self.children
            .iter()
            .find(|c| c.response_key() == response_key)
    }

    /// All declared arguments, unresolved
    pub fn arguments(&self) -> &IndexMap<String, Value> {
        &self.arguments
    }

    /// Raw (possibly variable-bearing) argument value
    pub fn raw_argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Resolve an argument against the operation variables.
    ///
    /// Returns `None` when the argument is absent or bound to a variable that was
    /// not supplied.
    pub fn argument(&self, name: &str, variables: &Variables) -> Option<ConstValue> {
        self.arguments
            .get(name)
            .and_then(|value| resolve_value(value, variables))
    }

    /// Selection of the node type behind a connection field.
    ///
    /// Merges `nodes { .. }` and `edges { node { .. } }` into one synthetic `node`
    /// selection so the node type is resolved once.
    pub fn connection_nodes(&self) -> Selection {
        let mut node = Selection::new("node");
        for child in &self.children {
            match child.name() {
                "nodes" => {
                    for field in &child.children {
                        push_merged(&mut node.children, field.clone());
                    }
                }
                "edges" => {
                    for edge_field in child.children.iter().filter(|f| f.name() == "node") {
                        for field in &edge_field.children {
                            push_merged(&mut node.children, field.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        node
    }

    /// Build the selection of the field `async-graphql` is currently executing.
    ///
    /// Reads the operation's AST rather than [`async_graphql::SelectionField`], whose
    /// arguments already have unsupplied nullable variables replaced by `null`. The
    /// returned variables are the supplied ones plus declared defaults, to be passed
    /// on to the resolver.
    pub fn from_context(ctx: &Context<'_>) -> ResolveResult<SelectionSet> {
        let env = &ctx.query_env;
        let variables = with_defaults(env.variables.clone(), &env.operation.node);

        let mut fields = Vec::new();
        let mut visiting = Vec::new();
        push_field(&ctx.item.node, &env.fragments, &variables, &mut visiting, &mut fields)?;
        Ok(SelectionSet { fields, variables })
    }

    /// Parse GraphQL query text into its root selections.
    ///
    /// Fragments are inlined, `@skip` / `@include` are applied and variable defaults
    /// are merged into the returned variables.
    pub fn from_query(
        query: &str,
        variables: Variables,
        operation_name: Option<&str>,
    ) -> ResolveResult<SelectionSet> {
        let document =
            parse_query(query).map_err(|err| ResolveError::Selection(err.to_string()))?;
        let operation = pick_operation(&document, operation_name)?;

        let variables = with_defaults(variables, operation);

        let mut fields = Vec::new();
        let mut visiting = Vec::new();
        collect_fields(
            &operation.selection_set.node,
            &document.fragments,
            &variables,
            &mut visiting,
            &mut fields,
        )?;

        Ok(SelectionSet { fields, variables })
    }
}

/// Root fields of one operation together with its effective variables.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    pub fields: Vec<Selection>,
    pub variables: Variables,
}

impl SelectionSet {
    /// Find a root field by response key
    pub fn field(&self, response_key: &str) -> Option<&Selection> {
        self.fields
            .iter()
            .find(|f| f.response_key() == response_key)
    }
}

/// Resolve variables inside a value.
///
/// Object entries bound to missing variables are dropped, list items become `null`.
pub(crate) fn resolve_value(value: &Value, variables: &Variables) -> Option<ConstValue> {
    Some(match value {
        Value::Variable(name) => return variables.get(name).cloned(),
        Value::Null => ConstValue::Null,
        Value::Number(n) => ConstValue::Number(n.clone()),
        Value::String(s) => ConstValue::String(s.clone()),
        Value::Boolean(b) => ConstValue::Boolean(*b),
        Value::Binary(b) => ConstValue::Binary(b.clone()),
        Value::Enum(e) => ConstValue::Enum(e.clone()),
        Value::List(items) => ConstValue::List(
            items
                .iter()
                .map(|item| resolve_value(item, variables).unwrap_or(ConstValue::Null))
                .collect(),
        ),
        Value::Object(fields) => ConstValue::Object(
            fields
                .iter()
                .filter_map(|(k, v)| resolve_value(v, variables).map(|v| (k.clone(), v)))
                .collect(),
        ),
    })
}

fn pick_operation<'d>(
    document: &'d ExecutableDocument,
    operation_name: Option<&str>,
) -> ResolveResult<&'d OperationDefinition> {
    match &document.operations {
        DocumentOperations::Single(operation) => Ok(&operation.node),
        DocumentOperations::Multiple(operations) => {
            let found = match operation_name {
                Some(wanted) => operations
                    .iter()
                    .find(|(name, _)| name.as_str() == wanted)
                    .map(|(_, op)| op),
                None if operations.len() == 1 => operations.values().next(),
                None => {
                    return Err(ResolveError::Selection(
                        "operation name is required when the document has several operations"
                            .to_string(),
                    ));
                }
            };
            found.map(|op| &op.node).ok_or_else(|| {
                ResolveError::Selection(format!(
                    "unknown operation {}",
                    operation_name.unwrap_or_default()
                ))
            })
        }
    }
}

/// Supplied variables plus the defaults declared by the operation.
///
/// Variables without a default stay unsupplied, even when nullable.
fn with_defaults(mut variables: Variables, operation: &OperationDefinition) -> Variables {
    for definition in &operation.variable_definitions {
        let name = &definition.node.name.node;
        if variables.contains_key(name) {
            continue;
        }
        if let Some(default) = &definition.node.default_value {
            variables.insert(name.clone(), default.node.clone());
        }
    }
    variables
}

fn push_field(
    field: &Field,
    fragments: &Fragments,
    variables: &Variables,
    visiting: &mut Vec<Name>,
    out: &mut Vec<Selection>,
) -> ResolveResult<()> {
    if !is_included(&field.directives, variables)? {
        return Ok(());
    }
    let mut children = Vec::new();
    collect_fields(&field.selection_set.node, fragments, variables, visiting, &mut children)?;
    push_merged(
        out,
        Selection {
            name: field.name.node.to_string(),
            alias: field.alias.as_ref().map(|a| a.node.to_string()),
            arguments: field
                .arguments
                .iter()
                .map(|(name, value)| (name.node.to_string(), value.node.clone()))
                .collect(),
            children,
        },
    );
    Ok(())
}

fn collect_fields(
    set: &AstSelectionSet,
    fragments: &Fragments,
    variables: &Variables,
    visiting: &mut Vec<Name>,
    out: &mut Vec<Selection>,
) -> ResolveResult<()> {
    for item in &set.items {
        match &item.node {
            AstSelection::Field(field) => {
                push_field(&field.node, fragments, variables, visiting, out)?;
            }
            AstSelection::FragmentSpread(spread) => {
                let spread = &spread.node;
                if !is_included(&spread.directives, variables)? {
                    continue;
                }
                let name = &spread.fragment_name.node;
                if visiting.contains(name) {
                    return Err(ResolveError::Selection(format!(
                        "fragment {name} spreads itself"
                    )));
                }
                let fragment = fragments.get(name).ok_or_else(|| {
                    ResolveError::Selection(format!("unknown fragment {name}"))
                })?;
                visiting.push(name.clone());
                collect_fields(
                    &fragment.node.selection_set.node,
                    fragments,
                    variables,
                    visiting,
                    out,
                )?;
                visiting.pop();
            }
            AstSelection::InlineFragment(inline) => {
                let inline = &inline.node;
                if !is_included(&inline.directives, variables)? {
                    continue;
                }
                collect_fields(&inline.selection_set.node, fragments, variables, visiting, out)?;
            }
        }
    }
    Ok(())
}

fn is_included(directives: &[Positioned<Directive>], variables: &Variables) -> ResolveResult<bool> {
    for directive in directives {
        let name = directive.node.name.node.as_str();
        if name != "skip" && name != "include" {
            continue;
        }
        let condition = directive
            .node
            .get_argument("if")
            .and_then(|value| resolve_value(&value.node, variables));
        let condition = match condition {
            Some(ConstValue::Boolean(b)) => b,
            _ => {
                return Err(ResolveError::Selection(format!(
                    "@{name} requires a boolean `if` argument"
                )));
            }
        };
        if (name == "skip") == condition {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Append a field, merging sub-selections when the response key is already present
fn push_merged(out: &mut Vec<Selection>, selection: Selection) {
    match out
        .iter_mut()
        .find(|existing| existing.response_key() == selection.response_key())
    {
        Some(existing) => {
            for child in selection.children {
                push_merged(&mut existing.children, child);
            }
        }
        None => out.push(selection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(query: &str) -> SelectionSet {
        Selection::from_query(query, Variables::default(), None).unwrap()
    }

    fn keys(selection: &Selection) -> Vec<&str> {
        selection.children().iter().map(|c| c.response_key()).collect()
    }

    #[test]
    fn test_field_order_is_preserved() {
        let set = parse("{ posts { text id author { name } } }");
        let posts = set.field("posts").unwrap();
        assert_eq!(keys(posts), vec!["text", "id", "author"]);
    }

    #[test]
    fn test_aliases() {
        let set = parse("{ new_post: post(id: 1) { id } }");
        let post = set.field("new_post").unwrap();
        assert_eq!(post.name(), "post");
        assert_eq!(post.alias(), Some("new_post"));
    }

    #[test]
    fn test_fragments_are_inlined_and_merged() {
        let set = parse(
            r#"
            query {
                posts {
                    id
                    ...PostAuthor
                    ... on Post { author { id } }
                }
            }
            fragment PostAuthor on Post { author { name } }
            "#,
        );
        let posts = set.field("posts").unwrap();
        assert_eq!(keys(posts), vec!["id", "author"]);
        assert_eq!(keys(posts.child("author").unwrap()), vec!["name", "id"]);
    }

    #[test]
    fn test_skip_and_include() {
        let variables = Variables::from_json(json!({ "withText": false }));
        let set = Selection::from_query(
            r#"
            query ($withText: Boolean!) {
                posts {
                    id @skip(if: false)
                    text @include(if: $withText)
                    author @skip(if: true) { id }
                }
            }
            "#,
            variables,
            None,
        )
        .unwrap();
        assert_eq!(keys(set.field("posts").unwrap()), vec!["id"]);
    }

    #[test]
    fn test_variable_defaults_and_missing_variables() {
        let set = Selection::from_query(
            r#"
            query ($first: Int = 5, $after: String) {
                posts(first: $first, after: $after) { nodes { id } }
            }
            "#,
            Variables::default(),
            None,
        )
        .unwrap();
        let posts = set.field("posts").unwrap();
        assert_eq!(
            posts.argument("first", &set.variables),
            Some(ConstValue::Number(5.into()))
        );
        assert_eq!(posts.argument("after", &set.variables), None);
    }

    #[test]
    fn test_missing_variable_inside_object_is_dropped() {
        let set = Selection::from_query(
            "query ($age: Int) { users(filter: { name: \"Alice\", age__gt: $age }) { id } }",
            Variables::default(),
            None,
        )
        .unwrap();
        let users = set.field("users").unwrap();
        let filter = users.argument("filter", &set.variables).unwrap();
        match filter {
            ConstValue::Object(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(fields.keys().any(|k| k.as_str() == "name"));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_nodes_merges_edges_and_nodes() {
        let set = parse("{ user { posts { nodes { id } edges { cursor node { text id } } pageInfo { hasNextPage } } } }");
        let posts = set.field("user").unwrap().child("posts").unwrap();
        let nodes = posts.connection_nodes();
        assert_eq!(keys(&nodes), vec!["id", "text"]);
    }

    #[test]
    fn test_named_operation_selection() {
        let query = "query A { a { id } } query B { b { id } }";
        let set = Selection::from_query(query, Variables::default(), Some("B")).unwrap();
        assert!(set.field("b").is_some());

        let err = Selection::from_query(query, Variables::default(), None).unwrap_err();
        assert!(matches!(err, ResolveError::Selection(_)));
    }

    #[test]
    fn test_recursive_fragment_is_rejected() {
        let err = Selection::from_query(
            "{ posts { ...A } } fragment A on Post { ...A }",
            Variables::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Selection(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = Selection::from_query("{ posts { ", Variables::default(), None).unwrap_err();
        assert!(err.is_client_error());
    }
}
