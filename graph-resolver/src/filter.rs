//! Declarative filters
//!
//! A GraphQL `filter` argument is a flat object whose keys are `field` (implicit
//! equality) or `field__operator`. Entries bound to unsupplied variables are
//! skipped; an explicit `null` is applied as a value.
//!
//! ```graphql
//! posts(filter: { status: "published", author_id__in: [1, 2], rating__gte: 4 })
//! ```

use std::fmt;
use std::sync::Arc;

use async_graphql_value::{ConstValue, Value, Variables};
use indexmap::IndexMap;

use crate::adapter::OrmAdapter;
use crate::error::{ResolveError, ResolveResult};
use crate::graph::ResolveContext;

/// Separator between the column and the operator in a filter key
pub const OPERATOR_SEPARATOR: &str = "__";

/// Name of the argument holding the filter object
pub const FILTER_ARGUMENT: &str = "filter";

/// A single scalar filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum FilterScalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Value of one filter entry
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Scalar(FilterScalar),
    List(Vec<FilterScalar>),
}

impl fmt::Display for FilterScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterScalar::String(s) => write!(f, "{s:?}"),
            FilterScalar::Int(i) => write!(f, "{i}"),
            FilterScalar::Float(x) => write!(f, "{x}"),
            FilterScalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Null => f.write_str("null"),
            FilterValue::Scalar(s) => s.fmt(f),
            FilterValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Scalar(FilterScalar::Int(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(FilterScalar::String(value.to_string()))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Scalar(FilterScalar::Bool(value))
    }
}

/// A parsed filter object. `None` entries were bound to unsupplied variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: IndexMap<String, Option<FilterValue>>,
}

impl Filter {
    /// Entries in the order they were written
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&FilterValue>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a `filter` argument.
    ///
    /// Returns `Ok(None)` when the argument is `null` or an unsupplied variable,
    /// and [`ResolveError::InvalidFilter`] when it is anything but an object.
    pub fn from_argument(value: &Value, variables: &Variables) -> ResolveResult<Option<Self>> {
        match value {
            Value::Variable(name) => match variables.get(name) {
                Some(resolved) => Self::from_argument(&resolved.clone().into_value(), variables),
                None => Ok(None),
            },
            Value::Null => Ok(None),
            Value::Object(fields) => {
                let mut entries = IndexMap::with_capacity(fields.len());
                for (key, entry) in fields {
                    let parsed = match entry {
                        // Support optional GraphQL arguments in filter
                        Value::Variable(name) => match variables.get(name) {
                            Some(resolved) => Some(parse_const(key, resolved)?),
                            None => None,
                        },
                        other => {
                            let resolved = crate::selection::resolve_value(other, variables)
                                .unwrap_or(ConstValue::Null);
                            Some(parse_const(key, &resolved)?)
                        }
                    };
                    entries.insert(key.to_string(), parsed);
                }
                Ok(Some(Self { entries }))
            }
            other => Err(ResolveError::InvalidFilter(other.to_string())),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Option<FilterValue>)> for Filter {
    fn from_iter<T: IntoIterator<Item = (K, Option<FilterValue>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

fn parse_const(key: &str, value: &ConstValue) -> ResolveResult<FilterValue> {
    match value {
        ConstValue::Null => Ok(FilterValue::Null),
        ConstValue::List(items) => items
            .iter()
            .map(|item| match item {
                ConstValue::Null => Err(invalid_entry(key, value)),
                other => parse_scalar(key, other),
            })
            .collect::<ResolveResult<Vec<_>>>()
            .map(FilterValue::List),
        other => parse_scalar(key, other).map(FilterValue::Scalar),
    }
}

fn parse_scalar(key: &str, value: &ConstValue) -> ResolveResult<FilterScalar> {
    match value {
        ConstValue::String(s) => Ok(FilterScalar::String(s.clone())),
        ConstValue::Enum(name) => Ok(FilterScalar::String(name.to_string())),
        ConstValue::Boolean(b) => Ok(FilterScalar::Bool(*b)),
        ConstValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(FilterScalar::Int(i)),
            None => n
                .as_f64()
                .map(FilterScalar::Float)
                .ok_or_else(|| invalid_entry(key, value)),
        },
        _ => Err(invalid_entry(key, value)),
    }
}

fn invalid_entry(key: &str, value: &ConstValue) -> ResolveError {
    ResolveError::InvalidFilter(format!("{{ {key}: {value} }}"))
}

/// Split `field__operator` into the column and the lower-cased operator
pub fn split_filter_key(key: &str) -> (&str, Option<String>) {
    let mut parts = key.split(OPERATOR_SEPARATOR);
    let field = parts.next().unwrap_or(key);
    let operator = parts.next().map(str::to_lowercase);
    (field, operator)
}

/// Custom handling for one filter key
pub type FilterModifier<A> = Arc<
    dyn Fn(
            <A as OrmAdapter>::Query,
            &FilterValue,
            &ResolveContext<'_, A>,
        ) -> ResolveResult<<A as OrmAdapter>::Query>
        + Send
        + Sync,
>;

/// Whether a field accepts filters, and custom handlers for specific keys.
pub struct FilterOptions<A: OrmAdapter> {
    enabled: bool,
    modifiers: IndexMap<String, FilterModifier<A>>,
}

impl<A: OrmAdapter> Clone for FilterOptions<A> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            modifiers: self.modifiers.clone(),
        }
    }
}

impl<A: OrmAdapter> Default for FilterOptions<A> {
    fn default() -> Self {
        Self::disabled()
    }
}

impl<A: OrmAdapter> fmt::Debug for FilterOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("enabled", &self.enabled)
            .field("modifiers", &self.modifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A: OrmAdapter> FilterOptions<A> {
    /// Filters are ignored
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            modifiers: IndexMap::new(),
        }
    }

    /// Filters are read from the `filter` argument
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            modifiers: IndexMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register a handler that fully owns how `key` is applied
    pub fn modifier<F>(mut self, key: impl Into<String>, modifier: F) -> Self
    where
        F: Fn(A::Query, &FilterValue, &ResolveContext<'_, A>) -> ResolveResult<A::Query>
            + Send
            + Sync
            + 'static,
    {
        self.modifiers.insert(key.into(), Arc::new(modifier));
        self
    }
}

/// Apply the current field's `filter` argument to `query`.
pub fn apply_filters<A: OrmAdapter>(
    query: A::Query,
    options: &FilterOptions<A>,
    context: &ResolveContext<'_, A>,
) -> ResolveResult<A::Query> {
    if !options.enabled {
        return Ok(query);
    }
    let Some(raw) = context.selection().raw_argument(FILTER_ARGUMENT) else {
        return Ok(query);
    };
    let Some(filter) = Filter::from_argument(raw, context.graph().variables())? else {
        return Ok(query);
    };

    let adapter = context.graph().adapter();
    let mut query = query;
    for (key, value) in filter.entries() {
        let Some(value) = value else {
            continue;
        };
        if let Some(modifier) = options.modifiers.get(key) {
            query = modifier(query, value, context)?;
        } else {
            let (table_field, operator) = split_filter_key(key);
            query = adapter.where_field(query, table_field, operator.as_deref(), value)?;
        }
    }

    tracing::trace!(
        field = context.field(),
        entries = filter.len(),
        "Applied filters"
    );

    Ok(query)
}
