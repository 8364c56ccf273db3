//! Adapter capability interface
//!
//! The engine never inspects the query object it builds. Every transformation goes
//! through an [`OrmAdapter`], so the same resolution logic drives structurally
//! different data-access layers.

use std::fmt;
use std::str::FromStr;

use crate::error::{ResolveError, ResolveResult};
use crate::filter::FilterValue;
use crate::pagination::{PageRequest, PaginationContext};

/// Names a relation to include and the response key it is attached under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSpec<'a> {
    /// Relation name as the adapter knows it
    pub relation: &'a str,
    /// Key under which the relation's rows are attached
    pub alias: &'a str,
}

/// Contract a concrete data-access layer must satisfy.
///
/// Sequencing contract for paginated relations: `modify_subquery_pagination` runs
/// inside the `modify` callback passed to `select_relation`, and
/// `finish_query_pagination` runs exactly once afterwards on the outer query with
/// the same [`PaginationContext`].
pub trait OrmAdapter: Send + Sync {
    /// Opaque query object owned by the adapter
    type Query;

    /// Bookkeeping carried from subquery pagination to outer-query finishing
    type PageState;

    /// Eagerly include a relation, fetched in the same batch as the outer query.
    ///
    /// `modify` is applied to the relation's own subquery before it is attached.
    fn select_relation<F>(
        &self,
        query: Self::Query,
        relation: RelationSpec<'_>,
        modify: F,
    ) -> ResolveResult<Self::Query>
    where
        F: FnOnce(Self::Query) -> ResolveResult<Self::Query>;

    /// Apply one filter condition. `operator` is `None` for implicit equality.
    ///
    /// Fails with [`ResolveError::UnsupportedOperator`] for operators outside the
    /// adapter's vocabulary.
    fn where_field(
        &self,
        query: Self::Query,
        field: &str,
        operator: Option<&str>,
        value: &FilterValue,
    ) -> ResolveResult<Self::Query>;

    /// Select a column under a different response key
    fn select_column(
        &self,
        query: Self::Query,
        column: &str,
        alias: &str,
    ) -> ResolveResult<Self::Query>;

    /// Append an ordering term
    fn order_by(
        &self,
        query: Self::Query,
        column: &str,
        direction: OrderDirection,
    ) -> ResolveResult<Self::Query>;

    /// Inject the page window into a relation subquery and record bookkeeping
    fn modify_subquery_pagination(
        &self,
        subquery: Self::Query,
        page: &PageRequest,
        pagination: &mut PaginationContext<Self::PageState>,
    ) -> ResolveResult<Self::Query>;

    /// Reshape the outer query so `field` materialises as a connection
    fn finish_query_pagination(
        &self,
        query: Self::Query,
        field: &str,
        pagination: &mut PaginationContext<Self::PageState>,
    ) -> ResolveResult<Self::Query>;
}

/// Filter operators understood by the bundled adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl Operator {
    /// Parse an optional, already lower-cased suffix; `None` means equality
    pub fn parse(field: &str, operator: Option<&str>) -> ResolveResult<Self> {
        match operator {
            None => Ok(Operator::Eq),
            Some(op) => op.parse().map_err(|_| ResolveError::UnsupportedOperator {
                field: field.to_string(),
                operator: op.to_string(),
            }),
        }
    }

    /// Suffix used in filter keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }

    /// Whether the operator takes a list of values
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for ORDER BY clauses.
#[derive(async_graphql::Enum, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[graphql(name = "SortDirection")]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9, oldest-newest)
    #[default]
    #[graphql(name = "Asc")]
    Asc,
    /// Descending order (Z-A, 9-1, newest-oldest)
    #[graphql(name = "Desc")]
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_missing_operator_is_equality() {
        assert_eq!(Operator::parse("age", None).unwrap(), Operator::Eq);
    }

    #[test]
    fn test_known_operators() {
        for op in ["eq", "ne", "gt", "gte", "lt", "lte", "in", "not_in"] {
            let parsed = Operator::parse("age", Some(op)).unwrap();
            assert_eq!(parsed.as_str(), op);
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = Operator::parse("name", Some("like")).unwrap_err();
        assert_matches!(
            err,
            ResolveError::UnsupportedOperator { ref field, ref operator }
                if field == "name" && operator == "like"
        );
    }
}
