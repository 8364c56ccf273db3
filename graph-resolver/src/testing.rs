//! Recording adapter for engine tests
//!
//! Every adapter call is appended to a `Vec<Call>` so tests can assert the exact
//! sequence the engine produced.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::adapter::{Operator, OrderDirection, OrmAdapter, RelationSpec};
use crate::error::ResolveResult;
use crate::filter::FilterValue;
use crate::pagination::{PageRequest, PaginationContext};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Where {
        field: String,
        operator: Option<String>,
        value: FilterValue,
    },
    Column {
        column: String,
        alias: String,
    },
    Raw(String),
    Relation {
        relation: String,
        alias: String,
        subquery: Vec<Call>,
    },
    OrderBy(String),
    ModifyPagination {
        offset: u64,
        limit: u64,
        context: usize,
    },
    FinishPagination {
        field: String,
        context: usize,
    },
}

/// Pagination contexts are numbered from 1 in the order they are written.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    contexts: AtomicUsize,
}

impl OrmAdapter for RecordingAdapter {
    type Query = Vec<Call>;
    type PageState = usize;

    fn select_relation<F>(
        &self,
        mut query: Vec<Call>,
        relation: RelationSpec<'_>,
        modify: F,
    ) -> ResolveResult<Vec<Call>>
    where
        F: FnOnce(Vec<Call>) -> ResolveResult<Vec<Call>>,
    {
        let subquery = modify(Vec::new())?;
        query.push(Call::Relation {
            relation: relation.relation.to_string(),
            alias: relation.alias.to_string(),
            subquery,
        });
        Ok(query)
    }

    fn where_field(
        &self,
        mut query: Vec<Call>,
        field: &str,
        operator: Option<&str>,
        value: &FilterValue,
    ) -> ResolveResult<Vec<Call>> {
        Operator::parse(field, operator)?;
        query.push(Call::Where {
            field: field.to_string(),
            operator: operator.map(str::to_string),
            value: value.clone(),
        });
        Ok(query)
    }

    fn select_column(
        &self,
        mut query: Vec<Call>,
        column: &str,
        alias: &str,
    ) -> ResolveResult<Vec<Call>> {
        query.push(Call::Column {
            column: column.to_string(),
            alias: alias.to_string(),
        });
        Ok(query)
    }

    fn order_by(
        &self,
        mut query: Vec<Call>,
        column: &str,
        direction: OrderDirection,
    ) -> ResolveResult<Vec<Call>> {
        query.push(Call::OrderBy(format!("{column} {}", direction.to_sql())));
        Ok(query)
    }

    fn modify_subquery_pagination(
        &self,
        mut subquery: Vec<Call>,
        page: &PageRequest,
        pagination: &mut PaginationContext<usize>,
    ) -> ResolveResult<Vec<Call>> {
        let context = self.contexts.fetch_add(1, Ordering::SeqCst) + 1;
        pagination.record(context)?;
        subquery.push(Call::ModifyPagination {
            offset: page.offset,
            limit: page.limit,
            context,
        });
        Ok(subquery)
    }

    fn finish_query_pagination(
        &self,
        mut query: Vec<Call>,
        field: &str,
        pagination: &mut PaginationContext<usize>,
    ) -> ResolveResult<Vec<Call>> {
        let context = pagination.take(field)?;
        query.push(Call::FinishPagination {
            field: field.to_string(),
            context,
        });
        Ok(query)
    }
}
