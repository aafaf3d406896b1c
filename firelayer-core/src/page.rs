//! Relay-style cursor pagination over ordered queries.
//!
//! Ordered document stores do not offer "page N" or total counts; they offer an ordered
//! query that can be bounded with `start_after`, `end_before` and `limit`. [`paginate`]
//! builds forward and backward pages on top of exactly those primitives:
//!
//! - `first` (+ `after`): `forward.start_after(after).limit(first)`
//! - `last` (+ `before`): `backward.start_after(before).limit(last)`, reversed back into
//!   forward order
//! - neither: the whole `forward` query
//!
//! `has_next_page` and `has_previous_page` are answered with one-row look-ahead queries on
//! the forward query, so a page costs one primary query plus at most two more.
//!
//! # Example
//!
//! ```ignore
//! use firelayer::page::{PageQuery, PaginateInput};
//! use firelayer::query::{Query, SortDirection};
//!
//! let page_query = PageQuery::new(
//!     Query::new().order_by("createdAt", SortDirection::Asc),
//!     Query::new().order_by("createdAt", SortDirection::Desc),
//!     "createdAt",
//! );
//!
//! let first = users.paginate(PaginateInput::forward(2, None), &page_query, Default::default()).await?;
//! let next = users
//!     .paginate(PaginateInput::forward(2, first.page_info.end_cursor.clone()), &page_query, Default::default())
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::Bson;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
};

/// The value of the cursor field on one record.
///
/// Cursors are only meaningful for the query they came from: they are fed back as
/// `after`/`before` and end up in `start_after` of the forward or backward query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct Cursor(Bson);

impl Cursor {
    pub fn new(value: impl Into<Bson>) -> Self {
        Self(value.into())
    }

    pub fn as_bson(&self) -> &Bson {
        &self.0
    }

    pub fn into_inner(self) -> Bson {
        self.0
    }
}

impl From<Bson> for Cursor {
    fn from(value: Bson) -> Self {
        Self(value)
    }
}

impl From<Cursor> for Bson {
    fn from(cursor: Cursor) -> Self {
        cursor.0
    }
}

/// A page request.
///
/// Set either `first` (optionally with `after`) or `last` (optionally with `before`).
/// When both sizes are set `first` wins; when neither is set the whole query is returned.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PaginateInput {
    pub first: Option<usize>,
    pub after: Option<Cursor>,
    pub last: Option<usize>,
    pub before: Option<Cursor>,
}

impl PaginateInput {
    /// Requests `first` records following `after`.
    pub fn forward(first: usize, after: Option<Cursor>) -> Self {
        Self { first: Some(first), after, ..Self::default() }
    }

    /// Requests the `last` records preceding `before`.
    pub fn backward(last: usize, before: Option<Cursor>) -> Self {
        Self { last: Some(last), before, ..Self::default() }
    }

    pub fn builder() -> PaginateInputBuilder {
        PaginateInputBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct PaginateInputBuilder {
    input: PaginateInput,
}

impl PaginateInputBuilder {
    pub fn first(mut self, first: usize) -> Self {
        self.input.first = Some(first);
        self
    }

    pub fn after(mut self, after: impl Into<Cursor>) -> Self {
        self.input.after = Some(after.into());
        self
    }

    pub fn last(mut self, last: usize) -> Self {
        self.input.last = Some(last);
        self
    }

    pub fn before(mut self, before: impl Into<Cursor>) -> Self {
        self.input.before = Some(before.into());
        self
    }

    pub fn build(self) -> PaginateInput {
        self.input
    }
}

/// The queries a collection is paginated with.
///
/// `forward` defines the canonical order; `backward` must be the same query with the
/// ordering reversed. `cursor_field` names the field whose value becomes each edge's
/// cursor and should be the field both queries are ordered by.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub forward: Query,
    pub backward: Query,
    pub cursor_field: String,
}

impl PageQuery {
    pub fn new(forward: Query, backward: Query, cursor_field: impl Into<String>) -> Self {
        Self { forward, backward, cursor_field: cursor_field.into() }
    }

    /// Derives the backward query by reversing the ordering of `forward`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] if `forward` is not ordered.
    pub fn from_forward(forward: Query, cursor_field: impl Into<String>) -> DocumentStoreResult<Self> {
        let order = forward.order.clone().ok_or_else(|| {
            DocumentStoreError::InvalidQuery("pagination requires an ordered query".to_string())
        })?;
        let backward = forward
            .clone()
            .order_by(order.field, order.direction.reverse());

        Ok(Self::new(forward, backward, cursor_field))
    }
}

/// A node together with its cursor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge<N> {
    pub node: N,
    pub cursor: Cursor,
}

/// Pagination metadata for one page.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// One page of edges, in forward order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
}

impl<N> Page<N> {
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.edges
            .iter()
            .map(|edge| &edge.node)
    }

    pub fn into_nodes(self) -> Vec<N> {
        self.edges
            .into_iter()
            .map(|edge| edge.node)
            .collect()
    }

    /// Maps every node, keeping cursors and page info.
    pub fn map<U>(self, mut f: impl FnMut(N) -> U) -> Page<U> {
        Page {
            edges: self
                .edges
                .into_iter()
                .map(|Edge { node, cursor }| Edge { node: f(node), cursor })
                .collect(),
            page_info: self.page_info,
        }
    }
}

impl<N> Default for Page<N> {
    fn default() -> Self {
        Self { edges: Vec::new(), page_info: PageInfo::default() }
    }
}

/// Runs queries for the paginator and exposes the nodes' stored fields.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Node: Send;

    /// Executes `query` against the source's collection and maps the results.
    ///
    /// `primary` is `true` for the query that produces the page and `false` for the
    /// one-row existence checks.
    async fn fetch(&self, query: Query, primary: bool) -> DocumentStoreResult<Vec<Self::Node>>;

    /// Returns the value of `field` on `node`, or `None` if the node does not carry it.
    fn cursor_value(&self, node: &Self::Node, field: &str) -> DocumentStoreResult<Option<Bson>>;

    /// Describes `node` in error messages.
    fn describe(&self, node: &Self::Node) -> String;
}

/// Fetches one page.
///
/// Without `first` or `last` the whole forward query is read in one go. That is meant for
/// small collections; on a large one it is a full scan.
///
/// # Errors
///
/// - [`DocumentStoreError::MissingCursorField`] if any returned node lacks the cursor field;
///   the page is abandoned.
/// - Any error of the underlying queries, unchanged.
pub async fn paginate<S>(
    input: &PaginateInput,
    page_query: &PageQuery,
    source: &S,
) -> DocumentStoreResult<Page<S::Node>>
where
    S: PageSource + ?Sized,
{
    let PageQuery { forward, backward, cursor_field } = page_query;

    let nodes = if let Some(first) = input.first {
        debug!(first, after = input.after.is_some(), "fetching forward page");

        let query = match &input.after {
            Some(after) => forward
                .clone()
                .start_after(after.clone())
                .limit(first),
            None => forward.clone().limit(first),
        };

        source.fetch(query, true).await?
    } else if let Some(last) = input.last {
        debug!(last, before = input.before.is_some(), "fetching backward page");

        let query = match &input.before {
            Some(before) => backward
                .clone()
                .start_after(before.clone())
                .limit(last),
            None => backward.clone().limit(last),
        };

        let mut nodes = source.fetch(query, true).await?;
        nodes.reverse();
        nodes
    } else {
        debug!("fetching unbounded page");

        source.fetch(forward.clone(), true).await?
    };

    let edges = nodes
        .into_iter()
        .map(|node| match source.cursor_value(&node, cursor_field)? {
            Some(value) => Ok(Edge { cursor: Cursor(value), node }),
            None => Err(DocumentStoreError::MissingCursorField(
                cursor_field.clone(),
                source.describe(&node),
            )),
        })
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    let start_cursor = edges.first().map(|edge| edge.cursor.clone());
    let end_cursor = edges.last().map(|edge| edge.cursor.clone());

    let (has_next_page, has_previous_page) = futures::try_join!(
        has_rows(source, forward, end_cursor.as_ref(), Side::After),
        has_rows(source, forward, start_cursor.as_ref(), Side::Before),
    )?;

    Ok(Page {
        edges,
        page_info: PageInfo { start_cursor, end_cursor, has_next_page, has_previous_page },
    })
}

enum Side {
    After,
    Before,
}

async fn has_rows<S>(
    source: &S,
    forward: &Query,
    cursor: Option<&Cursor>,
    side: Side,
) -> DocumentStoreResult<bool>
where
    S: PageSource + ?Sized,
{
    let Some(cursor) = cursor else {
        return Ok(false);
    };

    let query = match side {
        Side::After => forward.clone().start_after(cursor.clone()),
        Side::Before => forward.clone().end_before(cursor.clone()),
    };

    Ok(!source
        .fetch(query.limit(1), false)
        .await?
        .is_empty())
}
