//! Query sessions: a fluent search builder bound to a store.
//!
//! A session accumulates a predicate, paging and sort order, then executes a
//! single search. The accumulated state is taken out of the session before
//! the request is sent, so the session is back at its defaults after every
//! execution, whether the search succeeded or not.

use tracing::debug;

use crate::codec::from_row;
use crate::error::{Error, QueryError};
use crate::model::{Record, table_name};
use crate::query::{Query, SortOrder, Sorter};
use crate::store::{ColumnsToGet, SearchQuery, SearchRequest, SearchResponse, TableStore};
use crate::types::index_name;

/// One page of records fetched with a continuation token.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// Token for the next page; `None` when the result set is exhausted.
    pub next_token: Option<Vec<u8>>,
}

/// A reusable search builder. Not meant to be shared between callers; each
/// caller should open its own session from the database handle.
pub struct QuerySession<'a, S: TableStore> {
    store: &'a S,
    state: SearchQuery,
}

impl<'a, S: TableStore> QuerySession<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self {
            store,
            state: SearchQuery::default(),
        }
    }

    /// The search that the next execution would send.
    pub fn state(&self) -> &SearchQuery {
        &self.state
    }

    /// Set the predicate. No predicate matches everything; several are
    /// combined with AND.
    pub fn query(&mut self, mut queries: Vec<Query>) -> &mut Self {
        self.state.query = match queries.len() {
            0 => Query::match_all(),
            1 => queries.remove(0),
            _ => Query::and(queries),
        };
        self
    }

    /// Rows to skip. The store rejects `offset + limit` above
    /// [`MAX_OFFSET_WINDOW`](crate::types::MAX_OFFSET_WINDOW); page past that
    /// with tokens.
    pub fn offset(&mut self, n: u32) -> &mut Self {
        self.state.offset = Some(n);
        self
    }

    /// Maximum rows to return. See [`offset`](Self::offset) for the window
    /// limit.
    pub fn limit(&mut self, n: u32) -> &mut Self {
        self.state.limit = Some(n);
        self
    }

    /// Continue from a previous search's token. Offset paging, the limit and
    /// the sort order are cleared: a token already fixes the position and
    /// order of the remaining rows.
    pub fn token(&mut self, token: Vec<u8>) -> &mut Self {
        self.state.offset = None;
        self.state.limit = None;
        self.state.sorters.clear();
        self.state.token = Some(token);
        self
    }

    pub fn sort_by_field(&mut self, field: impl Into<String>, asc: bool) -> &mut Self {
        self.state.sorters.push(Sorter::Field {
            field_name: field.into(),
            order: SortOrder::from_asc(asc),
        });
        self
    }

    pub fn sort_by_primary_key(&mut self, asc: bool) -> &mut Self {
        self.state.sorters.push(Sorter::PrimaryKey {
            order: SortOrder::from_asc(asc),
        });
        self
    }

    pub fn sort_by_score(&mut self, asc: bool) -> &mut Self {
        self.state.sorters.push(Sorter::Score {
            order: SortOrder::from_asc(asc),
        });
        self
    }

    /// Sort by distance from the nearest of `points` (`"lat,lon"`).
    pub fn sort_by_geo_distance(&mut self, field: impl Into<String>, points: Vec<String>) -> &mut Self {
        self.state.sorters.push(Sorter::GeoDistance {
            field_name: field.into(),
            points,
        });
        self
    }

    /// Number of rows matching the predicate. No rows are fetched.
    pub fn count<R: Record>(&mut self) -> Result<i64, Error> {
        self.state.limit = Some(0);
        self.state.offset = None;
        self.state.get_total_count = true;

        let response = self.search(&table_name::<R>(), ColumnsToGet::PrimaryKeyOnly)?;
        if !response.is_all_succeeded {
            return Err(QueryError::NotAllSucceeded.into());
        }
        let total = response.total_count.ok_or(QueryError::NoResult)?;
        Ok(total)
    }

    /// The first matching record. There is no `last`; reverse the sort order
    /// instead.
    pub fn first<R: Record>(&mut self) -> Result<R, Error> {
        self.state.limit = Some(1);
        let response = self.execute(&table_name::<R>(), ColumnsToGet::All)?;
        let row = response.rows.first().ok_or(QueryError::NoResult)?;
        from_row(row)
    }

    /// Every matching record within the configured offset and limit.
    pub fn find_all<R: Record>(&mut self) -> Result<Vec<R>, Error> {
        let response = self.execute(&table_name::<R>(), ColumnsToGet::All)?;
        response.rows.iter().map(from_row).collect()
    }

    /// One page of records starting at `token` (empty for the first page).
    /// The configured limit is kept as the page size.
    pub fn find_by_token<R: Record>(&mut self, token: Vec<u8>) -> Result<Page<R>, Error> {
        self.state.offset = None;
        self.state.sorters.clear();
        self.state.token = Some(token);

        let response = self.execute(&table_name::<R>(), ColumnsToGet::All)?;
        let records = response
            .rows
            .iter()
            .map(from_row)
            .collect::<Result<Vec<R>, Error>>()?;
        Ok(Page {
            records,
            next_token: response.next_token,
        })
    }

    /// Send the configured search against `table_name` and its index.
    ///
    /// Fails with [`QueryError::NoResult`] when no rows come back and with
    /// [`QueryError::NotAllSucceeded`] when the store reports a partial result.
    pub fn execute(
        &mut self,
        table_name: &str,
        columns_to_get: ColumnsToGet,
    ) -> Result<SearchResponse, Error> {
        let response = self.search(table_name, columns_to_get)?;
        if response.rows.is_empty() {
            return Err(QueryError::NoResult.into());
        }
        if !response.is_all_succeeded {
            return Err(QueryError::NotAllSucceeded.into());
        }
        Ok(response)
    }

    fn search(
        &mut self,
        table_name: &str,
        columns_to_get: ColumnsToGet,
    ) -> Result<SearchResponse, Error> {
        let request = SearchRequest {
            table_name: table_name.to_string(),
            index_name: index_name(table_name),
            search_query: std::mem::take(&mut self.state),
            columns_to_get,
        };
        debug!(
            table = %request.table_name,
            index = %request.index_name,
            offset = ?request.search_query.offset,
            limit = ?request.search_query.limit,
            "search"
        );
        Ok(self.store.search(&request)?)
    }
}
