//! The remote table store contract.
//!
//! tablemap never touches storage itself: every read, write and piece of
//! administration goes through a [`TableStore`]. Calls are synchronous and a
//! failure is returned as-is; nothing here retries.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::query::{Query, Sorter};
use crate::types::{Column, IndexSchema, ReservedThroughput, Row, TableMeta, TableOptions};

/// Operations the remote store exposes.
pub trait TableStore {
    fn create_table(&self, request: CreateTableRequest) -> Result<(), StoreError>;

    fn delete_table(&self, table_name: &str) -> Result<(), StoreError>;

    fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    fn create_search_index(&self, request: CreateSearchIndexRequest) -> Result<(), StoreError>;

    fn delete_search_index(&self, table_name: &str, index_name: &str) -> Result<(), StoreError>;

    fn describe_search_index(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<IndexSchema, StoreError>;

    fn list_search_indexes(&self, table_name: &str) -> Result<Vec<IndexInfo>, StoreError>;

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError>;

    fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse, StoreError>;
}

impl<S: TableStore + ?Sized> TableStore for &S {
    fn create_table(&self, request: CreateTableRequest) -> Result<(), StoreError> {
        (**self).create_table(request)
    }

    fn delete_table(&self, table_name: &str) -> Result<(), StoreError> {
        (**self).delete_table(table_name)
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_tables()
    }

    fn create_search_index(&self, request: CreateSearchIndexRequest) -> Result<(), StoreError> {
        (**self).create_search_index(request)
    }

    fn delete_search_index(&self, table_name: &str, index_name: &str) -> Result<(), StoreError> {
        (**self).delete_search_index(table_name, index_name)
    }

    fn describe_search_index(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<IndexSchema, StoreError> {
        (**self).describe_search_index(table_name, index_name)
    }

    fn list_search_indexes(&self, table_name: &str) -> Result<Vec<IndexInfo>, StoreError> {
        (**self).list_search_indexes(table_name)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
        (**self).search(request)
    }

    fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse, StoreError> {
        (**self).batch_write(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub table_meta: TableMeta,
    pub table_option: TableOptions,
    pub reserved_throughput: ReservedThroughput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSearchIndexRequest {
    pub table_name: String,
    pub index_name: String,
    pub index_schema: IndexSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub table_name: String,
    pub index_name: String,
}

/// The query part of a search: predicate, paging, sorting.
///
/// `offset` and `limit` are `None` when unset; the store then applies its
/// own defaults. A `token` continues a previous search and is only valid
/// without an offset or sorters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: Query,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub get_total_count: bool,
    pub sorters: Vec<Sorter>,
    pub token: Option<Vec<u8>>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: Query::match_all(),
            offset: None,
            limit: None,
            get_total_count: false,
            sorters: Vec::new(),
            token: None,
        }
    }
}

/// Which columns a search returns besides the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnsToGet {
    All,
    PrimaryKeyOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub table_name: String,
    pub index_name: String,
    pub search_query: SearchQuery,
    pub columns_to_get: ColumnsToGet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub rows: Vec<Row>,
    /// Total matches, when the request asked for it.
    pub total_count: Option<i64>,
    pub is_all_succeeded: bool,
    /// Continuation token; `None` once the result set is exhausted.
    pub next_token: Option<Vec<u8>>,
}

/// Expected state of a row before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowExistence {
    Ignore,
    ExpectExist,
    ExpectNotExist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowChange {
    Put {
        table_name: String,
        row: Row,
        condition: RowExistence,
    },
    Delete {
        table_name: String,
        primary_key: Vec<Column>,
        condition: RowExistence,
    },
}

impl RowChange {
    pub fn table_name(&self) -> &str {
        match self {
            RowChange::Put { table_name, .. } | RowChange::Delete { table_name, .. } => table_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteRequest {
    pub row_changes: Vec<RowChange>,
}

impl BatchWriteRequest {
    pub fn add_row_change(&mut self, change: RowChange) {
        self.row_changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.row_changes.is_empty()
    }
}

/// Outcome of one row of a batch write.
///
/// The store does not always echo the primary key of a failed row, so
/// `primary_key` may be `None` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub table_name: String,
    pub is_succeed: bool,
    pub primary_key: Option<String>,
    pub error: Option<StoreError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteResponse {
    pub row_results: Vec<RowResult>,
}
