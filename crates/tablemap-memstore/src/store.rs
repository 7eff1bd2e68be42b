use std::collections::BTreeMap;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use tablemap_core::error::StoreError;
use tablemap_core::store::{
    BatchWriteRequest, BatchWriteResponse, ColumnsToGet, CreateSearchIndexRequest,
    CreateTableRequest, IndexInfo, RowChange, RowExistence, RowResult, SearchQuery, SearchRequest,
    SearchResponse, TableStore,
};
use tablemap_core::types::{IndexSchema, MAX_OFFSET_WINDOW, PRIMARY_KEY_COLUMN, Row};

use crate::eval::{invalid, matches, sort_rows};

/// Page size of a search that does not set a limit.
pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

const OBJECT_NOT_EXIST: &str = "OTSObjectNotExist";
const OBJECT_ALREADY_EXIST: &str = "OTSObjectAlreadyExist";
const CONDITION_CHECK_FAIL: &str = "OTSConditionCheckFail";
const INJECTED_FAILURE: &str = "OTSInternalServerError";

const TOKEN_PREFIX: &str = "memstore-offset:";

struct Table {
    definition: CreateTableRequest,
    rows: BTreeMap<String, Row>,
    indexes: BTreeMap<String, IndexSchema>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    calls: Vec<String>,
    failures: Vec<String>,
    partial: bool,
}

impl State {
    fn table(&self, name: &str) -> Result<&Table, StoreError> {
        self.tables.get(name).ok_or_else(|| table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, StoreError> {
        self.tables.get_mut(name).ok_or_else(|| table_not_found(name))
    }

    /// Apply one row change and return the id of the row it touched.
    fn apply(&mut self, change: RowChange) -> Result<String, StoreError> {
        match change {
            RowChange::Put {
                table_name,
                row,
                condition,
            } => {
                let table = self.table_mut(&table_name)?;
                let id = row
                    .id()
                    .ok_or_else(|| invalid("row has no string _id primary key"))?
                    .to_string();
                check_condition(condition, table.rows.contains_key(&id))?;
                table.rows.insert(id.clone(), row);
                Ok(id)
            }
            RowChange::Delete {
                table_name,
                primary_key,
                condition,
            } => {
                let table = self.table_mut(&table_name)?;
                let id = primary_key
                    .iter()
                    .find(|c| c.name == PRIMARY_KEY_COLUMN)
                    .and_then(|c| c.value.as_str())
                    .ok_or_else(|| invalid("primary key has no string _id column"))?
                    .to_string();
                check_condition(condition, table.rows.contains_key(&id))?;
                table.rows.remove(&id);
                Ok(id)
            }
        }
    }
}

/// An in-process table store.
///
/// Tables, rows and search indexes live in memory behind a single mutex.
/// Every call is logged by operation name (`"create_table"`, `"search"`, ...)
/// so tests can assert on the exact sequence of remote calls, and failures
/// can be injected per operation.
#[derive(Default)]
pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the operations called so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next call of `op` fail with a store error. Injected failures
    /// queue up; each one is consumed by a single call.
    pub fn fail_next(&self, op: &str) {
        self.state.lock().failures.push(op.to_string());
    }

    /// Report every following search as only partially succeeded.
    pub fn report_partial(&self, partial: bool) {
        self.state.lock().partial = partial;
    }

    /// A stored row by id.
    pub fn row(&self, table_name: &str, id: &str) -> Option<Row> {
        let state = self.state.lock();
        state.tables.get(table_name)?.rows.get(id).cloned()
    }

    pub fn row_count(&self, table_name: &str) -> usize {
        let state = self.state.lock();
        state.tables.get(table_name).map_or(0, |t| t.rows.len())
    }

    /// The request a table was created with.
    pub fn table_definition(&self, table_name: &str) -> Option<CreateTableRequest> {
        let state = self.state.lock();
        state.tables.get(table_name).map(|t| t.definition.clone())
    }

    /// Record the call and consume an injected failure for it, if any.
    fn begin(&self, op: &str) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(op.to_string());
        if let Some(pos) = state.failures.iter().position(|f| f == op) {
            state.failures.remove(pos);
            debug!(op, "injected failure");
            return Err(StoreError::new(
                INJECTED_FAILURE,
                format!("injected failure for {op}"),
            ));
        }
        debug!(op, "store call");
        Ok(state)
    }
}

impl TableStore for MemStore {
    fn create_table(&self, request: CreateTableRequest) -> Result<(), StoreError> {
        let mut state = self.begin("create_table")?;
        let name = request.table_meta.table_name.clone();
        if state.tables.contains_key(&name) {
            return Err(StoreError::new(
                OBJECT_ALREADY_EXIST,
                format!("table '{name}' already exists"),
            ));
        }
        state.tables.insert(
            name,
            Table {
                definition: request,
                rows: BTreeMap::new(),
                indexes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn delete_table(&self, table_name: &str) -> Result<(), StoreError> {
        let mut state = self.begin("delete_table")?;
        state
            .tables
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(|| table_not_found(table_name))
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let state = self.begin("list_tables")?;
        Ok(state.tables.keys().cloned().collect())
    }

    fn create_search_index(&self, request: CreateSearchIndexRequest) -> Result<(), StoreError> {
        let mut state = self.begin("create_search_index")?;
        let table = state.table_mut(&request.table_name)?;
        if table.indexes.contains_key(&request.index_name) {
            return Err(StoreError::new(
                OBJECT_ALREADY_EXIST,
                format!("index '{}' already exists", request.index_name),
            ));
        }
        table
            .indexes
            .insert(request.index_name, request.index_schema);
        Ok(())
    }

    fn delete_search_index(&self, table_name: &str, index_name: &str) -> Result<(), StoreError> {
        let mut state = self.begin("delete_search_index")?;
        state
            .table_mut(table_name)?
            .indexes
            .remove(index_name)
            .map(|_| ())
            .ok_or_else(|| index_not_found(index_name))
    }

    fn describe_search_index(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<IndexSchema, StoreError> {
        let state = self.begin("describe_search_index")?;
        state
            .table(table_name)?
            .indexes
            .get(index_name)
            .cloned()
            .ok_or_else(|| index_not_found(index_name))
    }

    fn list_search_indexes(&self, table_name: &str) -> Result<Vec<IndexInfo>, StoreError> {
        let state = self.begin("list_search_indexes")?;
        Ok(state
            .table(table_name)?
            .indexes
            .keys()
            .map(|index_name| IndexInfo {
                table_name: table_name.to_string(),
                index_name: index_name.clone(),
            })
            .collect())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
        let state = self.begin("search")?;
        let table = state.table(&request.table_name)?;
        if !table.indexes.contains_key(&request.index_name) {
            return Err(index_not_found(&request.index_name));
        }

        let query = &request.search_query;
        let (offset, limit) = page_window(query)?;

        let mut hits = Vec::new();
        for row in table.rows.values() {
            if matches(&query.query, row)? {
                hits.push(row.clone());
            }
        }
        sort_rows(&mut hits, &query.sorters)?;

        let total = hits.len();
        let end = offset.saturating_add(limit).min(total);
        let next_token = (limit > 0 && end < total).then(|| encode_token(end));
        debug!(
            table = %request.table_name,
            total,
            offset,
            limit,
            "search evaluated"
        );

        let rows = hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| match request.columns_to_get {
                ColumnsToGet::All => row,
                ColumnsToGet::PrimaryKeyOnly => Row::new(row.primary_key, Vec::new()),
            })
            .collect();

        Ok(SearchResponse {
            rows,
            total_count: query.get_total_count.then_some(total as i64),
            is_all_succeeded: !state.partial,
            next_token,
        })
    }

    fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse, StoreError> {
        let mut state = self.begin("batch_write")?;
        if request.is_empty() {
            return Err(invalid("batch write has no row change"));
        }

        let mut row_results = Vec::with_capacity(request.row_changes.len());
        for change in request.row_changes {
            let table_name = change.table_name().to_string();
            row_results.push(match state.apply(change) {
                Ok(id) => RowResult {
                    table_name,
                    is_succeed: true,
                    primary_key: Some(id),
                    error: None,
                },
                Err(error) => {
                    debug!(table = %table_name, error = %error, "row change rejected");
                    RowResult {
                        table_name,
                        is_succeed: false,
                        primary_key: None,
                        error: Some(error),
                    }
                }
            });
        }
        Ok(BatchWriteResponse { row_results })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the `(offset, limit)` window of a search.
///
/// A non-empty token replaces offset paging and cannot be combined with an
/// offset or sorters. An empty token starts from the first row.
fn page_window(query: &SearchQuery) -> Result<(usize, usize), StoreError> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    match query.token.as_deref() {
        Some(token) if !token.is_empty() => {
            if query.offset.is_some() || !query.sorters.is_empty() {
                return Err(invalid("a token cannot be combined with offset or sorters"));
            }
            Ok((decode_token(token)?, limit as usize))
        }
        _ => {
            let offset = query.offset.unwrap_or(0);
            if u64::from(offset) + u64::from(limit) > u64::from(MAX_OFFSET_WINDOW) {
                return Err(invalid(format!(
                    "offset + limit must not exceed {MAX_OFFSET_WINDOW}, use a token to page further"
                )));
            }
            Ok((offset as usize, limit as usize))
        }
    }
}

fn encode_token(offset: usize) -> Vec<u8> {
    format!("{TOKEN_PREFIX}{offset}").into_bytes()
}

fn decode_token(token: &[u8]) -> Result<usize, StoreError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.strip_prefix(TOKEN_PREFIX))
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| invalid("invalid token"))
}

fn check_condition(condition: RowExistence, exists: bool) -> Result<(), StoreError> {
    match (condition, exists) {
        (RowExistence::ExpectExist, false) => Err(StoreError::new(
            CONDITION_CHECK_FAIL,
            "condition check failed: row does not exist",
        )),
        (RowExistence::ExpectNotExist, true) => Err(StoreError::new(
            CONDITION_CHECK_FAIL,
            "condition check failed: row already exists",
        )),
        _ => Ok(()),
    }
}

fn table_not_found(name: &str) -> StoreError {
    StoreError::new(OBJECT_NOT_EXIST, format!("table '{name}' does not exist"))
}

fn index_not_found(name: &str) -> StoreError {
    StoreError::new(OBJECT_NOT_EXIST, format!("index '{name}' does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemap_core::query::{Query, SortOrder, Sorter};
    use tablemap_core::types::{
        Column, FieldSchema, IndexFieldType, PrimaryKeySchema, PrimaryKeyType, ReservedThroughput,
        TableMeta, TableOptions,
    };

    fn create_request(name: &str) -> CreateTableRequest {
        CreateTableRequest {
            table_meta: TableMeta {
                table_name: name.to_string(),
                primary_key: vec![PrimaryKeySchema {
                    name: "_id".to_string(),
                    key_type: PrimaryKeyType::String,
                }],
            },
            table_option: TableOptions::default(),
            reserved_throughput: ReservedThroughput::default(),
        }
    }

    fn put(table: &str, id: &str, n: i64) -> RowChange {
        RowChange::Put {
            table_name: table.to_string(),
            row: Row::new(vec![Column::new("_id", id)], vec![Column::new("n", n)]),
            condition: RowExistence::Ignore,
        }
    }

    /// A store with table `t`, index `t_index` and rows `r00..r{count}`.
    fn seeded(count: usize) -> MemStore {
        let store = MemStore::new();
        store.create_table(create_request("t")).unwrap();
        store
            .create_search_index(CreateSearchIndexRequest {
                table_name: "t".to_string(),
                index_name: "t_index".to_string(),
                index_schema: IndexSchema::new(vec![FieldSchema::new("n", IndexFieldType::Long)]),
            })
            .unwrap();
        if count > 0 {
            let changes = (0..count)
                .map(|i| put("t", &format!("r{i:02}"), i as i64))
                .collect();
            store
                .batch_write(BatchWriteRequest {
                    row_changes: changes,
                })
                .unwrap();
        }
        store.clear_calls();
        store
    }

    fn search(store: &MemStore, query: SearchQuery) -> Result<SearchResponse, StoreError> {
        store.search(&SearchRequest {
            table_name: "t".to_string(),
            index_name: "t_index".to_string(),
            search_query: query,
            columns_to_get: ColumnsToGet::All,
        })
    }

    fn ids(response: &SearchResponse) -> Vec<&str> {
        response.rows.iter().filter_map(Row::id).collect()
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    #[test]
    fn test_table_lifecycle() {
        let store = MemStore::new();
        store.create_table(create_request("a")).unwrap();
        let err = store.create_table(create_request("a")).unwrap_err();
        assert_eq!(err.code, OBJECT_ALREADY_EXIST);
        assert_eq!(store.list_tables().unwrap(), vec!["a".to_string()]);

        store.delete_table("a").unwrap();
        let err = store.delete_table("a").unwrap_err();
        assert_eq!(err.code, OBJECT_NOT_EXIST);
        assert_eq!(
            store.calls(),
            vec![
                "create_table",
                "create_table",
                "list_tables",
                "delete_table",
                "delete_table"
            ]
        );
    }

    #[test]
    fn test_index_lifecycle() {
        let store = seeded(0);
        let infos = store.list_search_indexes("t").unwrap();
        assert_eq!(infos[0].index_name, "t_index");
        assert_eq!(
            store.describe_search_index("t", "t_index").unwrap().field_schemas[0].field_name,
            "n"
        );

        store.delete_search_index("t", "t_index").unwrap();
        assert!(store.list_search_indexes("t").unwrap().is_empty());
        let err = store.describe_search_index("t", "t_index").unwrap_err();
        assert_eq!(err.code, OBJECT_NOT_EXIST);
        let err = store.list_search_indexes("missing").unwrap_err();
        assert_eq!(err.code, OBJECT_NOT_EXIST);
    }

    #[test]
    fn test_fail_next_is_consumed_once() {
        let store = MemStore::new();
        store.fail_next("list_tables");
        let err = store.list_tables().unwrap_err();
        assert_eq!(err.code, INJECTED_FAILURE);
        assert!(store.list_tables().is_ok());
    }

    // -----------------------------------------------------------------------
    // Batch writes
    // -----------------------------------------------------------------------

    #[test]
    fn test_batch_write_results_per_row() {
        let store = seeded(0);
        let response = store
            .batch_write(BatchWriteRequest {
                row_changes: vec![put("t", "a", 1), put("nope", "b", 2)],
            })
            .unwrap();
        assert!(response.row_results[0].is_succeed);
        assert_eq!(response.row_results[0].primary_key.as_deref(), Some("a"));
        assert!(!response.row_results[1].is_succeed);
        assert_eq!(response.row_results[1].primary_key, None);
        assert_eq!(store.row_count("t"), 1);
    }

    #[test]
    fn test_batch_write_conditions() {
        let store = seeded(1);
        let response = store
            .batch_write(BatchWriteRequest {
                row_changes: vec![
                    RowChange::Put {
                        table_name: "t".to_string(),
                        row: Row::new(vec![Column::new("_id", "r00")], vec![]),
                        condition: RowExistence::ExpectNotExist,
                    },
                    RowChange::Delete {
                        table_name: "t".to_string(),
                        primary_key: vec![Column::new("_id", "ghost")],
                        condition: RowExistence::ExpectExist,
                    },
                    RowChange::Delete {
                        table_name: "t".to_string(),
                        primary_key: vec![Column::new("_id", "ghost")],
                        condition: RowExistence::Ignore,
                    },
                ],
            })
            .unwrap();
        let outcomes: Vec<bool> = response.row_results.iter().map(|r| r.is_succeed).collect();
        assert_eq!(outcomes, vec![false, false, true]);
        assert_eq!(
            response.row_results[0].error.as_ref().unwrap().code,
            CONDITION_CHECK_FAIL
        );
        assert!(store.row("t", "r00").is_some());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let store = seeded(0);
        let err = store.batch_write(BatchWriteRequest::default()).unwrap_err();
        assert_eq!(err.code, "OTSParameterInvalid");
    }

    // -----------------------------------------------------------------------
    // Search paging
    // -----------------------------------------------------------------------

    #[test]
    fn test_search_default_limit_and_total() {
        let store = seeded(120);
        let response = search(
            &store,
            SearchQuery {
                get_total_count: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(response.rows.len(), DEFAULT_SEARCH_LIMIT as usize);
        assert_eq!(response.total_count, Some(120));
        assert!(response.is_all_succeeded);
        assert!(response.next_token.is_some());
    }

    #[test]
    fn test_search_offset_window() {
        let store = seeded(5);
        let response = search(
            &store,
            SearchQuery {
                offset: Some(1),
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ids(&response), vec!["r01", "r02"]);
        assert_eq!(response.total_count, None);

        let err = search(
            &store,
            SearchQuery {
                offset: Some(1990),
                limit: Some(20),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code, "OTSParameterInvalid");
    }

    #[test]
    fn test_search_token_paging() {
        let store = seeded(5);
        let mut token = Vec::new();
        let mut seen = Vec::new();
        loop {
            let response = search(
                &store,
                SearchQuery {
                    limit: Some(2),
                    token: Some(token),
                    ..Default::default()
                },
            )
            .unwrap();
            seen.extend(ids(&response).into_iter().map(str::to_string));
            match response.next_token {
                Some(next) => token = next,
                None => break,
            }
        }
        assert_eq!(seen, vec!["r00", "r01", "r02", "r03", "r04"]);
    }

    #[test]
    fn test_search_token_rejects_sorters() {
        let store = seeded(3);
        let err = search(
            &store,
            SearchQuery {
                token: Some(encode_token(1)),
                sorters: vec![Sorter::PrimaryKey {
                    order: SortOrder::Asc,
                }],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.code, "OTSParameterInvalid");

        let err = search(
            &store,
            SearchQuery {
                token: Some(b"garbage".to_vec()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.message.contains("token"));
    }

    #[test]
    fn test_search_filters_sorts_and_projects() {
        let store = seeded(5);
        let response = store
            .search(&SearchRequest {
                table_name: "t".to_string(),
                index_name: "t_index".to_string(),
                search_query: SearchQuery {
                    query: Query::terms("n", [1, 3]),
                    sorters: vec![Sorter::Field {
                        field_name: "n".to_string(),
                        order: SortOrder::Desc,
                    }],
                    ..Default::default()
                },
                columns_to_get: ColumnsToGet::PrimaryKeyOnly,
            })
            .unwrap();
        assert_eq!(ids(&response), vec!["r03", "r01"]);
        assert!(response.rows[0].columns.is_empty());
    }

    #[test]
    fn test_search_requires_index_and_reports_partial() {
        let store = seeded(1);
        let err = store
            .search(&SearchRequest {
                table_name: "t".to_string(),
                index_name: "other_index".to_string(),
                search_query: SearchQuery::default(),
                columns_to_get: ColumnsToGet::All,
            })
            .unwrap_err();
        assert_eq!(err.code, OBJECT_NOT_EXIST);

        store.report_partial(true);
        let response = search(&store, SearchQuery::default()).unwrap();
        assert!(!response.is_all_succeeded);
    }
}
