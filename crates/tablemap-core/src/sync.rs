//! Schema synchronization: keep each record type's table and search index in
//! line with its declaration.
//!
//! Synchronizing is idempotent. A missing table or index is created, an index
//! whose columns differ from the declaration is dropped and rebuilt, and an
//! up-to-date index is left alone.

use tracing::{debug, info, warn};

use crate::db::TableDB;
use crate::error::Error;
use crate::model::{Record, RecordDescriptor};
use crate::store::{CreateSearchIndexRequest, CreateTableRequest, TableStore};
use crate::types::{IndexSchema, PRIMARY_KEY_COLUMN, PrimaryKeySchema, PrimaryKeyType, TableMeta};

impl<S: TableStore> TableDB<S> {
    /// Create or update the table and search index of `R`.
    pub fn sync<R: Record>(&self) -> Result<(), Error> {
        self.sync_model(R::descriptor())
    }

    /// Create or update the table and search index of one record type.
    ///
    /// The declaration is validated and its index schema derived before the
    /// store is contacted, so an invalid declaration makes no remote call.
    pub fn sync_model(&self, descriptor: &RecordDescriptor) -> Result<(), Error> {
        descriptor.validate()?;
        let target = descriptor.index_schema()?;
        let table = descriptor.table_name();
        let index = descriptor.index_name();
        info!(table = %table, index = %index, "syncing model");

        let tables = self
            .store
            .list_tables()
            .inspect_err(|e| warn!(error = %e, "list tables failed"))?;
        if !tables.iter().any(|t| *t == table) {
            self.create_table(&table)?;
        }

        let indexes = self
            .store
            .list_search_indexes(&table)
            .inspect_err(|e| warn!(table = %table, error = %e, "list search indexes failed"))?;
        if !indexes.iter().any(|i| i.index_name == index) {
            self.create_index(&table, &index, target)?;
            info!(table = %table, "model synced");
            return Ok(());
        }

        let current = self
            .store
            .describe_search_index(&table, &index)
            .inspect_err(|e| {
                warn!(table = %table, index = %index, error = %e, "describe search index failed")
            })?;
        if current.is_equivalent(&target) {
            debug!(table = %table, index = %index, "index schema unchanged");
            info!(table = %table, "model synced");
            return Ok(());
        }

        info!(table = %table, index = %index, "index schema changed, rebuilding");
        self.delete_index(&table, &index)?;
        self.create_index(&table, &index, target)?;
        info!(table = %table, "model synced");
        Ok(())
    }

    /// Synchronize several record types in order, stopping at the first
    /// failure. Types after the failing one are left untouched.
    pub fn auto_migrate(&self, descriptors: &[&RecordDescriptor]) -> Result<(), Error> {
        for descriptor in descriptors {
            self.sync_model(descriptor)?;
        }
        Ok(())
    }

    /// Create a table keyed by a string `_id` column, using the handle's
    /// table options.
    pub fn create_table(&self, table_name: &str) -> Result<(), Error> {
        let request = CreateTableRequest {
            table_meta: TableMeta {
                table_name: table_name.to_string(),
                primary_key: vec![PrimaryKeySchema {
                    name: PRIMARY_KEY_COLUMN.to_string(),
                    key_type: PrimaryKeyType::String,
                }],
            },
            table_option: self.table_options,
            reserved_throughput: self.reserved_throughput,
        };
        self.store
            .create_table(request)
            .inspect_err(|e| warn!(table = %table_name, error = %e, "create table failed"))?;
        info!(table = %table_name, "table created");
        Ok(())
    }

    pub fn delete_table(&self, table_name: &str) -> Result<(), Error> {
        self.store
            .delete_table(table_name)
            .inspect_err(|e| warn!(table = %table_name, error = %e, "delete table failed"))?;
        info!(table = %table_name, "table deleted");
        Ok(())
    }

    pub fn create_index(
        &self,
        table_name: &str,
        index_name: &str,
        schema: IndexSchema,
    ) -> Result<(), Error> {
        let fields = schema.field_schemas.len();
        self.store
            .create_search_index(CreateSearchIndexRequest {
                table_name: table_name.to_string(),
                index_name: index_name.to_string(),
                index_schema: schema,
            })
            .inspect_err(|e| {
                warn!(table = %table_name, index = %index_name, error = %e, "create search index failed")
            })?;
        info!(table = %table_name, index = %index_name, fields, "search index created");
        Ok(())
    }

    pub fn delete_index(&self, table_name: &str, index_name: &str) -> Result<(), Error> {
        self.store
            .delete_search_index(table_name, index_name)
            .inspect_err(|e| {
                warn!(table = %table_name, index = %index_name, error = %e, "delete search index failed")
            })?;
        info!(table = %table_name, index = %index_name, "search index deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::{SchemaError, StoreError};
    use crate::impl_record;
    use crate::store::{
        BatchWriteRequest, BatchWriteResponse, IndexInfo, SearchRequest, SearchResponse,
    };
    use crate::types::{FieldSchema, IndexFieldType, TableOptions};

    /// Keeps tables and index schemas in memory and logs every call.
    #[derive(Default)]
    struct AdminStore {
        tables: Mutex<Vec<CreateTableRequest>>,
        indexes: Mutex<HashMap<String, IndexSchema>>,
        calls: Mutex<Vec<String>>,
        fail_on: Mutex<Option<&'static str>>,
    }

    impl AdminStore {
        fn log(&self, call: &str) -> Result<(), StoreError> {
            self.calls.lock().push(call.to_string());
            if *self.fail_on.lock() == Some(call) {
                return Err(StoreError::new("OTSInternalServerError", "injected failure"));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().clear();
        }
    }

    impl TableStore for AdminStore {
        fn create_table(&self, request: CreateTableRequest) -> Result<(), StoreError> {
            self.log("create_table")?;
            self.tables.lock().push(request);
            Ok(())
        }

        fn delete_table(&self, table_name: &str) -> Result<(), StoreError> {
            self.log("delete_table")?;
            self.tables
                .lock()
                .retain(|t| t.table_meta.table_name != table_name);
            Ok(())
        }

        fn list_tables(&self) -> Result<Vec<String>, StoreError> {
            self.log("list_tables")?;
            Ok(self
                .tables
                .lock()
                .iter()
                .map(|t| t.table_meta.table_name.clone())
                .collect())
        }

        fn create_search_index(&self, request: CreateSearchIndexRequest) -> Result<(), StoreError> {
            self.log("create_search_index")?;
            self.indexes
                .lock()
                .insert(request.index_name, request.index_schema);
            Ok(())
        }

        fn delete_search_index(&self, _table: &str, index_name: &str) -> Result<(), StoreError> {
            self.log("delete_search_index")?;
            self.indexes.lock().remove(index_name);
            Ok(())
        }

        fn describe_search_index(
            &self,
            _table: &str,
            index_name: &str,
        ) -> Result<IndexSchema, StoreError> {
            self.log("describe_search_index")?;
            self.indexes
                .lock()
                .get(index_name)
                .cloned()
                .ok_or_else(|| StoreError::new("OTSObjectNotExist", "index does not exist"))
        }

        fn list_search_indexes(&self, table_name: &str) -> Result<Vec<IndexInfo>, StoreError> {
            self.log("list_search_indexes")?;
            Ok(self
                .indexes
                .lock()
                .keys()
                .map(|name| IndexInfo {
                    table_name: table_name.to_string(),
                    index_name: name.clone(),
                })
                .collect())
        }

        fn search(&self, _request: &SearchRequest) -> Result<SearchResponse, StoreError> {
            unimplemented!()
        }

        fn batch_write(&self, _request: BatchWriteRequest) -> Result<BatchWriteResponse, StoreError> {
            unimplemented!()
        }
    }

    #[derive(Debug, Default)]
    struct Member {
        id: String,
        name: String,
        age: i64,
    }

    impl_record! {
        Member {
            id: String => "_id",
            name: String => "name",
            age: i64 => "age",
        }
    }

    #[derive(Debug, Default)]
    struct Orphan {
        name: String,
    }

    impl_record! {
        Orphan {
            name: String => "name",
        }
    }

    #[derive(Debug, Default)]
    struct Tagged {
        id: String,
        when: String,
    }

    impl_record! {
        Tagged {
            id: String => "_id",
            when: String => "when" index "date",
        }
    }

    // -----------------------------------------------------------------------
    // sync_model
    // -----------------------------------------------------------------------

    #[test]
    fn test_sync_creates_table_and_index() {
        let db = TableDB::new(AdminStore::default());
        db.sync::<Member>().unwrap();

        assert_eq!(
            db.store().calls(),
            vec![
                "list_tables",
                "create_table",
                "list_search_indexes",
                "create_search_index"
            ]
        );

        let tables = db.store().tables.lock();
        assert_eq!(tables[0].table_meta.table_name, "member");
        assert_eq!(tables[0].table_meta.primary_key[0].name, "_id");
        assert_eq!(
            tables[0].table_meta.primary_key[0].key_type,
            PrimaryKeyType::String
        );
        assert_eq!(tables[0].table_option, TableOptions::default());
        assert_eq!(tables[0].reserved_throughput.read_capacity, 0);

        let indexes = db.store().indexes.lock();
        assert_eq!(
            indexes["member_index"],
            IndexSchema::new(vec![
                FieldSchema::new("name", IndexFieldType::Keyword),
                FieldSchema::new("age", IndexFieldType::Long),
            ])
        );
    }

    #[test]
    fn test_sync_unchanged_schema_makes_no_mutation() {
        let db = TableDB::new(AdminStore::default());
        db.sync::<Member>().unwrap();
        db.store().clear_calls();

        db.sync::<Member>().unwrap();
        assert_eq!(
            db.store().calls(),
            vec!["list_tables", "list_search_indexes", "describe_search_index"]
        );
    }

    #[test]
    fn test_sync_ignores_column_order() {
        let db = TableDB::new(AdminStore::default());
        db.store().indexes.lock().insert(
            "member_index".to_string(),
            IndexSchema::new(vec![
                FieldSchema::new("age", IndexFieldType::Long),
                FieldSchema::new("name", IndexFieldType::Keyword),
            ]),
        );
        db.create_table("member").unwrap();
        db.store().clear_calls();

        db.sync::<Member>().unwrap();
        assert!(!db.store().calls().contains(&"delete_search_index".to_string()));
    }

    #[test]
    fn test_sync_rebuilds_changed_index() {
        let db = TableDB::new(AdminStore::default());
        db.create_table("member").unwrap();
        db.store().indexes.lock().insert(
            "member_index".to_string(),
            IndexSchema::new(vec![FieldSchema::new("name", IndexFieldType::Keyword)]),
        );
        db.store().clear_calls();

        db.sync::<Member>().unwrap();
        assert_eq!(
            db.store().calls(),
            vec![
                "list_tables",
                "list_search_indexes",
                "describe_search_index",
                "delete_search_index",
                "create_search_index",
            ]
        );
        assert_eq!(db.store().indexes.lock()["member_index"].field_schemas.len(), 2);
    }

    #[test]
    fn test_invalid_model_makes_no_remote_call() {
        let db = TableDB::new(AdminStore::default());

        let err = db.sync::<Orphan>().unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::PrimaryKeyMissing)));

        let err = db.sync::<Tagged>().unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnknownIndexTag { .. })));

        assert!(db.store().calls().is_empty());
    }

    #[test]
    fn test_custom_table_options() {
        let options = TableOptions {
            time_to_live: 86400,
            max_versions: 3,
        };
        let db = TableDB::new(AdminStore::default()).with_table_options(options);
        db.create_table("events").unwrap();
        assert_eq!(db.store().tables.lock()[0].table_option, options);
    }

    // -----------------------------------------------------------------------
    // auto_migrate
    // -----------------------------------------------------------------------

    #[test]
    fn test_auto_migrate_stops_at_first_failure() {
        let db = TableDB::new(AdminStore::default());
        let err = db
            .auto_migrate(&[Orphan::descriptor(), Member::descriptor()])
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::PrimaryKeyMissing)));
        assert!(db.store().tables.lock().is_empty());

        db.auto_migrate(&[Member::descriptor()]).unwrap();
        assert_eq!(db.store().tables.lock().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, buffer.contents())
    }

    #[test]
    fn test_unchanged_sync_logs_start_and_end() {
        let db = TableDB::new(AdminStore::default());
        db.sync::<Member>().unwrap();

        let (result, logs) = with_captured_logs(|| db.sync::<Member>());
        result.unwrap();
        assert!(logs.contains("syncing model"));
        assert!(logs.contains("index schema unchanged"));
        assert!(logs.contains("model synced"));
    }

    #[test]
    fn test_failed_sync_step_is_logged() {
        let db = TableDB::new(AdminStore::default());
        *db.store().fail_on.lock() = Some("create_search_index");

        let (result, logs) = with_captured_logs(|| db.sync::<Member>());
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Store(ref e) if e.code == "OTSInternalServerError"));
        assert!(logs.contains("create search index failed"));
        assert!(logs.contains("injected failure"));
        assert!(!logs.contains("model synced"));
    }
}
