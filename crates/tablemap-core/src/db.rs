use tracing::debug;

use crate::codec::{check_batch_write, delete_row_change, put_row_change};
use crate::error::Error;
use crate::model::Record;
use crate::session::QuerySession;
use crate::store::{BatchWriteRequest, RowChange, TableStore};
use crate::types::{ReservedThroughput, TableOptions};

/// The main database handle: a remote store plus the options used when
/// tables are created.
///
/// All state lives in the store, so a `TableDB` is as shareable as its store.
/// Reads go through [`session`](Self::session), writes through
/// [`save`](Self::save) and [`delete`](Self::delete), and administration
/// through the schema synchronization methods.
pub struct TableDB<S> {
    pub(crate) store: S,
    pub(crate) table_options: TableOptions,
    pub(crate) reserved_throughput: ReservedThroughput,
}

impl<S: TableStore> TableDB<S> {
    /// Wrap a store. Tables are created with rows kept forever, a single
    /// version per column and no reserved throughput.
    pub fn new(store: S) -> Self {
        Self {
            store,
            table_options: TableOptions::default(),
            reserved_throughput: ReservedThroughput::default(),
        }
    }

    /// Override the options of tables created from now on.
    pub fn with_table_options(mut self, options: TableOptions) -> Self {
        self.table_options = options;
        self
    }

    pub fn with_reserved_throughput(mut self, throughput: ReservedThroughput) -> Self {
        self.reserved_throughput = throughput;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn table_options(&self) -> TableOptions {
        self.table_options
    }

    /// Open a fresh query session.
    pub fn session(&self) -> QuerySession<'_, S> {
        QuerySession::new(&self.store)
    }

    /// Write every record, overwriting rows with the same id. Records without
    /// an id are given one.
    pub fn save<R: Record>(&self, records: &mut [R]) -> Result<(), Error> {
        let changes = records
            .iter_mut()
            .map(put_row_change)
            .collect::<Result<Vec<_>, Error>>()?;
        self.write(changes)
    }

    /// Delete the rows of every record. Missing rows are not an error.
    pub fn delete<R: Record>(&self, records: &mut [R]) -> Result<(), Error> {
        let changes = records
            .iter_mut()
            .map(delete_row_change)
            .collect::<Result<Vec<_>, Error>>()?;
        self.write(changes)
    }

    fn write(&self, changes: Vec<RowChange>) -> Result<(), Error> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut request = BatchWriteRequest::default();
        for change in changes {
            request.add_row_change(change);
        }
        debug!(rows = request.row_changes.len(), "batch write");
        let response = self.store.batch_write(request)?;
        check_batch_write(&response)
    }
}
