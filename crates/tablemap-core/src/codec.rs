//! Row codec: records to rows for writes, rows back to records for reads.

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, MappingError, SchemaError, WriteError};
use crate::model::Record;
use crate::store::{BatchWriteResponse, RowChange, RowExistence};
use crate::types::{Column, PRIMARY_KEY_COLUMN, Row};
use crate::value::{FieldKind, Value};

/// Make sure the record has a primary key, generating a random UUID when the
/// `_id` field is empty. Returns the id.
pub fn ensure_id<R: Record>(record: &mut R) -> Result<String, Error> {
    let descriptor = R::descriptor();
    let field = descriptor
        .primary_key_field()
        .ok_or(SchemaError::PrimaryKeyMissing)?;
    if field.kind != FieldKind::String {
        return Err(SchemaError::PrimaryKeyNotString {
            field: field.name.to_string(),
            kind: field.kind,
        }
        .into());
    }

    let id = match record.field_value(field.name)? {
        Some(Value::String(id)) => id,
        _ => {
            return Err(SchemaError::PrimaryKeyNotString {
                field: field.name.to_string(),
                kind: field.kind,
            }
            .into());
        }
    };
    if !id.is_empty() {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    record.set_field(field.name, Value::String(id.clone()))?;
    debug!(record = descriptor.type_name(), id = %id, "generated primary key");
    Ok(id)
}

/// Encode a record as a row: the `_id` primary key plus one attribute column
/// per persisted field. Fields without a column are skipped.
pub fn encode<R: Record>(record: &mut R) -> Result<Row, Error> {
    let id = ensure_id(record)?;
    let descriptor = R::descriptor();

    let mut primary_key = Vec::with_capacity(1);
    let mut columns = Vec::new();
    for field in descriptor.fields() {
        let Some(column) = field.column_name() else {
            continue;
        };
        if column == PRIMARY_KEY_COLUMN {
            primary_key.push(Column::new(PRIMARY_KEY_COLUMN, id.clone()));
            continue;
        }
        let value =
            record
                .field_value(field.name)?
                .ok_or_else(|| SchemaError::UnsupportedFieldType {
                    field: field.name.to_string(),
                    kind: field.kind,
                })?;
        columns.push(Column {
            name: column.to_string(),
            value,
        });
    }
    Ok(Row::new(primary_key, columns))
}

/// Assign every primary-key and attribute column of `row` to the matching
/// field of `record`.
pub fn decode<R: Record>(row: &Row, record: &mut R) -> Result<(), Error> {
    let descriptor = R::descriptor();
    let map = descriptor.field_map()?;
    for column in row.primary_key.iter().chain(row.columns.iter()) {
        let field = map
            .field_for(&column.name)
            .ok_or_else(|| MappingError::UnknownColumn {
                record: descriptor.type_name().to_string(),
                column: column.name.clone(),
            })?;
        record.set_field(field, column.value.clone())?;
    }
    Ok(())
}

/// Decode a row into a freshly defaulted record.
pub fn from_row<R: Record>(row: &Row) -> Result<R, Error> {
    let mut record = R::default();
    decode(row, &mut record)?;
    Ok(record)
}

/// Put change for a record, writing regardless of whether the row exists.
pub fn put_row_change<R: Record>(record: &mut R) -> Result<RowChange, Error> {
    let row = encode(record)?;
    Ok(RowChange::Put {
        table_name: R::descriptor().table_name(),
        row,
        condition: RowExistence::Ignore,
    })
}

/// Delete change for a record's primary key.
///
/// A record without an id is given one first, so deleting an unsaved record
/// targets a row that does not exist and succeeds as a no-op.
pub fn delete_row_change<R: Record>(record: &mut R) -> Result<RowChange, Error> {
    let id = ensure_id(record)?;
    Ok(RowChange::Delete {
        table_name: R::descriptor().table_name(),
        primary_key: vec![Column::new(PRIMARY_KEY_COLUMN, id)],
        condition: RowExistence::Ignore,
    })
}

/// Fail on the first row of a batch write that did not succeed.
///
/// Every row is written with the same `Ignore` condition, so failures are
/// rare; when one happens the store may not report which row it was.
pub fn check_batch_write(response: &BatchWriteResponse) -> Result<(), Error> {
    match response.row_results.iter().find(|r| !r.is_succeed) {
        Some(failed) => Err(WriteError::PartialFailure {
            table: failed.table_name.clone(),
            primary_key: failed.primary_key.clone(),
            message: failed
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
        .into()),
        None => Ok(()),
    }
}
