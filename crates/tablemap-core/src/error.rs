//! Error types for all tablemap operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::FieldKind;

/// Top-level error type for tablemap operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures translating between record fields and external columns.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("record '{record}' has no field named '{field}'")]
    UnknownField { record: String, field: String },

    #[error("column '{column}' does not map to any field of record '{record}'")]
    UnknownColumn { record: String, column: String },

    #[error("cannot assign {actual} value to field '{field}' of kind {expected}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        actual: &'static str,
    },

    #[error("column '{column}' is claimed by both '{first}' and '{second}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },
}

/// Record definitions that cannot be persisted or indexed.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("exactly one field must map to primary key \"_id\"")]
    PrimaryKeyMissing,

    #[error("primary key field '{field}' must be a String, it is {kind}")]
    PrimaryKeyNotString { field: String, kind: FieldKind },

    #[error("field '{field}' must be one of (i64, f64, String, Vec<u8>, bool), it is {kind}")]
    UnsupportedFieldType { field: String, kind: FieldKind },

    #[error("unexpected index tag '{tag}' on field '{field}'")]
    UnknownIndexTag { field: String, tag: String },

    #[error("cannot infer an index type for field '{field}' of kind {kind}")]
    UnindexableKind { field: String, kind: FieldKind },
}

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("no result found")]
    NoResult,

    #[error("not all search shards succeeded")]
    NotAllSucceeded,

    #[error("invalid range operator '{0}', expected one of >, <, >=, <=")]
    InvalidRangeOperator(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum WriteError {
    /// At least one row of a batch write was rejected. Other rows of the same
    /// batch may have been written.
    #[error("write row error on table '{table}' (primary key {primary_key:?}): {message}")]
    PartialFailure {
        table: String,
        primary_key: Option<String>,
        message: String,
    },
}

/// An error reported by the remote table store, passed through unchanged.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("store error: {code}: {message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
