//! Record descriptors: table naming, field-to-column maps, index schema
//! derivation and record validation.
//!
//! Every record type carries a [`RecordDescriptor`] built once and cached for
//! the life of the process. A descriptor lists each field with its external
//! column annotation, its index annotation and its native kind, which is all
//! the mapper needs; no per-call inspection of the record happens.

use std::collections::HashMap;

use crate::error::{Error, MappingError, SchemaError};
use crate::types::{
    FieldSchema, INDEX_SUFFIX, IndexFieldType, IndexSchema, OPT_OUT_TAG, PRIMARY_KEY_COLUMN,
};
use crate::value::{FieldKind, Value};

/// Declaration of one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// The Rust field name.
    pub name: &'static str,
    /// External column annotation. May carry a modifier after a comma
    /// (`"name,omitempty"`); `"-"` opts the field out of persistence.
    pub column: Option<&'static str>,
    /// Index type annotation; `"-"` opts the field out of indexing.
    pub index: Option<&'static str>,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column: None,
            index: None,
            kind,
        }
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn index(mut self, tag: &'static str) -> Self {
        self.index = Some(tag);
        self
    }

    /// The external column name: the annotation's first comma-separated
    /// segment. `None` when unannotated, empty, or opted out.
    pub fn column_name(&self) -> Option<&'static str> {
        let tag = self.column?;
        let name = tag.split(',').next().unwrap_or_default();
        if name.is_empty() || name == OPT_OUT_TAG {
            None
        } else {
            Some(name)
        }
    }

    /// Whether the field is written to and read from rows.
    pub fn is_persisted(&self) -> bool {
        self.column_name().is_some()
    }

    pub fn is_primary_key(&self) -> bool {
        self.column_name() == Some(PRIMARY_KEY_COLUMN)
    }
}

/// Cached description of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    type_name: &'static str,
    fields: Vec<FieldDef>,
}

impl RecordDescriptor {
    pub fn new(type_name: &'static str, fields: Vec<FieldDef>) -> Self {
        Self { type_name, fields }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Table name: the lower-cased type name.
    pub fn table_name(&self) -> String {
        self.type_name.to_lowercase()
    }

    /// Search index name: `<table>_index`.
    pub fn index_name(&self) -> String {
        format!("{}{INDEX_SUFFIX}", self.table_name())
    }

    /// The field mapped to the `_id` column.
    pub fn primary_key_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_primary_key())
    }

    /// Build the bidirectional field/column map over persisted fields.
    pub fn field_map(&self) -> Result<FieldMap, MappingError> {
        let mut map = FieldMap::default();
        for field in &self.fields {
            let Some(column) = field.column_name() else {
                continue;
            };
            if let Some(first) = map.to_field.get(column) {
                return Err(MappingError::DuplicateColumn {
                    column: column.to_string(),
                    first: first.to_string(),
                    second: field.name.to_string(),
                });
            }
            map.to_column.insert(field.name, column);
            map.to_field.insert(column, field.name);
        }
        Ok(map)
    }

    /// Derive the target search index schema, in field declaration order.
    ///
    /// The primary key, unmapped fields and fields annotated `index "-"` are
    /// not indexed. An explicit index annotation wins over the inferred type.
    pub fn index_schema(&self) -> Result<IndexSchema, SchemaError> {
        let mut schemas = Vec::new();
        for field in &self.fields {
            let Some(column) = field.column_name() else {
                continue;
            };
            if column == PRIMARY_KEY_COLUMN {
                continue;
            }

            let field_type = match field.index.filter(|tag| !tag.is_empty()) {
                Some(OPT_OUT_TAG) => continue,
                Some(tag) => {
                    IndexFieldType::from_tag(tag).ok_or_else(|| SchemaError::UnknownIndexTag {
                        field: field.name.to_string(),
                        tag: tag.to_string(),
                    })?
                }
                None => IndexFieldType::from_kind(field.kind).ok_or_else(|| {
                    SchemaError::UnindexableKind {
                        field: field.name.to_string(),
                        kind: field.kind,
                    }
                })?,
            };
            schemas.push(FieldSchema::new(column, field_type));
        }
        Ok(IndexSchema::new(schemas))
    }

    /// Check that the record can be stored: every persisted field has one of
    /// the five column kinds, columns are unique, and exactly one field maps
    /// to `_id`.
    pub fn validate(&self) -> Result<(), Error> {
        for field in self.fields.iter().filter(|f| f.is_persisted()) {
            if !field.kind.is_persistable() {
                return Err(SchemaError::UnsupportedFieldType {
                    field: field.name.to_string(),
                    kind: field.kind,
                }
                .into());
            }
        }

        if self.fields.iter().filter(|f| f.is_primary_key()).count() != 1 {
            return Err(SchemaError::PrimaryKeyMissing.into());
        }
        self.field_map()?;
        Ok(())
    }
}

/// Bidirectional mapping between field names and column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    to_column: HashMap<&'static str, &'static str>,
    to_field: HashMap<&'static str, &'static str>,
}

impl FieldMap {
    pub fn column_for(&self, field: &str) -> Option<&'static str> {
        self.to_column.get(field).copied()
    }

    pub fn field_for(&self, column: &str) -> Option<&'static str> {
        self.to_field.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.to_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_column.is_empty()
    }
}

/// A type that maps to rows of a table.
///
/// Implement it with [`impl_record!`](crate::impl_record) rather than by hand.
pub trait Record: Default {
    fn descriptor() -> &'static RecordDescriptor;

    /// Current column value of a field. `Ok(None)` when the field's kind has
    /// no column representation.
    fn field_value(&self, field: &str) -> Result<Option<Value>, MappingError>;

    /// Assign a column value to a field, coercing where the field type allows.
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), MappingError>;
}

/// Table name of a record type.
pub fn table_name<R: Record>() -> String {
    R::descriptor().table_name()
}

/// Validate a record type's declaration.
pub fn validate<R: Record>() -> Result<(), Error> {
    R::descriptor().validate()
}

#[doc(hidden)]
#[macro_export]
macro_rules! __optional {
    () => {
        ::std::option::Option::None
    };
    ($value:expr) => {
        ::std::option::Option::Some($value)
    };
}

/// Implement [`Record`] for an existing struct.
///
/// Each entry names a field and its type, optionally followed by
/// `=> "column"` and `index "tag"`. Fields without a column are not
/// persisted.
///
/// ```
/// use tablemap_core::impl_record;
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: String,
///     name: String,
///     bio: String,
///     age: i64,
///     scratch: Vec<String>,
/// }
///
/// impl_record! {
///     User {
///         id: String => "_id",
///         name: String => "name",
///         bio: String => "bio,omitempty" index "text",
///         age: i64 => "age",
///         scratch: Vec<String>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_record {
    (
        $record:ident {
            $( $field:ident : $ty:ty $( => $column:literal $( index $index:literal )? )? ),* $(,)?
        }
    ) => {
        impl $crate::model::Record for $record {
            fn descriptor() -> &'static $crate::model::RecordDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::model::RecordDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::model::RecordDescriptor::new(
                        stringify!($record),
                        vec![
                            $(
                                $crate::model::FieldDef {
                                    name: stringify!($field),
                                    column: $crate::__optional!($($column)?),
                                    index: $crate::__optional!($($($index)?)?),
                                    kind: <$ty as $crate::value::FieldType>::KIND,
                                },
                            )*
                        ],
                    )
                })
            }

            #[allow(unused_variables)]
            fn field_value(
                &self,
                field: &str,
            ) -> ::std::result::Result<
                ::std::option::Option<$crate::value::Value>,
                $crate::error::MappingError,
            > {
                match field {
                    $(
                        stringify!($field) => ::std::result::Result::Ok(
                            <$ty as $crate::value::FieldType>::to_value(&self.$field),
                        ),
                    )*
                    _ => ::std::result::Result::Err($crate::error::MappingError::UnknownField {
                        record: stringify!($record).to_string(),
                        field: field.to_string(),
                    }),
                }
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                field: &str,
                value: $crate::value::Value,
            ) -> ::std::result::Result<(), $crate::error::MappingError> {
                match field {
                    $(
                        stringify!($field) => {
                            let actual = value.type_name();
                            self.$field = <$ty as $crate::value::FieldType>::from_value(value)
                                .ok_or_else(|| $crate::error::MappingError::TypeMismatch {
                                    field: stringify!($field).to_string(),
                                    expected: <$ty as $crate::value::FieldType>::KIND,
                                    actual,
                                })?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => ::std::result::Result::Err($crate::error::MappingError::UnknownField {
                        record: stringify!($record).to_string(),
                        field: field.to_string(),
                    }),
                }
            }
        }
    };
}
