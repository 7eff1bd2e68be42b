//! Core types: naming conventions, rows, table metadata and index schemas.

use serde::{Deserialize, Serialize};

use crate::value::{FieldKind, Value};

/// External column name reserved for the primary key.
pub const PRIMARY_KEY_COLUMN: &str = "_id";

/// Suffix appended to a table name to form its search index name.
pub const INDEX_SUFFIX: &str = "_index";

/// Annotation value that opts a field out of persistence or indexing.
pub const OPT_OUT_TAG: &str = "-";

/// Largest `offset + limit` window the store accepts for offset pagination.
/// Larger result sets must be paged with continuation tokens.
pub const MAX_OFFSET_WINDOW: u32 = 2000;

/// Search index name for a table: `<table>_index`.
pub fn index_name(table: &str) -> String {
    format!("{table}{INDEX_SUFFIX}")
}

/// A named column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: Value,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// External representation of one record: primary-key components plus
/// attribute columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub primary_key: Vec<Column>,
    pub columns: Vec<Column>,
}

impl Row {
    pub fn new(primary_key: Vec<Column>, columns: Vec<Column>) -> Self {
        Self {
            primary_key,
            columns,
        }
    }

    /// The `_id` primary-key value, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.primary_key
            .iter()
            .find(|c| c.name == PRIMARY_KEY_COLUMN)
            .and_then(|c| c.value.as_str())
    }

    /// Look up a column by name, primary-key components included.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.primary_key
            .iter()
            .chain(self.columns.iter())
            .find(|c| c.name == name)
            .map(|c| &c.value)
    }
}

/// The type of a primary-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryKeyType {
    String,
    Integer,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeySchema {
    pub name: String,
    pub key_type: PrimaryKeyType,
}

/// Table definition sent with a create-table call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub table_name: String,
    pub primary_key: Vec<PrimaryKeySchema>,
}

/// Storage options for a new table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    /// Data lifetime in seconds; `-1` keeps rows forever.
    pub time_to_live: i32,
    /// Number of column versions retained.
    pub max_versions: i32,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            time_to_live: -1,
            max_versions: 1,
        }
    }
}

/// Provisioned capacity. Reserved throughput is billed, so tables are
/// created with none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedThroughput {
    pub read_capacity: i32,
    pub write_capacity: i32,
}

/// Field type of a search index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexFieldType {
    Boolean,
    Double,
    Keyword,
    Long,
    Nested,
    Text,
    GeoPoint,
}

impl IndexFieldType {
    /// Resolve an explicit index annotation (`bool`, `float`, `string`, `int`,
    /// `nested`, `text`, `geo`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bool" => Some(IndexFieldType::Boolean),
            "float" => Some(IndexFieldType::Double),
            "string" => Some(IndexFieldType::Keyword),
            "int" => Some(IndexFieldType::Long),
            "nested" => Some(IndexFieldType::Nested),
            "text" => Some(IndexFieldType::Text),
            "geo" => Some(IndexFieldType::GeoPoint),
            _ => None,
        }
    }

    /// Infer an index type from a field's native kind.
    pub fn from_kind(kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::Bool => Some(IndexFieldType::Boolean),
            FieldKind::F64 => Some(IndexFieldType::Double),
            FieldKind::String => Some(IndexFieldType::Keyword),
            FieldKind::I64 => Some(IndexFieldType::Long),
            _ => None,
        }
    }
}

/// One column of a search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub field_name: String,
    pub field_type: IndexFieldType,
    pub index: bool,
    pub enable_sort_and_agg: bool,
    pub store: bool,
}

impl FieldSchema {
    /// An indexed, sortable, stored column. Every column the mapper derives
    /// uses these options.
    pub fn new(field_name: impl Into<String>, field_type: IndexFieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            index: true,
            enable_sort_and_agg: true,
            store: true,
        }
    }
}

/// The set of columns a search index exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub field_schemas: Vec<FieldSchema>,
}

impl IndexSchema {
    pub fn new(field_schemas: Vec<FieldSchema>) -> Self {
        Self { field_schemas }
    }

    /// Structural equality ignoring column order.
    pub fn is_equivalent(&self, other: &IndexSchema) -> bool {
        self.sorted_fields() == other.sorted_fields()
    }

    fn sorted_fields(&self) -> Vec<&FieldSchema> {
        let mut fields: Vec<&FieldSchema> = self.field_schemas.iter().collect();
        fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_name_convention() {
        assert_eq!(index_name("user"), "user_index");
    }

    #[test]
    fn test_row_lookup_covers_primary_key() {
        let row = Row::new(
            vec![Column::new("_id", "u1")],
            vec![Column::new("age", 30_i64)],
        );
        assert_eq!(row.id(), Some("u1"));
        assert_eq!(row.get("_id"), Some(&Value::String("u1".into())));
        assert_eq!(row.get("age"), Some(&Value::Integer(30)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_index_tags() {
        assert_eq!(IndexFieldType::from_tag("geo"), Some(IndexFieldType::GeoPoint));
        assert_eq!(IndexFieldType::from_tag("string"), Some(IndexFieldType::Keyword));
        assert_eq!(IndexFieldType::from_tag("date"), None);
        assert_eq!(IndexFieldType::from_kind(FieldKind::Bytes), None);
        assert_eq!(
            IndexFieldType::from_kind(FieldKind::I64),
            Some(IndexFieldType::Long)
        );
    }

    #[test]
    fn test_schema_equivalence_ignores_order() {
        let a = IndexSchema::new(vec![
            FieldSchema::new("name", IndexFieldType::Keyword),
            FieldSchema::new("age", IndexFieldType::Long),
        ]);
        let b = IndexSchema::new(vec![
            FieldSchema::new("age", IndexFieldType::Long),
            FieldSchema::new("name", IndexFieldType::Keyword),
        ]);
        assert!(a.is_equivalent(&b));

        let c = IndexSchema::new(vec![
            FieldSchema::new("age", IndexFieldType::Long),
            FieldSchema::new("name", IndexFieldType::Text),
        ]);
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_default_table_options() {
        let opts = TableOptions::default();
        assert_eq!(opts.time_to_live, -1);
        assert_eq!(opts.max_versions, 1);
        assert_eq!(ReservedThroughput::default().read_capacity, 0);
    }
}
