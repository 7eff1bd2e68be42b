//! # tablemap
//!
//! Typed records over a wide-column store with search indexes.
//!
//! tablemap maps plain Rust structs to rows of a table, keeps each table's
//! search index in step with the struct declaration, and builds and runs
//! searches whose hits decode straight back into structs. The store itself is
//! reached only through the [`store::TableStore`] trait.
//!
//! ## Quick Start
//!
//! ```
//! use tablemap_core::impl_record;
//! use tablemap_core::model::{Record, table_name};
//! use tablemap_core::query::{Query, RangeOp};
//! use tablemap_core::types::IndexFieldType;
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: String,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl_record! {
//!     User {
//!         id: String => "_id",
//!         name: String => "name",
//!         age: i64 => "age",
//!     }
//! }
//!
//! // Table and index names follow the type name.
//! assert_eq!(table_name::<User>(), "user");
//! assert_eq!(User::descriptor().index_name(), "user_index");
//!
//! // Every mapped column except the key is indexed.
//! let schema = User::descriptor().index_schema().unwrap();
//! assert_eq!(schema.field_schemas[1].field_type, IndexFieldType::Long);
//!
//! // Adults named alice.
//! let query = Query::and(vec![
//!     Query::term("name", "alice"),
//!     Query::range("age", RangeOp::Ge, 18),
//! ]);
//! # let _ = query;
//! ```
//!
//! With a store at hand, [`db::TableDB`] ties it together:
//!
//! ```ignore
//! let db = TableDB::new(store);
//! db.sync::<User>()?;
//! db.save(&mut [User { name: "alice".into(), age: 30, ..Default::default() }])?;
//! let adults: Vec<User> = db
//!     .session()
//!     .query(vec![Query::range("age", RangeOp::Ge, 18)])
//!     .sort_by_field("age", true)
//!     .limit(20)
//!     .find_all()?;
//! ```

pub mod codec;
pub mod db;
pub mod error;
pub mod model;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
pub mod value;

pub use db::TableDB;
pub use error::{Error, Result};
pub use model::Record;
pub use session::{Page, QuerySession};
pub use store::TableStore;
