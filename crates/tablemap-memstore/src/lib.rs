//! # tablemap-memstore
//!
//! An in-process table store for tests and local development.
//!
//! [`MemStore`] implements [`TableStore`](tablemap_core::TableStore) entirely
//! in memory: tables keyed by `_id`, search indexes, predicate evaluation for
//! every query kind, sorting, offset and token paging, and per-row batch
//! write results. It also records every call it receives and can fail calls
//! on demand, which makes it a convenient double for exercising code built on
//! `tablemap-core`.
//!
//! Nothing is persisted and there is no relevance scoring.
//!
//! ## Quick Start
//!
//! ```
//! use tablemap_core::query::{Query, RangeOp};
//! use tablemap_core::{TableDB, impl_record};
//! use tablemap_memstore::MemStore;
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
//! let db = TableDB::new(MemStore::new());
//! db.sync::<User>().unwrap();
//!
//! db.save(&mut [
//!     User { name: "alice".into(), age: 30, ..Default::default() },
//!     User { name: "bob".into(), age: 12, ..Default::default() },
//! ])
//! .unwrap();
//!
//! let adults: Vec<User> = db
//!     .session()
//!     .query(vec![Query::range("age", RangeOp::Ge, 18)])
//!     .find_all()
//!     .unwrap();
//! assert_eq!(adults.len(), 1);
//! assert_eq!(adults[0].name, "alice");
//! ```

mod eval;
mod geo;
mod store;

pub use store::{DEFAULT_SEARCH_LIMIT, MemStore};
