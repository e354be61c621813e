//! In-memory SQL backend for the mysqlmock server.
//!
//! Enough SQL to make a mock server useful end to end: databases, tables
//! with an optional primary key, and single-table INSERT / SELECT / UPDATE /
//! DELETE with equality filters. The whole catalog can be saved to and
//! restored from a JSON snapshot.
//!
//! # Example
//!
//! ```rust
//! use mysqlmock_core::Backend;
//! use mysqlmock_memory::MemoryBackend;
//!
//! let backend = MemoryBackend::new();
//! backend.execute("CREATE DATABASE shop", 0, None).unwrap();
//! backend.execute("CREATE TABLE t (id INT PRIMARY KEY)", 0, Some("shop")).unwrap();
//! backend.execute("INSERT INTO t VALUES (1), (2)", 0, Some("shop")).unwrap();
//!
//! let rows = backend.execute("SELECT id FROM t WHERE id = 2", 0, Some("shop")).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod backend;
pub mod catalog;
pub mod parser;

pub use backend::MemoryBackend;
pub use catalog::{Catalog, ColumnDef, ColumnType, Table};
pub use parser::{Statement, TableRef};
