//! Core types and traits for the mysqlmock server.
//!
//! This crate provides the vocabulary shared by the protocol engine and the
//! SQL backends behind it:
//!
//! - `Error` and its per-kind structs, each knowing its MySQL error code
//! - `Value` for typed cells held by backends
//! - `ResultSet` for text rows handed to the wire encoder
//! - `Backend` trait for the SQL execution collaborator

pub mod backend;
pub mod error;
pub mod result_set;
pub mod value;

pub use backend::Backend;
pub use error::{
    AuthError, AuthErrorKind, CommandError, ConfigError, Error, FramingError, NotFoundError,
    ProtocolError, QueryError, QueryErrorKind, Result,
};
pub use result_set::ResultSet;
pub use value::Value;
