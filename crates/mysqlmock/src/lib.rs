//! mysqlmock - a MySQL wire-protocol mock server.
//!
//! Point any MySQL driver or tool at it: the server completes the
//! handshake, authenticates against one configured password, answers the
//! introspection queries clients send on connect, and hands the rest of the
//! SQL to a pluggable [`Backend`]. [`MemoryBackend`] is the bundled backend.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mysqlmock::prelude::*;
//!
//! let backend = MemoryBackend::new();
//! let config = ServerConfig::new().bind_address("127.0.0.1").port(0);
//! let handle = Server::bind(config, Arc::new(backend))?.spawn()?;
//! println!("listening on {}", handle.local_addr());
//! ```
//!
//! # Crates
//!
//! - `mysqlmock-core`: errors, values, result sets and the [`Backend`] trait
//! - `mysqlmock-server`: the protocol engine and TCP listener
//! - `mysqlmock-memory`: the in-memory SQL backend

pub use mysqlmock_core::{
    AuthError, AuthErrorKind, Backend, CommandError, ConfigError, Error, NotFoundError,
    ProtocolError, QueryError, QueryErrorKind, Result, ResultSet, Value,
};
pub use mysqlmock_memory::{Catalog, MemoryBackend};
pub use mysqlmock_server::{
    AuthPlugin, ConnectionMachine, ConnectionSession, ConnectionState, Server, ServerConfig,
    ServerHandle, ServerStats,
};

/// Protocol internals: packets, codec, handshake and auth helpers.
pub use mysqlmock_server::{auth, handshake, protocol};

/// The types most programs need.
pub mod prelude {
    pub use crate::{
        AuthPlugin, Backend, Error, MemoryBackend, QueryError, QueryErrorKind, Result, ResultSet,
        Server, ServerConfig, ServerHandle, Value,
    };
}
