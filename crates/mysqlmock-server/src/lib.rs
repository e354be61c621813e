//! MySQL wire-protocol engine for the mysqlmock server.
//!
//! This crate speaks the server side of the MySQL client/server protocol
//! (protocol version 10, text protocol only). It provides:
//!
//! - Packet framing with sequence numbers
//! - Authentication (mysql_native_password, caching_sha2_password fast path)
//! - Command dispatch for COM_QUIT, COM_INIT_DB, COM_QUERY and COM_PING
//! - Built-in answers for the introspection statements drivers send on connect
//! - Text result set encoding, with or without EOF markers
//! - A threaded TCP listener
//!
//! Any SQL the built-ins do not answer goes to a [`mysqlmock_core::Backend`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mysqlmock_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::new().port(3307).password("secret");
//! let server = Server::bind(config, Arc::new(my_backend))?;
//! server.serve()?;
//! ```

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod introspection;
pub mod protocol;
pub mod resultset;
pub mod server;
pub mod session;

pub use auth::AuthPlugin;
pub use config::ServerConfig;
pub use connection::{serve_connection, ConnectionMachine, Step};
pub use server::{Server, ServerHandle, ServerStats};
pub use session::{ConnectionSession, ConnectionState};
