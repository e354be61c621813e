//! Command-phase dispatch.
//!
//! Takes one command payload from an authenticated client and produces the
//! reply frames. Errors are returned, not rendered; the connection turns
//! them into an ERR packet unless they are fatal.

use mysqlmock_core::error::{CommandError, ProtocolError};
use mysqlmock_core::{Backend, Error};
use tracing::{debug, trace, warn};

use crate::introspection::{self, SessionView};
use crate::protocol::codec::Frame;
use crate::protocol::{Command, CommandPacket, Expected, OkPacket, Packet};
use crate::resultset::encode_result_set;
use crate::session::ConnectionSession;

/// What the connection should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write these frames and keep reading
    Frames(Vec<Frame>),
    /// Close without replying (COM_QUIT)
    Close,
}

/// Dispatch one command payload.
///
/// `session.sequence_id` must hold the request's sequence id; replies start
/// one past it.
pub fn dispatch(
    session: &mut ConnectionSession,
    backend: &dyn Backend,
    payload: &[u8],
) -> Result<Reply, Error> {
    let Packet::Command(packet) = Packet::parse(payload, Expected::Command)? else {
        return Err(protocol_error("Expected a command packet"));
    };

    let seq = session.next_sequence_id();
    match Command::from_u8(packet.code) {
        Some(Command::Quit) => {
            debug!(connection_id = session.connection_id, "COM_QUIT");
            Ok(Reply::Close)
        }
        Some(Command::Ping) => {
            debug!(connection_id = session.connection_id, "COM_PING");
            Ok(Reply::Frames(vec![OkPacket::with_info("PONG").to_frame(seq)]))
        }
        Some(Command::InitDb) => {
            let name = packet.text();
            debug!(connection_id = session.connection_id, database = %name, "COM_INIT_DB");
            use_database(session, backend, &name)?;
            Ok(Reply::Frames(vec![
                OkPacket::with_info("Database changed").to_frame(seq),
            ]))
        }
        Some(Command::Query) => query(session, backend, &packet, seq),
        None => {
            warn!(
                connection_id = session.connection_id,
                command = packet.code,
                "unsupported command"
            );
            Err(Error::Command(CommandError {
                code: packet.code,
                message: format!("Unsupported command: {}", packet.code),
            }))
        }
    }
}

fn query(
    session: &mut ConnectionSession,
    backend: &dyn Backend,
    packet: &CommandPacket,
    seq: u8,
) -> Result<Reply, Error> {
    let sql = introspection::clean_sql(&packet.text());
    if sql.is_empty() {
        return Err(protocol_error("Query was empty"));
    }
    debug!(connection_id = session.connection_id, "COM_QUERY");
    trace!(connection_id = session.connection_id, sql = %sql, "query text");

    if let Some(name) = use_statement(&sql) {
        use_database(session, backend, name)?;
        return Ok(Reply::Frames(vec![OkPacket::default().to_frame(seq)]));
    }

    let view = SessionView {
        database: session.database.as_deref(),
    };
    let result = match introspection::answer(&sql, view, backend) {
        Some(result) => result,
        None => {
            let result = backend
                .execute(&sql, session.capability_flags, session.database.as_deref())
                .map_err(|e| Error::Query(e.with_sql(sql.clone())))?;
            if result.is_command_result() {
                forget_dropped_database(session, backend);
            }
            result
        }
    };

    Ok(Reply::Frames(encode_result_set(
        &result,
        session.capability_flags,
        seq,
    )))
}

/// `USE name` with optional backticks; `None` for anything else.
fn use_statement(sql: &str) -> Option<&str> {
    let head = sql.get(..4)?;
    if !head.eq_ignore_ascii_case("USE ") {
        return None;
    }
    Some(sql[4..].trim().trim_matches('`'))
}

fn use_database(
    session: &mut ConnectionSession,
    backend: &dyn Backend,
    name: &str,
) -> Result<(), Error> {
    let name = name.trim().trim_matches('`');
    backend.select_database(name)?;
    session.database = Some(name.to_string());
    Ok(())
}

/// Clear the session database if the statement just dropped it.
fn forget_dropped_database(session: &mut ConnectionSession, backend: &dyn Backend) {
    let Some(name) = session.database.as_deref() else {
        return;
    };
    if backend.select_database(name).is_err() {
        debug!(
            connection_id = session.connection_id,
            database = %name,
            "session database dropped"
        );
        session.database = None;
    }
}

fn protocol_error(msg: &str) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.to_string(),
        raw_data: None,
        source: None,
    })
}
