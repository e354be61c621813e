//! Per-connection session state.
//!
//! A `ConnectionSession` is owned by exactly one connection worker and is
//! threaded by `&mut` through handshake, dispatch and encoding. Nothing in
//! it is shared across connections.

use crate::auth::CHALLENGE_LEN;
use crate::protocol::capabilities::CLIENT_DEPRECATE_EOF;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Greeting sent, waiting for a valid HandshakeResponse
    AwaitingAuth,
    /// Commands are accepted
    Authenticated,
    /// COM_QUIT seen or a fatal error occurred
    Closed,
}

/// Mutable state of one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    /// Server-assigned id, also announced in the greeting
    pub connection_id: u32,
    /// Sequence id of the last frame received or sent
    pub sequence_id: u8,
    /// Challenge sent in the greeting
    pub auth_challenge: [u8; CHALLENGE_LEN],
    /// Negotiated capabilities (client request masked by server offer)
    pub capability_flags: u32,
    pub authenticated: bool,
    pub username: Option<String>,
    /// Current schema
    pub database: Option<String>,
    pub state: ConnectionState,
}

impl ConnectionSession {
    /// Fresh session waiting for authentication.
    pub fn new(connection_id: u32, auth_challenge: [u8; CHALLENGE_LEN]) -> Self {
        Self {
            connection_id,
            sequence_id: 0,
            auth_challenge,
            capability_flags: 0,
            authenticated: false,
            username: None,
            database: None,
            state: ConnectionState::AwaitingAuth,
        }
    }

    /// Sequence id the next reply frame must carry.
    pub fn next_sequence_id(&self) -> u8 {
        self.sequence_id.wrapping_add(1)
    }

    /// Does the client accept an OK-shaped result terminator?
    pub fn deprecate_eof(&self) -> bool {
        self.capability_flags & CLIENT_DEPRECATE_EOF != 0
    }

    /// Record a successful login.
    pub fn mark_authenticated(
        &mut self,
        capability_flags: u32,
        username: Option<String>,
        database: Option<String>,
    ) {
        self.capability_flags = capability_flags;
        self.username = username;
        self.database = database;
        self.authenticated = true;
        self.state = ConnectionState::Authenticated;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_awaits_auth() {
        let session = ConnectionSession::new(7, [b'a'; CHALLENGE_LEN]);
        assert_eq!(session.state, ConnectionState::AwaitingAuth);
        assert!(!session.authenticated);
        assert_eq!(session.connection_id, 7);
        assert!(!session.deprecate_eof());
    }

    #[test]
    fn test_sequence_wraps() {
        let mut session = ConnectionSession::new(1, [b'a'; CHALLENGE_LEN]);
        session.sequence_id = 255;
        assert_eq!(session.next_sequence_id(), 0);
    }

    #[test]
    fn test_mark_authenticated() {
        let mut session = ConnectionSession::new(1, [b'a'; CHALLENGE_LEN]);
        session.mark_authenticated(
            CLIENT_DEPRECATE_EOF,
            Some("root".to_string()),
            Some("shop".to_string()),
        );
        assert!(session.authenticated);
        assert_eq!(session.state, ConnectionState::Authenticated);
        assert_eq!(session.username.as_deref(), Some("root"));
        assert_eq!(session.database.as_deref(), Some("shop"));
        assert!(session.deprecate_eof());

        session.close();
        assert!(session.is_closed());
    }
}
