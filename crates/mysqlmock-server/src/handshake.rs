//! Connection-phase packets and the login decision.
//!
//! The server opens with a protocol-10 [`Greeting`]; the client answers with
//! a HandshakeResponse41 ([`ClientHandshake`]). Both directions are encoded
//! and parsed here so the integration tests can speak the protocol with the
//! same code the server uses.

use mysqlmock_core::error::{AuthError, AuthErrorKind, ProtocolError};
use mysqlmock_core::Error;
use tracing::{info, warn};

use crate::auth::{AuthPlugin, CHALLENGE_LEN};
use crate::config::ServerConfig;
use crate::protocol::capabilities::{
    CLIENT_CONNECT_WITH_DB, CLIENT_PLUGIN_AUTH, CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA,
    CLIENT_SECURE_CONNECTION,
};
use crate::protocol::codec::Frame;
use crate::protocol::server_status::SERVER_STATUS_AUTOCOMMIT;
use crate::protocol::{PacketReader, PacketWriter, PROTOCOL_VERSION};
use crate::session::ConnectionSession;

/// Shortest HandshakeResponse41 that carries the fixed header.
pub const MIN_HANDSHAKE_RESPONSE_LEN: usize = 32;

/// `auth_plugin_data_len` announced in the greeting: 20 challenge bytes + NUL.
const AUTH_PLUGIN_DATA_LEN: u8 = 21;

/// Initial handshake packet (protocol version 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub server_version: String,
    pub connection_id: u32,
    pub challenge: [u8; CHALLENGE_LEN],
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: String,
}

impl Greeting {
    /// Greeting for a new session under `config`.
    pub fn for_session(config: &ServerConfig, session: &ConnectionSession) -> Self {
        Self {
            server_version: config.server_version.clone(),
            connection_id: session.connection_id,
            challenge: session.auth_challenge,
            capabilities: config.capabilities,
            charset: config.charset,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            auth_plugin: config.auth_plugin.name().to_string(),
        }
    }

    /// Encode at sequence id 0.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_frame(&self) -> Frame {
        let mut writer = PacketWriter::with_capacity(96);
        writer.write_u8(PROTOCOL_VERSION);
        writer.write_null_string(&self.server_version);
        writer.write_u32_le(self.connection_id);
        writer.write_bytes(&self.challenge[..8]);
        writer.write_u8(0);
        writer.write_u16_le((self.capabilities & 0xFFFF) as u16);
        writer.write_u8(self.charset);
        writer.write_u16_le(self.status_flags);
        writer.write_u16_le((self.capabilities >> 16) as u16);
        writer.write_u8(AUTH_PLUGIN_DATA_LEN);
        writer.write_zeros(10);
        writer.write_bytes(&self.challenge[8..]);
        writer.write_u8(0);
        writer.write_null_string(&self.auth_plugin);
        writer.into_frame(0)
    }

    /// Parse a greeting payload (client side).
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);

        let protocol_version = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing protocol version", payload))?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(protocol_error(
                &format!("Unsupported protocol version: {protocol_version}"),
                payload,
            ));
        }

        let server_version = reader
            .read_null_string()
            .ok_or_else(|| protocol_error("Missing server version", payload))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing connection ID", payload))?;
        let part1 = reader
            .read_bytes(8)
            .ok_or_else(|| protocol_error("Missing auth data", payload))?;
        reader.skip(1);
        let caps_lower = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing capability flags", payload))?;
        let charset = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing character set", payload))?;
        let status_flags = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing status flags", payload))?;
        let caps_upper = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing capability flags", payload))?;
        reader.skip(1 + 10);
        let part2 = reader
            .read_bytes(CHALLENGE_LEN - 8)
            .ok_or_else(|| protocol_error("Missing auth data", payload))?;
        reader.skip(1);
        let auth_plugin = reader.read_null_string().unwrap_or_default();

        let mut challenge = [0u8; CHALLENGE_LEN];
        challenge[..8].copy_from_slice(part1);
        challenge[8..].copy_from_slice(part2);

        Ok(Self {
            server_version,
            connection_id,
            challenge,
            capabilities: u32::from(caps_lower) | (u32::from(caps_upper) << 16),
            charset,
            status_flags,
            auth_plugin,
        })
    }
}

/// HandshakeResponse41 fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Capabilities the client asked for
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    /// Plugin the client computed `auth_response` with
    pub auth_plugin: Option<String>,
}

impl HandshakeResponse {
    /// Encode the response the way a client would (used by tests).
    ///
    /// The auth response layout follows the same flag priority the parser
    /// uses.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_frame(&self, sequence_id: u8) -> Frame {
        let flags = self.capability_flags;
        let mut writer = PacketWriter::with_capacity(128);
        writer.write_u32_le(flags);
        writer.write_u32_le(self.max_packet_size);
        writer.write_u8(self.charset);
        writer.write_zeros(23);
        writer.write_null_string(&self.username);

        if flags & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            writer.write_lenenc_bytes(&self.auth_response);
        } else if flags & CLIENT_SECURE_CONNECTION != 0 {
            writer.write_u8(self.auth_response.len() as u8);
            writer.write_bytes(&self.auth_response);
        } else {
            writer.write_bytes(&self.auth_response);
            writer.write_u8(0);
        }

        if flags & CLIENT_CONNECT_WITH_DB != 0 {
            writer.write_null_string(self.database.as_deref().unwrap_or(""));
        }
        if flags & CLIENT_PLUGIN_AUTH != 0 {
            if let Some(plugin) = &self.auth_plugin {
                writer.write_null_string(plugin);
            }
        }
        writer.into_frame(sequence_id)
    }
}

/// What the client sent after the greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientHandshake {
    /// Payload too short for HandshakeResponse41; accepted without identity
    Short,
    Full(HandshakeResponse),
}

impl ClientHandshake {
    /// Parse the first client payload.
    ///
    /// Anything shorter than [`MIN_HANDSHAKE_RESPONSE_LEN`] is a legacy or
    /// non-conformant client and yields [`ClientHandshake::Short`].
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < MIN_HANDSHAKE_RESPONSE_LEN {
            return Ok(ClientHandshake::Short);
        }

        let mut reader = PacketReader::new(payload);
        let capability_flags = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing capability flags", payload))?;
        let max_packet_size = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing max packet size", payload))?;
        let charset = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing character set", payload))?;
        if !reader.skip(23) {
            return Err(protocol_error("Truncated handshake response", payload));
        }

        let username = reader.read_null_string().unwrap_or_default();

        let auth_response = if capability_flags & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            reader
                .read_lenenc_bytes()
                .ok_or_else(|| protocol_error("Truncated auth response", payload))?
                .to_vec()
        } else if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            let len = reader
                .read_u8()
                .map(usize::from)
                .ok_or_else(|| protocol_error("Missing auth response length", payload))?;
            reader
                .read_bytes(len)
                .ok_or_else(|| protocol_error("Truncated auth response", payload))?
                .to_vec()
        } else {
            reader.read_null_bytes().unwrap_or_default().to_vec()
        };

        let database = if capability_flags & CLIENT_CONNECT_WITH_DB != 0 && !reader.is_empty() {
            reader.read_null_string().filter(|db| !db.is_empty())
        } else {
            None
        };

        let auth_plugin = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && !reader.is_empty() {
            reader.read_null_string().filter(|name| !name.is_empty())
        } else {
            None
        };

        Ok(ClientHandshake::Full(HandshakeResponse {
            capability_flags,
            max_packet_size,
            charset,
            username,
            auth_response,
            database,
            auth_plugin,
        }))
    }
}

/// Decide the login and update `session` on success.
///
/// The negotiated capability set is what the client asked for masked by
/// what the server offered. On failure the session is left untouched so the
/// client may retry.
pub fn authenticate(
    session: &mut ConnectionSession,
    config: &ServerConfig,
    handshake: ClientHandshake,
) -> Result<(), Error> {
    let response = match handshake {
        ClientHandshake::Short => {
            info!(
                connection_id = session.connection_id,
                "short handshake response, accepting in simple mode"
            );
            session.mark_authenticated(0, None, None);
            return Ok(());
        }
        ClientHandshake::Full(response) => response,
    };

    let plugin_name = response
        .auth_plugin
        .as_deref()
        .unwrap_or(AuthPlugin::NativePassword.name());
    let Some(plugin) = AuthPlugin::from_name(plugin_name) else {
        warn!(
            connection_id = session.connection_id,
            user = %response.username,
            plugin = %plugin_name,
            "unsupported auth plugin"
        );
        return Err(Error::Auth(AuthError {
            kind: AuthErrorKind::UnsupportedPlugin,
            user: response.username.clone(),
            message: format!(
                "Authentication plugin '{}' reported error: unsupported plugin",
                plugin_name
            ),
        }));
    };

    if !plugin.verify(
        &config.password,
        &session.auth_challenge,
        &response.auth_response,
    ) {
        warn!(
            connection_id = session.connection_id,
            user = %response.username,
            plugin = plugin.name(),
            "authentication failed"
        );
        return Err(Error::Auth(AuthError {
            kind: AuthErrorKind::Failed,
            user: response.username.clone(),
            message: format!(
                "Access denied for user '{}' (using password: {})",
                response.username,
                if response.auth_response.is_empty() { "NO" } else { "YES" }
            ),
        }));
    }

    info!(
        connection_id = session.connection_id,
        user = %response.username,
        database = response.database.as_deref().unwrap_or(""),
        plugin = plugin.name(),
        "authenticated"
    );
    session.mark_authenticated(
        response.capability_flags & config.capabilities,
        Some(response.username),
        response.database,
    );
    Ok(())
}

fn protocol_error(msg: &str, raw: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.to_string(),
        raw_data: Some(raw.to_vec()),
        source: None,
    })
}
