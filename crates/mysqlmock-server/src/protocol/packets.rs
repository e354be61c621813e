//! Typed packets.
//!
//! Inbound payloads are parsed into [`Packet`] according to what the
//! connection state machine expects next ([`Expected`]), never by sniffing
//! the first byte alone: `0xFE` is an EOF packet in one state and an OK
//! terminator in another.

use mysqlmock_core::Error;
use mysqlmock_core::error::ProtocolError;

use crate::handshake::ClientHandshake;
use crate::protocol::codec::Frame;
use crate::protocol::server_status::SERVER_STATUS_AUTOCOMMIT;
use crate::protocol::{PacketReader, PacketWriter};

const OK_HEADER: u8 = 0x00;
const EOF_HEADER: u8 = 0xFE;
const ERR_HEADER: u8 = 0xFF;

/// OK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkPacket {
    /// Number of affected rows
    pub affected_rows: u64,
    /// Last insert ID
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Number of warnings
    pub warnings: u16,
    /// Info string (if any)
    pub info: String,
}

impl Default for OkPacket {
    fn default() -> Self {
        Self {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
            info: String::new(),
        }
    }
}

impl OkPacket {
    /// OK with an info message and default counters.
    pub fn with_info(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            ..Self::default()
        }
    }

    /// OK reporting `affected_rows`.
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    /// Encode as a frame.
    ///
    /// The info string runs raw to the end of the payload; it is omitted
    /// when empty.
    pub fn to_frame(&self, sequence_id: u8) -> Frame {
        let mut writer = PacketWriter::with_capacity(16 + self.info.len());
        writer.write_u8(OK_HEADER);
        writer.write_lenenc_int(self.affected_rows);
        writer.write_lenenc_int(self.last_insert_id);
        writer.write_u16_le(self.status_flags);
        writer.write_u16_le(self.warnings);
        if !self.info.is_empty() {
            writer.write_bytes(self.info.as_bytes());
        }
        writer.into_frame(sequence_id)
    }

    /// Parse an OK packet body (the 0x00 or 0xFE header included).
    ///
    /// OK packet format (protocol 4.1+):
    /// - header byte
    /// - affected_rows: lenenc int
    /// - last_insert_id: lenenc int
    /// - status_flags: 2 bytes
    /// - warnings: 2 bytes
    /// - info: rest of packet (optional)
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = PacketReader::new(payload);
        reader.read_u8()?;
        let affected_rows = reader.read_lenenc_int()?;
        let last_insert_id = reader.read_lenenc_int()?;
        let status_flags = reader.read_u16_le()?;
        let warnings = reader.read_u16_le().unwrap_or(0);
        let info = reader.read_rest_string();
        Some(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }
}

/// ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Error code
    pub error_code: u16,
    /// SQL state (5 characters)
    pub sql_state: String,
    /// Error message
    pub error_message: String,
}

impl ErrPacket {
    /// Create an ERR packet.
    pub fn new(error_code: u16, sql_state: &str, message: impl Into<String>) -> Self {
        Self {
            error_code,
            sql_state: sql_state.to_string(),
            error_message: message.into(),
        }
    }

    /// Render any error the way the client should see it.
    pub fn from_error(err: &Error) -> Self {
        Self::new(err.mysql_code(), err.sql_state(), err.to_string())
    }

    /// Encode as a frame.
    ///
    /// The SQL state is always exactly five bytes: longer values are cut,
    /// shorter ones padded with spaces.
    pub fn to_frame(&self, sequence_id: u8) -> Frame {
        let mut writer = PacketWriter::with_capacity(9 + self.error_message.len());
        writer.write_u8(ERR_HEADER);
        writer.write_u16_le(self.error_code);
        writer.write_u8(b'#');
        let mut state = [b' '; 5];
        for (slot, byte) in state.iter_mut().zip(self.sql_state.bytes()) {
            *slot = byte;
        }
        writer.write_bytes(&state);
        writer.write_bytes(self.error_message.as_bytes());
        writer.into_frame(sequence_id)
    }

    /// Parse an ERR packet (0xFF header included).
    ///
    /// ERR packet format (protocol 4.1+):
    /// - 0xFF header
    /// - error_code: 2 bytes
    /// - '#' marker
    /// - sql_state: 5 bytes
    /// - error_message: rest of packet
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = PacketReader::new(payload);
        if reader.read_u8()? != ERR_HEADER {
            return None;
        }
        let error_code = reader.read_u16_le()?;
        let sql_state = if reader.peek() == Some(b'#') {
            reader.skip(1);
            reader.read_string(5)?
        } else {
            String::new()
        };
        let error_message = reader.read_rest_string();
        Some(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

/// EOF packet, and the five-byte terminator used in deprecate-EOF mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofPacket {
    /// Number of warnings
    pub warnings: u16,
    /// Server status flags
    pub status_flags: u16,
}

impl Default for EofPacket {
    fn default() -> Self {
        Self {
            warnings: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
        }
    }
}

impl EofPacket {
    /// Encode as `0xFE, warnings(2), status(2)`.
    pub fn to_frame(&self, sequence_id: u8) -> Frame {
        let mut writer = PacketWriter::with_capacity(5);
        writer.write_u8(EOF_HEADER);
        writer.write_u16_le(self.warnings);
        writer.write_u16_le(self.status_flags);
        writer.into_frame(sequence_id)
    }

    /// Parse an EOF packet (0xFE header included).
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut reader = PacketReader::new(payload);
        if reader.read_u8()? != EOF_HEADER {
            return None;
        }
        let warnings = reader.read_u16_le()?;
        let status_flags = reader.read_u16_le()?;
        Some(Self {
            warnings,
            status_flags,
        })
    }
}

/// A command frame after authentication: the command byte plus its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    /// COM_xxx code
    pub code: u8,
    /// Everything after the code byte
    pub body: Vec<u8>,
}

impl CommandPacket {
    /// Split a command payload into code and body.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let (&code, body) = payload.split_first()?;
        Some(Self {
            code,
            body: body.to_vec(),
        })
    }

    /// Body decoded as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What the caller's protocol state says the next payload must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// First client packet after the greeting
    HandshakeResponse,
    /// A command from an authenticated client
    Command,
    /// A server reply to a command (client side)
    Response,
    /// The packet after the column definitions or the last row (client side)
    ///
    /// With `deprecate_eof` a `0xFE` header is an OK terminator, otherwise
    /// a classic EOF packet.
    Terminator { deprecate_eof: bool },
}

/// Every packet shape the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Ok(OkPacket),
    Err(ErrPacket),
    Eof(EofPacket),
    Handshake(ClientHandshake),
    Command(CommandPacket),
    /// Any other server reply (column count, column definition, row)
    Data(Vec<u8>),
}

impl Packet {
    /// Parse `payload` as the packet kind the current state expects.
    pub fn parse(payload: &[u8], expected: Expected) -> Result<Self, Error> {
        match expected {
            Expected::HandshakeResponse => ClientHandshake::parse(payload).map(Packet::Handshake),
            Expected::Command => CommandPacket::parse(payload)
                .map(Packet::Command)
                .ok_or_else(|| protocol_error("Empty command packet", payload)),
            Expected::Response => match payload.first() {
                Some(&OK_HEADER) => OkPacket::parse(payload)
                    .map(Packet::Ok)
                    .ok_or_else(|| protocol_error("Malformed OK packet", payload)),
                Some(&ERR_HEADER) => ErrPacket::parse(payload)
                    .map(Packet::Err)
                    .ok_or_else(|| protocol_error("Malformed ERR packet", payload)),
                Some(_) => Ok(Packet::Data(payload.to_vec())),
                None => Err(protocol_error("Empty response packet", payload)),
            },
            Expected::Terminator { deprecate_eof } => match payload.first() {
                Some(&EOF_HEADER) if deprecate_eof => OkPacket::parse(payload)
                    .map(Packet::Ok)
                    .ok_or_else(|| protocol_error("Malformed OK terminator", payload)),
                Some(&EOF_HEADER) => EofPacket::parse(payload)
                    .map(Packet::Eof)
                    .ok_or_else(|| protocol_error("Malformed EOF packet", payload)),
                Some(&ERR_HEADER) => ErrPacket::parse(payload)
                    .map(Packet::Err)
                    .ok_or_else(|| protocol_error("Malformed ERR packet", payload)),
                Some(_) => Ok(Packet::Data(payload.to_vec())),
                None => Err(protocol_error("Empty packet", payload)),
            },
        }
    }
}

fn protocol_error(msg: &str, raw: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.to_string(),
        raw_data: Some(raw.to_vec()),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysqlmock_core::error::{AuthError, AuthErrorKind};

    #[test]
    fn test_ok_packet_layout() {
        let frame = OkPacket::with_info("PONG").to_frame(1);
        assert_eq!(frame.sequence_id, 1);
        assert_eq!(
            frame.payload,
            vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, b'P', b'O', b'N', b'G']
        );

        let parsed = OkPacket::parse(&frame.payload).unwrap();
        assert_eq!(parsed.info, "PONG");
        assert_eq!(parsed.status_flags, SERVER_STATUS_AUTOCOMMIT);
    }

    #[test]
    fn test_ok_packet_without_info() {
        let frame = OkPacket::affected(300).to_frame(2);
        assert_eq!(frame.payload, vec![0x00, 0xFC, 0x2C, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_err_packet_layout() {
        let frame = ErrPacket::new(1045, "28000", "Access denied").to_frame(2);
        let mut expected = vec![0xFF, 0x15, 0x04, b'#'];
        expected.extend_from_slice(b"28000");
        expected.extend_from_slice(b"Access denied");
        assert_eq!(frame.payload, expected);

        let parsed = ErrPacket::parse(&frame.payload).unwrap();
        assert_eq!(parsed.error_code, 1045);
        assert_eq!(parsed.sql_state, "28000");
        assert_eq!(parsed.error_message, "Access denied");
    }

    #[test]
    fn test_err_packet_pads_short_state() {
        let frame = ErrPacket::new(1105, "HY", "x").to_frame(1);
        assert_eq!(&frame.payload[3..9], b"#HY   ");
    }

    #[test]
    fn test_err_from_error() {
        let err = Error::Auth(AuthError {
            kind: AuthErrorKind::Failed,
            user: "root".to_string(),
            message: "Access denied for user 'root'".to_string(),
        });
        let packet = ErrPacket::from_error(&err);
        assert_eq!(packet.error_code, 1045);
        assert_eq!(packet.sql_state, "28000");
        assert_eq!(packet.error_message, "Access denied for user 'root'");
    }

    #[test]
    fn test_eof_packet_layout() {
        let frame = EofPacket::default().to_frame(6);
        assert_eq!(frame.payload, vec![0xFE, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(
            EofPacket::parse(&frame.payload),
            Some(EofPacket {
                warnings: 0,
                status_flags: 2
            })
        );
    }

    #[test]
    fn test_terminator_depends_on_expectation() {
        let payload = EofPacket::default().to_frame(0).payload;

        let classic = Packet::parse(&payload, Expected::Terminator { deprecate_eof: false });
        assert!(matches!(classic, Ok(Packet::Eof(_))));

        let modern = Packet::parse(&payload, Expected::Terminator { deprecate_eof: true });
        match modern {
            Ok(Packet::Ok(ok)) => assert_eq!(ok.affected_rows, 0),
            other => panic!("expected OK terminator, got {other:?}"),
        }
    }

    #[test]
    fn test_command_packet() {
        match Packet::parse(b"\x03SELECT 1", Expected::Command).unwrap() {
            Packet::Command(cmd) => {
                assert_eq!(cmd.code, 0x03);
                assert_eq!(cmd.text(), "SELECT 1");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = Packet::parse(&[], Expected::Command).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_response_data_packet() {
        let parsed = Packet::parse(&[0x02], Expected::Response).unwrap();
        assert_eq!(parsed, Packet::Data(vec![0x02]));
    }
}
