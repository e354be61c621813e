//! Text-protocol result set encoding.
//!
//! A result set goes out as:
//!
//! ```text
//! column count
//! column definition * N
//! [EOF]                      (omitted with CLIENT_DEPRECATE_EOF)
//! row * M
//! EOF | OK-shaped terminator (the latter with CLIENT_DEPRECATE_EOF)
//! ```
//!
//! Every frame takes the next sequence id after the previous one.

use mysqlmock_core::ResultSet;

use crate::protocol::capabilities::CLIENT_DEPRECATE_EOF;
use crate::protocol::charset::DEFAULT_CHARSET;
use crate::protocol::codec::Frame;
use crate::protocol::column_type::MYSQL_TYPE_VAR_STRING;
use crate::protocol::{EofPacket, OkPacket, PacketReader, PacketWriter};

/// Display width announced for every column.
const COLUMN_LENGTH: u32 = 256;

/// Length of the fixed-size tail of a column definition.
const FIXED_FIELDS_LEN: u8 = 0x0C;

/// Encode `result` starting at `first_sequence_id`.
///
/// A result without columns becomes a single OK packet carrying its
/// affected-row count.
pub fn encode_result_set(result: &ResultSet, capabilities: u32, first_sequence_id: u8) -> Vec<Frame> {
    if result.is_command_result() {
        return vec![OkPacket::affected(result.affected_rows()).to_frame(first_sequence_id)];
    }

    let deprecate_eof = capabilities & CLIENT_DEPRECATE_EOF != 0;
    let mut seq = first_sequence_id;
    let mut next = || {
        let id = seq;
        seq = seq.wrapping_add(1);
        id
    };

    let mut frames = Vec::with_capacity(result.columns().len() + result.len() + 3);

    let mut count = PacketWriter::with_capacity(9);
    count.write_lenenc_int(result.columns().len() as u64);
    frames.push(count.into_frame(next()));

    for name in result.columns() {
        frames.push(column_definition(name).into_frame(next()));
    }

    if !deprecate_eof {
        frames.push(EofPacket::default().to_frame(next()));
    }

    for row in result.rows() {
        let mut writer = PacketWriter::new();
        for cell in row {
            writer.write_lenenc_cell(cell.as_deref());
        }
        frames.push(writer.into_frame(next()));
    }

    // Both terminators share the 0xFE/warnings/status layout; the client
    // reads it as OK or EOF depending on the negotiated flag.
    frames.push(EofPacket::default().to_frame(next()));
    frames
}

fn column_definition(name: &str) -> PacketWriter {
    let mut writer = PacketWriter::with_capacity(32 + 2 * name.len());
    writer.write_lenenc_string("def");
    writer.write_lenenc_string("");
    writer.write_lenenc_string("");
    writer.write_lenenc_string("");
    writer.write_lenenc_string(name);
    writer.write_lenenc_string(name);
    writer.write_u8(FIXED_FIELDS_LEN);
    writer.write_u16_le(u16::from(DEFAULT_CHARSET));
    writer.write_u32_le(COLUMN_LENGTH);
    writer.write_u8(MYSQL_TYPE_VAR_STRING);
    writer.write_u16_le(0);
    writer.write_u8(0);
    writer.write_zeros(2);
    writer
}

/// Column name from a column definition payload (client side).
pub fn parse_column_name(payload: &[u8]) -> Option<String> {
    let mut reader = PacketReader::new(payload);
    for _ in 0..4 {
        reader.read_lenenc_bytes()?;
    }
    reader.read_lenenc_string()
}

/// Cells of a text row payload (client side).
pub fn parse_row(payload: &[u8], column_count: usize) -> Option<Vec<Option<String>>> {
    let mut reader = PacketReader::new(payload);
    let mut cells = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        cells.push(reader.read_lenenc_cell()?);
    }
    Some(cells)
}
