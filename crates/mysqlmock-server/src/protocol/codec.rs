//! Frame codec.
//!
//! Splits an incrementally filling byte buffer into length-prefixed frames
//! and encodes outgoing frames. Decoding never consumes a partial frame, so
//! the codec resumes cleanly across arbitrarily fragmented TCP reads.

#![allow(clippy::cast_possible_truncation)]

use mysqlmock_core::FramingError;

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// One MySQL packet as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number from the header
    pub sequence_id: u8,
    /// Payload bytes (header excluded)
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    pub fn new(sequence_id: u8, payload: Vec<u8>) -> Self {
        Self {
            sequence_id,
            payload,
        }
    }

    /// Payload length as carried in the header.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Header plus payload.
    ///
    /// The payload must fit the 3-byte length field; [`FrameCodec::encode`]
    /// checks that before calling this.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = PacketHeader {
            payload_length: self.payload.len() as u32,
            sequence_id: self.sequence_id,
        };
        let mut out = Vec::with_capacity(PacketHeader::SIZE + self.payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Stateless frame decoder/encoder with a payload size cap.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_packet_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl FrameCodec {
    /// Create a codec rejecting payloads above `max_packet_size`.
    ///
    /// The cap is clamped to what a 3-byte length field can express.
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: max_packet_size.min(MAX_PACKET_SIZE),
        }
    }

    /// Configured payload cap.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Try to take one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` (need more data) without consuming anything when
    /// the header or the payload is incomplete. A header announcing more
    /// than the configured maximum is a [`FramingError`], raised as soon as
    /// the header is visible so an attacker cannot make us buffer it.
    pub fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<Frame>, FramingError> {
        if buf.len() < PacketHeader::SIZE {
            return Ok(None);
        }

        let header = PacketHeader::from_bytes(&[buf[0], buf[1], buf[2], buf[3]]);
        let payload_len = header.payload_length as usize;
        if payload_len > self.max_packet_size {
            return Err(FramingError {
                declared_length: payload_len,
                max_packet_size: self.max_packet_size,
            });
        }

        let total = PacketHeader::SIZE + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        let payload = buf[PacketHeader::SIZE..total].to_vec();
        buf.drain(..total);
        Ok(Some(Frame::new(header.sequence_id, payload)))
    }

    /// Append the wire form of `frame` to `dst`.
    pub fn encode(&self, frame: &Frame, dst: &mut Vec<u8>) -> Result<(), FramingError> {
        if frame.len() > self.max_packet_size {
            return Err(FramingError {
                declared_length: frame.len(),
                max_packet_size: self.max_packet_size,
            });
        }
        dst.extend_from_slice(&frame.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(payload: &[u8], sequence_id: u8) -> Vec<u8> {
        let mut out = Vec::new();
        FrameCodec::default()
            .encode(&Frame::new(sequence_id, payload.to_vec()), &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let mut buf = encoded(&[], 3);
        assert_eq!(buf, vec![0, 0, 0, 3]);
        let frame = FrameCodec::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::new(3, Vec::new()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_round_trip_max_payload() {
        let payload = vec![0xAB; MAX_PACKET_SIZE];
        let mut buf = encoded(&payload, 255);
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        let frame = FrameCodec::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.sequence_id, 255);
        assert_eq!(frame.payload.len(), MAX_PACKET_SIZE);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_round_trip_various_sizes() {
        let codec = FrameCodec::default();
        for size in [1usize, 250, 251, 0xFFFF, 0x1_0000] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let mut buf = encoded(&payload, 9);
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_partial_delivery_at_every_offset() {
        let codec = FrameCodec::default();
        let wire = encoded(b"\x03SELECT 1", 0);

        for split in 0..wire.len() {
            let mut buf = wire[..split].to_vec();
            assert_eq!(codec.decode(&mut buf).unwrap(), None, "split at {split}");
            // Nothing consumed while waiting.
            assert_eq!(buf.len(), split);

            buf.extend_from_slice(&wire[split..]);
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame, Frame::new(0, b"\x03SELECT 1".to_vec()));
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
        }
    }

    #[test]
    fn test_byte_at_a_time_yields_frame_once() {
        let codec = FrameCodec::default();
        let wire = encoded(b"ping", 4);
        let mut buf = Vec::new();
        let mut frames = Vec::new();
        for byte in wire {
            buf.push(byte);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames, vec![Frame::new(4, b"ping".to_vec())]);
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let codec = FrameCodec::default();
        let mut buf = encoded(b"a", 0);
        buf.extend(encoded(b"bc", 1));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::new(0, b"a".to_vec())));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::new(1, b"bc".to_vec())));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_header_is_framing_error() {
        let codec = FrameCodec::new(1024);
        let mut buf = vec![0x01, 0x04, 0x00, 0x00];
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.declared_length, 1025);
        assert_eq!(err.max_packet_size, 1024);

        let mut out = Vec::new();
        assert!(codec.encode(&Frame::new(0, vec![0; 1025]), &mut out).is_err());
        assert!(out.is_empty());
    }
}
