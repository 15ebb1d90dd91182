//! Wire framing shared by every link.
//!
//! Every unit of data exchanged over a link is a frame with a fixed 3-byte
//! header followed by the payload. All multi-byte fields are network byte
//! order (big-endian).
//!
//! # Frame format
//!
//! ```text
//! offset 0..1  payload length, big-endian u16
//! offset 2     frame kind: '0' = DATA, '1' = CONTROL
//! offset 3..   payload bytes (length per header)
//! ```
//!
//! The maximum payload is 1997 bytes for a 2000-byte maximum frame, so one
//! frame maps onto one interface packet at a typical MTU.

use std::fmt;

/// Length of the frame header in bytes.
pub const HEADER_LEN: usize = 3;

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD: usize = 1997;

/// Maximum total frame size (header + payload).
pub const MAX_FRAME: usize = HEADER_LEN + MAX_PAYLOAD;

/// Frame kind carried in the third header byte.
///
/// Stored as the raw wire byte so decoding never has to reject a frame; the
/// receive path forwards payloads regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameKind(u8);

impl FrameKind {
    /// Tunneled interface packet.
    pub const DATA: FrameKind = FrameKind(b'0');

    /// Control message.
    pub const CONTROL: FrameKind = FrameKind(b'1');

    /// Get the raw wire byte.
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Create from a raw wire byte.
    pub fn from_raw(byte: u8) -> Self {
        Self(byte)
    }

    /// Whether this is a DATA frame.
    pub fn is_data(self) -> bool {
        self == Self::DATA
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DATA => write!(f, "DATA"),
            Self::CONTROL => write!(f, "CONTROL"),
            Self(other) => write!(f, "UNKNOWN(0x{other:02x})"),
        }
    }
}

/// Encode a frame header (big-endian length, then kind byte).
pub fn encode_header(kind: FrameKind, payload_len: u16) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..2].copy_from_slice(&payload_len.to_be_bytes());
    buf[2] = kind.raw();
    buf
}

/// Decode a frame header.
///
/// No validation beyond byte layout: a payload length exceeding
/// [`MAX_PAYLOAD`] is a contract violation by the peer and is the caller's
/// responsibility to bound by its buffer size.
pub fn decode_header(buf: &[u8; HEADER_LEN]) -> (FrameKind, u16) {
    let payload_len = u16::from_be_bytes([buf[0], buf[1]]);
    (FrameKind::from_raw(buf[2]), payload_len)
}

/// A complete frame: kind plus payload.
///
/// Invariant: the encoded length header always reflects `payload.len()`. A
/// frame is only constructed once its payload is fully available; receivers
/// never see a partially valid frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Payload bytes (0..=[`MAX_PAYLOAD`]).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a DATA frame wrapping one interface packet.
    pub fn data(payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Self {
            kind: FrameKind::DATA,
            payload,
        }
    }

    /// Create a frame with an explicit kind.
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Self { kind, payload }
    }

    /// Total size on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Encode header + payload into one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.extend_from_slice(&encode_header(self.kind, self.payload.len() as u16));
        buf.extend_from_slice(&self.payload);
        buf
    }
}
