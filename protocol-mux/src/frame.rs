//! Frame encoding/decoding.
//!
//! Every frame starts with a fixed 16-byte header, all integers little endian:
//! ```text
//! +---------------+-------+-------+---------------+
//! |  Length (32)  | Kind  | Flags | Reserved (16) |
//! +---------------+-------+-------+---------------+
//! |               Message Id (64)                 |
//! +-----------------------------------------------+
//! |               Payload ...                     |
//! +-----------------------------------------------+
//! ```
//! `Length` covers the whole frame including the header.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EncodeError, ParseError};

/// Connection preface sent by the client before the first frame.
pub const PREFACE: &[u8] = b"MUX/1.0\r\n\r\n";

/// Frame header size in bytes.
pub const HEADER_LEN: usize = 16;

/// Default maximum frame size, header included (16MB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Protocol version announced by [`PREFACE`].
pub const PROTOCOL_VERSION: &str = "MUX/1.0";

/// Response flag: the payload is an [`ErrorBody`](crate::ErrorBody).
pub const FLAG_ERROR: u8 = 0x01;

/// Response flag: more responses with the same id follow.
pub const FLAG_PARTIAL: u8 = 0x02;

/// Message id reserved for errors about the connection as a whole.
/// Clients must not send requests with this id.
pub const CONNECTION_ID: u64 = u64::MAX;

const KIND_REQUEST: u8 = 0x01;
const KIND_RESPONSE: u8 = 0x02;

/// Frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Request = KIND_REQUEST,
    Response = KIND_RESPONSE,
}

impl Kind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            KIND_REQUEST => Some(Kind::Request),
            KIND_RESPONSE => Some(Kind::Response),
            _ => None,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub flags: u8,
    pub id: u64,
    pub payload: Bytes,
}

impl Message {
    /// Create a request frame.
    pub fn request(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Request,
            flags: 0,
            id,
            payload: payload.into(),
        }
    }

    /// Create a response frame.
    pub fn response(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Response,
            flags: 0,
            id,
            payload: payload.into(),
        }
    }

    /// Create a non-final response frame. The final response for `id`
    /// follows later.
    pub fn partial(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Response,
            flags: FLAG_PARTIAL,
            id,
            payload: payload.into(),
        }
    }

    /// Create an error response frame.
    pub fn error(id: u64, body: &crate::ErrorBody) -> Self {
        let mut payload = BytesMut::new();
        body.encode(&mut payload);
        Self {
            kind: Kind::Response,
            flags: FLAG_ERROR,
            id,
            payload: payload.freeze(),
        }
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        self.flags & FLAG_ERROR != 0
    }

    /// Whether more responses with this id follow.
    pub fn is_partial(&self) -> bool {
        self.flags & FLAG_PARTIAL != 0
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Encode the frame into `buf`.
    ///
    /// Fails without touching `buf` if the frame does not fit the 32-bit
    /// length field.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        self.encode_with_limit(buf, u32::MAX as usize)
    }

    /// Encode the frame into `buf`, rejecting frames larger than
    /// `max_frame_len`.
    pub fn encode_with_limit(&self, buf: &mut BytesMut, max_frame_len: usize) -> Result<(), EncodeError> {
        let len = self.encoded_len();
        let limit = max_frame_len.min(u32::MAX as usize);
        let wire_len = u32::try_from(len)
            .ok()
            .filter(|_| len <= limit)
            .ok_or(EncodeError::FrameTooLarge { len, limit })?;
        buf.reserve(len);
        buf.put_u32_le(wire_len);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.flags);
        buf.put_u16_le(0);
        buf.put_u64_le(self.id);
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Parse a frame with the default maximum frame size.
    ///
    /// Returns the message and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_limit(data, DEFAULT_MAX_FRAME_LEN)
    }

    /// Parse a frame, rejecting frames larger than `max_frame_len`.
    pub fn parse_with_limit(data: &[u8], max_frame_len: usize) -> Result<(Self, usize), ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::Incomplete);
        }
        let mut header = &data[..HEADER_LEN];
        let len = header.get_u32_le();
        let kind = header.get_u8();
        let flags = header.get_u8();
        let reserved = header.get_u16_le();
        let id = header.get_u64_le();

        if (len as usize) < HEADER_LEN {
            return Err(ParseError::InvalidLength { len });
        }
        if len as usize > max_frame_len {
            return Err(ParseError::FrameTooLarge {
                len,
                limit: max_frame_len,
            });
        }
        let total = len as usize;
        if data.len() < total {
            return Err(ParseError::Incomplete);
        }

        let Some(kind) = Kind::from_u8(kind) else {
            return Err(ParseError::UnknownKind {
                kind,
                id,
                consumed: total,
            });
        };
        if reserved != 0 {
            return Err(ParseError::ReservedBits {
                id,
                consumed: total,
            });
        }

        let payload = Bytes::copy_from_slice(&data[HEADER_LEN..total]);
        Ok((
            Message {
                kind,
                flags,
                id,
                payload,
            },
            total,
        ))
    }
}

/// Check the connection preface at the start of `data`.
///
/// Returns the number of bytes to consume once the full preface is present.
pub fn parse_preface(data: &[u8]) -> Result<usize, ParseError> {
    if data.len() < PREFACE.len() {
        if PREFACE.starts_with(data) {
            return Err(ParseError::Incomplete);
        }
        return Err(ParseError::BadPreface);
    }
    if data.starts_with(PREFACE) {
        Ok(PREFACE.len())
    } else {
        Err(ParseError::BadPreface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(len: u32, kind: u8, flags: u8, reserved: u16, id: u64) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&len.to_le_bytes());
        v.push(kind);
        v.push(flags);
        v.extend_from_slice(&reserved.to_le_bytes());
        v.extend_from_slice(&id.to_le_bytes());
        v
    }

    #[test]
    fn encode_layout() {
        let mut buf = BytesMut::new();
        Message::request(0x0102, &b"abc"[..]).encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 3);
        assert_eq!(&buf[..4], &19u32.to_le_bytes());
        assert_eq!(buf[4], KIND_REQUEST);
        assert_eq!(buf[5], 0);
        assert_eq!(&buf[8..16], &0x0102u64.to_le_bytes());
        assert_eq!(&buf[16..], b"abc");
    }

    #[test]
    fn parse_request() {
        let mut buf = BytesMut::new();
        Message::request(7, &b"payload"[..]).encode(&mut buf).unwrap();
        buf.extend_from_slice(b"trailing");
        let (msg, consumed) = Message::parse(&buf).unwrap();
        assert_eq!(msg.kind, Kind::Request);
        assert_eq!(msg.id, 7);
        assert_eq!(&msg.payload[..], b"payload");
        assert_eq!(&buf[consumed..], b"trailing");
    }

    #[test]
    fn parse_incomplete() {
        let mut buf = BytesMut::new();
        Message::request(1, &b"0123456789"[..]).encode(&mut buf).unwrap();
        assert_eq!(Message::parse(&buf[..10]), Err(ParseError::Incomplete));
        assert_eq!(Message::parse(&buf[..20]), Err(ParseError::Incomplete));
    }

    #[test]
    fn parse_length_below_header() {
        let data = raw_header(8, KIND_REQUEST, 0, 0, 1);
        assert_eq!(
            Message::parse(&data),
            Err(ParseError::InvalidLength { len: 8 })
        );
    }

    #[test]
    fn parse_too_large() {
        let data = raw_header(1024, KIND_REQUEST, 0, 0, 1);
        assert_eq!(
            Message::parse_with_limit(&data, 64),
            Err(ParseError::FrameTooLarge {
                len: 1024,
                limit: 64
            })
        );
    }

    #[test]
    fn parse_unknown_kind() {
        let mut data = raw_header(20, 0x7f, 0, 0, 99);
        data.extend_from_slice(b"abcd");
        assert_eq!(
            Message::parse(&data),
            Err(ParseError::UnknownKind {
                kind: 0x7f,
                id: 99,
                consumed: 20
            })
        );
    }

    #[test]
    fn parse_reserved_bits() {
        let data = raw_header(16, KIND_REQUEST, 0, 1, 5);
        assert_eq!(
            Message::parse(&data),
            Err(ParseError::ReservedBits { id: 5, consumed: 16 })
        );
    }

    #[test]
    fn encode_rejects_oversized_frame() {
        let mut buf = BytesMut::new();
        let message = Message::response(3, vec![0u8; 100]);
        assert_eq!(
            message.encode_with_limit(&mut buf, 64),
            Err(EncodeError::FrameTooLarge { len: 116, limit: 64 })
        );
        assert!(buf.is_empty());
        message.encode_with_limit(&mut buf, 116).unwrap();
        assert_eq!(buf.len(), 116);
    }

    #[test]
    fn partial_flag_round_trips() {
        let mut buf = BytesMut::new();
        Message::partial(8, &b"part"[..]).encode(&mut buf).unwrap();
        let (msg, _) = Message::parse(&buf).unwrap();
        assert!(msg.is_partial());
        assert!(!msg.is_error());
        assert_eq!(msg.kind, Kind::Response);
    }

    #[test]
    fn preface() {
        assert_eq!(parse_preface(b"MUX/1"), Err(ParseError::Incomplete));
        assert_eq!(parse_preface(b"GET / HTTP/1.1\r\n"), Err(ParseError::BadPreface));
        assert_eq!(parse_preface(b"XUM"), Err(ParseError::BadPreface));
        assert_eq!(parse_preface(b"MUX/1.0\r\n\r\nrest"), Ok(PREFACE.len()));
    }
}
