//! Sans-IO codec for a length-prefixed, multiplexed binary protocol.
//!
//! A client opens the connection with [`PREFACE`] and then sends request
//! frames, each tagged with a client-chosen 64-bit message id. The server may
//! answer in any order; every response echoes the id of its request. Error
//! responses carry [`FLAG_ERROR`] and an [`ErrorBody`] payload. A response
//! may be streamed as several frames with the same id: all but the last
//! carry [`FLAG_PARTIAL`].
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_mux::{ErrorBody, Kind, Message};
//!
//! let mut wire = BytesMut::new();
//! Message::request(42, &b"get foo"[..]).encode(&mut wire).unwrap();
//!
//! let (request, consumed) = Message::parse(&wire).unwrap();
//! assert_eq!(request.kind, Kind::Request);
//! assert_eq!(request.id, 42);
//! assert_eq!(consumed, wire.len());
//!
//! let mut out = BytesMut::new();
//! Message::error(42, &ErrorBody::new(404, 1202, "not found")).encode(&mut out).unwrap();
//! let (response, _) = Message::parse(&out).unwrap();
//! assert!(response.is_error());
//! assert_eq!(ErrorBody::parse(&response.payload).unwrap().code, 404);
//! ```

mod error;
mod error_body;
mod frame;

pub use error::{EncodeError, ParseError};
pub use error_body::ErrorBody;
pub use frame::{
    CONNECTION_ID, DEFAULT_MAX_FRAME_LEN, FLAG_ERROR, FLAG_PARTIAL, HEADER_LEN, Kind, Message,
    PREFACE, PROTOCOL_VERSION, parse_preface,
};
