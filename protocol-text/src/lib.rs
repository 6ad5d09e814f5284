//! Sans-IO codec for a line-oriented text protocol (an HTTP/1.x subset).
//!
//! A message is a start line, `name: value` header lines and a blank line,
//! followed by a body whose length is given by `content-length`. Messages
//! without `content-length` have an empty body; chunked transfer encoding is
//! not supported.
//!
//! Parsing is incremental in the usual way: callers buffer bytes and call
//! `parse` until it stops returning [`ParseError::Incomplete`]. Errors that
//! leave the message boundary intact ([`ParseError::Malformed`]) report how
//! many bytes to skip, so one bad request does not desynchronize the stream.
//!
//! # Example - Server Side
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_text::{Method, Request, Response};
//!
//! let data = b"GET /_api/version HTTP/1.1\r\nhost: db\r\n\r\n";
//! let (request, consumed) = Request::parse(data).unwrap();
//! assert_eq!(request.method(), Method::Get);
//! assert_eq!(consumed, data.len());
//!
//! let mut buf = BytesMut::new();
//! Response::ok(&b"{\"version\":\"3.1\"}"[..]).encode(&mut buf);
//! ```
//!
//! # Example - Client Side
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_text::{Method, Request, Response};
//!
//! let mut buf = BytesMut::new();
//! Request::new(Method::Post, "/_api/cursor")
//!     .body(&b"{}"[..])
//!     .encode(&mut buf);
//!
//! let (response, _) = Response::parse(b"HTTP/1.1 201 Created\r\ncontent-length: 0\r\n\r\n").unwrap();
//! assert_eq!(response.status(), 201);
//! ```

mod error;
mod head;
mod request;
mod response;

pub use error::ParseError;
pub use head::{DEFAULT_MAX_BODY_LEN, DEFAULT_MAX_HEADER_LEN, Header, ParseOptions};
pub use request::{Method, Request, Version};
pub use response::{Response, reason_phrase};
