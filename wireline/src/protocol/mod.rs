//! The contract between a connection task and a wire protocol.
//!
//! An adapter owns all framing knowledge: it finds request boundaries in
//! the read buffer, extracts the correlation id, and encodes replies. The
//! connection task owns everything else (buffers, handles, ordering).

use std::fmt;

use bytes::BytesMut;

#[cfg(feature = "mux")]
pub mod mux;
#[cfg(feature = "text")]
pub mod text;

/// Protocol-level request id. Constant `0` for single-in-flight protocols.
pub type CorrelationId = u64;

/// How many requests a connection may have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// At most one outstanding request; responses are strictly serial.
    SingleInFlight,
    /// Many outstanding requests, each tagged with a correlation id.
    Multiplexed,
}

/// Response status codes the engine itself produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    Gone = 410,
    PayloadTooLarge = 413,
    RequestHeaderFieldsTooLarge = 431,
    ServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Application error numbers carried next to the status code.
pub mod error_num {
    pub const INTERNAL: u32 = 4;
    pub const NOT_IMPLEMENTED: u32 = 9;
    pub const BAD_PARAMETER: u32 = 10;
    pub const QUEUE_FULL: u32 = 21;
    pub const SHUTTING_DOWN: u32 = 30;
    pub const HTTP_BAD_PARAMETER: u32 = 400;
    pub const HTTP_NOT_FOUND: u32 = 404;
    pub const HTTP_METHOD_NOT_ALLOWED: u32 = 405;
    pub const HTTP_REQUEST_TOO_LARGE: u32 = 413;
    pub const HTTP_SERVICE_UNAVAILABLE: u32 = 503;
}

/// A protocol-visible error: status code, error number and message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code} (error {error_num}): {message}")]
pub struct SimpleError {
    pub code: ResponseCode,
    pub error_num: u32,
    pub message: String,
}

impl SimpleError {
    pub fn new(code: ResponseCode, error_num: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            error_num,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::BadRequest, error_num::HTTP_BAD_PARAMETER, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::ServerError, error_num::INTERNAL, message)
    }

    pub fn queue_full() -> Self {
        Self::new(
            ResponseCode::ServiceUnavailable,
            error_num::QUEUE_FULL,
            "request queue is full",
        )
    }

    pub fn shutting_down() -> Self {
        Self::new(
            ResponseCode::ServiceUnavailable,
            error_num::SHUTTING_DOWN,
            "server is shutting down",
        )
    }
}

/// What the adapter is asked to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<R> {
    /// The final (or only) response to a request.
    Response(R),
    /// A non-final part of a streamed response. Only sent to adapters whose
    /// [`supports_partial`](ProtocolAdapter::supports_partial) is true.
    Partial(R),
    Error(SimpleError),
}

impl<R> Reply<R> {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// A frame the adapter could delimit but not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFrame {
    /// Error response to send back.
    pub error: SimpleError,
    /// Correlation id to tag the error response with.
    pub correlation: CorrelationId,
    /// Bytes to discard. Only meaningful when `recoverable`.
    pub consumed: usize,
    /// Whether parsing can continue after discarding `consumed` bytes.
    /// Unrecoverable errors close the connection after the error is flushed.
    pub recoverable: bool,
}

impl InvalidFrame {
    pub fn recoverable(error: SimpleError, correlation: CorrelationId, consumed: usize) -> Self {
        Self {
            error,
            correlation,
            consumed,
            recoverable: true,
        }
    }

    pub fn fatal(error: SimpleError, correlation: CorrelationId) -> Self {
        Self {
            error,
            correlation,
            consumed: 0,
            recoverable: false,
        }
    }
}

/// Result of looking for one request at the front of the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framed<R> {
    /// A full request occupying the first `consumed` bytes.
    Complete { request: R, consumed: usize },
    /// No full frame yet; wait for more bytes.
    Incomplete,
    /// Protocol bytes that produce no request (preface, handshake).
    Control { consumed: usize },
    /// A frame that must be answered with an error.
    Invalid(InvalidFrame),
}

/// A wire protocol plugged into a [`CommTask`](crate::CommTask).
pub trait ProtocolAdapter {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Protocol name used in logs and statistics.
    fn protocol(&self) -> &'static str;

    /// Protocol version negotiated on this connection, e.g. `"HTTP/1.1"`.
    fn protocol_version(&self) -> &'static str;

    fn concurrency(&self) -> Concurrency;

    /// Look for one request at the front of `data`.
    ///
    /// Must return `Incomplete` for every strict prefix of a valid frame and
    /// never report `consumed` beyond `data.len()`.
    fn frame(&mut self, data: &[u8]) -> Framed<Self::Request>;

    /// Append the wire encoding of `reply`, tagged with `correlation`, to `out`.
    fn encode(
        &mut self,
        reply: &Reply<Self::Response>,
        correlation: CorrelationId,
        out: &mut BytesMut,
    );

    fn correlation_id(&self, _request: &Self::Request) -> CorrelationId {
        0
    }

    /// Whether the peer asked to close the connection after this request.
    fn wants_close(&self, _request: &Self::Request) -> bool {
        false
    }

    /// Whether a request may be answered with several [`Reply::Partial`]
    /// parts before its final reply.
    fn supports_partial(&self) -> bool {
        false
    }

    /// Correlation id for errors about the connection rather than one request.
    fn connection_error_id(&self) -> CorrelationId {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_values() {
        assert_eq!(ResponseCode::RequestHeaderFieldsTooLarge.as_u16(), 431);
        assert_eq!(ResponseCode::ServiceUnavailable.to_string(), "503");
    }

    #[test]
    fn simple_error_display() {
        let err = SimpleError::queue_full();
        assert_eq!(err.code, ResponseCode::ServiceUnavailable);
        assert_eq!(err.to_string(), "503 (error 21): request queue is full");
    }

    #[test]
    fn reply_is_error() {
        assert!(!Reply::Response(()).is_error());
        assert!(!Reply::Partial(()).is_error());
        assert!(Reply::<()>::Error(SimpleError::bad_request("x")).is_error());
    }
}
