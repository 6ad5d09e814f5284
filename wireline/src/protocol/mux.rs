//! Adapter for the multiplexed binary protocol.

use bytes::{Bytes, BytesMut};
use protocol_mux::{
    CONNECTION_ID, DEFAULT_MAX_FRAME_LEN, ErrorBody, Kind, Message, PROTOCOL_VERSION, ParseError,
    parse_preface,
};
use tracing::{error, warn};

use super::{
    Concurrency, CorrelationId, Framed, InvalidFrame, ProtocolAdapter, Reply, ResponseCode,
    SimpleError, error_num,
};

/// Multiplexed adapter over [`protocol_mux`].
///
/// The connection preface is consumed as a control frame. Afterwards every
/// request frame is dispatched independently and answered with a response
/// frame carrying the same message id.
#[derive(Debug, Clone)]
pub struct MuxAdapter {
    max_frame_len: usize,
    preface_seen: bool,
}

impl Default for MuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxAdapter {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            preface_seen: false,
        }
    }
}

fn invalid_frame(err: ParseError) -> InvalidFrame {
    match (err.message_id(), err.consumed()) {
        (Some(id), Some(consumed)) => {
            InvalidFrame::recoverable(SimpleError::bad_request(err.to_string()), id, consumed)
        }
        _ => {
            let error = match err {
                ParseError::FrameTooLarge { .. } => SimpleError::new(
                    ResponseCode::PayloadTooLarge,
                    error_num::HTTP_REQUEST_TOO_LARGE,
                    err.to_string(),
                ),
                _ => SimpleError::bad_request(err.to_string()),
            };
            InvalidFrame::fatal(error, CONNECTION_ID)
        }
    }
}

fn error_message(id: u64, err: &SimpleError) -> Message {
    Message::error(
        id,
        &ErrorBody::new(err.code.as_u16(), err.error_num, err.message.clone()),
    )
}

impl ProtocolAdapter for MuxAdapter {
    type Request = Message;
    type Response = Bytes;

    fn protocol(&self) -> &'static str {
        "mux"
    }

    fn protocol_version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::Multiplexed
    }

    fn frame(&mut self, data: &[u8]) -> Framed<Message> {
        if !self.preface_seen {
            return match parse_preface(data) {
                Ok(consumed) => {
                    self.preface_seen = true;
                    Framed::Control { consumed }
                }
                Err(ParseError::Incomplete) => Framed::Incomplete,
                Err(err) => Framed::Invalid(invalid_frame(err)),
            };
        }
        match Message::parse_with_limit(data, self.max_frame_len) {
            Ok((message, consumed)) if message.id == CONNECTION_ID => {
                Framed::Invalid(InvalidFrame::recoverable(
                    SimpleError::bad_request("message id is reserved"),
                    CONNECTION_ID,
                    consumed,
                ))
            }
            Ok((message, consumed)) if message.kind == Kind::Request => Framed::Complete {
                request: message,
                consumed,
            },
            Ok((message, consumed)) => Framed::Invalid(InvalidFrame::recoverable(
                SimpleError::bad_request("unexpected response frame from client"),
                message.id,
                consumed,
            )),
            Err(ParseError::Incomplete) => Framed::Incomplete,
            Err(err) => Framed::Invalid(invalid_frame(err)),
        }
    }

    fn encode(&mut self, reply: &Reply<Bytes>, correlation: CorrelationId, out: &mut BytesMut) {
        let message = match reply {
            Reply::Response(payload) => Message::response(correlation, payload.clone()),
            Reply::Partial(payload) => Message::partial(correlation, payload.clone()),
            Reply::Error(err) => error_message(correlation, err),
        };
        let Err(err) = message.encode_with_limit(out, self.max_frame_len) else {
            return;
        };
        warn!(correlation, error = %err, "response exceeds frame limit");
        let fallback = error_message(
            correlation,
            &SimpleError::internal("response exceeds frame limit"),
        );
        if let Err(err) = fallback.encode_with_limit(out, self.max_frame_len) {
            error!(correlation, error = %err, "frame limit too small for an error reply");
        }
    }

    fn correlation_id(&self, request: &Message) -> CorrelationId {
        request.id
    }

    fn supports_partial(&self) -> bool {
        true
    }

    fn connection_error_id(&self) -> CorrelationId {
        CONNECTION_ID
    }
}
