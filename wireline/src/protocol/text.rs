//! Adapter for the text protocol (HTTP/1.x subset).

use bytes::BytesMut;
use protocol_text::{ParseError, ParseOptions, Request, Response, Version};

use super::{
    Concurrency, CorrelationId, Framed, InvalidFrame, ProtocolAdapter, Reply, ResponseCode,
    SimpleError, error_num,
};

/// Single-in-flight adapter over [`protocol_text`].
///
/// A request is complete once its header block and the full
/// `content-length` body are buffered. The reported protocol version follows
/// the most recent request.
#[derive(Debug, Clone)]
pub struct TextAdapter {
    options: ParseOptions,
    version: Version,
}

impl Default for TextAdapter {
    fn default() -> Self {
        Self::with_options(ParseOptions::default())
    }
}

impl TextAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            options,
            version: Version::Http11,
        }
    }
}

fn invalid_frame(err: ParseError) -> InvalidFrame {
    match err {
        ParseError::Malformed { reason, consumed } => {
            InvalidFrame::recoverable(SimpleError::bad_request(reason), 0, consumed)
        }
        ParseError::HeaderTooLarge { .. } => InvalidFrame::fatal(
            SimpleError::new(
                ResponseCode::RequestHeaderFieldsTooLarge,
                error_num::HTTP_REQUEST_TOO_LARGE,
                err.to_string(),
            ),
            0,
        ),
        ParseError::BodyTooLarge { .. } => InvalidFrame::fatal(
            SimpleError::new(
                ResponseCode::PayloadTooLarge,
                error_num::HTTP_REQUEST_TOO_LARGE,
                err.to_string(),
            ),
            0,
        ),
        ParseError::InvalidContentLength
        | ParseError::UnsupportedTransferEncoding
        | ParseError::Incomplete => InvalidFrame::fatal(SimpleError::bad_request(err.to_string()), 0),
    }
}

impl ProtocolAdapter for TextAdapter {
    type Request = Request;
    type Response = Response;

    fn protocol(&self) -> &'static str {
        "http"
    }

    fn protocol_version(&self) -> &'static str {
        self.version.as_str()
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::SingleInFlight
    }

    fn frame(&mut self, data: &[u8]) -> Framed<Request> {
        match Request::parse_with_options(data, &self.options) {
            Ok((request, consumed)) => {
                self.version = request.version();
                Framed::Complete { request, consumed }
            }
            Err(ParseError::Incomplete) => Framed::Incomplete,
            Err(err) => Framed::Invalid(invalid_frame(err)),
        }
    }

    fn encode(&mut self, reply: &Reply<Response>, _correlation: CorrelationId, out: &mut BytesMut) {
        match reply {
            Reply::Response(response) | Reply::Partial(response) => response.encode(out),
            Reply::Error(err) => Response::new(err.code.as_u16())
                .header("content-type", "text/plain; charset=utf-8")
                .header("x-error-num", err.error_num.to_string())
                .body(err.message.clone())
                .encode(out),
        }
    }

    fn wants_close(&self, request: &Request) -> bool {
        !request.keep_alive()
    }
}
