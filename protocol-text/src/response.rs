//! Response encoding (server side) and parsing (client side).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ParseError;
use crate::head::{Header, ParseOptions, find_header, split_head};
use crate::request::{Version, put_header};

/// A response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<Header>,
    body: Bytes,
}

impl Response {
    /// Create a response with the given status code and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a `200 OK` response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200).body(body)
    }

    /// Append a header. `content-length` is always computed on encode;
    /// a caller-supplied one is ignored.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Case-insensitive header lookup (first match).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Encode the response into `buf`. Always HTTP/1.1 with an explicit
    /// `content-length`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(64 + self.body.len());
        buf.put_slice(Version::Http11.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(reason_phrase(self.status).as_bytes());
        buf.put_slice(b"\r\n");
        for h in &self.headers {
            if h.name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            put_header(buf, &h.name, &h.value);
        }
        put_header(buf, "content-length", &self.body.len().to_string());
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
    }

    /// Parse a response with default [`ParseOptions`].
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    /// Parse a response with custom limits.
    pub fn parse_with_options(
        data: &[u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let head = split_head(data, options)?;
        let total = head.total_len();
        if data.len() < total {
            return Err(ParseError::Incomplete);
        }
        let malformed = |reason| ParseError::Malformed {
            reason,
            consumed: total,
        };

        let line = std::str::from_utf8(head.start_line)
            .map_err(|_| malformed("status line is not valid UTF-8"))?;
        let mut parts = line.splitn(3, ' ');
        let (Some(version), Some(status)) = (parts.next(), parts.next()) else {
            return Err(malformed("invalid status line"));
        };
        Version::from_token(version).ok_or_else(|| malformed("unsupported version"))?;
        let status = status
            .parse::<u16>()
            .ok()
            .filter(|s| (100..1000).contains(s))
            .ok_or_else(|| malformed("invalid status code"))?;

        let mut headers = Vec::with_capacity(head.header_lines.len());
        for line in &head.header_lines {
            let header = Header::parse_line(line).ok_or_else(|| malformed("invalid header line"))?;
            headers.push(header);
        }

        let body = Bytes::copy_from_slice(&data[head.head_len..total]);
        Ok((
            Response {
                status,
                headers,
                body,
            },
            total,
        ))
    }
}

/// Canonical reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ok() {
        let mut buf = BytesMut::new();
        Response::ok(&b"pong"[..])
            .header("content-type", "text/plain")
            .encode(&mut buf);
        assert_eq!(
            &buf[..],
            b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 4\r\n\r\npong"
        );
    }

    #[test]
    fn test_encode_ignores_content_length_header() {
        let mut buf = BytesMut::new();
        Response::new(204).header("Content-Length", "99").encode(&mut buf);
        assert_eq!(
            &buf[..],
            b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_parse_response() {
        let data = b"HTTP/1.1 404 Not Found\r\ncontent-length: 2\r\n\r\nnoHTTP/1.1";
        let (resp, consumed) = Response::parse(data).unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(&resp.body_bytes()[..], b"no");
        assert_eq!(&data[consumed..], b"HTTP/1.1");
    }

    #[test]
    fn test_parse_incomplete() {
        let data = b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nabc";
        assert_eq!(Response::parse(data), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_bad_status() {
        let data = b"HTTP/1.1 abc OK\r\n\r\n";
        assert!(matches!(
            Response::parse(data),
            Err(ParseError::Malformed {
                reason: "invalid status code",
                ..
            })
        ));
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(503), "Service Unavailable");
        assert_eq!(reason_phrase(299), "Unknown");
    }
}
