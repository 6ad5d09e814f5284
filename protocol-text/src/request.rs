//! Request parsing (server side) and encoding (client side).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ParseError;
use crate::head::{Header, ParseOptions, find_header, split_head};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

/// Protocol version from the start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub(crate) fn from_token(token: &str) -> Option<Self> {
        match token {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A complete request: start line, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    target: String,
    version: Version,
    headers: Vec<Header>,
    body: Bytes,
}

impl Request {
    /// Create an HTTP/1.1 request with no headers and an empty body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::Http11,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Set the protocol version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Append a header. `content-length` is computed on encode and must not
    /// be set here.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a request with default [`ParseOptions`].
    ///
    /// Returns the request and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    /// Parse a request with custom limits.
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
            .map_err(|_| malformed("request line is not valid UTF-8"))?;
        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("invalid request line"));
        };
        let method = Method::from_token(method).ok_or_else(|| malformed("unknown method"))?;
        if target.is_empty() {
            return Err(malformed("empty request target"));
        }
        let version = Version::from_token(version).ok_or_else(|| malformed("unsupported version"))?;

        let mut headers = Vec::with_capacity(head.header_lines.len());
        for line in &head.header_lines {
            let header = Header::parse_line(line).ok_or_else(|| malformed("invalid header line"))?;
            headers.push(header);
        }

        let body = Bytes::copy_from_slice(&data[head.head_len..total]);
        Ok((
            Request {
                method,
                target: target.to_string(),
                version,
                headers,
                body,
            },
            total,
        ))
    }

    /// Encode the request into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(64 + self.body.len());
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.target.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.version.as_str().as_bytes());
        buf.put_slice(b"\r\n");
        for h in &self.headers {
            put_header(buf, &h.name, &h.value);
        }
        if !self.body.is_empty() {
            put_header(buf, "content-length", &self.body.len().to_string());
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
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

    /// Whether the client wants the connection kept open after the response.
    ///
    /// `Connection: close` always wins; otherwise HTTP/1.1 defaults to
    /// keep-alive and HTTP/1.0 requires an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match self.get_header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == Version::Http11,
        }
    }
}

pub(crate) fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}
