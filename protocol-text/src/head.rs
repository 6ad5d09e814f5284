//! Header block splitting shared by request and response parsing.
//!
//! A message head is a start line followed by `name: value` lines and an
//! empty line (`\r\n\r\n`). The body length comes from `content-length`;
//! a message without one has an empty body.

use memchr::memmem;

use crate::error::ParseError;

/// Default maximum size of a header block, including the terminating blank line.
pub const DEFAULT_MAX_HEADER_LEN: usize = 16 * 1024;

/// Default maximum body size (16MB).
pub const DEFAULT_MAX_BODY_LEN: usize = 16 * 1024 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Configuration options for message parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum header block size in bytes.
    pub max_header_len: usize,
    /// Maximum body size in bytes.
    pub max_body_len: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    /// Create new parse options with default values.
    pub const fn new() -> Self {
        Self {
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    /// Set the maximum header block length.
    pub const fn max_header_len(mut self, len: usize) -> Self {
        self.max_header_len = len;
        self
    }

    /// Set the maximum body length.
    pub const fn max_body_len(mut self, len: usize) -> Self {
        self.max_body_len = len;
        self
    }
}

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `name: value` line. Returns `None` for lines without a colon,
    /// with an empty name, or that are not valid UTF-8.
    pub(crate) fn parse_line(line: &[u8]) -> Option<Self> {
        let colon = memchr::memchr(b':', line)?;
        let name = std::str::from_utf8(&line[..colon]).ok()?.trim();
        let value = std::str::from_utf8(&line[colon + 1..]).ok()?.trim();
        if name.is_empty() || name.contains(' ') {
            return None;
        }
        Some(Header::new(name, value))
    }
}

/// Case-insensitive header lookup.
pub(crate) fn find_header<'h>(headers: &'h [Header], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// The framing-relevant view of a buffered message head.
pub(crate) struct Head<'a> {
    pub start_line: &'a [u8],
    pub header_lines: Vec<&'a [u8]>,
    /// Bytes up to and including the blank line.
    pub head_len: usize,
    /// Declared body length.
    pub body_len: usize,
}

impl Head<'_> {
    /// Total message length (head plus declared body).
    pub fn total_len(&self) -> usize {
        self.head_len + self.body_len
    }
}

/// Locate the end of the head and compute the message boundary.
///
/// Only errors that make the boundary unknowable are reported here; start
/// line and header syntax are validated by the caller once the whole message
/// is buffered.
pub(crate) fn split_head<'a>(data: &'a [u8], options: &ParseOptions) -> Result<Head<'a>, ParseError> {
    let limit = options.max_header_len;
    let search = &data[..data.len().min(limit.saturating_add(HEAD_TERMINATOR.len()))];
    let Some(end) = memmem::find(search, HEAD_TERMINATOR) else {
        if data.len() > limit {
            return Err(ParseError::HeaderTooLarge { limit });
        }
        return Err(ParseError::Incomplete);
    };

    let head_len = end + HEAD_TERMINATOR.len();
    if head_len > limit {
        return Err(ParseError::HeaderTooLarge { limit });
    }

    let mut lines = data[..end].split(|&b| b == b'\n').map(strip_cr);
    let start_line = lines.next().unwrap_or_default();
    let header_lines: Vec<&[u8]> = lines.collect();

    let mut body_len: Option<usize> = None;
    for line in &header_lines {
        let Some(colon) = memchr::memchr(b':', line) else {
            continue;
        };
        let name = line[..colon].trim_ascii();
        let value = line[colon + 1..].trim_ascii();
        if name.eq_ignore_ascii_case(b"content-length") {
            let len = parse_usize(value).ok_or(ParseError::InvalidContentLength)?;
            if body_len.is_some_and(|prev| prev != len) {
                return Err(ParseError::InvalidContentLength);
            }
            body_len = Some(len);
        } else if name.eq_ignore_ascii_case(b"transfer-encoding")
            && !value.eq_ignore_ascii_case(b"identity")
        {
            return Err(ParseError::UnsupportedTransferEncoding);
        }
    }

    let body_len = body_len.unwrap_or(0);
    if body_len > options.max_body_len {
        return Err(ParseError::BodyTooLarge {
            len: body_len,
            limit: options.max_body_len,
        });
    }

    Ok(Head {
        start_line,
        header_lines,
        head_len,
        body_len,
    })
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_usize(data: &[u8]) -> Option<usize> {
    if data.is_empty() || !data.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(data).ok()?.parse().ok()
}
