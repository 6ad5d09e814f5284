//! Error types for text protocol parsing.

/// Error type for text protocol parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// The message is fully buffered but its start line or a header line is
    /// invalid. `consumed` covers the whole message (head and declared body),
    /// so the stream stays in sync after skipping it.
    #[error("malformed message: {reason}")]
    Malformed {
        reason: &'static str,
        consumed: usize,
    },

    /// The header block is larger than the configured limit.
    #[error("header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    /// The declared body is larger than the configured limit.
    #[error("body of {len} bytes exceeds {limit} bytes")]
    BodyTooLarge { len: usize, limit: usize },

    /// The `content-length` header is not a number, or appears twice with
    /// different values.
    #[error("invalid content-length")]
    InvalidContentLength,

    /// A `transfer-encoding` other than `identity` was declared.
    #[error("unsupported transfer-encoding")]
    UnsupportedTransferEncoding,
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }

    /// Returns true if the message boundary is still known, i.e. the caller
    /// can skip [`consumed`](Self::consumed) bytes and keep parsing.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::Malformed { .. })
    }

    /// Number of bytes to skip for a recoverable error.
    #[inline]
    pub fn consumed(&self) -> Option<usize> {
        match self {
            ParseError::Malformed { consumed, .. } => Some(*consumed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::InvalidContentLength.is_incomplete());
        assert!(
            !ParseError::Malformed {
                reason: "x",
                consumed: 3
            }
            .is_incomplete()
        );
    }

    #[test]
    fn test_recoverable() {
        let err = ParseError::Malformed {
            reason: "unknown method",
            consumed: 42,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.consumed(), Some(42));

        assert!(!ParseError::HeaderTooLarge { limit: 10 }.is_recoverable());
        assert!(!ParseError::UnsupportedTransferEncoding.is_recoverable());
        assert_eq!(ParseError::InvalidContentLength.consumed(), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", ParseError::Incomplete), "incomplete data");
        assert_eq!(
            format!(
                "{}",
                ParseError::Malformed {
                    reason: "bad header",
                    consumed: 1
                }
            ),
            "malformed message: bad header"
        );
        assert_eq!(
            format!("{}", ParseError::BodyTooLarge { len: 20, limit: 10 }),
            "body of 20 bytes exceeds 10 bytes"
        );
    }
}
