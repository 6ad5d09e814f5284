//! Error types for multiplexed frame parsing.

/// Error type for frame parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// The connection did not start with the protocol preface.
    #[error("invalid connection preface")]
    BadPreface,

    /// The length field is smaller than the frame header itself.
    #[error("invalid frame length: {len}")]
    InvalidLength { len: u32 },

    /// The length field exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds {limit} bytes")]
    FrameTooLarge { len: u32, limit: usize },

    /// Unknown frame kind. The frame itself is well delimited.
    #[error("unknown frame kind: {kind:#04x}")]
    UnknownKind { kind: u8, id: u64, consumed: usize },

    /// Reserved header bits were set. The frame itself is well delimited.
    #[error("reserved bits set in frame {id}")]
    ReservedBits { id: u64, consumed: usize },

    /// An error payload was shorter than its fixed fields.
    #[error("truncated error body")]
    TruncatedErrorBody,
}

/// Error type for frame encoding operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The encoded frame would not fit the 32-bit length field or the
    /// configured maximum.
    #[error("frame of {len} bytes exceeds {limit} bytes")]
    FrameTooLarge { len: usize, limit: usize },
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }

    /// Returns true if the frame boundary is still known and parsing can
    /// continue after skipping [`consumed`](Self::consumed) bytes.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ParseError::UnknownKind { .. } | ParseError::ReservedBits { .. }
        )
    }

    /// Bytes to skip for a recoverable error.
    pub fn consumed(&self) -> Option<usize> {
        match self {
            ParseError::UnknownKind { consumed, .. } | ParseError::ReservedBits { consumed, .. } => {
                Some(*consumed)
            }
            _ => None,
        }
    }

    /// Message id of the offending frame, when the header could be read.
    pub fn message_id(&self) -> Option<u64> {
        match self {
            ParseError::UnknownKind { id, .. } | ParseError::ReservedBits { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_display() {
        let err = EncodeError::FrameTooLarge { len: 80, limit: 64 };
        assert_eq!(err.to_string(), "frame of 80 bytes exceeds 64 bytes");
    }

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::BadPreface.is_incomplete());
    }

    #[test]
    fn test_recoverable_errors_carry_id() {
        let err = ParseError::UnknownKind {
            kind: 9,
            id: 17,
            consumed: 32,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.consumed(), Some(32));
        assert_eq!(err.message_id(), Some(17));

        let err = ParseError::InvalidLength { len: 3 };
        assert!(!err.is_recoverable());
        assert_eq!(err.message_id(), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!(
                "{}",
                ParseError::UnknownKind {
                    kind: 0x42,
                    id: 1,
                    consumed: 16
                }
            ),
            "unknown frame kind: 0x42"
        );
        assert_eq!(
            format!(
                "{}",
                ParseError::FrameTooLarge {
                    len: 100,
                    limit: 64
                }
            ),
            "frame of 100 bytes exceeds 64 bytes"
        );
    }
}
