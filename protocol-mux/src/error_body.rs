//! Payload of an error response.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ParseError;

const FIXED_LEN: usize = 6;

/// Error response payload: `code:u16le errnum:u32le message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub error_num: u32,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: u16, error_num: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            error_num,
            message: message.into(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FIXED_LEN + self.message.len());
        buf.put_u16_le(self.code);
        buf.put_u32_le(self.error_num);
        buf.put_slice(self.message.as_bytes());
    }

    /// Decode an error payload. Invalid UTF-8 in the message is replaced.
    pub fn parse(mut data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < FIXED_LEN {
            return Err(ParseError::TruncatedErrorBody);
        }
        let code = data.get_u16_le();
        let error_num = data.get_u32_le();
        Ok(Self {
            code,
            error_num,
            message: String::from_utf8_lossy(data).into_owned(),
        })
    }
}
