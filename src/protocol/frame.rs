//! Wire frame types
//!
//! Defines the self-delimited units of the wire protocol. Commands are
//! always arrays whose elements are all bulk strings.

use bytes::Bytes;
use std::fmt;

/// One frame of the wire protocol
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple strings: +OK\r\n
    Simple(String),

    /// Errors: -ERR message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n (the payload may be empty)
    Bulk(Bytes),

    /// Null bulk string: $-1\r\n
    NullBulk,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<Frame>),
}

impl Frame {
    /// Create a simple string frame
    pub fn simple(text: impl Into<String>) -> Self {
        Frame::Simple(text.into())
    }

    /// Create an error frame
    pub fn error(text: impl Into<String>) -> Self {
        Frame::Error(text.into())
    }

    /// Create an integer frame
    pub fn integer(value: i64) -> Self {
        Frame::Integer(value)
    }

    /// Create a bulk string frame
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    /// Create a command frame: an array of bulk strings
    pub fn command(parts: &[&str]) -> Self {
        Frame::Array(
            parts
                .iter()
                .map(|part| Frame::Bulk(Bytes::copy_from_slice(part.as_bytes())))
                .collect(),
        )
    }

    /// Try to extract array elements
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to extract bulk string bytes
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(text) => write!(f, "Simple({})", text),
            Frame::Error(text) => write!(f, "Error({})", text),
            Frame::Integer(value) => write!(f, "Integer({})", value),
            Frame::Bulk(data) => write!(f, "Bulk({} bytes)", data.len()),
            Frame::NullBulk => write!(f, "NullBulk"),
            Frame::Array(items) => write!(f, "Array({} elements)", items.len()),
        }
    }
}

/// Decoding errors for malformed wire data
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Unexpected type tag byte
    InvalidPrefix(u8),

    /// A "$" or "*" length that is not a decimal integer (or below -1)
    InvalidLength(String),

    /// An integer frame that does not hold a decimal integer
    InvalidInteger(String),

    /// Invalid UTF-8 in a textual frame
    InvalidUtf8,

    /// A line or bulk payload not terminated by CRLF
    BadTerminator,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidPrefix(byte) => {
                write!(f, "unexpected type prefix: 0x{:02x}", byte)
            }
            FrameError::InvalidLength(text) => write!(f, "invalid length: {:?}", text),
            FrameError::InvalidInteger(text) => write!(f, "invalid integer: {:?}", text),
            FrameError::InvalidUtf8 => write!(f, "invalid UTF-8 in text frame"),
            FrameError::BadTerminator => write!(f, "missing CRLF terminator"),
        }
    }
}

impl std::error::Error for FrameError {}
