//! Error types for sparkstate
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for sparkstate operations
pub type Result<T> = std::result::Result<T, SparkError>;

/// Main error type for sparkstate operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparkError {
    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Framing error
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors during payload decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Buffer ended before the record did
    #[error("Buffer too short at offset {offset}: need {needed} more bytes, have {available}")]
    BufferTooShort {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Varint ran past its maximum width
    #[error("Malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    /// A field carried a wire type the decoder cannot skip or interpret
    #[error("Unsupported wire type {wire_type} for field {field} at offset {offset}")]
    UnsupportedWireType {
        field: u32,
        wire_type: u8,
        offset: usize,
    },

    /// A length-delimited field was not valid UTF-8
    #[error("Invalid UTF-8 in string field at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// A DataSet cell or Template parameter declared a type that is not a
    /// valid scalar cell type, or its value slot was missing
    #[error("Invalid cell value for type tag {tag}")]
    InvalidCellValue { tag: u32 },

    /// A DataSet row held a different number of elements than the declared
    /// column count
    #[error("Row element count {actual} does not match declared column count {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },
}

/// Errors during payload encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// The value cannot be carried by the declared type's wire slot
    #[error("Value cannot be encoded as {datatype}: {reason}")]
    IncompatibleValue {
        datatype: &'static str,
        reason: &'static str,
    },
}

/// Errors while demultiplexing the framed byte stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    /// The stream ended inside a frame header or body
    #[error("Truncated frame at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The frame identifier was not valid UTF-8
    #[error("Invalid UTF-8 in frame identifier at offset {offset}")]
    InvalidIdentifier { offset: usize },

    /// The frame kind code was not one of the known kinds
    #[error("Unknown frame kind {kind} at offset {offset}")]
    UnknownKind { kind: u32, offset: usize },
}

/// Errors surfaced by a [`Transport`](crate::client::Transport) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The transport is not connected
    #[error("Transport is not connected")]
    NotConnected,

    /// Connecting to the remote host failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Sending on an established connection failed
    #[error("Send failed: {0}")]
    SendFailed(String),
}
