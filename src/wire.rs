//! Low-level wire primitives
//!
//! Varints, field keys, and length-delimited records for the payload
//! envelope. The envelope is a protobuf-compatible tagged format: each field
//! is keyed by `(field_number << 3) | wire_type`, and unknown fields must be
//! skippable by wire type so newer publishers do not break older consumers.

use crate::error::DecodeError;

/// Wire type: value is a varint.
pub const WIRE_VARINT: u8 = 0;
/// Wire type: value is 8 little-endian bytes.
pub const WIRE_FIXED64: u8 = 1;
/// Wire type: value is a varint length followed by that many bytes.
pub const WIRE_LEN: u8 = 2;
/// Wire type: value is 4 little-endian bytes.
pub const WIRE_FIXED32: u8 = 5;

/// Append-only writer for wire records.
///
/// Length-delimited sub-records are written by encoding the inner record into
/// its own writer and then emitting the bytes, so lengths never need
/// back-patching.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        WireWriter::default()
    }

    /// Consume the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn write_key(&mut self, field: u32, wire_type: u8) {
        self.write_raw_varint(u64::from(field << 3 | u32::from(wire_type)));
    }

    fn write_raw_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Write a varint field.
    pub fn varint(&mut self, field: u32, value: u64) {
        self.write_key(field, WIRE_VARINT);
        self.write_raw_varint(value);
    }

    /// Write a boolean field as a varint.
    pub fn boolean(&mut self, field: u32, value: bool) {
        self.varint(field, u64::from(value));
    }

    /// Write a 32-bit float field.
    pub fn fixed32(&mut self, field: u32, value: f32) {
        self.write_key(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a 64-bit float field.
    pub fn fixed64(&mut self, field: u32, value: f64) {
        self.write_key(field, WIRE_FIXED64);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-delimited byte field.
    pub fn bytes(&mut self, field: u32, value: &[u8]) {
        self.write_key(field, WIRE_LEN);
        self.write_raw_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Write a length-delimited UTF-8 string field.
    pub fn string(&mut self, field: u32, value: &str) {
        self.bytes(field, value.as_bytes());
    }

    /// Write a nested record field from an already-encoded inner writer.
    pub fn record(&mut self, field: u32, inner: WireWriter) {
        self.bytes(field, &inner.buf);
    }
}

/// A decoded field key plus enough context to read or skip its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    pub field: u32,
    pub wire_type: u8,
}

/// Cursor-based reader over one wire record.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        WireReader { data, offset: 0 }
    }

    /// Bytes remaining in this record.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Current byte offset, for diagnostics.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn short(&self, needed: usize) -> DecodeError {
        DecodeError::BufferTooShort {
            offset: self.offset,
            needed,
            available: self.remaining(),
        }
    }

    /// Read the next field key, or `None` at end of record.
    pub fn next_key(&mut self) -> Result<Option<FieldKey>, DecodeError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let key = self.varint()?;
        Ok(Some(FieldKey {
            field: (key >> 3) as u32,
            wire_type: (key & 0x7) as u8,
        }))
    }

    /// Read a varint value.
    pub fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset;
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            if self.is_at_end() {
                return Err(self.short(1));
            }
            // A valid 64-bit varint is at most 10 bytes.
            if shift >= 70 {
                return Err(DecodeError::MalformedVarint { offset: start });
            }
            let byte = self.data[self.offset];
            self.offset += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a 32-bit little-endian float.
    pub fn fixed32(&mut self) -> Result<f32, DecodeError> {
        if self.remaining() < 4 {
            return Err(self.short(4));
        }
        let bytes: [u8; 4] = self.data[self.offset..self.offset + 4].try_into().unwrap();
        self.offset += 4;
        Ok(f32::from_le_bytes(bytes))
    }

    /// Read a 64-bit little-endian float.
    pub fn fixed64(&mut self) -> Result<f64, DecodeError> {
        if self.remaining() < 8 {
            return Err(self.short(8));
        }
        let bytes: [u8; 8] = self.data[self.offset..self.offset + 8].try_into().unwrap();
        self.offset += 8;
        Ok(f64::from_le_bytes(bytes))
    }

    /// Read a length-delimited byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.varint()? as usize;
        if self.remaining() < len {
            return Err(self.short(len));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Read a length-delimited UTF-8 string.
    pub fn string(&mut self) -> Result<String, DecodeError> {
        let start = self.offset;
        let slice = self.bytes()?;
        std::str::from_utf8(slice)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: start })
    }

    /// Skip a field value by wire type. Unknown fields are tolerated;
    /// unknown wire types are not.
    pub fn skip(&mut self, key: FieldKey) -> Result<(), DecodeError> {
        match key.wire_type {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.fixed64()?;
            }
            WIRE_LEN => {
                self.bytes()?;
            }
            WIRE_FIXED32 => {
                self.fixed32()?;
            }
            other => {
                return Err(DecodeError::UnsupportedWireType {
                    field: key.field,
                    wire_type: other,
                    offset: self.offset,
                })
            }
        }
        Ok(())
    }
}

/// Field numbers for every record in the payload envelope.
///
/// These are part of the wire contract; both encoder and decoder read from
/// this table so the two sides cannot drift.
pub(crate) mod fields {
    pub mod payload {
        pub const TIMESTAMP: u32 = 1;
        pub const METRICS: u32 = 2;
        pub const SEQ: u32 = 3;
        pub const UUID: u32 = 4;
        pub const BODY: u32 = 5;
    }

    pub mod metric {
        pub const NAME: u32 = 1;
        pub const ALIAS: u32 = 2;
        pub const TIMESTAMP: u32 = 3;
        pub const DATATYPE: u32 = 4;
        pub const IS_HISTORICAL: u32 = 5;
        pub const IS_TRANSIENT: u32 = 6;
        pub const IS_NULL: u32 = 7;
        pub const METADATA: u32 = 8;
        pub const PROPERTIES: u32 = 9;
        pub const INT_VALUE: u32 = 10;
        pub const LONG_VALUE: u32 = 11;
        pub const FLOAT_VALUE: u32 = 12;
        pub const DOUBLE_VALUE: u32 = 13;
        pub const BOOLEAN_VALUE: u32 = 14;
        pub const STRING_VALUE: u32 = 15;
        pub const BYTES_VALUE: u32 = 16;
        pub const DATASET_VALUE: u32 = 17;
        pub const TEMPLATE_VALUE: u32 = 18;
    }

    pub mod property_value {
        pub const TYPE: u32 = 1;
        pub const IS_NULL: u32 = 2;
        pub const INT_VALUE: u32 = 3;
        pub const LONG_VALUE: u32 = 4;
        pub const FLOAT_VALUE: u32 = 5;
        pub const DOUBLE_VALUE: u32 = 6;
        pub const BOOLEAN_VALUE: u32 = 7;
        pub const STRING_VALUE: u32 = 8;
        pub const PROPERTYSET_VALUE: u32 = 9;
        pub const PROPERTYSETS_VALUE: u32 = 10;
    }

    pub mod property_set {
        pub const KEYS: u32 = 1;
        pub const VALUES: u32 = 2;
    }

    pub mod property_set_list {
        pub const PROPERTYSET: u32 = 1;
    }

    pub mod dataset {
        pub const NUM_OF_COLUMNS: u32 = 1;
        pub const COLUMNS: u32 = 2;
        pub const TYPES: u32 = 3;
        pub const ROWS: u32 = 4;
    }

    pub mod row {
        pub const ELEMENTS: u32 = 1;
    }

    pub mod dataset_value {
        pub const INT_VALUE: u32 = 1;
        pub const LONG_VALUE: u32 = 2;
        pub const FLOAT_VALUE: u32 = 3;
        pub const DOUBLE_VALUE: u32 = 4;
        pub const BOOLEAN_VALUE: u32 = 5;
        pub const STRING_VALUE: u32 = 6;
    }

    pub mod template {
        pub const VERSION: u32 = 1;
        pub const METRICS: u32 = 2;
        pub const PARAMETERS: u32 = 3;
        pub const TEMPLATE_REF: u32 = 4;
        pub const IS_DEFINITION: u32 = 5;
    }

    pub mod parameter {
        pub const NAME: u32 = 1;
        pub const TYPE: u32 = 2;
        pub const INT_VALUE: u32 = 3;
        pub const LONG_VALUE: u32 = 4;
        pub const FLOAT_VALUE: u32 = 5;
        pub const DOUBLE_VALUE: u32 = 6;
        pub const BOOLEAN_VALUE: u32 = 7;
        pub const STRING_VALUE: u32 = 8;
    }

    pub mod metadata {
        pub const IS_MULTI_PART: u32 = 1;
        pub const CONTENT_TYPE: u32 = 2;
        pub const SIZE: u32 = 3;
        pub const SEQ: u32 = 4;
        pub const FILE_NAME: u32 = 5;
        pub const FILE_TYPE: u32 = 6;
        pub const MD5: u32 = 7;
        pub const DESCRIPTION: u32 = 8;
    }
}
