//! Low-level wire format writer.
//!
//! Writing into a growable buffer cannot fail, so unlike the decode
//! path every method here is infallible. Encode-time contract checks
//! live in the message-level codec.

use crate::wire::{zigzag_encode_32, zigzag_encode_64, FieldTag, WireType};

const INITIAL_CAPACITY: usize = 256;

/// Writer encodes wire format primitives into a binary buffer.
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    /// Creates a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the current length of the buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the encoded bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a field tag.
    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) {
        self.write_varint(FieldTag::new(field_number, wire_type).encode() as u64);
    }

    /// Writes raw bytes.
    pub fn write_raw_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Writes an unsigned varint (LEB128).
    pub fn write_varint(&mut self, mut value: u64) {
        while value > 0x7f {
            self.buffer.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    /// Writes an i64 as a varint, sign-extended to the full ten bytes
    /// when negative (wire compatibility for int32/int64 fields).
    pub fn write_varint_signed(&mut self, value: i64) {
        self.write_varint(value as u64);
    }

    /// Writes a signed varint using ZigZag encoding.
    pub fn write_svarint32(&mut self, value: i32) {
        self.write_varint(zigzag_encode_32(value) as u64);
    }

    /// Writes a signed 64-bit varint using ZigZag encoding.
    pub fn write_svarint64(&mut self, value: i64) {
        self.write_varint(zigzag_encode_64(value));
    }

    /// Writes a boolean.
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(if value { 1 } else { 0 });
    }

    /// Writes a fixed 32-bit value (little-endian).
    pub fn write_fixed32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a fixed 64-bit value (little-endian).
    pub fn write_fixed64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a 32-bit float (IEEE 754, little-endian).
    pub fn write_float(&mut self, value: f32) {
        self.write_fixed32(value.to_bits());
    }

    /// Writes a 64-bit float (IEEE 754, little-endian).
    pub fn write_double(&mut self, value: f64) {
        self.write_fixed64(value.to_bits());
    }

    /// Writes a length-prefixed byte run.
    pub fn write_length_delimited(&mut self, data: &[u8]) {
        self.write_varint(data.len() as u64);
        self.buffer.extend_from_slice(data);
    }

    /// Writes a length-prefixed string.
    pub fn write_string(&mut self, value: &str) {
        self.write_length_delimited(value.as_bytes());
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}
