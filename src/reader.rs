//! Low-level wire format reader.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::BinaryDecodingError;
use crate::wire::{FieldTag, WireType};

type Result<T> = std::result::Result<T, BinaryDecodingError>;

/// Maximum number of bytes for a varint-encoded uint64.
/// A uint64 has 64 bits and each varint byte encodes 7 bits,
/// so we need ceil(64/7) = 10 bytes maximum.
const MAX_VARINT_BYTES: usize = 10;

/// Reader decodes wire format primitives from a binary buffer.
pub struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            buffer: data,
            pos: 0,
        }
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Returns true if there is more data to read.
    pub fn has_more(&self) -> bool {
        self.pos < self.buffer.len()
    }

    /// Checks if there are enough bytes available.
    fn check_available(&self, needed: usize) -> Result<()> {
        if self.pos + needed > self.buffer.len() {
            return Err(BinaryDecodingError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Reads raw bytes.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        self.check_available(length)?;
        let bytes = &self.buffer[self.pos..self.pos + length];
        self.pos += length;
        Ok(bytes)
    }

    /// Reads an unsigned 64-bit varint (LEB128).
    ///
    /// At most 10 bytes; the 10th byte may only carry bit 63, anything
    /// more would overflow a uint64.
    pub fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_BYTES {
            self.check_available(1)?;
            let b = self.buffer[self.pos];
            self.pos += 1;

            if i == 9 && b > 1 {
                return Err(BinaryDecodingError::MalformedVarint { offset: start });
            }

            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(BinaryDecodingError::MalformedVarint { offset: start })
    }

    /// Reads a varint and narrows it to 32 bits, discarding high bits.
    ///
    /// Wire compatibility requires truncation here: other emitters encode
    /// negative int32 values as full 10-byte sign-extended varints.
    pub fn read_varint32(&mut self) -> Result<u32> {
        Ok(self.read_varint()? as u32)
    }

    /// Reads a length prefix and bounds-checks it against the remaining
    /// input before it is used, so hostile lengths cannot trigger huge
    /// allocations.
    pub fn read_length(&mut self) -> Result<usize> {
        let offset = self.pos;
        let raw = self.read_varint()?;
        if raw > self.remaining() as u64 {
            return Err(BinaryDecodingError::Truncated {
                offset,
                needed: raw as usize,
                available: self.remaining(),
            });
        }
        Ok(raw as usize)
    }

    /// Reads a field tag. Rejects field number zero and wire types 6-7.
    pub fn read_tag(&mut self) -> Result<FieldTag> {
        let offset = self.pos;
        let raw = self.read_varint()?;
        FieldTag::decode(raw).ok_or(BinaryDecodingError::InvalidTag { offset })
    }

    /// Reads a fixed 32-bit value (little-endian).
    pub fn read_fixed32(&mut self) -> Result<u32> {
        self.check_available(4)?;
        let mut slice = &self.buffer[self.pos..];
        let value = slice
            .read_u32::<LittleEndian>()
            .map_err(|_| BinaryDecodingError::Truncated {
                offset: self.pos,
                needed: 4,
                available: self.remaining(),
            })?;
        self.pos += 4;
        Ok(value)
    }

    /// Reads a fixed 64-bit value (little-endian).
    pub fn read_fixed64(&mut self) -> Result<u64> {
        self.check_available(8)?;
        let mut slice = &self.buffer[self.pos..];
        let value = slice
            .read_u64::<LittleEndian>()
            .map_err(|_| BinaryDecodingError::Truncated {
                offset: self.pos,
                needed: 8,
                available: self.remaining(),
            })?;
        self.pos += 8;
        Ok(value)
    }

    /// Reads a 32-bit float (IEEE 754, little-endian).
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads a 64-bit float (IEEE 754, little-endian).
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Reads a length-prefixed byte run.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8]> {
        let length = self.read_length()?;
        self.read_bytes(length)
    }

    /// Creates a sub-reader over the next `length` bytes.
    pub fn sub_reader(&mut self, length: usize) -> Result<Reader<'a>> {
        self.check_available(length)?;
        let sub = Reader::new(&self.buffer[self.pos..self.pos + length]);
        self.pos += length;
        Ok(sub)
    }

    /// Skips one value of the given wire type and returns the raw payload
    /// bytes, so callers can preserve them as unknown fields.
    ///
    /// For groups the returned slice spans the group body: everything
    /// between the start tag and its matching end tag, both exclusive.
    /// `depth_budget` bounds group nesting.
    pub fn skip_value(&mut self, tag: FieldTag, depth_budget: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        match tag.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.check_available(8)?;
                self.pos += 8;
            }
            WireType::LengthDelimited => {
                let length = self.read_length()?;
                self.pos += length;
            }
            WireType::Fixed32 => {
                self.check_available(4)?;
                self.pos += 4;
            }
            WireType::StartGroup => {
                self.skip_group(tag.field_number, depth_budget)?;
                // Exclude the end tag from the captured body.
                let body_end = self.end_tag_start(tag.field_number, start)?;
                return Ok(&self.buffer[start..body_end]);
            }
            WireType::EndGroup => {
                return Err(BinaryDecodingError::MalformedGroup {
                    field_number: tag.field_number,
                });
            }
        }
        Ok(&self.buffer[start..self.pos])
    }

    /// Consumes nested fields up to and including the matching end tag.
    fn skip_group(&mut self, field_number: u32, depth_budget: usize) -> Result<()> {
        if depth_budget == 0 {
            return Err(BinaryDecodingError::DepthLimitExceeded { limit: 0 });
        }
        loop {
            if !self.has_more() {
                return Err(BinaryDecodingError::MalformedGroup { field_number });
            }
            let tag = self.read_tag()?;
            match tag.wire_type {
                WireType::EndGroup => {
                    if tag.field_number != field_number {
                        return Err(BinaryDecodingError::MalformedGroup { field_number });
                    }
                    return Ok(());
                }
                WireType::StartGroup => {
                    self.skip_group(tag.field_number, depth_budget - 1)?;
                }
                _ => {
                    self.skip_value(tag, depth_budget - 1)?;
                }
            }
        }
    }

    /// Recomputes where the end tag of the just-skipped group begins.
    /// The end tag is `(field_number << 3) | 4` as a varint; its width is
    /// derived rather than re-scanned.
    fn end_tag_start(&self, field_number: u32, _body_start: usize) -> Result<usize> {
        let end_tag = FieldTag::new(field_number, WireType::EndGroup).encode() as u64;
        let mut width = 1;
        let mut v = end_tag >> 7;
        while v != 0 {
            width += 1;
            v >>= 7;
        }
        Ok(self.pos - width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_varint() {
        let mut reader = Reader::new(&[0]);
        assert_eq!(reader.read_varint().unwrap(), 0);

        let mut reader = Reader::new(&[1]);
        assert_eq!(reader.read_varint().unwrap(), 1);

        let mut reader = Reader::new(&[127]);
        assert_eq!(reader.read_varint().unwrap(), 127);

        let mut reader = Reader::new(&[0x80, 0x01]);
        assert_eq!(reader.read_varint().unwrap(), 128);

        let mut reader = Reader::new(&[0xac, 0x02]);
        assert_eq!(reader.read_varint().unwrap(), 300);
    }

    #[test]
    fn test_read_varint_max() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn test_read_varint_overflow() {
        // 11 continuation bytes.
        let bytes = [0x80u8; 11];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.read_varint(),
            Err(BinaryDecodingError::MalformedVarint { offset: 0 })
        ));

        // 10th byte carries more than bit 63.
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.read_varint(),
            Err(BinaryDecodingError::MalformedVarint { .. })
        ));
    }

    #[test]
    fn test_read_varint_truncated() {
        let mut reader = Reader::new(&[0x80]);
        assert!(matches!(
            reader.read_varint(),
            Err(BinaryDecodingError::Truncated { .. })
        ));
    }

    #[test]
    fn test_read_tag() {
        // Field 1, varint: 0x08.
        let mut reader = Reader::new(&[0x08]);
        let tag = reader.read_tag().unwrap();
        assert_eq!(tag.field_number, 1);
        assert_eq!(tag.wire_type, WireType::Varint);

        // Field 2, length-delimited: 0x12.
        let mut reader = Reader::new(&[0x12]);
        let tag = reader.read_tag().unwrap();
        assert_eq!(tag.field_number, 2);
        assert_eq!(tag.wire_type, WireType::LengthDelimited);

        // Field 1000, varint.
        let mut reader = Reader::new(&[0xc0, 0x3e]);
        let tag = reader.read_tag().unwrap();
        assert_eq!(tag.field_number, 1000);
    }

    #[test]
    fn test_read_tag_rejects_field_zero() {
        let mut reader = Reader::new(&[0x00]);
        assert!(matches!(
            reader.read_tag(),
            Err(BinaryDecodingError::InvalidTag { offset: 0 })
        ));
    }

    #[test]
    fn test_read_fixed() {
        let mut reader = Reader::new(&[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(reader.read_fixed32().unwrap(), 1);

        let mut reader = Reader::new(&[0xff; 8]);
        assert_eq!(reader.read_fixed64().unwrap(), u64::MAX);
    }

    #[test]
    fn test_read_length_delimited() {
        let mut reader = Reader::new(&[5, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(reader.read_length_delimited().unwrap(), b"hello");
    }

    #[test]
    fn test_hostile_length_prefix() {
        // Claims 2^32 bytes follow, with only one present.
        let mut reader = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x10, 0xaa]);
        assert!(matches!(
            reader.read_length_delimited(),
            Err(BinaryDecodingError::Truncated { .. })
        ));
    }

    #[test]
    fn test_skip_value_varint() {
        let mut reader = Reader::new(&[0xac, 0x02, 0x55]);
        let tag = FieldTag::new(1, WireType::Varint);
        let raw = reader.skip_value(tag, 10).unwrap();
        assert_eq!(raw, &[0xac, 0x02]);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_skip_value_group() {
        // Group body: field 1 varint 5. Then end tag for field 3.
        // Start tag is consumed by the caller before skip_value.
        let bytes = [0x08, 0x05, 0x1c];
        let mut reader = Reader::new(&bytes);
        let tag = FieldTag::new(3, WireType::StartGroup);
        let raw = reader.skip_value(tag, 10).unwrap();
        assert_eq!(raw, &[0x08, 0x05]);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_skip_unterminated_group() {
        let bytes = [0x08, 0x05];
        let mut reader = Reader::new(&bytes);
        let tag = FieldTag::new(3, WireType::StartGroup);
        assert!(matches!(
            reader.skip_value(tag, 10),
            Err(BinaryDecodingError::MalformedGroup { field_number: 3 })
        ));
    }

    #[test]
    fn test_stray_end_group() {
        let mut reader = Reader::new(&[]);
        let tag = FieldTag::new(3, WireType::EndGroup);
        assert!(reader.skip_value(tag, 10).is_err());
    }

    #[test]
    fn test_sub_reader() {
        let mut reader = Reader::new(&[1, 2, 3, 4]);
        let mut sub = reader.sub_reader(2).unwrap();
        assert_eq!(sub.read_varint().unwrap(), 1);
        assert_eq!(sub.read_varint().unwrap(), 2);
        assert!(!sub.has_more());
        assert_eq!(reader.position(), 2);
    }
}
