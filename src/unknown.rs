//! Ordered storage for wire data the schema could not interpret.

use crate::wire::WireType;
use crate::writer::Writer;

/// One raw record captured during decode: the field number, the wire
/// type it arrived with, and the untouched payload bytes.
///
/// For groups the payload is the group body (everything between the
/// start and end tags); re-encoding regenerates both tags around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub number: u32,
    pub wire_type: WireType,
    pub bytes: Vec<u8>,
}

/// Ordered sequence of unrecognized field records.
///
/// Re-encoding a message emits these byte-identically, in capture order,
/// after all known fields. Unknown fields have no JSON representation
/// and are dropped by the JSON encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFields {
    records: Vec<UnknownField>,
}

impl UnknownFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Appends a captured record.
    pub fn push(&mut self, number: u32, wire_type: WireType, bytes: Vec<u8>) {
        self.records.push(UnknownField {
            number,
            wire_type,
            bytes,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnknownField> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Appends all records from `other`, preserving both orders.
    pub fn merge(&mut self, other: &UnknownFields) {
        self.records.extend(other.records.iter().cloned());
    }

    /// Re-emits every record onto the wire, byte-identically.
    pub fn encode_into(&self, writer: &mut Writer) {
        for record in &self.records {
            writer.write_tag(record.number, record.wire_type);
            match record.wire_type {
                WireType::LengthDelimited => writer.write_length_delimited(&record.bytes),
                WireType::StartGroup => {
                    writer.write_raw_bytes(&record.bytes);
                    writer.write_tag(record.number, WireType::EndGroup);
                }
                _ => writer.write_raw_bytes(&record.bytes),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reencode_varint_record() {
        let mut unknown = UnknownFields::new();
        unknown.push(7, WireType::Varint, vec![0xac, 0x02]);

        let mut writer = Writer::new();
        unknown.encode_into(&mut writer);
        // Tag (7 << 3) | 0 = 0x38, then the original varint bytes.
        assert_eq!(writer.as_bytes(), &[0x38, 0xac, 0x02]);
    }

    #[test]
    fn test_reencode_length_delimited_record() {
        let mut unknown = UnknownFields::new();
        unknown.push(1, WireType::LengthDelimited, b"abc".to_vec());

        let mut writer = Writer::new();
        unknown.encode_into(&mut writer);
        assert_eq!(writer.as_bytes(), &[0x0a, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_reencode_group_record() {
        let mut unknown = UnknownFields::new();
        // Group body: field 1 varint 5.
        unknown.push(3, WireType::StartGroup, vec![0x08, 0x05]);

        let mut writer = Writer::new();
        unknown.encode_into(&mut writer);
        // Start tag 0x1b, body, end tag 0x1c.
        assert_eq!(writer.as_bytes(), &[0x1b, 0x08, 0x05, 0x1c]);
    }

    #[test]
    fn test_order_preserved() {
        let mut unknown = UnknownFields::new();
        unknown.push(9, WireType::Varint, vec![1]);
        unknown.push(4, WireType::Fixed32, vec![0, 0, 0, 0]);
        let numbers: Vec<u32> = unknown.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![9, 4]);
    }
}
