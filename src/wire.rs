//! Wire format types and utilities.

/// Wire types used in the Protocol Buffers binary encoding.
///
/// Wire types 3 and 4 delimit groups, a deprecated encoding that modern
/// schemas cannot declare. They are still understood on decode so that
/// group-encoded data from old emitters can be skipped or captured as
/// unknown fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer (LEB128).
    Varint = 0,
    /// Fixed 64-bit value (little-endian).
    Fixed64 = 1,
    /// Length-prefixed bytes.
    LengthDelimited = 2,
    /// Start of a group (deprecated).
    StartGroup = 3,
    /// End of a group (deprecated).
    EndGroup = 4,
    /// Fixed 32-bit value (little-endian).
    Fixed32 = 5,
}

impl WireType {
    /// Converts a u8 to a WireType.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Largest valid field number: 2^29 - 1.
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers 19000-19999 are reserved by the protobuf wire format.
pub const RESERVED_RANGE: std::ops::RangeInclusive<u32> = 19000..=19999;

/// Returns true if `number` may be declared by a schema.
pub fn is_valid_field_number(number: u32) -> bool {
    (1..=MAX_FIELD_NUMBER).contains(&number) && !RESERVED_RANGE.contains(&number)
}

/// Field tag containing field number and wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTag {
    pub field_number: u32,
    pub wire_type: WireType,
}

impl FieldTag {
    /// Creates a new field tag.
    pub fn new(field_number: u32, wire_type: WireType) -> Self {
        Self {
            field_number,
            wire_type,
        }
    }

    /// Encodes the field tag to its varint payload.
    pub fn encode(&self) -> u32 {
        (self.field_number << 3) | (self.wire_type as u32)
    }

    /// Decodes a tag varint into a field tag.
    ///
    /// Returns `None` for an unrecognized wire type, a field number of
    /// zero, or a field number above the 29-bit limit.
    pub fn decode(value: u64) -> Option<Self> {
        let wire_type = WireType::from_u8((value & 0x07) as u8)?;
        let field_number = value >> 3;
        if field_number == 0 || field_number > MAX_FIELD_NUMBER as u64 {
            return None;
        }
        Some(Self {
            field_number: field_number as u32,
            wire_type,
        })
    }
}

/// Encodes a signed integer using ZigZag encoding.
#[inline]
pub fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Encodes a signed 64-bit integer using ZigZag encoding.
#[inline]
pub fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Decodes a ZigZag encoded integer.
#[inline]
pub fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

/// Decodes a ZigZag encoded 64-bit integer.
#[inline]
pub fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
