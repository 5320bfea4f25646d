//! Error types for Wireberry operations.

use thiserror::Error;

/// Error raised while constructing a field catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Field number outside 1..=536870911 or inside the reserved range.
    #[error("invalid field number {number} in {message_type}")]
    InvalidFieldNumber { message_type: String, number: u32 },

    /// Two fields share a number.
    #[error("duplicate field number {number} in {message_type}")]
    DuplicateFieldNumber { message_type: String, number: u32 },

    /// Two fields share a proto or JSON name.
    #[error("duplicate field name {name:?} in {message_type}")]
    DuplicateFieldName { message_type: String, name: String },

    /// A oneof index points past the declared oneof list.
    #[error("field {number} in {message_type} references undeclared oneof {index}")]
    UnknownOneof {
        message_type: String,
        number: u32,
        index: usize,
    },
}

/// Error raised by binary wire format decoding.
///
/// Terminal for the given input: a failed decode discards all partial
/// state and the caller must supply different bytes to succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryDecodingError {
    /// Input ended before the current value was complete.
    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Varint ran past its 10-byte limit or overflowed its target width.
    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    /// Tag carried an unrecognized wire type or field number zero.
    #[error("invalid field tag at offset {offset}")]
    InvalidTag { offset: usize },

    /// A string field held invalid UTF-8.
    #[error("invalid UTF-8 in string field {field_number}")]
    InvalidUtf8 { field_number: u32 },

    /// Message nesting exceeded the configured depth limit.
    #[error("message nesting exceeds depth limit {limit}")]
    DepthLimitExceeded { limit: usize },

    /// A group was opened but never closed, or closed with the wrong number.
    #[error("malformed group for field {field_number}")]
    MalformedGroup { field_number: u32 },
}

/// Error raised by JSON decoding.
#[derive(Error, Debug)]
pub enum JsonDecodingError {
    /// The input was not syntactically valid JSON.
    #[error("malformed JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The JSON value has the wrong shape for the target field.
    #[error("field {field:?} of {message_type}: expected {expected}, found {found}")]
    TypeMismatch {
        message_type: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Unknown member name and `ignore_unknown_fields` is off.
    #[error("unknown field {field:?} in {message_type}")]
    UnknownField { message_type: String, field: String },

    /// Two members of the same oneof appeared in one object.
    #[error("multiple values for oneof {oneof:?} in {message_type}")]
    DuplicateOneof { message_type: String, oneof: String },

    /// A bytes field held invalid base64.
    #[error("invalid base64 in field {field:?}")]
    InvalidBase64 { field: String },

    /// A numeric literal was out of range for its field.
    #[error("number out of range for field {field:?}")]
    NumberOutOfRange { field: String },

    /// An enum name was not declared and the value was not numeric.
    #[error("unknown enum value {value:?} for {enum_type}")]
    UnknownEnumValue { enum_type: String, value: String },

    /// A well-known type payload did not match its bespoke format.
    #[error("invalid {type_name} value: {reason}")]
    InvalidWellKnownType {
        type_name: &'static str,
        reason: String,
    },

    /// Message nesting exceeded the configured depth limit.
    #[error("message nesting exceeds depth limit {limit}")]
    DepthLimitExceeded { limit: usize },
}

/// Where in the input text a decoding failure occurred. 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for TextPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error raised by text-format decoding, with the position of the fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {position}")]
pub struct TextFormatDecodingError {
    pub kind: TextFormatErrorKind,
    pub position: TextPosition,
}

/// The failure classes of the text-format parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextFormatErrorKind {
    #[error("unknown field {field:?} in {message_type}")]
    UnknownField { message_type: String, field: String },

    #[error("unresolved extension {name:?} for {message_type}")]
    UnknownExtension { message_type: String, name: String },

    #[error("unknown enum value {value:?} for {enum_type}")]
    UnknownEnumValue { enum_type: String, value: String },

    #[error("number out of range")]
    NumberOutOfRange,

    #[error("malformed number")]
    MalformedNumber,

    #[error("malformed escape sequence")]
    MalformedEscape,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("expected {0}")]
    Expected(&'static str),

    #[error("multiple values for oneof {oneof:?}")]
    DuplicateOneof { oneof: String },

    #[error("field number {number} cannot carry this value shape")]
    UnrepresentableUnknownField { number: u32 },

    #[error("message nesting exceeds depth limit {limit}")]
    DepthLimitExceeded { limit: usize },
}

/// Error raised when registering an extension under a key that is
/// already taken. Registration is reject-on-duplicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("extension {field_number} already registered on {extended_type}")]
pub struct DuplicateExtensionError {
    pub extended_type: String,
    pub field_number: u32,
}

/// Error raised when an encoder's own invariants are violated.
///
/// Encoding a message obtained by decoding never fails; seeing this
/// error means a value was stored that contradicts its descriptor, or a
/// well-known type holds an unrepresentable value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Stored value's variant does not match the field's declared type.
    #[error("field {field_number} of {message_type} holds a value of the wrong type")]
    ValueTypeMismatch {
        message_type: String,
        field_number: u32,
    },

    /// Timestamp outside 0001-01-01..9999-12-31 or nanos out of range.
    #[error("timestamp out of range: seconds={seconds} nanos={nanos}")]
    TimestampOutOfRange { seconds: i64, nanos: i32 },

    /// Duration outside +-315,576,000,000 seconds or inconsistent signs.
    #[error("duration out of range: seconds={seconds} nanos={nanos}")]
    DurationOutOfRange { seconds: i64, nanos: i32 },
}

/// Error raised by delimited streaming reads and writes.
#[derive(Error, Debug)]
pub enum DelimitedError {
    /// IO error from the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame length prefix was malformed.
    #[error("malformed length prefix")]
    MalformedLength,

    /// Frame claimed a length above the configured maximum.
    #[error("message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Stream ended inside a frame.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The framed payload failed to decode.
    #[error(transparent)]
    Decode(#[from] BinaryDecodingError),

    /// The outgoing message failed to encode.
    #[error(transparent)]
    Encode(#[from] SerializationError),
}
