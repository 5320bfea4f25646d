//! Per-format codec configuration.
//!
//! Plain immutable value structs: construct one, hand it to a codec
//! entry point by reference. Nothing here has side effects and a single
//! instance can serve any number of concurrent calls.

/// The default cap on message-within-message nesting while decoding.
/// Prevents hostile deeply nested input from overflowing the stack.
pub const DEFAULT_MESSAGE_DEPTH_LIMIT: usize = 100;

/// Options for binary wire format decoding.
#[derive(Debug, Clone, Copy)]
pub struct BinaryDecodingOptions {
    /// Maximum nesting of messages within messages (groups count too).
    pub message_depth_limit: usize,
    /// Capture unrecognized fields for re-encoding. When false they are
    /// validated and skipped, losing forward compatibility.
    pub preserve_unknown_fields: bool,
}

impl Default for BinaryDecodingOptions {
    fn default() -> Self {
        Self {
            message_depth_limit: DEFAULT_MESSAGE_DEPTH_LIMIT,
            preserve_unknown_fields: true,
        }
    }
}

/// Options for binary wire format encoding.
///
/// Currently empty: map ordering is always deterministic because map
/// slots are ordered, and unknown fields are always re-emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncodingOptions {}

/// Options for JSON decoding.
#[derive(Debug, Clone, Copy)]
pub struct JsonDecodingOptions {
    /// Silently skip unknown object members. On by default; turning it
    /// off makes an unknown member a [`JsonDecodingError::UnknownField`].
    ///
    /// [`JsonDecodingError::UnknownField`]: crate::error::JsonDecodingError::UnknownField
    pub ignore_unknown_fields: bool,
    /// Maximum nesting of messages within messages.
    pub message_depth_limit: usize,
}

impl Default for JsonDecodingOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_fields: true,
            message_depth_limit: DEFAULT_MESSAGE_DEPTH_LIMIT,
        }
    }
}

/// Options for JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncodingOptions {
    /// Print enum values as numbers even when a symbolic name exists.
    pub always_print_enums_as_ints: bool,
    /// Print implicit-presence fields that hold their default value.
    pub always_print_fields_with_no_presence: bool,
    /// Use the declared proto field names instead of lowerCamelCase.
    pub preserve_proto_field_names: bool,
}

/// Options for text-format decoding.
#[derive(Debug, Clone, Copy)]
pub struct TextFormatDecodingOptions {
    /// Maximum nesting of messages within messages.
    pub message_depth_limit: usize,
    /// Skip unknown field names instead of failing. Off by default; the
    /// text format is strict because skipping is lossy.
    pub ignore_unknown_fields: bool,
    /// Skip unresolved `[extension.name]` references instead of failing.
    pub ignore_unknown_extension_fields: bool,
}

impl Default for TextFormatDecodingOptions {
    fn default() -> Self {
        Self {
            message_depth_limit: DEFAULT_MESSAGE_DEPTH_LIMIT,
            ignore_unknown_fields: false,
            ignore_unknown_extension_fields: false,
        }
    }
}

/// Options for text-format encoding.
#[derive(Debug, Clone, Copy)]
pub struct TextFormatEncodingOptions {
    /// Render the whole message on one line, fields separated by spaces.
    pub compact: bool,
    /// Print unknown fields by number after the known fields.
    pub print_unknown_fields: bool,
}

impl Default for TextFormatEncodingOptions {
    fn default() -> Self {
        Self {
            compact: false,
            print_unknown_fields: true,
        }
    }
}
