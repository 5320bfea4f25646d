//! Wireberry - Protocol Buffers runtime codecs over a dynamic value model
//!
//! Messages are dynamic values driven by statically-declared field
//! catalogs; three codecs (binary wire format, canonical JSON, debug
//! text format) convert between them and bytes or text. Fields the
//! catalog does not declare are resolved through an [`ExtensionRegistry`]
//! or preserved byte-identically in the unknown-field store.
//!
//! # Example
//!
//! ```rust
//! use wireberry::{
//!     BinaryDecodingOptions, BinaryEncodingOptions, ExtensionRegistry, FieldDescriptor,
//!     FieldType, Message, MessageDescriptor, Value, binary,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let desc = MessageDescriptor::new("example.Greeting");
//!     desc.set_fields(vec![
//!         FieldDescriptor::singular(1, "text", FieldType::String),
//!         FieldDescriptor::repeated(2, "counts", FieldType::Int32),
//!     ])?;
//!
//!     let message = Message::build(desc.clone(), |m| {
//!         m.set(1, Value::String("hello".into()));
//!         for v in [1, 2, 3] {
//!             m.push(2, Value::Int32(v));
//!         }
//!     });
//!
//!     let bytes = binary::encode(&message, &BinaryEncodingOptions::default())?;
//!     assert_eq!(bytes[0], 0x0a); // field 1, length-delimited
//!
//!     let registry = ExtensionRegistry::new();
//!     let decoded = binary::decode(desc, &bytes, &registry, &BinaryDecodingOptions::default())?;
//!     assert_eq!(decoded, message);
//!     Ok(())
//! }
//! ```

pub mod binary;
pub mod delimited;
mod descriptor;
mod error;
mod extensions;
pub mod json;
mod options;
mod reader;
pub mod text;
mod unknown;
mod value;
mod wire;
mod wkt;
mod writer;

pub use delimited::{DelimitedReader, DelimitedWriter};
pub use descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, FieldType, MapKeyType, MessageDescriptor,
    OneofDescriptor,
};
pub use error::{
    BinaryDecodingError, DelimitedError, DescriptorError, DuplicateExtensionError,
    JsonDecodingError, SerializationError, TextFormatDecodingError, TextFormatErrorKind,
    TextPosition,
};
pub use extensions::{ExtensionDescriptor, ExtensionRegistry};
pub use options::{
    BinaryDecodingOptions, BinaryEncodingOptions, JsonDecodingOptions, JsonEncodingOptions,
    TextFormatDecodingOptions, TextFormatEncodingOptions, DEFAULT_MESSAGE_DEPTH_LIMIT,
};
pub use reader::Reader;
pub use unknown::{UnknownField, UnknownFields};
pub use value::{ExtensionValue, FieldValue, MapKey, Message, Value};
pub use wire::{FieldTag, WireType, MAX_FIELD_NUMBER};
pub use writer::Writer;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
