//! Binary wire format codec: between [`Message`] values and the
//! standard Protocol Buffers encoding.
//!
//! Decoding is strictly transactional: the result message is built off
//! to the side and returned only when the whole input parsed, so a
//! malformed byte deep into the input never leaks partial state.

use std::sync::Arc;

use tracing::trace;

use crate::descriptor::{FieldKind, FieldType, MapKeyType, MessageDescriptor};
use crate::error::{BinaryDecodingError, SerializationError};
use crate::extensions::ExtensionRegistry;
use crate::options::{BinaryDecodingOptions, BinaryEncodingOptions};
use crate::reader::Reader;
use crate::unknown::UnknownFields;
use crate::value::{ExtensionValue, FieldValue, MapKey, Message, Value};
use crate::wire::{zigzag_decode_32, zigzag_decode_64, FieldTag, WireType};
use crate::writer::Writer;

/// Encodes a message to the binary wire format.
///
/// Never fails for a message obtained by decoding; an error means a
/// stored value contradicts its descriptor.
pub fn encode(
    message: &Message,
    _options: &BinaryEncodingOptions,
) -> Result<Vec<u8>, SerializationError> {
    let mut writer = Writer::new();
    encode_into(message, &mut writer)?;
    Ok(writer.into_bytes())
}

fn encode_into(message: &Message, writer: &mut Writer) -> Result<(), SerializationError> {
    // Declared fields and extension values interleave in ascending
    // field-number order; both stores iterate sorted already.
    let mut fields = message.fields().peekable();
    let mut extensions = message.extension_values().peekable();
    loop {
        let take_field = match (fields.peek(), extensions.peek()) {
            (Some((n, _)), Some(ext)) => *n <= ext.descriptor.number,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_field {
            if let Some((number, slot)) = fields.next() {
                let field = message.descriptor().field(number).ok_or_else(|| {
                    SerializationError::ValueTypeMismatch {
                        message_type: message.descriptor().full_name().to_string(),
                        field_number: number,
                    }
                })?;
                encode_slot(writer, message, number, &field.kind, slot)?;
            }
        } else if let Some(ext) = extensions.next() {
            encode_slot(writer, message, ext.descriptor.number, &ext.descriptor.kind, &ext.value)?;
        }
    }
    message.unknown_fields().encode_into(writer);
    Ok(())
}

fn encode_slot(
    writer: &mut Writer,
    message: &Message,
    number: u32,
    kind: &FieldKind,
    slot: &FieldValue,
) -> Result<(), SerializationError> {
    let mismatch = || SerializationError::ValueTypeMismatch {
        message_type: message.descriptor().full_name().to_string(),
        field_number: number,
    };
    match (kind, slot) {
        (
            FieldKind::Singular {
                field_type,
                explicit_presence,
            },
            FieldValue::Single(value),
        ) => {
            // Implicit-presence scalars omit their zero value.
            if !explicit_presence && value.is_default() {
                return Ok(());
            }
            encode_tagged_value(writer, number, field_type, value, mismatch)
        }
        (FieldKind::Repeated { field_type, packed }, FieldValue::Repeated(values)) => {
            if values.is_empty() {
                return Ok(());
            }
            if *packed && field_type.is_packable() {
                let mut body = Writer::new();
                for value in values {
                    encode_scalar(&mut body, field_type, value, mismatch)?;
                }
                writer.write_tag(number, WireType::LengthDelimited);
                writer.write_length_delimited(body.as_bytes());
            } else {
                for value in values {
                    encode_tagged_value(writer, number, field_type, value, mismatch)?;
                }
            }
            Ok(())
        }
        (
            FieldKind::Map {
                key_type,
                value_type,
            },
            FieldValue::Map(entries),
        ) => {
            for (key, value) in entries {
                let mut entry = Writer::new();
                encode_map_key(&mut entry, *key_type, key, mismatch)?;
                if matches!(value_type, FieldType::Message(_)) || !value.is_default() {
                    encode_tagged_value(&mut entry, 2, value_type, value, mismatch)?;
                }
                writer.write_tag(number, WireType::LengthDelimited);
                writer.write_length_delimited(entry.as_bytes());
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

fn encode_map_key(
    writer: &mut Writer,
    key_type: MapKeyType,
    key: &MapKey,
    mismatch: impl Fn() -> SerializationError + Copy,
) -> Result<(), SerializationError> {
    let field_type = key_type.as_field_type();
    let value = match key {
        MapKey::Int32(v) => Value::Int32(*v),
        MapKey::Int64(v) => Value::Int64(*v),
        MapKey::UInt32(v) => Value::UInt32(*v),
        MapKey::UInt64(v) => Value::UInt64(*v),
        MapKey::Bool(v) => Value::Bool(*v),
        MapKey::String(v) => Value::String(v.clone()),
    };
    if !value.is_default() {
        encode_tagged_value(writer, 1, &field_type, &value, mismatch)?;
    }
    Ok(())
}

fn encode_tagged_value(
    writer: &mut Writer,
    number: u32,
    field_type: &FieldType,
    value: &Value,
    mismatch: impl Fn() -> SerializationError + Copy,
) -> Result<(), SerializationError> {
    writer.write_tag(number, field_type.wire_type());
    match (field_type, value) {
        (FieldType::String, Value::String(v)) => {
            writer.write_string(v);
            Ok(())
        }
        (FieldType::Bytes, Value::Bytes(v)) => {
            writer.write_length_delimited(v);
            Ok(())
        }
        (FieldType::Message(_), Value::Message(nested)) => {
            let mut body = Writer::new();
            encode_into(nested, &mut body)?;
            writer.write_length_delimited(body.as_bytes());
            Ok(())
        }
        _ => encode_scalar(writer, field_type, value, mismatch),
    }
}

/// Encodes the untagged payload of a numeric/bool/enum value.
fn encode_scalar(
    writer: &mut Writer,
    field_type: &FieldType,
    value: &Value,
    mismatch: impl Fn() -> SerializationError,
) -> Result<(), SerializationError> {
    match (field_type, value) {
        (FieldType::Double, Value::Double(v)) => writer.write_double(*v),
        (FieldType::Float, Value::Float(v)) => writer.write_float(*v),
        (FieldType::Int32, Value::Int32(v)) => writer.write_varint_signed(*v as i64),
        (FieldType::Int64, Value::Int64(v)) => writer.write_varint_signed(*v),
        (FieldType::UInt32, Value::UInt32(v)) => writer.write_varint(*v as u64),
        (FieldType::UInt64, Value::UInt64(v)) => writer.write_varint(*v),
        (FieldType::SInt32, Value::Int32(v)) => writer.write_svarint32(*v),
        (FieldType::SInt64, Value::Int64(v)) => writer.write_svarint64(*v),
        (FieldType::Fixed32, Value::UInt32(v)) => writer.write_fixed32(*v),
        (FieldType::Fixed64, Value::UInt64(v)) => writer.write_fixed64(*v),
        (FieldType::SFixed32, Value::Int32(v)) => writer.write_fixed32(*v as u32),
        (FieldType::SFixed64, Value::Int64(v)) => writer.write_fixed64(*v as u64),
        (FieldType::Bool, Value::Bool(v)) => writer.write_bool(*v),
        (FieldType::Enum(_), Value::Enum(v)) => writer.write_varint_signed(*v as i64),
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Decodes a message from the binary wire format.
///
/// Field numbers not in the catalog are resolved through `registry`;
/// still-unresolved data lands in the unknown-field store (unless
/// `preserve_unknown_fields` is off, in which case it is validated and
/// dropped).
pub fn decode(
    descriptor: Arc<MessageDescriptor>,
    bytes: &[u8],
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
) -> Result<Message, BinaryDecodingError> {
    let mut reader = Reader::new(bytes);
    decode_message(
        &mut reader,
        descriptor,
        registry,
        options,
        options.message_depth_limit,
    )
}

fn depth_error(options: &BinaryDecodingOptions) -> BinaryDecodingError {
    BinaryDecodingError::DepthLimitExceeded {
        limit: options.message_depth_limit,
    }
}

fn decode_message(
    reader: &mut Reader<'_>,
    descriptor: Arc<MessageDescriptor>,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<Message, BinaryDecodingError> {
    let mut message = Message::new(descriptor.clone());
    while reader.has_more() {
        let tag = reader.read_tag()?;
        if tag.wire_type == WireType::EndGroup {
            return Err(BinaryDecodingError::MalformedGroup {
                field_number: tag.field_number,
            });
        }

        if let Some(field) = descriptor.field(tag.field_number) {
            let kind = field.kind.clone();
            if decode_known_field(reader, &mut message, tag, &kind, registry, options, depth)? {
                continue;
            }
        } else if let Some(ext) = registry.lookup(descriptor.full_name(), tag.field_number) {
            let ext = ext.clone();
            trace!(
                extended_type = descriptor.full_name(),
                number = tag.field_number,
                "resolved extension field"
            );
            if decode_extension_field(reader, &mut message, tag, &ext, registry, options, depth)? {
                continue;
            }
        }

        // Unrecognized number, or recognized but with a foreign wire
        // type: preserve the raw bytes for re-encoding.
        let raw = reader.skip_value(tag, depth)?;
        if options.preserve_unknown_fields {
            trace!(number = tag.field_number, wire_type = ?tag.wire_type, "captured unknown field");
            message
                .unknown_fields_mut()
                .push(tag.field_number, tag.wire_type, raw.to_vec());
        }
    }
    Ok(message)
}

/// Decodes one occurrence of a declared field. Returns false when the
/// wire type does not fit the declaration, in which case the caller
/// captures the value as an unknown field instead.
#[allow(clippy::too_many_arguments)]
fn decode_known_field(
    reader: &mut Reader<'_>,
    message: &mut Message,
    tag: FieldTag,
    kind: &FieldKind,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<bool, BinaryDecodingError> {
    match kind {
        FieldKind::Singular { field_type, .. } => {
            if tag.wire_type != field_type.wire_type() {
                return Ok(false);
            }
            let value = decode_value(reader, field_type, tag.field_number, registry, options, depth)?;
            match (message.get(tag.field_number).cloned(), value) {
                // Concatenated message fields merge rather than replace.
                (Some(Value::Message(mut existing)), Value::Message(incoming)) => {
                    existing.merge_from(&incoming);
                    message.set_field_value(tag.field_number, FieldValue::Single(Value::Message(existing)));
                }
                (_, value) => {
                    message.set_field_value(tag.field_number, FieldValue::Single(value));
                }
            }
            Ok(true)
        }
        FieldKind::Repeated { field_type, .. } => {
            let mut values = match message.field_value(tag.field_number) {
                Some(FieldValue::Repeated(values)) => values.clone(),
                _ => Vec::new(),
            };
            if !decode_repeated_occurrence(
                reader, &mut values, tag, field_type, registry, options, depth,
            )? {
                return Ok(false);
            }
            message.set_field_value(tag.field_number, FieldValue::Repeated(values));
            Ok(true)
        }
        FieldKind::Map {
            key_type,
            value_type,
        } => {
            if tag.wire_type != WireType::LengthDelimited {
                return Ok(false);
            }
            let (key, value) =
                decode_map_entry(reader, tag.field_number, *key_type, value_type, registry, options, depth)?;
            let mut entries = match message.field_value(tag.field_number) {
                Some(FieldValue::Map(entries)) => entries.clone(),
                _ => Default::default(),
            };
            entries.insert(key, value);
            message.set_field_value(tag.field_number, FieldValue::Map(entries));
            Ok(true)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_extension_field(
    reader: &mut Reader<'_>,
    message: &mut Message,
    tag: FieldTag,
    ext: &Arc<crate::extensions::ExtensionDescriptor>,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<bool, BinaryDecodingError> {
    match &ext.kind {
        FieldKind::Singular { field_type, .. } => {
            if tag.wire_type != field_type.wire_type() {
                return Ok(false);
            }
            let value = decode_value(reader, field_type, tag.field_number, registry, options, depth)?;
            let merged = match (message.extension_value_mut(ext.number), value) {
                (
                    Some(ExtensionValue {
                        value: FieldValue::Single(Value::Message(existing)),
                        ..
                    }),
                    Value::Message(incoming),
                ) => {
                    existing.merge_from(&incoming);
                    None
                }
                (_, value) => Some(value),
            };
            if let Some(value) = merged {
                message.insert_extension_value(ExtensionValue {
                    descriptor: ext.clone(),
                    value: FieldValue::Single(value),
                });
            }
            Ok(true)
        }
        FieldKind::Repeated { field_type, .. } => {
            let mut values = match message.extension_value_mut(ext.number) {
                Some(ExtensionValue {
                    value: FieldValue::Repeated(values),
                    ..
                }) => values.clone(),
                _ => Vec::new(),
            };
            if !decode_repeated_occurrence(
                reader, &mut values, tag, field_type, registry, options, depth,
            )? {
                return Ok(false);
            }
            message.insert_extension_value(ExtensionValue {
                descriptor: ext.clone(),
                value: FieldValue::Repeated(values),
            });
            Ok(true)
        }
        FieldKind::Map { .. } => Ok(false),
    }
}

/// Decodes one wire occurrence of a repeated field into `values`.
/// Accepts both the packed and the per-element layout for packable
/// scalars regardless of the declared encoding.
fn decode_repeated_occurrence(
    reader: &mut Reader<'_>,
    values: &mut Vec<Value>,
    tag: FieldTag,
    field_type: &FieldType,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<bool, BinaryDecodingError> {
    let element_wire_type = field_type.wire_type();
    if tag.wire_type == element_wire_type {
        let value = decode_value(reader, field_type, tag.field_number, registry, options, depth)?;
        values.push(value);
        Ok(true)
    } else if tag.wire_type == WireType::LengthDelimited && field_type.is_packable() {
        let length = reader.read_length()?;
        let mut run = reader.sub_reader(length)?;
        while run.has_more() {
            let value = decode_value(&mut run, field_type, tag.field_number, registry, options, depth)?;
            values.push(value);
        }
        Ok(true)
    } else {
        Ok(false)
    }
}

fn decode_map_entry(
    reader: &mut Reader<'_>,
    field_number: u32,
    key_type: MapKeyType,
    value_type: &FieldType,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<(MapKey, Value), BinaryDecodingError> {
    let length = reader.read_length()?;
    let mut entry = reader.sub_reader(length)?;
    let key_field_type = key_type.as_field_type();

    let mut key = None;
    let mut value = None;
    while entry.has_more() {
        let tag = entry.read_tag()?;
        match tag.field_number {
            1 if tag.wire_type == key_field_type.wire_type() => {
                key = Some(decode_value(&mut entry, &key_field_type, field_number, registry, options, depth)?);
            }
            2 if tag.wire_type == value_type.wire_type() => {
                value = Some(decode_value(&mut entry, value_type, field_number, registry, options, depth)?);
            }
            _ => {
                entry.skip_value(tag, depth)?;
            }
        }
    }

    let key = match key.unwrap_or_else(|| Value::default_for(&key_field_type)) {
        Value::Int32(v) => MapKey::Int32(v),
        Value::Int64(v) => MapKey::Int64(v),
        Value::UInt32(v) => MapKey::UInt32(v),
        Value::UInt64(v) => MapKey::UInt64(v),
        Value::Bool(v) => MapKey::Bool(v),
        Value::String(v) => MapKey::String(v),
        // Key types are restricted to the variants above.
        _ => unreachable!("map key decoded to non-key value"),
    };
    let value = value.unwrap_or_else(|| Value::default_for(value_type));
    Ok((key, value))
}

/// Decodes one untagged value of `field_type` from the wire.
fn decode_value(
    reader: &mut Reader<'_>,
    field_type: &FieldType,
    field_number: u32,
    registry: &ExtensionRegistry,
    options: &BinaryDecodingOptions,
    depth: usize,
) -> Result<Value, BinaryDecodingError> {
    Ok(match field_type {
        FieldType::Double => Value::Double(reader.read_double()?),
        FieldType::Float => Value::Float(reader.read_float()?),
        // int32/int64/enum varints may arrive 10 bytes sign-extended;
        // narrowing keeps the low bits, which is the wire contract.
        FieldType::Int32 => Value::Int32(reader.read_varint()? as i32),
        FieldType::Int64 => Value::Int64(reader.read_varint()? as i64),
        FieldType::UInt32 => Value::UInt32(reader.read_varint32()?),
        FieldType::UInt64 => Value::UInt64(reader.read_varint()?),
        FieldType::SInt32 => Value::Int32(zigzag_decode_32(reader.read_varint32()?)),
        FieldType::SInt64 => Value::Int64(zigzag_decode_64(reader.read_varint()?)),
        FieldType::Fixed32 => Value::UInt32(reader.read_fixed32()?),
        FieldType::Fixed64 => Value::UInt64(reader.read_fixed64()?),
        FieldType::SFixed32 => Value::Int32(reader.read_fixed32()? as i32),
        FieldType::SFixed64 => Value::Int64(reader.read_fixed64()? as i64),
        FieldType::Bool => Value::Bool(reader.read_varint()? != 0),
        FieldType::Enum(_) => Value::Enum(reader.read_varint()? as i32),
        FieldType::String => {
            let bytes = reader.read_length_delimited()?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| BinaryDecodingError::InvalidUtf8 { field_number })?;
            Value::String(text.to_string())
        }
        FieldType::Bytes => Value::Bytes(reader.read_length_delimited()?.to_vec()),
        FieldType::Message(descriptor) => {
            if depth == 0 {
                return Err(depth_error(options));
            }
            let length = reader.read_length()?;
            let mut body = reader.sub_reader(length)?;
            let nested =
                decode_message(&mut body, descriptor.clone(), registry, options, depth - 1)?;
            Value::Message(Box::new(nested))
        }
    })
}

/// Convenience: re-encodes just the unknown store of a message, mainly
/// for tests asserting byte-identical preservation.
pub fn encode_unknown_fields(unknown: &UnknownFields) -> Vec<u8> {
    let mut writer = Writer::new();
    unknown.encode_into(&mut writer);
    writer.into_bytes()
}
