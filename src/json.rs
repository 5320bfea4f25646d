//! JSON codec implementing the canonical Protocol Buffers JSON mapping.
//!
//! Parsing and rendering of the JSON text itself is delegated to
//! `serde_json`; this module maps between its value tree and the
//! message value model. Unknown fields captured from a binary or text
//! decode have no JSON representation and are dropped on encode.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, FieldType, MapKeyType, MessageDescriptor,
};
use crate::error::{JsonDecodingError, SerializationError};
use crate::extensions::ExtensionRegistry;
use crate::options::{JsonDecodingOptions, JsonEncodingOptions};
use crate::value::{FieldValue, MapKey, Message, Value};
use crate::wkt;

/// Encodes a message as a JSON document.
pub fn encode(message: &Message, options: &JsonEncodingOptions) -> Result<String, SerializationError> {
    Ok(message_to_json(message, options)?.to_string())
}

fn message_to_json(message: &Message, options: &JsonEncodingOptions) -> Result<Json, SerializationError> {
    let descriptor = message.descriptor();
    if let Some(special) = well_known_to_json(message, options)? {
        return Ok(special);
    }

    let mut object = JsonMap::new();
    for field in descriptor.fields() {
        let key = if options.preserve_proto_field_names {
            field.name.clone()
        } else {
            field.json_name.clone()
        };
        match message.field_value(field.number) {
            Some(slot) => {
                if let Some(rendered) = slot_to_json(message, field, slot, options)? {
                    object.insert(key, rendered);
                }
            }
            None if options.always_print_fields_with_no_presence
                && !field.has_explicit_presence() =>
            {
                object.insert(key, empty_slot_json(field, options)?);
            }
            None => {}
        }
    }
    for ext in message.extension_values() {
        let key = format!("[{}]", ext.descriptor.full_name);
        let rendered = match (&ext.descriptor.kind, &ext.value) {
            (FieldKind::Singular { field_type, .. }, FieldValue::Single(value)) => {
                value_to_json(field_type, value, options)?
            }
            (FieldKind::Repeated { field_type, .. }, FieldValue::Repeated(values)) => {
                let mut elements = Vec::with_capacity(values.len());
                for value in values {
                    elements.push(value_to_json(field_type, value, options)?);
                }
                Json::Array(elements)
            }
            _ => {
                return Err(SerializationError::ValueTypeMismatch {
                    message_type: descriptor.full_name().to_string(),
                    field_number: ext.descriptor.number,
                })
            }
        };
        object.insert(key, rendered);
    }
    Ok(Json::Object(object))
}

/// Renders one populated slot, or `None` when the value is an omitted
/// implicit-presence default.
fn slot_to_json(
    message: &Message,
    field: &FieldDescriptor,
    slot: &FieldValue,
    options: &JsonEncodingOptions,
) -> Result<Option<Json>, SerializationError> {
    let mismatch = || SerializationError::ValueTypeMismatch {
        message_type: message.descriptor().full_name().to_string(),
        field_number: field.number,
    };
    match (&field.kind, slot) {
        (FieldKind::Singular { field_type, .. }, FieldValue::Single(value)) => {
            if !field.has_explicit_presence()
                && value.is_default()
                && !options.always_print_fields_with_no_presence
            {
                return Ok(None);
            }
            Ok(Some(value_to_json(field_type, value, options)?))
        }
        (FieldKind::Repeated { field_type, .. }, FieldValue::Repeated(values)) => {
            if values.is_empty() && !options.always_print_fields_with_no_presence {
                return Ok(None);
            }
            let mut elements = Vec::with_capacity(values.len());
            for value in values {
                elements.push(value_to_json(field_type, value, options)?);
            }
            Ok(Some(Json::Array(elements)))
        }
        (FieldKind::Map { value_type, .. }, FieldValue::Map(entries)) => {
            if entries.is_empty() && !options.always_print_fields_with_no_presence {
                return Ok(None);
            }
            let mut object = JsonMap::new();
            for (key, value) in entries {
                object.insert(map_key_to_string(key), value_to_json(value_type, value, options)?);
            }
            Ok(Some(Json::Object(object)))
        }
        _ => Err(mismatch()),
    }
}

/// The JSON rendering of an unpopulated slot, for the
/// always-print-defaults option.
fn empty_slot_json(
    field: &FieldDescriptor,
    options: &JsonEncodingOptions,
) -> Result<Json, SerializationError> {
    Ok(match &field.kind {
        FieldKind::Singular { field_type, .. } => {
            value_to_json(field_type, &Value::default_for(field_type), options)?
        }
        FieldKind::Repeated { .. } => Json::Array(Vec::new()),
        FieldKind::Map { .. } => Json::Object(JsonMap::new()),
    })
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Int32(v) => v.to_string(),
        MapKey::Int64(v) => v.to_string(),
        MapKey::UInt32(v) => v.to_string(),
        MapKey::UInt64(v) => v.to_string(),
        MapKey::Bool(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

fn float_to_json(value: f64) -> Json {
    if value.is_nan() {
        Json::String("NaN".to_string())
    } else if value == f64::INFINITY {
        Json::String("Infinity".to_string())
    } else if value == f64::NEG_INFINITY {
        Json::String("-Infinity".to_string())
    } else {
        // Finite and not NaN, so the conversion cannot fail.
        Number::from_f64(value).map(Json::Number).unwrap_or(Json::Null)
    }
}

fn enum_to_json(descriptor: &EnumDescriptor, number: i32, options: &JsonEncodingOptions) -> Json {
    if !options.always_print_enums_as_ints {
        if let Some(name) = descriptor.name(number) {
            return Json::String(name.to_string());
        }
    }
    Json::Number(number.into())
}

fn value_to_json(
    field_type: &FieldType,
    value: &Value,
    options: &JsonEncodingOptions,
) -> Result<Json, SerializationError> {
    Ok(match value {
        Value::Double(v) => float_to_json(*v),
        Value::Float(v) => float_to_json(f64::from(*v)),
        Value::Int32(v) => Json::Number((*v).into()),
        Value::UInt32(v) => Json::Number((*v).into()),
        // 64-bit integers render as strings: JSON numbers cannot hold
        // them losslessly.
        Value::Int64(v) => Json::String(v.to_string()),
        Value::UInt64(v) => Json::String(v.to_string()),
        Value::Bool(v) => Json::Bool(*v),
        Value::String(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::String(STANDARD.encode(v)),
        Value::Enum(number) => match field_type {
            FieldType::Enum(descriptor) => enum_to_json(descriptor, *number, options),
            _ => Json::Number((*number).into()),
        },
        Value::Message(nested) => message_to_json(nested, options)?,
    })
}

/// The bespoke compact renderings of the well-known types, recognized
/// by full type name. Returns `None` for ordinary messages.
fn well_known_to_json(
    message: &Message,
    options: &JsonEncodingOptions,
) -> Result<Option<Json>, SerializationError> {
    let full_name = message.descriptor().full_name();
    if full_name == wkt::TIMESTAMP_TYPE {
        let (seconds, nanos) = seconds_nanos(message)?;
        return Ok(Some(Json::String(wkt::format_timestamp(seconds, nanos)?)));
    }
    if full_name == wkt::DURATION_TYPE {
        let (seconds, nanos) = seconds_nanos(message)?;
        return Ok(Some(Json::String(wkt::format_duration(seconds, nanos)?)));
    }
    if wkt::is_wrapper_type(full_name) {
        if let Some(field) = message.descriptor().field(wkt::WRAPPER_VALUE_FIELD) {
            let field_type = field.value_type().clone();
            let value = match message.get(wkt::WRAPPER_VALUE_FIELD) {
                Some(value) => value.clone(),
                None => Value::default_for(&field_type),
            };
            return Ok(Some(value_to_json(&field_type, &value, options)?));
        }
    }
    Ok(None)
}

fn seconds_nanos(message: &Message) -> Result<(i64, i32), SerializationError> {
    let mismatch = |number| SerializationError::ValueTypeMismatch {
        message_type: message.descriptor().full_name().to_string(),
        field_number: number,
    };
    let seconds = match message.get(wkt::SECONDS_FIELD) {
        Some(Value::Int64(v)) => *v,
        None => 0,
        Some(_) => return Err(mismatch(wkt::SECONDS_FIELD)),
    };
    let nanos = match message.get(wkt::NANOS_FIELD) {
        Some(Value::Int32(v)) => *v,
        None => 0,
        Some(_) => return Err(mismatch(wkt::NANOS_FIELD)),
    };
    Ok((seconds, nanos))
}

/// Decodes a message from a JSON document.
pub fn decode(
    descriptor: Arc<MessageDescriptor>,
    text: &str,
    registry: &ExtensionRegistry,
    options: &JsonDecodingOptions,
) -> Result<Message, JsonDecodingError> {
    let json: Json = serde_json::from_str(text)?;
    json_to_message(&json, descriptor, registry, options, options.message_depth_limit)
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn type_mismatch(
    descriptor: &MessageDescriptor,
    field: &str,
    expected: &'static str,
    json: &Json,
) -> JsonDecodingError {
    JsonDecodingError::TypeMismatch {
        message_type: descriptor.full_name().to_string(),
        field: field.to_string(),
        expected,
        found: json_type_name(json),
    }
}

fn json_to_message(
    json: &Json,
    descriptor: Arc<MessageDescriptor>,
    registry: &ExtensionRegistry,
    options: &JsonDecodingOptions,
    depth: usize,
) -> Result<Message, JsonDecodingError> {
    if let Some(message) = well_known_from_json(json, &descriptor, options)? {
        return Ok(message);
    }

    let object = match json {
        Json::Object(object) => object,
        other => return Err(type_mismatch(&descriptor, "<message>", "object", other)),
    };

    let mut message = Message::new(descriptor.clone());
    for (name, member) in object {
        if let Some(ext_name) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            if let Some(ext) = registry.lookup_by_name(descriptor.full_name(), ext_name) {
                let ext = ext.clone();
                decode_extension_member(&mut message, &ext, name, member, registry, options, depth)?;
                continue;
            }
        } else if let Some(field) = descriptor.field_by_json_name(name) {
            let field = field.clone();
            decode_field_member(&mut message, &field, member, registry, options, depth)?;
            continue;
        }
        if !options.ignore_unknown_fields {
            return Err(JsonDecodingError::UnknownField {
                message_type: descriptor.full_name().to_string(),
                field: name.clone(),
            });
        }
    }
    Ok(message)
}

fn decode_field_member(
    message: &mut Message,
    field: &FieldDescriptor,
    json: &Json,
    registry: &ExtensionRegistry,
    options: &JsonDecodingOptions,
    depth: usize,
) -> Result<(), JsonDecodingError> {
    // JSON null reads as "not present".
    if json.is_null() {
        return Ok(());
    }
    let descriptor = message.descriptor().clone();
    match &field.kind {
        FieldKind::Singular { field_type, .. } => {
            if let Some(oneof_index) = field.oneof_index {
                if message.oneof_field(oneof_index).is_some() {
                    return Err(JsonDecodingError::DuplicateOneof {
                        message_type: descriptor.full_name().to_string(),
                        oneof: descriptor.oneofs()[oneof_index].name.clone(),
                    });
                }
            }
            let value =
                json_to_value(json, field_type, &descriptor, &field.name, registry, options, depth)?;
            message.set_field_value(field.number, FieldValue::Single(value));
        }
        FieldKind::Repeated { field_type, .. } => {
            let elements = match json {
                Json::Array(elements) => elements,
                other => return Err(type_mismatch(&descriptor, &field.name, "array", other)),
            };
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(json_to_value(
                    element, field_type, &descriptor, &field.name, registry, options, depth,
                )?);
            }
            message.set_field_value(field.number, FieldValue::Repeated(values));
        }
        FieldKind::Map {
            key_type,
            value_type,
        } => {
            let object = match json {
                Json::Object(object) => object,
                other => return Err(type_mismatch(&descriptor, &field.name, "object", other)),
            };
            let mut entries = BTreeMap::new();
            for (key_text, member) in object {
                let key = parse_map_key(key_text, *key_type, &field.name)?;
                let value = json_to_value(
                    member, value_type, &descriptor, &field.name, registry, options, depth,
                )?;
                entries.insert(key, value);
            }
            message.set_field_value(field.number, FieldValue::Map(entries));
        }
    }
    Ok(())
}

fn decode_extension_member(
    message: &mut Message,
    ext: &Arc<crate::extensions::ExtensionDescriptor>,
    name: &str,
    json: &Json,
    registry: &ExtensionRegistry,
    options: &JsonDecodingOptions,
    depth: usize,
) -> Result<(), JsonDecodingError> {
    if json.is_null() {
        return Ok(());
    }
    let descriptor = message.descriptor().clone();
    match &ext.kind {
        FieldKind::Singular { field_type, .. } => {
            let value = json_to_value(json, field_type, &descriptor, name, registry, options, depth)?;
            message.set_extension(ext, value);
        }
        FieldKind::Repeated { field_type, .. } => {
            let elements = match json {
                Json::Array(elements) => elements,
                other => return Err(type_mismatch(&descriptor, name, "array", other)),
            };
            for element in elements {
                let value =
                    json_to_value(element, field_type, &descriptor, name, registry, options, depth)?;
                message.push_extension(ext, value);
            }
        }
        FieldKind::Map { .. } => {
            return Err(type_mismatch(&descriptor, name, "non-map extension", json))
        }
    }
    Ok(())
}

/// Parses a signed integer from a JSON number or decimal string.
/// Non-integral or out-of-range input fails with `NumberOutOfRange`.
fn parse_i64(json: &Json, field: &str) -> Result<i64, JsonDecodingError> {
    let out_of_range = || JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    };
    match json {
        Json::Number(number) => {
            if let Some(v) = number.as_i64() {
                return Ok(v);
            }
            // Accept floats with an exact integral value, e.g. 1.0.
            let v = number.as_f64().ok_or_else(out_of_range)?;
            exact_float_to_i64(v).ok_or_else(out_of_range)
        }
        Json::String(text) => {
            if let Ok(v) = text.parse::<i64>() {
                return Ok(v);
            }
            let v: f64 = text.parse().map_err(|_| out_of_range())?;
            exact_float_to_i64(v).ok_or_else(out_of_range)
        }
        _ => Err(out_of_range()),
    }
}

fn parse_u64(json: &Json, field: &str) -> Result<u64, JsonDecodingError> {
    let out_of_range = || JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    };
    match json {
        Json::Number(number) => {
            if let Some(v) = number.as_u64() {
                return Ok(v);
            }
            let v = number.as_f64().ok_or_else(out_of_range)?;
            exact_float_to_u64(v).ok_or_else(out_of_range)
        }
        Json::String(text) => {
            if let Ok(v) = text.parse::<u64>() {
                return Ok(v);
            }
            let v: f64 = text.parse().map_err(|_| out_of_range())?;
            exact_float_to_u64(v).ok_or_else(out_of_range)
        }
        _ => Err(out_of_range()),
    }
}

fn exact_float_to_i64(v: f64) -> Option<i64> {
    if v.fract() != 0.0 || !(-9_007_199_254_740_992f64..=9_007_199_254_740_992f64).contains(&v) {
        return None;
    }
    Some(v as i64)
}

fn exact_float_to_u64(v: f64) -> Option<u64> {
    if v.fract() != 0.0 || !(0f64..=9_007_199_254_740_992f64).contains(&v) {
        return None;
    }
    Some(v as u64)
}

fn parse_i32(json: &Json, field: &str) -> Result<i32, JsonDecodingError> {
    i32::try_from(parse_i64(json, field)?).map_err(|_| JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    })
}

fn parse_u32(json: &Json, field: &str) -> Result<u32, JsonDecodingError> {
    u32::try_from(parse_u64(json, field)?).map_err(|_| JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    })
}

/// Parses a double from a JSON number, a numeric string, or one of the
/// sentinel strings `"NaN"`, `"Infinity"`, `"-Infinity"`.
fn parse_f64(json: &Json, field: &str) -> Result<f64, JsonDecodingError> {
    let out_of_range = || JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    };
    match json {
        Json::Number(number) => number.as_f64().ok_or_else(out_of_range),
        Json::String(text) => match text.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other.parse().map_err(|_| out_of_range()),
        },
        _ => Err(out_of_range()),
    }
}

fn decode_base64(text: &str, field: &str) -> Result<Vec<u8>, JsonDecodingError> {
    // Both the standard and the URL-safe alphabet are accepted, with or
    // without padding.
    let normalized: String = text
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let result = if normalized.len() % 4 == 0 {
        STANDARD.decode(&normalized)
    } else {
        STANDARD_NO_PAD.decode(&normalized)
    };
    result.map_err(|_| JsonDecodingError::InvalidBase64 {
        field: field.to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn json_to_value(
    json: &Json,
    field_type: &FieldType,
    descriptor: &MessageDescriptor,
    field: &str,
    registry: &ExtensionRegistry,
    options: &JsonDecodingOptions,
    depth: usize,
) -> Result<Value, JsonDecodingError> {
    Ok(match field_type {
        FieldType::Double => Value::Double(parse_f64(json, field)?),
        FieldType::Float => {
            let v = parse_f64(json, field)?;
            let narrowed = v as f32;
            if narrowed.is_infinite() && v.is_finite() {
                return Err(JsonDecodingError::NumberOutOfRange {
                    field: field.to_string(),
                });
            }
            Value::Float(narrowed)
        }
        FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => {
            Value::Int32(parse_i32(json, field)?)
        }
        FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => {
            Value::Int64(parse_i64(json, field)?)
        }
        FieldType::UInt32 | FieldType::Fixed32 => Value::UInt32(parse_u32(json, field)?),
        FieldType::UInt64 | FieldType::Fixed64 => Value::UInt64(parse_u64(json, field)?),
        FieldType::Bool => match json {
            Json::Bool(v) => Value::Bool(*v),
            other => return Err(type_mismatch(descriptor, field, "boolean", other)),
        },
        FieldType::String => match json {
            Json::String(v) => Value::String(v.clone()),
            other => return Err(type_mismatch(descriptor, field, "string", other)),
        },
        FieldType::Bytes => match json {
            Json::String(v) => Value::Bytes(decode_base64(v, field)?),
            other => return Err(type_mismatch(descriptor, field, "base64 string", other)),
        },
        FieldType::Enum(enum_descriptor) => match json {
            Json::String(name) => match enum_descriptor.number(name) {
                Some(number) => Value::Enum(number),
                None => {
                    return Err(JsonDecodingError::UnknownEnumValue {
                        enum_type: enum_descriptor.full_name().to_string(),
                        value: name.clone(),
                    })
                }
            },
            // Open enums accept any in-range number.
            Json::Number(_) => Value::Enum(parse_i32(json, field)?),
            other => return Err(type_mismatch(descriptor, field, "enum name or number", other)),
        },
        FieldType::Message(nested) => {
            if depth == 0 {
                return Err(JsonDecodingError::DepthLimitExceeded {
                    limit: options.message_depth_limit,
                });
            }
            let message = json_to_message(json, nested.clone(), registry, options, depth - 1)?;
            Value::Message(Box::new(message))
        }
    })
}

fn parse_map_key(text: &str, key_type: MapKeyType, field: &str) -> Result<MapKey, JsonDecodingError> {
    let out_of_range = || JsonDecodingError::NumberOutOfRange {
        field: field.to_string(),
    };
    Ok(match key_type {
        MapKeyType::Int32 | MapKeyType::SInt32 | MapKeyType::SFixed32 => {
            MapKey::Int32(text.parse().map_err(|_| out_of_range())?)
        }
        MapKeyType::Int64 | MapKeyType::SInt64 | MapKeyType::SFixed64 => {
            MapKey::Int64(text.parse().map_err(|_| out_of_range())?)
        }
        MapKeyType::UInt32 | MapKeyType::Fixed32 => {
            MapKey::UInt32(text.parse().map_err(|_| out_of_range())?)
        }
        MapKeyType::UInt64 | MapKeyType::Fixed64 => {
            MapKey::UInt64(text.parse().map_err(|_| out_of_range())?)
        }
        MapKeyType::Bool => match text {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(out_of_range()),
        },
        MapKeyType::String => MapKey::String(text.to_string()),
    })
}

/// Decodes the bespoke compact representations of the well-known types.
/// Returns `None` for ordinary message types.
fn well_known_from_json(
    json: &Json,
    descriptor: &Arc<MessageDescriptor>,
    options: &JsonDecodingOptions,
) -> Result<Option<Message>, JsonDecodingError> {
    let full_name = descriptor.full_name();
    if full_name == wkt::TIMESTAMP_TYPE || full_name == wkt::DURATION_TYPE {
        let is_timestamp = full_name == wkt::TIMESTAMP_TYPE;
        let type_name: &'static str = if is_timestamp { "Timestamp" } else { "Duration" };
        let text = match json {
            Json::String(text) => text,
            other => {
                return Err(JsonDecodingError::InvalidWellKnownType {
                    type_name,
                    reason: format!("expected a string, found {}", json_type_name(other)),
                })
            }
        };
        let parsed = if is_timestamp {
            wkt::parse_timestamp(text)
        } else {
            wkt::parse_duration(text)
        };
        let (seconds, nanos) = parsed.ok_or_else(|| JsonDecodingError::InvalidWellKnownType {
            type_name,
            reason: format!("malformed value {text:?}"),
        })?;
        let mut message = Message::new(descriptor.clone());
        if seconds != 0 {
            message.set_field_value(wkt::SECONDS_FIELD, FieldValue::Single(Value::Int64(seconds)));
        }
        if nanos != 0 {
            message.set_field_value(wkt::NANOS_FIELD, FieldValue::Single(Value::Int32(nanos)));
        }
        return Ok(Some(message));
    }
    if wkt::is_wrapper_type(full_name) && !json.is_object() {
        if let Some(field) = descriptor.field(wkt::WRAPPER_VALUE_FIELD) {
            let field_type = field.value_type().clone();
            let mut message = Message::new(descriptor.clone());
            if !json.is_null() {
                let value = json_to_value(
                    json,
                    &field_type,
                    descriptor,
                    "value",
                    &ExtensionRegistry::new(),
                    options,
                    0,
                )?;
                message.set_field_value(wkt::WRAPPER_VALUE_FIELD, FieldValue::Single(value));
            }
            return Ok(Some(message));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDescriptor;
    use crate::extensions::ExtensionDescriptor;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::new()
    }

    fn person() -> Arc<MessageDescriptor> {
        let color = EnumDescriptor::new("test.Color", &[("COLOR_UNSPECIFIED", 0), ("RED", 1)]);
        let desc = MessageDescriptor::new("test.Person");
        desc.set_fields(vec![
            FieldDescriptor::singular(1, "display_name", FieldType::String),
            FieldDescriptor::singular(2, "id", FieldType::Int64),
            FieldDescriptor::repeated(3, "scores", FieldType::Int32),
            FieldDescriptor::singular(4, "color", FieldType::Enum(color)),
            FieldDescriptor::singular(5, "avatar", FieldType::Bytes),
            FieldDescriptor::map(6, "labels", MapKeyType::String, FieldType::String),
        ])
        .unwrap();
        desc
    }

    fn decode_default(desc: Arc<MessageDescriptor>, text: &str) -> Result<Message, JsonDecodingError> {
        decode(desc, text, &registry(), &JsonDecodingOptions::default())
    }

    #[test]
    fn test_encode_camel_case_and_strings() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String("ada".into()));
            m.set(2, Value::Int64(1_234_567_890_123));
        });
        let text = encode(&msg, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#"{"displayName":"ada","id":"1234567890123"}"#);
    }

    #[test]
    fn test_encode_preserve_proto_field_names() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String("ada".into()));
        });
        let options = JsonEncodingOptions {
            preserve_proto_field_names: true,
            ..Default::default()
        };
        assert_eq!(encode(&msg, &options).unwrap(), r#"{"display_name":"ada"}"#);
    }

    #[test]
    fn test_encode_omits_implicit_defaults() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String(String::new()));
            m.set(4, Value::Enum(0));
        });
        assert_eq!(encode(&msg, &JsonEncodingOptions::default()).unwrap(), "{}");
    }

    #[test]
    fn test_encode_enum_name_with_int_fallback() {
        let msg = Message::build(person(), |m| m.set(4, Value::Enum(1)));
        assert_eq!(
            encode(&msg, &JsonEncodingOptions::default()).unwrap(),
            r#"{"color":"RED"}"#
        );

        let msg = Message::build(person(), |m| m.set(4, Value::Enum(42)));
        assert_eq!(
            encode(&msg, &JsonEncodingOptions::default()).unwrap(),
            r#"{"color":42}"#
        );

        let msg = Message::build(person(), |m| m.set(4, Value::Enum(1)));
        let as_ints = JsonEncodingOptions {
            always_print_enums_as_ints: true,
            ..Default::default()
        };
        assert_eq!(encode(&msg, &as_ints).unwrap(), r#"{"color":1}"#);
    }

    #[test]
    fn test_encode_bytes_base64() {
        let msg = Message::build(person(), |m| m.set(5, Value::Bytes(vec![0xde, 0xad, 0xbe])));
        assert_eq!(
            encode(&msg, &JsonEncodingOptions::default()).unwrap(),
            r#"{"avatar":"3q2+"}"#
        );
    }

    #[test]
    fn test_decode_accepts_both_name_spellings() {
        let a = decode_default(person(), r#"{"displayName":"ada"}"#).unwrap();
        let b = decode_default(person(), r#"{"display_name":"ada"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get(1), Some(&Value::String("ada".into())));
    }

    #[test]
    fn test_decode_64_bit_from_number_or_string() {
        let a = decode_default(person(), r#"{"id":"77"}"#).unwrap();
        let b = decode_default(person(), r#"{"id":77}"#).unwrap();
        assert_eq!(a.get(2), Some(&Value::Int64(77)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_number_out_of_range() {
        let err = decode_default(person(), r#"{"scores":[2147483648]}"#).unwrap_err();
        assert!(matches!(err, JsonDecodingError::NumberOutOfRange { .. }));

        let err = decode_default(person(), r#"{"scores":[1.5]}"#).unwrap_err();
        assert!(matches!(err, JsonDecodingError::NumberOutOfRange { .. }));
    }

    #[test]
    fn test_decode_base64_both_alphabets() {
        let standard = decode_default(person(), r#"{"avatar":"3q2+"}"#).unwrap();
        let url_safe = decode_default(person(), r#"{"avatar":"3q2-"}"#).unwrap();
        assert_eq!(standard.get(5), Some(&Value::Bytes(vec![0xde, 0xad, 0xbe])));
        assert_eq!(standard, url_safe);

        let err = decode_default(person(), r#"{"avatar":"!!"}"#).unwrap_err();
        assert!(matches!(err, JsonDecodingError::InvalidBase64 { .. }));
    }

    #[test]
    fn test_decode_null_means_absent() {
        let msg = decode_default(person(), r#"{"displayName":null}"#).unwrap();
        assert!(!msg.has(1));
    }

    #[test]
    fn test_decode_unknown_field_policies() {
        let text = r#"{"noSuchField":1}"#;
        assert!(decode_default(person(), text).is_ok());

        let strict = JsonDecodingOptions {
            ignore_unknown_fields: false,
            ..Default::default()
        };
        let err = decode(person(), text, &registry(), &strict).unwrap_err();
        assert!(matches!(err, JsonDecodingError::UnknownField { .. }));
    }

    #[test]
    fn test_decode_malformed_syntax() {
        let err = decode_default(person(), "{nope").unwrap_err();
        assert!(matches!(err, JsonDecodingError::Syntax(_)));
    }

    #[test]
    fn test_duplicate_oneof_rejected() {
        let desc = MessageDescriptor::with_oneofs("test.Choice", &["kind"]);
        desc.set_fields(vec![
            FieldDescriptor::singular(1, "text", FieldType::String).in_oneof(0),
            FieldDescriptor::singular(2, "code", FieldType::Int32).in_oneof(0),
        ])
        .unwrap();

        let err = decode_default(desc, r#"{"text":"x","code":1}"#).unwrap_err();
        assert!(matches!(
            err,
            JsonDecodingError::DuplicateOneof { oneof, .. } if oneof == "kind"
        ));
    }

    #[test]
    fn test_map_roundtrip() {
        let msg = Message::build(person(), |m| {
            m.insert_map_entry(6, MapKey::String("team".into()), Value::String("blue".into()));
        });
        let text = encode(&msg, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#"{"labels":{"team":"blue"}}"#);
        assert_eq!(decode_default(person(), &text).unwrap(), msg);
    }

    #[test]
    fn test_nan_and_infinity_strings() {
        let desc = MessageDescriptor::new("test.Floats");
        desc.set_fields(vec![FieldDescriptor::singular(1, "x", FieldType::Double)])
            .unwrap();

        let msg = Message::build(desc.clone(), |m| m.set(1, Value::Double(f64::NEG_INFINITY)));
        let text = encode(&msg, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#"{"x":"-Infinity"}"#);
        assert_eq!(decode_default(desc.clone(), &text).unwrap(), msg);

        let back = decode_default(desc, r#"{"x":"NaN"}"#).unwrap();
        match back.get(1) {
            Some(Value::Double(v)) => assert!(v.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_and_duration_strings() {
        let ts_desc = MessageDescriptor::new("google.protobuf.Timestamp");
        ts_desc
            .set_fields(vec![
                FieldDescriptor::singular(1, "seconds", FieldType::Int64),
                FieldDescriptor::singular(2, "nanos", FieldType::Int32),
            ])
            .unwrap();

        let ts = Message::build(ts_desc.clone(), |m| {
            m.set(1, Value::Int64(63_108_020));
            m.set(2, Value::Int32(21_000_000));
        });
        let text = encode(&ts, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#""1972-01-01T10:00:20.021Z""#);
        assert_eq!(decode_default(ts_desc.clone(), &text).unwrap(), ts);

        let err = decode_default(ts_desc, r#""not a date""#).unwrap_err();
        assert!(matches!(err, JsonDecodingError::InvalidWellKnownType { .. }));

        let dur_desc = MessageDescriptor::new("google.protobuf.Duration");
        dur_desc
            .set_fields(vec![
                FieldDescriptor::singular(1, "seconds", FieldType::Int64),
                FieldDescriptor::singular(2, "nanos", FieldType::Int32),
            ])
            .unwrap();
        let dur = Message::build(dur_desc.clone(), |m| {
            m.set(1, Value::Int64(-3));
            m.set(2, Value::Int32(-1));
        });
        let text = encode(&dur, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#""-3.000000001s""#);
        assert_eq!(decode_default(dur_desc, &text).unwrap(), dur);
    }

    #[test]
    fn test_wrapper_types_flatten() {
        let wrapper = MessageDescriptor::new("google.protobuf.Int32Value");
        wrapper
            .set_fields(vec![FieldDescriptor::singular(1, "value", FieldType::Int32)])
            .unwrap();
        let holder = MessageDescriptor::new("test.Holder");
        holder
            .set_fields(vec![FieldDescriptor::singular(
                1,
                "count",
                FieldType::Message(wrapper.clone()),
            )])
            .unwrap();

        let msg = Message::build(holder.clone(), |m| {
            m.set(
                1,
                Value::Message(Box::new(Message::build(wrapper, |w| {
                    w.set(1, Value::Int32(7))
                }))),
            );
        });
        let text = encode(&msg, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#"{"count":7}"#);
        assert_eq!(decode_default(holder, &text).unwrap(), msg);
    }

    #[test]
    fn test_extension_bracket_names() {
        let ext = ExtensionDescriptor::singular("test.Person", "test.nickname", 100, FieldType::String);
        let mut with_ext = ExtensionRegistry::new();
        with_ext.register(ext.clone()).unwrap();

        let msg = Message::build(person(), |m| {
            m.set_extension(&ext, Value::String("gull".into()));
        });
        let text = encode(&msg, &JsonEncodingOptions::default()).unwrap();
        assert_eq!(text, r#"{"[test.nickname]":"gull"}"#);

        let back = decode(person(), &text, &with_ext, &JsonDecodingOptions::default()).unwrap();
        assert_eq!(back.get_extension(&ext), Some(&Value::String("gull".into())));

        // Without the registry the bracketed member follows the
        // unknown-field policy.
        assert!(decode_default(person(), &text).is_ok());
        let strict = JsonDecodingOptions {
            ignore_unknown_fields: false,
            ..Default::default()
        };
        assert!(decode(person(), &text, &registry(), &strict).is_err());
    }

    #[test]
    fn test_always_print_defaults() {
        let msg = Message::new(person());
        let options = JsonEncodingOptions {
            always_print_fields_with_no_presence: true,
            ..Default::default()
        };
        let text = encode(&msg, &options).unwrap();
        let json: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(json["displayName"], Json::String(String::new()));
        assert_eq!(json["id"], Json::String("0".into()));
        assert_eq!(json["scores"], Json::Array(Vec::new()));
        assert_eq!(json["color"], Json::String("COLOR_UNSPECIFIED".into()));
    }

    #[test]
    fn test_depth_limit() {
        let node = MessageDescriptor::new("test.Node");
        node.set_fields(vec![FieldDescriptor::singular(
            1,
            "child",
            FieldType::Message(node.clone()),
        )])
        .unwrap();

        let mut text = String::from("{}");
        for _ in 0..5 {
            text = format!(r#"{{"child":{text}}}"#);
        }
        let shallow = JsonDecodingOptions {
            message_depth_limit: 4,
            ..Default::default()
        };
        assert!(matches!(
            decode(node.clone(), &text, &registry(), &shallow),
            Err(JsonDecodingError::DepthLimitExceeded { limit: 4 })
        ));
        let deep = JsonDecodingOptions {
            message_depth_limit: 5,
            ..Default::default()
        };
        assert!(decode(node, &text, &registry(), &deep).is_ok());
    }

    #[test]
    fn test_unknown_enum_name_rejected() {
        let err = decode_default(person(), r#"{"color":"CHARTREUSE"}"#).unwrap_err();
        assert!(matches!(err, JsonDecodingError::UnknownEnumValue { .. }));
        // Numbers outside the declared range are fine: enums are open.
        let msg = decode_default(person(), r#"{"color":99}"#).unwrap();
        assert_eq!(msg.get(4), Some(&Value::Enum(99)));
    }
}
