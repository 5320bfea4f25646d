//! Text-format codec: the human-readable protobuf debug representation.
//!
//! The encoder renders one `name: value` line per field; the decoder is
//! a recursive-descent parser over a whitespace- and comment-tolerant
//! grammar. Output is not guaranteed byte-stable across versions, but
//! encode-then-decode always yields an equal message.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, FieldType, MapKeyType, MessageDescriptor,
};
use crate::error::{
    SerializationError, TextFormatDecodingError, TextFormatErrorKind, TextPosition,
};
use crate::extensions::ExtensionRegistry;
use crate::options::{TextFormatDecodingOptions, TextFormatEncodingOptions};
use crate::reader::Reader;
use crate::unknown::{UnknownField, UnknownFields};
use crate::value::{FieldValue, MapKey, Message, Value};
use crate::wire::WireType;
use crate::writer::Writer;

/// Budget for re-scanning captured group bodies while printing. Bodies
/// come from a decode that already enforced the real limit.
const GROUP_SCAN_DEPTH: usize = 32;

/// Renders a message in text format.
pub fn encode(
    message: &Message,
    options: &TextFormatEncodingOptions,
) -> Result<String, SerializationError> {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
        compact: options.compact,
    };
    print_message(message, options, &mut printer)?;
    Ok(printer.out)
}

struct Printer {
    out: String,
    indent: usize,
    compact: bool,
}

impl Printer {
    fn begin_field(&mut self, name: &str) {
        if self.compact {
            if !self.out.is_empty() && !self.out.ends_with("{ ") {
                self.out.push(' ');
            }
        } else {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
        }
        self.out.push_str(name);
    }

    fn end_field(&mut self) {
        if !self.compact {
            self.out.push('\n');
        }
    }

    fn open_block(&mut self) {
        self.out.push_str(if self.compact { " { " } else { " {\n" });
        self.indent += 1;
    }

    fn close_block(&mut self) {
        self.indent -= 1;
        if self.compact {
            if self.out.ends_with("{ ") {
                // Empty block prints as "{ }".
                self.out.push('}');
            } else {
                self.out.push_str(" }");
            }
        } else {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
            self.out.push('}');
        }
    }
}

fn print_message(
    message: &Message,
    options: &TextFormatEncodingOptions,
    printer: &mut Printer,
) -> Result<(), SerializationError> {
    let descriptor = message.descriptor();
    for field in descriptor.fields() {
        if let Some(slot) = message.field_value(field.number) {
            print_slot(message, &field.name, &field.kind, slot, options, printer)?;
        }
    }
    for ext in message.extension_values() {
        let name = format!("[{}]", ext.descriptor.full_name);
        print_slot(message, &name, &ext.descriptor.kind, &ext.value, options, printer)?;
    }
    if options.print_unknown_fields {
        print_unknown_fields(message.unknown_fields(), printer);
    }
    Ok(())
}

fn print_slot(
    message: &Message,
    name: &str,
    kind: &FieldKind,
    slot: &FieldValue,
    options: &TextFormatEncodingOptions,
    printer: &mut Printer,
) -> Result<(), SerializationError> {
    let mismatch = || SerializationError::ValueTypeMismatch {
        message_type: message.descriptor().full_name().to_string(),
        field_number: message
            .descriptor()
            .field_by_name(name)
            .map(|f| f.number)
            .unwrap_or(0),
    };
    match (kind, slot) {
        (FieldKind::Singular { field_type, .. }, FieldValue::Single(value)) => {
            print_field(name, field_type, value, options, printer)
        }
        (FieldKind::Repeated { field_type, .. }, FieldValue::Repeated(values)) => {
            for value in values {
                print_field(name, field_type, value, options, printer)?;
            }
            Ok(())
        }
        (FieldKind::Map { value_type, .. }, FieldValue::Map(entries)) => {
            for (key, value) in entries {
                printer.begin_field(name);
                printer.open_block();
                printer.begin_field("key");
                printer.out.push_str(": ");
                print_map_key(key, printer);
                printer.end_field();
                print_field("value", value_type, value, options, printer)?;
                printer.close_block();
                printer.end_field();
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

fn print_field(
    name: &str,
    field_type: &FieldType,
    value: &Value,
    options: &TextFormatEncodingOptions,
    printer: &mut Printer,
) -> Result<(), SerializationError> {
    printer.begin_field(name);
    if let Value::Message(nested) = value {
        printer.open_block();
        print_message(nested, options, printer)?;
        printer.close_block();
    } else {
        printer.out.push_str(": ");
        print_scalar(field_type, value, &mut printer.out);
    }
    printer.end_field();
    Ok(())
}

fn print_map_key(key: &MapKey, printer: &mut Printer) {
    match key {
        MapKey::Int32(v) => printer.out.push_str(&v.to_string()),
        MapKey::Int64(v) => printer.out.push_str(&v.to_string()),
        MapKey::UInt32(v) => printer.out.push_str(&v.to_string()),
        MapKey::UInt64(v) => printer.out.push_str(&v.to_string()),
        MapKey::Bool(v) => printer.out.push_str(if *v { "true" } else { "false" }),
        MapKey::String(v) => {
            printer.out.push('"');
            printer.out.push_str(&escape_bytes(v.as_bytes()));
            printer.out.push('"');
        }
    }
}

fn print_scalar(field_type: &FieldType, value: &Value, out: &mut String) {
    match value {
        Value::Double(v) => push_float(*v, out),
        Value::Float(v) => push_float(f64::from(*v), out),
        Value::Int32(v) => out.push_str(&v.to_string()),
        Value::Int64(v) => out.push_str(&v.to_string()),
        Value::UInt32(v) => out.push_str(&v.to_string()),
        Value::UInt64(v) => out.push_str(&v.to_string()),
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::String(v) => {
            out.push('"');
            out.push_str(&escape_bytes(v.as_bytes()));
            out.push('"');
        }
        Value::Bytes(v) => {
            out.push('"');
            out.push_str(&escape_bytes(v));
            out.push('"');
        }
        Value::Enum(number) => match field_type {
            FieldType::Enum(descriptor) => match descriptor.name(*number) {
                Some(name) => out.push_str(name),
                None => out.push_str(&number.to_string()),
            },
            _ => out.push_str(&number.to_string()),
        },
        // Message values go through print_field's block path.
        Value::Message(_) => {}
    }
}

fn push_float(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("nan");
    } else if value == f64::INFINITY {
        out.push_str("inf");
    } else if value == f64::NEG_INFINITY {
        out.push_str("-inf");
    } else {
        out.push_str(&value.to_string());
    }
}

fn print_unknown_fields(unknown: &UnknownFields, printer: &mut Printer) {
    for record in unknown.iter() {
        print_unknown_record(record, printer);
    }
}

fn print_unknown_record(record: &UnknownField, printer: &mut Printer) {
    let name = record.number.to_string();
    match record.wire_type {
        WireType::Varint => {
            let mut reader = Reader::new(&record.bytes);
            match reader.read_varint() {
                Ok(v) if !reader.has_more() => {
                    printer.begin_field(&name);
                    printer.out.push_str(": ");
                    printer.out.push_str(&v.to_string());
                    printer.end_field();
                }
                // Hand-built payload that is not one well-formed varint.
                _ => print_quoted_record(&name, &record.bytes, printer),
            }
        }
        WireType::Fixed32 => match <[u8; 4]>::try_from(record.bytes.as_slice()) {
            Ok(bytes) => {
                printer.begin_field(&name);
                printer
                    .out
                    .push_str(&format!(": 0x{:08x}", u32::from_le_bytes(bytes)));
                printer.end_field();
            }
            Err(_) => print_quoted_record(&name, &record.bytes, printer),
        },
        WireType::Fixed64 => match <[u8; 8]>::try_from(record.bytes.as_slice()) {
            Ok(bytes) => {
                printer.begin_field(&name);
                printer
                    .out
                    .push_str(&format!(": 0x{:016x}", u64::from_le_bytes(bytes)));
                printer.end_field();
            }
            Err(_) => print_quoted_record(&name, &record.bytes, printer),
        },
        WireType::LengthDelimited => print_quoted_record(&name, &record.bytes, printer),
        WireType::StartGroup => match scan_group_body(&record.bytes) {
            Some(records) => {
                printer.begin_field(&name);
                printer.open_block();
                print_unknown_fields(&records, printer);
                printer.close_block();
                printer.end_field();
            }
            // Hand-built body that does not scan as records; the
            // quoted form at least survives a roundtrip as bytes.
            None => print_quoted_record(&name, &record.bytes, printer),
        },
        WireType::EndGroup => {}
    }
}

fn print_quoted_record(name: &str, bytes: &[u8], printer: &mut Printer) {
    printer.begin_field(name);
    printer.out.push_str(": \"");
    printer.out.push_str(&escape_bytes(bytes));
    printer.out.push('"');
    printer.end_field();
}

/// Re-scans a captured group body into records for structured printing.
fn scan_group_body(bytes: &[u8]) -> Option<UnknownFields> {
    let mut reader = Reader::new(bytes);
    let mut records = UnknownFields::new();
    while reader.has_more() {
        let tag = reader.read_tag().ok()?;
        if tag.wire_type == WireType::EndGroup {
            return None;
        }
        let raw = reader.skip_value(tag, GROUP_SCAN_DEPTH).ok()?;
        records.push(tag.field_number, tag.wire_type, raw.to_vec());
    }
    Some(records)
}

/// C-style escaping over raw bytes. Printable ASCII passes through;
/// everything else becomes a three-digit octal escape.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03o}", byte)),
        }
    }
    out
}

/// Parses a message from text format.
pub fn decode(
    descriptor: Arc<MessageDescriptor>,
    text: &str,
    registry: &ExtensionRegistry,
    options: &TextFormatDecodingOptions,
) -> Result<Message, TextFormatDecodingError> {
    let mut parser = Parser {
        input: text.as_bytes(),
        pos: 0,
        line: 1,
        column: 1,
        registry,
        options,
    };
    let mut message = Message::new(descriptor);
    parser.parse_fields(&mut message, None, options.message_depth_limit)?;
    Ok(message)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    registry: &'a ExtensionRegistry,
    options: &'a TextFormatDecodingOptions,
}

impl<'a> Parser<'a> {
    fn position(&self) -> TextPosition {
        TextPosition {
            line: self.line,
            column: self.column,
        }
    }

    fn error_at(&self, kind: TextFormatErrorKind, position: TextPosition) -> TextFormatDecodingError {
        TextFormatDecodingError { kind, position }
    }

    fn error(&self, kind: TextFormatErrorKind) -> TextFormatDecodingError {
        self.error_at(kind, self.position())
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    /// Skips whitespace, commas/semicolons between fields, and `#`
    /// comments running to end of line.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',' | b';') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8, what: &'static str) -> Result<(), TextFormatDecodingError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(TextFormatErrorKind::Expected(what)))
        }
    }

    fn read_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            return None;
        }
        Some(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    /// Parses fields until `terminator` (or end of input when `None`).
    fn parse_fields(
        &mut self,
        message: &mut Message,
        terminator: Option<u8>,
        depth: usize,
    ) -> Result<(), TextFormatDecodingError> {
        loop {
            self.skip_trivia();
            match (self.peek(), terminator) {
                (None, None) => return Ok(()),
                (None, Some(_)) => {
                    return Err(self.error(TextFormatErrorKind::Expected("closing delimiter")))
                }
                (Some(byte), Some(term)) if byte == term => {
                    self.bump();
                    return Ok(());
                }
                _ => {}
            }
            self.parse_one_field(message, depth)?;
        }
    }

    fn parse_one_field(
        &mut self,
        message: &mut Message,
        depth: usize,
    ) -> Result<(), TextFormatDecodingError> {
        let at = self.position();
        match self.peek() {
            Some(b'[') => self.parse_extension_field(message, depth, at),
            Some(byte) if byte.is_ascii_digit() => {
                self.parse_unknown_numeric_field(message, depth, at)
            }
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {
                self.parse_named_field(message, depth, at)
            }
            _ => Err(self.error(TextFormatErrorKind::Expected("field name"))),
        }
    }

    fn parse_named_field(
        &mut self,
        message: &mut Message,
        depth: usize,
        at: TextPosition,
    ) -> Result<(), TextFormatDecodingError> {
        let name = self
            .read_identifier()
            .ok_or_else(|| self.error(TextFormatErrorKind::Expected("field name")))?;
        let descriptor = message.descriptor().clone();
        match descriptor.field_by_name(&name) {
            Some(field) => {
                let field = field.clone();
                self.parse_field_value(message, &field, depth)
            }
            None if self.options.ignore_unknown_fields => self.skip_field_value(depth),
            None => Err(self.error_at(
                TextFormatErrorKind::UnknownField {
                    message_type: descriptor.full_name().to_string(),
                    field: name,
                },
                at,
            )),
        }
    }

    fn parse_extension_field(
        &mut self,
        message: &mut Message,
        depth: usize,
        at: TextPosition,
    ) -> Result<(), TextFormatDecodingError> {
        self.expect(b'[', "[")?;
        let mut name = String::new();
        loop {
            let part = self
                .read_identifier()
                .ok_or_else(|| self.error(TextFormatErrorKind::Expected("extension name")))?;
            name.push_str(&part);
            if self.eat(b'.') {
                name.push('.');
            } else {
                break;
            }
        }
        self.expect(b']', "]")?;

        let descriptor = message.descriptor().clone();
        match self.registry.lookup_by_name(descriptor.full_name(), &name) {
            Some(ext) => {
                let ext = ext.clone();
                match &ext.kind {
                    FieldKind::Singular { field_type, .. } => {
                        let field_type = field_type.clone();
                        self.expect_value_colon(&field_type)?;
                        let value = self.parse_value(&field_type, depth)?;
                        message.set_extension(&ext, value);
                        Ok(())
                    }
                    FieldKind::Repeated { field_type, .. } => {
                        let field_type = field_type.clone();
                        self.expect_value_colon(&field_type)?;
                        self.skip_trivia();
                        if self.peek() == Some(b'[') {
                            for value in self.parse_value_list(&field_type, depth)? {
                                message.push_extension(&ext, value);
                            }
                        } else {
                            let value = self.parse_value(&field_type, depth)?;
                            message.push_extension(&ext, value);
                        }
                        Ok(())
                    }
                    FieldKind::Map { .. } => {
                        Err(self.error(TextFormatErrorKind::Expected("non-map extension")))
                    }
                }
            }
            None if self.options.ignore_unknown_extension_fields => self.skip_field_value(depth),
            None => Err(self.error_at(
                TextFormatErrorKind::UnknownExtension {
                    message_type: descriptor.full_name().to_string(),
                    name,
                },
                at,
            )),
        }
    }

    fn parse_field_value(
        &mut self,
        message: &mut Message,
        field: &FieldDescriptor,
        depth: usize,
    ) -> Result<(), TextFormatDecodingError> {
        match &field.kind {
            FieldKind::Singular { field_type, .. } => {
                if let Some(oneof_index) = field.oneof_index {
                    if message.oneof_field(oneof_index).is_some() {
                        let oneof = message.descriptor().oneofs()[oneof_index].name.clone();
                        return Err(self.error(TextFormatErrorKind::DuplicateOneof { oneof }));
                    }
                }
                self.expect_value_colon(field_type)?;
                let value = self.parse_value(field_type, depth)?;
                message.set_field_value(field.number, FieldValue::Single(value));
                Ok(())
            }
            FieldKind::Repeated { field_type, .. } => {
                self.expect_value_colon(field_type)?;
                self.skip_trivia();
                let mut values = match message.field_value(field.number) {
                    Some(FieldValue::Repeated(values)) => values.clone(),
                    _ => Vec::new(),
                };
                if self.peek() == Some(b'[') {
                    values.extend(self.parse_value_list(field_type, depth)?);
                } else {
                    values.push(self.parse_value(field_type, depth)?);
                }
                message.set_field_value(field.number, FieldValue::Repeated(values));
                Ok(())
            }
            FieldKind::Map {
                key_type,
                value_type,
            } => {
                // Colon is optional before an entry block.
                self.skip_trivia();
                self.eat(b':');
                let (key, value) = self.parse_map_entry(*key_type, value_type, depth)?;
                let mut entries = match message.field_value(field.number) {
                    Some(FieldValue::Map(entries)) => entries.clone(),
                    _ => BTreeMap::new(),
                };
                entries.insert(key, value);
                message.set_field_value(field.number, FieldValue::Map(entries));
                Ok(())
            }
        }
    }

    /// Consumes the colon after a field name. It is optional before a
    /// message block.
    fn expect_value_colon(&mut self, field_type: &FieldType) -> Result<(), TextFormatDecodingError> {
        self.skip_trivia();
        if self.eat(b':') {
            return Ok(());
        }
        self.skip_trivia();
        if matches!(field_type, FieldType::Message(_)) && matches!(self.peek(), Some(b'{' | b'<')) {
            return Ok(());
        }
        Err(self.error(TextFormatErrorKind::Expected(":")))
    }

    fn parse_value_list(
        &mut self,
        field_type: &FieldType,
        depth: usize,
    ) -> Result<Vec<Value>, TextFormatDecodingError> {
        self.expect(b'[', "[")?;
        let mut values = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(b']') {
                return Ok(values);
            }
            values.push(self.parse_value(field_type, depth)?);
            self.skip_trivia();
            if !self.eat(b',') {
                self.expect(b']', "]")?;
                return Ok(values);
            }
        }
    }

    fn parse_value(
        &mut self,
        field_type: &FieldType,
        depth: usize,
    ) -> Result<Value, TextFormatDecodingError> {
        self.skip_trivia();
        Ok(match field_type {
            FieldType::Double => Value::Double(self.parse_float()?),
            FieldType::Float => Value::Float(self.parse_float()? as f32),
            FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => {
                Value::Int32(self.parse_int()?)
            }
            FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => {
                Value::Int64(self.parse_int()?)
            }
            FieldType::UInt32 | FieldType::Fixed32 => Value::UInt32(self.parse_uint()?),
            FieldType::UInt64 | FieldType::Fixed64 => Value::UInt64(self.parse_uint()?),
            FieldType::Bool => Value::Bool(self.parse_bool()?),
            FieldType::String => {
                let at = self.position();
                let bytes = self.parse_string_literal()?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| self.error_at(TextFormatErrorKind::MalformedEscape, at))?;
                Value::String(text)
            }
            FieldType::Bytes => Value::Bytes(self.parse_string_literal()?),
            FieldType::Enum(descriptor) => Value::Enum(self.parse_enum(descriptor)?),
            FieldType::Message(descriptor) => {
                if depth == 0 {
                    return Err(self.error(TextFormatErrorKind::DepthLimitExceeded {
                        limit: self.options.message_depth_limit,
                    }));
                }
                let terminator = self.open_block()?;
                let mut nested = Message::new(descriptor.clone());
                self.parse_fields(&mut nested, Some(terminator), depth - 1)?;
                Value::Message(Box::new(nested))
            }
        })
    }

    /// Consumes `{` or `<` and returns the matching closer.
    fn open_block(&mut self) -> Result<u8, TextFormatDecodingError> {
        self.skip_trivia();
        if self.eat(b'{') {
            Ok(b'}')
        } else if self.eat(b'<') {
            Ok(b'>')
        } else {
            Err(self.error(TextFormatErrorKind::Expected("{")))
        }
    }

    fn parse_map_entry(
        &mut self,
        key_type: MapKeyType,
        value_type: &FieldType,
        depth: usize,
    ) -> Result<(MapKey, Value), TextFormatDecodingError> {
        if depth == 0 {
            return Err(self.error(TextFormatErrorKind::DepthLimitExceeded {
                limit: self.options.message_depth_limit,
            }));
        }
        let terminator = self.open_block()?;
        let key_field_type = key_type.as_field_type();
        let mut key = None;
        let mut value = None;
        loop {
            self.skip_trivia();
            if self.eat(terminator) {
                break;
            }
            let at = self.position();
            let name = self
                .read_identifier()
                .ok_or_else(|| self.error(TextFormatErrorKind::Expected("key or value")))?;
            match name.as_str() {
                "key" => {
                    self.expect_value_colon(&key_field_type)?;
                    key = Some(self.parse_value(&key_field_type, depth - 1)?);
                }
                "value" => {
                    self.expect_value_colon(value_type)?;
                    value = Some(self.parse_value(value_type, depth - 1)?);
                }
                _ => return Err(self.error_at(TextFormatErrorKind::Expected("key or value"), at)),
            }
        }
        let key = match key.unwrap_or_else(|| Value::default_for(&key_field_type)) {
            Value::Int32(v) => MapKey::Int32(v),
            Value::Int64(v) => MapKey::Int64(v),
            Value::UInt32(v) => MapKey::UInt32(v),
            Value::UInt64(v) => MapKey::UInt64(v),
            Value::Bool(v) => MapKey::Bool(v),
            Value::String(v) => MapKey::String(v),
            _ => unreachable!("map key parsed to non-key value"),
        };
        Ok((key, value.unwrap_or_else(|| Value::default_for(value_type))))
    }

    /// Lexes one number token: sign, hex or decimal digits, fraction,
    /// exponent, optional `f` suffix.
    fn read_number_token(&mut self) -> Result<String, TextFormatDecodingError> {
        let start = self.pos;
        self.eat(b'-');
        if self.input[self.pos..].starts_with(b"0x") || self.input[self.pos..].starts_with(b"0X") {
            self.bump();
            self.bump();
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.bump();
            }
        } else {
            let mut seen_digit = false;
            while let Some(byte) = self.peek() {
                match byte {
                    b'0'..=b'9' => {
                        seen_digit = true;
                        self.bump();
                    }
                    b'.' | b'e' | b'E' | b'+' => {
                        self.bump();
                    }
                    b'-' if matches!(self.input.get(self.pos.wrapping_sub(1)), Some(b'e' | b'E')) => {
                        self.bump();
                    }
                    b'f' | b'F' => {
                        self.bump();
                        break;
                    }
                    _ => break,
                }
            }
            if !seen_digit {
                return Err(self.error(TextFormatErrorKind::MalformedNumber));
            }
        }
        if self.pos == start {
            return Err(self.error(TextFormatErrorKind::MalformedNumber));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_int<T: TryFrom<i64>>(&mut self) -> Result<T, TextFormatDecodingError> {
        let at = self.position();
        let token = self.read_number_token()?;
        let value = parse_i64_token(&token)
            .ok_or_else(|| self.error_at(TextFormatErrorKind::MalformedNumber, at))?;
        T::try_from(value)
            .map_err(|_| self.error_at(TextFormatErrorKind::NumberOutOfRange, at))
    }

    fn parse_uint<T: TryFrom<u64>>(&mut self) -> Result<T, TextFormatDecodingError> {
        let at = self.position();
        let token = self.read_number_token()?;
        let value = parse_u64_token(&token)
            .ok_or_else(|| self.error_at(TextFormatErrorKind::MalformedNumber, at))?;
        T::try_from(value)
            .map_err(|_| self.error_at(TextFormatErrorKind::NumberOutOfRange, at))
    }

    fn parse_float(&mut self) -> Result<f64, TextFormatDecodingError> {
        self.skip_trivia();
        let at = self.position();
        let negative = self.peek() == Some(b'-')
            && matches!(self.input.get(self.pos + 1), Some(b) if b.is_ascii_alphabetic());
        if negative {
            self.bump();
        }
        if matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
            let word = self
                .read_identifier()
                .ok_or_else(|| self.error(TextFormatErrorKind::MalformedNumber))?;
            return match word.to_ascii_lowercase().as_str() {
                "inf" | "infinity" => Ok(if negative { f64::NEG_INFINITY } else { f64::INFINITY }),
                "nan" => Ok(f64::NAN),
                _ => Err(self.error_at(TextFormatErrorKind::MalformedNumber, at)),
            };
        }
        let token = self.read_number_token()?;
        let trimmed = token.trim_end_matches(['f', 'F']);
        trimmed
            .parse::<f64>()
            .map_err(|_| self.error_at(TextFormatErrorKind::MalformedNumber, at))
    }

    fn parse_bool(&mut self) -> Result<bool, TextFormatDecodingError> {
        self.skip_trivia();
        let at = self.position();
        if let Some(word) = self.read_identifier() {
            return match word.as_str() {
                "true" | "True" | "t" => Ok(true),
                "false" | "False" | "f" => Ok(false),
                _ => Err(self.error_at(TextFormatErrorKind::Expected("true or false"), at)),
            };
        }
        match self.bump() {
            Some(b'1') => Ok(true),
            Some(b'0') => Ok(false),
            _ => Err(self.error_at(TextFormatErrorKind::Expected("true or false"), at)),
        }
    }

    fn parse_enum(&mut self, descriptor: &EnumDescriptor) -> Result<i32, TextFormatDecodingError> {
        self.skip_trivia();
        let at = self.position();
        match self.peek() {
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {
                let name = self
                    .read_identifier()
                    .ok_or_else(|| self.error(TextFormatErrorKind::Expected("enum value")))?;
                descriptor.number(&name).ok_or_else(|| {
                    self.error_at(
                        TextFormatErrorKind::UnknownEnumValue {
                            enum_type: descriptor.full_name().to_string(),
                            value: name,
                        },
                        at,
                    )
                })
            }
            _ => self.parse_int::<i32>(),
        }
    }

    /// Parses one or more adjacent string literals, concatenated.
    fn parse_string_literal(&mut self) -> Result<Vec<u8>, TextFormatDecodingError> {
        self.skip_trivia();
        let mut out = Vec::new();
        let mut first = true;
        loop {
            self.skip_trivia();
            let quote = match self.peek() {
                Some(q @ (b'"' | b'\'')) => q,
                _ if first => return Err(self.error(TextFormatErrorKind::Expected("string literal"))),
                _ => return Ok(out),
            };
            first = false;
            self.bump();
            loop {
                let at = self.position();
                match self.bump() {
                    None | Some(b'\n') => {
                        return Err(self.error_at(TextFormatErrorKind::UnterminatedString, at))
                    }
                    Some(byte) if byte == quote => break,
                    Some(b'\\') => self.parse_escape(&mut out, at)?,
                    Some(byte) => out.push(byte),
                }
            }
        }
    }

    fn parse_escape(
        &mut self,
        out: &mut Vec<u8>,
        at: TextPosition,
    ) -> Result<(), TextFormatDecodingError> {
        let malformed = |s: &Self| s.error_at(TextFormatErrorKind::MalformedEscape, at);
        match self.bump().ok_or_else(|| malformed(self))? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'?' => out.push(b'?'),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            digit @ b'0'..=b'7' => {
                let mut value = (digit - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return Err(malformed(self));
                }
                out.push(value as u8);
            }
            b'x' => {
                let mut value = 0u32;
                let mut seen = 0;
                while seen < 2 {
                    match self.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            value = value * 16 + (d as char).to_digit(16).unwrap_or(0);
                            self.bump();
                            seen += 1;
                        }
                        _ => break,
                    }
                }
                if seen == 0 {
                    return Err(malformed(self));
                }
                out.push(value as u8);
            }
            b'u' => {
                let mut value = 0u32;
                for _ in 0..4 {
                    match self.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            value = value * 16 + (d as char).to_digit(16).unwrap_or(0);
                            self.bump();
                        }
                        _ => return Err(malformed(self)),
                    }
                }
                let c = char::from_u32(value).ok_or_else(|| malformed(self))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            _ => return Err(malformed(self)),
        }
        Ok(())
    }

    /// Parses a `number: value` or `number { ... }` reference to a field
    /// the schema does not declare, capturing it as an unknown record.
    fn parse_unknown_numeric_field(
        &mut self,
        message: &mut Message,
        depth: usize,
        at: TextPosition,
    ) -> Result<(), TextFormatDecodingError> {
        let number: u32 = self.parse_uint()?;
        if !crate::wire::is_valid_field_number(number) {
            return Err(self.error_at(TextFormatErrorKind::NumberOutOfRange, at));
        }
        let record = self.parse_unknown_value(number, depth)?;
        if self.options.ignore_unknown_fields {
            return Ok(());
        }
        message
            .unknown_fields_mut()
            .push(record.number, record.wire_type, record.bytes);
        Ok(())
    }

    fn parse_unknown_value(
        &mut self,
        number: u32,
        depth: usize,
    ) -> Result<UnknownField, TextFormatDecodingError> {
        self.skip_trivia();
        if matches!(self.peek(), Some(b'{' | b'<')) {
            // Brace block: capture the nested records as a group body.
            let records = self.parse_unknown_block(depth)?;
            let mut writer = Writer::new();
            records.encode_into(&mut writer);
            return Ok(UnknownField {
                number,
                wire_type: WireType::StartGroup,
                bytes: writer.into_bytes(),
            });
        }
        self.expect(b':', ":")?;
        self.skip_trivia();
        let at = self.position();
        match self.peek() {
            Some(b'"' | b'\'') => {
                let bytes = self.parse_string_literal()?;
                Ok(UnknownField {
                    number,
                    wire_type: WireType::LengthDelimited,
                    bytes,
                })
            }
            Some(b'{' | b'<') => {
                let records = self.parse_unknown_block(depth)?;
                let mut writer = Writer::new();
                records.encode_into(&mut writer);
                Ok(UnknownField {
                    number,
                    wire_type: WireType::StartGroup,
                    bytes: writer.into_bytes(),
                })
            }
            _ => {
                let token = self.read_number_token()?;
                if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
                    let value = u64::from_str_radix(rest, 16)
                        .map_err(|_| self.error_at(TextFormatErrorKind::MalformedNumber, at))?;
                    return match rest.len() {
                        8 => Ok(UnknownField {
                            number,
                            wire_type: WireType::Fixed32,
                            bytes: (value as u32).to_le_bytes().to_vec(),
                        }),
                        16 => Ok(UnknownField {
                            number,
                            wire_type: WireType::Fixed64,
                            bytes: value.to_le_bytes().to_vec(),
                        }),
                        _ => Err(self.error_at(
                            TextFormatErrorKind::UnrepresentableUnknownField { number },
                            at,
                        )),
                    };
                }
                if token.contains(['.', 'e', 'E', 'f', 'F']) {
                    // No wire type can carry a bare float faithfully.
                    return Err(self.error_at(
                        TextFormatErrorKind::UnrepresentableUnknownField { number },
                        at,
                    ));
                }
                // Non-negative values may exceed i64::MAX; a rendered
                // varint record prints as unsigned decimal.
                let mut writer = Writer::new();
                if token.starts_with('-') {
                    let value = parse_i64_token(&token)
                        .ok_or_else(|| self.error_at(TextFormatErrorKind::MalformedNumber, at))?;
                    writer.write_varint_signed(value);
                } else {
                    let value = parse_u64_token(&token)
                        .ok_or_else(|| self.error_at(TextFormatErrorKind::MalformedNumber, at))?;
                    writer.write_varint(value);
                }
                Ok(UnknownField {
                    number,
                    wire_type: WireType::Varint,
                    bytes: writer.into_bytes(),
                })
            }
        }
    }

    /// Parses a block of numeric-only references into unknown records.
    fn parse_unknown_block(
        &mut self,
        depth: usize,
    ) -> Result<UnknownFields, TextFormatDecodingError> {
        if depth == 0 {
            return Err(self.error(TextFormatErrorKind::DepthLimitExceeded {
                limit: self.options.message_depth_limit,
            }));
        }
        let terminator = self.open_block()?;
        let mut records = UnknownFields::new();
        loop {
            self.skip_trivia();
            if self.eat(terminator) {
                return Ok(records);
            }
            let at = self.position();
            if !matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                return Err(self.error(TextFormatErrorKind::Expected("field number")));
            }
            let number: u32 = self.parse_uint()?;
            if !crate::wire::is_valid_field_number(number) {
                return Err(self.error_at(TextFormatErrorKind::NumberOutOfRange, at));
            }
            let record = self.parse_unknown_value(number, depth - 1)?;
            records.push(record.number, record.wire_type, record.bytes);
        }
    }

    /// Skips a value of any shape after an ignored unknown field name.
    fn skip_field_value(&mut self, depth: usize) -> Result<(), TextFormatDecodingError> {
        self.skip_trivia();
        self.eat(b':');
        self.skip_trivia();
        match self.peek() {
            Some(b'{' | b'<') => self.skip_block(depth),
            Some(b'[') => {
                self.bump();
                loop {
                    self.skip_trivia();
                    if self.eat(b']') {
                        return Ok(());
                    }
                    self.skip_scalar(depth)?;
                    self.skip_trivia();
                    self.eat(b',');
                }
            }
            _ => self.skip_scalar(depth),
        }
    }

    fn skip_scalar(&mut self, depth: usize) -> Result<(), TextFormatDecodingError> {
        self.skip_trivia();
        match self.peek() {
            Some(b'"' | b'\'') => {
                self.parse_string_literal()?;
                Ok(())
            }
            Some(b'{' | b'<') => self.skip_block(depth),
            Some(byte) if byte == b'-' || byte.is_ascii_digit() => {
                self.read_number_token()?;
                Ok(())
            }
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {
                self.read_identifier();
                Ok(())
            }
            _ => Err(self.error(TextFormatErrorKind::Expected("value"))),
        }
    }

    fn skip_block(&mut self, depth: usize) -> Result<(), TextFormatDecodingError> {
        if depth == 0 {
            return Err(self.error(TextFormatErrorKind::DepthLimitExceeded {
                limit: self.options.message_depth_limit,
            }));
        }
        let terminator = self.open_block()?;
        loop {
            self.skip_trivia();
            if self.eat(terminator) {
                return Ok(());
            }
            if self.peek().is_none() {
                return Err(self.error(TextFormatErrorKind::Expected("closing delimiter")));
            }
            match self.peek() {
                Some(b'[') => {
                    // Bracketed extension name or list.
                    self.bump();
                    while let Some(byte) = self.peek() {
                        if byte == b']' {
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                Some(byte) if byte.is_ascii_alphanumeric() || byte == b'_' => {
                    self.read_identifier();
                    while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                        self.bump();
                    }
                    self.skip_field_value(depth - 1)?;
                }
                _ => {
                    self.skip_field_value(depth - 1)?;
                }
            }
        }
    }
}

fn parse_i64_token(token: &str) -> Option<i64> {
    if let Some(rest) = token.strip_prefix("-0x").or_else(|| token.strip_prefix("-0X")) {
        let magnitude = u64::from_str_radix(rest, 16).ok()?;
        return i64::try_from(magnitude).ok().map(|v| -v);
    }
    if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return i64::try_from(u64::from_str_radix(rest, 16).ok()?).ok();
    }
    token.parse().ok()
}

fn parse_u64_token(token: &str) -> Option<u64> {
    if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u64::from_str_radix(rest, 16).ok();
    }
    token.parse().ok()
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
            FieldDescriptor::singular(1, "name", FieldType::String),
            FieldDescriptor::repeated(2, "scores", FieldType::Int32),
            FieldDescriptor::singular(3, "color", FieldType::Enum(color)),
            FieldDescriptor::singular(4, "data", FieldType::Bytes),
            FieldDescriptor::map(5, "labels", MapKeyType::String, FieldType::Int32),
        ])
        .unwrap();
        desc
    }

    fn decode_default(
        desc: Arc<MessageDescriptor>,
        text: &str,
    ) -> Result<Message, TextFormatDecodingError> {
        decode(desc, text, &registry(), &TextFormatDecodingOptions::default())
    }

    #[test]
    fn test_encode_basic_fields() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String("ada".into()));
            m.push(2, Value::Int32(1));
            m.push(2, Value::Int32(2));
            m.set(3, Value::Enum(1));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "name: \"ada\"\nscores: 1\nscores: 2\ncolor: RED\n");
    }

    #[test]
    fn test_encode_compact() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String("ada".into()));
            m.push(2, Value::Int32(1));
        });
        let options = TextFormatEncodingOptions {
            compact: true,
            ..Default::default()
        };
        assert_eq!(encode(&msg, &options).unwrap(), "name: \"ada\" scores: 1");
    }

    #[test]
    fn test_roundtrip_with_nested_message() {
        let inner = MessageDescriptor::new("test.Inner");
        inner
            .set_fields(vec![FieldDescriptor::singular(1, "x", FieldType::Int32)])
            .unwrap();
        let outer = MessageDescriptor::new("test.Outer");
        outer
            .set_fields(vec![
                FieldDescriptor::singular(1, "inner", FieldType::Message(inner.clone())),
                FieldDescriptor::singular(2, "tag", FieldType::String),
            ])
            .unwrap();

        let msg = Message::build(outer.clone(), |m| {
            m.set(
                1,
                Value::Message(Box::new(Message::build(inner, |i| i.set(1, Value::Int32(7))))),
            );
            m.set(2, Value::String("deep".into()));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "inner {\n  x: 7\n}\ntag: \"deep\"\n");
        assert_eq!(decode_default(outer, &text).unwrap(), msg);
    }

    #[test]
    fn test_decode_tolerates_comments_and_separators() {
        let text = "# leading comment\nname: \"ada\",  scores: 1;\nscores: 2 # trailing\n";
        let msg = decode_default(person(), text).unwrap();
        assert_eq!(msg.get(1), Some(&Value::String("ada".into())));
        assert_eq!(msg.get_repeated(2).len(), 2);
    }

    #[test]
    fn test_decode_bracketed_list_and_append() {
        let msg = decode_default(person(), "scores: [1, 2] scores: 3").unwrap();
        assert_eq!(
            msg.get_repeated(2),
            &[Value::Int32(1), Value::Int32(2), Value::Int32(3)]
        );
    }

    #[test]
    fn test_decode_angle_bracket_blocks_and_optional_colon() {
        let inner = MessageDescriptor::new("test.Inner");
        inner
            .set_fields(vec![FieldDescriptor::singular(1, "x", FieldType::Int32)])
            .unwrap();
        let outer = MessageDescriptor::new("test.Outer");
        outer
            .set_fields(vec![FieldDescriptor::singular(
                1,
                "inner",
                FieldType::Message(inner),
            )])
            .unwrap();

        let with_colon = decode_default(outer.clone(), "inner: { x: 1 }").unwrap();
        let without = decode_default(outer.clone(), "inner { x: 1 }").unwrap();
        let angle = decode_default(outer, "inner < x: 1 >").unwrap();
        assert_eq!(with_colon, without);
        assert_eq!(without, angle);
    }

    #[test]
    fn test_string_escapes_roundtrip() {
        let msg = Message::build(person(), |m| {
            m.set(1, Value::String("a\"b\\c\nd\té".into()));
            m.set(4, Value::Bytes(vec![0x00, 0xff, b'x']));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(decode_default(person(), &text).unwrap(), msg);
    }

    #[test]
    fn test_decode_escape_forms() {
        let msg = decode_default(person(), r#"data: "\x41\102C""#).unwrap();
        assert_eq!(msg.get(4), Some(&Value::Bytes(b"ABC".to_vec())));

        let msg = decode_default(person(), "name: 'sin' \"gle\"").unwrap();
        assert_eq!(msg.get(1), Some(&Value::String("single".into())));
    }

    #[test]
    fn test_unterminated_string_position() {
        let err = decode_default(person(), "scores: 1\nname: \"oops").unwrap_err();
        assert!(matches!(err.kind, TextFormatErrorKind::UnterminatedString));
        assert_eq!(err.position.line, 2);
    }

    #[test]
    fn test_unknown_field_strict_and_lenient() {
        let text = "nonexistent: 5 name: \"ada\"";
        let err = decode_default(person(), text).unwrap_err();
        assert!(matches!(
            err.kind,
            TextFormatErrorKind::UnknownField { ref field, .. } if field == "nonexistent"
        ));
        assert_eq!(err.position, TextPosition { line: 1, column: 1 });

        let lenient = TextFormatDecodingOptions {
            ignore_unknown_fields: true,
            ..Default::default()
        };
        let msg = decode(person(), text, &registry(), &lenient).unwrap();
        assert_eq!(msg.get(1), Some(&Value::String("ada".into())));
    }

    #[test]
    fn test_extension_roundtrip() {
        let ext = ExtensionDescriptor::singular("test.Person", "test.nickname", 100, FieldType::String);
        let mut with_ext = ExtensionRegistry::new();
        with_ext.register(ext.clone()).unwrap();

        let msg = Message::build(person(), |m| {
            m.set_extension(&ext, Value::String("gull".into()));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "[test.nickname]: \"gull\"\n");

        let back = decode(person(), &text, &with_ext, &TextFormatDecodingOptions::default()).unwrap();
        assert_eq!(back.get_extension(&ext), Some(&Value::String("gull".into())));

        let err = decode_default(person(), &text).unwrap_err();
        assert!(matches!(err.kind, TextFormatErrorKind::UnknownExtension { .. }));
    }

    #[test]
    fn test_unknown_numeric_fields_roundtrip() {
        let msg = Message::build(person(), |m| {
            m.unknown_fields_mut().push(99, WireType::Varint, vec![0xac, 0x02]);
            m.unknown_fields_mut()
                .push(98, WireType::LengthDelimited, b"raw".to_vec());
            m.unknown_fields_mut()
                .push(97, WireType::Fixed32, 42u32.to_le_bytes().to_vec());
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "99: 300\n98: \"raw\"\n97: 0x0000002a\n");

        let back = decode_default(person(), &text).unwrap();
        assert_eq!(back.unknown_fields(), msg.unknown_fields());
    }

    #[test]
    fn test_unknown_group_roundtrip() {
        let msg = Message::build(person(), |m| {
            // Body: field 1 varint 5.
            m.unknown_fields_mut()
                .push(50, WireType::StartGroup, vec![0x08, 0x05]);
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "50 {\n  1: 5\n}\n");
        let back = decode_default(person(), &text).unwrap();
        assert_eq!(back.unknown_fields(), msg.unknown_fields());
    }

    #[test]
    fn test_unknown_float_reference_rejected() {
        let err = decode_default(person(), "99: 1.5").unwrap_err();
        assert!(matches!(
            err.kind,
            TextFormatErrorKind::UnrepresentableUnknownField { number: 99 }
        ));
    }

    #[test]
    fn test_map_roundtrip() {
        let msg = Message::build(person(), |m| {
            m.insert_map_entry(5, MapKey::String("a".into()), Value::Int32(1));
            m.insert_map_entry(5, MapKey::String("b".into()), Value::Int32(2));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(
            text,
            "labels {\n  key: \"a\"\n  value: 1\n}\nlabels {\n  key: \"b\"\n  value: 2\n}\n"
        );
        assert_eq!(decode_default(person(), &text).unwrap(), msg);
    }

    #[test]
    fn test_float_specials_roundtrip() {
        let desc = MessageDescriptor::new("test.Floats");
        desc.set_fields(vec![
            FieldDescriptor::singular(1, "x", FieldType::Double),
            FieldDescriptor::singular(2, "y", FieldType::Float),
        ])
        .unwrap();

        let msg = Message::build(desc.clone(), |m| {
            m.set(1, Value::Double(f64::NEG_INFINITY));
            m.set(2, Value::Float(0.5));
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "x: -inf\ny: 0.5\n");
        assert_eq!(decode_default(desc.clone(), &text).unwrap(), msg);

        let nan = decode_default(desc, "x: nan").unwrap();
        match nan.get(1) {
            Some(Value::Double(v)) => assert!(v.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn test_number_overflow_position() {
        let err = decode_default(person(), "scores: 99999999999").unwrap_err();
        assert!(matches!(err.kind, TextFormatErrorKind::NumberOutOfRange));
        assert_eq!(err.position.column, 9);
    }

    #[test]
    fn test_unterminated_block() {
        let inner = MessageDescriptor::new("test.Inner");
        inner
            .set_fields(vec![FieldDescriptor::singular(1, "x", FieldType::Int32)])
            .unwrap();
        let outer = MessageDescriptor::new("test.Outer");
        outer
            .set_fields(vec![FieldDescriptor::singular(
                1,
                "inner",
                FieldType::Message(inner),
            )])
            .unwrap();

        let err = decode_default(outer, "inner { x: 1").unwrap_err();
        assert!(matches!(err.kind, TextFormatErrorKind::Expected("closing delimiter")));
    }

    #[test]
    fn test_oneof_duplicate_rejected() {
        let desc = MessageDescriptor::with_oneofs("test.Choice", &["kind"]);
        desc.set_fields(vec![
            FieldDescriptor::singular(1, "text", FieldType::String).in_oneof(0),
            FieldDescriptor::singular(2, "code", FieldType::Int32).in_oneof(0),
        ])
        .unwrap();

        let err = decode_default(desc, "text: \"x\" code: 1").unwrap_err();
        assert!(matches!(
            err.kind,
            TextFormatErrorKind::DuplicateOneof { ref oneof } if oneof == "kind"
        ));
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

        let mut text = String::from("child {}");
        for _ in 0..4 {
            text = format!("child {{ {text} }}");
        }
        let shallow = TextFormatDecodingOptions {
            message_depth_limit: 4,
            ..Default::default()
        };
        assert!(matches!(
            decode(node.clone(), &text, &registry(), &shallow).unwrap_err().kind,
            TextFormatErrorKind::DepthLimitExceeded { limit: 4 }
        ));
        let deep = TextFormatDecodingOptions {
            message_depth_limit: 5,
            ..Default::default()
        };
        assert!(decode(node, &text, &registry(), &deep).is_ok());
    }

    #[test]
    fn test_unknown_block_depth_limit() {
        let mut text = String::from("2: 5");
        for _ in 0..5 {
            text = format!("1 {{ {text} }}");
        }
        let shallow = TextFormatDecodingOptions {
            message_depth_limit: 4,
            ..Default::default()
        };
        assert!(matches!(
            decode(person(), &text, &registry(), &shallow).unwrap_err().kind,
            TextFormatErrorKind::DepthLimitExceeded { limit: 4 }
        ));
        let deep = TextFormatDecodingOptions {
            message_depth_limit: 5,
            ..Default::default()
        };
        let msg = decode(person(), &text, &registry(), &deep).unwrap();
        assert_eq!(msg.unknown_fields().len(), 1);

        // Unclosed nesting fails at the limit instead of recursing away.
        let hostile = "1{".repeat(10_000);
        let err = decode_default(person(), &hostile).unwrap_err();
        assert!(matches!(
            err.kind,
            TextFormatErrorKind::DepthLimitExceeded { limit: 100 }
        ));
    }

    #[test]
    fn test_malformed_unknown_record_prints_as_bytes() {
        let msg = Message::build(person(), |m| {
            // Truncated varint payload and an undersized fixed32 payload.
            m.unknown_fields_mut().push(99, WireType::Varint, vec![0x80]);
            m.unknown_fields_mut().push(98, WireType::Fixed32, vec![1, 2]);
        });
        let text = encode(&msg, &TextFormatEncodingOptions::default()).unwrap();
        assert_eq!(text, "99: \"\\200\"\n98: \"\\001\\002\"\n");
    }

    #[test]
    fn test_enum_open_by_number() {
        let msg = decode_default(person(), "color: 42").unwrap();
        assert_eq!(msg.get(3), Some(&Value::Enum(42)));

        let err = decode_default(person(), "color: CHARTREUSE").unwrap_err();
        assert!(matches!(err.kind, TextFormatErrorKind::UnknownEnumValue { .. }));
    }
}
