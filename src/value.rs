//! The in-memory value model: dynamic messages driven by field catalogs.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{FieldDescriptor, FieldKind, FieldType, MessageDescriptor};
use crate::extensions::ExtensionDescriptor;
use crate::unknown::UnknownFields;

/// One field value of any declared type.
///
/// The sint/fixed variants of the wire format share the plain integer
/// variants here; the descriptor decides how a value goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Raw enum number. Open enums: any i32 is representable, named or not.
    Enum(i32),
    Message(Box<Message>),
}

impl Value {
    /// The default value for a field type (proto3 zero value).
    ///
    /// Message fields have no zero value; their default is absence, so
    /// this returns an empty message of the right type.
    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Double => Value::Double(0.0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => Value::Int32(0),
            FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => Value::Int64(0),
            FieldType::UInt32 | FieldType::Fixed32 => Value::UInt32(0),
            FieldType::UInt64 | FieldType::Fixed64 => Value::UInt64(0),
            FieldType::Bool => Value::Bool(false),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Enum(_) => Value::Enum(0),
            FieldType::Message(desc) => Value::Message(Box::new(Message::new(desc.clone()))),
        }
    }

    /// True if this is the zero value that implicit-presence fields
    /// omit on encode. Messages are never default.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Double(v) => *v == 0.0,
            Value::Float(v) => *v == 0.0,
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::UInt32(v) => *v == 0,
            Value::UInt64(v) => *v == 0,
            Value::Bool(v) => !v,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Enum(v) => *v == 0,
            Value::Message(_) => false,
        }
    }
}

/// A map field key: the integral/bool/string subset of [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    String(String),
}

/// The populated state of one field slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Value),
    Repeated(Vec<Value>),
    /// `BTreeMap` keeps map encoding deterministic without an option.
    Map(BTreeMap<MapKey, Value>),
}

/// An extension value paired with the descriptor that resolved it.
#[derive(Debug, Clone)]
pub struct ExtensionValue {
    pub descriptor: Arc<ExtensionDescriptor>,
    pub value: FieldValue,
}

impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.extended_type == other.descriptor.extended_type
            && self.descriptor.number == other.descriptor.number
            && self.value == other.value
    }
}

/// A dynamic message value: field number to value mapping plus the
/// unknown-field and extension-value stores.
///
/// Mutating accessors taking a field number panic if the number is not
/// in the descriptor's catalog or the value shape contradicts the
/// field's cardinality; both are programming errors in the caller, on
/// par with out-of-bounds indexing. Decoders never hit these paths for
/// hostile input because they resolve descriptors first.
#[derive(Debug, Clone)]
pub struct Message {
    descriptor: Arc<MessageDescriptor>,
    fields: BTreeMap<u32, FieldValue>,
    unknown: UnknownFields,
    extensions: BTreeMap<u32, ExtensionValue>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name()
            && self.fields == other.fields
            && self.unknown == other.unknown
            && self.extensions == other.extensions
    }
}

impl Message {
    /// Creates an empty message of the given type.
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
            unknown: UnknownFields::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Scoped construction: creates an empty message, hands it to the
    /// mutator, returns the result.
    pub fn build(descriptor: Arc<MessageDescriptor>, f: impl FnOnce(&mut Message)) -> Self {
        let mut message = Self::new(descriptor);
        f(&mut message);
        message
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    fn expect_field(&self, number: u32) -> &FieldDescriptor {
        self.descriptor.field(number).unwrap_or_else(|| {
            panic!(
                "field {} is not declared by {}",
                number,
                self.descriptor.full_name()
            )
        })
    }

    /// True if the field slot is populated.
    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// The populated slot for a field, if any.
    pub fn field_value(&self, number: u32) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    /// A populated singular value, if any.
    pub fn get(&self, number: u32) -> Option<&Value> {
        match self.fields.get(&number) {
            Some(FieldValue::Single(v)) => Some(v),
            _ => None,
        }
    }

    /// The elements of a repeated field; empty when unpopulated.
    pub fn get_repeated(&self, number: u32) -> &[Value] {
        match self.fields.get(&number) {
            Some(FieldValue::Repeated(values)) => values,
            _ => &[],
        }
    }

    /// The entries of a map field, if populated.
    pub fn get_map(&self, number: u32) -> Option<&BTreeMap<MapKey, Value>> {
        match self.fields.get(&number) {
            Some(FieldValue::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    /// Sets a singular field. For a oneof member, the group's other
    /// members are cleared first.
    pub fn set(&mut self, number: u32, value: Value) {
        let field = self.expect_field(number);
        assert!(
            matches!(field.kind, FieldKind::Singular { .. }),
            "field {} of {} is not singular",
            number,
            self.descriptor.full_name()
        );
        if let Some(oneof_index) = field.oneof_index {
            self.clear_oneof(oneof_index);
        }
        self.fields.insert(number, FieldValue::Single(value));
    }

    /// Appends to a repeated field.
    pub fn push(&mut self, number: u32, value: Value) {
        let field = self.expect_field(number);
        assert!(
            matches!(field.kind, FieldKind::Repeated { .. }),
            "field {} of {} is not repeated",
            number,
            self.descriptor.full_name()
        );
        match self
            .fields
            .entry(number)
            .or_insert_with(|| FieldValue::Repeated(Vec::new()))
        {
            FieldValue::Repeated(values) => values.push(value),
            _ => unreachable!("repeated slot holds non-repeated value"),
        }
    }

    /// Inserts one map entry, overwriting an existing key.
    pub fn insert_map_entry(&mut self, number: u32, key: MapKey, value: Value) {
        let field = self.expect_field(number);
        assert!(
            matches!(field.kind, FieldKind::Map { .. }),
            "field {} of {} is not a map",
            number,
            self.descriptor.full_name()
        );
        match self
            .fields
            .entry(number)
            .or_insert_with(|| FieldValue::Map(BTreeMap::new()))
        {
            FieldValue::Map(entries) => {
                entries.insert(key, value);
            }
            _ => unreachable!("map slot holds non-map value"),
        }
    }

    /// Clears a field slot.
    pub fn clear(&mut self, number: u32) {
        self.fields.remove(&number);
    }

    /// Removes every populated member of the oneof at `oneof_index`.
    fn clear_oneof(&mut self, oneof_index: usize) {
        let members: Vec<u32> = self
            .descriptor
            .oneof_members(oneof_index)
            .map(|f| f.number)
            .collect();
        for number in members {
            self.fields.remove(&number);
        }
    }

    /// The populated member of a oneof, if any.
    pub fn oneof_field(&self, oneof_index: usize) -> Option<(&FieldDescriptor, &Value)> {
        for field in self.descriptor.oneof_members(oneof_index) {
            if let Some(FieldValue::Single(v)) = self.fields.get(&field.number) {
                return Some((field, v));
            }
        }
        None
    }

    /// Installs a whole slot. Codecs use this after decoding; the caller
    /// is responsible for the shape matching the descriptor.
    pub(crate) fn set_field_value(&mut self, number: u32, value: FieldValue) {
        if let Some(field) = self.descriptor.field(number) {
            if let Some(oneof_index) = field.oneof_index {
                self.clear_oneof(oneof_index);
            }
        }
        self.fields.insert(number, value);
    }

    /// Iterates populated fields in ascending number order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn unknown_fields(&self) -> &UnknownFields {
        &self.unknown
    }

    pub fn unknown_fields_mut(&mut self) -> &mut UnknownFields {
        &mut self.unknown
    }

    /// Sets a singular extension value.
    pub fn set_extension(&mut self, descriptor: &Arc<ExtensionDescriptor>, value: Value) {
        self.extensions.insert(
            descriptor.number,
            ExtensionValue {
                descriptor: descriptor.clone(),
                value: FieldValue::Single(value),
            },
        );
    }

    /// Appends to a repeated extension.
    pub fn push_extension(&mut self, descriptor: &Arc<ExtensionDescriptor>, value: Value) {
        let slot = self
            .extensions
            .entry(descriptor.number)
            .or_insert_with(|| ExtensionValue {
                descriptor: descriptor.clone(),
                value: FieldValue::Repeated(Vec::new()),
            });
        match &mut slot.value {
            FieldValue::Repeated(values) => values.push(value),
            other => *other = FieldValue::Repeated(vec![value]),
        }
    }

    /// A populated singular extension value.
    pub fn get_extension(&self, descriptor: &ExtensionDescriptor) -> Option<&Value> {
        match self.extensions.get(&descriptor.number) {
            Some(ExtensionValue {
                value: FieldValue::Single(v),
                ..
            }) => Some(v),
            _ => None,
        }
    }

    /// The elements of a repeated extension; empty when unpopulated.
    pub fn get_extension_repeated(&self, descriptor: &ExtensionDescriptor) -> &[Value] {
        match self.extensions.get(&descriptor.number) {
            Some(ExtensionValue {
                value: FieldValue::Repeated(values),
                ..
            }) => values,
            _ => &[],
        }
    }

    pub fn has_extension(&self, descriptor: &ExtensionDescriptor) -> bool {
        self.extensions.contains_key(&descriptor.number)
    }

    pub fn clear_extension(&mut self, descriptor: &ExtensionDescriptor) {
        self.extensions.remove(&descriptor.number);
    }

    /// Iterates populated extensions in ascending number order.
    pub fn extension_values(&self) -> impl Iterator<Item = &ExtensionValue> {
        self.extensions.values()
    }

    pub(crate) fn extension_value_mut(&mut self, number: u32) -> Option<&mut ExtensionValue> {
        self.extensions.get_mut(&number)
    }

    pub(crate) fn insert_extension_value(&mut self, value: ExtensionValue) {
        self.extensions.insert(value.descriptor.number, value);
    }

    /// Merges `other` into `self` with wire merge semantics: singular
    /// scalars take the newer value, singular messages merge
    /// recursively, repeated fields append, map entries overwrite by
    /// key. Unknown fields and extensions follow the same rules.
    pub fn merge_from(&mut self, other: &Message) {
        for (number, incoming) in &other.fields {
            merge_slot(&mut self.fields, *number, incoming);
        }
        for field in self.descriptor.clone().fields() {
            // A merged-in oneof member silences its siblings.
            if let Some(oneof_index) = field.oneof_index {
                if other.fields.contains_key(&field.number) {
                    let keep = field.number;
                    let members: Vec<u32> = self
                        .descriptor
                        .oneof_members(oneof_index)
                        .map(|f| f.number)
                        .filter(|n| *n != keep)
                        .collect();
                    for n in members {
                        self.fields.remove(&n);
                    }
                }
            }
        }
        self.unknown.merge(&other.unknown);
        for incoming in other.extensions.values() {
            match self.extensions.get_mut(&incoming.descriptor.number) {
                Some(existing) => merge_field_value(&mut existing.value, &incoming.value),
                None => {
                    self.extensions
                        .insert(incoming.descriptor.number, incoming.clone());
                }
            }
        }
    }
}

fn merge_slot(fields: &mut BTreeMap<u32, FieldValue>, number: u32, incoming: &FieldValue) {
    match fields.get_mut(&number) {
        Some(existing) => merge_field_value(existing, incoming),
        None => {
            fields.insert(number, incoming.clone());
        }
    }
}

fn merge_field_value(existing: &mut FieldValue, incoming: &FieldValue) {
    match (existing, incoming) {
        (FieldValue::Single(Value::Message(a)), FieldValue::Single(Value::Message(b))) => {
            a.merge_from(b);
        }
        (FieldValue::Repeated(a), FieldValue::Repeated(b)) => {
            a.extend(b.iter().cloned());
        }
        (FieldValue::Map(a), FieldValue::Map(b)) => {
            for (k, v) in b {
                a.insert(k.clone(), v.clone());
            }
        }
        (existing, incoming) => *existing = incoming.clone(),
    }
}
