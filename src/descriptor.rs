//! Static field catalogs: the schema metadata generated types supply.
//!
//! Descriptors are immutable once built and shared via `Arc`; generated
//! code is expected to hold them in process-lifetime statics. Fields are
//! installed through a one-shot setter after the `Arc` exists so a
//! message type can declare a field of its own type.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::DescriptorError;
use crate::wire::{is_valid_field_number, WireType};

/// The value type of a declared field.
#[derive(Debug, Clone)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    Enum(Arc<EnumDescriptor>),
    Message(Arc<MessageDescriptor>),
}

impl FieldType {
    /// The wire type a singular value of this type is encoded with.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::SInt32
            | FieldType::SInt64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// True for types that may use the packed repeated encoding.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message(_)
        )
    }
}

/// Key type of a map field: the integral/bool/string subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKeyType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
}

impl MapKeyType {
    /// The equivalent scalar field type, used by the map-entry codec.
    pub fn as_field_type(&self) -> FieldType {
        match self {
            MapKeyType::Int32 => FieldType::Int32,
            MapKeyType::Int64 => FieldType::Int64,
            MapKeyType::UInt32 => FieldType::UInt32,
            MapKeyType::UInt64 => FieldType::UInt64,
            MapKeyType::SInt32 => FieldType::SInt32,
            MapKeyType::SInt64 => FieldType::SInt64,
            MapKeyType::Fixed32 => FieldType::Fixed32,
            MapKeyType::Fixed64 => FieldType::Fixed64,
            MapKeyType::SFixed32 => FieldType::SFixed32,
            MapKeyType::SFixed64 => FieldType::SFixed64,
            MapKeyType::Bool => FieldType::Bool,
            MapKeyType::String => FieldType::String,
        }
    }
}

/// Cardinality and payload type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Exactly zero or one value. `explicit_presence` distinguishes
    /// proto3 `optional` (and all message fields) from implicit-presence
    /// scalars, which skip their default value on encode.
    Singular {
        field_type: FieldType,
        explicit_presence: bool,
    },
    /// Zero or more values. `packed` selects the encode-side layout for
    /// packable scalars; both layouts are always accepted on decode.
    Repeated { field_type: FieldType, packed: bool },
    /// Map, encoded as repeated two-field entry submessages.
    Map {
        key_type: MapKeyType,
        value_type: FieldType,
    },
}

impl FieldKind {
    /// The payload type (map value type for maps).
    pub fn value_type(&self) -> &FieldType {
        match self {
            FieldKind::Singular { field_type, .. } => field_type,
            FieldKind::Repeated { field_type, .. } => field_type,
            FieldKind::Map { value_type, .. } => value_type,
        }
    }
}

/// Static metadata for one declared field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub number: u32,
    pub name: String,
    pub json_name: String,
    pub kind: FieldKind,
    /// Index into the message's oneof list, if this field is a member.
    pub oneof_index: Option<usize>,
}

impl FieldDescriptor {
    /// A singular field with implicit presence.
    pub fn singular(number: u32, name: &str, field_type: FieldType) -> Self {
        Self::build(
            number,
            name,
            FieldKind::Singular {
                explicit_presence: matches!(field_type, FieldType::Message(_)),
                field_type,
            },
        )
    }

    /// A singular field with explicit presence (proto3 `optional`).
    pub fn optional(number: u32, name: &str, field_type: FieldType) -> Self {
        Self::build(
            number,
            name,
            FieldKind::Singular {
                field_type,
                explicit_presence: true,
            },
        )
    }

    /// A repeated field, packed by default when the type allows it.
    pub fn repeated(number: u32, name: &str, field_type: FieldType) -> Self {
        let packed = field_type.is_packable();
        Self::build(number, name, FieldKind::Repeated { field_type, packed })
    }

    /// A repeated field that encodes one tagged value per element.
    pub fn repeated_unpacked(number: u32, name: &str, field_type: FieldType) -> Self {
        Self::build(
            number,
            name,
            FieldKind::Repeated {
                field_type,
                packed: false,
            },
        )
    }

    /// A map field.
    pub fn map(number: u32, name: &str, key_type: MapKeyType, value_type: FieldType) -> Self {
        Self::build(
            number,
            name,
            FieldKind::Map {
                key_type,
                value_type,
            },
        )
    }

    /// Marks this field as a member of the oneof at `index`.
    pub fn in_oneof(mut self, index: usize) -> Self {
        self.oneof_index = Some(index);
        self
    }

    /// Overrides the derived JSON name.
    pub fn with_json_name(mut self, json_name: &str) -> Self {
        self.json_name = json_name.to_string();
        self
    }

    fn build(number: u32, name: &str, kind: FieldKind) -> Self {
        Self {
            number,
            name: name.to_string(),
            json_name: to_lower_camel(name),
            kind,
            oneof_index: None,
        }
    }

    /// The payload type (map value type for maps).
    pub fn value_type(&self) -> &FieldType {
        self.kind.value_type()
    }

    /// True if absence-vs-default is observable for this field.
    pub fn has_explicit_presence(&self) -> bool {
        self.oneof_index.is_some()
            || matches!(
                self.kind,
                FieldKind::Singular {
                    explicit_presence: true,
                    ..
                }
            )
    }
}

/// A oneof group: at most one member field populated at a time.
#[derive(Debug, Clone)]
pub struct OneofDescriptor {
    pub name: String,
}

/// Static metadata for an enum type. Enums are open: values outside the
/// declared set are carried as raw integers by every codec.
#[derive(Debug)]
pub struct EnumDescriptor {
    full_name: String,
    by_number: HashMap<i32, String>,
    by_name: HashMap<String, i32>,
}

impl EnumDescriptor {
    /// Creates an enum descriptor from (name, number) pairs. When several
    /// names share a number (allow_alias), the first one wins for output.
    pub fn new(full_name: &str, values: &[(&str, i32)]) -> Arc<Self> {
        let mut by_number = HashMap::new();
        let mut by_name = HashMap::new();
        for (name, number) in values {
            by_number.entry(*number).or_insert_with(|| name.to_string());
            by_name.insert(name.to_string(), *number);
        }
        Arc::new(Self {
            full_name: full_name.to_string(),
            by_number,
            by_name,
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Symbolic name for a value, if declared.
    pub fn name(&self, number: i32) -> Option<&str> {
        self.by_number.get(&number).map(|s| s.as_str())
    }

    /// Declared number for a symbolic name.
    pub fn number(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }
}

struct FieldIndex {
    fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
    by_json_name: HashMap<String, usize>,
}

/// Static metadata for a message type. The full name is the
/// message-type identity used by the extension registry.
pub struct MessageDescriptor {
    full_name: String,
    oneofs: Vec<OneofDescriptor>,
    index: OnceLock<FieldIndex>,
}

impl std::fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl MessageDescriptor {
    /// Creates a descriptor with no oneofs. Call [`set_fields`] next.
    ///
    /// [`set_fields`]: MessageDescriptor::set_fields
    pub fn new(full_name: &str) -> Arc<Self> {
        Self::with_oneofs(full_name, &[])
    }

    /// Creates a descriptor declaring oneof group names.
    pub fn with_oneofs(full_name: &str, oneofs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            full_name: full_name.to_string(),
            oneofs: oneofs
                .iter()
                .map(|n| OneofDescriptor {
                    name: n.to_string(),
                })
                .collect(),
            index: OnceLock::new(),
        })
    }

    /// Installs the field catalog. May be called exactly once; fields of
    /// this message's own type can hold the `Arc` returned by `new`.
    pub fn set_fields(&self, mut fields: Vec<FieldDescriptor>) -> Result<(), DescriptorError> {
        fields.sort_by_key(|f| f.number);

        let mut by_number = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_json_name = HashMap::new();
        for (i, field) in fields.iter().enumerate() {
            if !is_valid_field_number(field.number) {
                return Err(DescriptorError::InvalidFieldNumber {
                    message_type: self.full_name.clone(),
                    number: field.number,
                });
            }
            if by_number.insert(field.number, i).is_some() {
                return Err(DescriptorError::DuplicateFieldNumber {
                    message_type: self.full_name.clone(),
                    number: field.number,
                });
            }
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(DescriptorError::DuplicateFieldName {
                    message_type: self.full_name.clone(),
                    name: field.name.clone(),
                });
            }
            by_json_name.insert(field.json_name.clone(), i);
            if let Some(index) = field.oneof_index {
                if index >= self.oneofs.len() {
                    return Err(DescriptorError::UnknownOneof {
                        message_type: self.full_name.clone(),
                        number: field.number,
                        index,
                    });
                }
            }
        }

        let installed = self.index.set(FieldIndex {
            fields,
            by_number,
            by_name,
            by_json_name,
        });
        if installed.is_err() {
            return Err(DescriptorError::DuplicateFieldName {
                message_type: self.full_name.clone(),
                name: "<fields already installed>".to_string(),
            });
        }
        Ok(())
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Declared oneof groups, in declaration order.
    pub fn oneofs(&self) -> &[OneofDescriptor] {
        &self.oneofs
    }

    /// Declared fields in ascending field-number order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        self.index.get().map(|i| i.fields.as_slice()).unwrap_or(&[])
    }

    /// Looks up a field by number.
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        let index = self.index.get()?;
        index.by_number.get(&number).map(|&i| &index.fields[i])
    }

    /// Looks up a field by proto name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        let index = self.index.get()?;
        index.by_name.get(name).map(|&i| &index.fields[i])
    }

    /// Looks up a field by JSON name, falling back to the proto name.
    pub fn field_by_json_name(&self, name: &str) -> Option<&FieldDescriptor> {
        let index = self.index.get()?;
        index
            .by_json_name
            .get(name)
            .or_else(|| index.by_name.get(name))
            .map(|&i| &index.fields[i])
    }

    /// Members of the oneof at `index`.
    pub fn oneof_members(&self, index: usize) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields()
            .iter()
            .filter(move |f| f.oneof_index == Some(index))
    }
}

/// Derives the JSON name: underscores removed, the letter after each
/// underscore upper-cased.
pub fn to_lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
