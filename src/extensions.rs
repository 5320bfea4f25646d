//! Extension descriptors and the registry codecs consult to resolve
//! field numbers that are not in a message's static catalog.
//!
//! Registries are plain values: populate one with [`register`] (or
//! compose several with [`union`]), then share it immutably. Every
//! decode entry point takes `&ExtensionRegistry`, so tests and callers
//! can scope exactly which extensions participate in a given decode
//! instead of relying on ambient global state.
//!
//! [`register`]: ExtensionRegistry::register
//! [`union`]: ExtensionRegistry::union

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{FieldKind, FieldType};
use crate::error::DuplicateExtensionError;

/// Static metadata for one extension field: a [`FieldDescriptor`]-like
/// record additionally tagged with the message type it extends.
///
/// [`FieldDescriptor`]: crate::descriptor::FieldDescriptor
#[derive(Debug, Clone)]
pub struct ExtensionDescriptor {
    /// Full name of the extended message type.
    pub extended_type: String,
    /// Full name of the extension itself, e.g. `"example.ext_field"`.
    /// JSON and text format reference it as `[example.ext_field]`.
    pub full_name: String,
    pub number: u32,
    /// Singular or repeated; protobuf forbids map and oneof extensions.
    pub kind: FieldKind,
}

impl ExtensionDescriptor {
    /// A singular extension. Extensions always have explicit presence.
    pub fn singular(
        extended_type: &str,
        full_name: &str,
        number: u32,
        field_type: FieldType,
    ) -> Arc<Self> {
        Arc::new(Self {
            extended_type: extended_type.to_string(),
            full_name: full_name.to_string(),
            number,
            kind: FieldKind::Singular {
                field_type,
                explicit_presence: true,
            },
        })
    }

    /// A repeated extension, packed when the type allows it.
    pub fn repeated(
        extended_type: &str,
        full_name: &str,
        number: u32,
        field_type: FieldType,
    ) -> Arc<Self> {
        let packed = field_type.is_packable();
        Arc::new(Self {
            extended_type: extended_type.to_string(),
            full_name: full_name.to_string(),
            number,
            kind: FieldKind::Repeated { field_type, packed },
        })
    }
}

/// Lookup table mapping (extended type, field number) to extension
/// descriptors. Reads are lock-free; population must finish before the
/// registry is shared with decoders.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    // Keyed by extended type first so decode-time lookups borrow the
    // caller's &str instead of building an owned key.
    by_number: HashMap<String, HashMap<u32, Arc<ExtensionDescriptor>>>,
    by_name: HashMap<String, HashMap<String, Arc<ExtensionDescriptor>>>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Duplicate (extended type, field number) keys are
    /// rejected; registration order is therefore irrelevant.
    pub fn register(
        &mut self,
        extension: Arc<ExtensionDescriptor>,
    ) -> Result<(), DuplicateExtensionError> {
        let numbers = self
            .by_number
            .entry(extension.extended_type.clone())
            .or_default();
        if numbers.contains_key(&extension.number) {
            return Err(DuplicateExtensionError {
                extended_type: extension.extended_type.clone(),
                field_number: extension.number,
            });
        }
        debug!(
            extended_type = %extension.extended_type,
            number = extension.number,
            name = %extension.full_name,
            "registered extension"
        );
        numbers.insert(extension.number, extension.clone());
        self.by_name
            .entry(extension.extended_type.clone())
            .or_default()
            .insert(extension.full_name.clone(), extension);
        Ok(())
    }

    /// Resolves a field number on an extended type. Pure read.
    pub fn lookup(&self, extended_type: &str, number: u32) -> Option<&Arc<ExtensionDescriptor>> {
        self.by_number.get(extended_type)?.get(&number)
    }

    /// Resolves an extension by full name, as JSON and text format do.
    pub fn lookup_by_name(
        &self,
        extended_type: &str,
        full_name: &str,
    ) -> Option<&Arc<ExtensionDescriptor>> {
        self.by_name.get(extended_type)?.get(full_name)
    }

    /// Composes several registries into one. Fails if two inputs claim
    /// the same (extended type, field number) key.
    pub fn union<'a>(
        registries: impl IntoIterator<Item = &'a ExtensionRegistry>,
    ) -> Result<Self, DuplicateExtensionError> {
        let mut merged = Self::new();
        for registry in registries {
            for extension in registry.by_number.values().flat_map(HashMap::values) {
                merged.register(extension.clone())?;
            }
        }
        Ok(merged)
    }

    pub fn len(&self) -> usize {
        self.by_number.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}
