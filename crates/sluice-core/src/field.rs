//! Field descriptors and schemas: the shape of a record.
//!
//! A schema is an ordered list of named, typed fields. Names are unique
//! case-insensitively and a schema never changes once built; share it through
//! [`SchemaRef`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Shared, immutable schema handle.
pub type SchemaRef = Arc<FieldSchema>;

/// The closed set of primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Byte,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    FixedDecimal,
    /// Fixed-length narrow string.
    String,
    /// Fixed-length wide string.
    #[serde(rename = "wstring")]
    WString,
    /// Variable-length narrow string.
    #[serde(rename = "v_string")]
    VString,
    /// Variable-length wide string.
    #[serde(rename = "v_wstring")]
    VWString,
    Date,
    DateTime,
    /// A duration, read and written as a time span.
    Time,
}

impl FieldType {
    pub const ALL: [FieldType; 15] = [
        FieldType::Bool,
        FieldType::Byte,
        FieldType::Int16,
        FieldType::Int32,
        FieldType::Int64,
        FieldType::Float,
        FieldType::Double,
        FieldType::FixedDecimal,
        FieldType::String,
        FieldType::WString,
        FieldType::VString,
        FieldType::VWString,
        FieldType::Date,
        FieldType::DateTime,
        FieldType::Time,
    ];

    /// Integer, floating point and fixed decimal types.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, Self::Float | Self::Double | Self::FixedDecimal)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            Self::String | Self::WString | Self::VString | Self::VWString
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Size used when a descriptor does not specify one.
    ///
    /// Strings count characters, fixed decimals count characters of their
    /// textual form, everything else reports its byte width.
    pub fn default_size(self) -> u32 {
        match self {
            Self::Bool | Self::Byte => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float => 4,
            Self::Int64 | Self::Double => 8,
            Self::FixedDecimal => 19,
            Self::String | Self::WString | Self::VString | Self::VWString => 256,
            Self::Date => 10,
            Self::DateTime => 19,
            Self::Time => 8,
        }
    }

    /// The canonical name, as used in workflow files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::FixedDecimal => "fixed_decimal",
            Self::String => "string",
            Self::WString => "wstring",
            Self::VString => "v_string",
            Self::VWString => "v_wstring",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Time => "time",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| SchemaError::UnknownType(s.to_string()))
    }
}

/// Describes one field: name, type and size metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Character length for strings and decimals, byte width otherwise.
    #[serde(default)]
    pub size: Option<u32>,
    /// Digits after the decimal point (fixed decimals only).
    #[serde(default)]
    pub scale: Option<u32>,
    /// Which tool produced the field.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldDescriptor {
    /// Describe a field with the type's default size.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            size: None,
            scale: None,
            source: String::new(),
            description: String::new(),
        }
    }

    /// Describe a field with an optional explicit size.
    pub fn describe(name: impl Into<String>, field_type: FieldType, size: Option<u32>) -> Self {
        let mut desc = Self::new(name, field_type);
        desc.size = size;
        desc
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Effective size: the explicit one, or the type's default.
    pub fn size(&self) -> u32 {
        self.size.unwrap_or_else(|| self.field_type.default_size())
    }

    /// Effective scale. Only fixed decimals have a non-zero default.
    pub fn scale(&self) -> u32 {
        match (self.scale, self.field_type) {
            (Some(scale), _) => scale,
            (None, FieldType::FixedDecimal) => 6,
            (None, _) => 0,
        }
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// An ordered, immutable list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
    /// Lower-cased name to position.
    index: IndexMap<String, usize>,
}

impl FieldSchema {
    /// Build a schema, rejecting case-insensitive duplicate names.
    pub fn new(fields: impl IntoIterator<Item = FieldDescriptor>) -> Result<Self, SchemaError> {
        let fields: Vec<FieldDescriptor> = fields.into_iter().collect();
        let mut index = IndexMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.to_lowercase(), i).is_some() {
                return Err(SchemaError::DuplicateFieldName(field.name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    /// A schema with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap in a shared handle.
    pub fn into_ref(self) -> SchemaRef {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Position of a field, matched case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Derive a schema from this one plus extra fields.
    ///
    /// An extra field whose name matches an existing field replaces it in
    /// place; the others are appended in order. Duplicates among the extras
    /// themselves are an error.
    pub fn extend_with(
        &self,
        extra: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Result<FieldSchema, SchemaError> {
        let mut fields = self.fields.clone();
        let mut seen = IndexMap::new();
        for field in extra {
            if seen.insert(field.name.to_lowercase(), ()).is_some() {
                return Err(SchemaError::DuplicateFieldName(field.name));
            }
            match self.index_of(&field.name) {
                Some(i) => fields[i] = field,
                None => fields.push(field),
            }
        }
        FieldSchema::new(fields)
    }
}

/// Errors raised while building schemas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate field name: {0}")]
    DuplicateFieldName(String),

    #[error("unknown field type: {0}")]
    UnknownType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_fields() -> FieldSchema {
        FieldSchema::new([
            FieldDescriptor::new("A", FieldType::Int32),
            FieldDescriptor::new("B", FieldType::VString).with_size(10),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = two_fields();
        assert_eq!(schema.index_of("a"), Some(0));
        assert_eq!(schema.index_of("B"), Some(1));
        assert_eq!(schema.index_of("c"), None);
        assert_eq!(schema.field_by_name("b").unwrap().size(), 10);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = FieldSchema::new([
            FieldDescriptor::new("Value", FieldType::Int32),
            FieldDescriptor::new("VALUE", FieldType::Double),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateFieldName("VALUE".into()));
    }

    #[test]
    fn test_default_sizes() {
        let dec = FieldDescriptor::new("D", FieldType::FixedDecimal);
        assert_eq!(dec.size(), 19);
        assert_eq!(dec.scale(), 6);

        let s = FieldDescriptor::describe("S", FieldType::String, Some(12));
        assert_eq!(s.size(), 12);
        assert_eq!(s.scale(), 0);
    }

    #[test]
    fn test_extend_replaces_and_appends() {
        let schema = two_fields();
        let derived = schema
            .extend_with([
                FieldDescriptor::new("b", FieldType::Double),
                FieldDescriptor::new("C", FieldType::Bool),
            ])
            .unwrap();

        assert_eq!(derived.names().collect::<Vec<_>>(), vec!["A", "b", "C"]);
        assert_eq!(derived.field(1).unwrap().field_type, FieldType::Double);
    }

    #[test]
    fn test_extend_rejects_duplicate_extras() {
        let schema = two_fields();
        let err = schema
            .extend_with([
                FieldDescriptor::new("X", FieldType::Double),
                FieldDescriptor::new("x", FieldType::Bool),
            ])
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateFieldName(_)));
    }

    #[test]
    fn test_field_type_names_roundtrip() {
        for ty in FieldType::ALL {
            assert_eq!(ty.name().parse::<FieldType>().unwrap(), ty);
        }
        assert!("blob".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_descriptor_deserializes() {
        let desc: FieldDescriptor =
            serde_json::from_str(r#"{"name": "Amount", "type": "fixed_decimal", "size": 12, "scale": 2}"#)
                .unwrap();
        assert_eq!(desc.field_type, FieldType::FixedDecimal);
        assert_eq!(desc.size(), 12);
        assert_eq!(desc.scale(), 2);
    }
}
