//! Format a non-string field as text.

use serde::{Deserialize, Serialize};
use sluice_core::{
    Calculation, Culture, FieldDescriptor, FieldHandle, FieldRef, FieldType, NodeConfig,
    OutputField, Record, Value,
};
use std::fmt;

use crate::ToolError;

pub const ID: &str = "string-formatter";

/// Input types the formatter accepts.
pub const INPUT_TYPES: [FieldType; 11] = [
    FieldType::Bool,
    FieldType::Byte,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Float,
    FieldType::Double,
    FieldType::FixedDecimal,
    FieldType::Date,
    FieldType::DateTime,
    FieldType::Time,
];

/// Configuration for the string formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringFormatter {
    pub output_field_name: String,
    /// Maximum length of the output text.
    pub output_field_length: u32,
    pub culture: Culture,
    pub input_field_name: String,
    /// Format pattern; blank uses the value's default text.
    pub format: String,
}

impl Default for StringFormatter {
    fn default() -> Self {
        Self {
            output_field_name: "FormattedValue".into(),
            output_field_length: 64,
            culture: Culture::invariant(),
            input_field_name: "Value".into(),
            format: String::new(),
        }
    }
}

impl StringFormatter {
    pub fn new(input: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            input_field_name: input.into(),
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, length: u32) -> Self {
        self.output_field_name = name.into();
        self.output_field_length = length;
        self
    }

    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if self.output_field_length == 0 {
            return Err(ToolError::InvalidOptions {
                tool: ID.into(),
                message: "output field length must be positive".into(),
            });
        }
        if self.output_field_name.trim().is_empty() {
            return Err(ToolError::InvalidOptions {
                tool: ID.into(),
                message: "output field name is empty".into(),
            });
        }
        Ok(())
    }

    /// Text for one value under this configuration.
    pub fn format_value(&self, value: &Value) -> Option<String> {
        self.culture.format_with(value, &self.format)
    }
}

impl fmt::Display for StringFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}=>{} [{}]",
            self.input_field_name, self.output_field_name, self.format
        )
    }
}

/// Result of formatting one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Formatted {
    pub text: Option<String>,
}

impl NodeConfig for StringFormatter {
    fn field_refs(&self) -> Vec<FieldRef> {
        vec![FieldRef::new(&self.input_field_name, &INPUT_TYPES)]
    }

    fn culture(&self) -> &Culture {
        &self.culture
    }
}

impl Calculation for StringFormatter {
    type Output = Formatted;

    fn outputs(&self) -> Vec<OutputField<Formatted>> {
        let descriptor = FieldDescriptor::new(&self.output_field_name, FieldType::VWString)
            .with_size(self.output_field_length)
            .with_source("StringFormatter");
        vec![OutputField::new(descriptor, |f: &Formatted| {
            f.text.clone().map(Value::String)
        })]
    }

    fn calculate(&self, inputs: &[FieldHandle], record: &Record) -> Formatted {
        let text = inputs
            .first()
            .and_then(|field| field.get(record))
            .and_then(|value| self.format_value(value));
        Formatted { text }
    }
}
