//! Parse a text field into a number.

use serde::{Deserialize, Serialize};
use sluice_core::{
    Calculation, Culture, FieldDescriptor, FieldHandle, FieldRef, FieldType, NodeConfig,
    OutputField, Record, Value,
};
use std::fmt;

use crate::ToolError;

pub const ID: &str = "number-parser";

/// Output types the parser can produce.
pub const OUTPUT_TYPES: [FieldType; 6] = [
    FieldType::Byte,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Float,
    FieldType::Double,
];

/// Configuration for the number parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberParser {
    /// Type of the output field.
    pub output_type: FieldType,
    /// Name of the output field.
    pub output_field_name: String,
    /// Culture used to read the text.
    pub culture: Culture,
    /// The string field to parse.
    pub input_field_name: String,
}

impl Default for NumberParser {
    fn default() -> Self {
        Self {
            output_type: FieldType::Double,
            output_field_name: "Value".into(),
            culture: Culture::invariant(),
            input_field_name: "ValueInput".into(),
        }
    }
}

impl NumberParser {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input_field_name: input.into(),
            output_field_name: output.into(),
            ..Self::default()
        }
    }

    pub fn with_output_type(mut self, output_type: FieldType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if !OUTPUT_TYPES.contains(&self.output_type) {
            return Err(ToolError::InvalidOptions {
                tool: ID.into(),
                message: format!("output type {} is not numeric", self.output_type),
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
}

impl fmt::Display for NumberParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ⇒ {}", self.input_field_name, self.output_field_name)
    }
}

/// Result of parsing one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parsed {
    pub value: Option<f64>,
}

impl NodeConfig for NumberParser {
    fn field_refs(&self) -> Vec<FieldRef> {
        vec![FieldRef::string(&self.input_field_name)]
    }

    fn culture(&self) -> &Culture {
        &self.culture
    }
}

impl Calculation for NumberParser {
    type Output = Parsed;

    fn outputs(&self) -> Vec<OutputField<Parsed>> {
        let descriptor =
            FieldDescriptor::describe(&self.output_field_name, self.output_type, Some(19))
                .with_source("NumberParser")
                .with_description(format!("{} parsed as a number", self.input_field_name));
        vec![OutputField::new(descriptor, |p: &Parsed| {
            p.value.map(Value::Double)
        })]
    }

    fn calculate(&self, inputs: &[FieldHandle], record: &Record) -> Parsed {
        let value = inputs
            .first()
            .and_then(|field| field.get_as_string(record, &self.culture))
            .and_then(|text| self.culture.parse_number(&text));
        Parsed { value }
    }
}
