//! Records: one row of typed values conforming to a schema.

use crate::culture::{Culture, parse_time_span};
use crate::field::{FieldDescriptor, FieldType, SchemaRef};
use crate::value::Value;
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// What to do when a value does not fit its field's declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Refuse the assignment with [`RecordError::OutOfRange`].
    #[default]
    Reject,
    /// Shorten over-long strings. Decimal overflow is still rejected.
    Truncate,
}

/// A fixed-layout row. Every field carries a null bit independent of its
/// stored value; a new record starts with every field null.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: SchemaRef,
    values: Vec<Value>,
    nulls: Vec<bool>,
}

impl Record {
    /// Create an all-null record for `schema`.
    pub fn new(schema: SchemaRef) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| Value::default_for(f.field_type))
            .collect();
        let nulls = vec![true; schema.len()];
        Self {
            schema,
            values,
            nulls,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `index`, or `None` when the field is null.
    pub fn get(&self, index: usize) -> Result<Option<&Value>, RecordError> {
        self.check(index)?;
        Ok((!self.nulls[index]).then(|| &self.values[index]))
    }

    /// Look a value up by field name. Missing fields and nulls both read as
    /// `None`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.schema.index_of(name)?;
        self.get(index).ok().flatten()
    }

    pub fn is_null(&self, index: usize) -> Result<bool, RecordError> {
        self.check(index)?;
        Ok(self.nulls[index])
    }

    /// Iterate over all fields in schema order, nulls as `None`.
    pub fn values(&self) -> impl Iterator<Item = Option<&Value>> {
        self.values
            .iter()
            .zip(&self.nulls)
            .map(|(value, null)| (!null).then_some(value))
    }

    /// Store a value, rejecting oversized strings and decimals.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<(), RecordError> {
        self.set_with(index, value.into(), OverflowPolicy::Reject)
    }

    /// Store a value whose kind must match the field's declared type.
    pub fn set_with(
        &mut self,
        index: usize,
        value: Value,
        policy: OverflowPolicy,
    ) -> Result<(), RecordError> {
        let field = self.field(index)?;
        if !value.fits(field.field_type) {
            return Err(RecordError::TypeMismatch {
                field: field.name.clone(),
                expected: field.field_type,
                found: value.natural_type(),
            });
        }
        let value = fit_to_size(field, value, policy)?;
        self.values[index] = value;
        self.nulls[index] = false;
        Ok(())
    }

    /// Store a value after converting it to the field's type.
    ///
    /// Numeric kinds narrow and widen; a value that does not survive the
    /// conversion is `OutOfRange`, an unconvertible kind is `TypeMismatch`.
    pub fn set_coerced(
        &mut self,
        index: usize,
        value: &Value,
        policy: OverflowPolicy,
    ) -> Result<(), RecordError> {
        let field = self.field(index)?;
        match value.coerce(field.field_type) {
            Some(converted) => self.set_with(index, converted, policy),
            None if value.is_numeric() && field.field_type.is_numeric() => {
                Err(RecordError::OutOfRange {
                    field: field.name.clone(),
                    size: field.size(),
                })
            }
            None => Err(RecordError::TypeMismatch {
                field: field.name.clone(),
                expected: field.field_type,
                found: value.natural_type(),
            }),
        }
    }

    pub fn set_null(&mut self, index: usize) -> Result<(), RecordError> {
        self.check(index)?;
        self.values[index] = Value::default_for(self.schema.fields()[index].field_type);
        self.nulls[index] = true;
        Ok(())
    }

    /// Null every field so the record can be rebuilt.
    pub fn reset(&mut self) {
        for (value, field) in self.values.iter_mut().zip(self.schema.fields()) {
            *value = Value::default_for(field.field_type);
        }
        self.nulls.fill(true);
    }

    /// Parse `text` into the field's type. Unparsable text stores a null.
    pub fn set_from_str(
        &mut self,
        index: usize,
        text: &str,
        culture: &Culture,
    ) -> Result<(), RecordError> {
        self.set_from_str_with(index, text, culture, OverflowPolicy::Reject)
    }

    /// [`set_from_str`](Self::set_from_str) under an explicit overflow policy.
    pub fn set_from_str_with(
        &mut self,
        index: usize,
        text: &str,
        culture: &Culture,
        policy: OverflowPolicy,
    ) -> Result<(), RecordError> {
        let field_type = self.field(index)?.field_type;
        match Value::parse(field_type, text, culture) {
            Some(value) => self.set_with(index, value, policy),
            None => self.set_null(index),
        }
    }

    // Typed readers. Each converts from whatever the field holds; a null
    // field or an impossible conversion reads as `None`.

    pub fn get_as_string(&self, index: usize, culture: &Culture) -> Result<Option<String>, RecordError> {
        Ok(self.get(index)?.map(|v| v.to_text(culture)))
    }

    pub fn get_as_f64(&self, index: usize, culture: &Culture) -> Result<Option<f64>, RecordError> {
        Ok(self.get(index)?.and_then(|v| match v {
            Value::String(s) => culture.parse_number(s),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }))
    }

    pub fn get_as_i64(&self, index: usize, culture: &Culture) -> Result<Option<i64>, RecordError> {
        Ok(self.get(index)?.and_then(|v| match v {
            Value::String(s) => Value::parse(FieldType::Int64, s, culture).and_then(|v| v.as_i64()),
            Value::Bool(b) => Some(i64::from(*b)),
            other => other.as_i64(),
        }))
    }

    pub fn get_as_bool(&self, index: usize, culture: &Culture) -> Result<Option<bool>, RecordError> {
        Ok(self.get(index)?.and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => culture.parse_bool(s),
            other => other.as_f64().map(|n| n != 0.0),
        }))
    }

    pub fn get_as_date_time(
        &self,
        index: usize,
        culture: &Culture,
    ) -> Result<Option<NaiveDateTime>, RecordError> {
        Ok(self.get(index)?.and_then(|v| match v {
            Value::String(s) => culture.parse_date_time(s),
            other => other.as_date_time(),
        }))
    }

    pub fn get_as_time_span(&self, index: usize) -> Result<Option<TimeDelta>, RecordError> {
        Ok(self.get(index)?.and_then(|v| match v {
            Value::String(s) => parse_time_span(s),
            other => other.as_time_span(),
        }))
    }

    fn check(&self, index: usize) -> Result<(), RecordError> {
        if index < self.values.len() {
            Ok(())
        } else {
            Err(RecordError::FieldIndex {
                index,
                len: self.values.len(),
            })
        }
    }

    fn field(&self, index: usize) -> Result<&FieldDescriptor, RecordError> {
        self.check(index)?;
        Ok(&self.schema.fields()[index])
    }
}

/// Enforce string length and decimal capacity.
fn fit_to_size(
    field: &FieldDescriptor,
    value: Value,
    policy: OverflowPolicy,
) -> Result<Value, RecordError> {
    let out_of_range = || RecordError::OutOfRange {
        field: field.name.clone(),
        size: field.size(),
    };
    match value {
        Value::String(s) => {
            let size = field.size() as usize;
            if s.chars().count() <= size {
                Ok(Value::String(s))
            } else if policy == OverflowPolicy::Truncate {
                Ok(Value::String(s.chars().take(size).collect()))
            } else {
                Err(out_of_range())
            }
        }
        Value::Decimal(d) => {
            let rounded = d.round_dp(field.scale());
            if rounded.to_string().len() <= field.size() as usize {
                Ok(Value::Decimal(rounded))
            } else {
                Err(out_of_range())
            }
        }
        other => Ok(other),
    }
}

/// Errors raised by record reads and writes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("field index {index} out of range (record has {len} fields)")]
    FieldIndex { index: usize, len: usize },

    #[error("type mismatch for field '{field}': expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },

    #[error("value out of range for field '{field}' (size {size})")]
    OutOfRange { field: String, size: u32 },
}
