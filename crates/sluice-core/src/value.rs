//! Typed field values and the conversions between them.

use crate::culture::Culture;
use crate::field::FieldType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::str::FromStr;

/// A single non-null field value.
///
/// Nulls are tracked by the record, not by the value, so every variant holds
/// real data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(TimeDelta),
}

/// 2^63, the first f64 above the i64 range.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

impl Value {
    /// The zero value stored in a freshly created (null) field.
    pub fn default_for(field_type: FieldType) -> Value {
        match field_type {
            FieldType::Bool => Value::Bool(false),
            FieldType::Byte => Value::Byte(0),
            FieldType::Int16 => Value::Int16(0),
            FieldType::Int32 => Value::Int32(0),
            FieldType::Int64 => Value::Int64(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::FixedDecimal => Value::Decimal(Decimal::ZERO),
            FieldType::String | FieldType::WString | FieldType::VString | FieldType::VWString => {
                Value::String(String::new())
            }
            FieldType::Date => Value::Date(NaiveDate::default()),
            FieldType::DateTime => Value::DateTime(NaiveDateTime::default()),
            FieldType::Time => Value::Time(TimeDelta::zero()),
        }
    }

    /// The field type this value most naturally belongs to.
    pub fn natural_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Byte(_) => FieldType::Byte,
            Value::Int16(_) => FieldType::Int16,
            Value::Int32(_) => FieldType::Int32,
            Value::Int64(_) => FieldType::Int64,
            Value::Float(_) => FieldType::Float,
            Value::Double(_) => FieldType::Double,
            Value::Decimal(_) => FieldType::FixedDecimal,
            Value::String(_) => FieldType::VWString,
            Value::Date(_) => FieldType::Date,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Time(_) => FieldType::Time,
        }
    }

    /// Whether this value can be stored as-is in a field of `field_type`.
    pub fn fits(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Bool(_), FieldType::Bool)
                | (Value::Byte(_), FieldType::Byte)
                | (Value::Int16(_), FieldType::Int16)
                | (Value::Int32(_), FieldType::Int32)
                | (Value::Int64(_), FieldType::Int64)
                | (Value::Float(_), FieldType::Float)
                | (Value::Double(_), FieldType::Double)
                | (Value::Decimal(_), FieldType::FixedDecimal)
                | (Value::Date(_), FieldType::Date)
                | (Value::DateTime(_), FieldType::DateTime)
                | (Value::Time(_), FieldType::Time)
        ) || (matches!(self, Value::String(_)) && field_type.is_string())
    }

    pub fn is_numeric(&self) -> bool {
        self.natural_type().is_numeric()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Floating and decimal values are rounded; out-of-range or
    /// non-finite values give `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(n) => Some(i64::from(*n)),
            Value::Int16(n) => Some(i64::from(*n)),
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            Value::Float(n) => float_to_i64(f64::from(*n)),
            Value::Double(n) => float_to_i64(*n),
            Value::Decimal(d) => d.round().to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Byte(n) => Some(f64::from(*n)),
            Value::Int16(n) => Some(f64::from(*n)),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            Value::Float(n) => Some(f64::from(*n)),
            Value::Double(n) => Some(*n),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Float(n) => Decimal::from_f32(*n),
            Value::Double(n) => Decimal::from_f64(*n),
            other => other.as_i64().map(Decimal::from),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Date-time view; dates read as midnight.
    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_time_span(&self) -> Option<TimeDelta> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Convert into a value storable in `target`.
    ///
    /// Identical kinds pass through. Numeric kinds widen or narrow, yielding
    /// `None` on overflow. Strings move between string types, dates and
    /// date-times convert into each other. Anything else is `None`.
    pub fn coerce(&self, target: FieldType) -> Option<Value> {
        if self.fits(target) {
            return Some(self.clone());
        }
        if self.is_numeric() && target.is_numeric() {
            return self.coerce_numeric(target);
        }
        match (self, target) {
            (Value::Date(d), FieldType::DateTime) => Some(Value::DateTime(d.and_time(NaiveTime::MIN))),
            (Value::DateTime(dt), FieldType::Date) => Some(Value::Date(dt.date())),
            _ => None,
        }
    }

    fn coerce_numeric(&self, target: FieldType) -> Option<Value> {
        match target {
            FieldType::Byte => u8::try_from(self.as_i64()?).ok().map(Value::Byte),
            FieldType::Int16 => i16::try_from(self.as_i64()?).ok().map(Value::Int16),
            FieldType::Int32 => i32::try_from(self.as_i64()?).ok().map(Value::Int32),
            FieldType::Int64 => self.as_i64().map(Value::Int64),
            FieldType::Float => {
                let n = self.as_f64()?;
                if n.is_finite() && n.abs() > f64::from(f32::MAX) {
                    None
                } else {
                    Some(Value::Float(n as f32))
                }
            }
            FieldType::Double => self.as_f64().map(Value::Double),
            FieldType::FixedDecimal => self.as_decimal().map(Value::Decimal),
            _ => None,
        }
    }

    /// Parse text into a value of `field_type` using `culture` conventions.
    pub fn parse(field_type: FieldType, text: &str, culture: &Culture) -> Option<Value> {
        match field_type {
            FieldType::Bool => culture.parse_bool(text).map(Value::Bool),
            FieldType::Byte | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => {
                let n = match text.trim().parse::<i64>() {
                    Ok(n) => n,
                    Err(_) => {
                        let n = culture.parse_number(text)?;
                        if n.fract() != 0.0 {
                            return None;
                        }
                        float_to_i64(n)?
                    }
                };
                Value::Int64(n).coerce(field_type)
            }
            FieldType::Float | FieldType::Double => {
                Value::Double(culture.parse_number(text)?).coerce(field_type)
            }
            FieldType::FixedDecimal => {
                let normalized = culture.normalize_number(text)?;
                let parsed = if normalized.contains('e') {
                    Decimal::from_scientific(&normalized)
                } else {
                    Decimal::from_str(&normalized)
                };
                parsed.ok().map(Value::Decimal)
            }
            FieldType::String | FieldType::WString | FieldType::VString | FieldType::VWString => {
                Some(Value::String(text.to_string()))
            }
            FieldType::Date => culture.parse_date(text).map(Value::Date),
            FieldType::DateTime => culture.parse_date_time(text).map(Value::DateTime),
            FieldType::Time => crate::culture::parse_time_span(text).map(Value::Time),
        }
    }

    /// Default textual form under `culture`.
    pub fn to_text(&self, culture: &Culture) -> String {
        culture.format_value(self)
    }
}

fn float_to_i64(n: f64) -> Option<i64> {
    if !n.is_finite() {
        return None;
    }
    let rounded = n.round();
    if (-I64_LIMIT..I64_LIMIT).contains(&rounded) {
        Some(rounded as i64)
    } else {
        None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Byte(n)
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int16(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<TimeDelta> for Value {
    fn from(t: TimeDelta) -> Self {
        Value::Time(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int64(42));
        assert_eq!(Value::from(3.15f64), Value::Double(3.15));
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
    }

    #[test]
    fn test_value_accessors() {
        let v = Value::Int32(42);
        assert_eq!(v.as_i64(), Some(42));
        assert_eq!(v.as_f64(), Some(42.0));
        assert_eq!(v.as_str(), None);
        assert_eq!(Value::Double(2.5).as_i64(), Some(3));
        assert_eq!(Value::Double(f64::NAN).as_i64(), None);
    }

    #[test]
    fn test_fits_string_family() {
        let s = Value::from("x");
        assert!(s.fits(FieldType::String));
        assert!(s.fits(FieldType::VWString));
        assert!(!s.fits(FieldType::Int32));
        assert!(!Value::Int32(1).fits(FieldType::Int64));
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        assert_eq!(Value::Byte(7).coerce(FieldType::Int64), Some(Value::Int64(7)));
        assert_eq!(Value::Int64(300).coerce(FieldType::Byte), None);
        assert_eq!(Value::Int64(-5).coerce(FieldType::Int16), Some(Value::Int16(-5)));
        assert_eq!(Value::Double(1e300).coerce(FieldType::Float), None);
        assert_eq!(Value::Double(1e300).coerce(FieldType::Int64), None);
        assert_eq!(
            Value::Int32(12).coerce(FieldType::FixedDecimal),
            Some(Value::Decimal(Decimal::from(12)))
        );
        assert_eq!(
            Value::Decimal(Decimal::new(1250, 2)).coerce(FieldType::Double),
            Some(Value::Double(12.5))
        );
    }

    #[test]
    fn test_non_numeric_coercions() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            Value::Date(date).coerce(FieldType::DateTime),
            Some(Value::DateTime(date.and_time(NaiveTime::MIN)))
        );
        assert_eq!(Value::from("12").coerce(FieldType::Int32), None);
        assert_eq!(Value::Bool(true).coerce(FieldType::Int32), None);
    }

    #[test]
    fn test_parse_by_type() {
        let c = Culture::invariant();
        assert_eq!(Value::parse(FieldType::Int32, " 42 ", &c), Some(Value::Int32(42)));
        assert_eq!(Value::parse(FieldType::Int32, "4.5", &c), None);
        assert_eq!(Value::parse(FieldType::Byte, "256", &c), None);
        assert_eq!(Value::parse(FieldType::Double, "1,234.5", &c), Some(Value::Double(1234.5)));
        assert_eq!(
            Value::parse(FieldType::FixedDecimal, "12.50", &c),
            Some(Value::Decimal(Decimal::new(1250, 2)))
        );
        assert_eq!(Value::parse(FieldType::Bool, "TRUE", &c), Some(Value::Bool(true)));
        assert_eq!(
            Value::parse(FieldType::Date, "2024-02-29", &c),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert_eq!(
            Value::parse(FieldType::Time, "01:02:03", &c),
            Some(Value::Time(TimeDelta::seconds(3723)))
        );
        assert_eq!(Value::parse(FieldType::Double, "abc", &c), None);
    }

    #[test]
    fn test_parse_uses_culture() {
        let de = Culture::from_name("de-DE").unwrap();
        assert_eq!(Value::parse(FieldType::Double, "1.234,5", &de), Some(Value::Double(1234.5)));
        assert_eq!(
            Value::parse(FieldType::Date, "29.02.2024", &de),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
    }
}
