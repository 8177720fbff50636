//! JSON-lines record input and output.
//!
//! Each line is one JSON object keyed by field name. Strings are parsed with
//! the workflow culture; numbers and booleans are converted to the field type.

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use indicatif::ProgressBar;
use serde_json::Value as Json;
use sluice_core::{Culture, OverflowPolicy, Record, RecordSink, SchemaRef, Value};
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Read every record of a JSON-lines file against `schema`.
pub fn read_records(
    path: &Path,
    schema: &SchemaRef,
    culture: &Culture,
    overflow: OverflowPolicy,
) -> Result<Vec<Record>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    parse_records(std::io::BufReader::new(file), schema, culture, overflow)
        .with_context(|| format!("Failed to read records from {}", path.display()))
}

pub fn parse_records(
    reader: impl BufRead,
    schema: &SchemaRef,
    culture: &Culture,
    overflow: OverflowPolicy,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let json: Json =
            serde_json::from_str(&line).with_context(|| format!("line {}", number + 1))?;
        let record = to_record(&json, schema, culture, overflow)
            .with_context(|| format!("line {}", number + 1))?;
        records.push(record);
    }
    debug!(count = records.len(), "read records");
    Ok(records)
}

/// Build a record from one JSON object. Absent keys are null.
pub fn to_record(
    json: &Json,
    schema: &SchemaRef,
    culture: &Culture,
    overflow: OverflowPolicy,
) -> Result<Record> {
    let Json::Object(map) = json else {
        bail!("expected a JSON object");
    };
    let mut record = Record::new(schema.clone());
    for (key, item) in map {
        let Some(index) = schema.index_of(key) else {
            bail!("unknown field: {key}");
        };
        let field_type = schema.fields()[index].field_type;
        let value = match item {
            Json::Null => continue,
            Json::String(text) => {
                record.set_from_str_with(index, text, culture, overflow)?;
                continue;
            }
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::Array(_) | Json::Object(_) => bail!("field {key}: expected a scalar"),
        };
        if field_type.is_string() {
            record.set_with(index, Value::String(value.to_text(culture)), overflow)?;
        } else {
            record
                .set_coerced(index, &value, overflow)
                .with_context(|| format!("field {key}"))?;
        }
    }
    Ok(record)
}

/// JSON form of one record, in schema order.
pub fn to_json(record: &Record) -> IndexMap<&str, Json> {
    record
        .schema()
        .names()
        .zip(record.values())
        .map(|(name, value)| (name, value.map_or(Json::Null, value_to_json)))
        .collect()
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Byte(n) => Json::from(*n),
        Value::Int16(n) => Json::from(*n),
        Value::Int32(n) => Json::from(*n),
        Value::Int64(n) => Json::from(*n),
        Value::Float(n) => serde_json::Number::from_f64(f64::from(*n)).map_or(Json::Null, Json::Number),
        Value::Double(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Decimal(_) | Value::Date(_) | Value::DateTime(_) | Value::Time(_) => {
            Json::String(value.to_text(&Culture::invariant()))
        }
    }
}

/// What a [`JsonLinesSink`] did, readable after the sink is handed off.
#[derive(Debug, Default)]
pub struct SinkReport {
    pub written: usize,
    pub closed: bool,
    pub error: Option<std::io::Error>,
}

/// Terminal sink writing each record as a JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    progress: Option<ProgressBar>,
    report: Rc<RefCell<SinkReport>>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, progress: Option<ProgressBar>) -> Self {
        Self {
            writer,
            progress,
            report: Rc::default(),
        }
    }

    pub fn report(&self) -> Rc<RefCell<SinkReport>> {
        self.report.clone()
    }

    fn fail(&mut self, err: std::io::Error) -> bool {
        let mut report = self.report.borrow_mut();
        if report.error.is_none() {
            report.error = Some(err);
        }
        false
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn init(&mut self, schema: SchemaRef) -> bool {
        debug!(fields = schema.len(), "output schema");
        self.report.borrow().error.is_none()
    }

    fn push(&mut self, record: &Record) -> bool {
        if self.report.borrow().error.is_some() {
            return false;
        }
        let line = match serde_json::to_string(&to_json(record)) {
            Ok(line) => line,
            Err(e) => return self.fail(e.into()),
        };
        if let Err(e) = writeln!(self.writer, "{line}") {
            return self.fail(e);
        }
        self.report.borrow_mut().written += 1;
        true
    }

    fn update_progress(&mut self, fraction: f64) {
        if let Some(ref pb) = self.progress {
            pb.set_position((fraction * 100.0).round() as u64);
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            self.fail(e);
        }
        if let Some(ref pb) = self.progress {
            pb.finish_and_clear();
        }
        self.report.borrow_mut().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{FieldDescriptor, FieldSchema, FieldType};

    fn schema() -> SchemaRef {
        FieldSchema::new([
            FieldDescriptor::new("Name", FieldType::VString).with_size(4),
            FieldDescriptor::new("Count", FieldType::Int16),
            FieldDescriptor::new("Amount", FieldType::Double),
            FieldDescriptor::new("When", FieldType::Date),
        ])
        .unwrap()
        .into_ref()
    }

    fn parse(json: &str) -> Result<Record> {
        to_record(
            &serde_json::from_str(json).unwrap(),
            &schema(),
            &Culture::invariant(),
            OverflowPolicy::Reject,
        )
    }

    #[test]
    fn test_to_record() {
        let record = parse(r#"{"Name": "ab", "Count": 7, "Amount": "2.5", "When": "2024-07-04"}"#)
            .unwrap();
        assert_eq!(record.get(0).unwrap(), Some(&Value::from("ab")));
        assert_eq!(record.get(1).unwrap(), Some(&Value::Int16(7)));
        assert_eq!(record.get(2).unwrap(), Some(&Value::Double(2.5)));
        assert!(!record.is_null(3).unwrap());
    }

    #[test]
    fn test_absent_and_unparsable_are_null() {
        let record = parse(r#"{"Amount": "lots", "Count": null}"#).unwrap();
        assert!(record.is_null(0).unwrap());
        assert!(record.is_null(1).unwrap());
        assert!(record.is_null(2).unwrap());
    }

    #[test]
    fn test_overflow_policy_applies_to_text() {
        let truncated = to_record(
            &serde_json::json!({ "Name": "abcdef" }),
            &schema(),
            &Culture::invariant(),
            OverflowPolicy::Truncate,
        )
        .unwrap();
        assert_eq!(truncated.get(0).unwrap(), Some(&Value::from("abcd")));

        assert!(parse(r#"{"Name": "abcdef"}"#).is_err());
    }

    #[test]
    fn test_numbers_into_string_fields() {
        let record = parse(r#"{"Name": 12}"#).unwrap();
        assert_eq!(record.get(0).unwrap(), Some(&Value::from("12")));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse(r#"{"Nope": 1}"#).is_err());
        assert!(parse(r#"[1, 2]"#).is_err());
        assert!(parse(r#"{"Count": 70000}"#).is_err());
        assert!(parse(r#"{"Name": [1]}"#).is_err());
        assert!(parse(r#"{"Name": 123456}"#).is_err());
    }

    #[test]
    fn test_parse_records_skips_blank_lines() {
        let input = "{\"Count\": 1}\n\n{\"Count\": 2}\n";
        let records =
            parse_records(input.as_bytes(), &schema(), &Culture::invariant(), OverflowPolicy::Reject)
                .unwrap();
        assert_eq!(records.len(), 2);

        let err = parse_records(
            "{\"Count\": 1}\nnot json\n".as_bytes(),
            &schema(),
            &Culture::invariant(),
            OverflowPolicy::Reject,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_sink_writes_in_schema_order() {
        let record = parse(r#"{"When": "2024-07-04", "Count": 3}"#).unwrap();
        let mut sink = JsonLinesSink::new(Vec::new(), None);
        let report = sink.report();
        assert!(sink.init(record.schema().clone()));
        assert!(sink.push(&record));
        sink.close();

        let text = String::from_utf8(sink.writer).unwrap();
        assert_eq!(
            text,
            "{\"Name\":null,\"Count\":3,\"Amount\":null,\"When\":\"2024-07-04\"}\n"
        );
        assert_eq!(report.borrow().written, 1);
        assert!(report.borrow().closed);
    }
}
