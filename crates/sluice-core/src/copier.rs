//! Field mapping between records of overlapping schemas.

use crate::field::{FieldDescriptor, FieldSchema, FieldType};
use crate::record::{OverflowPolicy, Record};
use tracing::debug;

/// How a paired value moves from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    /// Same kind on both sides (string sizes may still differ).
    Verbatim,
    /// Widening or narrowing between numeric kinds.
    Numeric,
    /// Date to date-time or back.
    Temporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldPair {
    source: usize,
    target: usize,
    conversion: Conversion,
}

/// Which common fields a copier pairs.
enum FieldFilter<'a, S> {
    All,
    Only(&'a [S]),
    Except(&'a [S]),
}

impl<S: AsRef<str>> FieldFilter<'_, S> {
    /// Names compare under the same lowercase rule as [`FieldSchema`] lookups.
    fn admits(&self, field: &FieldDescriptor) -> bool {
        let listed = |names: &[S]| names.iter().any(|n| field.is_named(n.as_ref()));
        match self {
            FieldFilter::All => true,
            FieldFilter::Only(names) => names.is_empty() || listed(names),
            FieldFilter::Except(names) => !listed(names),
        }
    }
}

/// Precomputed field-index mapping from one schema onto another.
///
/// Fields are paired by case-insensitive name; fields present on one side
/// only are skipped. Build once per schema pair and call [`copy`] per record.
///
/// [`copy`]: RecordCopier::copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCopier {
    pairs: Vec<FieldPair>,
}

impl RecordCopier {
    /// Pair every field the two schemas share.
    pub fn new(source: &FieldSchema, target: &FieldSchema) -> Self {
        Self::build(source, target, FieldFilter::<&str>::All)
    }

    /// Pair only the named fields. An empty list pairs every shared field.
    pub fn with_fields<S: AsRef<str>>(source: &FieldSchema, target: &FieldSchema, names: &[S]) -> Self {
        Self::build(source, target, FieldFilter::Only(names))
    }

    /// Pair every shared field except the named ones.
    pub fn excluding<S: AsRef<str>>(source: &FieldSchema, target: &FieldSchema, names: &[S]) -> Self {
        Self::build(source, target, FieldFilter::Except(names))
    }

    /// Copy every field of a schema onto a record of the same schema.
    pub fn identity(schema: &FieldSchema) -> Self {
        Self::new(schema, schema)
    }

    fn build<S: AsRef<str>>(source: &FieldSchema, target: &FieldSchema, filter: FieldFilter<'_, S>) -> Self {
        let mut pairs = Vec::new();
        for (source_index, field) in source.fields().iter().enumerate() {
            if !filter.admits(field) {
                continue;
            }
            let Some(target_index) = target.index_of(&field.name) else {
                continue;
            };
            let target_type = target.fields()[target_index].field_type;
            match conversion_between(field.field_type, target_type) {
                Some(conversion) => pairs.push(FieldPair {
                    source: source_index,
                    target: target_index,
                    conversion,
                }),
                None => debug!(
                    field = %field.name,
                    from = %field.field_type,
                    to = %target_type,
                    "skipping field with incompatible types"
                ),
            }
        }
        debug!(pairs = pairs.len(), "built record copier");
        Self { pairs }
    }

    /// Number of paired fields.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The (source index, target index) pairs, in source order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().map(|p| (p.source, p.target))
    }

    /// Copy every paired field from `source` into `target`.
    ///
    /// Nulls copy as nulls. A value that cannot be stored in its target
    /// field (numeric overflow, over-long string) becomes null there.
    /// Unpaired target fields are left untouched.
    pub fn copy(&self, source: &Record, target: &mut Record) {
        for pair in &self.pairs {
            let value = match source.get(pair.source) {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, "copier source does not match its schema");
                    continue;
                }
            };
            let stored = match (value, pair.conversion) {
                (None, _) => target.set_null(pair.target),
                (Some(v), Conversion::Verbatim) => {
                    target.set_with(pair.target, v.clone(), OverflowPolicy::Reject)
                }
                (Some(v), Conversion::Numeric | Conversion::Temporal) => {
                    target.set_coerced(pair.target, v, OverflowPolicy::Reject)
                }
            };
            if let Err(err) = stored {
                debug!(error = %err, "copied value does not fit, storing null");
                let _ = target.set_null(pair.target);
            }
        }
    }
}

fn conversion_between(from: FieldType, to: FieldType) -> Option<Conversion> {
    if from == to || (from.is_string() && to.is_string()) {
        Some(Conversion::Verbatim)
    } else if from.is_numeric() && to.is_numeric() {
        Some(Conversion::Numeric)
    } else if matches!(
        (from, to),
        (FieldType::Date, FieldType::DateTime) | (FieldType::DateTime, FieldType::Date)
    ) {
        Some(Conversion::Temporal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SchemaRef;
    use crate::value::Value;
    use chrono::NaiveDate;

    fn schema(fields: &[(&str, FieldType)]) -> SchemaRef {
        FieldSchema::new(fields.iter().map(|(n, t)| FieldDescriptor::new(*n, *t)))
            .unwrap()
            .into_ref()
    }

    #[test]
    fn test_copies_only_shared_fields() {
        let a = schema(&[("A", FieldType::Int32), ("B", FieldType::VString)]);
        let b = schema(&[("B", FieldType::VString), ("C", FieldType::Int32)]);
        let copier = RecordCopier::new(&a, &b);
        assert_eq!(copier.pairs().collect::<Vec<_>>(), vec![(1, 0)]);

        let mut source = Record::new(a);
        source.set(0, 1i32).unwrap();
        source.set(1, "bee").unwrap();

        let mut target = Record::new(b);
        target.set(1, 99i32).unwrap();
        copier.copy(&source, &mut target);

        assert_eq!(target.get(0).unwrap(), Some(&Value::from("bee")));
        assert_eq!(target.get(1).unwrap(), Some(&Value::Int32(99)));
    }

    #[test]
    fn test_names_match_case_insensitively_regardless_of_order() {
        let a = schema(&[("x", FieldType::Int32), ("Y", FieldType::Double)]);
        let b = schema(&[("y", FieldType::Double), ("X", FieldType::Int32)]);
        let copier = RecordCopier::new(&a, &b);
        assert_eq!(copier.pairs().collect::<Vec<_>>(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_numeric_conversion_and_overflow() {
        let a = schema(&[("N", FieldType::Int64), ("M", FieldType::Double)]);
        let b = schema(&[("N", FieldType::Byte), ("M", FieldType::Int32)]);
        let copier = RecordCopier::new(&a, &b);

        let mut source = Record::new(a);
        source.set(0, 300i64).unwrap();
        source.set(1, 12.4f64).unwrap();
        let mut target = Record::new(b);
        target.set(0, 1u8).unwrap();
        copier.copy(&source, &mut target);

        assert_eq!(target.get(0).unwrap(), None);
        assert_eq!(target.get(1).unwrap(), Some(&Value::Int32(12)));
    }

    #[test]
    fn test_null_source_nulls_target() {
        let a = schema(&[("N", FieldType::Int32)]);
        let copier = RecordCopier::identity(&a);
        let source = Record::new(a.clone());
        let mut target = Record::new(a);
        target.set(0, 5i32).unwrap();
        copier.copy(&source, &mut target);
        assert!(target.is_null(0).unwrap());
    }

    #[test]
    fn test_field_subset_and_exclusion() {
        let a = schema(&[
            ("A", FieldType::Int32),
            ("B", FieldType::Int32),
            ("C", FieldType::Int32),
        ]);
        let only = RecordCopier::with_fields(&a, &a, &["b"]);
        assert_eq!(only.pairs().collect::<Vec<_>>(), vec![(1, 1)]);

        let all = RecordCopier::with_fields::<&str>(&a, &a, &[]);
        assert_eq!(all.len(), 3);

        let except = RecordCopier::excluding(&a, &a, &["B"]);
        assert_eq!(except.pairs().collect::<Vec<_>>(), vec![(0, 0), (2, 2)]);
    }

    #[test]
    fn test_field_subset_uses_schema_name_matching() {
        let s = schema(&[("Größe", FieldType::Int32), ("ä", FieldType::Int32)]);
        assert_eq!(s.index_of("Ä"), Some(1));

        let only = RecordCopier::with_fields(&s, &s, &["Ä"]);
        assert_eq!(only.pairs().collect::<Vec<_>>(), vec![(1, 1)]);

        let except = RecordCopier::excluding(&s, &s, &["Ä"]);
        assert_eq!(except.pairs().collect::<Vec<_>>(), vec![(0, 0)]);
    }

    #[test]
    fn test_incompatible_types_are_skipped() {
        let a = schema(&[("A", FieldType::VString), ("B", FieldType::Bool)]);
        let b = schema(&[("A", FieldType::Int32), ("B", FieldType::Bool)]);
        let copier = RecordCopier::new(&a, &b);
        assert_eq!(copier.pairs().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn test_string_and_temporal_conversions() {
        let a = FieldSchema::new([
            FieldDescriptor::new("S", FieldType::VWString),
            FieldDescriptor::new("D", FieldType::Date),
        ])
        .unwrap()
        .into_ref();
        let b = FieldSchema::new([
            FieldDescriptor::new("S", FieldType::String).with_size(3),
            FieldDescriptor::new("D", FieldType::DateTime),
        ])
        .unwrap()
        .into_ref();
        let copier = RecordCopier::new(&a, &b);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let mut source = Record::new(a);
        source.set(0, "abc").unwrap();
        source.set(1, date).unwrap();
        let mut target = Record::new(b);
        copier.copy(&source, &mut target);
        assert_eq!(target.get(0).unwrap(), Some(&Value::from("abc")));
        assert_eq!(
            target.get(1).unwrap(),
            Some(&Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap()))
        );

        source.set(0, "abcd").unwrap();
        copier.copy(&source, &mut target);
        assert!(target.is_null(0).unwrap());
    }
}
