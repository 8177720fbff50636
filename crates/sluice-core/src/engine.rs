//! The pass-through engine: one input, one output, derived fields per record.
//!
//! On init the engine resolves the configured input fields, derives the
//! output schema (input fields plus the declared output fields) and builds a
//! copier for the passthrough fields. Each pushed record is copied, handed to
//! the calculation, and the computed values are written into the output
//! record before it is forwarded.

use crate::connection::Connection;
use crate::copier::RecordCopier;
use crate::culture::Culture;
use crate::field::{FieldDescriptor, FieldType, SchemaError, SchemaRef};
use crate::node::{Node, RecordSink};
use crate::record::{OverflowPolicy, Record};
use crate::value::Value;
use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};

/// A configured reference to an input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    /// Accepted field types; empty accepts any type.
    pub allowed: Vec<FieldType>,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, allowed: &[FieldType]) -> Self {
        Self {
            name: name.into(),
            allowed: allowed.to_vec(),
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, &[])
    }

    /// A reference accepting any of the four string types.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(
            name,
            &[
                FieldType::String,
                FieldType::WString,
                FieldType::VString,
                FieldType::VWString,
            ],
        )
    }

    pub fn accepts(&self, field_type: FieldType) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&field_type)
    }
}

/// What the engine needs from a node's configuration.
pub trait NodeConfig {
    /// Input fields to resolve at init, in the order the calculation
    /// receives them.
    fn field_refs(&self) -> Vec<FieldRef>;

    /// Conventions used for any text conversion.
    fn culture(&self) -> &Culture;
}

/// A resolved input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    pub index: usize,
    pub descriptor: FieldDescriptor,
}

impl FieldHandle {
    pub fn get<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        record.get(self.index).ok().flatten()
    }

    pub fn get_as_string(&self, record: &Record, culture: &Culture) -> Option<String> {
        record.get_as_string(self.index, culture).ok().flatten()
    }

    pub fn get_as_f64(&self, record: &Record, culture: &Culture) -> Option<f64> {
        record.get_as_f64(self.index, culture).ok().flatten()
    }

    pub fn get_as_i64(&self, record: &Record, culture: &Culture) -> Option<i64> {
        record.get_as_i64(self.index, culture).ok().flatten()
    }

    pub fn get_as_bool(&self, record: &Record, culture: &Culture) -> Option<bool> {
        record.get_as_bool(self.index, culture).ok().flatten()
    }

    pub fn get_as_date_time(&self, record: &Record, culture: &Culture) -> Option<NaiveDateTime> {
        record.get_as_date_time(self.index, culture).ok().flatten()
    }

    pub fn get_as_time_span(&self, record: &Record) -> Option<TimeDelta> {
        record.get_as_time_span(self.index).ok().flatten()
    }
}

/// One declared output field and how to read its value from a result.
pub struct OutputField<T> {
    pub descriptor: FieldDescriptor,
    pub value: fn(&T) -> Option<Value>,
}

impl<T> OutputField<T> {
    pub fn new(descriptor: FieldDescriptor, value: fn(&T) -> Option<Value>) -> Self {
        Self { descriptor, value }
    }
}

impl<T> Clone for OutputField<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            value: self.value,
        }
    }
}

impl<T> std::fmt::Debug for OutputField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputField")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A per-record computation, implemented by the node's configuration.
pub trait Calculation: NodeConfig {
    type Output;

    /// The fields this calculation adds to every record.
    fn outputs(&self) -> Vec<OutputField<Self::Output>>;

    /// Compute the derived values for one input record. `inputs` holds the
    /// resolved [`NodeConfig::field_refs`] in order.
    fn calculate(&self, inputs: &[FieldHandle], record: &Record) -> Self::Output;
}

/// Errors that veto an engine's init.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unresolved field '{0}': not present in the input schema")]
    UnresolvedField(String),

    #[error("unresolved field '{field}': type {found} is not accepted")]
    DisallowedType { field: String, found: FieldType },

    #[error("cannot derive output schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Resources built at init and released at close.
struct EngineState<T> {
    schema: SchemaRef,
    copier: RecordCopier,
    inputs: Vec<FieldHandle>,
    /// Output position of each declared field.
    outputs: Vec<(usize, OutputField<T>)>,
}

/// A one-in, one-out node adding computed fields to every record.
pub struct PassThroughEngine<C: Calculation, S: RecordSink> {
    input: Connection,
    output: S,
    config: C,
    policy: OverflowPolicy,
    state: Option<EngineState<C::Output>>,
}

impl<C: Calculation, S: RecordSink> PassThroughEngine<C, S> {
    pub fn new(config: C, output: S) -> Self {
        Self {
            input: Connection::new("Input"),
            output,
            config,
            policy: OverflowPolicy::default(),
            state: None,
        }
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn output(&self) -> &S {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut S {
        &mut self.output
    }

    pub fn into_output(self) -> S {
        self.output
    }

    /// The derived output schema, between a successful init and close.
    pub fn output_schema(&self) -> Option<&SchemaRef> {
        self.state.as_ref().map(|s| &s.schema)
    }

    fn resolve(&self, schema: &SchemaRef) -> Result<EngineState<C::Output>, ResolveError> {
        let inputs = self
            .config
            .field_refs()
            .into_iter()
            .map(|field_ref| {
                let index = schema
                    .index_of(&field_ref.name)
                    .ok_or_else(|| ResolveError::UnresolvedField(field_ref.name.clone()))?;
                let descriptor = schema.fields()[index].clone();
                if !field_ref.accepts(descriptor.field_type) {
                    return Err(ResolveError::DisallowedType {
                        field: descriptor.name,
                        found: descriptor.field_type,
                    });
                }
                Ok(FieldHandle { index, descriptor })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let declared = self.config.outputs();
        let output_schema = schema
            .extend_with(declared.iter().map(|o| o.descriptor.clone()))?
            .into_ref();

        let names: Vec<&str> = declared.iter().map(|o| o.descriptor.name.as_str()).collect();
        let copier = RecordCopier::excluding(schema, &output_schema, &names);

        let outputs = declared
            .into_iter()
            .filter_map(|field| {
                output_schema
                    .index_of(&field.descriptor.name)
                    .map(|index| (index, field))
            })
            .collect();

        Ok(EngineState {
            schema: output_schema,
            copier,
            inputs,
            outputs,
        })
    }
}

impl<C: Calculation, S: RecordSink> Node for PassThroughEngine<C, S> {
    type Port = ();

    fn connection(&self, _port: ()) -> &Connection {
        &self.input
    }

    fn connection_mut(&mut self, _port: ()) -> &mut Connection {
        &mut self.input
    }

    fn on_init(&mut self, _port: (), schema: &SchemaRef) -> bool {
        match self.resolve(schema) {
            Ok(state) => {
                let output_schema = state.schema.clone();
                self.state = Some(state);
                self.output.init(output_schema)
            }
            Err(err) => {
                warn!(error = %err, "vetoing init");
                self.state = None;
                false
            }
        }
    }

    fn on_record(&mut self, _port: (), record: &Record) -> bool {
        let Some(state) = &self.state else {
            return false;
        };

        let mut out = Record::new(state.schema.clone());
        state.copier.copy(record, &mut out);

        let result = self.config.calculate(&state.inputs, record);
        for (index, field) in &state.outputs {
            // The slot may hold a passthrough value when the output shadows an input.
            let Some(value) = (field.value)(&result) else {
                let _ = out.set_null(*index);
                continue;
            };
            if let Err(err) = out.set_coerced(*index, &value, self.policy) {
                debug!(field = %field.descriptor.name, error = %err, "computed value dropped");
                let _ = out.set_null(*index);
            }
        }

        self.output.push(&out)
    }

    fn on_progress(&mut self, _port: (), fraction: f64) {
        self.output.update_progress(fraction);
    }

    fn on_closed(&mut self, _port: ()) {
        self.output.close();
        self.state = None;
        info!(connection = self.input.name(), "pass-through closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::field::FieldSchema;
    use crate::node::MemorySink;

    /// Doubles a numeric parse of the configured field.
    struct Doubler {
        field: String,
        output: String,
        output_type: FieldType,
        culture: Culture,
    }

    impl Doubler {
        fn new(field: &str, output: &str) -> Self {
            Self {
                field: field.into(),
                output: output.into(),
                output_type: FieldType::Double,
                culture: Culture::invariant(),
            }
        }
    }

    struct Doubled {
        value: Option<f64>,
    }

    impl NodeConfig for Doubler {
        fn field_refs(&self) -> Vec<FieldRef> {
            vec![FieldRef::string(&self.field)]
        }

        fn culture(&self) -> &Culture {
            &self.culture
        }
    }

    impl Calculation for Doubler {
        type Output = Doubled;

        fn outputs(&self) -> Vec<OutputField<Doubled>> {
            vec![OutputField::new(
                FieldDescriptor::new(&self.output, self.output_type),
                |d: &Doubled| d.value.map(Value::Double),
            )]
        }

        fn calculate(&self, inputs: &[FieldHandle], record: &Record) -> Doubled {
            Doubled {
                value: inputs[0]
                    .get_as_f64(record, &self.culture)
                    .map(|n| n * 2.0),
            }
        }
    }

    fn string_schema() -> SchemaRef {
        FieldSchema::new([FieldDescriptor::new("Value", FieldType::VString)])
            .unwrap()
            .into_ref()
    }

    fn record(schema: &SchemaRef, text: &str) -> Record {
        let mut r = Record::new(schema.clone());
        r.set(0, text).unwrap();
        r
    }

    #[test]
    fn test_doubles_parsed_value() {
        let schema = string_schema();
        let mut engine = PassThroughEngine::new(Doubler::new("Value", "Doubled"), MemorySink::new());

        assert!(engine.inbound(()).init(schema.clone()).unwrap());
        assert!(engine.inbound(()).push(&record(&schema, "21")).unwrap());
        assert!(engine.inbound(()).push(&record(&schema, "abc")).unwrap());

        let out = engine.output();
        let names: Vec<_> = out.schema.as_ref().unwrap().names().collect();
        assert_eq!(names, vec!["Value", "Doubled"]);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].get(0).unwrap(), Some(&Value::from("21")));
        assert_eq!(out.records[0].get(1).unwrap(), Some(&Value::Double(42.0)));
        assert_eq!(out.records[1].get(0).unwrap(), Some(&Value::from("abc")));
        assert_eq!(out.records[1].get(1).unwrap(), None);
    }

    #[test]
    fn test_unresolved_field_vetoes_init() {
        let schema = string_schema();
        let mut engine = PassThroughEngine::new(Doubler::new("Missing", "Doubled"), MemorySink::new());

        assert!(!engine.inbound(()).init(schema.clone()).unwrap());
        assert_eq!(engine.inbound(()).state(), ConnectionState::Initialized);
        assert!(!engine.inbound(()).push(&record(&schema, "1")).unwrap());
        assert_eq!(engine.output().init_count, 0);
        assert!(engine.output().records.is_empty());
    }

    #[test]
    fn test_disallowed_type_vetoes_init() {
        let schema = FieldSchema::new([FieldDescriptor::new("Value", FieldType::Int32)])
            .unwrap()
            .into_ref();
        let engine = PassThroughEngine::new(Doubler::new("Value", "Doubled"), MemorySink::new());
        assert_eq!(
            engine.resolve(&schema).err(),
            Some(ResolveError::DisallowedType {
                field: "Value".into(),
                found: FieldType::Int32
            })
        );
    }

    #[test]
    fn test_output_replaces_same_named_input() {
        let schema = FieldSchema::new([
            FieldDescriptor::new("Value", FieldType::VString),
            FieldDescriptor::new("Other", FieldType::Int32),
        ])
        .unwrap()
        .into_ref();
        let mut engine = PassThroughEngine::new(Doubler::new("Value", "Other"), MemorySink::new());
        engine.inbound(()).init(schema.clone()).unwrap();

        let mut input = record(&schema, "5");
        input.set(1, 100i32).unwrap();
        engine.inbound(()).push(&input).unwrap();

        let mut failing = record(&schema, "abc");
        failing.set(1, 100i32).unwrap();
        engine.inbound(()).push(&failing).unwrap();

        let out = &engine.output().records[0];
        assert_eq!(out.schema().len(), 2);
        assert_eq!(out.schema().field(1).unwrap().field_type, FieldType::Double);
        assert_eq!(out.get(1).unwrap(), Some(&Value::Double(10.0)));
        assert_eq!(engine.output().records[1].get(1).unwrap(), None);
    }

    #[test]
    fn test_shadowed_input_matches_like_the_schema() {
        let schema = FieldSchema::new([
            FieldDescriptor::new("Value", FieldType::VString),
            FieldDescriptor::new("ä", FieldType::Int32),
        ])
        .unwrap()
        .into_ref();
        let mut engine = PassThroughEngine::new(Doubler::new("Value", "Ä"), MemorySink::new());
        engine.inbound(()).init(schema.clone()).unwrap();

        let mut input = record(&schema, "abc");
        input.set(1, 5i32).unwrap();
        engine.inbound(()).push(&input).unwrap();

        let out = &engine.output().records[0];
        assert_eq!(out.schema().len(), 2);
        assert_eq!(out.schema().field(1).unwrap().name, "Ä");
        assert_eq!(out.get(1).unwrap(), None);
        assert_eq!(out.get(0).unwrap(), Some(&Value::from("abc")));
    }

    #[test]
    fn test_computed_value_coerced_to_declared_type() {
        let schema = string_schema();
        let mut config = Doubler::new("Value", "Small");
        config.output_type = FieldType::Byte;
        let mut engine = PassThroughEngine::new(config, MemorySink::new());
        engine.inbound(()).init(schema.clone()).unwrap();
        engine.inbound(()).push(&record(&schema, "21")).unwrap();
        engine.inbound(()).push(&record(&schema, "500")).unwrap();

        let records = &engine.output().records;
        assert_eq!(records[0].get(1).unwrap(), Some(&Value::Byte(42)));
        assert_eq!(records[1].get(1).unwrap(), None);
    }

    #[test]
    fn test_progress_and_close_forwarded() {
        let schema = string_schema();
        let mut engine = PassThroughEngine::new(Doubler::new("Value", "Doubled"), MemorySink::new());
        engine.inbound(()).init(schema).unwrap();
        engine.inbound(()).update_progress(0.5).unwrap();
        engine.inbound(()).close();
        engine.inbound(()).close();

        assert!(engine.output_schema().is_none());
        let out = engine.into_output();
        assert_eq!(out.progress, vec![0.5]);
        assert_eq!(out.close_count, 1);
    }

    #[test]
    fn test_downstream_refusal_is_reported() {
        let schema = string_schema();
        let mut engine = PassThroughEngine::new(Doubler::new("Value", "Doubled"), MemorySink::rejecting());
        assert!(!engine.inbound(()).init(schema.clone()).unwrap());
        assert!(!engine.inbound(()).push(&record(&schema, "1")).unwrap());
    }
}
