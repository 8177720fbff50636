//! Dataflow nodes, their inbound ports and outbound sinks.

use crate::connection::{Connection, ConnectionError, ConnectionState, clamp_progress};
use crate::field::{FieldSchema, SchemaRef};
use crate::record::Record;
use std::fmt;
use tracing::warn;

/// One sort key requested from an upstream producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl From<&str> for SortField {
    /// A leading `~` sorts descending.
    fn from(spec: &str) -> Self {
        match spec.strip_prefix('~') {
            Some(field) => Self {
                field: field.trim().to_string(),
                descending: true,
            },
            None => Self {
                field: spec.trim().to_string(),
                descending: false,
            },
        }
    }
}

/// Advisory sort/select directives returned from schema proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presort {
    pub sort: Vec<SortField>,
    /// Fields to keep; `None` keeps every field.
    pub select: Option<Vec<String>>,
}

impl Presort {
    pub fn sort_by<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sort: fields.into_iter().map(|f| SortField::from(f.as_ref())).collect(),
            select: None,
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// A dataflow node owning one connection per input port.
///
/// The node is the final listener on each of its connections: every
/// operation driven through [`Node::inbound`] first runs the connection
/// (state checks and listeners), then the node's handler, and answers with
/// the AND of both.
pub trait Node {
    type Port: Copy + fmt::Debug;

    fn connection(&self, port: Self::Port) -> &Connection;

    fn connection_mut(&mut self, port: Self::Port) -> &mut Connection;

    fn on_propose(&mut self, _port: Self::Port, _candidate: &FieldSchema) -> Option<Presort> {
        None
    }

    fn on_init(&mut self, port: Self::Port, schema: &SchemaRef) -> bool;

    fn on_record(&mut self, port: Self::Port, record: &Record) -> bool;

    fn on_progress(&mut self, port: Self::Port, fraction: f64);

    fn on_closed(&mut self, port: Self::Port);

    /// The host-facing handle for one input port.
    fn inbound(&mut self, port: Self::Port) -> Inbound<'_, Self>
    where
        Self: Sized,
    {
        Inbound { node: self, port }
    }
}

/// Drives one input port of a node.
pub struct Inbound<'a, N: Node> {
    node: &'a mut N,
    port: N::Port,
}

impl<N: Node> Inbound<'_, N> {
    pub fn state(&self) -> ConnectionState {
        self.node.connection(self.port).state()
    }

    /// Offer a candidate schema. Only the first proposal on an unattached
    /// port reaches the node.
    pub fn propose_schema(&mut self, candidate: &FieldSchema) -> Option<Presort> {
        if self.node.connection_mut(self.port).propose_schema() {
            self.node.on_propose(self.port, candidate)
        } else {
            None
        }
    }

    pub fn init(&mut self, schema: SchemaRef) -> Result<bool, ConnectionError> {
        let accepted = self.node.connection_mut(self.port).init(schema.clone())?;
        Ok(self.node.on_init(self.port, &schema) && accepted)
    }

    pub fn push(&mut self, record: &Record) -> Result<bool, ConnectionError> {
        let accepted = self.node.connection_mut(self.port).push(record)?;
        Ok(self.node.on_record(self.port, record) && accepted)
    }

    pub fn update_progress(&mut self, fraction: f64) -> Result<(), ConnectionError> {
        self.node
            .connection_mut(self.port)
            .update_progress(fraction)?;
        self.node.on_progress(self.port, clamp_progress(fraction));
        Ok(())
    }

    /// Close the port. The node's handler runs only on the first close.
    pub fn close(&mut self) {
        if self.node.connection_mut(self.port).close() {
            self.node.on_closed(self.port);
        }
    }
}

/// The outbound surface a node drives: the inbound operations without
/// protocol errors.
pub trait RecordSink {
    fn propose_schema(&mut self, _candidate: &FieldSchema) -> Option<Presort> {
        None
    }

    fn init(&mut self, schema: SchemaRef) -> bool;

    fn push(&mut self, record: &Record) -> bool;

    fn update_progress(&mut self, fraction: f64);

    fn close(&mut self);
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn propose_schema(&mut self, candidate: &FieldSchema) -> Option<Presort> {
        (**self).propose_schema(candidate)
    }

    fn init(&mut self, schema: SchemaRef) -> bool {
        (**self).init(schema)
    }

    fn push(&mut self, record: &Record) -> bool {
        (**self).push(record)
    }

    fn update_progress(&mut self, fraction: f64) {
        (**self).update_progress(fraction)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn propose_schema(&mut self, candidate: &FieldSchema) -> Option<Presort> {
        (**self).propose_schema(candidate)
    }

    fn init(&mut self, schema: SchemaRef) -> bool {
        (**self).init(schema)
    }

    fn push(&mut self, record: &Record) -> bool {
        (**self).push(record)
    }

    fn update_progress(&mut self, fraction: f64) {
        (**self).update_progress(fraction)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A sink that keeps everything it receives.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySink {
    pub schema: Option<SchemaRef>,
    pub records: Vec<Record>,
    pub progress: Vec<f64>,
    pub init_count: usize,
    pub close_count: usize,
    /// Answer given to `init` and `push`.
    pub accept: bool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            schema: None,
            records: Vec::new(),
            progress: Vec::new(),
            init_count: 0,
            close_count: 0,
            accept: true,
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that vetoes init and refuses every record.
    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_count > 0
    }
}

impl RecordSink for MemorySink {
    fn init(&mut self, schema: SchemaRef) -> bool {
        self.schema = Some(schema);
        self.init_count += 1;
        self.accept
    }

    fn push(&mut self, record: &Record) -> bool {
        if self.accept {
            self.records.push(record.clone());
        }
        self.accept
    }

    fn update_progress(&mut self, fraction: f64) {
        self.progress.push(fraction);
    }

    fn close(&mut self) {
        self.close_count += 1;
    }
}

/// An unconnected output: accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn init(&mut self, _schema: SchemaRef) -> bool {
        true
    }

    fn push(&mut self, _record: &Record) -> bool {
        true
    }

    fn update_progress(&mut self, _fraction: f64) {}

    fn close(&mut self) {}
}

/// Feeds one port of a downstream node, so nodes can be chained.
///
/// Protocol errors from the downstream connection are logged and answered
/// with `false`.
pub struct PortSink<N: Node> {
    node: N,
    port: N::Port,
}

impl<N: Node> PortSink<N> {
    pub fn new(node: N, port: N::Port) -> Self {
        Self { node, port }
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut N {
        &mut self.node
    }

    pub fn into_inner(self) -> N {
        self.node
    }
}

impl<N: Node> RecordSink for PortSink<N> {
    fn propose_schema(&mut self, candidate: &FieldSchema) -> Option<Presort> {
        self.node.inbound(self.port).propose_schema(candidate)
    }

    fn init(&mut self, schema: SchemaRef) -> bool {
        self.node.inbound(self.port).init(schema).unwrap_or_else(|err| {
            warn!(port = ?self.port, error = %err, "downstream refused init");
            false
        })
    }

    fn push(&mut self, record: &Record) -> bool {
        self.node.inbound(self.port).push(record).unwrap_or_else(|err| {
            warn!(port = ?self.port, error = %err, "downstream refused record");
            false
        })
    }

    fn update_progress(&mut self, fraction: f64) {
        if let Err(err) = self.node.inbound(self.port).update_progress(fraction) {
            warn!(port = ?self.port, error = %err, "downstream refused progress");
        }
    }

    fn close(&mut self) {
        self.node.inbound(self.port).close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDescriptor, FieldType};

    /// Counts handler calls and asks for a sort on proposal.
    struct Probe {
        input: Connection,
        inits: usize,
        records: usize,
        closes: usize,
        last_progress: Option<f64>,
        accept: bool,
    }

    impl Probe {
        fn new(accept: bool) -> Self {
            Self {
                input: Connection::new("Input"),
                inits: 0,
                records: 0,
                closes: 0,
                last_progress: None,
                accept,
            }
        }
    }

    impl Node for Probe {
        type Port = ();

        fn connection(&self, _port: ()) -> &Connection {
            &self.input
        }

        fn connection_mut(&mut self, _port: ()) -> &mut Connection {
            &mut self.input
        }

        fn on_propose(&mut self, _port: (), _candidate: &FieldSchema) -> Option<Presort> {
            Some(Presort::sort_by(["A", "~B"]).select(["A"]))
        }

        fn on_init(&mut self, _port: (), _schema: &SchemaRef) -> bool {
            self.inits += 1;
            self.accept
        }

        fn on_record(&mut self, _port: (), _record: &Record) -> bool {
            self.records += 1;
            self.accept
        }

        fn on_progress(&mut self, _port: (), fraction: f64) {
            self.last_progress = Some(fraction);
        }

        fn on_closed(&mut self, _port: ()) {
            self.closes += 1;
        }
    }

    fn schema() -> SchemaRef {
        FieldSchema::new([FieldDescriptor::new("A", FieldType::Int32)])
            .unwrap()
            .into_ref()
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!(
            SortField::from("~Name"),
            SortField {
                field: "Name".into(),
                descending: true
            }
        );
        assert!(!SortField::from("Id").descending);
    }

    #[test]
    fn test_inbound_proposal_runs_once() {
        let mut probe = Probe::new(true);
        let presort = probe.inbound(()).propose_schema(&schema()).unwrap();
        assert_eq!(presort.sort.len(), 2);
        assert!(presort.sort[1].descending);
        assert_eq!(presort.select, Some(vec!["A".to_string()]));
        assert!(probe.inbound(()).propose_schema(&schema()).is_none());
    }

    #[test]
    fn test_inbound_runs_connection_then_node() {
        let mut probe = Probe::new(true);
        let record = Record::new(schema());

        assert!(probe.inbound(()).push(&record).is_err());
        assert_eq!(probe.records, 0);

        assert!(probe.inbound(()).init(schema()).unwrap());
        assert!(probe.inbound(()).push(&record).unwrap());
        probe.inbound(()).update_progress(3.0).unwrap();
        probe.inbound(()).close();
        probe.inbound(()).close();

        assert_eq!(probe.inits, 1);
        assert_eq!(probe.records, 1);
        assert_eq!(probe.last_progress, Some(1.0));
        assert_eq!(probe.closes, 1);
        assert_eq!(probe.inbound(()).state(), ConnectionState::Closed);
    }

    #[test]
    fn test_node_veto_is_reported() {
        let mut probe = Probe::new(false);
        assert!(!probe.inbound(()).init(schema()).unwrap());
        assert!(!probe.inbound(()).push(&Record::new(schema())).unwrap());
    }

    #[test]
    fn test_port_sink_swallows_protocol_errors() {
        let mut sink = PortSink::new(Probe::new(true), ());
        assert!(!sink.push(&Record::new(schema())));
        assert!(sink.init(schema()));
        assert!(!sink.init(schema()));
        sink.close();
        sink.update_progress(0.5);
        assert_eq!(sink.node().closes, 1);
        assert_eq!(sink.into_inner().inits, 1);
    }

    #[test]
    fn test_memory_sink_through_box() {
        let mut sink: Box<dyn RecordSink> = Box::new(MemorySink::new());
        assert!(sink.init(schema()));
        assert!(sink.push(&Record::new(schema())));
        sink.close();

        let mut rejecting = MemorySink::rejecting();
        assert!(!(&mut rejecting).push(&Record::new(schema())));
        assert!(rejecting.records.is_empty());
    }
}
