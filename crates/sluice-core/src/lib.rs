//! Sluice: record-oriented streaming engine
//!
//! Typed tabular records flow through connections that negotiate a schema,
//! stream records and close. Dataflow nodes sit between connections: a
//! pass-through engine that adds computed fields to each record, and a
//! circuit breaker that gates one stream on activity from another.

mod breaker;
mod connection;
mod copier;
pub mod culture;
mod engine;
mod field;
mod node;
mod record;
mod value;
mod workflow;

pub use breaker::{BreakerPort, CircuitBreaker};
pub use connection::{Connection, ConnectionError, ConnectionEvent, ConnectionState, Listener};
pub use copier::RecordCopier;
pub use culture::{Culture, CultureError};
pub use engine::{
    Calculation, FieldHandle, FieldRef, NodeConfig, OutputField, PassThroughEngine, ResolveError,
};
pub use field::{FieldDescriptor, FieldSchema, FieldType, SchemaError, SchemaRef};
pub use node::{Inbound, MemorySink, Node, NullSink, PortSink, Presort, RecordSink, SortField};
pub use record::{OverflowPolicy, Record, RecordError};
pub use value::Value;
pub use workflow::{Step, Workflow, WorkflowError, detect_format};
