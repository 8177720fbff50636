//! The connection state machine.
//!
//! A connection is one stream endpoint. It moves monotonically through
//! `Unattached -> SchemaProposed? -> Initialized -> Closed` and fans every
//! lifecycle event out to its listeners in registration order.

use crate::field::SchemaRef;
use crate::record::Record;
use std::fmt;

/// Lifecycle position of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Unattached,
    SchemaProposed,
    Initialized,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unattached => "unattached",
            Self::SchemaProposed => "schema proposed",
            Self::Initialized => "initialized",
            Self::Closed => "closed",
        })
    }
}

/// A notification delivered to connection listeners.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionEvent<'a> {
    Init(&'a SchemaRef),
    RecordPushed(&'a Record),
    Progress(f64),
    Closed,
}

/// A listener answers each event with its acceptance.
pub type Listener = Box<dyn FnMut(&ConnectionEvent<'_>) -> bool>;

/// One stream endpoint and its listeners.
pub struct Connection {
    name: String,
    state: ConnectionState,
    schema: Option<SchemaRef>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("schema", &self.schema)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Unattached,
            schema: None,
            listeners: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The negotiated schema, once initialized.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe(&mut self, listener: impl FnMut(&ConnectionEvent<'_>) -> bool + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Enter `SchemaProposed`. Outside `Unattached` this does nothing and
    /// returns false.
    pub fn propose_schema(&mut self) -> bool {
        if self.state != ConnectionState::Unattached {
            return false;
        }
        self.state = ConnectionState::SchemaProposed;
        true
    }

    /// Record the schema and notify listeners.
    ///
    /// Returns whether every listener accepted. A veto still leaves the
    /// connection initialized; the caller must not send records.
    pub fn init(&mut self, schema: SchemaRef) -> Result<bool, ConnectionError> {
        if !matches!(
            self.state,
            ConnectionState::Unattached | ConnectionState::SchemaProposed
        ) {
            return Err(self.invalid("init"));
        }
        self.state = ConnectionState::Initialized;
        self.schema = Some(schema.clone());
        Ok(self.notify(ConnectionEvent::Init(&schema)))
    }

    /// Deliver a record to listeners and return their combined acceptance.
    pub fn push(&mut self, record: &Record) -> Result<bool, ConnectionError> {
        if self.state != ConnectionState::Initialized {
            return Err(self.invalid("push"));
        }
        Ok(self.notify(ConnectionEvent::RecordPushed(record)))
    }

    /// Report progress, clamped to `0.0..=1.0`.
    pub fn update_progress(&mut self, fraction: f64) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Initialized {
            return Err(self.invalid("update_progress"));
        }
        self.notify(ConnectionEvent::Progress(clamp_progress(fraction)));
        Ok(())
    }

    /// Close from any state. Listeners hear about it once; later calls
    /// return false and do nothing.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.notify(ConnectionEvent::Closed);
        true
    }

    fn notify(&mut self, event: ConnectionEvent<'_>) -> bool {
        let mut accepted = true;
        for listener in &mut self.listeners {
            accepted &= listener(&event);
        }
        accepted
    }

    fn invalid(&self, operation: &'static str) -> ConnectionError {
        ConnectionError::InvalidStateTransition {
            connection: self.name.clone(),
            operation,
            state: self.state,
        }
    }
}

pub(crate) fn clamp_progress(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Protocol misuse on a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("cannot {operation} connection '{connection}' while {state}")]
    InvalidStateTransition {
        connection: String,
        operation: &'static str,
        state: ConnectionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDescriptor, FieldSchema, FieldType};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn schema() -> SchemaRef {
        FieldSchema::new([FieldDescriptor::new("A", FieldType::Int32)])
            .unwrap()
            .into_ref()
    }

    /// Subscribe a listener that logs every event and answers `answer`.
    fn recorder(conn: &mut Connection, answer: bool) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        conn.subscribe(move |event| {
            sink.borrow_mut().push(match event {
                ConnectionEvent::Init(_) => "init".to_string(),
                ConnectionEvent::RecordPushed(_) => "push".to_string(),
                ConnectionEvent::Progress(p) => format!("progress {p}"),
                ConnectionEvent::Closed => "closed".to_string(),
            });
            answer
        });
        log
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let mut conn = Connection::new("Input");
        assert_eq!(conn.state(), ConnectionState::Unattached);
        assert!(conn.propose_schema());
        assert_eq!(conn.state(), ConnectionState::SchemaProposed);
        assert!(conn.init(schema()).unwrap());
        assert_eq!(conn.state(), ConnectionState::Initialized);
        assert!(conn.close());
        assert_eq!(conn.state(), ConnectionState::Closed);

        assert!(!conn.propose_schema());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.init(schema()).is_err());
    }

    #[test]
    fn test_init_may_skip_proposal() {
        let mut conn = Connection::new("Input");
        assert!(conn.init(schema()).unwrap());
        assert_eq!(conn.schema().unwrap().len(), 1);
        assert!(!conn.propose_schema());
        assert_eq!(conn.state(), ConnectionState::Initialized);
    }

    #[test]
    fn test_push_outside_initialized_fails_without_listeners() {
        let mut conn = Connection::new("Input");
        let log = recorder(&mut conn, true);
        let record = Record::new(schema());

        let err = conn.push(&record).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::InvalidStateTransition {
                connection: "Input".into(),
                operation: "push",
                state: ConnectionState::Unattached,
            }
        );

        conn.init(schema()).unwrap();
        conn.close();
        assert!(conn.push(&record).is_err());
        assert!(conn.update_progress(0.5).is_err());
        assert_eq!(*log.borrow(), vec!["init", "closed"]);
    }

    #[test]
    fn test_close_notifies_once() {
        let mut conn = Connection::new("Input");
        let log = recorder(&mut conn, true);
        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(*log.borrow(), vec!["closed"]);
    }

    #[test]
    fn test_listeners_all_run_and_are_anded() {
        let mut conn = Connection::new("Input");
        let first = recorder(&mut conn, false);
        let second = recorder(&mut conn, true);

        assert!(!conn.init(schema()).unwrap());
        assert_eq!(conn.state(), ConnectionState::Initialized);
        assert!(!conn.push(&Record::new(schema())).unwrap());
        assert_eq!(first.borrow().len(), 2);
        assert_eq!(second.borrow().len(), 2);
    }

    #[test]
    fn test_no_listeners_accepts() {
        let mut conn = Connection::new("Input");
        assert!(conn.init(schema()).unwrap());
        assert!(conn.push(&Record::new(schema())).unwrap());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut conn = Connection::new("Input");
        let log = recorder(&mut conn, true);
        conn.init(schema()).unwrap();
        conn.update_progress(1.5).unwrap();
        conn.update_progress(-2.0).unwrap();
        conn.update_progress(0.25).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["init", "progress 1", "progress 0", "progress 0.25"]
        );
    }
}
