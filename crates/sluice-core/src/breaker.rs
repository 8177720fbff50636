//! Circuit breaker: gate a main stream on activity from a breaker stream.
//!
//! Main records are held while the breaker input is open. If the breaker
//! closes without ever receiving a record, the held records are replayed in
//! arrival order and later records flow straight through. If the breaker
//! receives a record, the breaker trips: held records are discarded, later
//! main records are refused and the host is told processing is complete.

use crate::connection::Connection;
use crate::copier::RecordCopier;
use crate::field::SchemaRef;
use crate::node::{Node, RecordSink};
use crate::record::Record;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Input ports of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerPort {
    Breaker,
    Main,
}

pub struct CircuitBreaker<S: RecordSink> {
    breaker: Connection,
    main: Connection,
    output: S,
    /// Set once the breaker stream delivers a record.
    failed: bool,
    pending: Option<VecDeque<Record>>,
    main_schema: Option<SchemaRef>,
    copier: Option<RecordCopier>,
    on_complete: Option<Box<dyn FnMut()>>,
    complete: bool,
    output_closed: bool,
}

impl<S: RecordSink> CircuitBreaker<S> {
    pub fn new(output: S) -> Self {
        Self {
            breaker: Connection::new("Breaker"),
            main: Connection::new("Input"),
            output,
            failed: false,
            pending: None,
            main_schema: None,
            copier: None,
            on_complete: None,
            complete: false,
            output_closed: false,
        }
    }

    /// Call `callback` when the breaker trips.
    pub fn on_complete(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Whether the breaker has signalled end of processing.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_tripped(&self) -> bool {
        self.failed
    }

    /// Number of main records waiting on the breaker.
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, VecDeque::len)
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

    fn trip(&mut self) {
        self.failed = true;
        self.complete = true;
        info!(pending = self.pending_len(), "circuit breaker tripped");
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
    }

    fn close_output(&mut self) {
        if self.output_closed {
            return;
        }
        self.output_closed = true;
        self.output.close();
        self.pending = None;
        self.copier = None;
        self.main_schema = None;
        info!("circuit breaker closed");
    }
}

impl<S: RecordSink> Node for CircuitBreaker<S> {
    type Port = BreakerPort;

    fn connection(&self, port: BreakerPort) -> &Connection {
        match port {
            BreakerPort::Breaker => &self.breaker,
            BreakerPort::Main => &self.main,
        }
    }

    fn connection_mut(&mut self, port: BreakerPort) -> &mut Connection {
        match port {
            BreakerPort::Breaker => &mut self.breaker,
            BreakerPort::Main => &mut self.main,
        }
    }

    fn on_init(&mut self, port: BreakerPort, schema: &SchemaRef) -> bool {
        match port {
            BreakerPort::Breaker => {
                self.failed = false;
                self.complete = false;
                true
            }
            BreakerPort::Main => {
                self.pending = Some(VecDeque::new());
                self.copier = Some(RecordCopier::identity(schema));
                self.main_schema = Some(schema.clone());
                self.output.init(schema.clone())
            }
        }
    }

    fn on_record(&mut self, port: BreakerPort, record: &Record) -> bool {
        if self.failed {
            return false;
        }
        match port {
            BreakerPort::Breaker => {
                self.trip();
                true
            }
            BreakerPort::Main => {
                let (Some(schema), Some(copier)) = (&self.main_schema, &self.copier) else {
                    return false;
                };
                let mut held = Record::new(schema.clone());
                copier.copy(record, &mut held);

                if self.breaker.is_closed() {
                    self.output.push(&held)
                } else {
                    self.pending.get_or_insert_with(VecDeque::new).push_back(held);
                    true
                }
            }
        }
    }

    fn on_progress(&mut self, port: BreakerPort, fraction: f64) {
        if port == BreakerPort::Main {
            let fraction = if self.failed { 1.0 } else { fraction };
            self.output.update_progress(fraction);
        }
    }

    fn on_closed(&mut self, port: BreakerPort) {
        match port {
            BreakerPort::Breaker => {
                if let Some(pending) = self.pending.as_mut() {
                    if self.failed {
                        debug!(records = pending.len(), "discarding held records");
                        pending.clear();
                    } else {
                        debug!(records = pending.len(), "replaying held records");
                        while let Some(record) = pending.pop_front() {
                            self.output.push(&record);
                        }
                    }
                }
                if self.main.is_closed() {
                    self.close_output();
                }
            }
            BreakerPort::Main => {
                if self.breaker.is_closed() {
                    self.close_output();
                }
            }
        }
    }
}
