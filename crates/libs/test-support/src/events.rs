use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use ecm::{EcmEvent, EventData, EventHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub handler: &'static str,
    pub event: EcmEvent,
    pub data: EventData,
}

/// Shared sink for one or more labelled handlers.
#[derive(Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
    changed: Condvar,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that appends to this log under `label`.
    pub fn handler(self: &Arc<Self>, label: &'static str) -> Arc<dyn EventHandler> {
        let log = Arc::clone(self);
        Arc::new(move |event: EcmEvent, data: &EventData| {
            let mut records = log.records.lock().expect("event log poisoned");
            records.push(EventRecord { handler: label, event, data: *data });
            log.changed.notify_all();
        })
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().expect("event log poisoned").clone()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.records().iter().map(|record| record.handler).collect()
    }

    pub fn events_for(&self, label: &'static str) -> Vec<EcmEvent> {
        self.records()
            .iter()
            .filter(|record| record.handler == label)
            .map(|record| record.event)
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().expect("event log poisoned").clear();
    }

    /// Block until at least `count` records exist. Returns `false` on timeout.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock().expect("event log poisoned");
        while records.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            records = self
                .changed
                .wait_timeout(records, deadline - now)
                .expect("event log poisoned")
                .0;
        }
        true
    }
}
