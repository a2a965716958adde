use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{EcmError, Result};
use crate::types::InterfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmEvent {
    Connected,
    Disconnected,
    IpChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventData {
    pub interface: Option<InterfaceId>,
    pub ip_address: Option<IpAddr>,
}

impl EventData {
    pub fn link(interface: InterfaceId) -> Self {
        Self { interface: Some(interface), ip_address: None }
    }

    pub fn address(interface: InterfaceId, ip_address: IpAddr) -> Self {
        Self { interface: Some(interface), ip_address: Some(ip_address) }
    }
}

/// Observer for link and address changes.
///
/// Handlers run synchronously on the thread that observed the change (the
/// link monitor or the network stack's callback context). A slow handler
/// delays every handler registered after it.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: EcmEvent, data: &EventData);
}

impl<F> EventHandler for F
where
    F: Fn(EcmEvent, &EventData) + Send + Sync,
{
    fn on_event(&self, event: EcmEvent, data: &EventData) {
        self(event, data)
    }
}

/// Ordered, bounded handler list.
pub(crate) struct EventRegistry {
    capacity: usize,
    handlers: Mutex<Vec<Arc<dyn EventHandler>>>,
}

impl EventRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { capacity, handlers: Mutex::new(Vec::with_capacity(capacity)) }
    }

    /// Append `handler`. The same handler may be registered more than once.
    pub(crate) fn register(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let mut handlers = self.handlers.lock().map_err(|_| EcmError::Mutex("event registry"))?;
        if handlers.len() >= self.capacity {
            return Err(EcmError::CallbacksFull { capacity: self.capacity });
        }
        handlers.push(handler);
        Ok(())
    }

    /// Remove the first entry pointing at `handler`. Returns whether one was found.
    pub(crate) fn deregister(&self, handler: &Arc<dyn EventHandler>) -> Result<bool> {
        let mut handlers = self.handlers.lock().map_err(|_| EcmError::Mutex("event registry"))?;
        match handlers.iter().position(|existing| Arc::ptr_eq(existing, handler)) {
            Some(index) => {
                handlers.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Call every handler in registration order. The list is snapshotted
    /// first so handlers may register or deregister without deadlocking.
    pub(crate) fn dispatch(&self, event: EcmEvent, data: &EventData) {
        let snapshot: Vec<Arc<dyn EventHandler>> =
            self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        log::debug!(
            "ecm: dispatch event={:?} iface={:?} handlers={}",
            event,
            data.interface,
            snapshot.len()
        );
        for handler in snapshot {
            handler.on_event(event, data);
        }
    }
}
