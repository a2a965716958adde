use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bringup::{BringUp, DeepSleepGuard};
use crate::config::{EcmConfig, InterfaceConfig};
use crate::error::{EcmError, Result};
use crate::events::{EventHandler, EventRegistry};
use crate::interface::EthInterface;
use crate::mac::MacDriver;
use crate::monitor::{LinkMonitor, LinkSnapshot, LinkTable};
use crate::phy::PhyDriver;
use crate::stack::NetworkStack;
use crate::types::{InterfaceId, MacBase};

/// State guarded by the lifecycle mutex.
#[derive(Default)]
pub(crate) struct LifecycleState {
    stack_initialized: bool,
    mac_configured: bool,
    pub(crate) monitor: Option<LinkMonitor>,
    pub(crate) monitor_refs: usize,
}

pub(crate) struct EcmInner {
    pub(crate) config: EcmConfig,
    pub(crate) mac: Arc<dyn MacDriver>,
    pub(crate) stack: Arc<dyn NetworkStack>,
    initialized: AtomicBool,
    state: Mutex<LifecycleState>,
    pub(crate) links: Arc<LinkTable>,
    pub(crate) events: Arc<EventRegistry>,
}

impl EcmInner {
    /// Take the lifecycle mutex. Held for the whole body of every public
    /// operation, including its link and DHCP waits.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, LifecycleState>> {
        log::trace!("ecm: acquire lifecycle lock");
        self.state.lock().map_err(|_| {
            log::error!("ecm: lifecycle lock poisoned");
            EcmError::Mutex("lifecycle")
        })
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(EcmError::NotInitialized)
        }
    }
}

/// Ethernet connection manager.
///
/// Cloning yields another handle to the same manager. Interfaces opened
/// from it keep the manager's shared state alive until they are closed.
#[derive(Clone)]
pub struct Ecm {
    inner: Arc<EcmInner>,
}

impl Ecm {
    /// Build a manager over the given drivers. The configuration is
    /// validated here, so zero poll intervals never reach a wait loop.
    pub fn new(
        config: EcmConfig,
        mac: Arc<dyn MacDriver>,
        stack: Arc<dyn NetworkStack>,
    ) -> Result<Self> {
        config.validate().map_err(|err| {
            log::error!("ecm: rejected configuration err={}", err);
            err
        })?;
        let events = Arc::new(EventRegistry::new(config.max_event_handlers));
        Ok(Self {
            inner: Arc::new(EcmInner {
                config,
                mac,
                stack,
                initialized: AtomicBool::new(false),
                state: Mutex::new(LifecycleState::default()),
                links: Arc::new(LinkTable::default()),
                events,
            }),
        })
    }

    pub fn config(&self) -> &EcmConfig {
        &self.inner.config
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Bring up the network stack and mark the manager ready. A second call
    /// without `deinit` fails and leaves the stack untouched.
    pub fn init(&self) -> Result<()> {
        if self.is_initialized() {
            log::error!("ecm: already initialized");
            return Err(EcmError::AlreadyInitialized);
        }
        let mut state = self.inner.lock()?;
        if self.is_initialized() {
            return Err(EcmError::AlreadyInitialized);
        }
        if !state.stack_initialized {
            self.inner.stack.init().map_err(|err| {
                log::error!("ecm: network stack init failed err={}", err);
                EcmError::NetworkInit(err)
            })?;
            state.stack_initialized = true;
        }
        self.inner.initialized.store(true, Ordering::Release);
        log::info!("ecm: initialized");
        Ok(())
    }

    /// Tear down the network stack. Every step runs even if an earlier one
    /// failed; the stack teardown error, if any, is returned.
    pub fn deinit(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(EcmError::NotInitialized);
        }
        let mut state = self.inner.lock()?;
        self.inner.initialized.store(false, Ordering::Release);

        let mut result = Ok(());
        if state.stack_initialized {
            if let Err(err) = self.inner.stack.deinit() {
                log::warn!("ecm: network stack deinit failed err={}", err);
                result = Err(EcmError::NetworkDeinit(err));
            }
            state.stack_initialized = false;
        }
        log::info!("ecm: deinitialized");
        result
    }

    /// Open interface `id`: bring up MAC and PHY, wait for link and start
    /// the link monitor if this is the first open interface.
    pub fn open(&self, id: InterfaceId, phy: Arc<dyn PhyDriver>) -> Result<EthInterface> {
        let inner = &self.inner;
        let iface_config = inner
            .config
            .interface(id)
            .ok_or_else(|| EcmError::bad_argument(format!("interface {id} is not enabled")))?
            .clone();
        inner.ensure_initialized()?;

        let mut state = inner.lock()?;
        if inner.links.is_driver_initialized(id) {
            log::error!("ecm: interface already open iface={}", id);
            return Err(EcmError::AlreadyInitialized);
        }
        let base = inner.config.mac_base(id);

        let phy_config = {
            let _sleep = DeepSleepGuard::acquire(inner.mac.as_ref());
            let bring_up = BringUp {
                mac: inner.mac.as_ref(),
                phy: phy.as_ref(),
                timing: &inner.config.timing,
                id,
                base,
            };
            let phy_config = bring_up.run(&iface_config, &mut state.mac_configured).map_err(|err| {
                log::error!("ecm: driver bring-up failed iface={} err={}", id, err);
                EcmError::from(err)
            })?;
            if let Err(err) = apply_frame_policy(inner.mac.as_ref(), base, &iface_config) {
                inner.mac.deregister_callbacks(base);
                return Err(err);
            }
            phy_config
        };
        inner.links.mark_initialized(id, Arc::clone(&phy));

        if state.monitor_refs == 0 {
            match LinkMonitor::spawn(
                Arc::clone(&inner.links),
                Arc::clone(&inner.events),
                inner.config.timing.monitor_interval(),
            ) {
                Ok(monitor) => state.monitor = Some(monitor),
                Err(err) => {
                    log::error!("ecm: link monitor spawn failed err={}", err);
                    inner.links.clear(id);
                    inner.mac.deregister_callbacks(base);
                    return Err(EcmError::Monitor(err.to_string()));
                }
            }
        }
        state.monitor_refs += 1;
        drop(state);

        let mac_address = iface_config.mac_address();
        log::info!("ecm: opened iface={} base={} mac={}", id, base, mac_address);
        Ok(EthInterface::new(Arc::clone(inner), id, base, phy, mac_address, phy_config))
    }

    pub fn register_event_handler(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.inner.ensure_initialized()?;
        let _state = self.inner.lock()?;
        self.inner.events.register(handler)
    }

    /// Remove the first registration of `handler`; absent handlers are ignored.
    pub fn deregister_event_handler(&self, handler: &Arc<dyn EventHandler>) -> Result<()> {
        self.inner.ensure_initialized()?;
        let _state = self.inner.lock()?;
        if !self.inner.events.deregister(handler)? {
            log::debug!("ecm: deregister of unknown event handler ignored");
        }
        Ok(())
    }

    pub fn event_handler_count(&self) -> usize {
        self.inner.events.len()
    }

    pub fn link_snapshot(&self, id: InterfaceId) -> LinkSnapshot {
        self.inner.links.snapshot(id)
    }

    pub fn monitor_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .monitor
            .is_some()
    }
}

fn apply_frame_policy(mac: &dyn MacDriver, base: MacBase, iface: &InterfaceConfig) -> Result<()> {
    if iface.promiscuous {
        mac.set_promiscuous_mode(base, true)?;
    }
    if !iface.accept_broadcast {
        mac.set_no_broadcast(base, true)?;
    }
    Ok(())
}
