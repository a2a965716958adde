use std::sync::{Mutex, MutexGuard};

use ecm::mac::{MacDriver, MacError, MacResult, WrapperConfig};
use ecm::{FilterAddress, MacBase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacCall {
    MdioInit(MacBase),
    Init(MacBase, WrapperConfig),
    RegisterCallbacks(MacBase),
    DeregisterCallbacks(MacBase),
    Promiscuous(MacBase, bool),
    NoBroadcast(MacBase, bool),
    Filter(MacBase, u8, FilterAddress),
    LockDeepSleep,
    UnlockDeepSleep,
}

#[derive(Default)]
struct MacState {
    calls: Vec<MacCall>,
    fail_init: bool,
    fail_filters: bool,
    sleep_locks: i32,
}

/// Records register-level operations; `init` and filter programming can be
/// made to fail.
#[derive(Default)]
pub struct SimMac {
    state: Mutex<MacState>,
}

impl SimMac {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init(self) -> Self {
        self.lock().fail_init = true;
        self
    }

    pub fn failing_filters(self) -> Self {
        self.lock().fail_filters = true;
        self
    }

    /// Stop failing `init` from now on.
    pub fn heal(&self) {
        self.lock().fail_init = false;
    }

    pub fn calls(&self) -> Vec<MacCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&MacCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    /// Wrapper configurations passed to `init`, in order.
    pub fn inits(&self) -> Vec<WrapperConfig> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MacCall::Init(_, wrapper) => Some(*wrapper),
                _ => None,
            })
            .collect()
    }

    pub fn deep_sleep_locked(&self) -> bool {
        self.lock().sleep_locks > 0
    }

    fn lock(&self) -> MutexGuard<'_, MacState> {
        self.state.lock().expect("sim mac state poisoned")
    }

    fn record(&self, call: MacCall) -> MutexGuard<'_, MacState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

impl MacDriver for SimMac {
    fn mdio_init(&self, base: MacBase) -> MacResult<()> {
        self.record(MacCall::MdioInit(base));
        Ok(())
    }

    fn init(&self, base: MacBase, wrapper: &WrapperConfig) -> MacResult<()> {
        if self.record(MacCall::Init(base, *wrapper)).fail_init {
            return Err(MacError::new("init", "simulated failure"));
        }
        Ok(())
    }

    fn register_callbacks(&self, base: MacBase) {
        self.record(MacCall::RegisterCallbacks(base));
    }

    fn deregister_callbacks(&self, base: MacBase) {
        self.record(MacCall::DeregisterCallbacks(base));
    }

    fn set_promiscuous_mode(&self, base: MacBase, enable: bool) -> MacResult<()> {
        self.record(MacCall::Promiscuous(base, enable));
        Ok(())
    }

    fn set_no_broadcast(&self, base: MacBase, reject: bool) -> MacResult<()> {
        self.record(MacCall::NoBroadcast(base, reject));
        Ok(())
    }

    fn set_filter_address(&self, base: MacBase, slot: u8, filter: &FilterAddress) -> MacResult<()> {
        if self.record(MacCall::Filter(base, slot, *filter)).fail_filters {
            return Err(MacError::new("set_filter_address", "simulated failure"));
        }
        Ok(())
    }

    fn lock_deep_sleep(&self) {
        self.record(MacCall::LockDeepSleep).sleep_locks += 1;
    }

    fn unlock_deep_sleep(&self) {
        self.record(MacCall::UnlockDeepSleep).sleep_locks -= 1;
    }
}
