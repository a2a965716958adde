use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use ecm::phy::{PhyDriver, PhyError, PhyResult};
use ecm::{Duplex, InterfaceId, MacBase, PhySpeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyCall {
    Init(InterfaceId),
    Reset(InterfaceId),
    Discover(InterfaceId),
    Configure(InterfaceId, Duplex, PhySpeed),
    EnableExtReg(MacBase, PhySpeed),
    LinkStatus(InterfaceId),
    LinkSpeed(InterfaceId),
    AutoNegotiationStatus(InterfaceId),
    PartnerCapability(InterfaceId),
}

struct PhyState {
    link: bool,
    script: VecDeque<bool>,
    autoneg_after: usize,
    autoneg_reads: usize,
    partner: (Duplex, PhySpeed),
    operating: (Duplex, PhySpeed),
    fail_init: bool,
    calls: Vec<PhyCall>,
}

/// PHY with controllable link state.
///
/// `link_status` first drains the scripted readings; once the script is
/// empty it keeps returning the last reading.
pub struct SimPhy {
    state: Mutex<PhyState>,
}

impl Default for SimPhy {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPhy {
    /// Link up, negotiation completes immediately at 100 Mbit full duplex.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PhyState {
                link: true,
                script: VecDeque::new(),
                autoneg_after: 0,
                autoneg_reads: 0,
                partner: (Duplex::Full, PhySpeed::Mbps100),
                operating: (Duplex::Full, PhySpeed::Mbps100),
                fail_init: false,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_link(self, up: bool) -> Self {
        self.lock().link = up;
        self
    }

    /// Readings returned by successive `link_status` calls.
    pub fn with_link_script(self, readings: &[bool]) -> Self {
        self.script_link(readings);
        self
    }

    pub fn with_partner(self, duplex: Duplex, speed: PhySpeed) -> Self {
        self.lock().partner = (duplex, speed);
        self
    }

    pub fn with_operating_speed(self, duplex: Duplex, speed: PhySpeed) -> Self {
        self.lock().operating = (duplex, speed);
        self
    }

    /// Report negotiation incomplete for the first `reads` status reads.
    pub fn with_autoneg_after(self, reads: usize) -> Self {
        self.lock().autoneg_after = reads;
        self
    }

    pub fn failing_init(self) -> Self {
        self.lock().fail_init = true;
        self
    }

    pub fn set_link(&self, up: bool) {
        let mut state = self.lock();
        state.script.clear();
        state.link = up;
    }

    pub fn script_link(&self, readings: &[bool]) {
        self.lock().script.extend(readings.iter().copied());
    }

    pub fn script_remaining(&self) -> usize {
        self.lock().script.len()
    }

    pub fn calls(&self) -> Vec<PhyCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&PhyCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn link_reads(&self) -> usize {
        self.count(|call| matches!(call, PhyCall::LinkStatus(_)))
    }

    fn lock(&self) -> MutexGuard<'_, PhyState> {
        self.state.lock().expect("sim phy state poisoned")
    }

    fn record(&self, call: PhyCall) -> MutexGuard<'_, PhyState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

impl PhyDriver for SimPhy {
    fn init(&self, id: InterfaceId, _base: MacBase) -> PhyResult<()> {
        if self.record(PhyCall::Init(id)).fail_init {
            return Err(PhyError::new("simulated init failure"));
        }
        Ok(())
    }

    fn reset(&self, id: InterfaceId, _base: MacBase) -> PhyResult<()> {
        self.record(PhyCall::Reset(id));
        Ok(())
    }

    fn discover(&self, id: InterfaceId) -> PhyResult<()> {
        self.record(PhyCall::Discover(id));
        Ok(())
    }

    fn configure(&self, id: InterfaceId, duplex: Duplex, speed: PhySpeed) -> PhyResult<()> {
        self.record(PhyCall::Configure(id, duplex, speed));
        Ok(())
    }

    fn enable_ext_reg(&self, base: MacBase, speed: PhySpeed) -> PhyResult<()> {
        self.record(PhyCall::EnableExtReg(base, speed));
        Ok(())
    }

    fn link_status(&self, id: InterfaceId) -> PhyResult<bool> {
        let mut state = self.record(PhyCall::LinkStatus(id));
        if let Some(reading) = state.script.pop_front() {
            state.link = reading;
        }
        Ok(state.link)
    }

    fn link_speed(&self, id: InterfaceId) -> PhyResult<(Duplex, PhySpeed)> {
        Ok(self.record(PhyCall::LinkSpeed(id)).operating)
    }

    fn auto_negotiation_status(&self, id: InterfaceId) -> PhyResult<bool> {
        let mut state = self.record(PhyCall::AutoNegotiationStatus(id));
        state.autoneg_reads += 1;
        Ok(state.autoneg_reads > state.autoneg_after)
    }

    fn link_partner_capability(&self, id: InterfaceId) -> PhyResult<(Duplex, PhySpeed)> {
        Ok(self.record(PhyCall::PartnerCapability(id)).partner)
    }
}
