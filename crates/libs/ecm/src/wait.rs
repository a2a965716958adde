//! Fixed-interval polling with an optional stop signal.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// One-shot stop flag that wakes sleepers immediately.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until stopped. Returns `true` if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut stopped = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal").field("stopped", &self.is_stopped()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// Budget exhausted; carries the accumulated wait.
    TimedOut(Duration),
    Stopped,
}

/// Shortest sleep between probes; a zero interval would never use up a budget.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Probe every `interval` until it yields a value.
///
/// Elapsed time is counted in whole intervals, so the number of probes for
/// a given budget does not depend on how long each probe takes. `budget ==
/// None` polls forever unless `stop` fires.
pub fn poll_until<T>(
    interval: Duration,
    budget: Option<Duration>,
    stop: Option<&StopSignal>,
    mut probe: impl FnMut() -> Option<T>,
) -> PollOutcome<T> {
    let interval = interval.max(MIN_INTERVAL);
    let mut elapsed = Duration::ZERO;
    loop {
        if let Some(value) = probe() {
            return PollOutcome::Ready(value);
        }
        if budget.is_some_and(|budget| elapsed >= budget) {
            return PollOutcome::TimedOut(elapsed);
        }
        match stop {
            Some(signal) => {
                if signal.wait_timeout(interval) {
                    return PollOutcome::Stopped;
                }
            }
            None => thread::sleep(interval),
        }
        elapsed += interval;
    }
}
