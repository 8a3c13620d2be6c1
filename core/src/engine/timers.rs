//! Execution-synced timer registry
//!
//! Timers never fire on their own. An entry is only resolved when someone asks
//! for it (the owning thread, during a scheduler tick), so delayed resumption
//! is observed on the scheduler's cadence rather than the host's.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::warn;

use super::clock::Clock;

/// Zero-argument callback run once when a timer resolves
pub type TimerCallback = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Opaque timer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

struct TimerEntry {
    due: Duration,
    callback: TimerCallback,
}

/// Pending (callback, due-time) entries keyed by handle
pub struct TimerRegistry {
    clock: Box<dyn Clock>,
    entries: HashMap<TimerHandle, TimerEntry>,
    next_id: u64,
}

impl TimerRegistry {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            entries: HashMap::new(),
            next_id: 0,
        }
    }

    /// Current time according to the registry's clock
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Record `callback` to run once `delay` has elapsed
    pub fn schedule(&mut self, callback: TimerCallback, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let due = self.clock.now().saturating_add(delay);
        self.entries.insert(handle, TimerEntry { due, callback });
        handle
    }

    /// Attempt to resolve a timer
    ///
    /// Returns true only if the entry existed and was due; the callback then
    /// runs exactly once and the entry is dropped. A callback error is logged
    /// and the timer still counts as resolved.
    pub fn resolve(&mut self, handle: TimerHandle) -> bool {
        match self.entries.get(&handle) {
            Some(entry) if entry.due <= self.clock.now() => {}
            _ => return false,
        }

        let Some(entry) = self.entries.remove(&handle) else {
            return false;
        };
        if let Err(e) = (entry.callback)() {
            warn!(%handle, error = %e, "timer callback failed");
        }
        true
    }

    /// Drop a timer without running its callback
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn due_time(&self, handle: TimerHandle) -> Option<Duration> {
        self.entries.get(&handle).map(|e| e.due)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("pending", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
