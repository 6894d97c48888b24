//! Single-flight guards. A punch for a given `(user, date)` and a sync for
//! a given operator must never run re-entrantly; a second attempt while one
//! is in flight is acknowledged and ignored, not an error. Guards release on
//! drop so a failed store call never leaves a key stuck.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;

pub static PUNCH_FLIGHTS: Lazy<FlightGuard> = Lazy::new(FlightGuard::new);
pub static SYNC_FLIGHTS: Lazy<FlightGuard> = Lazy::new(FlightGuard::new);

pub struct FlightGuard {
    inner: Mutex<HashSet<String>>,
}

impl FlightGuard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `key` for the duration of the returned permit. `None` means an
    /// identical operation is already in flight and the caller should no-op.
    pub fn try_begin(&self, key: &str) -> Option<FlightPermit<'_>> {
        let mut keys = self.inner.lock().expect("flight guard poisoned");
        if keys.insert(key.to_string()) {
            Some(FlightPermit {
                guard: self,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    fn release(&self, key: &str) {
        self.inner
            .lock()
            .expect("flight guard poisoned")
            .remove(key);
    }
}

pub struct FlightPermit<'a> {
    guard: &'a FlightGuard,
    key: String,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_while_in_flight() {
        let guard = FlightGuard::new();
        let permit = guard.try_begin("alice@x:2026-03-02");
        assert!(permit.is_some());
        assert!(guard.try_begin("alice@x:2026-03-02").is_none());
        // Unrelated keys are independent.
        assert!(guard.try_begin("bob@x:2026-03-02").is_some());
    }

    #[test]
    fn dropping_the_permit_releases_the_key() {
        let guard = FlightGuard::new();
        {
            let _permit = guard.try_begin("alice@x:2026-03-02");
        }
        assert!(guard.try_begin("alice@x:2026-03-02").is_some());
    }
}
