//! In-process mutual exclusion for sync attempts.

use std::sync::atomic::{AtomicBool, Ordering};

/// Compare-and-set flag guarding one in-flight sync per process.
///
/// A losing caller is rejected immediately — never queued or blocked — so a
/// manual trigger and the periodic loop can race freely. Convergence across
/// devices never relies on this lock, only on merge semantics.
#[derive(Debug, Default)]
pub struct SyncGuard {
    in_flight: AtomicBool,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim the guard. Returns `None` when a sync is already
    /// running; the permit releases the guard on drop.
    pub fn try_acquire(&self) -> Option<SyncPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// RAII permit proving the holder owns the current sync attempt.
#[derive(Debug)]
pub struct SyncPermit<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let guard = SyncGuard::new();
        let permit = guard.try_acquire().expect("first acquire");
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }
}
