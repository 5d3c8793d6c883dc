//! Non-reentrant guard for the background full sync.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
}

/// Two-state machine {Idle, Running}. Entering is a single compare-exchange,
/// so exactly one caller wins when several race.
#[derive(Debug, Default)]
pub struct SyncGuard {
    state: AtomicU8,
}

/// Held while a sync runs; dropping it returns the guard to Idle.
#[derive(Debug)]
pub struct SyncPermit<'a> {
    guard: &'a SyncGuard,
}

impl SyncGuard {
    pub fn new() -> Self {
        SyncGuard {
            state: AtomicU8::new(IDLE),
        }
    }

    pub fn state(&self) -> SyncState {
        match self.state.load(Ordering::Acquire) {
            IDLE => SyncState::Idle,
            _ => SyncState::Running,
        }
    }

    /// Idle → Running. `None` if a sync is already running.
    pub fn try_begin(&self) -> Option<SyncPermit<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncPermit { guard: self })
    }
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.guard.state.store(IDLE, Ordering::Release);
    }
}
