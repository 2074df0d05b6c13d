//! Timer service (spec §4.6): `setTimeout`/`setInterval` with the fallback
//! engine-thread-deadline implementation, since this stack has no bundled
//! async I/O library of its own (`boa_engine` ships no event loop).
//!
//! Grounded on `original_source/include/mystral/async/event_loop.h`'s
//! non-blocking `runOnce()` contract for the "no wait, check deadlines"
//! discipline.

use boa_engine::JsValue;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval { period_ms: u64 },
}

struct TimerEntry {
    id: u32,
    callback: JsValue,
    kind: TimerKind,
    deadline: Instant,
}

/// Monotonically increasing ids, never reused within a run (spec §3
/// invariant). A sorted-by-deadline pending list; `drain_fired` is the only
/// entry point the scheduler calls once per `poll_once` (step 7).
#[derive(Default)]
pub struct TimerService {
    next_id: u32,
    pending: Vec<TimerEntry>,
    cancelled: HashSet<u32>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn set_timeout(&mut self, callback: JsValue, delay_ms: u64) -> u32 {
        let id = self.alloc_id();
        self.pending.push(TimerEntry {
            id,
            callback,
            kind: TimerKind::Timeout,
            deadline: Instant::now() + Duration::from_millis(delay_ms),
        });
        id
    }

    pub fn set_interval(&mut self, callback: JsValue, period_ms: u64) -> u32 {
        let id = self.alloc_id();
        self.pending.push(TimerEntry {
            id,
            callback,
            kind: TimerKind::Interval { period_ms },
            deadline: Instant::now() + Duration::from_millis(period_ms),
        });
        id
    }

    /// Idempotent: cancelling an id more than once, or one that already
    /// fired, is a no-op.
    pub fn clear(&mut self, id: u32) {
        self.cancelled.insert(id);
    }

    /// Pops every timer whose deadline has passed, in deadline order,
    /// re-arming intervals for their next period. Cancelled ids are dropped
    /// without invoking their callback, and their handle is released here.
    pub fn drain_fired(&mut self) -> Vec<(u32, JsValue)> {
        let now = Instant::now();
        self.pending.sort_by_key(|t| t.deadline);

        let split_at = self.pending.partition_point(|t| t.deadline <= now);
        let due: Vec<TimerEntry> = self.pending.drain(..split_at).collect();

        let mut fired = Vec::with_capacity(due.len());
        for entry in due {
            let was_cancelled = self.cancelled.remove(&entry.id);
            if was_cancelled {
                continue;
            }

            if let TimerKind::Interval { period_ms } = entry.kind {
                self.pending.push(TimerEntry {
                    id: entry.id,
                    callback: entry.callback.clone(),
                    kind: entry.kind,
                    deadline: Instant::now() + Duration::from_millis(period_ms),
                });
            }

            fired.push((entry.id, entry.callback));
        }

        fired
    }

    /// Stops every timer and releases its callback handle, for shutdown.
    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.cancelled.clear();
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut timers = TimerService::new();
        let a = timers.set_timeout(JsValue::undefined(), 0);
        let b = timers.set_timeout(JsValue::undefined(), 0);
        assert!(b > a);
    }

    #[test]
    fn cancellation_before_drain_prevents_invocation() {
        let mut timers = TimerService::new();
        let id = timers.set_timeout(JsValue::undefined(), 0);
        timers.clear(id);
        std::thread::sleep(Duration::from_millis(2));
        let fired = timers.drain_fired();
        assert!(fired.is_empty());
    }

    #[test]
    fn interval_timers_are_rearmed_after_firing() {
        let mut timers = TimerService::new();
        timers.set_interval(JsValue::undefined(), 0);
        std::thread::sleep(Duration::from_millis(2));
        let fired = timers.drain_fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(timers.pending_count(), 1);
    }

    #[test]
    fn one_shot_timers_are_not_rearmed() {
        let mut timers = TimerService::new();
        timers.set_timeout(JsValue::undefined(), 0);
        std::thread::sleep(Duration::from_millis(2));
        let fired = timers.drain_fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(timers.pending_count(), 0);
    }
}
