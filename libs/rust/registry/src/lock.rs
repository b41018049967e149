//! Per-model-name mutual exclusion.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One mutex per model name, created on first use and dropped again once no
/// caller holds or waits on it, so the table only tracks names in flight.
///
/// The table lock is only held long enough to fetch or release the name's
/// mutex, so callers working on different names never wait on each other.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `name`.
    pub fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        let out = {
            let _guard = slot.lock();
            f()
        };
        let mut locks = self.locks.lock();
        // only the table and this caller still reference the slot
        if Arc::strong_count(&slot) == 2 {
            locks.remove(name);
        }
        out
    }

    /// Names with a caller currently holding or waiting on their lock.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn same_name_is_serialized() {
        let locks = NameLocks::new();
        let inside = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    locks.with_lock("noshow", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_names_run_in_parallel() {
        let locks = NameLocks::new();
        // Both closures must be inside their critical sections at the same
        // time for the barrier to release; a shared lock would deadlock here.
        let barrier = Barrier::new(2);
        std::thread::scope(|s| {
            s.spawn(|| locks.with_lock("a", || { barrier.wait(); }));
            s.spawn(|| locks.with_lock("b", || { barrier.wait(); }));
        });
        assert!(locks.is_empty());
    }

    #[test]
    fn idle_slots_are_released() {
        let locks = NameLocks::new();
        for i in 0..100 {
            let name = format!("model-{i}");
            locks.with_lock(&name, || assert_eq!(locks.len(), 1));
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn waiter_keeps_slot_alive() {
        let locks = NameLocks::new();
        let holding = Barrier::new(2);
        let order = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            s.spawn(|| {
                locks.with_lock("noshow", || {
                    holding.wait();
                    // give the second caller time to queue on this slot
                    std::thread::sleep(Duration::from_millis(50));
                    order.lock().push("first");
                })
            });
            s.spawn(|| {
                holding.wait();
                locks.with_lock("noshow", || order.lock().push("second"));
            });
        });
        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert!(locks.is_empty());
    }
}
