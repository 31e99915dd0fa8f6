use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use dor_types::Pid;

use crate::clock::{Clock, SystemClock};

/// Capacity and age limits of a [`ReaderCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    /// Entries kept before the oldest is evicted.
    pub capacity: usize,
    /// Entries at least this old are dropped by [`ReaderCache::sweep`].
    pub max_age: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_age: Duration::from_secs(5),
        }
    }
}

struct Inner<V> {
    entries: HashMap<Pid, (V, Instant)>,
    /// Pids in insertion order, oldest first.
    order: VecDeque<Pid>,
}

/// A bounded pid-to-reader map whose entries expire.
///
/// Structural mutation (insert, evict, sweep) happens under a single lock,
/// so the map and the insertion order never disagree.
pub struct ReaderCache<V> {
    inner: Mutex<Inner<V>>,
    limits: CacheLimits,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ReaderCache<V> {
    pub fn new(limits: CacheLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: CacheLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, pid: &Pid) -> Option<V> {
        self.lock().entries.get(pid).map(|(v, _)| v.clone())
    }

    /// Insert or refresh `pid`, then evict from the front while over
    /// capacity.
    pub fn put(&self, pid: Pid, value: V) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.entries.insert(pid.clone(), (value, now)).is_some() {
            inner.order.retain(|p| p != &pid);
        }
        inner.order.push_back(pid);

        while inner.order.len() > self.limits.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    debug!(pid = %oldest, "evicted reader from cache");
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, pid: &Pid) -> Option<V> {
        let mut inner = self.lock();
        let (value, _) = inner.entries.remove(pid)?;
        inner.order.retain(|p| p != pid);
        Some(value)
    }

    /// Drop expired entries, walking from the oldest and stopping at the
    /// first one still young enough. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let mut dropped = 0;
        while let Some(front) = inner.order.front() {
            let expired = inner
                .entries
                .get(front)
                .map(|(_, at)| now.saturating_duration_since(*at) >= self.limits.max_age)
                .unwrap_or(true);
            if !expired {
                break;
            }
            if let Some(pid) = inner.order.pop_front() {
                inner.entries.remove(&pid);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, remaining = inner.order.len(), "swept reader cache");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Cached pids, oldest first.
    pub fn pids(&self) -> Vec<Pid> {
        self.lock().order.iter().cloned().collect()
    }
}

impl<V> std::fmt::Debug for ReaderCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderCache")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn pid(n: usize) -> Pid {
        Pid::parse(&format!("test:{n}")).unwrap()
    }

    fn cache(capacity: usize, max_age_secs: u64) -> (ReaderCache<usize>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limits = CacheLimits {
            capacity,
            max_age: Duration::from_secs(max_age_secs),
        };
        (ReaderCache::with_clock(limits, clock.clone()), clock)
    }

    #[test]
    fn oldest_is_evicted_over_capacity() {
        let (cache, _) = cache(2, 60);
        cache.put(pid(1), 1);
        cache.put(pid(2), 2);
        cache.put(pid(3), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&pid(1)).is_none());
        assert_eq!(cache.get(&pid(3)), Some(3));
        assert_eq!(cache.pids(), vec![pid(2), pid(3)]);
    }

    #[test]
    fn refreshing_moves_entry_to_back() {
        let (cache, _) = cache(2, 60);
        cache.put(pid(1), 1);
        cache.put(pid(2), 2);
        cache.put(pid(1), 10);
        cache.put(pid(3), 3);
        assert_eq!(cache.get(&pid(1)), Some(10));
        assert!(cache.get(&pid(2)).is_none());
    }

    #[test]
    fn sweep_drops_only_expired_prefix() {
        let (cache, clock) = cache(10, 5);
        cache.put(pid(1), 1);
        clock.advance(Duration::from_secs(3));
        cache.put(pid(2), 2);
        clock.advance(Duration::from_secs(3));

        assert_eq!(cache.sweep(), 1);
        assert!(cache.get(&pid(1)).is_none());
        assert_eq!(cache.get(&pid(2)), Some(2));

        clock.advance(Duration::from_secs(3));
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_of_young_cache_is_noop() {
        let (cache, _) = cache(10, 5);
        cache.put(pid(1), 1);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_keeps_order_consistent() {
        let (cache, _) = cache(3, 60);
        cache.put(pid(1), 1);
        cache.put(pid(2), 2);
        assert_eq!(cache.remove(&pid(1)), Some(1));
        assert_eq!(cache.remove(&pid(1)), None);
        assert_eq!(cache.pids(), vec![pid(2)]);
        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..8, keys in prop::collection::vec(0usize..20, 0..60)) {
            let (cache, _) = cache(capacity, 60);
            for k in &keys {
                cache.put(pid(*k), *k);
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.pids().len(), cache.len());
                prop_assert_eq!(cache.get(&pid(*k)), Some(*k));
            }
        }
    }
}
