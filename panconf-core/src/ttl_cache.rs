//! Bounded cache with per-entry expiry and a stoppable background sweep.
//!
//! ## Eviction
//!
//! Entries expire `ttl` after their last `set`. When an insert would exceed
//! `capacity`, expired entries are purged first and, if the cache is still
//! full, the entry nearest to expiry is evicted.
//!
//! ## Sweeping
//!
//! A named thread purges expired entries every `ttl / 2`. It is owned by a
//! [`SweepHandle`]; [`TtlCache::close`] (or dropping the cache) signals it and
//! waits for it to finish.

use std::collections::HashMap;
use std::hash::Hash;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Shelf<K, V> {
    slots: RwLock<HashMap<K, Slot<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash, V> Shelf<K, V> {
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now));
        before - slots.len()
    }
}

/// Bounded TTL cache safe to share between threads.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    shelf: Arc<Shelf<K, V>>,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache and start its sweep thread.
    ///
    /// A zero `capacity` is treated as one.
    pub fn new(ttl: Duration, capacity: usize) -> io::Result<Self> {
        let shelf = Arc::new(Shelf {
            slots: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        });
        let interval = (ttl / 2).max(MIN_SWEEP_INTERVAL);
        let swept = Arc::clone(&shelf);
        let sweeper = SweepHandle::spawn("ttl-cache-sweep", interval, move || {
            swept.purge_expired();
        })?;
        Ok(Self {
            shelf,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Insert or refresh `key`, evicting as needed to stay within capacity.
    pub fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let mut slots = self.shelf.slots.write();
        if !slots.contains_key(&key) && slots.len() >= self.shelf.capacity {
            slots.retain(|_, slot| !slot.is_expired(now));
            if slots.len() >= self.shelf.capacity {
                let nearest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.expires_at)
                    .map(|(key, _)| key.clone());
                if let Some(nearest) = nearest {
                    slots.remove(&nearest);
                }
            }
        }
        slots.insert(
            key,
            Slot {
                value,
                expires_at: now + self.shelf.ttl,
            },
        );
    }

    /// Return a clone of the live value for `key`.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let slots = self.shelf.slots.read();
            match slots.get(key) {
                None => return None,
                Some(slot) if !slot.is_expired(now) => return Some(slot.value.clone()),
                Some(_) => {}
            }
        }
        let mut slots = self.shelf.slots.write();
        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
        }
        None
    }

    /// Remove `key`, returning its value when it was still live.
    pub fn delete(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.shelf
            .slots
            .write()
            .remove(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.value)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shelf.slots.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.shelf.purge_expired()
    }

    /// Whether the background sweep is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(SweepHandle::is_running)
    }

    /// Stop the sweep, wait for it, and clear all entries. Idempotent.
    pub fn close(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.shelf.slots.write().clear();
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.stop();
        }
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Owner of a periodic background task.
///
/// [`SweepHandle::stop`] is the cancellation handle; it returns once the task
/// thread has exited, which is the completion signal.
#[derive(Debug)]
pub struct SweepHandle {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Run `task` every `interval` on a thread called `name` until stopped.
    pub fn spawn<F>(name: &str, interval: Duration, mut task: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let shared = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut stopped = shared.stopped.lock();
                while !*stopped {
                    let waited = shared.wake.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    if waited.timed_out() {
                        parking_lot::MutexGuard::unlocked(&mut stopped, &mut task);
                    }
                }
            })?;
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Whether the task thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Signal the task to stop and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{SweepHandle, TtlCache};

    #[test]
    fn get_returns_live_values_and_hides_expired_ones() {
        let cache = TtlCache::new(Duration::from_millis(40), 4).expect("cache");
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"a"), None);
        cache.close();
    }

    #[test]
    fn overflow_evicts_entry_nearest_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60), 2).expect("cache");
        cache.set("oldest", 1);
        thread::sleep(Duration::from_millis(5));
        cache.set("newer", 2);
        thread::sleep(Duration::from_millis(5));
        cache.set("newest", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"oldest"), None);
        assert_eq!(cache.get(&"newer"), Some(2));
        assert_eq!(cache.get(&"newest"), Some(3));
    }

    #[test]
    fn refreshing_existing_key_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2).expect("cache");
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.delete(&"b"), Some(2));
        assert!(cache.get(&"b").is_none());
    }

    #[test]
    fn close_stops_sweep_and_clears() {
        let cache = TtlCache::new(Duration::from_secs(60), 2).expect("cache");
        cache.set("a", 1);
        assert!(cache.is_sweeping());
        cache.close();
        assert!(!cache.is_sweeping());
        assert!(cache.is_empty());
        cache.close();
    }

    #[test]
    fn sweep_handle_runs_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ticks);
        let handle = SweepHandle::spawn("test-sweep", Duration::from_millis(5), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn");
        thread::sleep(Duration::from_millis(60));
        handle.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }
}
