use std::sync::Arc;
use std::thread;
use std::time::Duration;

use panconf_core::TtlCache;

#[test]
fn concurrent_readers_see_one_writer() {
    let cache: Arc<TtlCache<String, usize>> =
        Arc::new(TtlCache::new(Duration::from_secs(60), 64).expect("cache"));
    for index in 0..32 {
        cache.set(format!("key-{index}"), index);
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                (0..32)
                    .filter(|index| cache.get(&format!("key-{index}")) == Some(*index))
                    .count()
            })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().expect("reader thread"), 32);
    }
}

#[test]
fn background_sweep_removes_expired_entries() {
    let cache: TtlCache<&str, u8> = TtlCache::new(Duration::from_millis(20), 4).expect("cache");
    cache.set("a", 1);
    cache.set("b", 2);
    assert_eq!(cache.len(), 2);

    let mut remaining = cache.len();
    for _ in 0..100 {
        thread::sleep(Duration::from_millis(10));
        remaining = cache.len();
        if remaining == 0 {
            break;
        }
    }
    assert_eq!(remaining, 0);
    assert!(cache.is_sweeping());
}

#[test]
fn capacity_is_never_exceeded() {
    let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 3).expect("cache");
    for key in 0..10 {
        cache.set(key, key * 2);
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.get(&9), Some(18));
}

#[test]
fn dropping_the_cache_stops_the_sweep() {
    let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_millis(20), 2).expect("cache");
    cache.set(1, 1);
    drop(cache);

    let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_millis(20), 2).expect("cache");
    cache.close();
    cache.close();
    assert!(!cache.is_sweeping());
    assert!(cache.is_empty());
}
