//! kvwindow Integration Tests
//!
//! Exercises the public handle end to end over the in-memory store with a
//! manual clock:
//! - Scenario 1: visibility within the window, isolation between owners
//! - Scenario 2: zero TTL means immediately expired
//! - Scenario 3: limit returns the newest values in order
//! - Sequencing under concurrent submission
//! - Window expiry and index pruning
//!
//! A live-Redis test at the bottom is ignored unless `KVWINDOW_TEST_REDIS`
//! points at a server.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use kvwindow::{
    InMemoryTimeWindowStore, ManualClock, OwnerId, SequenceKey, ValueKeyLayout, WindowCache,
    WindowCacheConfig,
};

struct TestCache {
    cache: WindowCache,
    store: Arc<InMemoryTimeWindowStore>,
    clock: Arc<ManualClock>,
}

fn open(namespace: &str, ttl_secs: u64) -> TestCache {
    open_with(WindowCacheConfig::new(namespace, Duration::from_secs(ttl_secs)))
}

fn open_with(config: WindowCacheConfig) -> TestCache {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemoryTimeWindowStore::with_clock(clock.clone()));
    let cache = WindowCache::with_store_and_clock(config, store.clone(), clock.clone()).unwrap();
    TestCache {
        cache,
        store,
        clock,
    }
}

fn json_value(foo: &str) -> Bytes {
    Bytes::from(serde_json::to_vec(&serde_json::json!({ "Foo": foo })).unwrap())
}

// =============================================================================
// Scenarios
// =============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_visible_to_owner_only() {
        let t = open("TestAdd", 10);
        let owner1 = OwnerId(0x1001);
        let owner2 = OwnerId(0x1002);

        let (tx, mut rx) = mpsc::channel(1);
        t.cache
            .store_value(owner1, json_value("bar"), move |result| {
                tx.try_send(result.is_ok()).unwrap();
            })
            .await
            .unwrap();
        assert!(rx.recv().await.unwrap(), "never saved anything");

        let (_, found) = t.cache.load_values(owner1, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], json_value("bar"));

        let (last_key, found) = t.cache.load_values(owner2, 100).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(last_key, SequenceKey::MAX);

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let t = open("TestExpire", 0);
        let owner = OwnerId(0x2001);

        let key = t
            .cache
            .store_value_and_wait(owner, json_value("bar"))
            .await
            .unwrap();
        assert_eq!(key, SequenceKey(1));

        let (_, found) = t.cache.load_values(owner, 100).await.unwrap();
        assert!(found.is_empty());

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_limit_returns_newest_in_order() {
        let t = open("TestLimit", 60);
        let owner = OwnerId(0x3001);

        for value in ["first", "second", "third"] {
            t.cache
                .store_value_and_wait(owner, Bytes::from(value))
                .await
                .unwrap();
        }

        let (last_key, found) = t.cache.load_values(owner, 2).await.unwrap();
        assert_eq!(found, vec![Bytes::from("third"), Bytes::from("second")]);
        assert_eq!(last_key, SequenceKey(2));

        t.cache.shutdown().await.unwrap();
    }
}

// =============================================================================
// Window Semantics
// =============================================================================

mod window_tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_all_within_window_newest_first() {
        let t = open("Window", 30);
        let owner = OwnerId(7);

        for i in 0..12u32 {
            t.cache
                .store_value_and_wait(owner, Bytes::from(i.to_string()))
                .await
                .unwrap();
            t.clock.advance(Duration::from_secs(1));
        }

        let (last_key, found) = t.cache.load_values(owner, 100).await.unwrap();
        let expected: Vec<Bytes> = (0..12u32).rev().map(|i| Bytes::from(i.to_string())).collect();
        assert_eq!(found, expected);
        assert_eq!(last_key, SequenceKey(1));

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_same_second_limit_returns_newest() {
        let t = open("Burst", 60);
        let owner = OwnerId(1);

        for i in 1..=11u32 {
            t.cache
                .store_value_and_wait(owner, Bytes::from(format!("v{}", i)))
                .await
                .unwrap();
        }

        let (last_key, found) = t.cache.load_values(owner, 3).await.unwrap();
        assert_eq!(
            found,
            vec![Bytes::from("v11"), Bytes::from("v10"), Bytes::from("v9")]
        );
        assert_eq!(last_key, SequenceKey(9));

        let (last_key, found) = t.cache.load_values(owner, 100).await.unwrap();
        let expected: Vec<Bytes> = (1..=11u32).rev().map(|i| Bytes::from(format!("v{}", i))).collect();
        assert_eq!(found, expected);
        assert_eq!(last_key, SequenceKey(1));

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_eviction_after_ttl() {
        let t = open("Evict", 10);
        let owner = OwnerId(8);

        t.cache
            .store_value_and_wait(owner, Bytes::from_static(b"a"))
            .await
            .unwrap();
        t.cache
            .store_value_and_wait(owner, Bytes::from_static(b"b"))
            .await
            .unwrap();

        t.clock.advance(Duration::from_secs(5));
        let (_, found) = t.cache.load_values(owner, 100).await.unwrap();
        assert_eq!(found.len(), 2);

        t.clock.advance(Duration::from_secs(6));
        let (last_key, found) = t.cache.load_values(owner, 100).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(last_key, SequenceKey::MAX);
        assert_eq!(t.cache.stats().index_pruned, 2);

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sliding_window_keeps_recent_items() {
        let t = open("Slide", 10);
        let owner = OwnerId(9);

        t.cache
            .store_value_and_wait(owner, Bytes::from_static(b"old"))
            .await
            .unwrap();
        t.clock.advance(Duration::from_secs(6));
        t.cache
            .store_value_and_wait(owner, Bytes::from_static(b"new"))
            .await
            .unwrap();
        t.clock.advance(Duration::from_secs(6));

        let (last_key, found) = t.cache.load_values(owner, 100).await.unwrap();
        assert_eq!(found, vec![Bytes::from_static(b"new")]);
        assert_eq!(last_key, SequenceKey(2));

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_index_outlives_values_by_grace() {
        let t = open("Grace", 10);
        let owner = OwnerId(0xa);

        t.cache
            .store_value_and_wait(owner, Bytes::from_static(b"v"))
            .await
            .unwrap();

        assert_eq!(t.store.ttl_seconds("Grace_1"), Some(10));
        assert_eq!(t.store.ttl_seconds("Grace_a_set"), Some(15));

        t.clock.advance(Duration::from_secs(12));
        assert!(!t.store.contains_key("Grace_1"));
        assert!(t.store.contains_key("Grace_a_set"));

        t.clock.advance(Duration::from_secs(3));
        assert!(!t.store.contains_key("Grace_a_set"));

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_owner_scoped_layout_keeps_owners_apart() {
        let config = WindowCacheConfig {
            value_key_layout: ValueKeyLayout::OwnerScoped,
            ..WindowCacheConfig::new("Scoped", Duration::from_secs(60))
        };
        let t = open_with(config);

        let a = t
            .cache
            .store_value_and_wait(OwnerId(1), Bytes::from_static(b"from-a"))
            .await
            .unwrap();
        let b = t
            .cache
            .store_value_and_wait(OwnerId(2), Bytes::from_static(b"from-b"))
            .await
            .unwrap();
        assert_eq!(a, b);

        let (_, found_a) = t.cache.load_values(OwnerId(1), 10).await.unwrap();
        let (_, found_b) = t.cache.load_values(OwnerId(2), 10).await.unwrap();
        assert_eq!(found_a, vec![Bytes::from_static(b"from-a")]);
        assert_eq!(found_b, vec![Bytes::from_static(b"from-b")]);
        assert!(t.store.contains_key("Scoped_1_1"));
        assert!(t.store.contains_key("Scoped_2_1"));

        t.cache.shutdown().await.unwrap();
    }
}

// =============================================================================
// Sequencing
// =============================================================================

mod sequencing_tests {
    use super::*;

    type Seen = Arc<Mutex<Vec<u64>>>;

    fn record_into(seen: &Seen) -> impl FnOnce(kvwindow::Result<SequenceKey>) + Send + 'static {
        let seen = seen.clone();
        move |result| seen.lock().push(result.unwrap().as_u64())
    }

    fn spawn_submitters(
        cache: &Arc<WindowCache>,
        seen: &Seen,
        owner: OwnerId,
        tasks: usize,
        per_task: usize,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..tasks)
            .map(|task| {
                let cache = cache.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    for i in 0..per_task {
                        cache
                            .store_value(
                                owner,
                                Bytes::from(format!("{}-{}", task, i)),
                                record_into(&seen),
                            )
                            .await
                            .unwrap();
                    }
                })
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_spawned_submitters_get_unique_increasing_keys() {
        let t = open("Concurrent", 60);
        let cache = Arc::new(t.cache);
        let seen = Seen::default();

        for task in spawn_submitters(&cache, &seen, OwnerId(0xc0ffee), 8, 25) {
            task.await.unwrap();
        }
        Arc::try_unwrap(cache).unwrap().shutdown().await.unwrap();

        // Callbacks fire in sequencer order, so one handle sees keys strictly increasing.
        let seen = seen.lock().clone();
        assert_eq!(seen, (1..=200).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handles_sharing_a_store_never_reuse_keys() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryTimeWindowStore::with_clock(clock.clone()));
        let config = WindowCacheConfig::new("Shared", Duration::from_secs(60));
        let first = Arc::new(
            WindowCache::with_store_and_clock(config.clone(), store.clone(), clock.clone())
                .unwrap(),
        );
        let second = Arc::new(WindowCache::with_store_and_clock(config, store, clock).unwrap());
        let owner = OwnerId(0xbeef);
        let seen_first = Seen::default();
        let seen_second = Seen::default();

        let mut tasks = spawn_submitters(&first, &seen_first, owner, 4, 30);
        tasks.extend(spawn_submitters(&second, &seen_second, owner, 4, 30));
        for task in tasks {
            task.await.unwrap();
        }
        Arc::try_unwrap(first).unwrap().shutdown().await.unwrap();
        Arc::try_unwrap(second).unwrap().shutdown().await.unwrap();

        let seen_first = seen_first.lock().clone();
        let seen_second = seen_second.lock().clone();
        assert_eq!(seen_first.len(), 120);
        assert_eq!(seen_second.len(), 120);
        assert!(seen_first.windows(2).all(|w| w[0] < w[1]));
        assert!(seen_second.windows(2).all(|w| w[0] < w[1]));

        let union: HashSet<u64> = seen_first.iter().chain(&seen_second).copied().collect();
        assert_eq!(union, (1..=240).collect::<HashSet<u64>>());
    }

    #[tokio::test]
    async fn test_keys_are_per_owner() {
        let t = open("PerOwner", 60);

        let a1 = t
            .cache
            .store_value_and_wait(OwnerId(1), Bytes::from_static(b"x"))
            .await
            .unwrap();
        let b1 = t
            .cache
            .store_value_and_wait(OwnerId(2), Bytes::from_static(b"y"))
            .await
            .unwrap();
        let a2 = t
            .cache
            .store_value_and_wait(OwnerId(1), Bytes::from_static(b"z"))
            .await
            .unwrap();

        assert_eq!(a1, SequenceKey(1));
        assert_eq!(b1, SequenceKey(1));
        assert_eq!(a2, SequenceKey(2));

        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_backpressure_with_tiny_queues() {
        let config = WindowCacheConfig {
            ingest_capacity: 1,
            completion_capacity: 1,
            ..WindowCacheConfig::new("Tiny", Duration::from_secs(60))
        };
        let t = open_with(config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..50u32 {
            let tx = tx.clone();
            t.cache
                .store_value(OwnerId(5), Bytes::from(i.to_string()), move |result| {
                    tx.send(result.unwrap()).unwrap();
                })
                .await
                .unwrap();
        }
        drop(tx);
        t.cache.shutdown().await.unwrap();

        let mut count = 0u64;
        while let Some(key) = rx.recv().await {
            count += 1;
            assert_eq!(key, SequenceKey(count));
        }
        assert_eq!(count, 50);
    }
}

// =============================================================================
// Failure Handling
// =============================================================================

mod failure_tests {
    use super::*;
    use assert_matches::assert_matches;
    use kvwindow::Error;

    #[tokio::test]
    async fn test_backend_failure_reaches_callback_and_poisons() {
        let t = open("Fail", 60);
        t.store.inject_failure("ZADD");

        let (tx, mut rx) = mpsc::channel(1);
        t.cache
            .store_value(OwnerId(1), Bytes::from_static(b"v"), move |result| {
                tx.try_send(result).unwrap();
            })
            .await
            .unwrap();

        let result = rx.recv().await.unwrap();
        assert_matches!(result, Err(Error::Backend { command: "ZADD", .. }));
        assert!(t.cache.is_poisoned());

        let rejected = t
            .cache
            .store_value_and_wait(OwnerId(1), Bytes::from_static(b"w"))
            .await;
        assert_matches!(rejected, Err(Error::Poisoned));

        assert_eq!(t.cache.stats().failed, 1);
        t.cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_error_is_not_partial() {
        let t = open("LoadFail", 60);
        t.cache
            .store_value_and_wait(OwnerId(1), Bytes::from_static(b"v"))
            .await
            .unwrap();

        t.store.inject_failure("ZREVRANGEBYSCORE");
        let result = t.cache.load_values(OwnerId(1), 10).await;
        assert_matches!(
            result,
            Err(Error::Backend {
                command: "ZREVRANGEBYSCORE",
                ..
            })
        );

        // Reads never poison the write path.
        assert!(!t.cache.is_poisoned());
        t.store.clear_failure();
        let (_, found) = t.cache.load_values(OwnerId(1), 10).await.unwrap();
        assert_eq!(found.len(), 1);

        t.cache.shutdown().await.unwrap();
    }
}

// =============================================================================
// Live Redis
// =============================================================================

mod redis_tests {
    use super::*;
    use kvwindow::Transport;

    fn redis_address() -> Option<String> {
        std::env::var("KVWINDOW_TEST_REDIS").ok()
    }

    #[tokio::test]
    #[ignore = "requires a Redis server at $KVWINDOW_TEST_REDIS"]
    async fn test_live_redis_roundtrip() {
        let Some(address) = redis_address() else {
            return;
        };
        let namespace = format!("kvwindow_it_{}", std::process::id());
        let cache = WindowCache::open(namespace, Transport::Tcp, address, Duration::from_secs(10))
            .await
            .unwrap();

        let owner = OwnerId(chrono::Utc::now().timestamp() as u64);
        for value in ["a", "b", "c"] {
            cache
                .store_value_and_wait(owner, Bytes::from(value))
                .await
                .unwrap();
        }

        let (_, found) = cache.load_values(owner, 2).await.unwrap();
        assert_eq!(found, vec![Bytes::from("c"), Bytes::from("b")]);

        let (_, other) = cache.load_values(OwnerId(owner.as_u64() + 1), 100).await.unwrap();
        assert!(other.is_empty());

        cache.shutdown().await.unwrap();
    }
}
