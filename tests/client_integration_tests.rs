//! Integration Tests for the Cache Client
//!
//! Runs full client operations against an in-memory store wrapped by a
//! recorder that captures every write and TTL refresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use typed_cache::codec::{COMPRESSED, SLIDING, TYPE_MASK};
use typed_cache::store::{SetCondition, StoreResult};
use typed_cache::{
    CacheClient, CacheError, CacheObject, CacheValue, Connect, Expiration, KeyValueStore,
    MemoryStore, Object, TypeRegistry, ValueCodec,
};

// == Recording Store ==

#[derive(Debug, Clone, PartialEq)]
struct SetCall {
    key: String,
    bytes: Vec<u8>,
    ttl: Option<Duration>,
    condition: SetCondition,
}

#[derive(Debug, Default)]
struct Recorder {
    sets: Mutex<Vec<SetCall>>,
    expires: Mutex<Vec<(String, Duration)>>,
    connects: AtomicUsize,
}

/// MemoryStore that records writes and refreshes.
#[derive(Debug, Clone, Default)]
struct RecordingStore {
    inner: MemoryStore,
    recorder: Arc<Recorder>,
}

impl RecordingStore {
    fn sets(&self) -> Vec<SetCall> {
        self.recorder.sets.lock().clone()
    }

    fn expires(&self) -> Vec<(String, Duration)> {
        self.recorder.expires.lock().clone()
    }

    fn connects(&self) -> usize {
        self.recorder.connects.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.recorder.sets.lock().clear();
        self.recorder.expires.lock().clear();
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        self.inner.exists(keys).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.inner.get_many(keys).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: SetCondition,
    ) -> StoreResult<bool> {
        self.recorder.sets.lock().push(SetCall {
            key: key.to_string(),
            bytes: value.clone(),
            ttl,
            condition,
        });
        self.inner.set(key, value, ttl, condition).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.inner.delete(keys).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.recorder.expires.lock().push((key.to_string(), ttl));
        self.inner.expire(key, ttl).await
    }
}

#[async_trait]
impl Connect for RecordingStore {
    async fn connect(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(Arc::new(self.clone()))
    }
}

// == Object Fixtures ==

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

impl CacheObject for Profile {
    const TYPE_NAME: &'static str = "Accounts.Profile, Accounts, Version=2.1.0.0, Culture=neutral, PublicKeyToken=null";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
enum Event {
    Login { user: String },
    Purchase { user: String, cents: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Journal {
    events: Vec<Event>,
}

impl CacheObject for Journal {
    const TYPE_NAME: &'static str = "Audit.Journal";
}

// == Helper Functions ==

fn create_test_client(threshold: usize) -> (CacheClient, RecordingStore) {
    let store = RecordingStore::default();
    let client = CacheClient::new(Arc::new(store.clone()), ValueCodec::new(threshold));
    (client, store)
}

// == Sliding Expiration ==

#[tokio::test]
async fn test_compressed_sliding_string_scenario() {
    let (client, store) = create_test_client(100);
    let text = "s".repeat(300);

    client
        .set("greeting", text.clone(), Expiration::sliding_millis(5000))
        .await
        .unwrap();
    client.flush().await;

    let sets = store.sets();
    assert_eq!(sets.len(), 1);
    let written = &sets[0];
    assert_eq!(written.ttl, Some(Duration::from_millis(5000)));
    assert_eq!(written.condition, SetCondition::Always);
    assert_ne!(written.bytes[0] & COMPRESSED, 0);
    assert_ne!(written.bytes[0] & SLIDING, 0);
    assert_eq!(written.bytes[0] & TYPE_MASK, 18);
    // 9-byte prefix plus 300 payload bytes before compression
    let original_len = u32::from_le_bytes(written.bytes[1..5].try_into().unwrap());
    assert_eq!(original_len, 309);

    let value = client.get("greeting").await.unwrap();
    client.flush().await;

    assert_eq!(value, Some(CacheValue::String(text)));
    assert_eq!(
        store.expires(),
        vec![("greeting".to_string(), Duration::from_millis(5000))]
    );
    assert_eq!(client.stats().sliding_refreshes, 1);
    assert_eq!(client.stats().compressed_writes, 1);
}

#[tokio::test]
async fn test_non_sliding_get_does_not_refresh() {
    let (client, store) = create_test_client(1024);

    client.set("plain", 5u64, Expiration::None).await.unwrap();
    client.flush().await;
    client.get("plain").await.unwrap();
    client.flush().await;

    assert!(store.expires().is_empty());
    assert_eq!(store.sets()[0].ttl, None);
}

#[tokio::test]
async fn test_sliding_range_checked_before_write() {
    let (client, store) = create_test_client(1024);

    let too_short = client.set("k", 1i32, Expiration::sliding_millis(9)).await;
    let too_long = client
        .add("k", 1i32, Expiration::sliding_millis(u64::from(u32::MAX) + 1))
        .await;
    assert!(matches!(too_short, Err(CacheError::SlidingOutOfRange { .. })));
    assert!(matches!(too_long, Err(CacheError::SlidingOutOfRange { .. })));

    assert!(client.add("k", 1i32, Expiration::sliding_millis(10)).await.unwrap());
    client.flush().await;
    assert_eq!(store.sets().len(), 1);
}

// == Absolute Expiration ==

#[tokio::test]
async fn test_absolute_expiration_becomes_ttl() {
    let (client, store) = create_test_client(1024);
    let deadline = Utc::now() + TimeDelta::seconds(10);

    client.set("k", true, Expiration::Absolute(deadline)).await.unwrap();
    client.flush().await;

    let ttl = store.sets()[0].ttl.unwrap();
    assert!(ttl <= Duration::from_secs(10));
    assert!(ttl > Duration::from_secs(8));
    // absolute entries carry no sliding header
    assert_eq!(store.sets()[0].bytes[0] & SLIDING, 0);
}

#[tokio::test]
async fn test_absolute_expiration_in_past_rejected() {
    let (client, store) = create_test_client(1024);
    let deadline = Utc::now() - TimeDelta::seconds(1);

    let result = client.set("k", true, Expiration::Absolute(deadline)).await;
    client.flush().await;

    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    assert!(store.sets().is_empty());
}

// == Add / Set ==

#[tokio::test]
async fn test_add_on_existing_key_returns_false() {
    let (client, store) = create_test_client(1024);

    assert!(client.add("k", 1i32, Expiration::None).await.unwrap());
    assert!(!client.add("k", 2i32, Expiration::None).await.unwrap());

    assert_eq!(client.get_as::<i32>("k").await.unwrap(), Some(1));
    assert!(store
        .sets()
        .iter()
        .all(|call| call.condition == SetCondition::IfNotExists));
}

#[tokio::test]
async fn test_set_overwrites() {
    let (client, _store) = create_test_client(1024);

    client.set("k", 1i32, Expiration::None).await.unwrap();
    client.set("k", "two", Expiration::None).await.unwrap();
    client.flush().await;

    assert_eq!(
        client.get("k").await.unwrap(),
        Some(CacheValue::String("two".into()))
    );
}

// == Reads ==

#[tokio::test]
async fn test_get_or_default() {
    let (client, _store) = create_test_client(1024);

    assert_eq!(client.get_or_default::<i32>("missing").await.unwrap(), 0);
    assert_eq!(
        client.get_or_default::<Object<Profile>>("missing").await.unwrap(),
        Object(Profile::default())
    );

    client.set("n", 7i32, Expiration::None).await.unwrap();
    client.flush().await;
    assert_eq!(client.get_or_default::<i32>("n").await.unwrap(), 7);
}

#[tokio::test]
async fn test_get_values_skips_missing_and_refreshes_sliding() {
    let (client, store) = create_test_client(1024);

    client.set("a", 1u8, Expiration::None).await.unwrap();
    client
        .set("b", 'β', Expiration::sliding_millis(2000))
        .await
        .unwrap();
    client.flush().await;

    let values = client.get_values(&["a", "b", "c"]).await.unwrap();
    client.flush().await;

    let expected: HashMap<String, CacheValue> = [
        ("a".to_string(), CacheValue::Byte(1)),
        ("b".to_string(), CacheValue::Char('β')),
    ]
    .into_iter()
    .collect();
    assert_eq!(values, expected);
    assert_eq!(
        store.expires(),
        vec![("b".to_string(), Duration::from_millis(2000))]
    );

    let stats = client.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

// == Objects ==

#[tokio::test]
async fn test_typed_object_read_without_registry() {
    let (client, _store) = create_test_client(1024);
    let profile = Profile {
        name: "ada".into(),
        visits: 3,
    };

    client
        .set("p", Object(profile.clone()), Expiration::None)
        .await
        .unwrap();
    client.flush().await;

    let read = client.get_as::<Object<Profile>>("p").await.unwrap();
    assert_eq!(read, Some(Object(profile)));

    let untyped = client.get("p").await;
    assert!(matches!(untyped, Err(CacheError::TypeResolution(_))));
}

#[tokio::test]
async fn test_registered_polymorphic_object_round_trip() {
    let store = RecordingStore::default();
    let codec = ValueCodec::new(64).with_registry(TypeRegistry::new().with::<Journal>());
    let client = CacheClient::new(Arc::new(store.clone()), codec);

    let journal = Journal {
        events: (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    Event::Login { user: format!("user{i}") }
                } else {
                    Event::Purchase { user: format!("user{i}"), cents: i * 100 }
                }
            })
            .collect(),
    };

    client
        .set("journal", Object(journal.clone()), Expiration::sliding_millis(60_000))
        .await
        .unwrap();
    client.flush().await;
    assert_ne!(store.sets()[0].bytes[0] & COMPRESSED, 0);

    let object = match client.get("journal").await.unwrap() {
        Some(CacheValue::Object(object)) => object,
        other => panic!("expected an object, got {other:?}"),
    };
    assert_eq!(object.type_name(), "Audit.Journal");
    assert_eq!(object.downcast_ref::<Journal>(), Some(&journal));
}

// == Contains / Remove ==

#[tokio::test]
async fn test_contains_variants() {
    let (client, _store) = create_test_client(1024);

    client.set("a", 1i16, Expiration::None).await.unwrap();
    client.set("b", 2i16, Expiration::None).await.unwrap();
    client.flush().await;

    assert!(client.contains("a").await.unwrap());
    assert!(!client.contains("z").await.unwrap());
    assert!(client.contains_all(&["a", "b", "a"]).await.unwrap());
    assert!(!client.contains_all(&["a", "z"]).await.unwrap());
    assert!(client.contains_any(&["z", "b"]).await.unwrap());
    assert!(!client.contains_any(&["y", "z"]).await.unwrap());
}

#[tokio::test]
async fn test_remove_and_remove_many() {
    let (client, store) = create_test_client(1024);

    for key in ["a", "b", "c"] {
        client.set(key, key, Expiration::None).await.unwrap();
    }
    client.flush().await;

    client.remove("a").await.unwrap();
    client.remove_many(&["b", "missing"]).await.unwrap();
    client.flush().await;

    assert!(!client.contains_any(&["a", "b"]).await.unwrap());
    assert!(client.contains("c").await.unwrap());
    assert_eq!(store.inner.len(), 1);
}

#[tokio::test]
async fn test_empty_keys_rejected_before_io() {
    let (client, store) = create_test_client(1024);
    let no_keys: [&str; 0] = [];

    assert!(matches!(
        client.set("", 1i32, Expiration::None).await,
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(client.get("").await, Err(CacheError::InvalidArgument(_))));
    assert!(matches!(client.remove("").await, Err(CacheError::InvalidArgument(_))));
    assert!(matches!(
        client.get_values(&no_keys).await,
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.contains_all(&no_keys).await,
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.contains_any(&["a", ""]).await,
        Err(CacheError::InvalidArgument(_))
    ));

    assert_eq!(store.connects(), 0);
}

// == Connection Lifecycle ==

#[tokio::test]
async fn test_concurrent_first_use_connects_once() {
    let (client, store) = create_test_client(1024);
    let client = Arc::new(client);

    let mut handles = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.contains(&format!("key{i}")).await.unwrap()
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap());
    }

    assert_eq!(store.connects(), 1);
}

#[tokio::test]
async fn test_close_flushes_pending_writes() {
    let (client, store) = create_test_client(1024);

    client.connect().await.unwrap();
    client.set("k", 9u32, Expiration::None).await.unwrap();
    client.close().await.unwrap();

    assert_eq!(store.sets().len(), 1);
    assert!(store.inner.raw("k").is_some());

    // the next operation reconnects
    store.clear();
    assert_eq!(client.get_as::<u32>("k").await.unwrap(), Some(9));
    assert_eq!(store.connects(), 2);
}
