//! Test-only helpers: a conformance suite shared by every [`StoreAdapter`]
//! backend, and a minimal fake used to unit-test [`crate::circuit`] without a
//! real backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{PipelineOp, PipelineResult, StoreAdapter};

/// Run the full store adapter conformance suite against a fresh backend
/// instance. Call this from each backend crate's own test module.
///
/// # Errors
///
/// Returns the first assertion failure as a panic (conformance tests use
/// `assert!`/`assert_eq!` directly; the `Result` only carries adapter errors
/// that aren't supposed to happen).
pub async fn run_store_conformance_tests(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    test_string_roundtrip(store).await?;
    test_del(store).await?;
    test_hash_roundtrip(store).await?;
    test_list_fifo_order(store).await?;
    test_list_remove_first(store).await?;
    test_zset_min_order(store).await?;
    test_zset_rank_and_card(store).await?;
    test_set_membership(store).await?;
    test_incr(store).await?;
    test_expire_and_ttl(store).await?;
    test_pipeline_batches_writes(store).await?;
    Ok(())
}

async fn test_string_roundtrip(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:string";
    assert!(store.get_string(key).await?.is_none());
    store.set_string(key, "hello", None).await?;
    assert_eq!(store.get_string(key).await?.as_deref(), Some("hello"));
    store.set_string(key, "world", None).await?;
    assert_eq!(store.get_string(key).await?.as_deref(), Some("world"));
    Ok(())
}

async fn test_del(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:del";
    store.set_string(key, "x", None).await?;
    assert!(store.del(key).await?);
    assert!(store.get_string(key).await?.is_none());
    assert!(!store.del(key).await?, "del on missing key returns false");
    Ok(())
}

async fn test_hash_roundtrip(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:hash";
    assert!(store.get_hash(key).await?.is_empty());
    let mut fields = HashMap::new();
    fields.insert("a".to_owned(), "1".to_owned());
    fields.insert("b".to_owned(), "2".to_owned());
    store.set_hash(key, &fields, None).await?;
    assert_eq!(store.get_hash(key).await?, fields);
    Ok(())
}

async fn test_list_fifo_order(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:list";
    assert_eq!(store.list_len(key).await?, 0);
    store.list_push_right(key, "a").await?;
    store.list_push_right(key, "b").await?;
    store.list_push_right(key, "c").await?;
    assert_eq!(store.list_len(key).await?, 3);
    assert_eq!(store.list_range(key).await?, vec!["a", "b", "c"]);
    assert_eq!(store.list_pop_left(key).await?.as_deref(), Some("a"));
    assert_eq!(store.list_pop_left(key).await?.as_deref(), Some("b"));
    assert_eq!(store.list_pop_left(key).await?.as_deref(), Some("c"));
    assert!(store.list_pop_left(key).await?.is_none());
    Ok(())
}

async fn test_list_remove_first(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:list-remove";
    store.list_push_right(key, "a").await?;
    store.list_push_right(key, "b").await?;
    store.list_push_right(key, "a").await?;
    assert!(store.list_remove_first(key, "a").await?);
    assert_eq!(store.list_range(key).await?, vec!["b", "a"]);
    assert!(!store.list_remove_first(key, "zzz").await?);
    Ok(())
}

async fn test_zset_min_order(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:zset";
    store.zset_add(key, "third", 30.0).await?;
    store.zset_add(key, "first", 10.0).await?;
    store.zset_add(key, "second", 20.0).await?;

    let (member, score) = store.zset_pop_min(key).await?.expect("non-empty");
    assert_eq!(member, "first");
    assert_eq!(score, 10.0);

    let (member, _) = store.zset_pop_min(key).await?.expect("non-empty");
    assert_eq!(member, "second");

    let (member, _) = store.zset_pop_min(key).await?.expect("non-empty");
    assert_eq!(member, "third");

    assert!(store.zset_pop_min(key).await?.is_none());
    Ok(())
}

async fn test_zset_rank_and_card(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:zset-rank";
    store.zset_add(key, "a", 1.0).await?;
    store.zset_add(key, "b", 2.0).await?;
    store.zset_add(key, "c", 3.0).await?;

    assert_eq!(store.zset_rank(key, "a").await?, Some(0));
    assert_eq!(store.zset_rank(key, "b").await?, Some(1));
    assert_eq!(store.zset_rank(key, "c").await?, Some(2));
    assert_eq!(store.zset_rank(key, "missing").await?, None);
    assert_eq!(store.zset_card(key).await?, 3);

    assert!(store.zset_remove(key, "b").await?);
    assert_eq!(store.zset_card(key).await?, 2);
    assert_eq!(store.zset_rank(key, "c").await?, Some(1));
    Ok(())
}

async fn test_set_membership(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:set";
    assert!(!store.set_contains(key, "m1").await?);
    assert!(store.set_add(key, "m1").await?);
    assert!(!store.set_add(key, "m1").await?, "re-add returns false");
    assert!(store.set_contains(key, "m1").await?);
    assert!(store.set_remove(key, "m1").await?);
    assert!(!store.set_contains(key, "m1").await?);
    assert!(!store.set_remove(key, "m1").await?);
    Ok(())
}

async fn test_incr(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:counter";
    assert_eq!(store.incr(key).await?, 1);
    assert_eq!(store.incr(key).await?, 2);
    assert_eq!(store.incr(key).await?, 3);
    Ok(())
}

async fn test_expire_and_ttl(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:ttl";
    store.set_string(key, "v", None).await?;
    assert!(store.ttl_seconds(key).await?.is_none());
    store.expire(key, Duration::from_secs(3600)).await?;
    let ttl = store.ttl_seconds(key).await?.expect("ttl should be set");
    assert!(ttl > 0 && ttl <= 3600);
    Ok(())
}

async fn test_pipeline_batches_writes(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let str_key = "conformance:pipeline:string";
    let list_key = "conformance:pipeline:list";
    let zset_key = "conformance:pipeline:zset";
    let counter_key = "conformance:pipeline:counter";

    let results = store
        .pipeline(&[
            PipelineOp::SetString {
                key: str_key.to_owned(),
                value: "v".to_owned(),
                ttl: None,
            },
            PipelineOp::ListPushRight {
                key: list_key.to_owned(),
                value: "item".to_owned(),
            },
            PipelineOp::ZsetAdd {
                key: zset_key.to_owned(),
                member: "m".to_owned(),
                score: 1.0,
            },
            PipelineOp::Incr {
                key: counter_key.to_owned(),
                delta: 5,
            },
            PipelineOp::Expire {
                key: str_key.to_owned(),
                ttl: Duration::from_secs(60),
            },
        ])
        .await?;

    assert_eq!(results.len(), 5);
    assert_eq!(store.get_string(str_key).await?.as_deref(), Some("v"));
    assert_eq!(store.list_range(list_key).await?, vec!["item"]);
    assert_eq!(store.zset_card(zset_key).await?, 1);
    assert_eq!(store.incr(counter_key).await?, 6);
    Ok(())
}

/// A minimal fake [`StoreAdapter`] for exercising [`crate::circuit`] without
/// wiring up a real backend. Not a conformance target — only `get_string` /
/// `set_string` are meaningfully implemented; everything else is a stub that
/// either succeeds trivially or participates in the `failing` switch.
#[derive(Default)]
pub struct MemoryTestStore {
    data: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl MemoryTestStore {
    #[must_use]
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::Relaxed);
        store
    }

    pub fn stop_failing(&self) {
        self.failing.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            Err(StoreError::Backend("simulated failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreAdapter for MemoryTestStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.data.lock().unwrap().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }

    async fn get_hash(&self, _key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check()?;
        Ok(HashMap::new())
    }

    async fn set_hash(
        &self,
        _key: &str,
        _fields: &HashMap<String, String>,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check()?;
        Ok(())
    }

    async fn list_push_right(&self, _key: &str, _value: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(1)
    }

    async fn list_pop_left(&self, _key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(None)
    }

    async fn list_len(&self, _key: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(0)
    }

    async fn list_range(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn list_remove_first(&self, _key: &str, _value: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(false)
    }

    async fn zset_add(&self, _key: &str, _member: &str, _score: f64) -> Result<(), StoreError> {
        self.check()?;
        Ok(())
    }

    async fn zset_pop_min(&self, _key: &str) -> Result<Option<(String, f64)>, StoreError> {
        self.check()?;
        Ok(None)
    }

    async fn zset_rank(&self, _key: &str, _member: &str) -> Result<Option<i64>, StoreError> {
        self.check()?;
        Ok(None)
    }

    async fn zset_card(&self, _key: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(0)
    }

    async fn zset_remove(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(false)
    }

    async fn set_add(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(false)
    }

    async fn set_contains(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(false)
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(false)
    }

    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(0)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        Ok(())
    }

    async fn ttl_seconds(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        self.check()?;
        Ok(None)
    }

    async fn pipeline(&self, _ops: &[PipelineOp]) -> Result<Vec<PipelineResult>, StoreError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}
