use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use gatekeep_state::error::StoreError;
use gatekeep_state::store::{PipelineOp, PipelineResult, StoreAdapter};

/// The shape a key's value can take. A given key is used consistently as
/// exactly one shape by the rest of the service (strings for entries/config,
/// lists for the `normal` queue, sorted sets for `high`, sets for admitted
/// entries, hashes where a multi-field record is convenient).
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    /// Kept sorted by `(score, member)` so `zset_pop_min` and `zset_rank` are
    /// simple linear scans; fine at the queue depths this service handles.
    ZSet(Vec<(String, f64)>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

fn type_mismatch(key: &str, expected: &str) -> StoreError {
    StoreError::Backend(format!("key {key} is not a {expected}"))
}

/// In-memory [`StoreAdapter`] backed by a [`DashMap`].
///
/// Entries are lazily evicted on read when their TTL has elapsed. This is
/// the production fallback for test mode and local development (§9: "the
/// per-process map in the source is a test-mode fallback only").
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_if_expired(&self, key: &str) {
        self.data.remove_if(key, |_, e| e.is_expired());
    }

    fn zset_insert_sorted(list: &mut Vec<(String, f64)>, member: String, score: f64) {
        list.retain(|(m, _)| m != &member);
        let pos = list
            .partition_point(|(m, s)| (*s, m.as_str()) < (score, member.as_str()));
        list.insert(pos, (member, score));
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(type_mismatch(key, "string")),
            },
            None => Ok(None),
        }
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.data.insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value.to_owned()),
                expires_at: expiry_from_ttl(ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        match self.data.remove(key) {
            Some((_, e)) => Ok(!e.is_expired()),
            None => Ok(false),
        }
    }

    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::Hash(h) => Ok(h.clone()),
                _ => Err(type_mismatch(key, "hash")),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.data.insert(
            key.to_owned(),
            Entry {
                value: Value::Hash(fields.clone()),
                expires_at: expiry_from_ttl(ttl),
            },
        );
        Ok(())
    }

    async fn list_push_right(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        self.remove_if_expired(key);
        let mut entry = self.data.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push_back(value.to_owned());
                Ok(i64::try_from(list.len()).unwrap_or(i64::MAX))
            }
            _ => Err(type_mismatch(key, "list")),
        }
    }

    async fn list_pop_left(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.remove_if_expired(key);
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(None);
        };
        match &mut entry.value {
            Value::List(list) => Ok(list.pop_front()),
            _ => Err(type_mismatch(key, "list")),
        }
    }

    async fn list_len(&self, key: &str) -> Result<i64, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::List(list) => Ok(i64::try_from(list.len()).unwrap_or(i64::MAX)),
                _ => Err(type_mismatch(key, "list")),
            },
            None => Ok(0),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::List(list) => Ok(list.iter().cloned().collect()),
                _ => Err(type_mismatch(key, "list")),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn list_remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.remove_if_expired(key);
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(false);
        };
        match &mut entry.value {
            Value::List(list) => {
                if let Some(pos) = list.iter().position(|v| v == value) {
                    list.remove(pos);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            _ => Err(type_mismatch(key, "list")),
        }
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.remove_if_expired(key);
        let mut entry = self.data.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::ZSet(Vec::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::ZSet(list) => {
                Self::zset_insert_sorted(list, member.to_owned(), score);
                Ok(())
            }
            _ => Err(type_mismatch(key, "zset")),
        }
    }

    async fn zset_pop_min(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
        self.remove_if_expired(key);
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(None);
        };
        match &mut entry.value {
            Value::ZSet(list) => {
                if list.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(list.remove(0)))
                }
            }
            _ => Err(type_mismatch(key, "zset")),
        }
    }

    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::ZSet(list) => Ok(list
                    .iter()
                    .position(|(m, _)| m == member)
                    .map(|p| i64::try_from(p).unwrap_or(i64::MAX))),
                _ => Err(type_mismatch(key, "zset")),
            },
            None => Ok(None),
        }
    }

    async fn zset_card(&self, key: &str) -> Result<i64, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::ZSet(list) => Ok(i64::try_from(list.len()).unwrap_or(i64::MAX)),
                _ => Err(type_mismatch(key, "zset")),
            },
            None => Ok(0),
        }
    }

    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.remove_if_expired(key);
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(false);
        };
        match &mut entry.value {
            Value::ZSet(list) => {
                let before = list.len();
                list.retain(|(m, _)| m != member);
                Ok(list.len() != before)
            }
            _ => Err(type_mismatch(key, "zset")),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.remove_if_expired(key);
        let mut entry = self.data.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_owned())),
            _ => Err(type_mismatch(key, "set")),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(e) => match &e.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(type_mismatch(key, "set")),
            },
            None => Ok(false),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.remove_if_expired(key);
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(false);
        };
        match &mut entry.value {
            Value::Set(set) => Ok(set.remove(member)),
            _ => Err(type_mismatch(key, "set")),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.remove_if_expired(key);
        let mut entry = self.data.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Str("0".to_owned()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Str(s) => {
                let current: i64 = s.parse().map_err(|e: std::num::ParseIntError| {
                    StoreError::Serialization(format!("counter value is not an integer: {e}"))
                })?;
                let new_value = current + 1;
                *s = new_value.to_string();
                Ok(new_value)
            }
            _ => Err(type_mismatch(key, "string counter")),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.remove_if_expired(key);
        Ok(self.data.get(key).and_then(|e| {
            e.expires_at
                .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs())
                .map(|s| i64::try_from(s).unwrap_or(i64::MAX))
        }))
    }

    async fn pipeline(&self, ops: &[PipelineOp]) -> Result<Vec<PipelineResult>, StoreError> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                PipelineOp::SetString { key, value, ttl } => {
                    self.set_string(key, value, *ttl).await?;
                    PipelineResult::Unit
                }
                PipelineOp::ListPushRight { key, value } => {
                    PipelineResult::Int(self.list_push_right(key, value).await?)
                }
                PipelineOp::ZsetAdd { key, member, score } => {
                    self.zset_add(key, member, *score).await?;
                    PipelineResult::Unit
                }
                PipelineOp::Incr { key, delta } => {
                    // Pipeline increments may carry a delta other than 1
                    // (the rate limiter never does, but the op is general).
                    self.remove_if_expired(key);
                    let mut entry = self.data.entry(key.clone()).or_insert_with(|| Entry {
                        value: Value::Str("0".to_owned()),
                        expires_at: None,
                    });
                    match &mut entry.value {
                        Value::Str(s) => {
                            let current: i64 = s.parse().unwrap_or(0);
                            let new_value = current + delta;
                            *s = new_value.to_string();
                            PipelineResult::Int(new_value)
                        }
                        _ => return Err(type_mismatch(key, "string counter")),
                    }
                }
                PipelineOp::Expire { key, ttl } => {
                    self.expire(key, *ttl).await?;
                    PipelineResult::Unit
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
