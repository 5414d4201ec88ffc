use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use gatekeep_state::error::StoreError;
use gatekeep_state::store::{PipelineOp, PipelineResult, StoreAdapter};

use crate::config::RedisConfig;

fn ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Redis-backed implementation of [`StoreAdapter`].
///
/// Uses a `deadpool-redis` connection pool and native Redis commands:
/// strings, hashes, lists, sorted sets, and sets map directly onto their
/// Redis counterparts, so there is no versioning or encoding layer to
/// maintain here (contrast the generic CAS-oriented state stores this crate
/// used to sit alongside).
pub struct RedisStore {
    pool: Pool,
    prefix: String,
}

impl RedisStore {
    /// Create a new `RedisStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(config.effective_url());
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let redis_key = self.prefixed(key);
        match ttl {
            Some(d) => {
                let _: () = conn
                    .pset_ex(&redis_key, value, u64::try_from(ms(d)).unwrap_or(u64::MAX))
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
            None => {
                let _: () = conn
                    .set(&redis_key, value)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let count: i64 = conn
            .del(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(count > 0)
    }

    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.hgetall(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let redis_key = self.prefixed(key);
        let _: () = conn
            .del(&redis_key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !fields.is_empty() {
            let pairs: Vec<(&String, &String)> = fields.iter().collect();
            let _: () = conn
                .hset_multiple(&redis_key, &pairs)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        if let Some(d) = ttl {
            let _: () = conn
                .pexpire(&redis_key, ms(d))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn list_push_right(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.rpush(self.prefixed(key), value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_pop_left(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.lpop(self.prefixed(key), None)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_len(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.llen(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.lrange(self.prefixed(key), 0, -1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .lrem(self.prefixed(key), 1, value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .zadd(self.prefixed(key), member, score)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn zset_pop_min(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
        let mut conn = self.conn().await?;
        let popped: Vec<(String, f64)> = conn
            .zpopmin(self.prefixed(key), 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(popped.into_iter().next())
    }

    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        conn.zrank(self.prefixed(key), member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zset_card(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.zcard(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .zrem(self.prefixed(key), member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let added: i64 = conn
            .sadd(self.prefixed(key), member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(added > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.sismember(self.prefixed(key), member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .srem(self.prefixed(key), member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr(self.prefixed(key), 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .pexpire(self.prefixed(key), ms(ttl))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn
            .ttl(self.prefixed(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(if ttl < 0 { None } else { Some(ttl) })
    }

    async fn pipeline(&self, ops: &[PipelineOp]) -> Result<Vec<PipelineResult>, StoreError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();

        for op in ops {
            match op {
                PipelineOp::SetString { key, value, ttl } => {
                    let redis_key = self.prefixed(key);
                    match ttl {
                        Some(d) => {
                            pipe.cmd("SET")
                                .arg(&redis_key)
                                .arg(value)
                                .arg("PX")
                                .arg(ms(*d))
                                .ignore();
                        }
                        None => {
                            pipe.cmd("SET").arg(&redis_key).arg(value).ignore();
                        }
                    }
                }
                PipelineOp::ListPushRight { key, value } => {
                    pipe.cmd("RPUSH").arg(self.prefixed(key)).arg(value);
                }
                PipelineOp::ZsetAdd { key, member, score } => {
                    pipe.cmd("ZADD")
                        .arg(self.prefixed(key))
                        .arg(score)
                        .arg(member)
                        .ignore();
                }
                PipelineOp::Incr { key, delta } => {
                    pipe.cmd("INCRBY").arg(self.prefixed(key)).arg(delta);
                }
                PipelineOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE")
                        .arg(self.prefixed(key))
                        .arg(ms(*ttl))
                        .ignore();
                }
            }
        }

        let values: Vec<redis::Value> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut results = Vec::with_capacity(ops.len());
        let mut values = values.into_iter();
        for op in ops {
            let result = match op {
                PipelineOp::SetString { .. } | PipelineOp::ZsetAdd { .. } | PipelineOp::Expire { .. } => {
                    PipelineResult::Unit
                }
                PipelineOp::ListPushRight { .. } | PipelineOp::Incr { .. } => {
                    let raw = values
                        .next()
                        .ok_or_else(|| StoreError::Backend("pipeline response truncated".into()))?;
                    let n: i64 = redis::FromRedisValue::from_redis_value(&raw)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    PipelineResult::Int(n)
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::config::RedisConfig;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("gatekeep-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let config = test_config();
        let store = RedisStore::new(&config).expect("pool creation should succeed");
        gatekeep_state::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
