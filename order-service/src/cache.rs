//! Read-through cache for `GET /orders/{id}`.
//!
//! The TTL is one second: long enough to soak up a polling client, short
//! enough that a saga transition shows up almost immediately. Every redis
//! failure falls through to the database.

use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::OrderDto;

const TTL_SECS: u64 = 1;

fn cache_key(order_id: Uuid) -> String {
    format!("order:{order_id}")
}

#[derive(Clone)]
pub struct OrderCache {
    redis: ConnectionManager,
}

impl OrderCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn get(&self, order_id: Uuid) -> Option<OrderDto> {
        let key = cache_key(order_id);
        let mut conn = self.redis.clone();

        let raw: Option<String> = match redis::cmd("GET").arg(&key).query_async(&mut conn).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Order cache read failed");
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str::<OrderDto>(&raw) {
            Ok(dto) => {
                debug!(key = %key, "Order cache hit");
                Some(dto)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache entry, evicting");
                let _: Result<(), _> = redis::cmd("DEL").arg(&key).query_async(&mut conn).await;
                None
            }
        }
    }

    pub async fn put(&self, dto: &OrderDto) {
        let key = cache_key(dto.id);
        let raw = match serde_json::to_string(dto) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize order for cache");
                return;
            }
        };

        let mut conn = self.redis.clone();
        let result: Result<(), _> = redis::cmd("SET")
            .arg(&key)
            .arg(raw)
            .arg("EX")
            .arg(TTL_SECS)
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!(key = %key, error = %e, "Order cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_per_order() {
        let id = Uuid::nil();
        assert_eq!(cache_key(id), format!("order:{id}"));
    }
}
