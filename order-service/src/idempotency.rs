//! The request idempotency gate for order creation.
//!
//! Keyed by the client's `Idempotency-Key` header. A key moves through three
//! states in redis: absent, `PROCESSING` (a short-lived claim so concurrent
//! duplicates collide), and the stored 201 body (replayed on retry for 24h).
//!
//! Redis being unreachable fails open: the request proceeds without the gate
//! and the database unique constraints remain the last line of defense.

use redis::aio::ConnectionManager;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "idempotency";
const PROCESSING_MARKER: &str = "PROCESSING";
const LOCK_TTL_SECS: u64 = 10;
const RESPONSE_TTL_SECS: u64 = 24 * 60 * 60;

/// Outcome of claiming a key before running the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// First request (or redis unavailable): run the command.
    Fresh,
    /// Another request holds the key right now.
    InFlight,
    /// A completed response is stored; replay it.
    Replayed(String),
}

/// Pure classification of the stored value, split out from the I/O.
fn classify(value: Option<String>) -> Option<GateDecision> {
    match value {
        None => None,
        Some(v) if v == PROCESSING_MARKER => Some(GateDecision::InFlight),
        Some(v) => Some(GateDecision::Replayed(v)),
    }
}

fn redis_key(key: &str) -> String {
    format!("{KEY_PREFIX}:{key}")
}

#[derive(Clone)]
pub struct IdempotencyGate {
    redis: ConnectionManager,
}

impl IdempotencyGate {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Look the key up and, when absent, claim it with a short TTL. The TTL
    /// releases the claim if the process dies before `complete`.
    pub async fn begin(&self, key: &str) -> GateDecision {
        let redis_key = redis_key(key);
        let mut conn = self.redis.clone();

        let existing: Result<Option<String>, _> = redis::cmd("GET")
            .arg(&redis_key)
            .query_async(&mut conn)
            .await;

        match existing {
            Ok(value) => {
                if let Some(decision) = classify(value) {
                    debug!(key = %key, decision = ?decision, "Idempotency key already present");
                    return decision;
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Idempotency check unavailable, failing open");
                return GateDecision::Fresh;
            }
        }

        // SET NX: exactly one concurrent request wins the claim.
        let claimed: Result<Option<String>, _> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(PROCESSING_MARKER)
            .arg("NX")
            .arg("EX")
            .arg(LOCK_TTL_SECS)
            .query_async(&mut conn)
            .await;

        match claimed {
            Ok(Some(_)) => GateDecision::Fresh,
            Ok(None) => GateDecision::InFlight,
            Err(e) => {
                warn!(key = %key, error = %e, "Idempotency claim unavailable, failing open");
                GateDecision::Fresh
            }
        }
    }

    /// Store the final response body under the key for replays.
    pub async fn complete(&self, key: &str, response_body: &str) {
        let mut conn = self.redis.clone();
        let result: Result<(), _> = redis::cmd("SET")
            .arg(redis_key(key))
            .arg(response_body)
            .arg("EX")
            .arg(RESPONSE_TTL_SECS)
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to store idempotent response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_means_no_decision_yet() {
        assert_eq!(classify(None), None);
    }

    #[test]
    fn processing_marker_means_in_flight() {
        assert_eq!(
            classify(Some("PROCESSING".to_string())),
            Some(GateDecision::InFlight)
        );
    }

    #[test]
    fn any_other_value_is_the_stored_response() {
        let stored = r#"{"order_id":"abc","status":"CREATED"}"#;
        assert_eq!(
            classify(Some(stored.to_string())),
            Some(GateDecision::Replayed(stored.to_string()))
        );
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(redis_key("k1"), "idempotency:k1");
    }
}
