//! Order Store (SPEC_FULL.md §4.2) — persists orders, maintains the
//! stock-book indices, computes matching-candidate lists, enforces
//! per-order locks, and derives market prices.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Direction, Order, OrderType};
use crate::store::keys;
use crate::store::redis_client::KvStore;
use crate::store::OrderStorage;

/// Per-order lease TTL (§5 "Shared resources").
pub const LOCK_TTL_SECS: u64 = 60;

/// Tolerance applied when pruning the price-eligible working copy so that
/// the boundary price itself is always kept (§4.2 step 1; mirrors
/// `original_source/storage/orders.go`'s `0.01` guard band, scaled down to
/// match this system's 8-decimal price precision).
const PRICE_EPSILON: f64 = 1e-8;

pub struct OrderStore {
    kv: Arc<KvStore>,
}

impl OrderStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    async fn build_candidates(
        &self,
        order: &Order,
        scratch_p: &str,
        scratch_c: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        // Step 1: materialise the price-eligible set P.
        self.kv.zinterstore_copy(scratch_p, keys::ORDERS_PRICE_ZSET).await?;

        if order.order_type != OrderType::Market {
            let limit = decimal_to_f64(order.limit_price);
            match order.direction {
                Direction::Buy => {
                    self.kv
                        .zremrangebyscore(scratch_p, limit + PRICE_EPSILON, f64::INFINITY)
                        .await?;
                }
                Direction::Sell => {
                    self.kv
                        .zremrangebyscore(scratch_p, f64::NEG_INFINITY, limit - PRICE_EPSILON)
                        .await?;
                }
            }
        }

        // Step 2: ZINTERSTORE(P, orders:creation_date, orders:<pair>:<opp>)
        // with weights [W_price, 1, 0].
        let opposite_set = keys::pair_direction_set(&order.currency_pair, order.direction.opposite());
        let w_price = (now_seconds() * 100) as f64 * order.direction.sign() as f64;

        self.kv
            .zinterstore_weighted(
                scratch_c,
                &[scratch_p, keys::ORDERS_CREATION_DATE_ZSET, &opposite_set],
                &[w_price, 1.0, 0.0],
            )
            .await?;

        // Step 3: read ascending.
        let ids = self.kv.zrange(scratch_c, 0, -1).await?;
        ids.into_iter()
            .map(|id| Uuid::from_str(&id).map_err(|e| StoreError::Redis(redis_parse_error(&id, &e))))
            .collect()
    }
}

#[async_trait]
impl OrderStorage for OrderStore {
    async fn put(&self, order: &mut Order) -> Result<(), StoreError> {
        order.updated_date = Utc::now().timestamp_millis();
        let json = serde_json::to_string(order)?;
        self.kv.hset(keys::ORDERS_HASH, &order.order_id.to_string(), &json).await
    }

    async fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        let json = self
            .kv
            .hget(keys::ORDERS_HASH, &id.to_string())
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.kv.hdel(keys::ORDERS_HASH, &id.to_string()).await
    }

    /// Inserts `order` into every stock-book index in one atomic pipeline
    /// (§4.2 `add_to_stock_book`).
    async fn add_to_stock_book(&self, order: &Order) -> Result<(), StoreError> {
        let id = order.order_id.to_string();
        let price_f64 = decimal_to_f64(order.limit_price);
        let bucket = keys::price_bucket(order.limit_price);
        let remaining = decimal_to_f64(order.remaining_volume());

        self.kv
            .pipeline()
            .zadd(keys::ORDERS_PRICE_ZSET, &id, price_f64)
            .zadd(keys::ORDERS_CREATION_DATE_ZSET, &id, creation_date_score(order.creation_date))
            .sadd(&keys::pair_direction_set(&order.currency_pair, order.direction), &id)
            .hset(keys::ORDERS_EXPIRE_HASH, &id, &order.expiration_date.to_string())
            .hincrby_float(&keys::stock_hash(&order.currency_pair, order.direction), &bucket, remaining)
            .exec()
            .await
    }

    /// Removes `order` from every stock-book index in one atomic pipeline
    /// (§4.2 `remove_from_stock_book`) — the exact inverse of
    /// `add_to_stock_book`.
    async fn remove_from_stock_book(&self, order: &Order) -> Result<(), StoreError> {
        let id = order.order_id.to_string();
        let bucket = keys::price_bucket(order.limit_price);
        let remaining = decimal_to_f64(order.remaining_volume());

        self.kv
            .pipeline()
            .zrem(keys::ORDERS_PRICE_ZSET, &id)
            .zrem(keys::ORDERS_CREATION_DATE_ZSET, &id)
            .srem(&keys::pair_direction_set(&order.currency_pair, order.direction), &id)
            .hdel(keys::ORDERS_EXPIRE_HASH, &id)
            .hincrby_float(&keys::stock_hash(&order.currency_pair, order.direction), &bucket, -remaining)
            .exec()
            .await
    }

    /// `set_if_absent(lock_order:<id>, token, 60s)` (§4.2 `try_lock`).
    async fn try_lock(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let acquired = self
            .kv
            .set_if_absent(&keys::lock_key(&id.to_string()), token, LOCK_TTL_SECS)
            .await?;
        if acquired {
            Ok(())
        } else {
            Err(StoreError::Locked(id.to_string()))
        }
    }

    /// `delete_if_value(lock_order:<id>, token)` (§4.2 `try_unlock`) — a
    /// mismatched token never deletes the lease (Invariant 4 in §8).
    async fn try_unlock(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let released = self.kv.delete_if_value(&keys::lock_key(&id.to_string()), token).await?;
        if released {
            Ok(())
        } else {
            Err(StoreError::Locked(id.to_string()))
        }
    }

    /// Volume-weighted average price over `orders:stock:<pair>:<direction>`
    /// (§4.2.1). `StockBookEmpty` when total volume is zero.
    async fn derived_market_price(&self, pair: &str, direction: Direction) -> Result<Decimal, StoreError> {
        let buckets = self.kv.hgetall(&keys::stock_hash(pair, direction)).await?;

        let mut weighted_sum = Decimal::ZERO;
        let mut total_volume = Decimal::ZERO;
        for (price_str, volume_str) in &buckets {
            let price = Decimal::from_str(price_str).unwrap_or(Decimal::ZERO);
            let volume = Decimal::from_str(volume_str).unwrap_or(Decimal::ZERO);
            weighted_sum += price * volume;
            total_volume += volume;
        }

        if total_volume.is_zero() {
            return Err(StoreError::StockBookEmpty {
                pair: pair.to_string(),
                direction: direction.to_string(),
            });
        }

        Ok(weighted_sum / total_volume)
    }

    /// Matching-candidate selection (§4.2, five steps). Returns candidate
    /// order ids in ascending (best-first) order; empty when the book has
    /// no eligible counterparty.
    async fn candidates_for_match(&self, order: &Order) -> Result<Vec<Uuid>, StoreError> {
        let order_id = order.order_id.to_string();
        let scratch_p = keys::price_eligible_scratch(&order_id);
        let scratch_c = keys::matching_candidates_scratch(&order_id);

        let result = self.build_candidates(order, &scratch_p, &scratch_c).await;

        // Always clean up the scratch keys, success or failure (§4.2 step 4).
        if let Err(e) = self.kv.delete_key(&scratch_p).await {
            tracing::warn!(order_id = %order.order_id, error = %e, "failed to clean up price-eligible scratch key");
        }
        if let Err(e) = self.kv.delete_key(&scratch_c).await {
            tracing::warn!(order_id = %order.order_id, error = %e, "failed to clean up matching candidates scratch key");
        }

        result
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `orders:creation_date` score, in seconds. `creation_date` is stored in
/// milliseconds everywhere else on `Order`, but `W_price` (§4.2 step 2) is
/// scaled against `now_seconds()`, so the tie-break term must share that
/// scale or a large-enough creation-time gap can outweigh the price term it's
/// meant to merely break ties within (§8 property 6).
fn creation_date_score(creation_date_ms: i64) -> f64 {
    (creation_date_ms as f64) / 1000.0
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn redis_parse_error(id: &str, e: &uuid::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "candidate id is not a valid uuid",
        format!("{id}: {e}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_to_f64_is_lossless_for_realistic_prices() {
        use rust_decimal_macros::dec;
        assert_eq!(decimal_to_f64(dec!(1.10)), 1.10_f64);
    }

    #[test]
    fn creation_date_score_matches_w_prices_seconds_scale() {
        // creation_date is stored in milliseconds; the score must be in
        // seconds so a 72h max creation-time gap can't outweigh a realistic
        // price gap's contribution to W_price (§4.2 step 2, §8 property 6).
        assert_eq!(creation_date_score(1_000), 1.0);
        assert_eq!(creation_date_score(1_000 * 3600 * 72), 3600.0 * 72.0);
    }
}
