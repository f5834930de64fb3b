//! Key-space layout for the stock book (SPEC_FULL.md §3 "Indices").
//!
//! Centralising key construction here (mirroring the teacher's
//! `cache::keys::CacheKey` helper referenced from `orderbook_cache.rs`)
//! keeps every index name in one place instead of scattered `format!`s.

use crate::models::Direction;
use rust_decimal::Decimal;

pub const ORDERS_HASH: &str = "orders";
pub const ORDERS_PRICE_ZSET: &str = "orders:price";
pub const ORDERS_CREATION_DATE_ZSET: &str = "orders:creation_date";
pub const ORDERS_EXPIRE_HASH: &str = "orders:expire";
pub const TICKETS_LIST: &str = "tickets:ops";

/// `orders:<pair>:<direction>` — the unordered membership set for one side
/// of one pair.
pub fn pair_direction_set(pair: &str, direction: Direction) -> String {
    format!("orders:{pair}:{direction}")
}

/// `orders:stock:<pair>:<direction>` — aggregate remaining volume per price
/// bucket, used to derive the market price.
pub fn stock_hash(pair: &str, direction: Direction) -> String {
    format!("orders:stock:{pair}:{direction}")
}

/// `lock_order:<order_id>` — the per-order lease key.
pub fn lock_key(order_id: &str) -> String {
    format!("lock_order:{order_id}")
}

/// Fixed-scale (8 fractional digits) string representation of a price, used
/// both as a stock-book hash field and wherever a price needs to be
/// compared/bucketed without floating-point jitter splitting one logical
/// price into two buckets (SPEC_FULL.md §4.2.2).
pub fn price_bucket(price: Decimal) -> String {
    price.round_dp(8).normalize().to_string()
}

/// Ephemeral key for the "price-eligible" working copy `P` materialised
/// during candidate selection (§4.2 step 1). Scoped by the requesting
/// order id so concurrent matchers never collide on the same temp key.
pub fn price_eligible_scratch(order_id: &str) -> String {
    format!("orders:limit:{order_id}")
}

/// Ephemeral key for the intersection result `C` (§4.2 step 2).
pub fn matching_candidates_scratch(order_id: &str) -> String {
    format!("orders:matching:{order_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_bucket_normalizes_trailing_zeros() {
        assert_eq!(price_bucket(dec!(1.10)), price_bucket(dec!(1.1000)));
    }

    #[test]
    fn set_keys_include_pair_and_direction() {
        assert_eq!(
            pair_direction_set("USD/EUR", Direction::Buy),
            "orders:USD/EUR:buy"
        );
        assert_eq!(
            stock_hash("USD/EUR", Direction::Sell),
            "orders:stock:USD/EUR:sell"
        );
        assert_eq!(lock_key("order-1"), "lock_order:order-1");
    }
}
