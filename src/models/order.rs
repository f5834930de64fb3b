//! Order entity and lifecycle types.
//!
//! Field set and invariants follow the data model in `SPEC_FULL.md` §3.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The opposite side of the book an order on this side matches against.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// Sign used when packing price into the matching score (§4.2 step 2).
    /// `+1` for BUY, `-1` for SELL.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
        }
    }

    /// Index into a `"BASE/QUOTE"` pair for the currency this side offers.
    fn index(self) -> usize {
        match self {
            Direction::Buy => 0,
            Direction::Sell => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "limit"),
            OrderType::Market => write!(f, "market"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    New,
    Approved,
    Rejected,
    PartFilled,
    Filled,
    Expired,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::New => "NEW",
            OrderState::Approved => "APPROVED",
            OrderState::Rejected => "REJECTED",
            OrderState::PartFilled => "PART_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub account_id: String,
    pub asset_id: String,
    pub currency_pair: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub limit_price: Decimal,
    pub ask_volume: Decimal,
    pub filled_volume: Decimal,
    pub filled_price: Decimal,
    pub state: OrderState,
    pub creation_date: i64,
    pub updated_date: i64,
    pub expiration_date: i64,
    pub matching_date: i64,
    pub transfer_id: Option<Uuid>,
    pub exchange_id: Option<String>,
    pub parent_id: Option<Uuid>,
}

impl Order {
    /// Remaining (unfilled) volume: `ask_volume - filled_volume` (Invariant 2).
    pub fn remaining_volume(&self) -> Decimal {
        self.ask_volume - self.filled_volume
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_volume >= self.ask_volume
    }

    /// True iff the order belongs in the stock book right now (Invariant 1).
    pub fn belongs_in_stock_book(&self, now_ms: i64) -> bool {
        matches!(self.state, OrderState::Approved | OrderState::PartFilled)
            && self.expiration_date > now_ms
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration_date < now_ms
    }

    /// The currency this order offers up in exchange for `asked_currency`.
    /// See spec.md §4.4 `offer_side`.
    pub fn offer_currency(&self) -> &str {
        offer_side(&self.currency_pair, self.direction)
    }

    /// The currency this order is asking to receive.
    pub fn asked_currency(&self) -> &str {
        asked_side(&self.currency_pair, self.direction)
    }

    pub fn touch(&mut self) {
        self.updated_date = Utc::now().timestamp_millis();
    }
}

/// `pair.split('/')[direction]` — BUY (index 0) offers base,
/// SELL (index 1) offers quote. Named to match spec.md §4.4 verbatim.
pub fn offer_side(pair: &str, direction: Direction) -> &str {
    let parts: Vec<&str> = pair.splitn(2, '/').collect();
    parts[direction.index()]
}

/// The complementary half of the pair from `offer_side`.
pub fn asked_side(pair: &str, direction: Direction) -> &str {
    let parts: Vec<&str> = pair.splitn(2, '/').collect();
    parts[1 - direction.index()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order(direction: Direction, state: OrderState, expiration_date: i64) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction,
            order_type: OrderType::Limit,
            limit_price: dec!(1.10),
            ask_volume: dec!(100),
            filled_volume: dec!(0),
            filled_price: dec!(0),
            state,
            creation_date: 1_000,
            updated_date: 1_000,
            expiration_date,
            matching_date: 0,
            transfer_id: None,
            exchange_id: None,
            parent_id: None,
        }
    }

    #[test]
    fn offer_side_buy_is_base() {
        assert_eq!(offer_side("USD/EUR", Direction::Buy), "USD");
        assert_eq!(asked_side("USD/EUR", Direction::Buy), "EUR");
    }

    #[test]
    fn offer_side_sell_is_quote() {
        assert_eq!(offer_side("USD/EUR", Direction::Sell), "EUR");
        assert_eq!(asked_side("USD/EUR", Direction::Sell), "USD");
    }

    #[test]
    fn direction_sign_and_opposite() {
        assert_eq!(Direction::Buy.sign(), 1);
        assert_eq!(Direction::Sell.sign(), -1);
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
    }

    #[test]
    fn belongs_in_stock_book_requires_state_and_unexpired() {
        let mut o = sample_order(Direction::Buy, OrderState::Approved, 10_000);
        assert!(o.belongs_in_stock_book(5_000));
        assert!(!o.belongs_in_stock_book(20_000));

        o.state = OrderState::New;
        assert!(!o.belongs_in_stock_book(5_000));

        o.state = OrderState::PartFilled;
        assert!(o.belongs_in_stock_book(5_000));
    }

    #[test]
    fn remaining_volume_and_fully_filled() {
        let mut o = sample_order(Direction::Buy, OrderState::Approved, 10_000);
        assert_eq!(o.remaining_volume(), dec!(100));
        assert!(!o.is_fully_filled());

        o.filled_volume = dec!(100);
        assert_eq!(o.remaining_volume(), dec!(0));
        assert!(o.is_fully_filled());
    }
}
