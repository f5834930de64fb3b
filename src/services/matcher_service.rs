//! Matcher Service (SPEC_FULL.md §4.5) — drives one order through candidate
//! selection, lease acquisition, and fills against the opposite side of the
//! book.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::DispatchError;
use crate::models::{Direction, Order, OrderState, OrderType, TicketOperation};
use crate::store::{OrderStorage, TicketStorage};
use crate::wire::{self, CreateTransferRequest, TransferLeg};

pub struct MatcherService {
    orders: Arc<dyn OrderStorage>,
    tickets: Arc<dyn TicketStorage>,
}

impl MatcherService {
    pub fn new(orders: Arc<dyn OrderStorage>, tickets: Arc<dyn TicketStorage>) -> Self {
        Self { orders, tickets }
    }

    /// `match_order` (§4.5, steps 1-5).
    pub async fn match_order(&self, mut incoming: Order) -> Result<(), DispatchError> {
        let lock_token = Uuid::new_v4().to_string();
        let candidates = self.orders.candidates_for_match(&incoming).await?;

        if candidates.is_empty() {
            if incoming.order_type == OrderType::Market {
                incoming.order_type = OrderType::Limit;
            }
            self.orders.put(&mut incoming).await?;
            self.orders.add_to_stock_book(&incoming).await?;
            return Ok(());
        }

        for candidate_id in candidates {
            if incoming.is_fully_filled() {
                break;
            }

            if let Err(e) = self.orders.try_lock(candidate_id, &lock_token).await {
                if e.is_locked() {
                    continue;
                }
                return Err(e.into());
            }

            let mut opp = match self.orders.get(candidate_id).await {
                Ok(opp) => opp,
                Err(_) => {
                    let _ = self.orders.try_unlock(candidate_id, &lock_token).await;
                    continue;
                }
            };

            let now = Utc::now().timestamp_millis();
            if incoming.is_expired(now) || opp.is_expired(now) {
                tracing::info!(
                    order_id = %incoming.order_id,
                    counterparty_id = %opp.order_id,
                    "skipping expired counterparty during matching"
                );
                let _ = self.orders.try_unlock(candidate_id, &lock_token).await;
                continue;
            }

            let fill_volume = incoming.remaining_volume().min(opp.remaining_volume());
            let transfer_id = Uuid::new_v4();

            // Remove opp's *pre-fill* remaining-volume contribution before
            // mutating its filled_volume below — remove_from_stock_book
            // decrements the stock hash by whatever opp.remaining_volume()
            // is at the time it's called, so this must run first or a full
            // fill decrements by 0 and a partial fill's remove/re-add cancel
            // out (§4.5 step 4; leaves the aggregate stale, violating
            // Invariant 1/2).
            self.orders.remove_from_stock_book(&opp).await?;

            incoming.filled_volume += fill_volume;
            incoming.matching_date = now;
            incoming.transfer_id = Some(transfer_id);
            incoming.filled_price = opp.limit_price;
            incoming.state = if incoming.is_fully_filled() {
                OrderState::Filled
            } else {
                OrderState::PartFilled
            };

            opp.filled_volume += fill_volume;
            opp.matching_date = now;
            opp.transfer_id = Some(transfer_id);
            opp.filled_price = opp.limit_price;
            opp.state = if opp.is_fully_filled() {
                OrderState::Filled
            } else {
                OrderState::PartFilled
            };

            self.orders.put(&mut incoming).await?;
            self.orders.put(&mut opp).await?;
            if opp.state == OrderState::PartFilled {
                self.orders.add_to_stock_book(&opp).await?;
            }

            self.emit_transfer_ticket(&incoming, &opp, fill_volume).await?;

            let _ = self.orders.try_unlock(candidate_id, &lock_token).await;
        }

        if !incoming.is_fully_filled() {
            self.orders.add_to_stock_book(&incoming).await?;
        }

        Ok(())
    }

    /// Emits the `APPROVE_CREATION` transfer ticket for one fill (§4.5 step
    /// 4, `amount_for`).
    async fn emit_transfer_ticket(&self, incoming: &Order, opp: &Order, fill_volume: Decimal) -> Result<(), DispatchError> {
        let leg_incoming = TransferLeg {
            balance_id: incoming.exchange_id.clone().unwrap_or_default(),
            amount: amount_for(opp.direction, incoming.filled_price, fill_volume).to_string(),
        };
        let leg_opp = TransferLeg {
            balance_id: opp.exchange_id.clone().unwrap_or_default(),
            amount: amount_for(incoming.direction, incoming.filled_price, fill_volume).to_string(),
        };
        let transfer = CreateTransferRequest {
            id: incoming.transfer_id.unwrap_or_default().to_string(),
            transfer_data: vec![leg_incoming, leg_opp],
        };
        self.tickets
            .push(TicketOperation::ApproveCreation, wire::encode(&transfer))
            .await?;
        Ok(())
    }
}

/// SELL legs settle in the base currency at `fill_volume`; BUY legs settle
/// in the quote currency at `filled_price * fill_volume` (§4.5 step 4).
fn amount_for(direction: Direction, filled_price: Decimal, fill_volume: Decimal) -> Decimal {
    match direction {
        Direction::Sell => fill_volume,
        Direction::Buy => filled_price * fill_volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::models::{OrderType, Ticket};
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    mock! {
        Orders {}

        #[async_trait]
        impl OrderStorage for Orders {
            async fn put(&self, order: &mut Order) -> Result<(), StoreError>;
            async fn get(&self, id: Uuid) -> Result<Order, StoreError>;
            async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
            async fn add_to_stock_book(&self, order: &Order) -> Result<(), StoreError>;
            async fn remove_from_stock_book(&self, order: &Order) -> Result<(), StoreError>;
            async fn try_lock(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
            async fn try_unlock(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
            async fn derived_market_price(&self, pair: &str, direction: Direction) -> Result<Decimal, StoreError>;
            async fn candidates_for_match(&self, order: &Order) -> Result<Vec<Uuid>, StoreError>;
        }
    }

    mock! {
        Tickets {}

        #[async_trait]
        impl TicketStorage for Tickets {
            async fn push(&self, operation: TicketOperation, payload: Vec<u8>) -> Result<Uuid, StoreError>;
            async fn pop(&self) -> Result<Option<Ticket>, StoreError>;
            async fn reenqueue(&self, ticket: Ticket) -> Result<(), StoreError>;
        }
    }

    fn sample_order(direction: Direction, ask_volume: Decimal, filled_volume: Decimal) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction,
            order_type: OrderType::Limit,
            limit_price: dec!(1.10),
            ask_volume,
            filled_volume,
            filled_price: dec!(0),
            state: OrderState::Approved,
            creation_date: 1_000,
            updated_date: 1_000,
            expiration_date: Utc::now().timestamp_millis() + 1_000_000,
            matching_date: 0,
            transfer_id: None,
            exchange_id: Some("bal-incoming".into()),
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn no_candidates_rests_the_order_in_the_stock_book() {
        let incoming = sample_order(Direction::Buy, dec!(100), dec!(0));

        let mut orders = MockOrders::new();
        orders.expect_candidates_for_match().returning(|_| Ok(vec![]));
        orders.expect_put().times(1).returning(|_| Ok(()));
        orders.expect_add_to_stock_book().times(1).returning(|_| Ok(()));

        let tickets = MockTickets::new();

        let service = MatcherService::new(Arc::new(orders), Arc::new(tickets));
        service.match_order(incoming).await.unwrap();
    }

    #[tokio::test]
    async fn full_fill_against_single_candidate_emits_one_transfer_ticket() {
        let incoming = sample_order(Direction::Buy, dec!(100), dec!(0));
        let opp = sample_order(Direction::Sell, dec!(100), dec!(0));
        let opp_id = opp.order_id;
        let opp_for_closure = opp.clone();

        let mut orders = MockOrders::new();
        orders
            .expect_candidates_for_match()
            .returning(move |_| Ok(vec![opp_id]));
        orders.expect_try_lock().returning(|_, _| Ok(()));
        orders.expect_try_unlock().returning(|_, _| Ok(()));
        orders
            .expect_get()
            .returning(move |_| Ok(opp_for_closure.clone()));
        orders.expect_remove_from_stock_book().times(1).returning(|_| Ok(()));
        orders.expect_put().times(2).returning(|_| Ok(()));

        let pushed = Arc::new(Mutex::new(Vec::new()));
        let pushed_clone = pushed.clone();
        let mut tickets = MockTickets::new();
        tickets.expect_push().returning(move |op, payload| {
            pushed_clone.lock().unwrap().push(op);
            if op == TicketOperation::ApproveCreation {
                let transfer: CreateTransferRequest = wire::decode(&payload).unwrap();
                assert_eq!(transfer.transfer_data.len(), 2);
            }
            Ok(Uuid::new_v4())
        });

        let service = MatcherService::new(Arc::new(orders), Arc::new(tickets));
        service.match_order(incoming).await.unwrap();

        assert_eq!(pushed.lock().unwrap().as_slice(), [TicketOperation::ApproveCreation]);
    }

    #[test]
    fn amount_for_sell_is_fill_volume_and_buy_is_price_times_volume() {
        assert_eq!(amount_for(Direction::Sell, dec!(1.10), dec!(40)), dec!(40));
        assert_eq!(amount_for(Direction::Buy, dec!(1.10), dec!(40)), dec!(44.00));
    }
}
