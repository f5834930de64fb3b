//! Order Service (SPEC_FULL.md §4.4) — order creation and BPS approval
//! handling. Depends only on the `OrderStorage`/`TicketStorage` traits, never
//! the concrete Redis-backed types (§9 "Cyclic service wiring").

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::DispatchError;
use crate::models::{
    map_bps_error_code, offer_side, Direction, Order, OrderState, OrderType, OpsError,
};
use crate::store::{OrderStorage, TicketStorage};
use crate::wire::{self, BalanceLockResponse, CreateOrderCommand, LockBalanceRequest, OrderInfo};

/// Approved orders rest in the book for 72h before they're treated as
/// expired (§4.4 `approve_order_creation`).
const APPROVAL_TTL_MS: i64 = 72 * 60 * 60 * 1000;

pub struct OrderService {
    orders: Arc<dyn OrderStorage>,
    tickets: Arc<dyn TicketStorage>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStorage>, tickets: Arc<dyn TicketStorage>) -> Self {
        Self { orders, tickets }
    }

    /// `create_order` (§4.4). Synthesises the order, derives a market price
    /// when needed, persists it, and emits the `ORDER_NOTIFICATION` and
    /// `LOCK_BALANCE` tickets.
    pub async fn create_order(&self, cmd: CreateOrderCommand) -> Result<Order, DispatchError> {
        let now = Utc::now().timestamp_millis();
        let mut order = Order {
            order_id: Uuid::new_v4(),
            account_id: cmd.account_id,
            asset_id: cmd.asset_id,
            currency_pair: cmd.currency_pair,
            direction: cmd.direction,
            order_type: cmd.order_type,
            limit_price: cmd.limit_price,
            ask_volume: cmd.ask_volume,
            filled_volume: Decimal::ZERO,
            filled_price: Decimal::ZERO,
            state: OrderState::New,
            creation_date: now,
            updated_date: now,
            expiration_date: 0,
            matching_date: 0,
            transfer_id: None,
            exchange_id: None,
            parent_id: None,
        };

        if order.order_type == OrderType::Market {
            match self.orders.derived_market_price(&order.currency_pair, order.direction).await {
                Ok(price) => order.limit_price = price,
                Err(e) if e.is_stock_book_empty() => {
                    tracing::info!(
                        order_id = %order.order_id,
                        pair = %order.currency_pair,
                        "stock book empty deriving market price, resting order at limit_price=0"
                    );
                    order.limit_price = Decimal::ZERO;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.orders.put(&mut order).await?;

        self.emit_order_notification(&order, None).await?;

        let lock_amount = match order.direction {
            Direction::Sell => order.ask_volume,
            Direction::Buy => order.limit_price * order.ask_volume,
        };
        let lock_request = LockBalanceRequest {
            id: order.order_id.to_string(),
            asset_id: order.asset_id.clone(),
            account_id: order.account_id.clone(),
            currency_code: offer_side(&order.currency_pair, order.direction).to_string(),
            amount: lock_amount.to_string(),
        };
        self.tickets
            .push(crate::models::TicketOperation::LockBalance, wire::encode(&lock_request))
            .await?;

        Ok(order)
    }

    /// `approve_order_creation` (§4.4) — driven by a decoded
    /// `LockBalanceResponse` from BPS.
    pub async fn approve_order_creation(&self, response: BalanceLockResponse) -> Result<(), DispatchError> {
        let mut order = match self.orders.get(response.order_id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if let Some(bps_code) = response.error {
            order.state = OrderState::Rejected;
            order.touch();
            self.orders.delete(order.order_id).await?;

            let cause = OpsError {
                error_code: map_bps_error_code(&bps_code),
                message: bps_code.to_string(),
            };
            self.emit_order_notification(&order, Some(&cause)).await?;
            return Ok(());
        }

        order.state = OrderState::Approved;
        order.touch();
        order.expiration_date = Utc::now().timestamp_millis() + APPROVAL_TTL_MS;
        order.exchange_id = Some(response.balance_id);

        self.orders.put(&mut order).await?;
        self.emit_order_notification(&order, None).await?;
        self.tickets
            .push(crate::models::TicketOperation::MatchOrder, wire::encode(&OrderInfo::from(&order)))
            .await?;

        Ok(())
    }

    async fn emit_order_notification(&self, order: &Order, cause: Option<&OpsError>) -> Result<(), DispatchError> {
        let mut info = OrderInfo::from(order);
        if let Some(cause) = cause {
            info = info.with_cause(cause);
        }
        self.tickets
            .push(crate::models::TicketOperation::OrderNotification, wire::encode(&info))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::models::{OrderState, Ticket, TicketOperation};
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;

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

    fn sample_cmd(direction: Direction, order_type: OrderType) -> CreateOrderCommand {
        CreateOrderCommand {
            request_id: "req-1".into(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction,
            order_type,
            limit_price: dec!(1.10),
            ask_volume: dec!(100),
        }
    }

    #[tokio::test]
    async fn create_order_locks_price_times_volume_for_buy() {
        let mut orders = MockOrders::new();
        orders.expect_put().times(1).returning(|_| Ok(()));

        let mut tickets = MockTickets::new();
        tickets
            .expect_push()
            .withf(|op, _| *op == TicketOperation::OrderNotification)
            .returning(|_, _| Ok(Uuid::new_v4()));
        tickets
            .expect_push()
            .withf(|op, _| *op == TicketOperation::LockBalance)
            .returning(|_, payload| {
                let req: LockBalanceRequest = wire::decode(&payload).unwrap();
                assert_eq!(req.amount, "110.00");
                assert_eq!(req.currency_code, "USD");
                Ok(Uuid::new_v4())
            });

        let service = OrderService::new(Arc::new(orders), Arc::new(tickets));
        let order = service.create_order(sample_cmd(Direction::Buy, OrderType::Limit)).await.unwrap();
        assert_eq!(order.state, OrderState::New);
    }

    #[tokio::test]
    async fn create_order_locks_ask_volume_for_sell() {
        let mut orders = MockOrders::new();
        orders.expect_put().times(1).returning(|_| Ok(()));

        let mut tickets = MockTickets::new();
        tickets.expect_push().returning(|op, payload| {
            if op == TicketOperation::LockBalance {
                let req: LockBalanceRequest = wire::decode(&payload).unwrap();
                assert_eq!(req.amount, "100");
                assert_eq!(req.currency_code, "EUR");
            }
            Ok(Uuid::new_v4())
        });

        let service = OrderService::new(Arc::new(orders), Arc::new(tickets));
        service.create_order(sample_cmd(Direction::Sell, OrderType::Limit)).await.unwrap();
    }

    #[tokio::test]
    async fn approve_order_creation_on_missing_order_is_a_noop() {
        let mut orders = MockOrders::new();
        orders
            .expect_get()
            .returning(|id| Err(StoreError::NotFound(id.to_string())));
        let tickets = MockTickets::new();

        let service = OrderService::new(Arc::new(orders), Arc::new(tickets));
        let response = BalanceLockResponse {
            order_id: Uuid::new_v4(),
            balance_id: "bal-1".into(),
            error: None,
        };
        assert!(service.approve_order_creation(response).await.is_ok());
    }

    #[tokio::test]
    async fn approve_order_creation_rejection_deletes_and_maps_error() {
        let order_id = Uuid::new_v4();
        let stored = Order {
            order_id,
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction: Direction::Buy,
            order_type: OrderType::Limit,
            limit_price: dec!(1.10),
            ask_volume: dec!(100),
            filled_volume: dec!(0),
            filled_price: dec!(0),
            state: OrderState::New,
            creation_date: 0,
            updated_date: 0,
            expiration_date: 0,
            matching_date: 0,
            transfer_id: None,
            exchange_id: None,
            parent_id: None,
        };

        let mut orders = MockOrders::new();
        orders.expect_get().returning(move |_| Ok(stored.clone()));
        orders.expect_delete().times(1).returning(|_| Ok(()));

        let mut tickets = MockTickets::new();
        tickets.expect_push().returning(|op, payload| {
            assert_eq!(op, TicketOperation::OrderNotification);
            let info: OrderInfo = wire::decode(&payload).unwrap();
            assert!(info.cause.is_some());
            Ok(Uuid::new_v4())
        });

        let service = OrderService::new(Arc::new(orders), Arc::new(tickets));
        let response = BalanceLockResponse {
            order_id,
            balance_id: "bal-1".into(),
            error: Some(crate::models::BpsErrorCode::NotEnoughBalance),
        };
        service.approve_order_creation(response).await.unwrap();
    }
}
