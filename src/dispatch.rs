//! Dispatch Layer (SPEC_FULL.md §2, component 6) — routes each inbound
//! topic to the `OrderService`/`MatcherService` method that owns it.
//!
//! One `TopicHandler` per routing key (`ops.create_order`,
//! `ops.balance_lock_response`, `ops.match_order`), each bound to its own
//! queue by the composition root. Errors the handler itself returns are
//! logged, not nacked — the delivery is already acked by the time the
//! handler runs (§ "Message ack discipline").

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::TopicHandler;
use crate::errors::ParseError;
use crate::models::Order;
use crate::services::{MatcherService, OrderService};
use crate::wire::{self, BalanceLockResponse, CreateOrderCommand, CreateOrderRequest, LockBalanceResponse, OrderInfo};

/// `ops.create_order`.
pub struct CreateOrderHandler {
    orders: Arc<OrderService>,
}

impl CreateOrderHandler {
    pub fn new(orders: Arc<OrderService>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl TopicHandler for CreateOrderHandler {
    type Message = CreateOrderCommand;

    fn parse(&self, body: &[u8]) -> Result<Self::Message, ParseError> {
        let wire: CreateOrderRequest = wire::decode(body)?;
        CreateOrderCommand::try_from(&wire)
    }

    async fn handle(&self, message: Self::Message) {
        if let Err(e) = self.orders.create_order(message).await {
            tracing::error!(error = %e, "failed to handle create_order");
        }
    }
}

/// `ops.balance_lock_response`.
pub struct BalanceLockResponseHandler {
    orders: Arc<OrderService>,
}

impl BalanceLockResponseHandler {
    pub fn new(orders: Arc<OrderService>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl TopicHandler for BalanceLockResponseHandler {
    type Message = BalanceLockResponse;

    fn parse(&self, body: &[u8]) -> Result<Self::Message, ParseError> {
        let wire: LockBalanceResponse = wire::decode(body)?;
        BalanceLockResponse::try_from(&wire)
    }

    async fn handle(&self, message: Self::Message) {
        if let Err(e) = self.orders.approve_order_creation(message).await {
            tracing::error!(error = %e, "failed to handle balance_lock_response");
        }
    }
}

/// `ops.match_order`.
pub struct MatchOrderHandler {
    matcher: Arc<MatcherService>,
}

impl MatchOrderHandler {
    pub fn new(matcher: Arc<MatcherService>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl TopicHandler for MatchOrderHandler {
    type Message = Order;

    fn parse(&self, body: &[u8]) -> Result<Self::Message, ParseError> {
        let wire: OrderInfo = wire::decode(body)?;
        Order::try_from(&wire)
    }

    async fn handle(&self, message: Self::Message) {
        if let Err(e) = self.matcher.match_order(message).await {
            tracing::error!(error = %e, "failed to handle match_order");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::models::{Direction, Ticket, TicketOperation};
    use crate::store::{OrderStorage, TicketStorage};
    use mockall::mock;
    use rust_decimal::Decimal;
    use uuid::Uuid;

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

    #[test]
    fn create_order_handler_rejects_malformed_payload() {
        let orders = Arc::new(OrderService::new(
            Arc::new(MockOrders::new()),
            Arc::new(MockTickets::new()),
        ));
        let handler = CreateOrderHandler::new(orders);
        assert!(handler.parse(b"\xff\xff\xff not a protobuf frame").is_err());
    }

    #[test]
    fn match_order_handler_rejects_malformed_payload() {
        let matcher = Arc::new(MatcherService::new(
            Arc::new(MockOrders::new()),
            Arc::new(MockTickets::new()),
        ));
        let handler = MatchOrderHandler::new(matcher);
        assert!(handler.parse(b"\xff\xff\xff not a protobuf frame").is_err());
    }
}
