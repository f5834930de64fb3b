pub mod keys;
pub mod order_store;
pub mod redis_client;
pub mod ticket_outbox;

pub use order_store::OrderStore;
pub use redis_client::{KvStore, StoreConfig};
pub use ticket_outbox::TicketOutbox;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Direction, Order, Ticket, TicketOperation};

/// Storage interface the services depend on (SPEC_FULL.md §9 "Cyclic
/// service wiring" — services never see the concrete Redis-backed type,
/// only this trait, matching `original_source/service/orderservice.go`'s
/// `iOrderStorage` interface). A `mockall`-generated fake implements this
/// for service-level unit tests.
#[async_trait]
pub trait OrderStorage: Send + Sync {
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

/// Outbox interface the services depend on (same rationale as
/// `OrderStorage`; matches `iTicketStorage` in the original source).
#[async_trait]
pub trait TicketStorage: Send + Sync {
    async fn push(&self, operation: TicketOperation, payload: Vec<u8>) -> Result<Uuid, StoreError>;
    async fn pop(&self) -> Result<Option<Ticket>, StoreError>;
    async fn reenqueue(&self, ticket: Ticket) -> Result<(), StoreError>;
}
