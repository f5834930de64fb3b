//! Ticket outbox (SPEC_FULL.md §4.3) — a FIFO list of deferred side-effect
//! tickets, pushed by `OrderService`/`MatcherService` and drained by the
//! publisher task that hands them to the message bus.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Ticket, TicketOperation};
use crate::store::keys;
use crate::store::redis_client::KvStore;
use crate::store::TicketStorage;

pub struct TicketOutbox {
    kv: Arc<KvStore>,
}

impl TicketOutbox {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl TicketStorage for TicketOutbox {
    async fn push(&self, operation: TicketOperation, payload: Vec<u8>) -> Result<Uuid, StoreError> {
        let ticket = Ticket::new(operation, payload);
        let json = serde_json::to_string(&ticket)?;
        self.kv.lpush(keys::TICKETS_LIST, &json).await?;
        Ok(ticket.ticket_id)
    }

    async fn pop(&self) -> Result<Option<Ticket>, StoreError> {
        match self.kv.rpop(keys::TICKETS_LIST).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Puts a ticket whose publish attempt failed back at the front of the
    /// queue (§4.3.1 — re-enqueue on publish failure) so it is the next one
    /// the publisher retries, rather than going to the back behind tickets
    /// that arrived after it.
    async fn reenqueue(&self, ticket: Ticket) -> Result<(), StoreError> {
        let json = serde_json::to_string(&ticket)?;
        self.kv.rpush(keys::TICKETS_LIST, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_a_fresh_ticket_id() {
        let a = Ticket::new(TicketOperation::MatchOrder, vec![1]);
        let b = Ticket::new(TicketOperation::MatchOrder, vec![1]);
        assert_ne!(a.ticket_id, b.ticket_id);
    }
}
