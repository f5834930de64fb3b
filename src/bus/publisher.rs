//! Ticket outbox publisher (SPEC_FULL.md §2 [ADD], §4.3.1).
//!
//! Drains the ticket outbox on a fixed poll interval and publishes each
//! ticket to `ops.ticket`. A publish that fails is retried immediately a
//! fixed number of times before the ticket is pushed back onto the outbox
//! via `reenqueue`, mirroring `original_source/rabbit/sender.go`'s
//! `SendMessage` plus the graceful-retry loop in `handleGraceful`, reshaped
//! so a single stuck ticket cannot block the rest of the outbox.

use std::sync::Arc;
use std::time::Duration;

use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use lapin::Channel;
use tokio_util::sync::CancellationToken;

use crate::store::TicketStorage;
use crate::wire::{self, WireTicket};

const IMMEDIATE_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub struct TicketPublisher {
    channel: Channel,
    exchange: String,
    routing_key: String,
    tickets: Arc<dyn TicketStorage>,
    poll_interval: Duration,
}

impl TicketPublisher {
    pub fn new(
        channel: Channel,
        exchange: String,
        routing_key: String,
        tickets: Arc<dyn TicketStorage>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channel,
            exchange,
            routing_key,
            tickets,
            poll_interval,
        }
    }

    /// Drains the outbox until `cancellation` fires.
    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::info!("ticket publisher shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!(error = %e, "error draining ticket outbox");
                    }
                }
            }
        }
    }

    async fn drain_once(&self) -> Result<(), crate::errors::StoreError> {
        while let Some(ticket) = self.tickets.pop().await? {
            let ticket_id = ticket.ticket_id;
            let body = wire::encode(&WireTicket::from(&ticket));

            let mut published = false;
            for attempt in 0..IMMEDIATE_RETRIES {
                match self.publish(&body).await {
                    Ok(()) => {
                        published = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(%ticket_id, attempt, error = %e, "ticket publish attempt failed");
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }

            if !published {
                tracing::warn!(%ticket_id, "ticket publish exhausted retries, re-enqueueing");
                self.tickets.reenqueue(ticket).await?;
            }
        }
        Ok(())
    }

    async fn publish(&self, body: &[u8]) -> Result<(), lapin::Error> {
        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }
}
