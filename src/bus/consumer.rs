//! Per-topic consumer loop (SPEC_FULL.md §0.2, §5.1, §2 "Dispatch Layer").
//!
//! Generic over a `TopicHandler`, the same shape as
//! `original_source/rabbit/processor.go`'s `Processor[T]`: parse the
//! delivery body, negative-ack without requeue on a parse failure, otherwise
//! ack first and only then run the handler (§ "Message ack discipline").

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tokio_util::sync::CancellationToken;

use crate::errors::ParseError;

/// One inbound topic's parse/handle pair. `Dispatcher` (`dispatch.rs`)
/// implements one of these per routing key.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    type Message: Send;

    fn parse(&self, body: &[u8]) -> Result<Self::Message, ParseError>;

    async fn handle(&self, message: Self::Message);
}

/// Runs `handler` against deliveries on `queue` until `cancellation` fires
/// or the broker closes the consumer stream.
pub async fn run_consumer<H>(
    channel: Channel,
    queue: &str,
    consumer_tag: &str,
    handler: H,
    cancellation: CancellationToken,
) -> Result<(), lapin::Error>
where
    H: TopicHandler + 'static,
{
    let mut consumer = channel
        .basic_consume(
            queue,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!(queue, "consumer shutting down");
                return Ok(());
            }
            next = consumer.next() => {
                let Some(delivery) = next else {
                    tracing::warn!(queue, "consumer stream closed by broker");
                    return Ok(());
                };
                let delivery = delivery?;

                match handler.parse(&delivery.data) {
                    Err(e) => {
                        tracing::warn!(queue, error = %e, "failed to parse inbound message, nacking without requeue");
                        delivery
                            .nack(BasicNackOptions { requeue: false, ..Default::default() })
                            .await?;
                    }
                    Ok(message) => {
                        delivery.ack(BasicAckOptions::default()).await?;
                        handler.handle(message).await;
                    }
                }
            }
        }
    }
}
