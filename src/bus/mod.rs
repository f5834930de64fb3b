//! Message bus layer (SPEC_FULL.md §0.2 / §5.1) — AMQP connection, per-topic
//! consumers, and the ticket outbox publisher, built on `lapin` with the
//! Tokio runtime wired in via `tokio-executor-trait`/`tokio-reactor-trait`.

pub mod connection;
pub mod consumer;
pub mod publisher;

pub use connection::connect;
pub use consumer::{run_consumer, TopicHandler};
pub use publisher::TicketPublisher;
