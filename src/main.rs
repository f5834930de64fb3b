use std::sync::Arc;
use std::time::Duration;

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::ExchangeKind;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bus;
mod config;
mod dispatch;
mod errors;
mod models;
mod services;
mod store;
mod wire;

use crate::bus::{run_consumer, TicketPublisher};
use crate::config::AppConfig;
use crate::dispatch::{BalanceLockResponseHandler, CreateOrderHandler, MatchOrderHandler};
use crate::services::{MatcherService, OrderService};
use crate::store::{KvStore, OrderStore, StoreConfig, TicketOutbox};

const TICKET_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ops_matching_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("starting ops-matching-core v{}", env!("CARGO_PKG_VERSION"));

    let kv = Arc::new(
        KvStore::connect(StoreConfig {
            url: config.store_addr.clone(),
            ..StoreConfig::default()
        })
        .await?,
    );
    tracing::info!("key-value store connected");

    let order_store: Arc<dyn store::OrderStorage> = Arc::new(OrderStore::new(kv.clone()));
    let ticket_outbox: Arc<dyn store::TicketStorage> = Arc::new(TicketOutbox::new(kv));

    let order_service = Arc::new(OrderService::new(order_store.clone(), ticket_outbox.clone()));
    let matcher_service = Arc::new(MatcherService::new(order_store, ticket_outbox.clone()));

    let connection = bus::connect(&config.bus_url).await?;
    tracing::info!("message bus connected");

    let shutdown = CancellationToken::new();

    let inbound_channel = connection.create_channel().await?;
    inbound_channel
        .exchange_declare(
            &config.ops_exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    let topics: [(&str, &str); 3] = [
        ("create_order", config.create_order_routing_key.as_str()),
        ("balance_lock_response", config.balance_lock_response_routing_key.as_str()),
        ("match_order", config.match_order_routing_key.as_str()),
    ];
    for (queue_name, routing_key) in topics {
        let queue = inbound_channel
            .queue_declare(queue_name, QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() }, FieldTable::default())
            .await?;
        inbound_channel
            .queue_bind(queue.name().as_str(), &config.ops_exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await?;
    }

    let mut consumer_tasks = Vec::new();

    {
        let channel = connection.create_channel().await?;
        let handler = CreateOrderHandler::new(order_service.clone());
        let token = shutdown.clone();
        consumer_tasks.push(tokio::spawn(async move {
            if let Err(e) = run_consumer(channel, "create_order", "create_order-consumer", handler, token).await {
                tracing::error!(error = %e, "create_order consumer exited with an error");
            }
        }));
    }
    {
        let channel = connection.create_channel().await?;
        let handler = BalanceLockResponseHandler::new(order_service.clone());
        let token = shutdown.clone();
        consumer_tasks.push(tokio::spawn(async move {
            if let Err(e) = run_consumer(channel, "balance_lock_response", "balance_lock_response-consumer", handler, token).await {
                tracing::error!(error = %e, "balance_lock_response consumer exited with an error");
            }
        }));
    }
    {
        let channel = connection.create_channel().await?;
        let handler = MatchOrderHandler::new(matcher_service.clone());
        let token = shutdown.clone();
        consumer_tasks.push(tokio::spawn(async move {
            if let Err(e) = run_consumer(channel, "match_order", "match_order-consumer", handler, token).await {
                tracing::error!(error = %e, "match_order consumer exited with an error");
            }
        }));
    }

    let publisher_channel = connection.create_channel().await?;
    let publisher = TicketPublisher::new(
        publisher_channel,
        config.ops_exchange.clone(),
        config.ticket_routing_key.clone(),
        ticket_outbox,
        TICKET_POLL_INTERVAL,
    );
    let publisher_token = shutdown.clone();
    let publisher_task = tokio::spawn(async move {
        publisher.run(publisher_token).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight work");
    shutdown.cancel();

    for task in consumer_tasks {
        let _ = task.await;
    }
    let _ = publisher_task.await;

    Ok(())
}
