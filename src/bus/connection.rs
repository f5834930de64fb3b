//! AMQP connection with startup retry (SPEC_FULL.md §0.2, §7.1).
//!
//! Mirrors `original_source/rabbit/common.go`'s `GetRabbitConnection`: poll
//! every 100ms until the broker accepts a connection or 5 minutes elapse,
//! then give up for good — the process should not start serving without a
//! bus to talk to.

use std::time::{Duration, Instant};

use lapin::{Connection, ConnectionProperties};
use tokio_executor_trait::Tokio;
use tokio_reactor_trait::Tokio as TokioReactor;

use crate::errors::BusUnavailable;

const RETRY_WINDOW: Duration = Duration::from_secs(5 * 60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connects to the AMQP broker at `url`, retrying on a 100ms poll for up to
/// 5 minutes before surfacing `BusUnavailable`.
pub async fn connect(url: &str) -> Result<Connection, BusUnavailable> {
    let options = ConnectionProperties::default()
        .with_executor(Tokio::current())
        .with_reactor(TokioReactor::current());

    let started = Instant::now();
    let mut last_err = None;

    loop {
        match Connection::connect(url, options.clone()).await {
            Ok(conn) => {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "connected to message bus");
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(error = %e, "message bus connection attempt failed, retrying");
                last_err = Some(e);
            }
        }

        if started.elapsed() >= RETRY_WINDOW {
            return Err(BusUnavailable {
                elapsed_ms: started.elapsed().as_millis() as u64,
                source: last_err.expect("loop only reaches here after at least one failed attempt"),
            });
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
