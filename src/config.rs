//! Startup configuration (SPEC_FULL.md §0, §6).
//!
//! Loaded from environment variables via `envy`, after `dotenvy::dotenv()`
//! has populated the process environment from a local `.env` file if one
//! exists.

use serde::Deserialize;

fn default_ops_exchange() -> String {
    "ops".to_string()
}

fn default_ticket_routing_key() -> String {
    "ops.ticket".to_string()
}

fn default_create_order_routing_key() -> String {
    "ops.create_order".to_string()
}

fn default_balance_lock_response_routing_key() -> String {
    "ops.balance_lock_response".to_string()
}

fn default_match_order_routing_key() -> String {
    "ops.match_order".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store_addr: String,
    pub bus_url: String,

    #[serde(default = "default_ops_exchange")]
    pub ops_exchange: String,
    #[serde(default = "default_ticket_routing_key")]
    pub ticket_routing_key: String,
    #[serde(default = "default_create_order_routing_key")]
    pub create_order_routing_key: String,
    #[serde(default = "default_balance_lock_response_routing_key")]
    pub balance_lock_response_routing_key: String,
    #[serde(default = "default_match_order_routing_key")]
    pub match_order_routing_key: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(envy::from_env::<AppConfig>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_required_fields_and_fills_routing_key_defaults() {
        std::env::set_var("STORE_ADDR", "redis://127.0.0.1:6379");
        std::env::set_var("BUS_URL", "amqp://127.0.0.1:5672/%2f");
        std::env::remove_var("OPS_EXCHANGE");
        std::env::remove_var("TICKET_ROUTING_KEY");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.store_addr, "redis://127.0.0.1:6379");
        assert_eq!(config.ops_exchange, "ops");
        assert_eq!(config.ticket_routing_key, "ops.ticket");
        assert_eq!(config.create_order_routing_key, "ops.create_order");
    }
}
