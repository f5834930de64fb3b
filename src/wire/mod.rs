//! Protobuf-framed message definitions for the bus (SPEC_FULL.md §6 / 0.1).
//!
//! These are hand-written `prost::Message` structs rather than generated
//! from a `.proto` IDL — the message set is small, fixed, and owned by this
//! service, which is a common shortcut when there's no shared schema
//! registry to generate against. Decimal and UUID fields travel as strings
//! on the wire (protobuf has no native decimal type, and borrowing the
//! `Display`/`FromStr` round trip keeps full precision) and are converted
//! at the model boundary below.

use crate::errors::ParseError;
use crate::models::{
    BpsErrorCode, Direction, Order, OrderState, OrderType, OpsError, OpsErrorCode, Ticket,
    TicketOperation, TicketState,
};
use prost::Message;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(raw).map_err(|e| ParseError(format!("invalid {field} {raw:?}: {e}")))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ParseError> {
    Uuid::from_str(raw).map_err(|e| ParseError(format!("invalid {field} {raw:?}: {e}")))
}

fn direction_from_i32(field: &str, raw: i32) -> Result<Direction, ParseError> {
    match raw {
        0 => Ok(Direction::Buy),
        1 => Ok(Direction::Sell),
        other => Err(ParseError(format!("invalid {field} direction code {other}"))),
    }
}

fn order_type_from_i32(field: &str, raw: i32) -> Result<OrderType, ParseError> {
    match raw {
        0 => Ok(OrderType::Limit),
        1 => Ok(OrderType::Market),
        other => Err(ParseError(format!("invalid {field} order type code {other}"))),
    }
}

fn order_state_from_i32(raw: i32) -> Result<OrderState, ParseError> {
    match raw {
        0 => Ok(OrderState::New),
        1 => Ok(OrderState::Approved),
        2 => Ok(OrderState::Rejected),
        3 => Ok(OrderState::PartFilled),
        4 => Ok(OrderState::Filled),
        5 => Ok(OrderState::Expired),
        other => Err(ParseError(format!("invalid order state code {other}"))),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct WireOpsError {
    #[prost(string, tag = "1")]
    pub error_code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl From<&OpsError> for WireOpsError {
    fn from(e: &OpsError) -> Self {
        WireOpsError {
            error_code: e.error_code.to_string(),
            message: e.message.clone(),
        }
    }
}

impl TryFrom<&WireOpsError> for OpsError {
    type Error = ParseError;

    fn try_from(w: &WireOpsError) -> Result<Self, Self::Error> {
        let error_code = match w.error_code.as_str() {
            "ASSET_NOT_RELATED_TO_ACCOUNT" => OpsErrorCode::AssetNotRelatedToAccount,
            "ASSET_NOT_EXISTS" => OpsErrorCode::AssetNotExists,
            "ASSET_BALANCE_NOT_ENOUGH" => OpsErrorCode::AssetBalanceNotEnough,
            _ => OpsErrorCode::Internal,
        };
        Ok(OpsError {
            error_code,
            message: w.message.clone(),
        })
    }
}

/// `ops.create_order` inbound payload.
#[derive(Clone, PartialEq, Message)]
pub struct CreateOrderRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub account_id: String,
    #[prost(string, tag = "3")]
    pub asset_id: String,
    #[prost(string, tag = "4")]
    pub currency_pair: String,
    #[prost(int32, tag = "5")]
    pub direction: i32,
    #[prost(int32, tag = "6")]
    pub order_type: i32,
    #[prost(string, tag = "7")]
    pub limit_price: String,
    #[prost(string, tag = "8")]
    pub ask_volume: String,
}

/// Domain-level, already-validated counterpart of `CreateOrderRequest`.
pub struct CreateOrderCommand {
    pub request_id: String,
    pub account_id: String,
    pub asset_id: String,
    pub currency_pair: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub limit_price: Decimal,
    pub ask_volume: Decimal,
}

impl TryFrom<&CreateOrderRequest> for CreateOrderCommand {
    type Error = ParseError;

    fn try_from(r: &CreateOrderRequest) -> Result<Self, Self::Error> {
        Ok(CreateOrderCommand {
            request_id: r.id.clone(),
            account_id: r.account_id.clone(),
            asset_id: r.asset_id.clone(),
            currency_pair: r.currency_pair.clone(),
            direction: direction_from_i32("CreateOrderRequest.direction", r.direction)?,
            order_type: order_type_from_i32("CreateOrderRequest.order_type", r.order_type)?,
            limit_price: parse_decimal("CreateOrderRequest.limit_price", &r.limit_price)?,
            ask_volume: parse_decimal("CreateOrderRequest.ask_volume", &r.ask_volume)?,
        })
    }
}

/// `OrderInfo` — the envelope carried on `ORDER_NOTIFICATION` and
/// `MATCH_ORDER` tickets; also the shape handed back in to `match_order`.
#[derive(Clone, PartialEq, Message)]
pub struct OrderInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub order_id: String,
    #[prost(string, tag = "3")]
    pub account_id: String,
    #[prost(string, tag = "4")]
    pub asset_id: String,
    #[prost(string, tag = "5")]
    pub currency_pair: String,
    #[prost(int32, tag = "6")]
    pub direction: i32,
    #[prost(int32, tag = "7")]
    pub order_type: i32,
    #[prost(string, tag = "8")]
    pub limit_price: String,
    #[prost(string, tag = "9")]
    pub ask_volume: String,
    #[prost(string, tag = "10")]
    pub filled_volume: String,
    #[prost(string, tag = "11")]
    pub filled_price: String,
    #[prost(int32, tag = "12")]
    pub state: i32,
    #[prost(int64, tag = "13")]
    pub creation_date: i64,
    #[prost(int64, tag = "14")]
    pub updated_date: i64,
    #[prost(int64, tag = "15")]
    pub expiration_date: i64,
    #[prost(int64, tag = "16")]
    pub matching_date: i64,
    #[prost(string, tag = "17")]
    pub transfer_id: String,
    #[prost(string, tag = "18")]
    pub exchange_id: String,
    #[prost(string, tag = "19")]
    pub parent_id: String,
    #[prost(message, optional, tag = "20")]
    pub cause: Option<WireOpsError>,
}

impl From<&Order> for OrderInfo {
    fn from(o: &Order) -> Self {
        OrderInfo {
            id: Uuid::new_v4().to_string(),
            order_id: o.order_id.to_string(),
            account_id: o.account_id.clone(),
            asset_id: o.asset_id.clone(),
            currency_pair: o.currency_pair.clone(),
            direction: o.direction as i32,
            order_type: o.order_type as i32,
            limit_price: o.limit_price.to_string(),
            ask_volume: o.ask_volume.to_string(),
            filled_volume: o.filled_volume.to_string(),
            filled_price: o.filled_price.to_string(),
            state: o.state as i32,
            creation_date: o.creation_date,
            updated_date: o.updated_date,
            expiration_date: o.expiration_date,
            matching_date: o.matching_date,
            transfer_id: o.transfer_id.map(|id| id.to_string()).unwrap_or_default(),
            exchange_id: o.exchange_id.clone().unwrap_or_default(),
            parent_id: o.parent_id.map(|id| id.to_string()).unwrap_or_default(),
            cause: None,
        }
    }
}

impl OrderInfo {
    /// Attaches a mapped BPS rejection cause, as `approve_order_creation`
    /// does on the REJECTED path (§4.4).
    pub fn with_cause(mut self, cause: &OpsError) -> Self {
        self.cause = Some(WireOpsError::from(cause));
        self
    }
}

impl TryFrom<&OrderInfo> for Order {
    type Error = ParseError;

    fn try_from(w: &OrderInfo) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: parse_uuid("OrderInfo.order_id", &w.order_id)?,
            account_id: w.account_id.clone(),
            asset_id: w.asset_id.clone(),
            currency_pair: w.currency_pair.clone(),
            direction: direction_from_i32("OrderInfo.direction", w.direction)?,
            order_type: order_type_from_i32("OrderInfo.order_type", w.order_type)?,
            limit_price: parse_decimal("OrderInfo.limit_price", &w.limit_price)?,
            ask_volume: parse_decimal("OrderInfo.ask_volume", &w.ask_volume)?,
            filled_volume: parse_decimal("OrderInfo.filled_volume", &w.filled_volume)?,
            filled_price: parse_decimal("OrderInfo.filled_price", &w.filled_price)?,
            state: order_state_from_i32(w.state)?,
            creation_date: w.creation_date,
            updated_date: w.updated_date,
            expiration_date: w.expiration_date,
            matching_date: w.matching_date,
            transfer_id: if w.transfer_id.is_empty() {
                None
            } else {
                Some(parse_uuid("OrderInfo.transfer_id", &w.transfer_id)?)
            },
            exchange_id: if w.exchange_id.is_empty() {
                None
            } else {
                Some(w.exchange_id.clone())
            },
            parent_id: if w.parent_id.is_empty() {
                None
            } else {
                Some(parse_uuid("OrderInfo.parent_id", &w.parent_id)?)
            },
        })
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct LockBalanceRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub asset_id: String,
    #[prost(string, tag = "3")]
    pub account_id: String,
    #[prost(string, tag = "4")]
    pub currency_code: String,
    #[prost(string, tag = "5")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct LockBalanceResponse {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub balance_id: String,
    #[prost(message, optional, tag = "3")]
    pub error: Option<WireBpsError>,
}

/// Domain-level counterpart of `LockBalanceResponse`, consumed by
/// `OrderService::approve_order_creation`.
pub struct BalanceLockResponse {
    pub order_id: Uuid,
    pub balance_id: String,
    pub error: Option<BpsErrorCode>,
}

impl TryFrom<&LockBalanceResponse> for BalanceLockResponse {
    type Error = ParseError;

    fn try_from(r: &LockBalanceResponse) -> Result<Self, Self::Error> {
        Ok(BalanceLockResponse {
            order_id: parse_uuid("LockBalanceResponse.id", &r.id)?,
            balance_id: r.balance_id.clone(),
            error: r.error.as_ref().map(WireBpsError::code),
        })
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct WireBpsError {
    #[prost(string, tag = "1")]
    pub error_code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl WireBpsError {
    pub fn code(&self) -> BpsErrorCode {
        BpsErrorCode::from(self.error_code.as_str())
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TransferLeg {
    #[prost(string, tag = "1")]
    pub balance_id: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateTransferRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, repeated, tag = "2")]
    pub transfer_data: Vec<TransferLeg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireTicket {
    #[prost(string, tag = "1")]
    pub ticket_id: String,
    #[prost(string, tag = "2")]
    pub operation: String,
    #[prost(string, tag = "3")]
    pub state: String,
    #[prost(bytes, tag = "4")]
    pub payload: Vec<u8>,
}

impl From<&Ticket> for WireTicket {
    fn from(t: &Ticket) -> Self {
        WireTicket {
            ticket_id: t.ticket_id.to_string(),
            operation: t.operation.to_string(),
            state: match t.state {
                TicketState::New => "NEW".to_string(),
                TicketState::Sent => "SENT".to_string(),
            },
            payload: t.payload.clone(),
        }
    }
}

/// Encodes a `prost::Message` to its binary wire form.
pub fn encode<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

/// Decodes a binary payload into the requested message type, surfacing a
/// `ParseError` on malformed input — the only error the dispatch layer's
/// ack discipline cares about (§5 "Message ack discipline").
pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M, ParseError> {
    M::decode(bytes).map_err(|e| ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn create_order_request_round_trips_through_wire_bytes() {
        let req = CreateOrderRequest {
            id: "req-1".into(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction: Direction::Buy as i32,
            order_type: OrderType::Limit as i32,
            limit_price: "1.10".into(),
            ask_volume: "100".into(),
        };

        let bytes = encode(&req);
        let decoded: CreateOrderRequest = decode(&bytes).unwrap();
        assert_eq!(decoded, req);

        let cmd = CreateOrderCommand::try_from(&decoded).unwrap();
        assert_eq!(cmd.limit_price, dec!(1.10));
        assert_eq!(cmd.ask_volume, dec!(100));
        assert_eq!(cmd.direction, Direction::Buy);
    }

    #[test]
    fn order_info_round_trips_order_fields() {
        let order = Order {
            order_id: Uuid::new_v4(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction: Direction::Sell,
            order_type: OrderType::Limit,
            limit_price: dec!(1.10),
            ask_volume: dec!(100),
            filled_volume: dec!(40),
            filled_price: dec!(1.10),
            state: OrderState::PartFilled,
            creation_date: 1_000,
            updated_date: 2_000,
            expiration_date: 3_000,
            matching_date: 1_500,
            transfer_id: Some(Uuid::new_v4()),
            exchange_id: Some("exch-1".into()),
            parent_id: None,
        };

        let wire = OrderInfo::from(&order);
        let bytes = encode(&wire);
        let decoded: OrderInfo = decode(&bytes).unwrap();
        let back = Order::try_from(&decoded).unwrap();

        assert_eq!(back.order_id, order.order_id);
        assert_eq!(back.limit_price, order.limit_price);
        assert_eq!(back.filled_volume, order.filled_volume);
        assert_eq!(back.state, OrderState::PartFilled);
        assert_eq!(back.transfer_id, order.transfer_id);
        assert_eq!(back.parent_id, None);
    }

    #[test]
    fn invalid_decimal_field_is_a_parse_error() {
        let req = CreateOrderRequest {
            id: "req-1".into(),
            account_id: "acct-1".into(),
            asset_id: "asset-1".into(),
            currency_pair: "USD/EUR".into(),
            direction: 0,
            order_type: 0,
            limit_price: "not-a-number".into(),
            ask_volume: "100".into(),
        };

        assert!(CreateOrderCommand::try_from(&req).is_err());
    }
}
