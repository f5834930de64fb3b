//! Ticket entity — the outbox's unit of work (SPEC_FULL.md §3 / §4.3).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketOperation {
    LockBalance,
    ApproveCreation,
    MatchOrder,
    OrderNotification,
}

impl fmt::Display for TicketOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketOperation::LockBalance => "LOCK_BALANCE",
            TicketOperation::ApproveCreation => "APPROVE_CREATION",
            TicketOperation::MatchOrder => "MATCH_ORDER",
            TicketOperation::OrderNotification => "ORDER_NOTIFICATION",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    New,
    Sent,
}

/// A deferred side-effect record. `payload` carries the marshalled wire
/// bytes for the operation's request type verbatim — no intermediate
/// base64 round trip (see SPEC_FULL.md §9 on Open Question 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub operation: TicketOperation,
    pub state: TicketState,
    #[serde(with = "payload_as_base64")]
    pub payload: Vec<u8>,
}

impl Ticket {
    pub fn new(operation: TicketOperation, payload: Vec<u8>) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            operation,
            state: TicketState::New,
            payload,
        }
    }
}

/// JSON has no native byte-string type; encode `payload` as base64 within
/// the JSON envelope the outbox stores. This is *not* the double-encoding
/// bug in `original_source` (which base64-decoded an already-raw protobuf
/// buffer before handing it to JSON, corrupting it) — this is the ordinary
/// "bytes inside JSON need a text encoding" requirement.
mod payload_as_base64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::Engine;
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
