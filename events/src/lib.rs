//! Shared event model and JSON codec for the auction event channel.
//!
//! This crate owns the wire representation exchanged over the websocket.
//! Every frame is a UTF-8 JSON object whose `type` field names the event and
//! whose remaining fields carry the payload, in both directions.
//!
//! DESIGN
//! ======
//! Inbound events decode into a closed sum type so each handler receives a
//! statically shaped payload. Frames with an unknown `type`, or with required
//! fields missing, are rejected here and never reach client state.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Error returned by [`decode_event`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame text is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame is JSON but has no string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,
    /// The `type` field names an event this client does not handle.
    #[error("unknown event type: {0}")]
    UnknownType(String),
    /// The payload for a known event type is missing or mistyped fields.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Lifecycle state of an auction lot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    /// Bidding is open.
    #[default]
    Active,
    /// Bidding has closed; the item stays visible.
    Ended,
}

/// One sellable lot as mirrored from the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionItem {
    /// Stable unique identifier.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    /// Current leading amount. Only the server moves this.
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub current_bid: i64,
    /// Identity currently leading, if anyone has bid.
    #[serde(default)]
    pub current_bidder: Option<String>,
    /// Close time in milliseconds since the Unix epoch, server clock.
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub auction_end_time: i64,
    #[serde(default)]
    pub status: AuctionStatus,
    /// Remaining milliseconds as last reported by an `UPDATE_BID`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_i64_from_number"
    )]
    pub time_remaining: Option<i64>,
}

/// A selectable bidder identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Item fields carried by an `UPDATE_BID` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidUpdate {
    #[serde(deserialize_with = "deserialize_i64_from_number")]
    pub current_bid: i64,
    #[serde(default)]
    pub current_bidder: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_i64_from_number"
    )]
    pub time_remaining: Option<i64>,
    /// Display title, used only for notification text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Server → client events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum InboundEvent {
    Welcome {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        available_users: Option<Vec<User>>,
    },
    UserRegistered {
        user_id: String,
    },
    ServerTime {
        #[serde(deserialize_with = "deserialize_i64_from_number")]
        server_time: i64,
    },
    InitialData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Vec<AuctionItem>>,
    },
    UpdateBid {
        item_id: String,
        item: BidUpdate,
    },
    BidAccepted {
        item_id: String,
        #[serde(deserialize_with = "deserialize_i64_from_number")]
        amount: i64,
    },
    BidError {
        error: String,
    },
    Outbid {
        item_id: String,
        item_title: String,
    },
    AuctionEnded {
        item_id: String,
        #[serde(default)]
        winner: Option<String>,
        #[serde(deserialize_with = "deserialize_i64_from_number")]
        final_price: i64,
    },
}

impl InboundEvent {
    /// Dispatch tag for this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Welcome { .. } => EventKind::Welcome,
            Self::UserRegistered { .. } => EventKind::UserRegistered,
            Self::ServerTime { .. } => EventKind::ServerTime,
            Self::InitialData { .. } => EventKind::InitialData,
            Self::UpdateBid { .. } => EventKind::UpdateBid,
            Self::BidAccepted { .. } => EventKind::BidAccepted,
            Self::BidError { .. } => EventKind::BidError,
            Self::Outbid { .. } => EventKind::Outbid,
            Self::AuctionEnded { .. } => EventKind::AuctionEnded,
        }
    }
}

/// Closed set of inbound event tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Welcome,
    UserRegistered,
    ServerTime,
    InitialData,
    UpdateBid,
    BidAccepted,
    BidError,
    Outbid,
    AuctionEnded,
}

impl EventKind {
    /// Every inbound tag, in wire-table order.
    pub const ALL: [Self; 9] = [
        Self::Welcome,
        Self::UserRegistered,
        Self::ServerTime,
        Self::InitialData,
        Self::UpdateBid,
        Self::BidAccepted,
        Self::BidError,
        Self::Outbid,
        Self::AuctionEnded,
    ];

    /// Wire value of the `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "WELCOME",
            Self::UserRegistered => "USER_REGISTERED",
            Self::ServerTime => "SERVER_TIME",
            Self::InitialData => "INITIAL_DATA",
            Self::UpdateBid => "UPDATE_BID",
            Self::BidAccepted => "BID_ACCEPTED",
            Self::BidError => "BID_ERROR",
            Self::Outbid => "OUTBID",
            Self::AuctionEnded => "AUCTION_ENDED",
        }
    }

    /// Parse a wire `type` value.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → server events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum OutboundEvent {
    /// Associate this connection with an identity.
    RegisterUser { user_id: String },
    /// Request a bid.
    BidPlaced { item_id: String, amount: i64 },
    /// Request a server time sample.
    GetServerTime,
    /// Request a full item snapshot.
    GetItems,
}

impl OutboundEvent {
    /// Wire value of the `type` field.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RegisterUser { .. } => "REGISTER_USER",
            Self::BidPlaced { .. } => "BID_PLACED",
            Self::GetServerTime => "GET_SERVER_TIME",
            Self::GetItems => "GET_ITEMS",
        }
    }
}

/// Encode an outbound event as a JSON text frame.
#[must_use]
pub fn encode_event(event: &OutboundEvent) -> String {
    // Serializing a derive-only enum of strings and integers into a String
    // cannot fail; the only serde_json errors here are from custom
    // Serialize impls or non-string map keys, neither of which exist.
    serde_json::to_string(event).unwrap_or_default()
}

/// Decode a JSON text frame into an inbound event.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for invalid JSON, [`CodecError::MissingType`]
/// when `type` is absent, [`CodecError::UnknownType`] for tags outside the
/// auction event set, and [`CodecError::Payload`] when required fields are
/// missing or mistyped.
pub fn decode_event(text: &str) -> Result<InboundEvent, CodecError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let raw_type = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(CodecError::MissingType)?;
    let kind =
        EventKind::from_wire(raw_type).ok_or_else(|| CodecError::UnknownType(raw_type.to_owned()))?;
    serde_json::from_value(value).map_err(|source| CodecError::Payload { kind, source })
}

fn deserialize_i64_from_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    integer_from_value(&value).map_err(D::Error::custom)
}

fn deserialize_opt_i64_from_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    integer_from_value(&value).map(Some).map_err(D::Error::custom)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn integer_from_value(value: &serde_json::Value) -> Result<i64, &'static str> {
    let serde_json::Value::Number(number) = value else {
        return Err("expected number");
    };
    if let Some(int) = number.as_i64() {
        return Ok(int);
    }
    if let Some(float) = number.as_f64()
        && float.is_finite()
        && float.fract() == 0.0
        && float >= i64::MIN as f64
        && float <= i64::MAX as f64
    {
        return Ok(float as i64);
    }
    Err("expected integer-compatible number")
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
