//! Inbound marketplace events.
//!
//! The backend posts either an envelope `{event_type, data}` or, for older
//! deployments, a bare listing object which is treated as `listing.created`.
//! [`Event::from_envelope`] turns an envelope into a typed [`Event`] or a
//! [`RejectReason`]; nothing past this point ever sees a string event tag.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// EventKind
// ============================================================================

/// The closed set of event kinds the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "listing.created")]
    ListingCreated,
    #[serde(rename = "listing.updated")]
    ListingUpdated,
    #[serde(rename = "dispute.created")]
    DisputeCreated,
    #[serde(rename = "dispute.updated")]
    DisputeUpdated,
    #[serde(rename = "dispute.resolved")]
    DisputeResolved,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ListingCreated,
        EventKind::ListingUpdated,
        EventKind::DisputeCreated,
        EventKind::DisputeUpdated,
        EventKind::DisputeResolved,
    ];

    /// Wire name, as sent in `event_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ListingCreated => "listing.created",
            EventKind::ListingUpdated => "listing.updated",
            EventKind::DisputeCreated => "dispute.created",
            EventKind::DisputeUpdated => "dispute.updated",
            EventKind::DisputeResolved => "dispute.resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of `listing.created` and `listing.updated`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingPayload {
    #[serde(deserialize_with = "de_id")]
    pub listing_id: String,
    pub title: String,
    /// Number or numeric string; formatting tolerates anything.
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload of `dispute.created` and `dispute.updated`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisputePayload {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub dispute_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `buyer` or `seller`.
    #[serde(default)]
    pub initiated_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub buyer_discord_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub seller_discord_id: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub seller_name: Option<String>,
    /// Dispute status, for `dispute.updated`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    /// Thread created for this dispute by an earlier `dispute.created`.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload of `dispute.resolved`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisputeResolvedPayload {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub dispute_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `buyer`, `seller`, `refund` or anything else.
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Event
// ============================================================================

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ListingCreated(ListingPayload),
    ListingUpdated(ListingPayload),
    DisputeCreated(DisputePayload),
    DisputeUpdated(DisputePayload),
    DisputeResolved(DisputeResolvedPayload),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ListingCreated(_) => EventKind::ListingCreated,
            Event::ListingUpdated(_) => EventKind::ListingUpdated,
            Event::DisputeCreated(_) => EventKind::DisputeCreated,
            Event::DisputeUpdated(_) => EventKind::DisputeUpdated,
            Event::DisputeResolved(_) => EventKind::DisputeResolved,
        }
    }

    /// Category code carried by the payload, if any.
    pub fn category(&self) -> Option<&str> {
        let category = match self {
            Event::ListingCreated(p) | Event::ListingUpdated(p) => p.category.as_deref(),
            Event::DisputeCreated(p) | Event::DisputeUpdated(p) => p.category.as_deref(),
            Event::DisputeResolved(p) => p.category.as_deref(),
        };
        category.map(str::trim).filter(|c| !c.is_empty())
    }

    /// Scope the event is restricted to, if the backend named one.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Event::ListingCreated(p) | Event::ListingUpdated(p) => p.scope.as_deref(),
            Event::DisputeCreated(p) | Event::DisputeUpdated(p) => p.scope.as_deref(),
            Event::DisputeResolved(p) => p.scope.as_deref(),
        }
    }

    /// Thread the backend remembered for this dispute, if any.
    pub fn known_thread(&self) -> Option<&str> {
        match self {
            Event::DisputeUpdated(p) => p.thread_id.as_deref(),
            Event::DisputeResolved(p) => p.thread_id.as_deref(),
            _ => None,
        }
    }

    /// Build a typed event from an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, RejectReason> {
        let Some(kind) = EventKind::parse(&envelope.event_type) else {
            return Err(RejectReason::UnknownEventType(envelope.event_type.clone()));
        };
        let data = match &envelope.data {
            Some(Value::Null) | None => return Err(RejectReason::MissingPayload(kind)),
            Some(data @ Value::Object(_)) => data,
            Some(_) => {
                return Err(RejectReason::InvalidPayload {
                    kind,
                    message: "data must be a JSON object".to_string(),
                });
            }
        };

        let mut event = match kind {
            EventKind::ListingCreated => Event::ListingCreated(parse_listing(kind, data)?),
            EventKind::ListingUpdated => Event::ListingUpdated(parse_listing(kind, data)?),
            EventKind::DisputeCreated => Event::DisputeCreated(parse_payload(kind, data)?),
            EventKind::DisputeUpdated => Event::DisputeUpdated(parse_payload(kind, data)?),
            EventKind::DisputeResolved => Event::DisputeResolved(parse_payload(kind, data)?),
        };

        if let Some(scope) = &envelope.scope {
            event.set_scope(scope.clone());
        }
        Ok(event)
    }

    fn set_scope(&mut self, scope: String) {
        match self {
            Event::ListingCreated(p) | Event::ListingUpdated(p) => p.scope = Some(scope),
            Event::DisputeCreated(p) | Event::DisputeUpdated(p) => p.scope = Some(scope),
            Event::DisputeResolved(p) => p.scope = Some(scope),
        }
    }
}

/// Older backends use these spellings. When both spellings are present the
/// canonical key wins unless it is null or blank.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("guild_id", "scope"),
    ("images", "image_urls"),
    ("seller_username", "seller_name"),
    ("buyer_username", "buyer_name"),
    ("opened_by", "initiated_by"),
    ("discord_thread_id", "thread_id"),
    ("resolved_by_name", "resolved_by"),
    ("notes", "resolution_notes"),
];

fn parse_payload<T: DeserializeOwned>(kind: EventKind, data: &Value) -> Result<T, RejectReason> {
    serde_json::from_value(merge_aliases(data)).map_err(|e| RejectReason::InvalidPayload {
        kind,
        message: e.to_string(),
    })
}

fn merge_aliases(data: &Value) -> Value {
    let mut data = data.clone();
    if let Value::Object(map) = &mut data {
        for (alias, canonical) in FIELD_ALIASES {
            let Some(value) = map.remove(*alias) else {
                continue;
            };
            if map.get(*canonical).is_none_or(is_blank) {
                map.insert(canonical.to_string(), value);
            }
        }
    }
    data
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn parse_listing(kind: EventKind, data: &Value) -> Result<ListingPayload, RejectReason> {
    let listing: ListingPayload = parse_payload(kind, data)?;
    if listing.title.trim().is_empty() {
        return Err(RejectReason::InvalidPayload {
            kind,
            message: "title must not be empty".to_string(),
        });
    }
    Ok(listing)
}

// ============================================================================
// Envelope
// ============================================================================

/// Inbound webhook body after transport-level parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event_type: String,
    pub data: Option<Value>,
    /// Restricts dispatch to one scope when set.
    pub scope: Option<String>,
}

impl Envelope {
    /// Interpret a JSON body as either a wrapped envelope or a legacy listing.
    pub fn from_body(body: Value) -> Result<Self, RejectReason> {
        let Value::Object(mut map) = body else {
            return Err(RejectReason::InvalidEnvelope(
                "body must be a JSON object".to_string(),
            ));
        };

        let Some(event_type) = map.remove("event_type") else {
            return Ok(Self::legacy_listing(Value::Object(map)));
        };
        let Value::String(event_type) = event_type else {
            return Err(RejectReason::InvalidEnvelope(
                "event_type must be a string".to_string(),
            ));
        };

        let scope = match map.remove("scope") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Self {
            event_type,
            data: map.remove("data"),
            scope,
        })
    }

    /// Treat a bare body as an implicit `listing.created`.
    pub fn legacy_listing(body: Value) -> Self {
        Self {
            event_type: EventKind::ListingCreated.as_str().to_string(),
            data: Some(body),
            scope: None,
        }
    }
}

/// Why an inbound event was refused before dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("unknown event_type: {0}")]
    UnknownEventType(String),

    #[error("missing data payload for {0}")]
    MissingPayload(EventKind),

    #[error("invalid {kind} payload: {message}")]
    InvalidPayload { kind: EventKind, message: String },

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}

// ============================================================================
// Deserialization helpers
// ============================================================================

/// Accept ids sent as either JSON numbers or strings.
fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, got {other}"
        ))),
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

/// RFC 3339 strings or unix timestamps (seconds or milliseconds); anything
/// else is dropped rather than failing the event.
fn de_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(|v| {
            if v > 100_000_000_000 {
                Utc.timestamp_millis_opt(v).single()
            } else {
                Utc.timestamp_opt(v, 0).single()
            }
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, data: Value) -> Envelope {
        Envelope {
            event_type: event_type.to_string(),
            data: Some(data),
            scope: None,
        }
    }

    #[test]
    fn kind_round_trips_through_wire_name() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("listing.deleted"), None);
    }

    #[test]
    fn listing_with_numeric_id_and_string_price() {
        let event = Event::from_envelope(&envelope(
            "listing.created",
            json!({"listing_id": 5, "title": "X", "price": "10", "category": "wos_accounts"}),
        ))
        .unwrap();

        let Event::ListingCreated(listing) = &event else {
            panic!("expected listing.created, got {event:?}");
        };
        assert_eq!(listing.listing_id, "5");
        assert_eq!(listing.price, Some(json!("10")));
        assert_eq!(event.category(), Some("wos_accounts"));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = Event::from_envelope(&envelope("order.shipped", json!({}))).unwrap_err();
        assert_eq!(
            err,
            RejectReason::UnknownEventType("order.shipped".to_string())
        );
    }

    #[test]
    fn null_or_missing_data_is_rejected() {
        let mut env = envelope("dispute.created", Value::Null);
        assert_eq!(
            Event::from_envelope(&env).unwrap_err(),
            RejectReason::MissingPayload(EventKind::DisputeCreated)
        );
        env.data = None;
        assert!(matches!(
            Event::from_envelope(&env),
            Err(RejectReason::MissingPayload(_))
        ));
    }

    #[test]
    fn listing_without_title_is_rejected() {
        let err =
            Event::from_envelope(&envelope("listing.created", json!({"listing_id": 1}))).unwrap_err();
        assert!(matches!(err, RejectReason::InvalidPayload { .. }));

        let err = Event::from_envelope(&envelope(
            "listing.created",
            json!({"listing_id": 1, "title": "  "}),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn blank_category_counts_as_absent() {
        let event = Event::from_envelope(&envelope(
            "listing.updated",
            json!({"listing_id": "a1", "title": "T", "category": ""}),
        ))
        .unwrap();
        assert_eq!(event.category(), None);
    }

    #[test]
    fn dispute_without_dispute_id_is_accepted() {
        let event = Event::from_envelope(&envelope(
            "dispute.resolved",
            json!({"order_id": 70, "resolution": "refund"}),
        ))
        .unwrap();
        let Event::DisputeResolved(resolved) = event else {
            unreachable!()
        };
        assert_eq!(resolved.dispute_id, None);
        assert_eq!(resolved.order_id.as_deref(), Some("70"));

        let event =
            Event::from_envelope(&envelope("dispute.created", json!({"dispute_id": " "}))).unwrap();
        let Event::DisputeCreated(dispute) = event else {
            unreachable!()
        };
        assert_eq!(dispute.dispute_id, None);
    }

    #[test]
    fn legacy_and_canonical_keys_can_coexist() {
        let event = Event::from_envelope(&envelope(
            "listing.created",
            json!({"listing_id": 1, "title": "T", "guild_id": "g1", "scope": "g1"}),
        ))
        .unwrap();
        assert_eq!(event.scope(), Some("g1"));

        let event = Event::from_envelope(&envelope(
            "listing.created",
            json!({"listing_id": 1, "title": "T", "guild_id": "g2", "scope": "g1"}),
        ))
        .unwrap();
        assert_eq!(event.scope(), Some("g1"));

        let event = Event::from_envelope(&envelope(
            "dispute.resolved",
            json!({
                "order_id": 3,
                "scope": "",
                "guild_id": 44,
                "notes": "ok",
                "resolution_notes": null
            }),
        ))
        .unwrap();
        assert_eq!(event.scope(), Some("44"));
        let Event::DisputeResolved(resolved) = event else {
            unreachable!()
        };
        assert_eq!(resolved.resolution_notes.as_deref(), Some("ok"));
    }

    #[test]
    fn legacy_keys_alone_still_map() {
        let event = Event::from_envelope(&envelope(
            "dispute.updated",
            json!({
                "dispute_id": 2,
                "discord_thread_id": 555,
                "opened_by": "seller",
                "buyer_username": "ann"
            }),
        ))
        .unwrap();
        assert_eq!(event.known_thread(), Some("555"));
        let Event::DisputeUpdated(dispute) = event else {
            unreachable!()
        };
        assert_eq!(dispute.initiated_by.as_deref(), Some("seller"));
        assert_eq!(dispute.buyer_name.as_deref(), Some("ann"));
    }

    #[test]
    fn envelope_scope_overrides_payload_scope() {
        let mut env = envelope(
            "dispute.resolved",
            json!({"dispute_id": 3, "guild_id": "111", "thread_id": 999}),
        );
        env.scope = Some("222".to_string());
        let event = Event::from_envelope(&env).unwrap();
        assert_eq!(event.scope(), Some("222"));
        assert_eq!(event.known_thread(), Some("999"));
    }

    #[test]
    fn body_without_event_type_is_legacy_listing() {
        let env = Envelope::from_body(json!({"listing_id": 9, "title": "Old"})).unwrap();
        assert_eq!(env.event_type, "listing.created");
        assert_eq!(env.data, Some(json!({"listing_id": 9, "title": "Old"})));
    }

    #[test]
    fn body_with_envelope_is_unwrapped() {
        let env = Envelope::from_body(json!({
            "event_type": "dispute.created",
            "scope": 42,
            "data": {"dispute_id": 1}
        }))
        .unwrap();
        assert_eq!(env.event_type, "dispute.created");
        assert_eq!(env.scope.as_deref(), Some("42"));
        assert_eq!(env.data, Some(json!({"dispute_id": 1})));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            Envelope::from_body(json!([1, 2])),
            Err(RejectReason::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Envelope::from_body(json!({"event_type": 7})),
            Err(RejectReason::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn timestamps_accept_rfc3339_and_unix() {
        let event = Event::from_envelope(&envelope(
            "listing.created",
            json!({
                "listing_id": 1,
                "title": "T",
                "created_at": "2026-01-02T03:04:05Z",
                "updated_at": 1_700_000_000_000_i64
            }),
        ))
        .unwrap();
        let Event::ListingCreated(listing) = event else {
            unreachable!()
        };
        assert_eq!(
            listing.created_at.unwrap().to_rfc3339(),
            "2026-01-02T03:04:05+00:00"
        );
        assert_eq!(listing.updated_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn unparseable_timestamp_is_dropped() {
        let event = Event::from_envelope(&envelope(
            "dispute.created",
            json!({"dispute_id": "d", "created_at": "yesterday"}),
        ))
        .unwrap();
        let Event::DisputeCreated(dispute) = event else {
            unreachable!()
        };
        assert!(dispute.created_at.is_none());
    }
}
