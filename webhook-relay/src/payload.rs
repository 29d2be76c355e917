//! Webhook payload types and decoding.
//!
//! Only the envelope is typed. Event bodies such as `message` or `postback`
//! are kept as raw JSON so they can be shown exactly as LINE sent them,
//! including event kinds this relay does not know about.

use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;

// =============================================================================
// Envelope
// =============================================================================

/// A single webhook delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Bot user ID the delivery is addressed to
    #[serde(default)]
    pub destination: Option<String>,

    /// Events in delivery order; `null` reads as no events
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<Event>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Event>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Event>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One event inside a delivery.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
    #[serde(default)]
    pub reply_token: Option<String>,

    #[serde(default)]
    pub message: Option<RawJson>,
    #[serde(default)]
    pub postback: Option<RawJson>,
    #[serde(default)]
    pub beacon: Option<RawJson>,
    #[serde(default)]
    pub link: Option<RawJson>,
    #[serde(default)]
    pub things: Option<RawJson>,
    #[serde(default)]
    pub members: Option<RawJson>,
    #[serde(default)]
    pub joined: Option<RawJson>,
    #[serde(default)]
    pub left: Option<RawJson>,
    #[serde(default)]
    pub unsend: Option<RawJson>,
    #[serde(default)]
    pub video_play_complete: Option<RawJson>,
}

impl Event {
    /// Present opaque bodies with their display labels, in a fixed order.
    pub fn bodies(&self) -> impl Iterator<Item = (&'static str, &RawJson)> {
        [
            ("Message", &self.message),
            ("Postback", &self.postback),
            ("Beacon", &self.beacon),
            ("Link", &self.link),
            ("Things", &self.things),
            ("Members", &self.members),
            ("Joined", &self.joined),
            ("Left", &self.left),
            ("Unsend", &self.unsend),
            ("VideoPlayComplete", &self.video_play_complete),
        ]
        .into_iter()
        .filter_map(|(label, body)| body.as_ref().map(|b| (label, b)))
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .map(|c| c.is_redelivery)
            .unwrap_or(false)
    }
}

/// Where an event originated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventSource {
    User {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
    Room {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

// =============================================================================
// Opaque bodies
// =============================================================================

/// Unparsed JSON value, kept byte-for-byte as received.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct RawJson(Box<RawValue>);

impl RawJson {
    /// The JSON text exactly as it appeared in the request body.
    pub fn get(&self) -> &str {
        self.0.get()
    }

    /// The JSON text with insignificant whitespace removed.
    pub fn compact(&self) -> String {
        compact_json(self.get())
    }
}

/// Remove whitespace outside of string literals.
///
/// Everything else (key order, number spelling, escapes) is preserved, so the
/// output is the same value the sender wrote, just on one line.
pub fn compact_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            ' ' | '\t' | '\n' | '\r' => {}
            '"' => {
                in_string = true;
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

// =============================================================================
// Decoding
// =============================================================================

/// Strictly decode a raw request body.
///
/// Callers treat an error as "show the raw body instead"; it is never a
/// reason to reject the delivery.
pub fn decode(raw: &[u8]) -> Result<WebhookPayload, serde_json::Error> {
    serde_json::from_slice(raw)
}
