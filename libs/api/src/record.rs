use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::util::iso_millis;

/// Field holding the original text when a payload is not a JSON object.
pub const RAW_PAYLOAD_FIELD: &str = "raw_payload";
/// Field stamped with the receipt time on every stored document.
pub const RECEIVED_AT_FIELD: &str = "_received_at";
/// Routing field selecting the destination database.
pub const DB_NAME_FIELD: &str = "db_name";
/// Routing field selecting the destination collection.
pub const COLL_NAME_FIELD: &str = "coll_name";

/// Document as handed to a store: string keys to JSON values.
pub type Document = serde_json::Map<String, Value>;

static VALID_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid name regex"));

/// Whether `name` is safe to use as a database or collection name.
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME_RE.is_match(name)
}

// ═══════════════════════════════════════════════════════════════
//  InboundMessage
// ═══════════════════════════════════════════════════════════════

/// One message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }

    /// Payload as text, invalid UTF-8 replaced with U+FFFD.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Record
// ═══════════════════════════════════════════════════════════════

/// Interpretation of a payload before it becomes a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Payload was a JSON object.
    Parsed(Document),
    /// Anything else: invalid JSON, or JSON that is not an object.
    RawFallback(String),
}

impl Record {
    /// Interpret a payload. Never fails: whatever does not parse as a JSON
    /// object is kept verbatim as `RawFallback`.
    pub fn from_payload(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Record::Parsed(map),
            _ => Record::RawFallback(text.into_owned()),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Record::RawFallback(_))
    }

    /// Collapse into the document shape both variants share.
    pub fn into_document(self) -> Document {
        match self {
            Record::Parsed(map) => map,
            Record::RawFallback(text) => {
                let mut map = Document::new();
                map.insert(RAW_PAYLOAD_FIELD.to_string(), Value::String(text));
                map
            }
        }
    }
}

/// Set `_received_at`, overwriting whatever the publisher put there.
pub fn stamp_received_at(doc: &mut Document, at: DateTime<Utc>) {
    doc.insert(RECEIVED_AT_FIELD.to_string(), Value::String(iso_millis(at)));
}

// ═══════════════════════════════════════════════════════════════
//  Destination
// ═══════════════════════════════════════════════════════════════

/// Database/collection pair a document is written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub database: String,
    pub collection: String,
}

impl Destination {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }

    /// Pick the destination for `doc`.
    ///
    /// `db_name` and `coll_name` are honoured only when they are strings
    /// matching `[A-Za-z0-9_-]{1,64}`; each falls back to `defaults`
    /// independently of the other.
    pub fn resolve(doc: &Document, defaults: &Destination) -> Self {
        Self {
            database: routing_name(doc, DB_NAME_FIELD).unwrap_or(&defaults.database).to_string(),
            collection: routing_name(doc, COLL_NAME_FIELD).unwrap_or(&defaults.collection).to_string(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

fn routing_name<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|name| is_valid_name(name))
}
