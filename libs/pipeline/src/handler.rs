use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;

use bridge_api::{
    Destination, Document, DocumentStore, InboundMessage, PluginError, Record,
    stamp_received_at,
};

use crate::config::BridgeConfig;
use crate::dead_letter::DeadLetterFile;

// ═══════════════════════════════════════════════════════════════
//  Document building — parse → route → stamp
// ═══════════════════════════════════════════════════════════════

/// Turn a message into the document to store and where to store it.
///
/// Pure: the receipt time is passed in. Routing is resolved before the
/// optional topic field is written, so a `topic_field` named `db_name`
/// cannot redirect the document.
pub fn build_document(
    message: &InboundMessage,
    received_at: DateTime<Utc>,
    config: &BridgeConfig,
) -> (Destination, Document) {
    let mut doc = Record::from_payload(&message.payload).into_document();
    let destination = Destination::resolve(&doc, &config.defaults());

    if let Some(field) = &config.topic_field {
        doc.insert(field.clone(), Value::String(message.topic.clone()));
    }
    stamp_received_at(&mut doc, received_at);

    (destination, doc)
}

// ═══════════════════════════════════════════════════════════════
//  Bridge
// ═══════════════════════════════════════════════════════════════

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Inserted(Destination),
    /// The store rejected the document. The message is gone unless a
    /// dead-letter file is configured.
    Dropped { destination: Destination, error: PluginError },
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: u64,
    pub inserted: u64,
    pub dropped: u64,
}

/// Message handler: owns the store handle, shared by every in-flight task.
pub struct Bridge {
    store: Arc<dyn DocumentStore>,
    config: BridgeConfig,
    dead_letter: Option<DeadLetterFile>,
    received: AtomicU64,
    inserted: AtomicU64,
    dropped: AtomicU64,
}

impl Bridge {
    pub fn new(store: Arc<dyn DocumentStore>, config: BridgeConfig) -> Self {
        Self {
            store,
            config,
            dead_letter: None,
            received: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn with_dead_letter(mut self, dead_letter: DeadLetterFile) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            received: self.received.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Handle one message: exactly one insert attempt, never an error.
    pub async fn handle(&self, message: InboundMessage, received_at: DateTime<Utc>) -> Outcome {
        self.received.fetch_add(1, Ordering::Relaxed);
        let (destination, doc) = build_document(&message, received_at, &self.config);

        // Kept only for the dead-letter line; the store consumes `doc`.
        let backup = self.dead_letter.as_ref().map(|_| doc.clone());

        match self.store.insert(&destination, doc).await {
            Ok(()) => {
                self.inserted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    topic = %message.topic,
                    database = %destination.database,
                    collection = %destination.collection,
                    "inserted"
                );
                Outcome::Inserted(destination)
            }
            Err(error) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    topic = %message.topic,
                    database = %destination.database,
                    collection = %destination.collection,
                    error = ?error,
                    "insert failed, message dropped"
                );
                if let (Some(dlq), Some(doc)) = (&self.dead_letter, backup) {
                    if let Err(e) = dlq.append(&destination, &doc, &error).await {
                        tracing::error!(path = %dlq.path().display(), error = ?e, "dead-letter append failed");
                    }
                }
                Outcome::Dropped { destination, error }
            }
        }
    }
}
