use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use bridge_api::{Destination, Document, DocumentStore, PluginError};

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

/// In-memory DocumentStore: документы по destination, в порядке вставки.
/// Для тестов и локальных прогонов без MongoDB.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Destination, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents stored in `destination`, oldest first.
    pub async fn documents(&self, destination: &Destination) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of documents across all destinations.
    pub async fn len(&self) -> usize {
        self.collections.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Destinations that received at least one document.
    pub async fn destinations(&self) -> Vec<Destination> {
        let mut out: Vec<Destination> = self.collections.read().await.keys().cloned().collect();
        out.sort_by(|a, b| (&a.database, &a.collection).cmp(&(&b.database, &b.collection)));
        out
    }
}

impl DocumentStore for MemoryStore {
    fn insert(
        &self,
        destination: &Destination,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        let destination = destination.clone();
        Box::pin(async move {
            self.collections
                .write()
                .await
                .entry(destination)
                .or_default()
                .push(document);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(n: i64) -> Document {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn keeps_documents_per_destination() {
        let store = MemoryStore::new();
        let a = Destination::new("db", "a");
        let b = Destination::new("db", "b");

        store.insert(&a, doc(1)).await.unwrap();
        store.insert(&b, doc(2)).await.unwrap();
        store.insert(&a, doc(3)).await.unwrap();

        assert_eq!(store.documents(&a).await, vec![doc(1), doc(3)]);
        assert_eq!(store.documents(&b).await, vec![doc(2)]);
        assert_eq!(store.len().await, 3);
        assert_eq!(store.destinations().await, vec![a, b]);
    }

    #[tokio::test]
    async fn unknown_destination_is_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        assert!(store.documents(&Destination::new("x", "y")).await.is_empty());
    }
}
