use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use bridge_api::MessageSource;

use crate::handler::{Bridge, BridgeStats};

// ═══════════════════════════════════════════════════════════════
//  Dispatch loop — source.recv() → spawn bridge.handle()
// ═══════════════════════════════════════════════════════════════

/// Запустить bridge: читает сообщения из source и для каждого
/// спавнит обработчик. Обработчики выполняются параллельно, порядок
/// записи в store не гарантируется.
///
/// Stops when the source ends or `token` is cancelled, then closes the
/// source, waits up to `drain_timeout` for in-flight inserts and
/// returns the final counters.
pub fn spawn_bridge(
    bridge: Arc<Bridge>,
    mut source: Box<dyn MessageSource>,
    token: CancellationToken,
) -> JoinHandle<BridgeStats> {
    tokio::spawn(async move {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                message = source.recv() => {
                    match message {
                        Some(message) => {
                            let received_at = bridge_api::now();
                            let bridge = bridge.clone();
                            tracker.spawn(async move {
                                bridge.handle(message, received_at).await;
                            });
                        }
                        None => {
                            tracing::info!("source ended");
                            break;
                        }
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        if let Err(e) = source.close().await {
            tracing::warn!(error = ?e, "source close error");
        }

        tracker.close();
        let drain_timeout = bridge.config().drain_timeout();
        if tokio::time::timeout(drain_timeout, tracker.wait()).await.is_err() {
            tracing::warn!(
                in_flight = tracker.len(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "drain timeout, abandoning in-flight inserts"
            );
        }

        let stats = bridge.stats();
        tracing::info!(
            received = stats.received,
            inserted = stats.inserted,
            dropped = stats.dropped,
            "bridge stopped"
        );
        stats
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::{Barrier, mpsc};

    use bridge_api::{Destination, Document, DocumentStore, InboundMessage, PluginError};
    use storage_memory::MemoryStore;

    use crate::config::BridgeConfig;

    #[tokio::test]
    async fn handles_every_message_until_source_ends() {
        let store = Arc::new(MemoryStore::new());
        let bridge = Arc::new(Bridge::new(store.clone(), BridgeConfig::default()));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_bridge(bridge, Box::new(rx), CancellationToken::new());
        tx.send(InboundMessage::new("automaatio/a", r#"{"n":1}"#)).await.unwrap();
        tx.send(InboundMessage::new("automaatio/b", "plain text")).await.unwrap();
        tx.send(InboundMessage::new("automaatio/c", r#"{"n":3,"coll_name":"other"}"#)).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats, BridgeStats { received: 3, inserted: 3, dropped: 0 });

        let defaults = store.documents(&Destination::new("presence_db", "presence")).await;
        assert_eq!(defaults.len(), 2);
        assert!(defaults.iter().any(|d| d.get("raw_payload") == Some(&json!("plain text"))));
        assert!(defaults.iter().all(|d| d.contains_key("_received_at")));
        assert_eq!(store.documents(&Destination::new("presence_db", "other")).await.len(), 1);
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let bridge = Arc::new(Bridge::new(Arc::new(MemoryStore::new()), BridgeConfig::default()));
        let (tx, rx) = mpsc::channel::<InboundMessage>(16);
        let token = CancellationToken::new();

        let handle = spawn_bridge(bridge, Box::new(rx), token.clone());
        token.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("bridge did not stop")
            .unwrap();
        assert_eq!(stats.received, 0);
        // source was closed on shutdown
        assert!(tx.is_closed());
    }

    /// Every insert waits until two inserts are in flight at once.
    struct RendezvousStore {
        barrier: Barrier,
        inner: MemoryStore,
    }

    impl DocumentStore for RendezvousStore {
        fn insert(
            &self,
            destination: &Destination,
            document: Document,
        ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
            let destination = destination.clone();
            Box::pin(async move {
                self.barrier.wait().await;
                self.inner.insert(&destination, document).await
            })
        }
    }

    #[tokio::test]
    async fn handlers_overlap() {
        let store = Arc::new(RendezvousStore { barrier: Barrier::new(2), inner: MemoryStore::new() });
        let bridge = Arc::new(Bridge::new(store.clone(), BridgeConfig::default()));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_bridge(bridge, Box::new(rx), CancellationToken::new());
        tx.send(InboundMessage::new("t", r#"{"n":1}"#)).await.unwrap();
        tx.send(InboundMessage::new("t", r#"{"n":2}"#)).await.unwrap();
        drop(tx);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("inserts were serialized")
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(store.inner.len().await, 2);
    }

    /// Store that never completes an insert.
    struct StuckStore;

    impl DocumentStore for StuckStore {
        fn insert(
            &self,
            _destination: &Destination,
            _document: Document,
        ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn drain_gives_up_after_timeout() {
        let config = BridgeConfig { drain_timeout_ms: 50, ..BridgeConfig::default() };
        let bridge = Arc::new(Bridge::new(Arc::new(StuckStore), config));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_bridge(bridge, Box::new(rx), CancellationToken::new());
        tx.send(InboundMessage::new("t", "x")).await.unwrap();
        drop(tx);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("drain did not time out")
            .unwrap();
        assert_eq!(stats, BridgeStats { received: 1, inserted: 0, dropped: 0 });
    }
}
