use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bridge_api::MessageSource;
use pipeline::{Bridge, DeadLetterFile, spawn_bridge};
use storage_mongo::MongoStore;
use transport_mqtt::MqttSource;

use crate::config::Effective;
use crate::error::BridgeError;

use super::{close_store, shutdown_signal};

pub async fn run(eff: &Effective) -> Result<(), BridgeError> {
    tracing::info!("mqtt-mongo-bridge starting");

    // --- Config checks before touching the network ---
    let mongo_uri = eff.mongo_uri()?;
    let mqtt_cfg = eff.mqtt_config(&eff.topic)?;

    let dead_letter = match &eff.bridge.failed_queue {
        Some(path) => {
            let dlq = DeadLetterFile::open(path).await?;
            tracing::info!(path = %path.display(), "dead-letter file enabled");
            Some(dlq)
        }
        None => None,
    };

    // --- Document store ---
    let store = Arc::new(MongoStore::connect(mongo_uri, None).await?);
    tracing::info!("connected to mongodb");

    // --- Message bus ---
    let source = match MqttSource::connect(mqtt_cfg).await {
        Ok(s) => s,
        Err(e) => {
            close_store(store.as_ref()).await;
            return Err(e.into());
        }
    };
    tracing::info!(broker = %source.broker(), topic = %eff.topic, "connected to mqtt");

    let mut bridge = Bridge::new(store.clone(), eff.bridge.clone());
    if let Some(dlq) = dead_letter {
        bridge = bridge.with_dead_letter(dlq);
    }

    let token = CancellationToken::new();
    let source: Box<dyn MessageSource> = Box::new(source);
    let mut handle = spawn_bridge(Arc::new(bridge), source, token.clone());

    tracing::info!(
        topic = %eff.topic,
        default = %eff.bridge.defaults(),
        "bridge ready"
    );

    // --- Ожидание Ctrl+C / SIGTERM ---
    let finished = tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            None
        }
        stats = &mut handle => Some(stats),
    };
    let stats = match finished {
        None => {
            tracing::info!("shutting down...");
            token.cancel();
            handle.await?
        }
        Some(stats) => {
            tracing::warn!("message source ended");
            stats?
        }
    };

    close_store(store.as_ref()).await;

    tracing::info!(
        received = stats.received,
        inserted = stats.inserted,
        dropped = stats.dropped,
        "shutdown complete"
    );
    Ok(())
}
