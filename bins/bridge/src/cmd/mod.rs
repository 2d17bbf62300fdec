pub mod check;
pub mod listen;
pub mod run;

use bridge_api::DocumentStore;

use crate::error::BridgeError;

/// Close the store; a failure only gets logged.
pub async fn close_store(store: &dyn DocumentStore) -> bool {
    match store.close().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = ?e, "mongo close error");
            false
        }
    }
}

/// Ждать Ctrl+C (и SIGTERM на unix).
pub async fn shutdown_signal() -> Result<(), BridgeError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
