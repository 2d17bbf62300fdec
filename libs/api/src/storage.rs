use std::future::Future;
use std::pin::Pin;

use crate::error::PluginError;
use crate::record::{Destination, Document};

/// Document store the bridge writes into.
///
/// The bridge doesn't know concrete backends; for the bridge a store is
/// just this trait. One handle is created at startup and shared by all
/// in-flight handlers, so implementations must tolerate concurrent `insert`.
pub trait DocumentStore: Send + Sync {
    /// Insert `document` as a new document in `destination`.
    /// Single attempt: no retry, no buffering.
    fn insert(
        &self,
        destination: &Destination,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Release the connection. Called once at shutdown.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
