use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::PluginError;
use crate::record::InboundMessage;

/// Stream of messages from the bus.
///
/// `recv` returns `None` once the source is exhausted or closed;
/// connection loss is handled inside the source and is not visible here.
pub trait MessageSource: Send {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<InboundMessage>> + Send + '_>>;

    /// Disconnect from the bus. Best-effort, called once at shutdown.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// A plain channel is a source: used by transports that drive their
/// client on a separate task, and by tests.
impl MessageSource for mpsc::Receiver<InboundMessage> {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<InboundMessage>> + Send + '_>> {
        Box::pin(async move { mpsc::Receiver::recv(self).await })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        mpsc::Receiver::close(self);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_source_yields_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let mut source: Box<dyn MessageSource> = Box::new(rx);
        tx.send(InboundMessage::new("a/b", "x")).await.unwrap();
        drop(tx);
        assert_eq!(source.recv().await, Some(InboundMessage::new("a/b", "x")));
        assert_eq!(source.recv().await, None);
    }
}
