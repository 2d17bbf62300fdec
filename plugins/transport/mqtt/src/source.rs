use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::{InboundMessage, MessageSource, PluginError};

use crate::config::{BrokerAddr, MqttConfig};

/// Capacity of rumqttc's request channel (subscribe / disconnect).
const REQUEST_CAPACITY: usize = 16;

fn build_options(cfg: &MqttConfig, addr: &BrokerAddr) -> MqttOptions {
    let mut options = MqttOptions::new(&cfg.client_id, &addr.host, addr.port);
    options.set_keep_alive(cfg.keep_alive);
    options.set_clean_session(true);
    if let Some((user, pass)) = cfg.credentials(addr) {
        options.set_credentials(user, pass);
    }
    if addr.tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

fn subscribe(client: &AsyncClient, topic: &str) {
    match client.try_subscribe(topic, QoS::AtLeastOnce) {
        Ok(()) => tracing::info!(%topic, "subscribe requested"),
        Err(e) => tracing::error!(%topic, error = %e, "subscribe error"),
    }
}

// ═══════════════════════════════════════════════════════════════
//  MqttSource
// ═══════════════════════════════════════════════════════════════

/// MessageSource поверх rumqttc.
///
/// Event loop работает в отдельной задаче: принимает PUBLISH,
/// переподписывается после каждого CONNACK и переподключается с
/// фиксированным интервалом. Bridge видит только канал сообщений.
pub struct MqttSource {
    client: AsyncClient,
    rx: mpsc::Receiver<InboundMessage>,
    driver: Option<JoinHandle<()>>,
    stop: CancellationToken,
    addr: BrokerAddr,
}

impl MqttSource {
    /// Connect and subscribe. The first connection must succeed within
    /// `connect_timeout`; later connection losses are retried forever.
    pub async fn connect(cfg: MqttConfig) -> Result<Self, PluginError> {
        let addr = BrokerAddr::parse(&cfg.url)?;
        // rumqttc panics on these instead of returning an error.
        if cfg.client_id.is_empty() || cfg.client_id.starts_with(' ') {
            return Err(PluginError::config(format!("mqtt client id '{}' is invalid", cfg.client_id)));
        }
        if cfg.buffer == 0 {
            return Err(PluginError::config("mqtt buffer must be > 0"));
        }
        let (client, mut eventloop) = AsyncClient::new(build_options(&cfg, &addr), REQUEST_CAPACITY);

        match tokio::time::timeout(cfg.connect_timeout, wait_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(PluginError::io(format!("mqtt connect to {addr}: {e}"))),
            Err(_) => {
                return Err(PluginError::io(format!(
                    "mqtt connect to {addr}: no CONNACK within {}ms",
                    cfg.connect_timeout.as_millis()
                )));
            }
        }
        tracing::info!(broker = %addr, client_id = %cfg.client_id, "mqtt connected");
        subscribe(&client, &cfg.topic);

        let (tx, rx) = mpsc::channel(cfg.buffer);
        let stop = CancellationToken::new();
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            cfg.topic.clone(),
            tx,
            cfg.reconnect_interval,
            stop.clone(),
        ));

        Ok(Self { client, rx, driver: Some(driver), stop, addr })
    }

    pub fn broker(&self) -> &BrokerAddr {
        &self.addr
    }
}

impl MessageSource for MqttSource {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<InboundMessage>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.rx.close();
            // Fails once the event loop has exited.
            let result = self
                .client
                .try_disconnect()
                .map_err(|e| PluginError::closed(format!("mqtt disconnect: {e}")));

            // Let the loop flush DISCONNECT, then stop it regardless.
            if let Some(driver) = self.driver.take() {
                let _ = tokio::time::timeout(Duration::from_secs(1), driver).await;
            }
            self.stop.cancel();
            tracing::info!(broker = %self.addr, "mqtt disconnected");
            result
        })
    }
}

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), rumqttc::ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    tx: mpsc::Sender<InboundMessage>,
    reconnect_interval: Duration,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = eventloop.poll() => event,
            _ = stop.cancelled() => break,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                tokio::select! {
                    sent = tx.send(message) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    _ = stop.cancelled() => break,
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("mqtt reconnected");
                subscribe(&client, &topic);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                for code in ack.return_codes {
                    match code {
                        SubscribeReasonCode::Success(qos) => {
                            tracing::info!(%topic, granted = ?qos, "subscribed");
                        }
                        SubscribeReasonCode::Failure => {
                            tracing::error!(%topic, "broker rejected subscription");
                        }
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_ms = reconnect_interval.as_millis() as u64,
                    "mqtt connection error, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_interval) => {}
                    _ = stop.cancelled() => break,
                }
            }
        }
    }
    tracing::info!("mqtt event loop stopped");
}
