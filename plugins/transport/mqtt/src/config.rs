use std::time::Duration;

use url::Url;

use bridge_api::PluginError;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Параметры подключения к MQTT брокеру.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// `mqtt://host:1883`, `mqtts://host:8883`, `tcp://…`, `ssl://…`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic filter, подписка с QoS 1.
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Пауза между попытками переподключения.
    pub reconnect_interval: Duration,
    /// Сколько ждать первый CONNACK при старте.
    pub connect_timeout: Duration,
    /// Размер буфера канала event loop → bridge.
    pub buffer: usize,
}

impl MqttConfig {
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            topic: topic.into(),
            client_id: default_client_id(),
            keep_alive: Duration::from_secs(60),
            reconnect_interval: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            buffer: 1024,
        }
    }

    /// Explicit credentials win; otherwise the URL's userinfo is used.
    pub fn credentials(&self, addr: &BrokerAddr) -> Option<(String, String)> {
        match (&self.username, &addr.username) {
            (Some(user), _) => Some((user.clone(), self.password.clone().unwrap_or_default())),
            (None, Some(user)) => Some((user.clone(), addr.password.clone().unwrap_or_default())),
            (None, None) => None,
        }
    }
}

pub fn default_client_id() -> String {
    format!("mqtt-mongo-bridge-{}", std::process::id())
}

// ═══════════════════════════════════════════════════════════════
//  BrokerAddr
// ═══════════════════════════════════════════════════════════════

/// Broker endpoint parsed from the configured URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerAddr {
    pub fn parse(raw: &str) -> Result<Self, PluginError> {
        let url = Url::parse(raw).map_err(|e| PluginError::config(format!("mqtt url '{raw}': {e}")))?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            other => {
                return Err(PluginError::config(format!(
                    "mqtt url '{raw}': unsupported scheme '{other}' (expected mqtt, mqtts, tcp, ssl)"
                )));
            }
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(PluginError::config(format!("mqtt url '{raw}': missing host"))),
        };

        let port = url.port().unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });
        let username = Some(url.username()).filter(|u| !u.is_empty()).map(str::to_string);
        let password = url.password().map(str::to_string);

        Ok(Self { host, port, tls, username, password })
    }
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "mqtt" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}
