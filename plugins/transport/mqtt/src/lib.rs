//! MQTT transport: a `MessageSource` backed by rumqttc.

pub mod config;
mod source;

pub use config::{BrokerAddr, MqttConfig, default_client_id};
pub use source::MqttSource;
