use bridge_api::MessageSource;
use transport_mqtt::MqttSource;

use crate::config::Effective;
use crate::error::BridgeError;

use super::shutdown_signal;

/// Печатать каждое сообщение из `filter` до Ctrl+C. В базу ничего не пишется.
pub async fn run(eff: &Effective, filter: &str) -> Result<(), BridgeError> {
    let mut source = MqttSource::connect(eff.mqtt_config(filter)?).await?;
    println!("Connected to {}", source.broker());
    println!("Subscribed to {filter} (Ctrl+C to stop)");

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut count = 0u64;
    loop {
        tokio::select! {
            message = source.recv() => {
                match message {
                    Some(message) => {
                        count += 1;
                        println!("MSG: {} {}", message.topic, message.text());
                    }
                    None => break,
                }
            }
            res = &mut signal => {
                res?;
                break;
            }
        }
    }

    if let Err(e) = source.close().await {
        tracing::warn!(error = ?e, "mqtt close error");
    }
    println!("\n  stopped: {count} messages");
    Ok(())
}
