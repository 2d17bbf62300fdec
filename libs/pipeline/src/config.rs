use std::path::PathBuf;
use std::time::Duration;

use bridge_api::{Destination, is_valid_name};

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Bridge Config
// ═══════════════════════════════════════════════════════════════

/// Настройки обработки сообщений: куда писать по умолчанию,
/// что добавлять в документ, что делать с неудачными вставками.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// База данных, если в сообщении нет валидного `db_name`.
    pub default_db: String,
    /// Коллекция, если в сообщении нет валидного `coll_name`.
    pub default_collection: String,
    /// Поле, в которое записывается MQTT topic. Без указания — не пишется.
    pub topic_field: Option<String>,
    /// JSONL файл для документов, которые не удалось вставить.
    /// Без указания — такие сообщения теряются (только лог).
    pub failed_queue: Option<PathBuf>,
    /// Сколько ждать незавершённые вставки при остановке.
    pub drain_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_db: "presence_db".into(),
            default_collection: "presence".into(),
            topic_field: None,
            failed_queue: None,
            drain_timeout_ms: 5000,
        }
    }
}

impl BridgeConfig {
    /// Fallback destination for messages without usable routing fields.
    pub fn defaults(&self) -> Destination {
        Destination::new(&self.default_db, &self.default_collection)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Defaults must pass the same name check as per-message routing fields.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !is_valid_name(&self.default_db) {
            return Err(PipelineError::Config(format!(
                "default database name '{}' must match [A-Za-z0-9_-]{{1,64}}",
                self.default_db
            )));
        }
        if !is_valid_name(&self.default_collection) {
            return Err(PipelineError::Config(format!(
                "default collection name '{}' must match [A-Za-z0-9_-]{{1,64}}",
                self.default_collection
            )));
        }
        if let Some(field) = &self.topic_field {
            if field.is_empty() {
                return Err(PipelineError::Config("topic_field must not be empty".into()));
            }
        }
        Ok(())
    }
}
