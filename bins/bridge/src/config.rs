use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use pipeline::BridgeConfig;
use transport_mqtt::{MqttConfig, default_client_id};

use crate::error::BridgeError;

pub const DEFAULT_TOPIC: &str = "automaatio/#";

// ═══════════════════════════════════════════════════════════════
//  CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(name = "mqtt-mongo-bridge", about = "Мост MQTT → MongoDB")]
pub struct Cli {
    #[command(flatten)]
    pub args: BridgeArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Запустить мост (по умолчанию)
    Run,
    /// Проверить подключение к MongoDB и показать последние документы
    Check {
        /// Сколько последних документов показать
        #[arg(long, default_value_t = 5)]
        limit: i64,
    },
    /// Печатать все MQTT сообщения, ничего не записывая
    Listen {
        /// Topic filter
        #[arg(default_value = "#")]
        filter: String,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct BridgeArgs {
    /// Путь к TOML конфиг файлу (необязателен)
    #[arg(long, global = true, default_value = "bridge.toml", env = "BRIDGE_CONFIG")]
    pub config: String,

    /// URL брокера, напр. mqtt://automaatio.cloud.shiftr.io:1883
    #[arg(long, global = true, env = "MQTT_URL")]
    pub mqtt_url: Option<String>,

    #[arg(long, global = true, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    #[arg(long, global = true, env = "MQTT_PASS", hide_env_values = true)]
    pub mqtt_pass: Option<String>,

    /// Topic filter для подписки (по умолчанию automaatio/#)
    #[arg(long, global = true, env = "MQTT_TOPIC")]
    pub topic: Option<String>,

    #[arg(long, global = true, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Интервал переподключения к брокеру, мс
    #[arg(long, global = true, env = "MQTT_RECONNECT_MS")]
    pub reconnect_ms: Option<u64>,

    /// Строка подключения MongoDB
    #[arg(long, global = true, env = "MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    /// База по умолчанию (если в сообщении нет валидного db_name)
    #[arg(long, global = true, env = "MONGO_DB")]
    pub db: Option<String>,

    /// Коллекция по умолчанию (если в сообщении нет валидного coll_name)
    #[arg(long, global = true, env = "MONGO_COLLECTION")]
    pub collection: Option<String>,

    /// Записывать MQTT topic в это поле документа
    #[arg(long, global = true, env = "BRIDGE_TOPIC_FIELD")]
    pub topic_field: Option<String>,

    /// JSONL файл для документов, которые не удалось вставить
    #[arg(long, global = true, env = "BRIDGE_FAILED_QUEUE")]
    pub failed_queue: Option<PathBuf>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub mqtt_url: Option<String>,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
    pub mqtt_topic: Option<String>,
    pub mqtt_client_id: Option<String>,
    pub reconnect_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub buffer: Option<usize>,
    pub mongo_uri: Option<String>,
    pub default_db: Option<String>,
    pub default_collection: Option<String>,
    pub topic_field: Option<String>,
    pub failed_queue: Option<PathBuf>,
    pub drain_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: defaults < config file < env/CLI.
#[derive(Debug, Clone)]
pub struct Effective {
    pub mqtt_url: Option<String>,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
    pub topic: String,
    pub client_id: String,
    pub reconnect: Duration,
    pub connect_timeout: Duration,
    pub buffer: usize,
    pub mongo_uri: Option<String>,
    pub bridge: BridgeConfig,
}

impl Effective {
    pub fn new(args: &BridgeArgs) -> Result<Self, BridgeError> {
        // A missing file is fine, an unreadable or malformed one is not.
        let file = if Path::new(&args.config).exists() {
            FileConfig::load(&args.config)?
        } else {
            FileConfig::default()
        };
        let defaults = BridgeConfig::default();

        let bridge = BridgeConfig {
            default_db: args.db.clone().or(file.default_db).unwrap_or(defaults.default_db),
            default_collection: args
                .collection
                .clone()
                .or(file.default_collection)
                .unwrap_or(defaults.default_collection),
            topic_field: args.topic_field.clone().or(file.topic_field),
            failed_queue: args.failed_queue.clone().or(file.failed_queue),
            drain_timeout_ms: file.drain_timeout_ms.unwrap_or(defaults.drain_timeout_ms),
        };
        bridge.validate()?;

        let buffer = file.buffer.unwrap_or(1024);
        if buffer == 0 {
            return Err(BridgeError::Config { context: "buffer", detail: "must be > 0".into() });
        }
        let reconnect_ms = args.reconnect_ms.or(file.reconnect_ms).unwrap_or(5000);
        if reconnect_ms == 0 {
            return Err(BridgeError::Config { context: "reconnect_ms", detail: "must be > 0".into() });
        }

        Ok(Self {
            mqtt_url: args.mqtt_url.clone().or(file.mqtt_url),
            mqtt_user: args.mqtt_user.clone().or(file.mqtt_user),
            mqtt_pass: args.mqtt_pass.clone().or(file.mqtt_pass),
            topic: args.topic.clone().or(file.mqtt_topic).unwrap_or_else(|| DEFAULT_TOPIC.into()),
            client_id: args.client_id.clone().or(file.mqtt_client_id).unwrap_or_else(default_client_id),
            reconnect: Duration::from_millis(reconnect_ms),
            connect_timeout: Duration::from_millis(file.connect_timeout_ms.unwrap_or(10_000)),
            buffer,
            mongo_uri: args.mongo_uri.clone().or(file.mongo_uri),
            bridge,
        })
    }

    pub fn mongo_uri(&self) -> Result<&str, BridgeError> {
        self.mongo_uri.as_deref().ok_or(BridgeError::Missing("MONGO_URI"))
    }

    /// MQTT settings subscribing to `topic`.
    pub fn mqtt_config(&self, topic: &str) -> Result<MqttConfig, BridgeError> {
        let url = self.mqtt_url.as_deref().ok_or(BridgeError::Missing("MQTT_URL"))?;
        let mut cfg = MqttConfig::new(url, topic);
        cfg.username = self.mqtt_user.clone();
        cfg.password = self.mqtt_pass.clone();
        cfg.client_id = self.client_id.clone();
        cfg.reconnect_interval = self.reconnect;
        cfg.connect_timeout = self.connect_timeout;
        cfg.buffer = self.buffer;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_file(path: &Path) -> BridgeArgs {
        BridgeArgs { config: path.display().to_string(), ..BridgeArgs::default() }
    }

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let eff = Effective::new(&args_with_file(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(eff.topic, "automaatio/#");
        assert_eq!(eff.reconnect, Duration::from_millis(5000));
        assert_eq!(eff.bridge.default_db, "presence_db");
        assert_eq!(eff.bridge.default_collection, "presence");
        assert!(matches!(eff.mongo_uri(), Err(BridgeError::Missing("MONGO_URI"))));
        assert!(matches!(eff.mqtt_config("#"), Err(BridgeError::Missing("MQTT_URL"))));
    }

    #[test]
    fn cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
mqtt_url = "mqtt://file-broker"
mqtt_topic = "aiotgarage/+/+/presence"
mongo_uri = "mongodb://file-host"
default_db = "file_db"
reconnect_ms = 1000
drain_timeout_ms = 250
"#
        )
        .unwrap();

        let mut args = args_with_file(file.path());
        args.mqtt_url = Some("mqtts://cli-broker".into());
        args.db = Some("cli_db".into());

        let eff = Effective::new(&args).unwrap();
        assert_eq!(eff.mqtt_url.as_deref(), Some("mqtts://cli-broker"));
        assert_eq!(eff.topic, "aiotgarage/+/+/presence");
        assert_eq!(eff.mongo_uri().unwrap(), "mongodb://file-host");
        assert_eq!(eff.bridge.default_db, "cli_db");
        assert_eq!(eff.bridge.drain_timeout_ms, 250);

        let mqtt = eff.mqtt_config(&eff.topic).unwrap();
        assert_eq!(mqtt.url, "mqtts://cli-broker");
        assert_eq!(mqtt.reconnect_interval, Duration::from_millis(1000));
    }

    #[test]
    fn invalid_default_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_with_file(&dir.path().join("absent.toml"));
        args.collection = Some("no spaces allowed".into());
        assert!(matches!(Effective::new(&args), Err(BridgeError::Pipeline(_))));
    }

    #[test]
    fn zero_reconnect_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_with_file(&dir.path().join("absent.toml"));
        args.reconnect_ms = Some(0);
        assert!(matches!(
            Effective::new(&args),
            Err(BridgeError::Config { context: "reconnect_ms", .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reconnect_ms = 0").unwrap();
        assert!(matches!(
            Effective::new(&args_with_file(file.path())),
            Err(BridgeError::Config { context: "reconnect_ms", .. })
        ));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mqtt_url = ").unwrap();
        assert!(matches!(
            Effective::new(&args_with_file(file.path())),
            Err(BridgeError::Config { context: "parse", .. })
        ));
    }

    #[test]
    fn unknown_key_in_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mqtt_uri = \"mqtt://typo\"").unwrap();
        assert!(Effective::new(&args_with_file(file.path())).is_err());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["mqtt-mongo-bridge"]).unwrap();
        assert_eq!(cli.command, None);

        let cli = Cli::try_parse_from(["mqtt-mongo-bridge", "check", "--limit", "10"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Check { limit: 10 }));

        let cli = Cli::try_parse_from(["mqtt-mongo-bridge", "listen"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Listen { filter: "#".into() }));

        let cli = Cli::try_parse_from(["mqtt-mongo-bridge", "run", "--db", "Ops-1"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run));
        assert_eq!(cli.args.db.as_deref(), Some("Ops-1"));
    }
}
