//! Application configuration.
//!
//! A TOML file layered with `KIS__`-prefixed environment variables, e.g.
//! `KIS__APP_KEY` or `KIS__SINKS__EXECUTION_URL`.

use crate::error::{AppError, AppResult};
use kis_control::ControlConfig;
use kis_core::{is_valid_symbol, Environment};
use kis_dispatch::DispatchConfig;
use kis_ws::{ConnectionConfig, RegistryConfig};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "KIS";
const ENV_SEPARATOR: &str = "__";

/// WebSocket supervisor and registry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Override for the environment's WebSocket URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Fixed delay between reconnect attempts (ms). Default: 5000.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Consecutive failed attempts before giving up (0 = never). Default: 0.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Handshake bound per attempt (ms). Default: 10000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause after each subscribe frame (ms). Default: 200.
    #[serde(default = "default_subscribe_send_delay_ms")]
    pub subscribe_send_delay_ms: u64,
    /// Re-send subscribe frames after a reconnect. Default: true.
    #[serde(default = "default_true")]
    pub resubscribe_on_reconnect: bool,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_subscribe_send_delay_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            subscribe_send_delay_ms: default_subscribe_send_delay_ms(),
            resubscribe_on_reconnect: true,
        }
    }
}

/// Downstream sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Receives price snapshots and order books.
    pub snapshot_url: String,
    /// Receives executions.
    pub execution_url: String,
    /// Per-request timeout (ms). Default: 5000.
    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
    /// Events buffered ahead of the sinks. Default: 1024.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_sink_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1024
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info,kis=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Main application configuration.
#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    /// Mock (paper trading) or live endpoints.
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    /// Override for the environment's REST base URL.
    #[serde(default)]
    pub auth_url: Option<String>,
    /// Directory holding `token_cache_{env}.json`.
    #[serde(default = "default_token_cache_dir")]
    pub token_cache_dir: PathBuf,
    /// Symbols subscribed once the first session opens. A TOML array, or a
    /// comma-separated string from the environment.
    #[serde(default, deserialize_with = "symbol_list")]
    pub initial_symbols: Vec<String>,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    pub sinks: SinkConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_token_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Symbols stay strings so leading zeros survive.
fn symbol_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Symbols {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Symbols::deserialize(deserializer)? {
        Symbols::List(symbols) => symbols,
        Symbols::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("environment", &self.environment)
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("token_cache_dir", &self.token_cache_dir)
            .field("initial_symbols", &self.initial_symbols)
            .field("websocket", &self.websocket)
            .field("sinks", &self.sinks)
            .field("control", &self.control)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl RelayConfig {
    /// Load from a TOML file, then apply `KIS__*` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        Self::load(path.as_ref(), None)
    }

    /// `overrides` replaces the process environment when given.
    ///
    /// Environment values are kept as strings; serde converts numeric and
    /// boolean fields on deserialization, so keys and symbols are never
    /// reinterpreted as numbers.
    fn load(path: &Path, overrides: Option<config::Map<String, String>>) -> AppResult<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .source(overrides);

        let config: Self = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot start with.
    pub fn validate(&self) -> AppResult<()> {
        if self.app_key.trim().is_empty() || self.app_secret.trim().is_empty() {
            return Err(AppError::Config(
                "app_key and app_secret are required".to_string(),
            ));
        }

        for (name, url) in [
            ("sinks.snapshot_url", &self.sinks.snapshot_url),
            ("sinks.execution_url", &self.sinks.execution_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }

        if self.sinks.timeout_ms == 0 {
            return Err(AppError::Config("sinks.timeout_ms must be > 0".to_string()));
        }
        if self.sinks.queue_capacity == 0 {
            return Err(AppError::Config(
                "sinks.queue_capacity must be > 0".to_string(),
            ));
        }

        if let Some(symbol) = self.initial_symbols.iter().find(|s| !is_valid_symbol(s)) {
            return Err(AppError::Config(format!(
                "invalid symbol in initial_symbols: {symbol:?}"
            )));
        }

        Ok(())
    }

    pub fn websocket_url(&self) -> String {
        self.websocket
            .url
            .clone()
            .unwrap_or_else(|| self.environment.ws_url().to_string())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.websocket_url(),
            reconnect_delay_ms: self.websocket.reconnect_delay_ms,
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            connect_timeout_ms: self.websocket.connect_timeout_ms,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            environment: self.environment,
            send_delay_ms: self.websocket.subscribe_send_delay_ms,
            resubscribe_on_reconnect: self.websocket.resubscribe_on_reconnect,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: self.sinks.queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
app_key = "key"
app_secret = "secret"

[sinks]
snapshot_url = "http://localhost:8080/api/stocks/realtime"
execution_url = "http://localhost:8080/api/stocks/execution"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env() -> Option<config::Map<String, String>> {
        Some(config::Map::new())
    }

    #[test]
    fn test_defaults() {
        let file = write_config(MINIMAL);
        let config = RelayConfig::load(file.path(), no_env()).unwrap();

        assert_eq!(config.environment, Environment::Mock);
        assert_eq!(config.websocket.reconnect_delay_ms, 5000);
        assert_eq!(config.websocket.max_reconnect_attempts, 0);
        assert_eq!(config.connection_config().connect_timeout_ms, 10_000);
        assert_eq!(config.websocket.subscribe_send_delay_ms, 200);
        assert!(config.websocket.resubscribe_on_reconnect);
        assert_eq!(config.sinks.timeout(), Duration::from_secs(5));
        assert_eq!(config.sinks.queue_capacity, 1024);
        assert_eq!(config.control.bind_addr(), "0.0.0.0:5001");
        assert_eq!(config.telemetry.log_level, "info,kis=debug");
        assert!(config.initial_symbols.is_empty());
        assert_eq!(config.websocket_url(), Environment::Mock.ws_url());
    }

    #[test]
    fn test_environment_overrides() {
        let file = write_config(MINIMAL);
        let env = config::Map::from([
            ("KIS__ENVIRONMENT".to_string(), "live".to_string()),
            ("KIS__APP_KEY".to_string(), "from-env".to_string()),
            (
                "KIS__SINKS__EXECUTION_URL".to_string(),
                "http://backend:8080/exec".to_string(),
            ),
            ("KIS__WEBSOCKET__RECONNECT_DELAY_MS".to_string(), "250".to_string()),
            ("KIS__INITIAL_SYMBOLS".to_string(), "005930,000660".to_string()),
        ]);

        let config = RelayConfig::load(file.path(), Some(env)).unwrap();

        assert_eq!(config.environment, Environment::Live);
        assert_eq!(config.app_key, "from-env");
        assert_eq!(config.sinks.execution_url, "http://backend:8080/exec");
        assert_eq!(config.websocket.reconnect_delay_ms, 250);
        assert_eq!(config.initial_symbols, vec!["005930", "000660"]);
        assert_eq!(config.connection_config().url, Environment::Live.ws_url());
        assert_eq!(config.registry_config().environment, Environment::Live);
    }

    #[test]
    fn test_numeric_looking_env_values_stay_strings() {
        let file = write_config(MINIMAL);
        let env = config::Map::from([
            ("KIS__APP_KEY".to_string(), "0012345".to_string()),
            ("KIS__APP_SECRET".to_string(), "1e5".to_string()),
            ("KIS__INITIAL_SYMBOLS".to_string(), "005930".to_string()),
            ("KIS__WEBSOCKET__RESUBSCRIBE_ON_RECONNECT".to_string(), "false".to_string()),
            ("KIS__WEBSOCKET__CONNECT_TIMEOUT_MS".to_string(), "1500".to_string()),
        ]);

        let config = RelayConfig::load(file.path(), Some(env)).unwrap();

        assert_eq!(config.app_key, "0012345");
        assert_eq!(config.app_secret, "1e5");
        assert_eq!(config.initial_symbols, vec!["005930"]);
        assert!(!config.websocket.resubscribe_on_reconnect);
        assert_eq!(config.websocket.connect_timeout_ms, 1500);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let file = write_config(
            r#"
[sinks]
snapshot_url = "http://localhost/a"
execution_url = "http://localhost/b"
"#,
        );
        let err = RelayConfig::load(file.path(), no_env()).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("app_key")));
    }

    #[test]
    fn test_bad_sink_url_rejected() {
        let file = write_config(&MINIMAL.replace("http://localhost:8080/api/stocks/realtime", ""));
        let err = RelayConfig::load(file.path(), no_env()).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("snapshot_url")));
    }

    #[test]
    fn test_invalid_initial_symbol_rejected() {
        let file = write_config(&format!("initial_symbols = [\"005930\", \"00|59\"]\n{MINIMAL}"));
        let err = RelayConfig::load(file.path(), no_env()).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("00|59")));
    }

    #[test]
    fn test_missing_file() {
        let err = RelayConfig::load(Path::new("/nonexistent/relay.toml"), no_env()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let file = write_config(MINIMAL);
        let config = RelayConfig::load(file.path(), no_env()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_url_override() {
        let file = write_config(&format!("{MINIMAL}\n[websocket]\nurl = \"ws://127.0.0.1:9000\"\n"));
        let config = RelayConfig::load(file.path(), no_env()).unwrap();
        assert_eq!(config.websocket_url(), "ws://127.0.0.1:9000");
    }
}
