//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. コマンドライン引数 (wpp-gateway バイナリ側で適用)
//! 2. 環境変数
//! 3. wpp-gateway.toml 設定ファイル
//! 4. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Error;

/// Where the driver persists authenticated session material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum CredentialStore {
    /// Local directory owned by the driver
    Local(PathBuf),
    /// Remote store connection string (e.g. a MongoDB URL)
    Remote(String),
}

impl Default for CredentialStore {
    fn default() -> Self {
        CredentialStore::Local(PathBuf::from(default_data_path()))
    }
}

impl std::fmt::Display for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStore::Local(path) => write!(f, "local:{}", path.display()),
            // Connection strings may carry credentials
            CredentialStore::Remote(_) => write!(f, "remote"),
        }
    }
}

/// WhatsApp session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identity used to key persisted credentials
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Credential persistence location
    #[serde(default)]
    pub credential_store: CredentialStore,

    /// Base URL of the messaging bridge sidecar
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Deadline applied to every driver call, in seconds
    #[serde(default = "default_driver_timeout_secs")]
    pub driver_timeout_secs: u64,

    /// First reconnect backoff step, in milliseconds
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the reconnect backoff, in milliseconds
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Consecutive failed reconnects before giving up (None = never give up)
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,

    /// How often a remote credential store is asked to back up the session
    #[serde(default = "default_backup_sync_interval_secs")]
    pub backup_sync_interval_secs: u64,

    /// Interval between bridge event polls, in milliseconds
    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            credential_store: CredentialStore::default(),
            bridge_url: default_bridge_url(),
            driver_timeout_secs: default_driver_timeout_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: None,
            backup_sync_interval_secs: default_backup_sync_interval_secs(),
            event_poll_ms: default_event_poll_ms(),
        }
    }
}

impl SessionConfig {
    pub fn driver_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_timeout_secs)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins. If unset, any origin is accepted
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

/// Delivery log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Main configuration for wpp-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_client_id() -> String {
    "default".to_string()
}

fn default_data_path() -> String {
    ".wwebjs_auth".to_string()
}

fn default_bridge_url() -> String {
    "http://localhost:8085".to_string()
}

fn default_driver_timeout_secs() -> u64 {
    30
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_backup_sync_interval_secs() -> u64 {
    300
}

fn default_event_poll_ms() -> u64 {
    1_000
}

fn default_api_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/wpp-gateway.db".to_string()
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 既存の環境変数はファイルの値より優先されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let mut cfg = Self::from_toml_str(&expanded_content)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> crate::Result<Self> {
        let toml: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let session = toml.session.unwrap_or_default();
        let defaults = SessionConfig::default();

        // A remote store wins over a local path when both are present
        let credential_store = match (session.remote_store_url, session.data_path) {
            (Some(url), _) if !url.is_empty() => CredentialStore::Remote(url),
            (_, Some(path)) => CredentialStore::Local(PathBuf::from(path)),
            _ => defaults.credential_store.clone(),
        };

        let session_config = SessionConfig {
            client_id: session.client_id.unwrap_or(defaults.client_id),
            credential_store,
            bridge_url: session.bridge_url.unwrap_or(defaults.bridge_url),
            driver_timeout_secs: session
                .driver_timeout_secs
                .unwrap_or(defaults.driver_timeout_secs),
            reconnect_initial_ms: session
                .reconnect_initial_ms
                .unwrap_or(defaults.reconnect_initial_ms),
            reconnect_max_ms: session.reconnect_max_ms.unwrap_or(defaults.reconnect_max_ms),
            reconnect_max_attempts: session.reconnect_max_attempts,
            backup_sync_interval_secs: session
                .backup_sync_interval_secs
                .unwrap_or(defaults.backup_sync_interval_secs),
            event_poll_ms: session.event_poll_ms.unwrap_or(defaults.event_poll_ms),
        };

        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            port: api.port.unwrap_or_else(default_api_port),
            allowed_origins: api.allowed_origins,
        };

        let delivery = toml.delivery.unwrap_or_default();
        let delivery_config = DeliveryConfig {
            db_path: delivery.db_path.unwrap_or_else(default_db_path),
        };

        Ok(Config {
            session: session_config,
            api: api_config,
            delivery: delivery_config,
        })
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./wpp-gateway.toml` があればそれを使い、なければ環境変数のみ。
    pub fn load() -> crate::Result<Self> {
        if Path::new("wpp-gateway.toml").exists() {
            return Self::from_toml_file("wpp-gateway.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) -> crate::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// `lookup` から得た値で設定を上書きする（空の値は無視）
    ///
    /// A remote credential store always wins over a local data path.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(client_id) = var("WPP_CLIENT_ID") {
            self.session.client_id = client_id;
        }

        if let Some(url) = var("REMOTE_DB_URL") {
            self.session.credential_store = CredentialStore::Remote(url);
        } else if let Some(path) = var("WPP_DATA_PATH") {
            if let CredentialStore::Local(_) = self.session.credential_store {
                self.session.credential_store = CredentialStore::Local(PathBuf::from(path));
            }
        }

        if let Some(url) = var("WPP_BRIDGE_URL") {
            self.session.bridge_url = url;
        }

        if let Some(secs) = parse_env(&var, "WPP_DRIVER_TIMEOUT_SECS")? {
            self.session.driver_timeout_secs = secs;
        }
        if let Some(ms) = parse_env(&var, "WPP_RECONNECT_INITIAL_MS")? {
            self.session.reconnect_initial_ms = ms;
        }
        if let Some(ms) = parse_env(&var, "WPP_RECONNECT_MAX_MS")? {
            self.session.reconnect_max_ms = ms;
        }
        if let Some(attempts) = parse_env(&var, "WPP_RECONNECT_MAX_ATTEMPTS")? {
            self.session.reconnect_max_attempts = Some(attempts);
        }

        if let Some(port) = parse_env(&var, "PORT")? {
            self.api.port = port;
        }
        if let Some(origins) = var("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Some(path) = var("WPP_DB_PATH") {
            self.delivery.db_path = path;
        }

        Ok(())
    }

    /// Basic sanity checks before the gateway starts
    pub fn validate(&self) -> crate::Result<()> {
        if self.session.client_id.trim().is_empty() {
            return Err(Error::Config("client id must not be empty".to_string()));
        }
        if self.session.driver_timeout_secs == 0 {
            return Err(Error::Config("driver timeout must be positive".to_string()));
        }
        if self.session.reconnect_max_ms < self.session.reconnect_initial_ms {
            return Err(Error::Config(
                "reconnect max backoff is smaller than the initial backoff".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &str,
) -> crate::Result<Option<T>> {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, value))),
        None => Ok(None),
    }
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    session: Option<TomlSessionConfig>,
    api: Option<TomlApiConfig>,
    delivery: Option<TomlDeliveryConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSessionConfig {
    client_id: Option<String>,
    /// ローカル認証情報ディレクトリ
    data_path: Option<String>,
    /// リモート認証情報ストア
    remote_store_url: Option<String>,
    bridge_url: Option<String>,
    driver_timeout_secs: Option<u64>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
    reconnect_max_attempts: Option<u32>,
    backup_sync_interval_secs: Option<u64>,
    event_poll_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDeliveryConfig {
    db_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.client_id, "default");
        assert_eq!(
            config.credential_store,
            CredentialStore::Local(PathBuf::from(".wwebjs_auth"))
        );
        assert_eq!(config.driver_timeout(), Duration::from_secs(30));
        assert!(config.reconnect_max_attempts.is_none());
    }

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.allowed_origins.is_none());
    }

    #[test]
    fn test_delivery_config_default() {
        let config = DeliveryConfig::default();
        assert_eq!(config.db_path, "data/wpp-gateway.db");
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("WPP_GATEWAY_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${WPP_GATEWAY_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${WPP_GATEWAY_NONEXISTENT}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("WPP_GATEWAY_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        let result = Config::expand_env_vars("no_vars_here $HOME");
        assert_eq!(result, "no_vars_here $HOME");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[session]
client_id = "store-01"
data_path = "/var/lib/wpp"
bridge_url = "http://bridge:9000"
driver_timeout_secs = 10
reconnect_max_attempts = 5

[api]
port = 8080

[delivery]
db_path = "/path/to/db"
"#;

        let config = Config::from_toml_str(toml_content).unwrap();
        assert_eq!(config.session.client_id, "store-01");
        assert_eq!(
            config.session.credential_store,
            CredentialStore::Local(PathBuf::from("/var/lib/wpp"))
        );
        assert_eq!(config.session.bridge_url, "http://bridge:9000");
        assert_eq!(config.session.driver_timeout_secs, 10);
        assert_eq!(config.session.reconnect_max_attempts, Some(5));
        assert_eq!(config.session.reconnect_initial_ms, 1_000);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.delivery.db_path, "/path/to/db");
    }

    #[test]
    fn test_toml_remote_store_wins() {
        let toml_content = r#"
[session]
data_path = "/var/lib/wpp"
remote_store_url = "mongodb://db:27017/wpp"
"#;

        let config = Config::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.session.credential_store,
            CredentialStore::Remote("mongodb://db:27017/wpp".to_string())
        );
    }

    #[test]
    fn test_toml_empty_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.session.client_id, "default");
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[session\nclient_id = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_credential_store_display_hides_remote_url() {
        let remote = CredentialStore::Remote("mongodb://user:secret@db".to_string());
        assert_eq!(remote.to_string(), "remote");

        let local = CredentialStore::Local(PathBuf::from("/data"));
        assert_eq!(local.to_string(), "local:/data");
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_overrides_from_environment() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("WPP_CLIENT_ID", "store-07"),
                ("WPP_DATA_PATH", "/srv/auth"),
                ("PORT", "8081"),
                ("WPP_RECONNECT_MAX_ATTEMPTS", "4"),
                ("WPP_DB_PATH", ""),
            ]))
            .unwrap();

        assert_eq!(config.session.client_id, "store-07");
        assert_eq!(
            config.session.credential_store,
            CredentialStore::Local(PathBuf::from("/srv/auth"))
        );
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.session.reconnect_max_attempts, Some(4));
        assert_eq!(config.delivery.db_path, "data/wpp-gateway.db");
    }

    #[test]
    fn test_remote_db_url_wins_over_data_path() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("WPP_DATA_PATH", "/srv/auth"),
                ("REMOTE_DB_URL", "mongodb://db:27017/wpp"),
            ]))
            .unwrap();
        assert_eq!(
            config.session.credential_store,
            CredentialStore::Remote("mongodb://db:27017/wpp".to_string())
        );
    }

    #[test]
    fn test_env_data_path_keeps_remote_store_from_file() {
        let mut config = Config::from_toml_str(
            r#"
[session]
remote_store_url = "mongodb://db:27017/wpp"
"#,
        )
        .unwrap();
        config
            .apply_overrides(env(&[("WPP_DATA_PATH", "/srv/auth")]))
            .unwrap();
        assert!(matches!(
            config.session.credential_store,
            CredentialStore::Remote(_)
        ));
    }

    #[test]
    fn test_invalid_numeric_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("WPP_RECONNECT_MAX_ATTEMPTS", "many")]));
        match result {
            Err(Error::Config(message)) => {
                assert!(message.contains("WPP_RECONNECT_MAX_ATTEMPTS"))
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut config = Config::default();
        assert!(config.apply_overrides(env(&[("PORT", "70000")])).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.session.reconnect_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.client_id = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
