use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600; // hourly cron cadence
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_SENDS_PER_SECOND: u32 = 2;

/// Top-level config (keepsake.toml + KEEPSAKE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeepsakeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub portal: PortalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Token lifetime and the redemption link embedded in notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    /// Public origin of the redemption portal, without trailing slash.
    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,
    /// Path prefix the token is appended to, e.g. `/view` → `/view/<token>`.
    #[serde(default = "default_link_path")]
    pub link_path: String,
}

impl DeliveryConfig {
    /// Full redemption link for a token.
    pub fn redemption_link(&self, token: &str) -> String {
        format!(
            "{}{}/{}",
            self.portal_base_url.trim_end_matches('/'),
            self.link_path.trim_end_matches('/'),
            token
        )
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            portal_base_url: default_portal_base_url(),
            link_path: default_link_path(),
        }
    }
}

/// Which notification dispatcher the binary wires in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Log the notification instead of sending it (local runs, dry runs).
    #[default]
    Log,
    /// POST to a transactional mail API.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mode: NotifyMode,
    /// Mail API endpoint, required when `mode = "http"`.
    pub endpoint: Option<String>,
    /// Bearer token for the mail API.
    pub api_key: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    /// When set, requests carry `X-Keepsake-Signature: sha256=<hex>`.
    pub signing_secret: Option<String>,
    /// Best-effort send cap. 0 disables limiting.
    #[serde(default = "default_max_per_second")]
    pub max_per_second: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::Log,
            endpoint: None,
            api_key: None,
            from: default_from(),
            signing_secret: None,
            max_per_second: DEFAULT_MAX_SENDS_PER_SECOND,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// Messages released in parallel within one sweep tick.
    #[serde(default = "default_sweep_concurrency")]
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_PORT,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.keepsake/keepsake.db", home)
}
fn default_token_ttl_days() -> i64 {
    DEFAULT_TOKEN_TTL_DAYS
}
fn default_portal_base_url() -> String {
    format!("http://{}:{}", DEFAULT_BIND, DEFAULT_PORT)
}
fn default_link_path() -> String {
    "/view".to_string()
}
fn default_from() -> String {
    "Keepsake <messages@keepsake.local>".to_string()
}
fn default_max_per_second() -> u32 {
    DEFAULT_MAX_SENDS_PER_SECOND
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_sweep_concurrency() -> usize {
    DEFAULT_SWEEP_CONCURRENCY
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl KeepsakeConfig {
    /// Load config from a TOML file with KEEPSAKE_* env var overrides.
    ///
    /// Nested keys use a double underscore: `KEEPSAKE_NOTIFY__API_KEY`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: KeepsakeConfig = Figment::from(Serialized::defaults(KeepsakeConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KEEPSAKE_").split("__"))
            .extract()
            .map_err(|e| crate::error::KeepsakeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave silently.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.delivery.token_ttl_days < 1 {
            return Err(crate::error::KeepsakeError::InvalidValue {
                field: "delivery.token_ttl_days",
                value: self.delivery.token_ttl_days.to_string(),
            });
        }
        if self.sweep.concurrency == 0 {
            return Err(crate::error::KeepsakeError::InvalidValue {
                field: "sweep.concurrency",
                value: "0".to_string(),
            });
        }
        if self.notify.mode == NotifyMode::Http && self.notify.endpoint.is_none() {
            return Err(crate::error::KeepsakeError::Config(
                "notify.mode = \"http\" requires notify.endpoint".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.keepsake/keepsake.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KeepsakeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delivery.token_ttl_days, 7);
        assert_eq!(config.notify.mode, NotifyMode::Log);
    }

    #[test]
    fn http_mode_needs_endpoint() {
        let mut config = KeepsakeConfig::default();
        config.notify.mode = NotifyMode::Http;
        assert!(config.validate().is_err());
        config.notify.endpoint = Some("https://mail.example/send".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn redemption_link_joins_cleanly() {
        let mut config = KeepsakeConfig::default();
        config.delivery.portal_base_url = "https://keepsake.example/".into();
        assert_eq!(
            config.delivery.redemption_link("ab12"),
            "https://keepsake.example/view/ab12"
        );
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: KeepsakeConfig = Figment::from(Serialized::defaults(KeepsakeConfig::default()))
            .merge(Toml::string(
                "[sweep]\ninterval_secs = 60\n[notify]\nmax_per_second = 0\n",
            ))
            .extract()
            .expect("extract");
        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.sweep.concurrency, DEFAULT_SWEEP_CONCURRENCY);
        assert_eq!(config.notify.max_per_second, 0);
    }
}
