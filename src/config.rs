use serde::Deserialize;

use crate::wallet::types::normalize_address;

/// Environment variable consulted when no API key is configured inline.
pub const API_KEY_ENV: &str = "NODIT_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub threat_intel: ThreatIntelConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub wallets: Vec<WalletSeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

// ============================================================
// Live feed
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_feed_url")]
    pub url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_feed_events")]
    pub events: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_feed_url(),
            api_key: None,
            reconnect_base_ms: default_reconnect_base_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            events: default_feed_events(),
        }
    }
}

fn default_feed_url() -> String {
    "wss://web3.nodit.io/v1/websocket".to_string()
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_feed_events() -> Vec<String> {
    ["transaction", "token_transfer", "contract_interaction", "nft_transfer"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ============================================================
// Snapshot polling
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_snapshot_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval_secs(),
            concurrency: default_poll_concurrency(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            base_url: default_snapshot_base_url(),
            api_key: None,
            network: default_network(),
            history_limit: default_history_limit(),
            page_size: default_page_size(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_poll_concurrency() -> usize {
    8
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_snapshot_base_url() -> String {
    "https://web3.nodit.io/v1".to_string()
}

fn default_network() -> String {
    "mainnet".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_page_size() -> u32 {
    10
}

// ============================================================
// Risk scoring
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_high_value_usd")]
    pub high_value_usd: f64,
    #[serde(default = "default_frequency_window_secs")]
    pub frequency_window_secs: u64,
    #[serde(default = "default_max_transactions_per_window")]
    pub max_transactions_per_window: i64,
    #[serde(default = "default_sandwich_min_siblings")]
    pub sandwich_min_siblings: i64,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u8,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_value_usd: default_high_value_usd(),
            frequency_window_secs: default_frequency_window_secs(),
            max_transactions_per_window: default_max_transactions_per_window(),
            sandwich_min_siblings: default_sandwich_min_siblings(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

fn default_high_value_usd() -> f64 {
    50_000.0
}

fn default_frequency_window_secs() -> u64 {
    3600
}

fn default_max_transactions_per_window() -> i64 {
    15
}

fn default_sandwich_min_siblings() -> i64 {
    3
}

fn default_alert_threshold() -> u8 {
    5
}

// ============================================================
// Collaborators
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ThreatIntelConfig {
    pub deny_list_path: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

/// A wallet tracked from startup, in addition to those already stored.
#[derive(Debug, Deserialize, Clone)]
pub struct WalletSeedConfig {
    pub address: String,
    pub chains: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Fill missing API keys from the environment.
    fn apply_env(&mut self) {
        let from_env = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        if self.feed.api_key.is_none() {
            self.feed.api_key = from_env.clone();
        }
        if self.poll.api_key.is_none() {
            self.poll.api_key = from_env;
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.feed.enabled {
            if !self.feed.url.starts_with("ws://") && !self.feed.url.starts_with("wss://") {
                return Err(eyre::eyre!(
                    "Feed URL '{}' must use ws:// or wss://",
                    self.feed.url
                ));
            }
            if self.feed.reconnect_base_ms == 0 {
                return Err(eyre::eyre!("feed.reconnect_base_ms must be greater than zero"));
            }
        }
        if self.poll.enabled {
            if self.poll.interval_secs == 0 {
                return Err(eyre::eyre!("poll.interval_secs must be greater than zero"));
            }
            if self.poll.concurrency == 0 {
                return Err(eyre::eyre!("poll.concurrency must be greater than zero"));
            }
            if self.poll.api_key.is_none() {
                return Err(eyre::eyre!(
                    "Snapshot polling needs poll.api_key or the {} environment variable",
                    API_KEY_ENV
                ));
            }
        }
        if self.poll.history_limit == 0 {
            return Err(eyre::eyre!("poll.history_limit must be greater than zero"));
        }
        if self.risk.alert_threshold > 10 {
            return Err(eyre::eyre!(
                "risk.alert_threshold {} is above the maximum score of 10",
                self.risk.alert_threshold
            ));
        }
        for wallet in &self.wallets {
            normalize_address(&wallet.address)?;
            if wallet.chains.is_empty() {
                return Err(eyre::eyre!(
                    "Wallet '{}' must list at least one chain",
                    wallet.address
                ));
            }
        }
        Ok(())
    }
}
