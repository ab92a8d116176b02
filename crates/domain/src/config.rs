//! Environment-driven configuration structures shared by all binaries.

use std::{collections::BTreeMap, env, path::PathBuf, str::FromStr, time::Duration};

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::model::{Network, SessionOptions, Wei, DEFAULT_POLLING_INTERVAL};
use crate::services::DedupWindow;

/// API-specific configuration so the HTTP surface does not depend on
/// monitor-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
        })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }
}

/// Collaborator wiring for the monitor engine: provider endpoints per network,
/// the notification channel and the audit destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    rpc_urls: BTreeMap<Network, String>,
    default_network: Network,
    telegram_bot_token: Option<String>,
    audit_log_dir: PathBuf,
    audit_database_url: Option<String>,
    poll_interval: Duration,
    dedup_capacity: usize,
    rpc_timeout: Duration,
}

impl MonitorConfig {
    /// Reads `RPC_URL_<NETWORK>` for every known network; at least one must be
    /// present. Everything else is optional.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let rpc_urls: BTreeMap<Network, String> = Network::iter()
            .filter_map(|network| {
                let key = format!("RPC_URL_{}", network.as_ref().to_ascii_uppercase());
                get_optional_var(&key).map(|url| (network, url))
            })
            .collect();
        if rpc_urls.is_empty() {
            return Err(ConfigError::NoRpcEndpoints);
        }

        let default_network = match get_optional_var("DEFAULT_NETWORK") {
            Some(raw) => parse_network("DEFAULT_NETWORK", &raw)?,
            None => Network::Mainnet,
        };

        let poll_secs = parse_optional_number("MONITOR_POLL_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_POLLING_INTERVAL.as_secs());
        let dedup_capacity = parse_optional_number("MONITOR_DEDUP_CAPACITY")?
            .map(|value| value as usize)
            .unwrap_or(DedupWindow::DEFAULT_CAPACITY);
        let rpc_timeout_secs = parse_optional_number("RPC_TIMEOUT_SECS")?.unwrap_or(15);

        Ok(Self {
            rpc_urls,
            default_network,
            telegram_bot_token: get_optional_var("TELEGRAM_BOT_TOKEN"),
            audit_log_dir: get_optional_var("AUDIT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            audit_database_url: get_optional_var("AUDIT_DATABASE_URL"),
            poll_interval: Duration::from_secs(poll_secs),
            dedup_capacity,
            rpc_timeout: Duration::from_secs(rpc_timeout_secs.max(1)),
        })
    }

    pub fn rpc_urls(&self) -> &BTreeMap<Network, String> {
        &self.rpc_urls
    }

    pub fn rpc_url(&self, network: Network) -> Option<&str> {
        self.rpc_urls.get(&network).map(String::as_str)
    }

    pub fn default_network(&self) -> Network {
        self.default_network
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram_bot_token.as_deref()
    }

    pub fn audit_log_dir(&self) -> &PathBuf {
        &self.audit_log_dir
    }

    pub fn audit_database_url(&self) -> Option<&str> {
        self.audit_database_url.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn dedup_capacity(&self) -> usize {
        self.dedup_capacity
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }
}

/// What the standalone monitor binary watches when it runs without the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    addresses: Vec<String>,
    notify_target: String,
    network: Option<Network>,
    min_value: Wei,
    include_outgoing: bool,
}

impl WatchConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let addresses = get_required_var("WATCH_ADDRESSES")?
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        let notify_target = get_required_var("WATCH_NOTIFY_TARGET")?;
        let network = get_optional_var("WATCH_NETWORK")
            .map(|raw| parse_network("WATCH_NETWORK", &raw))
            .transpose()?;
        let min_value = match get_optional_var("WATCH_MIN_VALUE") {
            Some(raw) => Wei::parse_native(&raw).map_err(|err| ConfigError::InvalidValue {
                key: "WATCH_MIN_VALUE",
                message: err.to_string(),
            })?,
            None => Wei::ZERO,
        };
        let include_outgoing = match get_optional_var("WATCH_INCLUDE_OUTGOING") {
            Some(raw) => parse_bool("WATCH_INCLUDE_OUTGOING", &raw)?,
            None => false,
        };

        Ok(Self {
            addresses,
            notify_target,
            network,
            min_value,
            include_outgoing,
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn notify_target(&self) -> &str {
        &self.notify_target
    }

    pub fn network(&self) -> Option<Network> {
        self.network
    }

    /// Session options derived from the watch settings plus the monitor-wide
    /// polling cadence.
    pub fn session_options(&self, poll_interval: Duration) -> SessionOptions {
        SessionOptions {
            min_value: self.min_value,
            include_outgoing: self.include_outgoing,
            ..SessionOptions::default()
        }
        .with_polling_interval(poll_interval)
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_optional_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|raw| {
            raw.parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn parse_network(key: &'static str, raw: &str) -> Result<Network, ConfigError> {
    Network::from_str(raw).map_err(|_| ConfigError::InvalidValue {
        key,
        message: format!("unknown network `{raw}`"),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            message: format!("expected a boolean, got `{raw}`"),
        }),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("WATCHTOWER_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid value in `{key}`: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("no RPC endpoint configured; set at least one RPC_URL_<NETWORK>")]
    NoRpcEndpoints,
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
