//! Outbound alerts. Delivery is best effort: one attempt, failures are
//! reported to the caller who logs them and moves on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use watchtower_domain::model::{Network, TransactionRecord, TxDirection};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_api_base(TELEGRAM_API, bot_token, timeout)
    }

    pub fn with_api_base(
        base: &str,
        bot_token: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: format!("{}/bot{}", base.trim_end_matches('/'), bot_token),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_base))
            .json(&json!({
                "chat_id": recipient,
                "text": render_html(title, body),
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(response.status().as_u16()))
        }
    }
}

/// Used when no bot token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        info!(recipient, title, body, "notification");
        Ok(())
    }
}

pub fn render_html(title: &str, body: &str) -> String {
    format!("<b>{}</b>\n{}", escape_html(title), body)
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Title and HTML body for one matched transaction.
pub fn transaction_message(network: Network, record: &TransactionRecord) -> (String, String) {
    let icon = match record.direction {
        TxDirection::Incoming => "📥",
        TxDirection::Outgoing => "📤",
        TxDirection::InternalTx => "🔁",
    };
    let title = format!("{icon} {} transaction on {network}", record.direction.label());
    let to = record
        .to
        .map(|to| format!("<code>{}</code>", to.to_checksum()))
        .unwrap_or_else(|| "contract creation".to_string());
    let body = format!(
        "<b>Value:</b> {} {}\n<b>From:</b> <code>{}</code>\n<b>To:</b> {}\n<b>Block:</b> {}\n<a href=\"{}\">View on explorer</a>",
        record.value.to_native_string(),
        network.native_symbol(),
        record.from.to_checksum(),
        to,
        record.block_number,
        network.explorer_tx_url(&record.hash),
    );
    (title, body)
}

pub fn session_started_message(
    network: Network,
    addresses: usize,
    start_height: u64,
) -> (String, String) {
    (
        "🚀 Monitoring started".to_string(),
        format!(
            "<b>Network:</b> {network}\n<b>Addresses:</b> {addresses}\n<b>Start block:</b> {start_height}"
        ),
    )
}

pub fn session_stopped_message(
    network: Network,
    duration: Duration,
    matches: u64,
) -> (String, String) {
    (
        "🛑 Monitoring stopped".to_string(),
        format!(
            "<b>Network:</b> {network}\n<b>Duration:</b> {}\n<b>Matched transactions:</b> {matches}",
            human_duration(duration)
        ),
    )
}

pub fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
