use std::{str::FromStr, time::Duration};

use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use watchtower_domain::model::{Network, SessionId, SessionOptions, Wei, MAX_POLLING_INTERVAL};
use watchtower_monitor::{SessionError, SessionRequest, StopReport};

use crate::state::AppState;

use super::ApiError;

/// Accepts `"0.5"` as well as `0.5` so callers need not quote amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn to_wei(&self) -> Result<Wei, ApiError> {
        let raw = match self {
            AmountInput::Text(text) => text.clone(),
            AmountInput::Number(number) => number.to_string(),
        };
        Wei::parse_native(raw.trim())
            .map_err(|err| ApiError::InvalidInput(format!("min_value: {err}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub addresses: Vec<String>,
    pub notify_target: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub min_value: Option<AmountInput>,
    #[serde(default)]
    pub include_outgoing: Option<bool>,
    #[serde(default)]
    pub save_transactions: Option<bool>,
    #[serde(default)]
    pub polling_interval_secs: Option<u64>,
}

impl StartSessionRequest {
    fn into_session_request(self, default_interval: Duration) -> Result<SessionRequest, ApiError> {
        let network = self
            .network
            .as_deref()
            .map(|raw| {
                Network::from_str(raw.trim())
                    .map_err(|_| ApiError::InvalidInput(format!("unknown network `{raw}`")))
            })
            .transpose()?;
        let defaults = SessionOptions::default();
        let min_value = match &self.min_value {
            Some(amount) => amount.to_wei()?,
            None => defaults.min_value,
        };
        let interval = match self.polling_interval_secs {
            Some(secs) if secs > MAX_POLLING_INTERVAL.as_secs() => {
                return Err(ApiError::InvalidInput(format!(
                    "polling_interval_secs must not exceed {}",
                    MAX_POLLING_INTERVAL.as_secs()
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => default_interval,
        };

        Ok(SessionRequest {
            addresses: self.addresses,
            notify_target: self.notify_target,
            network,
            options: SessionOptions {
                min_value,
                include_outgoing: self.include_outgoing.unwrap_or(defaults.include_outgoing),
                save_transactions: self
                    .save_transactions
                    .unwrap_or(defaults.save_transactions),
                ..defaults
            }
            .with_polling_interval(interval),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub duration_secs: u64,
    pub ticks: u64,
    pub matches: u64,
    pub last_processed_height: u64,
}

impl From<StopReport> for StopSessionResponse {
    fn from(report: StopReport) -> Self {
        Self {
            session_id: report.session_id.into_inner(),
            duration_secs: report.duration.as_secs(),
            ticks: report.ticks,
            matches: report.matches,
            last_processed_height: report.last_processed_height,
        }
    }
}

fn record_outcome(endpoint: &'static str, result: &Result<HttpResponse, ApiError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!("api_session_requests_total", "endpoint" => endpoint, "status" => status).increment(1);
}

pub async fn start_session_handler(
    state: web::Data<AppState>,
    payload: web::Json<StartSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let result: Result<HttpResponse, ApiError> = async {
        let request = payload
            .into_inner()
            .into_session_request(state.default_poll_interval())?;
        let started = state.registry().start(request).await?;
        Ok(HttpResponse::Created().json(started))
    }
    .await;
    record_outcome("start", &result);
    result
}

pub async fn list_sessions_handler(state: web::Data<AppState>) -> HttpResponse {
    let sessions = state.registry().list().await;
    counter!("api_session_requests_total", "endpoint" => "list", "status" => "ok").increment(1);
    HttpResponse::Ok().json(sessions)
}

pub async fn get_session_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = SessionId::new(path.into_inner());
    let result = state
        .registry()
        .get(&id)
        .await
        .map(|info| HttpResponse::Ok().json(info))
        .map_err(ApiError::from);
    record_outcome("get", &result);
    result
}

pub async fn stop_session_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = SessionId::new(path.into_inner());
    let result = state
        .registry()
        .stop(&id)
        .await
        .map(|report| HttpResponse::Ok().json(StopSessionResponse::from(report)))
        .map_err(ApiError::from);
    record_outcome("stop", &result);
    result
}

pub async fn session_records_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = SessionId::new(path.into_inner());
    let result = match state.registry().records(&id).await {
        Ok(records) => Ok(HttpResponse::Ok().json(records)),
        Err(SessionError::Audit(err)) => {
            tracing::error!(session = %id, %err, "failed to read audit records");
            Err(ApiError::Session(SessionError::Audit(err)))
        }
        Err(err) => Err(err.into()),
    };
    record_outcome("records", &result);
    result
}
