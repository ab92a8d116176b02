pub mod metrics;
pub mod session;

pub use metrics::metrics_handler;
pub use session::{
    get_session_handler, list_sessions_handler, session_records_handler, start_session_handler,
    stop_session_handler,
};

use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use watchtower_monitor::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) | ApiError::Session(SessionError::InvalidInput(_)) => {
                "invalid_input"
            }
            ApiError::Session(SessionError::NoValidAddresses) => "no_valid_addresses",
            ApiError::Session(SessionError::ProviderUnavailable { .. }) => "provider_unavailable",
            ApiError::Session(SessionError::SessionNotFound(_)) => "not_found",
            ApiError::Session(SessionError::Entropy(_) | SessionError::Audit(_)) => "internal",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Session(err) => match err {
                SessionError::InvalidInput(_) | SessionError::NoValidAddresses => {
                    StatusCode::BAD_REQUEST
                }
                SessionError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                SessionError::Entropy(_) | SessionError::Audit(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Session routes shared by the public listener and the tests.
pub fn session_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/sessions", web::post().to(start_session_handler))
        .route("/api/v1/sessions", web::get().to(list_sessions_handler))
        .route("/api/v1/sessions/{id}", web::get().to(get_session_handler))
        .route("/api/v1/sessions/{id}", web::delete().to(stop_session_handler))
        .route(
            "/api/v1/sessions/{id}/records",
            web::get().to(session_records_handler),
        );
}
