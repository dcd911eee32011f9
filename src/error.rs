use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Input(String),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("upstream returned status {status}")]
    UpstreamHttp { status: u16, body: String },
    #[error("upstream reply was not usable: {reason}")]
    UpstreamFormat { reason: String, content: Option<String> },
    #[error("upstream did not answer within {0} seconds")]
    UpstreamTimeout(u64),
    #[error("could not reach upstream: {0}")]
    UpstreamTransport(String),
    #[error("{0}")]
    Unexpected(String),
}

impl GatewayError {
    pub fn format(reason: impl Into<String>) -> Self {
        GatewayError::UpstreamFormat { reason: reason.into(), content: None }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Input(_) => "input",
            GatewayError::Configuration(_) => "configuration",
            GatewayError::UpstreamHttp { .. } => "upstream_http",
            GatewayError::UpstreamFormat { .. } => "upstream_format",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::UpstreamTransport(_) => "upstream_transport",
            GatewayError::Unexpected(_) => "unexpected",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Input(_) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_) | GatewayError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamHttp { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            GatewayError::UpstreamFormat { .. } | GatewayError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            GatewayError::UpstreamHttp { body, .. } => Some(body.clone()),
            GatewayError::UpstreamFormat { content, .. } => content.clone(),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { error: self.to_string(), kind: self.kind().to_string(), details: self.details() }
    }
}

/// JSON shape of every failure response.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "❌ {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
