use std::{any::Any, sync::Arc};

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::Response,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::{analyzer::Analyzer, error::GatewayError, intake::read_multipart, models::AnalysisResult};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
}

pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin)
        )
        .with_state(state)
}

pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, GatewayError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analyze", %request_id);
    async move {
        let multipart = multipart.map_err(|rejection| GatewayError::Input(rejection.body_text()))?;
        let bundle = read_multipart(multipart).await?;
        info!("🚀 Received {} image(s), language {}", bundle.images.len(), bundle.language.tag());
        state.analyzer.analyze(bundle).await.map(Json)
    }
    .instrument(span)
    .await
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.analyzer.model(),
        "fields": state.analyzer.schema().keys().collect::<Vec<_>>(),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<axum::body::Body> {
    let message = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("💥 Handler panicked: {}", message);
    GatewayError::Unexpected("internal error while processing the request".into()).into_response()
}
