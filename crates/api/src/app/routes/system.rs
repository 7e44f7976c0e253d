use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use ledger_infra::LedgerStore;

use crate::app::services::AppServices;

pub const SERVICE_NAME: &str = "ledger-api";

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": SERVICE_NAME,
                "database": true,
                "timestamp": Utc::now(),
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": SERVICE_NAME,
                    "database": false,
                    "error": e.to_string(),
                    "timestamp": Utc::now(),
                })),
            )
                .into_response()
        }
    }
}
