use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledger_core::DomainError;
use ledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Validation(e) => domain_error_to_response(e),
        e @ LedgerError::InconsistentState { .. } => {
            json_error(StatusCode::CONFLICT, "inconsistent_state", e.to_string())
        }
        LedgerError::Store(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "error": "service_error",
                "message": e.to_string(),
                "retryable": e.is_transient(),
            })),
        )
            .into_response(),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
