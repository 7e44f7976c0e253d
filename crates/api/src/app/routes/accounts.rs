use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use ledger_accounting::{BalanceChangeOutcome, RecordOutcome, Rejection};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/update-balance", post(update_balance))
        .route("/transactions", post(record_transaction))
}

/// Apply a debit or credit. Business rejections are `200` with `success: false`.
pub async fn update_balance(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::UpdateBalanceRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let cmd = match body.into_command() {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine().apply_balance_change(cmd).await {
        Ok(BalanceChangeOutcome::Applied(receipt)) => {
            (StatusCode::OK, Json(dto::UpdateBalanceResponse::from(receipt))).into_response()
        }
        Ok(BalanceChangeOutcome::Rejected(rejection)) => {
            (StatusCode::OK, Json(dto::RejectionResponse::from(&rejection))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Record a row for a balance change applied elsewhere. Unknown accounts are `404`.
pub async fn record_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RecordTransactionRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let cmd = match body.into_command() {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine().record_transaction(cmd).await {
        Ok(RecordOutcome::Recorded(receipt)) => {
            (StatusCode::OK, Json(dto::RecordTransactionResponse::from(receipt))).into_response()
        }
        Ok(RecordOutcome::Rejected(rejection)) => {
            let status = match rejection {
                Rejection::AccountNotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::OK,
            };
            (status, Json(dto::RejectionResponse::from(&rejection))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
