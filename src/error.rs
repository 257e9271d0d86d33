use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::validation::FieldError;

/// Coarse classification used to pick a status code and a stable `kind` in
/// the error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    Conflict,
    Forbidden,
    Unauthorized,
    BusinessRuleViolation,
    Integrity,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("wallet not found")]
    WalletNotFound,

    #[error("wallet already created")]
    WalletAlreadyExists,

    #[error("product with id '{0}' not found")]
    ProductNotFound(Uuid),

    #[error("product with name {0} stock not enough")]
    ProductStockNotEnough(String),

    #[error("product '{0}' not found or stock not enough")]
    ProductNotFoundOrInsufficientStock(Uuid),

    #[error("cannot purchase own product")]
    CannotPurchaseOwnProduct,

    #[error("cannot update product, not owner")]
    CannotUpdateNotOwner,

    #[error("cannot delete product, not owner")]
    CannotDeleteNotOwner,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("wallet balance limit exceeded")]
    BalanceLimitExceeded,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("transaction detail inserted {inserted} rows, expected {expected}")]
    DetailInsertCountMismatch { expected: u64, inserted: u64 },

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("email or password invalid")]
    InvalidCredentials,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("operation timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::ValidationFailed,
            AppError::WalletNotFound
            | AppError::ProductNotFound(_)
            | AppError::TransactionNotFound => ErrorKind::NotFound,
            AppError::WalletAlreadyExists | AppError::EmailAlreadyRegistered => {
                ErrorKind::Conflict
            }
            AppError::CannotPurchaseOwnProduct
            | AppError::CannotUpdateNotOwner
            | AppError::CannotDeleteNotOwner => ErrorKind::Forbidden,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::InsufficientBalance
            | AppError::BalanceLimitExceeded
            | AppError::ProductStockNotEnough(_)
            | AppError::ProductNotFoundOrInsufficientStock(_) => {
                ErrorKind::BusinessRuleViolation
            }
            AppError::DetailInsertCountMismatch { .. } => ErrorKind::Integrity,
            AppError::Timeout | AppError::Database(_) | AppError::Internal(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        if matches!(self, AppError::Timeout) {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match self.kind() {
            ErrorKind::ValidationFailed | ErrorKind::BusinessRuleViolation => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Integrity | ErrorKind::Infrastructure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        let message = if status.is_server_error() {
            tracing::error!("request failed: {}", self);
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            tracing::warn!("request rejected: {}", self);
            self.to_string()
        };

        let body = match self {
            AppError::Validation(errors) => json!({
                "code": status.as_u16(),
                "kind": kind,
                "message": message,
                "errors": errors,
            }),
            _ => json!({
                "code": status.as_u16(),
                "kind": kind,
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::validation(AppError::Validation(vec![]), StatusCode::BAD_REQUEST)]
    #[case::wallet_not_found(AppError::WalletNotFound, StatusCode::NOT_FOUND)]
    #[case::product_not_found(AppError::ProductNotFound(Uuid::nil()), StatusCode::NOT_FOUND)]
    #[case::transaction_not_found(AppError::TransactionNotFound, StatusCode::NOT_FOUND)]
    #[case::wallet_exists(AppError::WalletAlreadyExists, StatusCode::CONFLICT)]
    #[case::own_product(AppError::CannotPurchaseOwnProduct, StatusCode::FORBIDDEN)]
    #[case::not_owner(AppError::CannotDeleteNotOwner, StatusCode::FORBIDDEN)]
    #[case::insufficient_balance(AppError::InsufficientBalance, StatusCode::BAD_REQUEST)]
    #[case::balance_limit(AppError::BalanceLimitExceeded, StatusCode::BAD_REQUEST)]
    #[case::stock(AppError::ProductStockNotEnough("mug".into()), StatusCode::BAD_REQUEST)]
    #[case::credentials(AppError::InvalidCredentials, StatusCode::UNAUTHORIZED)]
    #[case::timeout(AppError::Timeout, StatusCode::GATEWAY_TIMEOUT)]
    #[case::database(AppError::Database(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case::integrity(
        AppError::DetailInsertCountMismatch { expected: 2, inserted: 1 },
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn test_status_code(#[case] error: AppError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[rstest]
    #[case::product_not_found(
        AppError::ProductNotFound(Uuid::nil()),
        "product with id '00000000-0000-0000-0000-000000000000' not found"
    )]
    #[case::stock(AppError::ProductStockNotEnough("mug".into()), "product with name mug stock not enough")]
    #[case::mismatch(
        AppError::DetailInsertCountMismatch { expected: 3, inserted: 2 },
        "transaction detail inserted 2 rows, expected 3"
    )]
    fn test_error_display(#[case] error: AppError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_detail_mismatch_is_integrity() {
        let error = AppError::DetailInsertCountMismatch {
            expected: 2,
            inserted: 0,
        };
        assert_eq!(error.kind(), ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn test_validation_error_response_lists_fields() {
        let error = AppError::Validation(vec![FieldError::new("amount", "must be greater than 0")]);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "validation_failed");
        assert_eq!(body["errors"][0]["field"], "amount");
        assert_eq!(body["errors"][0]["message"], "must be greater than 0");
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let error = AppError::Internal("pool exhausted on shard 3".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
        assert_eq!(body["kind"], "infrastructure");
    }
}
