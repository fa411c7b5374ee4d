use crate::application::lending::{ErrorKind, LendingError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、エラー種別からHTTPステータスを決める。
#[derive(Debug)]
pub enum ApiError {
    Lending(LendingError),
    /// パス・クエリ・本文の値が解釈できない
    BadRequest(String),
    /// 自然キー（メール・ISBN）での検索に該当なし
    NotFound(String),
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError::Lending(err)
    }
}

/// クライアント向けのエラーコード
fn error_code(err: &LendingError) -> &'static str {
    match err {
        LendingError::BookNotFound(_) => "BOOK_NOT_FOUND",
        LendingError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
        LendingError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
        LendingError::OutOfStock(_) => "OUT_OF_STOCK",
        LendingError::MemberNotActive => "MEMBER_NOT_ACTIVE",
        LendingError::BorrowLimitReached { .. } => "BORROW_LIMIT_REACHED",
        LendingError::AlreadyReturned => "ALREADY_RETURNED",
        LendingError::InvalidTransactionState(_) => "INVALID_TRANSACTION_STATE",
        LendingError::InvalidLoanPeriod(_) => "INVALID_LOAN_PERIOD",
        LendingError::InvalidCapacity(_) => "INVALID_CAPACITY",
        LendingError::NotesTooLong { .. } => "NOTES_TOO_LONG",
        LendingError::InvalidRegistration(_) => "INVALID_REGISTRATION",
        LendingError::DuplicateIsbn(_) => "DUPLICATE_ISBN",
        LendingError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
        LendingError::InventoryInvariantViolated { .. } => "INVENTORY_INVARIANT_VIOLATED",
        LendingError::CatalogStoreError(_) => "CATALOG_STORE_ERROR",
        LendingError::MembershipStoreError(_) => "MEMBERSHIP_STORE_ERROR",
        LendingError::LedgerStoreError(_) => "LEDGER_STORE_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BAD_REQUEST", message),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("NOT_FOUND", message),
            ),
            ApiError::Lending(err) => {
                let code = error_code(&err);
                match err.kind() {
                    // 404 Not Found - リクエストされたリソースが存在しない
                    ErrorKind::NotFound => {
                        (StatusCode::NOT_FOUND, ErrorResponse::new(code, err.to_string()))
                    }
                    // 409 Conflict - 現在の状態と衝突する
                    ErrorKind::Conflict => {
                        (StatusCode::CONFLICT, ErrorResponse::new(code, err.to_string()))
                    }
                    // 400 Bad Request - 入力の誤り
                    ErrorKind::InvalidInput => {
                        (StatusCode::BAD_REQUEST, ErrorResponse::new(code, err.to_string()))
                    }
                    // 500 - 在庫と台帳の不整合。運用者の調査が必要
                    ErrorKind::InvariantViolated => {
                        tracing::error!(error = %err, "inventory invariant violated");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            ErrorResponse::new(code, err.to_string()),
                        )
                    }
                    // 500 - システム障害
                    // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
                    ErrorKind::Backend => {
                        let source = std::error::Error::source(&err)
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        tracing::error!(error = %err, %source, "store failure");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            ErrorResponse::new(code, "An unexpected error occurred"),
                        )
                    }
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
