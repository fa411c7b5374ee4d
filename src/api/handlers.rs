use crate::application::lending::LendingWorkflow;
use crate::domain::{
    BookId, LedgerEvent, MemberId, TransactionId,
    commands::{MarkLost, ReturnBook},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        AsOfQuery, BookResponse, BorrowRequest, CapacityRequest, ListTransactionsQuery,
        MemberResponse, MemberStatusRequest, RegisterBookRequest, RegisterMemberRequest,
        TransactionResponse, parse_member_status, parse_status_filter,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<LendingWorkflow>,
}

/// 評価日が指定されなければ当日（UTC）
fn today_or(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| chrono::Utc::now().date_naive())
}

fn into_responses<T, R: From<T>>(items: Vec<T>) -> Json<Vec<R>> {
    Json(items.into_iter().map(R::from).collect())
}

// ============================================================================
// Command handlers (POST / PUT / DELETE)
// ============================================================================

/// POST /transactions/borrow - 書籍を借りる
///
/// 強制されるビジネスルール:
/// - 書籍が存在し、貸出可能な冊数があること
/// - 会員が存在し、ACTIVEであること
/// - 会員の貸出数が上限を超えないこと
pub async fn borrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let cmd = req.to_command(today_or(None));
    let transaction = state.workflow.borrow(cmd).await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// POST /transactions/:id/return - 書籍を返却
///
/// 延滞していた場合は料金が確定する。返却済みの取引は409。
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = ReturnBook {
        transaction_id: TransactionId::from_uuid(transaction_id),
        as_of: today_or(query.as_of),
    };
    let transaction = state.workflow.return_book(cmd).await?;

    Ok(Json(transaction.into()))
}

/// POST /transactions/:id/lost - 紛失として処理
pub async fn mark_lost(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let cmd = MarkLost {
        transaction_id: TransactionId::from_uuid(transaction_id),
        as_of: today_or(query.as_of),
    };
    let transaction = state.workflow.mark_lost(cmd).await?;

    Ok(Json(transaction.into()))
}

/// DELETE /transactions/:id - 取引を削除（管理操作、在庫は戻さない）
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let deleted = state
        .workflow
        .delete_transaction(TransactionId::from_uuid(transaction_id))
        .await?;

    Ok(Json(deleted.into()))
}

/// POST /books - 書籍を登録
///
/// ISBNが登録済みなら409。
pub async fn register_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    let book = state.workflow.register_book(req.into()).await?;

    Ok((StatusCode::CREATED, Json(book.into())))
}

/// POST /members - 会員を登録
///
/// メールアドレスが登録済みなら409。
pub async fn register_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let member = state.workflow.register_member(req.into()).await?;

    Ok((StatusCode::CREATED, Json(member.into())))
}

/// PUT /books/:id/capacity - 所蔵冊数を変更
pub async fn adjust_capacity(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<CapacityRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = state
        .workflow
        .adjust_capacity(BookId::from_uuid(book_id), req.total_copies)
        .await?;

    Ok(Json(book.into()))
}

/// PUT /members/:id/status - 会員ステータスを変更
pub async fn update_member_status(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
    Json(req): Json<MemberStatusRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let status = parse_member_status(&req.status).map_err(ApiError::BadRequest)?;
    let member = state
        .workflow
        .update_member_status(MemberId::from_uuid(member_id), status)
        .await?;

    Ok(Json(member.into()))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /transactions/overdue - 延滞中の取引一覧
///
/// 評価日時点で延滞している取引を再分類・料金再計算してから返す。
pub async fn list_overdue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let overdue = state.workflow.list_overdue(today_or(query.as_of)).await?;
    Ok(into_responses(overdue))
}

/// GET /transactions/:id - 取引詳細
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state
        .workflow
        .ledger()
        .get(TransactionId::from_uuid(transaction_id))
        .await?;

    Ok(Json(transaction.into()))
}

/// GET /transactions/:id/history - 取引のイベント履歴
pub async fn transaction_history(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEvent>>, ApiError> {
    let events = state
        .workflow
        .ledger()
        .history(TransactionId::from_uuid(transaction_id))
        .await?;

    Ok(Json(events))
}

/// GET /transactions - 取引一覧
///
/// クエリパラメータ（いずれか1つ）:
/// - member_id: 会員IDでフィルタリング
/// - book_id: 書籍IDでフィルタリング
/// - status: 保存ステータスでフィルタリング（BORROWED, OVERDUE, RETURNED, LOST）
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let ledger = state.workflow.ledger();

    let transactions = match (query.member_id, query.book_id, query.status.as_deref()) {
        (None, None, None) => ledger.list_all().await?,
        (Some(member_id), None, None) => {
            ledger.list_by_member(MemberId::from_uuid(member_id)).await?
        }
        (None, Some(book_id), None) => ledger.list_by_book(BookId::from_uuid(book_id)).await?,
        (None, None, Some(status)) => {
            let status = parse_status_filter(status).map_err(ApiError::BadRequest)?;
            ledger.list_by_status(status).await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Specify at most one of member_id, book_id, status".to_string(),
            ));
        }
    };

    Ok(into_responses(transactions))
}

/// GET /members/:id/transactions/active - 会員の貸出中の取引
pub async fn list_active_for_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let active = state
        .workflow
        .list_active_for_member(MemberId::from_uuid(member_id))
        .await?;

    Ok(into_responses(active))
}

/// GET /members/:id
pub async fn get_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = state.workflow.member(MemberId::from_uuid(member_id)).await?;
    Ok(Json(member.into()))
}

/// GET /members/by-email/:email
pub async fn get_member_by_email(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<MemberResponse>, ApiError> {
    state
        .workflow
        .member_by_email(&email)
        .await?
        .map(|member| Json(member.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Member not found: {email}")))
}

/// GET /books/:id
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = state.workflow.book(BookId::from_uuid(book_id)).await?;
    Ok(Json(book.into()))
}

/// GET /books/by-isbn/:isbn
pub async fn get_book_by_isbn(
    State(state): State<Arc<AppState>>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, ApiError> {
    state
        .workflow
        .book_by_isbn(&isbn)
        .await?
        .map(|book| Json(book.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Book not found: {isbn}")))
}
