use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, adjust_capacity, borrow, delete_transaction, get_book, get_book_by_isbn,
    get_member, get_member_by_email, get_transaction, list_active_for_member, list_overdue,
    list_transactions, mark_lost, register_book, register_member, return_book,
    transaction_history, update_member_status,
};

/// 貸出APIのルーターを作成する
///
/// Command endpoints:
/// - POST /transactions/borrow - Borrow a book
/// - POST /transactions/:id/return - Return a book
/// - POST /transactions/:id/lost - Mark a transaction as lost
/// - DELETE /transactions/:id - Delete a transaction (admin)
/// - POST /books - Register a book
/// - POST /members - Register a member
/// - PUT /books/:id/capacity - Change total copies
/// - PUT /members/:id/status - Suspend or reactivate a member
///
/// Query endpoints:
/// - GET /transactions?member_id=|book_id=|status=
/// - GET /transactions/overdue?as_of=
/// - GET /transactions/:id
/// - GET /transactions/:id/history
/// - GET /members/:id, GET /members/by-email/:email
/// - GET /members/:id/transactions/active
/// - GET /books/:id, GET /books/by-isbn/:isbn
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Transactions
        .route("/transactions", get(list_transactions))
        .route("/transactions/borrow", post(borrow))
        .route("/transactions/overdue", get(list_overdue))
        .route(
            "/transactions/:id",
            get(get_transaction).delete(delete_transaction),
        )
        .route("/transactions/:id/return", post(return_book))
        .route("/transactions/:id/lost", post(mark_lost))
        .route("/transactions/:id/history", get(transaction_history))
        // Members
        .route("/members", post(register_member))
        .route("/members/by-email/:email", get(get_member_by_email))
        .route("/members/:id", get(get_member))
        .route("/members/:id/status", put(update_member_status))
        .route(
            "/members/:id/transactions/active",
            get(list_active_for_member),
        )
        // Books
        .route("/books", post(register_book))
        .route("/books/by-isbn/:isbn", get(get_book_by_isbn))
        .route("/books/:id", get(get_book))
        .route("/books/:id/capacity", put(adjust_capacity))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
