use thiserror::Error;

use crate::domain::{BookId, MemberId, TransactionId};

/// エラー種別
///
/// 呼び出し側への見せ方を決めるための分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 書籍・会員・取引が存在しない
    NotFound,
    /// 現在の状態と衝突するビジネスルール違反
    Conflict,
    /// 不正な入力
    InvalidInput,
    /// 在庫と台帳の不整合（致命的、再試行しない）
    InvariantViolated,
    /// 外部ストアの障害
    Backend,
}

/// 貸出アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// 貸出可能な冊数がない（事前確認・確保のどちらで検出しても同じ）
    #[error("No available copies of book {0}")]
    OutOfStock(BookId),

    #[error("Member is not active")]
    MemberNotActive,

    #[error("Member has reached maximum borrowing limit ({active}/{limit})")]
    BorrowLimitReached { active: usize, limit: u32 },

    #[error("Book has already been returned")]
    AlreadyReturned,

    /// 取引の状態がこの操作を許さない（例: LOSTの返却）
    #[error("Invalid transaction state: {0}")]
    InvalidTransactionState(String),

    #[error("Loan period must be a positive number of days (got {0})")]
    InvalidLoanPeriod(i64),

    #[error("Total copies must be at least 1 (got {0})")]
    InvalidCapacity(i64),

    #[error("Notes must be at most {max} characters")]
    NotesTooLong { max: usize },

    /// 書籍・会員の登録内容が不正
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("A book with ISBN {0} is already registered")]
    DuplicateIsbn(String),

    #[error("A member with email {0} is already registered")]
    DuplicateEmail(String),

    /// 在庫と台帳の不整合
    #[error("Inventory invariant violated for book {book_id}: {detail}")]
    InventoryInvariantViolated { book_id: BookId, detail: String },

    #[error("Catalog store error")]
    CatalogStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Membership store error")]
    MembershipStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Ledger store error")]
    LedgerStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::BookNotFound(_)
            | LendingError::MemberNotFound(_)
            | LendingError::TransactionNotFound(_) => ErrorKind::NotFound,

            LendingError::OutOfStock(_)
            | LendingError::MemberNotActive
            | LendingError::BorrowLimitReached { .. }
            | LendingError::AlreadyReturned
            | LendingError::InvalidTransactionState(_)
            | LendingError::DuplicateIsbn(_)
            | LendingError::DuplicateEmail(_) => ErrorKind::Conflict,

            LendingError::InvalidLoanPeriod(_)
            | LendingError::InvalidCapacity(_)
            | LendingError::NotesTooLong { .. }
            | LendingError::InvalidRegistration(_) => ErrorKind::InvalidInput,

            LendingError::InventoryInvariantViolated { .. } => ErrorKind::InvariantViolated,

            LendingError::CatalogStoreError(_)
            | LendingError::MembershipStoreError(_)
            | LendingError::LedgerStoreError(_) => ErrorKind::Backend,
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LendingError>;
