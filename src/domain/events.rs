use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BookId, MemberId, TransactionId, TransactionStatus};

/// イベント：書籍が貸し出された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookBorrowed {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// イベント：書籍が返却された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReturned {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub return_date: NaiveDate,
    pub was_overdue: bool,
    pub fine_amount: Decimal,
}

/// イベント：取引が延滞になった
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBecameOverdue {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub due_date: NaiveDate,
    pub detected_on: NaiveDate,
    pub fine_to_date: Decimal,
}

/// イベント：紛失として処理された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMarkedLost {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub marked_on: NaiveDate,
    pub fine_amount: Decimal,
}

/// イベント：取引が管理操作で削除された
///
/// 在庫は戻さない。`status_at_deletion`が貸出中なら1冊分が宙に浮く。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDeleted {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub status_at_deletion: TransactionStatus,
}

/// 台帳イベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    BookBorrowed(BookBorrowed),
    BookReturned(BookReturned),
    TransactionBecameOverdue(TransactionBecameOverdue),
    TransactionMarkedLost(TransactionMarkedLost),
    TransactionDeleted(TransactionDeleted),
}

impl LedgerEvent {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            LedgerEvent::BookBorrowed(e) => e.transaction_id,
            LedgerEvent::BookReturned(e) => e.transaction_id,
            LedgerEvent::TransactionBecameOverdue(e) => e.transaction_id,
            LedgerEvent::TransactionMarkedLost(e) => e.transaction_id,
            LedgerEvent::TransactionDeleted(e) => e.transaction_id,
        }
    }
}
