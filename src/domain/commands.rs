use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BookId, MemberId, TransactionId};

/// コマンド：書籍を借りる
///
/// `loan_days`が`None`の場合はポリシーの既定日数を使う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowBook {
    pub book_id: BookId,
    pub member_id: MemberId,
    pub loan_days: Option<i64>,
    pub notes: Option<String>,
    pub as_of: NaiveDate,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnBook {
    pub transaction_id: TransactionId,
    pub as_of: NaiveDate,
}

/// コマンド：紛失として処理する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLost {
    pub transaction_id: TransactionId,
    pub as_of: NaiveDate,
}

/// コマンド：書籍を登録する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBook {
    pub isbn: String,
    pub title: String,
    pub total_copies: i64,
}

/// コマンド：会員を登録する
///
/// `max_books_allowed`が`None`の場合は既定の上限（5冊）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMember {
    pub name: String,
    pub email: String,
    pub max_books_allowed: Option<u32>,
}
