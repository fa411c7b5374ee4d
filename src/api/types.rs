use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Book, BookId, Member, MemberId, MemberStatus, Transaction, TransactionStatus,
    commands::{BorrowBook, RegisterBook, RegisterMember},
};

/// 貸出リクエスト（POST /transactions/borrow）
#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub book_id: Uuid,
    pub member_id: Uuid,
    /// 省略時は既定の貸出日数
    pub loan_days: Option<i64>,
    pub notes: Option<String>,
    /// 省略時は当日
    pub as_of: Option<NaiveDate>,
}

impl BorrowRequest {
    pub fn to_command(self, today: NaiveDate) -> BorrowBook {
        BorrowBook {
            book_id: BookId::from_uuid(self.book_id),
            member_id: MemberId::from_uuid(self.member_id),
            loan_days: self.loan_days,
            notes: self.notes,
            as_of: self.as_of.unwrap_or(today),
        }
    }
}

/// 評価日のクエリパラメータ（省略時は当日）
#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

/// 取引一覧のクエリパラメータ
///
/// 指定できるフィルタは1つまで。指定がなければ全件。
#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub member_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub status: Option<String>,
}

/// 書籍登録リクエスト（POST /books）
#[derive(Debug, Deserialize)]
pub struct RegisterBookRequest {
    pub isbn: String,
    pub title: String,
    pub total_copies: i64,
}

impl From<RegisterBookRequest> for RegisterBook {
    fn from(req: RegisterBookRequest) -> Self {
        Self {
            isbn: req.isbn,
            title: req.title,
            total_copies: req.total_copies,
        }
    }
}

/// 会員登録リクエスト（POST /members）
#[derive(Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub name: String,
    pub email: String,
    /// 省略時は5冊
    pub max_books_allowed: Option<u32>,
}

impl From<RegisterMemberRequest> for RegisterMember {
    fn from(req: RegisterMemberRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            max_books_allowed: req.max_books_allowed,
        }
    }
}

/// 所蔵冊数変更リクエスト（PUT /books/:id/capacity）
#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub total_copies: i64,
}

/// 会員ステータス変更リクエスト（PUT /members/:id/status）
#[derive(Debug, Deserialize)]
pub struct MemberStatusRequest {
    pub status: String,
}

/// 取引レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: String,
    pub fine_amount: Decimal,
    pub notes: Option<String>,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            transaction_id: transaction.transaction_id().value(),
            book_id: transaction.book_id().value(),
            member_id: transaction.member_id().value(),
            borrow_date: transaction.borrow_date(),
            due_date: transaction.due_date(),
            return_date: transaction.return_date(),
            status: transaction.status().as_str().to_string(),
            fine_amount: transaction.fine_amount(),
            notes: transaction.notes().map(str::to_string),
        }
    }
}

/// 書籍レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: Uuid,
    pub isbn: String,
    pub title: String,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            book_id: book.book_id().value(),
            isbn: book.isbn().to_string(),
            title: book.title().to_string(),
            total_copies: book.total_copies(),
            available_copies: book.available_copies(),
        }
    }
}

/// 会員レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: String,
    pub max_books_allowed: u32,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            member_id: member.member_id.value(),
            name: member.name,
            email: member.email,
            status: member.status.as_str().to_string(),
            max_books_allowed: member.max_books_allowed,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// ステータスクエリパラメータのパースとバリデーション
pub fn parse_status_filter(status: &str) -> Result<TransactionStatus, String> {
    status.to_ascii_uppercase().parse::<TransactionStatus>()
}

pub fn parse_member_status(status: &str) -> Result<MemberStatus, String> {
    status.to_ascii_uppercase().parse::<MemberStatus>()
}
