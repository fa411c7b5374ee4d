use serde::Serialize;

use super::errors::check_text;
use super::{BookId, InventoryError, RegistrationError};

/// 1タイトルあたりの所蔵冊数の上限（INTEGER列に収まる範囲）
pub const MAX_TOTAL_COPIES: u32 = i32::MAX as u32;

pub const MAX_ISBN_LEN: usize = 20;
pub const MAX_TITLE_LEN: usize = 255;

/// 書籍 - カタログが所有し、貸出コンテキストが参照する
///
/// 不変条件：`0 <= available_copies <= total_copies` かつ `total_copies >= 1`
///
/// フィールドは非公開。冊数の変更はこのモジュールの純粋関数を経由した
/// 新しい値の生成でのみ行われる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    book_id: BookId,
    isbn: String,
    title: String,
    total_copies: u32,
    available_copies: u32,
}

impl Book {
    /// 新規登録（全冊貸出可能）
    pub fn new(
        book_id: BookId,
        isbn: impl Into<String>,
        title: impl Into<String>,
        total_copies: u32,
    ) -> Result<Self, InventoryError> {
        Self::restore(book_id, isbn, title, total_copies, total_copies)
    }

    /// 永続化された値から復元する
    ///
    /// # エラー
    /// 冊数が不変条件を満たさない場合はエラーを返す
    pub fn restore(
        book_id: BookId,
        isbn: impl Into<String>,
        title: impl Into<String>,
        total_copies: u32,
        available_copies: u32,
    ) -> Result<Self, InventoryError> {
        if !(1..=MAX_TOTAL_COPIES).contains(&total_copies) {
            return Err(InventoryError::InvalidCapacity {
                requested: i64::from(total_copies),
            });
        }
        if available_copies > total_copies {
            return Err(InventoryError::InvariantViolated {
                available: available_copies,
                total: total_copies,
                delta: 0,
            });
        }

        Ok(Self {
            book_id,
            isbn: isbn.into(),
            title: title.into(),
            total_copies,
            available_copies,
        })
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    /// 1冊以上貸出可能か
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

/// 純粋関数：書誌情報を検証する
pub fn validate_catalog_entry(isbn: &str, title: &str) -> Result<(), RegistrationError> {
    check_text("isbn", isbn, MAX_ISBN_LEN)?;
    check_text("title", title, MAX_TITLE_LEN)
}

/// 純粋関数：貸出可能冊数を増減する
///
/// 結果が`0..=total_copies`に収まらない場合は丸めずにエラーとする。
/// 範囲外の要求は台帳との不整合を意味するため。
pub fn apply_available_delta(book: &Book, delta: i64) -> Result<Book, InventoryError> {
    let next = i64::from(book.available_copies) + delta;
    if next < 0 || next > i64::from(book.total_copies) {
        return Err(InventoryError::InvariantViolated {
            available: book.available_copies,
            total: book.total_copies,
            delta,
        });
    }

    Ok(Book {
        available_copies: next as u32,
        ..book.clone()
    })
}

/// 純粋関数：1冊確保する
///
/// # エラー
/// 貸出可能冊数が0の場合は`InventoryError::OutOfStock`
pub fn reserve_copy(book: &Book) -> Result<Book, InventoryError> {
    if !book.is_available() {
        return Err(InventoryError::OutOfStock);
    }
    apply_available_delta(book, -1)
}

/// 純粋関数：1冊戻す
///
/// # エラー
/// 既に全冊が在庫にある場合は`InventoryError::InvariantViolated`
pub fn release_copy(book: &Book) -> Result<Book, InventoryError> {
    apply_available_delta(book, 1)
}

/// 純粋関数：所蔵冊数を変更する
///
/// ビジネスルール：
/// - 新しい所蔵冊数は1以上`MAX_TOTAL_COPIES`以下
/// - 貸出可能冊数は同じ差分だけ増減し、0を下限とする
pub fn resize_capacity(book: &Book, new_total: i64) -> Result<Book, InventoryError> {
    let total = match u32::try_from(new_total) {
        Ok(total) if (1..=MAX_TOTAL_COPIES).contains(&total) => total,
        _ => {
            return Err(InventoryError::InvalidCapacity {
                requested: new_total,
            });
        }
    };

    let delta = i64::from(total) - i64::from(book.total_copies);
    let available = (i64::from(book.available_copies) + delta).max(0) as u32;

    Ok(Book {
        total_copies: total,
        available_copies: available,
        ..book.clone()
    })
}

/// 純粋関数：所蔵冊数を1減らせるか確認する
///
/// 最後の1冊は除籍できない。エラーには除籍後の冊数を載せる。
pub fn check_write_off(book: &Book) -> Result<(), InventoryError> {
    if book.total_copies <= 1 {
        return Err(InventoryError::InvalidCapacity {
            requested: i64::from(book.total_copies) - 1,
        });
    }
    Ok(())
}

/// 純粋関数：貸出中の1冊を除籍する（紛失）
///
/// 所蔵冊数を1減らし、貸出可能冊数は変えない。
/// 最後の1冊は除籍できない。
pub fn write_off_copy(book: &Book) -> Result<Book, InventoryError> {
    check_write_off(book)?;
    // 紛失した1冊は貸出中のはずなので、在庫側に残っていてはならない
    if book.available_copies >= book.total_copies {
        return Err(InventoryError::InvariantViolated {
            available: book.available_copies,
            total: book.total_copies,
            delta: 0,
        });
    }

    Ok(Book {
        total_copies: book.total_copies - 1,
        ..book.clone()
    })
}
