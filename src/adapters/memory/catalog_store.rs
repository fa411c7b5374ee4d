use crate::domain::{self, Book, BookId};
use crate::ports::catalog_store::{AdjustOutcome, CatalogStore as CatalogStoreTrait, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

/// CatalogStoreのインメモリ実装
///
/// 全書籍を1つのMutexで保持するため、差分更新と比較置換は自然に原子的になる。
/// テスト用・単体起動用に書籍を登録できる。
pub struct CatalogStore {
    books: Mutex<HashMap<BookId, Book>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }

    /// 書籍を登録する（同じIDは上書き）
    pub fn add_book(&self, book: Book) -> Result<()> {
        lock(&self.books)?.insert(book.book_id(), book);
        Ok(())
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStoreTrait for CatalogStore {
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(lock(&self.books)?.get(&book_id).cloned())
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        Ok(lock(&self.books)?
            .values()
            .find(|book| book.isbn() == isbn)
            .cloned())
    }

    async fn insert_book(&self, book: &Book) -> Result<bool> {
        let mut books = lock(&self.books)?;
        let taken = books.contains_key(&book.book_id())
            || books.values().any(|existing| existing.isbn() == book.isbn());
        if taken {
            return Ok(false);
        }
        books.insert(book.book_id(), book.clone());
        Ok(true)
    }

    /// 範囲チェックと書き込みを同じロックの中で行う
    async fn adjust_available(&self, book_id: BookId, delta: i64) -> Result<AdjustOutcome> {
        let mut books = lock(&self.books)?;
        let Some(book) = books.get_mut(&book_id) else {
            return Ok(AdjustOutcome::NotFound);
        };

        match domain::book::apply_available_delta(book, delta) {
            Ok(next) => {
                *book = next.clone();
                Ok(AdjustOutcome::Applied(next))
            }
            Err(_) => Ok(AdjustOutcome::InvariantViolated),
        }
    }

    async fn compare_and_set_copies(&self, current: &Book, next: &Book) -> Result<bool> {
        let mut books = lock(&self.books)?;
        match books.get_mut(&current.book_id()) {
            Some(stored)
                if stored.total_copies() == current.total_copies()
                    && stored.available_copies() == current.available_copies() =>
            {
                *stored = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
