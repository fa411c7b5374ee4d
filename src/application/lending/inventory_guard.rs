use std::sync::Arc;

use crate::domain::{self, Book, BookId, InventoryError};
use crate::ports::{AdjustOutcome, CatalogStore};

use super::errors::{LendingError, Result};
use super::keyed_locks::KeyedLocks;

/// 比較置換が競合した場合の再試行回数
const MAX_COPY_UPDATE_ATTEMPTS: usize = 3;

/// 在庫ガード
///
/// 書籍ごとの冊数不変条件（`0 <= available <= total`）の唯一の書き手。
/// 同じ書籍への操作は書籍単位のロックで直列化され、さらにストア側の
/// 原子的な差分更新が範囲外への変更を拒否する。
pub struct InventoryGuard {
    catalog: Arc<dyn CatalogStore>,
    locks: KeyedLocks<BookId>,
}

impl InventoryGuard {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            locks: KeyedLocks::new(),
        }
    }

    /// 1冊確保する
    ///
    /// # エラー
    /// - BookNotFound: 書籍が存在しない
    /// - OutOfStock: 確保の時点で空きがない
    pub async fn reserve(&self, book_id: BookId) -> Result<Book> {
        let _guard = self.locks.lock(book_id).await;

        let book = self.load(book_id).await?;
        domain::book::reserve_copy(&book).map_err(|e| inventory_error(book_id, e))?;

        match self.adjust(book_id, -1).await? {
            AdjustOutcome::Applied(book) => {
                tracing::debug!(%book_id, available = book.available_copies(), "copy reserved");
                Ok(book)
            }
            // 別プロセスが先に最後の1冊を確保した
            AdjustOutcome::InvariantViolated => Err(LendingError::OutOfStock(book_id)),
            AdjustOutcome::NotFound => Err(LendingError::BookNotFound(book_id)),
        }
    }

    /// 1冊戻す
    ///
    /// 所蔵冊数を超える返却は台帳の破損を意味するため、丸めずに
    /// `InventoryInvariantViolated`を返す。
    pub async fn release(&self, book_id: BookId) -> Result<Book> {
        let _guard = self.locks.lock(book_id).await;

        let book = self.load(book_id).await?;
        domain::book::release_copy(&book).map_err(|e| inventory_error(book_id, e))?;

        match self.adjust(book_id, 1).await? {
            AdjustOutcome::Applied(book) => {
                tracing::debug!(%book_id, available = book.available_copies(), "copy released");
                Ok(book)
            }
            AdjustOutcome::InvariantViolated => Err(inventory_error(
                book_id,
                InventoryError::InvariantViolated {
                    available: book.available_copies(),
                    total: book.total_copies(),
                    delta: 1,
                },
            )),
            AdjustOutcome::NotFound => Err(LendingError::BookNotFound(book_id)),
        }
    }

    /// 所蔵冊数を変更する
    ///
    /// 貸出可能冊数は同じ差分だけ動き、0を下限とする。
    pub async fn adjust_capacity(&self, book_id: BookId, new_total: i64) -> Result<Book> {
        let _guard = self.locks.lock(book_id).await;
        let book = self
            .update_copies(book_id, |book| {
                domain::book::resize_capacity(book, new_total)
            })
            .await?;

        tracing::info!(
            %book_id,
            total = book.total_copies(),
            available = book.available_copies(),
            "capacity adjusted"
        );
        Ok(book)
    }

    /// 貸出中の1冊を除籍する（紛失処理）
    ///
    /// 書籍ロックを保持したまま、最新の冊数で除籍できることを確かめてから
    /// `commit`を実行し、成功した場合のみ所蔵冊数を1減らす。
    /// その間、同じ書籍の確保・返却・冊数変更・除籍は待たされる。
    ///
    /// # エラー
    /// - InvalidCapacity: 最後の1冊（`commit`は実行しない）
    /// - `commit`のエラーはそのまま返す（冊数は変えない）
    /// - InventoryInvariantViolated: `commit`後に除籍を書き込めなかった
    pub async fn write_off_after<T, F, Fut>(
        &self,
        book_id: BookId,
        commit: F,
    ) -> Result<(T, Book)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.locks.lock(book_id).await;

        let current = self.load(book_id).await?;
        domain::book::check_write_off(&current).map_err(|e| inventory_error(book_id, e))?;

        let committed = commit().await?;

        match self
            .update_copies(book_id, domain::book::write_off_copy)
            .await
        {
            Ok(book) => {
                tracing::info!(%book_id, total = book.total_copies(), "copy written off");
                Ok((committed, book))
            }
            Err(err) => {
                tracing::error!(
                    %book_id,
                    error = %err,
                    "change was committed but the copy was not written off"
                );
                Err(match err {
                    violated @ LendingError::InventoryInvariantViolated { .. } => violated,
                    other => LendingError::InventoryInvariantViolated {
                        book_id,
                        detail: format!("write-off after commit failed: {other}"),
                    },
                })
            }
        }
    }

    async fn load(&self, book_id: BookId) -> Result<Book> {
        self.catalog
            .get_book(book_id)
            .await
            .map_err(LendingError::CatalogStoreError)?
            .ok_or(LendingError::BookNotFound(book_id))
    }

    async fn adjust(&self, book_id: BookId, delta: i64) -> Result<AdjustOutcome> {
        self.catalog
            .adjust_available(book_id, delta)
            .await
            .map_err(LendingError::CatalogStoreError)
    }

    /// 読み取り・純粋関数・比較置換を、競合しなくなるまで数回繰り返す
    ///
    /// 同一プロセス内は書籍ロックで直列化済み。競合は他プロセスの書き込みに限られる。
    async fn update_copies<F>(&self, book_id: BookId, transition: F) -> Result<Book>
    where
        F: Fn(&Book) -> std::result::Result<Book, InventoryError>,
    {
        for _ in 0..MAX_COPY_UPDATE_ATTEMPTS {
            let current = self.load(book_id).await?;
            let next = transition(&current).map_err(|e| inventory_error(book_id, e))?;

            let swapped = self
                .catalog
                .compare_and_set_copies(&current, &next)
                .await
                .map_err(LendingError::CatalogStoreError)?;
            if swapped {
                return Ok(next);
            }
            tracing::debug!(%book_id, "copy counts changed concurrently, retrying");
        }

        Err(LendingError::CatalogStoreError(
            format!("copy counts of book {book_id} kept changing concurrently").into(),
        ))
    }
}

/// 在庫のドメインエラーをアプリケーションエラーに変換する
fn inventory_error(book_id: BookId, err: InventoryError) -> LendingError {
    match err {
        InventoryError::OutOfStock => LendingError::OutOfStock(book_id),
        InventoryError::InvalidCapacity { requested } => LendingError::InvalidCapacity(requested),
        InventoryError::InvariantViolated {
            available,
            total,
            delta,
        } => {
            tracing::error!(
                %book_id,
                available,
                total,
                delta,
                "inventory invariant violated"
            );
            LendingError::InventoryInvariantViolated {
                book_id,
                detail: format!(
                    "cannot apply delta {delta} to {available} available of {total} total"
                ),
            }
        }
    }
}
