use crate::domain::{Book, BookId};
use crate::ports::catalog_store::{AdjustOutcome, CatalogStore as CatalogStoreTrait, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{invalid_data, to_i32, to_u32};

/// PostgreSQLの行データをBookに変換する
///
/// 冊数はINTEGERで保存されているため、u32への変換と不変条件の検証を行う。
fn map_row_to_book(row: &PgRow) -> Result<Book> {
    let total_copies = to_u32(row.get("total_copies"), "total_copies")?;
    let available_copies = to_u32(row.get("available_copies"), "available_copies")?;

    Book::restore(
        BookId::from_uuid(row.get("book_id")),
        row.get::<String, _>("isbn"),
        row.get::<String, _>("title"),
        total_copies,
        available_copies,
    )
    .map_err(|e| invalid_data(format!("stored book violates copy invariant: {e:?}")))
}

/// CatalogStoreのPostgreSQL実装
///
/// 貸出可能冊数の変更は範囲条件付きの単一UPDATEで行うため、
/// 複数プロセスから同時に確保しても所蔵冊数を超えて貸し出さない。
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 書籍を登録する（同じIDは冊数・書誌情報を上書き）
    pub async fn save(&self, book: &Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (book_id, isbn, title, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (book_id)
            DO UPDATE SET
                isbn = EXCLUDED.isbn,
                title = EXCLUDED.title,
                total_copies = EXCLUDED.total_copies,
                available_copies = EXCLUDED.available_copies,
                updated_at = NOW()
            "#,
        )
        .bind(book.book_id().value())
        .bind(book.isbn())
        .bind(book.title())
        .bind(to_i32(book.total_copies(), "total_copies")?)
        .bind(to_i32(book.available_copies(), "available_copies")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CatalogStoreTrait for CatalogStore {
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT book_id, isbn, title, total_copies, available_copies
            FROM books
            WHERE book_id = $1
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT book_id, isbn, title, total_copies, available_copies
            FROM books
            WHERE isbn = $1
            "#,
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    /// ID・ISBNの一意制約に掛かる行は挿入しない
    async fn insert_book(&self, book: &Book) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO books (book_id, isbn, title, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(book.book_id().value())
        .bind(book.isbn())
        .bind(book.title())
        .bind(to_i32(book.total_copies(), "total_copies")?)
        .bind(to_i32(book.available_copies(), "available_copies")?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 範囲条件付きUPDATE
    ///
    /// 更新されなかった場合、書籍の有無で NotFound と InvariantViolated を区別する。
    async fn adjust_available(&self, book_id: BookId, delta: i64) -> Result<AdjustOutcome> {
        let delta = i32::try_from(delta)
            .map_err(|_| invalid_data(format!("copy delta out of range: {delta}")))?;

        let updated = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + $2,
                updated_at = NOW()
            WHERE book_id = $1
              AND available_copies + $2 BETWEEN 0 AND total_copies
            RETURNING book_id, isbn, title, total_copies, available_copies
            "#,
        )
        .bind(book_id.value())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(AdjustOutcome::Applied(map_row_to_book(&row)?));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE book_id = $1)")
                .bind(book_id.value())
                .fetch_one(&self.pool)
                .await?;

        Ok(if exists {
            AdjustOutcome::InvariantViolated
        } else {
            AdjustOutcome::NotFound
        })
    }

    async fn compare_and_set_copies(&self, current: &Book, next: &Book) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET total_copies = $4,
                available_copies = $5,
                updated_at = NOW()
            WHERE book_id = $1
              AND total_copies = $2
              AND available_copies = $3
            "#,
        )
        .bind(current.book_id().value())
        .bind(to_i32(current.total_copies(), "total_copies")?)
        .bind(to_i32(current.available_copies(), "available_copies")?)
        .bind(to_i32(next.total_copies(), "total_copies")?)
        .bind(to_i32(next.available_copies(), "available_copies")?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
