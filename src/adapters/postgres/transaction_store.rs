use crate::domain::{
    BookId, LedgerEvent, MemberId, Transaction, TransactionId, TransactionStatus,
};
use crate::ports::transaction_store::{Result, TransactionStore as TransactionStoreTrait};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use std::str::FromStr;

use super::invalid_data;

const TRANSACTION_COLUMNS: &str = r#"
    transaction_id,
    book_id,
    member_id,
    borrow_date,
    due_date,
    return_date,
    status,
    fine_amount,
    notes
"#;

/// PostgreSQLの行データをTransactionに変換する
fn map_row_to_transaction(row: &PgRow) -> Result<Transaction> {
    let status_str: &str = row.get("status");
    let status = TransactionStatus::from_str(status_str).map_err(invalid_data)?;

    Ok(Transaction {
        transaction_id: TransactionId::from_uuid(row.get("transaction_id")),
        book_id: BookId::from_uuid(row.get("book_id")),
        member_id: MemberId::from_uuid(row.get("member_id")),
        borrow_date: row.get("borrow_date"),
        due_date: row.get("due_date"),
        return_date: row.get("return_date"),
        status,
        fine_amount: row.get("fine_amount"),
        notes: row.get("notes"),
    })
}

/// LedgerEventの種別名
fn event_type(event: &LedgerEvent) -> &'static str {
    match event {
        LedgerEvent::BookBorrowed(_) => "BookBorrowed",
        LedgerEvent::BookReturned(_) => "BookReturned",
        LedgerEvent::TransactionBecameOverdue(_) => "TransactionBecameOverdue",
        LedgerEvent::TransactionMarkedLost(_) => "TransactionMarkedLost",
        LedgerEvent::TransactionDeleted(_) => "TransactionDeleted",
    }
}

/// イベントを履歴に追記する（呼び出し側のDBトランザクション内）
async fn append_event(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    event: &LedgerEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_events (transaction_id, event_type, event_data)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.transaction_id().value())
    .bind(event_type(event))
    .bind(serde_json::to_value(event)?)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// TransactionStoreのPostgreSQL実装
///
/// 現在の記録は`transactions`、履歴は`ledger_events`に保存する。
/// 記録の変更とイベントの追記は同じDBトランザクションでコミットする。
pub struct TransactionStore {
    pool: PgPool,
}

impl TransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn select(&self, filter: &str, bind: Option<uuid::Uuid>) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions {filter} \
             ORDER BY borrow_date DESC, created_at DESC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(map_row_to_transaction).collect()
    }
}

#[async_trait]
impl TransactionStoreTrait for TransactionStore {
    async fn insert(&self, transaction: &Transaction, event: LedgerEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id,
                book_id,
                member_id,
                borrow_date,
                due_date,
                return_date,
                status,
                fine_amount,
                notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.transaction_id.value())
        .bind(transaction.book_id.value())
        .bind(transaction.member_id.value())
        .bind(transaction.borrow_date)
        .bind(transaction.due_date)
        .bind(transaction.return_date)
        .bind(transaction.status.as_str())
        .bind(transaction.fine_amount)
        .bind(transaction.notes.as_deref())
        .execute(&mut *tx)
        .await?;

        append_event(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, transaction: &Transaction, event: Option<LedgerEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET due_date = $2,
                return_date = $3,
                status = $4,
                fine_amount = $5,
                notes = $6,
                updated_at = NOW()
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction.transaction_id.value())
        .bind(transaction.due_date)
        .bind(transaction.return_date)
        .bind(transaction.status.as_str())
        .bind(transaction.fine_amount)
        .bind(transaction.notes.as_deref())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(invalid_data(format!(
                "transaction {} does not exist",
                transaction.transaction_id
            )));
        }

        if let Some(event) = event {
            append_event(&mut tx, &event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_id = $1");
        let row = sqlx::query(&sql)
            .bind(transaction_id.value())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row_to_transaction).transpose()
    }

    async fn delete(&self, transaction_id: TransactionId, event: LedgerEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM transactions WHERE transaction_id = $1")
            .bind(transaction_id.value())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        append_event(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<Transaction>> {
        self.select("", None).await
    }

    async fn find_by_member(&self, member_id: MemberId) -> Result<Vec<Transaction>> {
        self.select("WHERE member_id = $1", Some(member_id.value()))
            .await
    }

    async fn find_by_book(&self, book_id: BookId) -> Result<Vec<Transaction>> {
        self.select("WHERE book_id = $1", Some(book_id.value())).await
    }

    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = $1 \
             ORDER BY borrow_date DESC, created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row_to_transaction).collect()
    }

    /// 部分インデックス(due_date WHERE status IN ('BORROWED','OVERDUE'))を使う
    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE status IN ('BORROWED', 'OVERDUE') AND due_date < $1 \
             ORDER BY due_date ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row_to_transaction).collect()
    }

    async fn count_active_for_member(&self, member_id: MemberId) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE member_id = $1 AND status IN ('BORROWED', 'OVERDUE')
            "#,
        )
        .bind(member_id.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(usize::try_from(count)?)
    }

    async fn load_events(&self, transaction_id: TransactionId) -> Result<Vec<LedgerEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_data
            FROM ledger_events
            WHERE transaction_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(transaction_id.value())
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_data: serde_json::Value = row.get("event_data");
            let event: LedgerEvent = serde_json::from_value(event_data)?;
            events.push(event);
        }

        Ok(events)
    }
}
