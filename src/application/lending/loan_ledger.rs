use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};

use crate::domain::{
    self, BookId, LedgerEvent, LoanPeriod, LoanPeriodError, LostError, MemberId, ReturnError,
    Transaction, TransactionDeleted, TransactionId, TransactionStatus,
};
use crate::ports::TransactionStore;

use super::errors::{LendingError, Result};
use super::keyed_locks::KeyedLocks;
use super::policy::LendingPolicy;

/// メモの最大文字数
pub const MAX_NOTES_LEN: usize = 500;

/// 貸出台帳
///
/// 取引記録とその派生状態（延滞・料金）の唯一の書き手。
/// 既存記録の変更はすべて記録単位のロックの下で「読み直し → 純粋関数 → 書き込み」
/// の順に行うため、返却と延滞スイープが同時に走っても更新を失わない。
pub struct LoanLedger {
    store: Arc<dyn TransactionStore>,
    policy: LendingPolicy,
    record_locks: KeyedLocks<TransactionId>,
}

impl LoanLedger {
    pub fn new(store: Arc<dyn TransactionStore>, policy: LendingPolicy) -> Self {
        Self {
            store,
            policy,
            record_locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    /// 新しい貸出記録を作成する
    ///
    /// `loan_days`が`None`ならポリシーの既定日数（14日）。
    ///
    /// # エラー
    /// - InvalidLoanPeriod: 1日未満の期間
    /// - NotesTooLong: メモが500文字を超える
    pub async fn create(
        &self,
        book_id: BookId,
        member_id: MemberId,
        loan_days: Option<i64>,
        notes: Option<String>,
        today: NaiveDate,
    ) -> Result<Transaction> {
        let period = match loan_days {
            Some(days) => LoanPeriod::new(days).map_err(period_error)?,
            None => self.policy.default_loan_period,
        };
        if notes
            .as_deref()
            .is_some_and(|notes| notes.chars().count() > MAX_NOTES_LEN)
        {
            return Err(LendingError::NotesTooLong { max: MAX_NOTES_LEN });
        }

        let (transaction, event) =
            domain::transaction::open_transaction(book_id, member_id, today, period, notes)
                .map_err(period_error)?;

        self.store
            .insert(&transaction, LedgerEvent::BookBorrowed(event))
            .await
            .map_err(LendingError::LedgerStoreError)?;

        tracing::info!(
            transaction_id = %transaction.transaction_id(),
            %book_id,
            %member_id,
            due_date = %transaction.due_date(),
            "transaction opened"
        );
        Ok(transaction)
    }

    /// 返却を確定する
    ///
    /// # エラー
    /// - TransactionNotFound: 記録が存在しない
    /// - AlreadyReturned: 既にRETURNED
    /// - InvalidTransactionState: LOSTの記録
    pub async fn finalize_return(
        &self,
        transaction_id: TransactionId,
        today: NaiveDate,
    ) -> Result<Transaction> {
        let _guard = self.record_locks.lock(transaction_id).await;
        let current = self.get(transaction_id).await?;

        let (returned, event) =
            domain::transaction::finalize_return(&current, today, self.policy.fine_rate).map_err(
                |e| match e {
                    ReturnError::AlreadyReturned => LendingError::AlreadyReturned,
                    ReturnError::MarkedLost => LendingError::InvalidTransactionState(
                        "Cannot return a transaction marked as lost".to_string(),
                    ),
                },
            )?;

        self.store
            .update(&returned, Some(LedgerEvent::BookReturned(event)))
            .await
            .map_err(LendingError::LedgerStoreError)?;

        tracing::info!(
            %transaction_id,
            fine = %returned.fine_amount(),
            "transaction returned"
        );
        Ok(returned)
    }

    /// 延滞スイープ
    ///
    /// 評価日時点で期限を過ぎた貸出中の取引を遅延ストリームとして返す。
    /// 要素を取り出すたびに、その取引をOVERDUEへ再分類し料金を再計算して保存する。
    /// 呼び出すたびに最初から評価し直し、同じ評価日なら同じ結果に収束する。
    pub fn list_overdue(&self, as_of: NaiveDate) -> BoxStream<'_, Result<Transaction>> {
        stream::once(self.overdue_candidates(as_of))
            .flat_map(|candidates| match candidates {
                Ok(ids) => stream::iter(ids.into_iter().map(Ok)).boxed(),
                Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
            })
            .then(move |candidate| async move {
                match candidate {
                    Ok(transaction_id) => self.sweep_one(transaction_id, as_of).await,
                    Err(e) => Err(e),
                }
            })
            .filter_map(|swept| async move { swept.transpose() })
            .boxed()
    }

    /// 紛失として処理する
    ///
    /// # エラー
    /// - TransactionNotFound: 記録が存在しない
    /// - InvalidTransactionState: RETURNEDまたはLOST
    pub async fn mark_lost(
        &self,
        transaction_id: TransactionId,
        today: NaiveDate,
    ) -> Result<Transaction> {
        let _guard = self.record_locks.lock(transaction_id).await;
        let current = self.get(transaction_id).await?;

        let (lost, event) =
            domain::transaction::mark_lost(&current, today, self.policy.fine_rate).map_err(
                |e| {
                    let reason = match e {
                        LostError::AlreadyReturned => "Transaction has already been returned",
                        LostError::AlreadyLost => "Transaction is already marked as lost",
                    };
                    LendingError::InvalidTransactionState(reason.to_string())
                },
            )?;

        self.store
            .update(&lost, Some(LedgerEvent::TransactionMarkedLost(event)))
            .await
            .map_err(LendingError::LedgerStoreError)?;

        tracing::info!(%transaction_id, fine = %lost.fine_amount(), "transaction marked lost");
        Ok(lost)
    }

    /// 記録を削除する（管理操作）
    ///
    /// 在庫は戻さない。貸出中の記録を削除すると1冊分が戻らなくなる。
    pub async fn delete(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let _guard = self.record_locks.lock(transaction_id).await;
        let current = self.get(transaction_id).await?;

        let event = TransactionDeleted {
            transaction_id,
            book_id: current.book_id(),
            member_id: current.member_id(),
            status_at_deletion: current.status(),
        };
        let deleted = self
            .store
            .delete(transaction_id, LedgerEvent::TransactionDeleted(event))
            .await
            .map_err(LendingError::LedgerStoreError)?;
        if !deleted {
            return Err(LendingError::TransactionNotFound(transaction_id));
        }

        Ok(current)
    }

    /// IDで取引を取得する
    pub async fn get(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.store
            .get(transaction_id)
            .await
            .map_err(LendingError::LedgerStoreError)?
            .ok_or(LendingError::TransactionNotFound(transaction_id))
    }

    /// 会員の貸出中（BORROWED/OVERDUE）の取引
    pub async fn list_active_for_member(&self, member_id: MemberId) -> Result<Vec<Transaction>> {
        let transactions = self.list_by_member(member_id).await?;
        Ok(transactions
            .into_iter()
            .filter(|t| t.status().is_active())
            .collect())
    }

    pub async fn list_by_member(&self, member_id: MemberId) -> Result<Vec<Transaction>> {
        self.store
            .find_by_member(member_id)
            .await
            .map_err(LendingError::LedgerStoreError)
    }

    pub async fn list_by_book(&self, book_id: BookId) -> Result<Vec<Transaction>> {
        self.store
            .find_by_book(book_id)
            .await
            .map_err(LendingError::LedgerStoreError)
    }

    pub async fn list_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        self.store
            .find_by_status(status)
            .await
            .map_err(LendingError::LedgerStoreError)
    }

    pub async fn list_all(&self) -> Result<Vec<Transaction>> {
        self.store
            .list_all()
            .await
            .map_err(LendingError::LedgerStoreError)
    }

    /// 取引のイベント履歴
    pub async fn history(&self, transaction_id: TransactionId) -> Result<Vec<LedgerEvent>> {
        self.store
            .load_events(transaction_id)
            .await
            .map_err(LendingError::LedgerStoreError)
    }

    async fn overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<TransactionId>> {
        let candidates = self
            .store
            .find_overdue_candidates(as_of)
            .await
            .map_err(LendingError::LedgerStoreError)?;
        Ok(candidates
            .iter()
            .map(Transaction::transaction_id)
            .collect())
    }

    /// 1件を評価する
    ///
    /// 候補の取得後に返却・紛失された記録は`None`としてスキップする。
    async fn sweep_one(
        &self,
        transaction_id: TransactionId,
        as_of: NaiveDate,
    ) -> Result<Option<Transaction>> {
        let _guard = self.record_locks.lock(transaction_id).await;
        let Some(current) = self
            .store
            .get(transaction_id)
            .await
            .map_err(LendingError::LedgerStoreError)?
        else {
            return Ok(None);
        };

        let Some((evaluated, event)) =
            domain::transaction::evaluate_overdue(&current, as_of, self.policy.fine_rate)
        else {
            return Ok(None);
        };

        if evaluated != current {
            if event.is_some() {
                tracing::info!(
                    %transaction_id,
                    due_date = %evaluated.due_date(),
                    fine = %evaluated.fine_amount(),
                    "transaction became overdue"
                );
            }
            self.store
                .update(
                    &evaluated,
                    event.map(LedgerEvent::TransactionBecameOverdue),
                )
                .await
                .map_err(LendingError::LedgerStoreError)?;
        }

        Ok(Some(evaluated))
    }
}

fn period_error(err: LoanPeriodError) -> LendingError {
    match err {
        LoanPeriodError::OutOfRange(days) => LendingError::InvalidLoanPeriod(days),
    }
}
