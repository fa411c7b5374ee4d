use crate::domain::{
    BookId, LedgerEvent, MemberId, Transaction, TransactionId, TransactionStatus,
};
use crate::ports::transaction_store::{Result, TransactionStore as TransactionStoreTrait};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

#[derive(Default)]
struct Ledger {
    records: HashMap<TransactionId, Transaction>,
    events: HashMap<TransactionId, Vec<LedgerEvent>>,
}

impl Ledger {
    fn append(&mut self, event: LedgerEvent) {
        self.events
            .entry(event.transaction_id())
            .or_default()
            .push(event);
    }

    fn select(&self, predicate: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut selected: Vec<Transaction> = self
            .records
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
        selected
    }
}

/// TransactionStoreのインメモリ実装
///
/// 記録とイベント履歴を1つのMutexで保持し、同じ書き込みで更新する。
/// 削除した記録の履歴は残る。
pub struct TransactionStore {
    ledger: Mutex<Ledger>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
        }
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStoreTrait for TransactionStore {
    async fn insert(&self, transaction: &Transaction, event: LedgerEvent) -> Result<()> {
        let mut ledger = lock(&self.ledger)?;
        if ledger.records.contains_key(&transaction.transaction_id) {
            return Err(format!("transaction {} already exists", transaction.transaction_id).into());
        }
        ledger
            .records
            .insert(transaction.transaction_id, transaction.clone());
        ledger.append(event);
        Ok(())
    }

    async fn update(&self, transaction: &Transaction, event: Option<LedgerEvent>) -> Result<()> {
        let mut ledger = lock(&self.ledger)?;
        let Some(stored) = ledger.records.get_mut(&transaction.transaction_id) else {
            return Err(format!("transaction {} does not exist", transaction.transaction_id).into());
        };
        *stored = transaction.clone();
        if let Some(event) = event {
            ledger.append(event);
        }
        Ok(())
    }

    async fn get(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        Ok(lock(&self.ledger)?.records.get(&transaction_id).cloned())
    }

    async fn delete(&self, transaction_id: TransactionId, event: LedgerEvent) -> Result<bool> {
        let mut ledger = lock(&self.ledger)?;
        if ledger.records.remove(&transaction_id).is_none() {
            return Ok(false);
        }
        ledger.append(event);
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<Transaction>> {
        Ok(lock(&self.ledger)?.select(|_| true))
    }

    async fn find_by_member(&self, member_id: MemberId) -> Result<Vec<Transaction>> {
        Ok(lock(&self.ledger)?.select(|t| t.member_id == member_id))
    }

    async fn find_by_book(&self, book_id: BookId) -> Result<Vec<Transaction>> {
        Ok(lock(&self.ledger)?.select(|t| t.book_id == book_id))
    }

    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        Ok(lock(&self.ledger)?.select(|t| t.status == status))
    }

    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Transaction>> {
        let mut candidates =
            lock(&self.ledger)?.select(|t| t.status.is_active() && t.due_date < as_of);
        candidates.sort_by_key(|t| t.due_date);
        Ok(candidates)
    }

    async fn count_active_for_member(&self, member_id: MemberId) -> Result<usize> {
        Ok(lock(&self.ledger)?
            .records
            .values()
            .filter(|t| t.member_id == member_id && t.status.is_active())
            .count())
    }

    async fn load_events(&self, transaction_id: TransactionId) -> Result<Vec<LedgerEvent>> {
        Ok(lock(&self.ledger)?
            .events
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default())
    }
}
