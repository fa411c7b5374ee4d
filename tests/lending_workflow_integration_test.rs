use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use library_circulation::adapters::memory::{MemoryCatalogStore, MemoryTransactionStore};
use library_circulation::application::lending::{
    ErrorKind, LendingError, LendingPolicy, LendingWorkflow, ServiceDependencies,
    run_overdue_sweep,
};
use library_circulation::domain::commands::*;
use library_circulation::domain::*;
use library_circulation::ports::{catalog_store, transaction_store};
use library_circulation::ports::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::{MemoryFixture, date};

// ============================================================================
// ヘルパー関数
// ============================================================================

fn borrow_cmd(book_id: BookId, member_id: MemberId, as_of: NaiveDate) -> BorrowBook {
    BorrowBook {
        book_id,
        member_id,
        loan_days: None,
        notes: None,
        as_of,
    }
}

async fn available(fixture: &MemoryFixture, book_id: BookId) -> u32 {
    fixture
        .catalog
        .get_book(book_id)
        .await
        .unwrap()
        .unwrap()
        .available_copies()
}

/// 作成だけ失敗するTransactionStore（補償処理の確認用）
struct FailingInsertStore {
    inner: MemoryTransactionStore,
}

#[async_trait]
impl TransactionStore for FailingInsertStore {
    async fn insert(
        &self,
        _transaction: &Transaction,
        _event: LedgerEvent,
    ) -> transaction_store::Result<()> {
        Err("ledger unavailable".into())
    }

    async fn update(
        &self,
        transaction: &Transaction,
        event: Option<LedgerEvent>,
    ) -> transaction_store::Result<()> {
        self.inner.update(transaction, event).await
    }

    async fn get(&self, id: TransactionId) -> transaction_store::Result<Option<Transaction>> {
        self.inner.get(id).await
    }

    async fn delete(
        &self,
        id: TransactionId,
        event: LedgerEvent,
    ) -> transaction_store::Result<bool> {
        self.inner.delete(id, event).await
    }

    async fn list_all(&self) -> transaction_store::Result<Vec<Transaction>> {
        self.inner.list_all().await
    }

    async fn find_by_member(&self, id: MemberId) -> transaction_store::Result<Vec<Transaction>> {
        self.inner.find_by_member(id).await
    }

    async fn find_by_book(&self, id: BookId) -> transaction_store::Result<Vec<Transaction>> {
        self.inner.find_by_book(id).await
    }

    async fn find_by_status(
        &self,
        status: TransactionStatus,
    ) -> transaction_store::Result<Vec<Transaction>> {
        self.inner.find_by_status(status).await
    }

    async fn find_overdue_candidates(
        &self,
        as_of: NaiveDate,
    ) -> transaction_store::Result<Vec<Transaction>> {
        self.inner.find_overdue_candidates(as_of).await
    }

    async fn count_active_for_member(&self, id: MemberId) -> transaction_store::Result<usize> {
        self.inner.count_active_for_member(id).await
    }

    async fn load_events(&self, id: TransactionId) -> transaction_store::Result<Vec<LedgerEvent>> {
        self.inner.load_events(id).await
    }
}

/// 書籍の読み取りを遅らせるCatalogStore（並行処理の割り込み幅を広げる）
struct SlowCatalogStore {
    inner: Arc<MemoryCatalogStore>,
}

#[async_trait]
impl CatalogStore for SlowCatalogStore {
    async fn get_book(&self, book_id: BookId) -> catalog_store::Result<Option<Book>> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.get_book(book_id).await
    }

    async fn find_by_isbn(&self, isbn: &str) -> catalog_store::Result<Option<Book>> {
        self.inner.find_by_isbn(isbn).await
    }

    async fn insert_book(&self, book: &Book) -> catalog_store::Result<bool> {
        self.inner.insert_book(book).await
    }

    async fn adjust_available(
        &self,
        book_id: BookId,
        delta: i64,
    ) -> catalog_store::Result<AdjustOutcome> {
        self.inner.adjust_available(book_id, delta).await
    }

    async fn compare_and_set_copies(
        &self,
        current: &Book,
        next: &Book,
    ) -> catalog_store::Result<bool> {
        self.inner.compare_and_set_copies(current, next).await
    }
}

/// 読み取りの遅いカタログで組み立てたワークフロー
fn slow_catalog_workflow(fixture: &MemoryFixture) -> LendingWorkflow {
    let deps = ServiceDependencies {
        catalog_store: Arc::new(SlowCatalogStore {
            inner: fixture.catalog.clone(),
        }),
        ..fixture.deps()
    };
    LendingWorkflow::new(deps, LendingPolicy::default())
}

/// 貸出中の記録数と、在庫から欠けている冊数が一致するか
async fn assert_outstanding_matches_ledger(workflow: &LendingWorkflow, book_id: BookId) {
    let book = workflow.book(book_id).await.unwrap();
    let active = workflow
        .ledger()
        .list_by_book(book_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.status().is_active())
        .count();
    assert_eq!(
        (book.total_copies() - book.available_copies()) as usize,
        active,
        "book {book:?} disagrees with {active} active transactions"
    );
}

// ============================================================================
// 貸出・返却
// ============================================================================

#[tokio::test]
async fn test_borrow_and_late_return_charges_fine() {
    // Arrange
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();

    // Act: 1月1日に14日間で借りる
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    // Assert
    assert_eq!(borrowed.status(), TransactionStatus::Borrowed);
    assert_eq!(borrowed.due_date(), date(2024, 1, 15));
    assert_eq!(borrowed.fine_amount(), Decimal::ZERO);
    assert_eq!(available(&fixture, book_id).await, 1);

    // Act: 期限の6日後に返却
    let returned = workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 21),
        })
        .await
        .unwrap();

    // Assert
    assert_eq!(returned.status(), TransactionStatus::Returned);
    assert_eq!(returned.return_date(), Some(date(2024, 1, 21)));
    assert_eq!(returned.fine_amount(), Decimal::from(6));
    assert_eq!(available(&fixture, book_id).await, 2);
}

#[tokio::test]
async fn test_return_on_time_has_no_fine() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();

    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 3, 1)))
        .await
        .unwrap();

    let returned = workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 3, 11),
        })
        .await
        .unwrap();

    assert_eq!(returned.fine_amount(), Decimal::ZERO);
    assert_eq!(available(&fixture, book_id).await, 1);
}

#[tokio::test]
async fn test_custom_loan_period_and_notes() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();

    let borrowed = workflow
        .borrow(BorrowBook {
            loan_days: Some(7),
            notes: Some("Reading room copy".to_string()),
            ..borrow_cmd(book_id, member_id, date(2024, 5, 1))
        })
        .await
        .unwrap();

    assert_eq!(borrowed.due_date(), date(2024, 5, 8));
    assert_eq!(borrowed.notes(), Some("Reading room copy"));
}

#[tokio::test]
async fn test_second_return_is_rejected_without_touching_inventory() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();

    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();
    let cmd = ReturnBook {
        transaction_id: borrowed.transaction_id(),
        as_of: date(2024, 1, 5),
    };
    workflow.return_book(cmd.clone()).await.unwrap();

    let result = workflow.return_book(cmd).await;

    assert!(matches!(result, Err(LendingError::AlreadyReturned)));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(available(&fixture, book_id).await, 2);
}

#[tokio::test]
async fn test_return_unknown_transaction() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();

    let result = workflow
        .return_book(ReturnBook {
            transaction_id: TransactionId::new(),
            as_of: date(2024, 1, 1),
        })
        .await;

    assert!(matches!(result, Err(LendingError::TransactionNotFound(_))));
}

// ============================================================================
// 貸出の拒否
// ============================================================================

#[tokio::test]
async fn test_borrow_limit_is_enforced() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let member_id = fixture.add_member();

    for _ in 0..5 {
        let book_id = fixture.add_book(1);
        workflow
            .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
            .await
            .unwrap();
    }

    let sixth_book = fixture.add_book(1);
    let result = workflow
        .borrow(borrow_cmd(sixth_book, member_id, date(2024, 1, 1)))
        .await;

    assert!(matches!(
        result,
        Err(LendingError::BorrowLimitReached {
            active: 5,
            limit: 5
        })
    ));
    assert_eq!(available(&fixture, sixth_book).await, 1);
}

#[tokio::test]
async fn test_returning_frees_a_borrowing_slot() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let member_id = fixture.add_member();

    let mut first = None;
    for _ in 0..5 {
        let book_id = fixture.add_book(1);
        let t = workflow
            .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
            .await
            .unwrap();
        first.get_or_insert(t.transaction_id());
    }
    workflow
        .return_book(ReturnBook {
            transaction_id: first.unwrap(),
            as_of: date(2024, 1, 2),
        })
        .await
        .unwrap();

    let book_id = fixture.add_book(1);
    let result = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 2)))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_out_of_stock_is_reported_before_member_checks() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();
    workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    // 存在しない会員でも、在庫切れが先に報告される
    let result = workflow
        .borrow(borrow_cmd(book_id, MemberId::new(), date(2024, 1, 1)))
        .await;

    assert!(matches!(result, Err(LendingError::OutOfStock(id)) if id == book_id));
}

#[tokio::test]
async fn test_unknown_book_and_member() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();

    let result = workflow
        .borrow(borrow_cmd(BookId::new(), member_id, date(2024, 1, 1)))
        .await;
    assert!(matches!(result, Err(LendingError::BookNotFound(_))));

    let result = workflow
        .borrow(borrow_cmd(book_id, MemberId::new(), date(2024, 1, 1)))
        .await;
    assert!(matches!(result, Err(LendingError::MemberNotFound(_))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);

    assert_eq!(available(&fixture, book_id).await, 1);
}

#[tokio::test]
async fn test_suspended_member_cannot_borrow_but_can_return() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();

    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    let member = workflow
        .update_member_status(member_id, MemberStatus::Suspended)
        .await
        .unwrap();
    assert_eq!(member.status, MemberStatus::Suspended);

    let result = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 2)))
        .await;
    assert!(matches!(result, Err(LendingError::MemberNotActive)));
    assert_eq!(available(&fixture, book_id).await, 1);

    let returned = workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 3),
        })
        .await;
    assert!(returned.is_ok());
}

#[tokio::test]
async fn test_invalid_loan_period_releases_reservation() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();

    for days in [0, -3] {
        let result = workflow
            .borrow(BorrowBook {
                loan_days: Some(days),
                ..borrow_cmd(book_id, member_id, date(2024, 1, 1))
            })
            .await;

        assert!(matches!(result, Err(LendingError::InvalidLoanPeriod(d)) if d == days));
        assert_eq!(available(&fixture, book_id).await, 1);
    }
    assert!(workflow.ledger().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_notes_longer_than_limit_are_rejected() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();

    let result = workflow
        .borrow(BorrowBook {
            notes: Some("x".repeat(501)),
            ..borrow_cmd(book_id, member_id, date(2024, 1, 1))
        })
        .await;

    assert!(matches!(result, Err(LendingError::NotesTooLong { max: 500 })));
    assert_eq!(available(&fixture, book_id).await, 1);
}

#[tokio::test]
async fn test_ledger_failure_rolls_back_reservation() {
    // Arrange: 作成だけ失敗する台帳
    let fixture = MemoryFixture::new();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();
    let deps = ServiceDependencies {
        transaction_store: Arc::new(FailingInsertStore {
            inner: MemoryTransactionStore::new(),
        }),
        ..fixture.deps()
    };
    let workflow = LendingWorkflow::new(deps, LendingPolicy::default());

    // Act
    let result = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await;

    // Assert: 元のエラーが返り、確保は取り消されている
    let err = result.unwrap_err();
    assert!(matches!(err, LendingError::LedgerStoreError(_)));
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(available(&fixture, book_id).await, 1);
}

// ============================================================================
// 並行性
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_of_last_copy_allow_exactly_one() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let members: Vec<MemberId> = (0..16).map(|_| fixture.add_member()).collect();

    let handles = members.into_iter().map(|member_id| {
        let workflow = workflow.clone();
        tokio::spawn(async move {
            workflow
                .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(LendingError::OutOfStock(_))))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(out_of_stock, 15);
    assert_eq!(available(&fixture, book_id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_by_one_member_respect_limit() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let member_id = fixture.add_member();

    // 上限5冊のうち4冊を借りておく
    for _ in 0..4 {
        let book_id = fixture.add_book(1);
        workflow
            .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
            .await
            .unwrap();
    }

    let books: Vec<BookId> = (0..8).map(|_| fixture.add_book(1)).collect();
    let handles = books.iter().map(|&book_id| {
        let workflow = workflow.clone();
        tokio::spawn(async move {
            workflow
                .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 2)))
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LendingError::BorrowLimitReached { .. })))
    );

    let active = workflow.list_active_for_member(member_id).await.unwrap();
    assert_eq!(active.len(), 5);

    // 失敗した貸出の確保はすべて戻っている
    let mut total_available = 0;
    for book_id in books {
        total_available += available(&fixture, book_id).await;
    }
    assert_eq!(total_available, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_available_stays_within_bounds_under_mixed_load() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(3);
    let members: Vec<MemberId> = (0..12).map(|_| fixture.add_member()).collect();

    let handles = members.into_iter().map(|member_id| {
        let workflow = workflow.clone();
        tokio::spawn(async move {
            let borrowed = workflow
                .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
                .await;
            if let Ok(transaction) = borrowed {
                workflow
                    .return_book(ReturnBook {
                        transaction_id: transaction.transaction_id(),
                        as_of: date(2024, 1, 2),
                    })
                    .await
                    .unwrap();
            }
        })
    });
    for joined in join_all(handles).await {
        joined.unwrap();
    }

    assert_eq!(available(&fixture, book_id).await, 3);
    let returned = workflow
        .ledger()
        .list_by_status(TransactionStatus::Returned)
        .await
        .unwrap();
    assert!(!returned.is_empty());
    assert!(workflow.list_overdue(date(2024, 12, 31)).await.unwrap().is_empty());
}

// ============================================================================
// 延滞スイープ
// ============================================================================

#[tokio::test]
async fn test_list_overdue_reclassifies_and_is_idempotent() {
    // Arrange: 1月1日に借りた取引（期限1月15日）
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    // 期限当日は延滞ではない
    assert!(workflow.list_overdue(date(2024, 1, 15)).await.unwrap().is_empty());

    // Act: 同じ評価日で2回実行
    let first = workflow.list_overdue(date(2024, 1, 20)).await.unwrap();
    let second = workflow.list_overdue(date(2024, 1, 20)).await.unwrap();

    // Assert
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].transaction_id(), borrowed.transaction_id());
    assert_eq!(first[0].status(), TransactionStatus::Overdue);
    assert_eq!(first[0].fine_amount(), Decimal::from(5));

    let stored = workflow.ledger().get(borrowed.transaction_id()).await.unwrap();
    assert_eq!(stored.status(), TransactionStatus::Overdue);

    // 再分類イベントは1回だけ
    let history = workflow
        .ledger()
        .history(borrowed.transaction_id())
        .await
        .unwrap();
    let overdue_events = history
        .iter()
        .filter(|e| matches!(e, LedgerEvent::TransactionBecameOverdue(_)))
        .count();
    assert_eq!(overdue_events, 1);

    // 後日の評価では料金だけ増える
    let later = workflow.list_overdue(date(2024, 1, 25)).await.unwrap();
    assert_eq!(later[0].fine_amount(), Decimal::from(10));
}

#[tokio::test]
async fn test_overdue_record_can_still_be_returned() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();
    workflow.list_overdue(date(2024, 1, 18)).await.unwrap();

    let returned = workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 21),
        })
        .await
        .unwrap();

    assert_eq!(returned.status(), TransactionStatus::Returned);
    assert_eq!(returned.fine_amount(), Decimal::from(6));
    assert!(workflow.list_overdue(date(2024, 2, 1)).await.unwrap().is_empty());
    assert_eq!(available(&fixture, book_id).await, 1);
}

#[tokio::test]
async fn test_run_overdue_sweep_counts_overdue_transactions() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let member_id = fixture.add_member();
    for (day, loan_days) in [(1, 14), (1, 30), (5, 3)] {
        let book_id = fixture.add_book(1);
        workflow
            .borrow(BorrowBook {
                loan_days: Some(loan_days),
                ..borrow_cmd(book_id, member_id, date(2024, 1, day))
            })
            .await
            .unwrap();
    }

    let count = run_overdue_sweep(&workflow, date(2024, 1, 20)).await.unwrap();
    assert_eq!(count, 2);

    let count = run_overdue_sweep(&workflow, date(2024, 1, 20)).await.unwrap();
    assert_eq!(count, 2);
}

// ============================================================================
// 紛失・削除・所蔵冊数
// ============================================================================

#[tokio::test]
async fn test_mark_lost_writes_off_the_copy() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(3);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    let lost = workflow
        .mark_lost(MarkLost {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 18),
        })
        .await
        .unwrap();

    assert_eq!(lost.status(), TransactionStatus::Lost);
    assert_eq!(lost.fine_amount(), Decimal::from(3));

    let book = workflow.book(book_id).await.unwrap();
    assert_eq!(book.total_copies(), 2);
    assert_eq!(book.available_copies(), 2);

    // 貸出中の件数から外れる
    assert!(workflow.list_active_for_member(member_id).await.unwrap().is_empty());

    // LOSTの取引は返却も再度の紛失処理もできない
    let result = workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 19),
        })
        .await;
    assert!(matches!(result, Err(LendingError::InvalidTransactionState(_))));

    let result = workflow
        .mark_lost(MarkLost {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 19),
        })
        .await;
    assert!(matches!(result, Err(LendingError::InvalidTransactionState(_))));
    assert_eq!(workflow.book(book_id).await.unwrap().total_copies(), 2);
}

#[tokio::test]
async fn test_mark_lost_of_last_copy_is_rejected() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    let result = workflow
        .mark_lost(MarkLost {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 10),
        })
        .await;

    assert!(matches!(result, Err(LendingError::InvalidCapacity(0))));
    let stored = workflow.ledger().get(borrowed.transaction_id()).await.unwrap();
    assert_eq!(stored.status(), TransactionStatus::Borrowed);
}

#[tokio::test]
async fn test_mark_lost_of_returned_transaction_is_rejected() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();
    workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 2),
        })
        .await
        .unwrap();

    let result = workflow
        .mark_lost(MarkLost {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 3),
        })
        .await;

    assert!(matches!(result, Err(LendingError::InvalidTransactionState(_))));
    assert_eq!(workflow.book(book_id).await.unwrap().total_copies(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mark_lost_on_one_title_writes_off_one_copy() {
    // Arrange: 2冊とも貸出中
    let fixture = MemoryFixture::new();
    let workflow = slow_catalog_workflow(&fixture);
    let book_id = fixture.add_book(2);
    let first = workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();
    let second = workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();

    // Act: 同じ書籍の2件を同時に紛失処理
    let (r1, r2) = tokio::join!(
        workflow.mark_lost(MarkLost {
            transaction_id: first.transaction_id(),
            as_of: date(2024, 1, 10),
        }),
        workflow.mark_lost(MarkLost {
            transaction_id: second.transaction_id(),
            as_of: date(2024, 1, 10),
        }),
    );

    // Assert: 片方だけ成功し、もう片方は記録を変えずに拒否される
    let results = [r1, r2];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LendingError::InvalidCapacity(0))))
    );

    let statuses = [
        workflow.ledger().get(first.transaction_id()).await.unwrap().status(),
        workflow.ledger().get(second.transaction_id()).await.unwrap().status(),
    ];
    assert_eq!(statuses.iter().filter(|s| **s == TransactionStatus::Lost).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == TransactionStatus::Borrowed).count(), 1);

    let book = workflow.book(book_id).await.unwrap();
    assert_eq!(book.total_copies(), 1);
    assert_eq!(book.available_copies(), 0);
    assert_outstanding_matches_ledger(&workflow, book_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mark_lost_racing_capacity_change_keeps_lost_and_write_off_together() {
    let fixture = MemoryFixture::new();
    let workflow = slow_catalog_workflow(&fixture);
    let book_id = fixture.add_book(2);
    let lost_candidate = workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();
    workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();

    let (lost, resized) = tokio::join!(
        workflow.mark_lost(MarkLost {
            transaction_id: lost_candidate.transaction_id(),
            as_of: date(2024, 1, 10),
        }),
        workflow.adjust_capacity(book_id, 1),
    );

    // どちらの順に直列化されても、冊数変更は成功し不整合は起きない
    assert!(resized.is_ok());
    let stored = workflow
        .ledger()
        .get(lost_candidate.transaction_id())
        .await
        .unwrap();
    match lost {
        Ok(transaction) => {
            assert_eq!(transaction.status(), TransactionStatus::Lost);
            assert_eq!(stored.status(), TransactionStatus::Lost);
        }
        Err(err) => {
            assert!(matches!(err, LendingError::InvalidCapacity(0)), "{err:?}");
            assert_eq!(stored.status(), TransactionStatus::Borrowed);
        }
    }

    let book = workflow.book(book_id).await.unwrap();
    assert_eq!(book.total_copies(), 1);
    assert_eq!(book.available_copies(), 0);
}

#[tokio::test]
async fn test_return_after_shrinking_below_outstanding_loans() {
    // Arrange: 2冊とも貸出中のまま所蔵を1冊に減らす
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let first = workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();
    let second = workflow
        .borrow(borrow_cmd(book_id, fixture.add_member(), date(2024, 1, 1)))
        .await
        .unwrap();

    let shrunk = workflow.adjust_capacity(book_id, 1).await.unwrap();
    assert_eq!(shrunk.available_copies(), 0);

    // Act & Assert: 1件目は棚に戻る
    workflow
        .return_book(ReturnBook {
            transaction_id: first.transaction_id(),
            as_of: date(2024, 1, 5),
        })
        .await
        .unwrap();
    assert_eq!(available(&fixture, book_id).await, 1);

    // 2件目は所蔵冊数を超えるため戻せず、致命的な不整合として報告される
    let result = workflow
        .return_book(ReturnBook {
            transaction_id: second.transaction_id(),
            as_of: date(2024, 1, 5),
        })
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, LendingError::InventoryInvariantViolated { .. }));
    assert_eq!(err.kind(), ErrorKind::InvariantViolated);

    // 記録は返却済み、在庫は所蔵冊数のまま
    let stored = workflow.ledger().get(second.transaction_id()).await.unwrap();
    assert_eq!(stored.status(), TransactionStatus::Returned);
    let book = workflow.book(book_id).await.unwrap();
    assert_eq!(book.total_copies(), 1);
    assert_eq!(book.available_copies(), 1);
}

#[tokio::test]
async fn test_deleting_active_transaction_keeps_copy_reserved() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(2);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    let deleted = workflow
        .delete_transaction(borrowed.transaction_id())
        .await
        .unwrap();

    assert_eq!(deleted.transaction_id(), borrowed.transaction_id());
    assert_eq!(available(&fixture, book_id).await, 1);
    let result = workflow.ledger().get(borrowed.transaction_id()).await;
    assert!(matches!(result, Err(LendingError::TransactionNotFound(_))));

    // 削除は履歴に残る
    let history = workflow
        .ledger()
        .history(borrowed.transaction_id())
        .await
        .unwrap();
    assert!(matches!(
        history.last(),
        Some(LedgerEvent::TransactionDeleted(e)) if e.status_at_deletion == TransactionStatus::Borrowed
    ));

    let result = workflow.delete_transaction(borrowed.transaction_id()).await;
    assert!(matches!(result, Err(LendingError::TransactionNotFound(_))));
}

#[tokio::test]
async fn test_adjust_capacity_shifts_available() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(3);
    let member_id = fixture.add_member();
    workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();

    let grown = workflow.adjust_capacity(book_id, 5).await.unwrap();
    assert_eq!(grown.total_copies(), 5);
    assert_eq!(grown.available_copies(), 4);

    let shrunk = workflow.adjust_capacity(book_id, 1).await.unwrap();
    assert_eq!(shrunk.total_copies(), 1);
    assert_eq!(shrunk.available_copies(), 0);

    let result = workflow.adjust_capacity(book_id, 0).await;
    assert!(matches!(result, Err(LendingError::InvalidCapacity(0))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);

    let result = workflow.adjust_capacity(BookId::new(), 2).await;
    assert!(matches!(result, Err(LendingError::BookNotFound(_))));
}

#[tokio::test]
async fn test_history_records_each_transition() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book_id = fixture.add_book(1);
    let member_id = fixture.add_member();
    let borrowed = workflow
        .borrow(borrow_cmd(book_id, member_id, date(2024, 1, 1)))
        .await
        .unwrap();
    workflow.list_overdue(date(2024, 1, 16)).await.unwrap();
    workflow
        .return_book(ReturnBook {
            transaction_id: borrowed.transaction_id(),
            as_of: date(2024, 1, 17),
        })
        .await
        .unwrap();

    let history = workflow
        .ledger()
        .history(borrowed.transaction_id())
        .await
        .unwrap();

    assert_eq!(history.len(), 3);
    assert!(matches!(history[0], LedgerEvent::BookBorrowed(_)));
    assert!(matches!(history[1], LedgerEvent::TransactionBecameOverdue(_)));
    match &history[2] {
        LedgerEvent::BookReturned(e) => {
            assert!(e.was_overdue);
            assert_eq!(e.fine_amount, Decimal::from(2));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ============================================================================
// 登録
// ============================================================================

#[tokio::test]
async fn test_registered_book_and_member_can_borrow() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();

    let book = workflow
        .register_book(RegisterBook {
            isbn: " 978-4-00-000000-0 ".to_string(),
            title: "Rust入門".to_string(),
            total_copies: 2,
        })
        .await
        .unwrap();
    let member = workflow
        .register_member(RegisterMember {
            name: "Hanako".to_string(),
            email: "hanako@example.com".to_string(),
            max_books_allowed: Some(1),
        })
        .await
        .unwrap();

    assert_eq!(book.isbn(), "978-4-00-000000-0");
    assert_eq!(book.available_copies(), 2);
    assert_eq!(member.status, MemberStatus::Active);
    assert_eq!(member.max_books_allowed, 1);

    workflow
        .borrow(borrow_cmd(book.book_id(), member.member_id, date(2024, 1, 1)))
        .await
        .unwrap();
    let result = workflow
        .borrow(borrow_cmd(book.book_id(), member.member_id, date(2024, 1, 1)))
        .await;
    assert!(matches!(
        result,
        Err(LendingError::BorrowLimitReached { active: 1, limit: 1 })
    ));
}

#[tokio::test]
async fn test_registration_rejects_duplicates_and_bad_input() {
    let fixture = MemoryFixture::new();
    let workflow = fixture.workflow();
    let book = RegisterBook {
        isbn: "978-4-00-000001-0".to_string(),
        title: "Title".to_string(),
        total_copies: 1,
    };
    workflow.register_book(book.clone()).await.unwrap();

    let result = workflow.register_book(book.clone()).await;
    assert!(matches!(result, Err(LendingError::DuplicateIsbn(_))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);

    let result = workflow
        .register_book(RegisterBook {
            isbn: "978-4-00-000002-0".to_string(),
            total_copies: 3_000_000_000,
            ..book.clone()
        })
        .await;
    assert!(matches!(
        result,
        Err(LendingError::InvalidCapacity(3_000_000_000))
    ));

    let result = workflow
        .register_book(RegisterBook {
            title: " ".to_string(),
            ..book
        })
        .await;
    assert!(matches!(result, Err(LendingError::InvalidRegistration(_))));

    let member = RegisterMember {
        name: "Taro".to_string(),
        email: "taro@example.com".to_string(),
        max_books_allowed: None,
    };
    let registered = workflow.register_member(member.clone()).await.unwrap();
    assert_eq!(registered.max_books_allowed, 5);

    let result = workflow
        .register_member(RegisterMember {
            email: "TARO@example.com".to_string(),
            ..member.clone()
        })
        .await;
    assert!(matches!(result, Err(LendingError::DuplicateEmail(_))));

    let result = workflow
        .register_member(RegisterMember {
            email: "not-an-address".to_string(),
            ..member
        })
        .await;
    assert!(matches!(result, Err(LendingError::InvalidRegistration(_))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
}
