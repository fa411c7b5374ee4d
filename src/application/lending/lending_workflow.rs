use std::sync::Arc;

use chrono::NaiveDate;
use futures::TryStreamExt;

use crate::domain::{
    self, Book, BookId, Member, MemberId, MemberStatus, Transaction, TransactionId,
    commands::{BorrowBook, MarkLost, RegisterBook, RegisterMember, ReturnBook},
    member::DEFAULT_MAX_BOOKS_ALLOWED,
};
use crate::ports::*;

use super::eligibility_checker::EligibilityChecker;
use super::errors::{LendingError, Result};
use super::inventory_guard::InventoryGuard;
use super::keyed_locks::KeyedLocks;
use super::loan_ledger::LoanLedger;
use super::policy::LendingPolicy;

/// サービスの依存関係
///
/// 外部の協調者（カタログ・会員名簿・台帳の永続化）をデータとして束ねる。
/// すべての依存が明示的で、テストではインメモリ実装に差し替えられる。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub membership_store: Arc<dyn MembershipStore>,
    pub transaction_store: Arc<dyn TransactionStore>,
}

/// 貸出ワークフロー
///
/// 在庫ガード・資格チェッカー・台帳を組み合わせ、貸出と返却を
/// 他の並行呼び出しから見て1つの操作として処理する。
///
/// # 一貫性保証
///
/// 複数リソースにまたがる原子的コミットは前提にしない。
/// - 同じ会員の貸出は会員単位のロックで直列化する（資格確認〜記録作成）
/// - 同じ書籍の確保・返却は在庫ガードの書籍単位のロックで直列化する
/// - 確保後に記録作成が失敗した場合は確保を取り消す（補償処理）
pub struct LendingWorkflow {
    deps: ServiceDependencies,
    inventory: InventoryGuard,
    eligibility: EligibilityChecker,
    ledger: LoanLedger,
    member_locks: KeyedLocks<MemberId>,
}

impl LendingWorkflow {
    pub fn new(deps: ServiceDependencies, policy: LendingPolicy) -> Self {
        Self {
            inventory: InventoryGuard::new(deps.catalog_store.clone()),
            eligibility: EligibilityChecker::new(
                deps.membership_store.clone(),
                deps.transaction_store.clone(),
            ),
            ledger: LoanLedger::new(deps.transaction_store.clone(), policy),
            member_locks: KeyedLocks::new(),
            deps,
        }
    }

    pub fn ledger(&self) -> &LoanLedger {
        &self.ledger
    }

    pub fn inventory(&self) -> &InventoryGuard {
        &self.inventory
    }

    pub fn eligibility(&self) -> &EligibilityChecker {
        &self.eligibility
    }

    /// 書籍を借りる
    ///
    /// ビジネスルール：
    /// - 書籍が存在し、空きがあること
    /// - 会員が存在し、ACTIVEで、貸出上限に達していないこと
    /// - 貸出期間は1日以上（省略時14日）
    ///
    /// # エラー
    /// BookNotFound, OutOfStock, MemberNotFound, MemberNotActive,
    /// BorrowLimitReached, InvalidLoanPeriod, NotesTooLong
    #[tracing::instrument(
        skip(self, cmd),
        fields(book_id = %cmd.book_id, member_id = %cmd.member_id)
    )]
    pub async fn borrow(&self, cmd: BorrowBook) -> Result<Transaction> {
        // 1. 書籍の存在確認
        let book = self
            .deps
            .catalog_store
            .get_book(cmd.book_id)
            .await
            .map_err(LendingError::CatalogStoreError)?
            .ok_or(LendingError::BookNotFound(cmd.book_id))?;

        // 2. 空きの事前確認（確定は確保時）
        if !book.is_available() {
            return Err(LendingError::OutOfStock(cmd.book_id));
        }

        // 3〜6. 同じ会員の貸出はここから記録作成まで直列化
        let _member_guard = self.member_locks.lock(cmd.member_id).await;

        // 3, 4. 会員の存在・資格確認（件数は台帳から数え直す）
        self.eligibility.check_eligible(cmd.member_id).await?;

        // 5. 1冊確保
        self.inventory.reserve(cmd.book_id).await?;

        // 6. 台帳に記録
        let created = self
            .ledger
            .create(cmd.book_id, cmd.member_id, cmd.loan_days, cmd.notes, cmd.as_of)
            .await;

        match created {
            Ok(transaction) => Ok(transaction),
            Err(err) => {
                // 7. 補償処理：確保を取り消してから元のエラーを返す
                tracing::warn!(error = %err, "ledger rejected borrow, releasing reservation");
                if let Err(release_err) = self.inventory.release(cmd.book_id).await {
                    tracing::error!(
                        error = %release_err,
                        "failed to roll back reservation, copy is leaked"
                    );
                    return Err(LendingError::InventoryInvariantViolated {
                        book_id: cmd.book_id,
                        detail: format!("rollback after failed borrow did not apply: {release_err}"),
                    });
                }
                Err(err)
            }
        }
    }

    /// 書籍を返却する
    ///
    /// 台帳で返却を確定してから1冊戻す。確定後に戻せなかった場合は
    /// 再試行せず、`InventoryInvariantViolated`として運用者に知らせる。
    #[tracing::instrument(skip(self, cmd), fields(transaction_id = %cmd.transaction_id))]
    pub async fn return_book(&self, cmd: ReturnBook) -> Result<Transaction> {
        let returned = self
            .ledger
            .finalize_return(cmd.transaction_id, cmd.as_of)
            .await?;

        let book_id = returned.book_id();
        if let Err(err) = self.inventory.release(book_id).await {
            tracing::error!(
                %book_id,
                error = %err,
                "transaction is RETURNED but the copy was not released"
            );
            return Err(match err {
                violated @ LendingError::InventoryInvariantViolated { .. } => violated,
                other => LendingError::InventoryInvariantViolated {
                    book_id,
                    detail: format!("release after return failed: {other}"),
                },
            });
        }

        Ok(returned)
    }

    /// 紛失として処理する
    ///
    /// 書籍ロックの中で、最後の1冊でないことを確かめてから台帳をLOSTにし、
    /// その1冊を所蔵から除籍する。同じ書籍への並行した紛失処理や
    /// 冊数変更と交互に進むことはない。
    #[tracing::instrument(skip(self, cmd), fields(transaction_id = %cmd.transaction_id))]
    pub async fn mark_lost(&self, cmd: MarkLost) -> Result<Transaction> {
        let book_id = self.ledger.get(cmd.transaction_id).await?.book_id();

        let (lost, _book) = self
            .inventory
            .write_off_after(book_id, || {
                self.ledger.mark_lost(cmd.transaction_id, cmd.as_of)
            })
            .await?;

        Ok(lost)
    }

    /// 取引を削除する（管理操作）
    ///
    /// 在庫への影響は戻さない。データ修正用であり業務イベントではない。
    #[tracing::instrument(skip(self))]
    pub async fn delete_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let deleted = self.ledger.delete(transaction_id).await?;
        if deleted.status().is_active() {
            tracing::warn!(
                book_id = %deleted.book_id(),
                status = deleted.status().as_str(),
                "deleted an unreturned transaction, its copy stays reserved"
            );
        }
        Ok(deleted)
    }

    /// 延滞中の取引を一覧する（スイープを伴う）
    pub async fn list_overdue(&self, as_of: NaiveDate) -> Result<Vec<Transaction>> {
        self.ledger.list_overdue(as_of).try_collect().await
    }

    /// 会員の貸出中の取引を一覧する
    pub async fn list_active_for_member(&self, member_id: MemberId) -> Result<Vec<Transaction>> {
        self.ledger.list_active_for_member(member_id).await
    }

    /// 所蔵冊数を変更する（カタログ編集）
    pub async fn adjust_capacity(&self, book_id: BookId, new_total: i64) -> Result<Book> {
        self.inventory.adjust_capacity(book_id, new_total).await
    }

    /// 書籍を登録する（全冊貸出可能）
    ///
    /// # エラー
    /// InvalidRegistration, InvalidCapacity, DuplicateIsbn
    #[tracing::instrument(skip(self, cmd), fields(isbn = %cmd.isbn))]
    pub async fn register_book(&self, cmd: RegisterBook) -> Result<Book> {
        let isbn = cmd.isbn.trim();
        let title = cmd.title.trim();
        domain::book::validate_catalog_entry(isbn, title)
            .map_err(|e| LendingError::InvalidRegistration(e.to_string()))?;

        let total_copies = u32::try_from(cmd.total_copies)
            .map_err(|_| LendingError::InvalidCapacity(cmd.total_copies))?;
        let book = Book::new(BookId::new(), isbn, title, total_copies)
            .map_err(|_| LendingError::InvalidCapacity(cmd.total_copies))?;

        let inserted = self
            .deps
            .catalog_store
            .insert_book(&book)
            .await
            .map_err(LendingError::CatalogStoreError)?;
        if !inserted {
            return Err(LendingError::DuplicateIsbn(isbn.to_string()));
        }

        tracing::info!(book_id = %book.book_id(), total_copies, "book registered");
        Ok(book)
    }

    /// 書籍を取得する
    pub async fn book(&self, book_id: BookId) -> Result<Book> {
        self.deps
            .catalog_store
            .get_book(book_id)
            .await
            .map_err(LendingError::CatalogStoreError)?
            .ok_or(LendingError::BookNotFound(book_id))
    }

    pub async fn book_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        self.deps
            .catalog_store
            .find_by_isbn(isbn)
            .await
            .map_err(LendingError::CatalogStoreError)
    }

    /// 会員を登録する（ACTIVE）
    ///
    /// # エラー
    /// InvalidRegistration, DuplicateEmail
    #[tracing::instrument(skip(self, cmd))]
    pub async fn register_member(&self, cmd: RegisterMember) -> Result<Member> {
        let name = cmd.name.trim();
        let email = cmd.email.trim();
        let max_books_allowed = cmd.max_books_allowed.unwrap_or(DEFAULT_MAX_BOOKS_ALLOWED);
        domain::member::validate_profile(name, email, max_books_allowed)
            .map_err(|e| LendingError::InvalidRegistration(e.to_string()))?;

        let member = Member {
            max_books_allowed,
            ..Member::new(MemberId::new(), name, email)
        };

        let inserted = self
            .deps
            .membership_store
            .insert_member(&member)
            .await
            .map_err(LendingError::MembershipStoreError)?;
        if !inserted {
            return Err(LendingError::DuplicateEmail(email.to_string()));
        }

        tracing::info!(member_id = %member.member_id, "member registered");
        Ok(member)
    }

    /// 会員を取得する
    pub async fn member(&self, member_id: MemberId) -> Result<Member> {
        self.deps
            .membership_store
            .get_member(member_id)
            .await
            .map_err(LendingError::MembershipStoreError)?
            .ok_or(LendingError::MemberNotFound(member_id))
    }

    pub async fn member_by_email(&self, email: &str) -> Result<Option<Member>> {
        self.deps
            .membership_store
            .find_by_email(email)
            .await
            .map_err(LendingError::MembershipStoreError)
    }

    /// 会員ステータスを変更する（停止・再開）
    ///
    /// 貸出中の取引には影響しない。停止中の会員は返却はできるが新たに借りられない。
    #[tracing::instrument(skip(self))]
    pub async fn update_member_status(
        &self,
        member_id: MemberId,
        status: MemberStatus,
    ) -> Result<Member> {
        let _member_guard = self.member_locks.lock(member_id).await;
        let member = self
            .deps
            .membership_store
            .update_status(member_id, status)
            .await
            .map_err(LendingError::MembershipStoreError)?
            .ok_or(LendingError::MemberNotFound(member_id))?;

        tracing::info!(%member_id, status = status.as_str(), "member status updated");
        Ok(member)
    }
}
