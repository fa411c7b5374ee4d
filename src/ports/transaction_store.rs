use crate::domain::{
    BookId, LedgerEvent, MemberId, Transaction, TransactionId, TransactionStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 取引ストアポート
///
/// 貸出台帳の永続化を抽象化する。現在の記録（更新側）と
/// 記録ごとのイベント履歴（追記側）を同じ書き込みで保存する。
///
/// 1回のワークフロー呼び出しの中では、書き込んだ内容が
/// 直後の読み取りに反映されること（read-your-writes）。
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// 新しい取引とその作成イベントを保存する
    async fn insert(&self, transaction: &Transaction, event: LedgerEvent) -> Result<()>;

    /// 取引を更新し、イベントがあれば履歴に追記する
    async fn update(&self, transaction: &Transaction, event: Option<LedgerEvent>) -> Result<()>;

    /// IDで取引を取得する
    async fn get(&self, transaction_id: TransactionId) -> Result<Option<Transaction>>;

    /// 取引を削除し、削除イベントを履歴に追記する
    ///
    /// 存在しなかった場合は`false`。
    async fn delete(&self, transaction_id: TransactionId, event: LedgerEvent) -> Result<bool>;

    /// すべての取引（貸出日の新しい順）
    async fn list_all(&self) -> Result<Vec<Transaction>>;

    /// 会員の全取引
    async fn find_by_member(&self, member_id: MemberId) -> Result<Vec<Transaction>>;

    /// 書籍の全取引
    async fn find_by_book(&self, book_id: BookId) -> Result<Vec<Transaction>>;

    /// 保存ステータスで検索する
    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>>;

    /// 延滞候補を検索する
    ///
    /// ステータスがBORROWEDまたはOVERDUEで、`due_date < as_of`の取引を返す。
    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Transaction>>;

    /// 会員の貸出中（BORROWED/OVERDUE）の件数
    async fn count_active_for_member(&self, member_id: MemberId) -> Result<usize>;

    /// 取引のイベント履歴（追記順）
    async fn load_events(&self, transaction_id: TransactionId) -> Result<Vec<LedgerEvent>>;
}
