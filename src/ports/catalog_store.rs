use crate::domain::{Book, BookId};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 貸出可能冊数の変更結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// 変更後の書籍
    Applied(Book),
    /// `0..=total`を外れるため変更しなかった
    InvariantViolated,
    /// 書籍が存在しない
    NotFound,
}

/// カタログストアポート
///
/// 書籍の所有者はカタログコンテキスト。貸出コンテキストは参照と
/// 冊数の変更プリミティブだけを使う。冊数の変更は在庫ガード経由でのみ呼ばれる。
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// IDで書籍を取得する
    async fn get_book(&self, book_id: BookId) -> Result<Option<Book>>;

    /// ISBNで書籍を取得する
    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>>;

    /// 書籍を新規登録する
    ///
    /// 同じIDまたはISBNの書籍が既にあれば登録せず`false`を返す。
    async fn insert_book(&self, book: &Book) -> Result<bool>;

    /// 貸出可能冊数を差分だけ変更する
    ///
    /// 実装は変更を原子的に行い、範囲外になる変更は適用してはならない。
    async fn adjust_available(&self, book_id: BookId, delta: i64) -> Result<AdjustOutcome>;

    /// 冊数を比較して置き換える
    ///
    /// 保存値の所蔵冊数・貸出可能冊数が`current`と一致する場合のみ`next`に更新し、
    /// `true`を返す。一致しなければ何もせず`false`。
    async fn compare_and_set_copies(&self, current: &Book, next: &Book) -> Result<bool>;
}
