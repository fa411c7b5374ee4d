use crate::domain::{Member, MemberId, MemberStatus};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 会員ストアポート
///
/// 会員の所有者は会員コンテキスト。
/// 貸出中の冊数はここでは数えない（台帳が正とする）。
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// IDで会員を取得する
    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>>;

    /// メールアドレスで会員を取得する
    async fn find_by_email(&self, email: &str) -> Result<Option<Member>>;

    /// 会員を新規登録する
    ///
    /// 同じIDまたはメールアドレス（大文字小文字を区別しない）の会員が
    /// 既にあれば登録せず`false`を返す。
    async fn insert_member(&self, member: &Member) -> Result<bool>;

    /// 会員ステータスを変更する
    ///
    /// 会員が存在しない場合は`None`。
    async fn update_status(&self, member_id: MemberId, status: MemberStatus)
    -> Result<Option<Member>>;
}
