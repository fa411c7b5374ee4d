use std::sync::Arc;

use crate::domain::{self, EligibilityError, Member, MemberId};
use crate::ports::{MembershipStore, TransactionStore};

use super::errors::{LendingError, Result};

/// 貸出資格チェッカー
///
/// 貸出中の件数は会員側のカウンタではなく、台帳から毎回数え直す。
/// 同じ会員の並行した貸出との直列化は呼び出し側（貸出ワークフロー）の責務。
pub struct EligibilityChecker {
    members: Arc<dyn MembershipStore>,
    transactions: Arc<dyn TransactionStore>,
}

impl EligibilityChecker {
    pub fn new(members: Arc<dyn MembershipStore>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            members,
            transactions,
        }
    }

    /// 会員が新しい貸出を始められるか確認する
    ///
    /// # エラー
    /// - MemberNotFound: 会員が存在しない
    /// - MemberNotActive: ステータスがACTIVEでない
    /// - BorrowLimitReached: 貸出中の件数が上限に達している
    pub async fn check_eligible(&self, member_id: MemberId) -> Result<Member> {
        let member = self
            .members
            .get_member(member_id)
            .await
            .map_err(LendingError::MembershipStoreError)?
            .ok_or(LendingError::MemberNotFound(member_id))?;

        let active_borrowings = self
            .transactions
            .count_active_for_member(member_id)
            .await
            .map_err(LendingError::LedgerStoreError)?;

        domain::member::check_eligibility(&member, active_borrowings).map_err(|e| match e {
            EligibilityError::MemberNotActive => LendingError::MemberNotActive,
            EligibilityError::BorrowLimitReached { active, limit } => {
                LendingError::BorrowLimitReached { active, limit }
            }
        })?;

        Ok(member)
    }
}
