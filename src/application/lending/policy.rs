use crate::domain::{FineRate, LoanPeriod};

/// 貸出ポリシー
///
/// 設定から組み立てられ、台帳に渡される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LendingPolicy {
    /// 貸出日数が指定されなかった場合の期間
    pub default_loan_period: LoanPeriod,
    /// 延滞料金の日額
    pub fine_rate: FineRate,
}
