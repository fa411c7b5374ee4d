use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 貸出期間のデフォルト日数
pub const DEFAULT_LOAN_DAYS: u32 = 14;

/// 取引ID - 貸出台帳の記録ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 書籍ID - カタログへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 会員ID - 会員名簿への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 貸出期間エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanPeriodError {
    /// 1日未満、または表現できない日数
    OutOfRange(i64),
}

/// 貸出期間（日数）
///
/// 不変条件：1日以上。
/// 0や負数の期間は型として作成できない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPeriod(u32);

impl LoanPeriod {
    /// 日数から作成する
    ///
    /// # エラー
    /// 1未満またはu32に収まらない場合は`LoanPeriodError::OutOfRange`を返す
    pub fn new(days: i64) -> Result<Self, LoanPeriodError> {
        match u32::try_from(days) {
            Ok(days) if days > 0 => Ok(Self(days)),
            _ => Err(LoanPeriodError::OutOfRange(days)),
        }
    }

    pub fn days(&self) -> u32 {
        self.0
    }
}

impl Default for LoanPeriod {
    fn default() -> Self {
        Self(DEFAULT_LOAN_DAYS)
    }
}

impl TryFrom<i64> for LoanPeriod {
    type Error = LoanPeriodError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// 延滞料金の日額
///
/// 不変条件：0以上。参照ポリシーは1日あたり1通貨単位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineRate(Decimal);

impl FineRate {
    /// 負の日額は受け付けない
    pub fn new(per_day: Decimal) -> Option<Self> {
        if per_day < Decimal::ZERO {
            return None;
        }
        Some(Self(per_day))
    }

    pub fn per_day(&self) -> Decimal {
        self.0
    }
}

impl Default for FineRate {
    fn default() -> Self {
        Self(Decimal::ONE)
    }
}
