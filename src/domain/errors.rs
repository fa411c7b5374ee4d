/// 在庫操作のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// 貸出可能な冊数がない
    OutOfStock,
    /// 貸出可能冊数が所蔵冊数を超える、または負になる操作
    InvariantViolated { available: u32, total: u32, delta: i64 },
    /// 所蔵冊数が1未満になる
    InvalidCapacity { requested: i64 },
}

/// 貸出資格のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    /// 会員がACTIVEでない
    MemberNotActive,
    /// 貸出上限に達している
    BorrowLimitReached { active: usize, limit: u32 },
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnError {
    /// 既に返却済み
    AlreadyReturned,
    /// 紛失扱いの取引は返却できない
    MarkedLost,
}

/// 紛失処理のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LostError {
    /// 既に返却済み
    AlreadyReturned,
    /// 既に紛失扱い
    AlreadyLost,
}

/// 登録内容のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// 必須項目が空
    Blank { field: &'static str },
    /// 列の長さを超える
    TooLong { field: &'static str, max: usize },
    /// メールアドレスの形式が不正
    InvalidEmail,
    /// 貸出上限が1未満
    InvalidBorrowLimit,
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::Blank { field } => write!(f, "{field} must not be blank"),
            RegistrationError::TooLong { field, max } => {
                write!(f, "{field} must be at most {max} characters")
            }
            RegistrationError::InvalidEmail => write!(f, "email is not a valid address"),
            RegistrationError::InvalidBorrowLimit => {
                write!(f, "max_books_allowed must be at least 1")
            }
        }
    }
}

/// 純粋関数：必須の文字列項目を検証する
pub(crate) fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), RegistrationError> {
    if value.trim().is_empty() {
        return Err(RegistrationError::Blank { field });
    }
    if value.chars().count() > max {
        return Err(RegistrationError::TooLong { field, max });
    }
    Ok(())
}
