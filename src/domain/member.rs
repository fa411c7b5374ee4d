use serde::{Deserialize, Serialize};

use super::errors::check_text;
use super::{EligibilityError, MemberId, RegistrationError};

/// 会員1人あたりのデフォルト最大貸出冊数
pub const DEFAULT_MAX_BOOKS_ALLOWED: u32 = 5;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 255;

/// 会員ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Inactive,
    Suspended,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Inactive => "INACTIVE",
            MemberStatus::Suspended => "SUSPENDED",
        }
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(MemberStatus::Active),
            "INACTIVE" => Ok(MemberStatus::Inactive),
            "SUSPENDED" => Ok(MemberStatus::Suspended),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }
}

/// 会員 - 会員名簿が所有する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub email: String,
    pub status: MemberStatus,
    pub max_books_allowed: u32,
}

impl Member {
    /// ACTIVE・デフォルト上限で作成
    pub fn new(member_id: MemberId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            member_id,
            name: name.into(),
            email: email.into(),
            status: MemberStatus::Active,
            max_books_allowed: DEFAULT_MAX_BOOKS_ALLOWED,
        }
    }
}

/// 純粋関数：会員の登録内容を検証する
///
/// メールアドレスは`local@domain`の形で、ドメインに`.`を含むこと。
pub fn validate_profile(
    name: &str,
    email: &str,
    max_books_allowed: u32,
) -> Result<(), RegistrationError> {
    check_text("name", name, MAX_NAME_LEN)?;
    check_text("email", email, MAX_EMAIL_LEN)?;

    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(RegistrationError::InvalidEmail);
    }

    if max_books_allowed < 1 {
        return Err(RegistrationError::InvalidBorrowLimit);
    }
    Ok(())
}

/// 純粋関数：新しい貸出を始められるか判定する
///
/// ビジネスルール：
/// - ACTIVEの会員のみ
/// - 貸出中（BORROWED/OVERDUE）の件数が上限未満
///
/// `active_borrowings`は台帳から数え直した値を渡すこと。
pub fn check_eligibility(member: &Member, active_borrowings: usize) -> Result<(), EligibilityError> {
    if member.status != MemberStatus::Active {
        return Err(EligibilityError::MemberNotActive);
    }

    if active_borrowings >= member.max_books_allowed as usize {
        return Err(EligibilityError::BorrowLimitReached {
            active: active_borrowings,
            limit: member.max_books_allowed,
        });
    }

    Ok(())
}
