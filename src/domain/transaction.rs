use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BookBorrowed, BookId, BookReturned, FineRate, LoanPeriod, LoanPeriodError, LostError,
    MemberId, ReturnError, TransactionBecameOverdue, TransactionId, TransactionMarkedLost,
};

/// 取引ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// 貸出中
    Borrowed,
    /// 延滞中
    Overdue,
    /// 返却済み（終端）
    Returned,
    /// 紛失（終端）
    Lost,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Borrowed => "BORROWED",
            TransactionStatus::Overdue => "OVERDUE",
            TransactionStatus::Returned => "RETURNED",
            TransactionStatus::Lost => "LOST",
        }
    }

    /// 貸出中として数えるか（BORROWED / OVERDUE）
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Borrowed | TransactionStatus::Overdue)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BORROWED" => Ok(TransactionStatus::Borrowed),
            "OVERDUE" => Ok(TransactionStatus::Overdue),
            "RETURNED" => Ok(TransactionStatus::Returned),
            "LOST" => Ok(TransactionStatus::Lost),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// 取引 - 1冊の書籍の1回の貸出記録
///
/// フィールドはクレート外から書き換えられない。
/// 状態遷移はこのモジュールの純粋関数が新しい値として生成する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub(crate) transaction_id: TransactionId,
    pub(crate) book_id: BookId,
    pub(crate) member_id: MemberId,
    pub(crate) borrow_date: NaiveDate,
    pub(crate) due_date: NaiveDate,
    pub(crate) return_date: Option<NaiveDate>,
    pub(crate) status: TransactionStatus,
    pub(crate) fine_amount: Decimal,
    pub(crate) notes: Option<String>,
}

impl Transaction {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn borrow_date(&self) -> NaiveDate {
        self.borrow_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// 保存されている料金（返却・紛失後は確定値、それ以前は最後の評価時点の値）
    pub fn fine_amount(&self) -> Decimal {
        self.fine_amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// 指定日時点の派生ステータス
    ///
    /// 保存値がBORROWEDでも期限を過ぎていればOVERDUEとして扱う。
    pub fn status_as_of(&self, as_of: NaiveDate) -> TransactionStatus {
        if is_overdue(self, as_of) {
            TransactionStatus::Overdue
        } else {
            self.status
        }
    }

    /// 指定日時点の料金
    ///
    /// 終端状態では確定値、貸出中なら日付から計算し直す。
    pub fn fine_as_of(&self, as_of: NaiveDate, rate: FineRate) -> Decimal {
        if self.status.is_active() {
            compute_fine(self.due_date, as_of, rate)
        } else {
            self.fine_amount
        }
    }
}

/// 純粋関数：延滞日数
///
/// 期限日当日は延滞ではない。
pub fn days_overdue(due_date: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due_date).num_days().max(0)
}

/// 純粋関数：延滞料金
///
/// `max(0, 延滞日数) * 日額`。保存された日付だけから再計算できる。
pub fn compute_fine(due_date: NaiveDate, as_of: NaiveDate, rate: FineRate) -> Decimal {
    Decimal::from(days_overdue(due_date, as_of)) * rate.per_day()
}

/// 純粋関数：延滞判定
pub fn is_overdue(transaction: &Transaction, as_of: NaiveDate) -> bool {
    transaction.status.is_active() && as_of > transaction.due_date
}

/// 純粋関数：貸出記録を作成する
///
/// ビジネスルール：
/// - 返却期限 = 貸出日 + 貸出期間
/// - 状態はBORROWED、料金は0
///
/// 副作用なし。新しいTransactionとイベントを返す。
pub fn open_transaction(
    book_id: BookId,
    member_id: MemberId,
    borrow_date: NaiveDate,
    period: LoanPeriod,
    notes: Option<String>,
) -> Result<(Transaction, BookBorrowed), LoanPeriodError> {
    let due_date = borrow_date
        .checked_add_days(Days::new(u64::from(period.days())))
        .ok_or(LoanPeriodError::OutOfRange(i64::from(period.days())))?;

    let transaction = Transaction {
        transaction_id: TransactionId::new(),
        book_id,
        member_id,
        borrow_date,
        due_date,
        return_date: None,
        status: TransactionStatus::Borrowed,
        fine_amount: Decimal::ZERO,
        notes,
    };

    let event = BookBorrowed {
        transaction_id: transaction.transaction_id,
        book_id,
        member_id,
        borrow_date,
        due_date,
    };

    Ok((transaction, event))
}

/// 純粋関数：返却を確定する
///
/// ビジネスルール：
/// - BORROWEDまたはOVERDUEからのみ
/// - 延滞していても返却は受け付け、料金を確定する
///
/// 副作用なし。新しいTransactionとイベントを返す。
pub fn finalize_return(
    transaction: &Transaction,
    returned_on: NaiveDate,
    rate: FineRate,
) -> Result<(Transaction, BookReturned), ReturnError> {
    match transaction.status {
        TransactionStatus::Returned => return Err(ReturnError::AlreadyReturned),
        TransactionStatus::Lost => return Err(ReturnError::MarkedLost),
        TransactionStatus::Borrowed | TransactionStatus::Overdue => {}
    }

    let was_overdue = returned_on > transaction.due_date;
    let fine_amount = if was_overdue {
        compute_fine(transaction.due_date, returned_on, rate)
    } else {
        Decimal::ZERO
    };

    let returned = Transaction {
        return_date: Some(returned_on),
        status: TransactionStatus::Returned,
        fine_amount,
        ..transaction.clone()
    };

    let event = BookReturned {
        transaction_id: transaction.transaction_id,
        book_id: transaction.book_id,
        member_id: transaction.member_id,
        return_date: returned_on,
        was_overdue,
        fine_amount,
    };

    Ok((returned, event))
}

/// 純粋関数：延滞を評価する
///
/// 貸出中かつ期限切れの場合のみ`Some`を返す。
/// - BORROWED: OVERDUEに遷移し、イベントを伴う
/// - OVERDUE: 料金のみ再計算、イベントなし
///
/// 同じ評価日で何度呼んでも同じ結果になる。
pub fn evaluate_overdue(
    transaction: &Transaction,
    as_of: NaiveDate,
    rate: FineRate,
) -> Option<(Transaction, Option<TransactionBecameOverdue>)> {
    if !is_overdue(transaction, as_of) {
        return None;
    }

    let fine_to_date = compute_fine(transaction.due_date, as_of, rate);
    let evaluated = Transaction {
        status: TransactionStatus::Overdue,
        fine_amount: fine_to_date,
        ..transaction.clone()
    };

    let event = (transaction.status == TransactionStatus::Borrowed).then(|| {
        TransactionBecameOverdue {
            transaction_id: transaction.transaction_id,
            book_id: transaction.book_id,
            member_id: transaction.member_id,
            due_date: transaction.due_date,
            detected_on: as_of,
            fine_to_date,
        }
    });

    Some((evaluated, event))
}

/// 純粋関数：紛失として処理する
///
/// ビジネスルール：
/// - BORROWEDまたはOVERDUEからのみ
/// - 処理日までの延滞料金を確定する
pub fn mark_lost(
    transaction: &Transaction,
    marked_on: NaiveDate,
    rate: FineRate,
) -> Result<(Transaction, TransactionMarkedLost), LostError> {
    match transaction.status {
        TransactionStatus::Returned => return Err(LostError::AlreadyReturned),
        TransactionStatus::Lost => return Err(LostError::AlreadyLost),
        TransactionStatus::Borrowed | TransactionStatus::Overdue => {}
    }

    let fine_amount = compute_fine(transaction.due_date, marked_on, rate);
    let lost = Transaction {
        status: TransactionStatus::Lost,
        fine_amount,
        ..transaction.clone()
    };

    let event = TransactionMarkedLost {
        transaction_id: transaction.transaction_id,
        book_id: transaction.book_id,
        member_id: transaction.member_id,
        marked_on,
        fine_amount,
    };

    Ok((lost, event))
}
