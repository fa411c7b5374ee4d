pub mod catalog_store;
pub mod membership_store;
pub mod transaction_store;

// パブリックに型を再エクスポート
pub use catalog_store::CatalogStore as PostgresCatalogStore;
pub use membership_store::MembershipStore as PostgresMembershipStore;
pub use transaction_store::TransactionStore as PostgresTransactionStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 保存値が型の制約を満たさない場合のエラー
fn invalid_data(message: impl Into<String>) -> BoxError {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    ))
}

/// INTEGER列をu32に変換する
fn to_u32(value: i32, column: &str) -> Result<u32, BoxError> {
    u32::try_from(value).map_err(|_| invalid_data(format!("{column} out of range: {value}")))
}

/// u32をINTEGER列に書き込める値に変換する
fn to_i32(value: u32, column: &str) -> Result<i32, BoxError> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{column} out of range: {value}")))
}
