pub mod catalog_store;
pub mod membership_store;
pub mod transaction_store;

use std::sync::{Mutex, MutexGuard};

pub use catalog_store::CatalogStore as MemoryCatalogStore;
pub use membership_store::MembershipStore as MemoryMembershipStore;
pub use transaction_store::TransactionStore as MemoryTransactionStore;

/// 毒されたロックをポートのエラーとして返す
fn lock<T>(
    mutex: &Mutex<T>,
) -> std::result::Result<MutexGuard<'_, T>, Box<dyn std::error::Error + Send + Sync>> {
    mutex
        .lock()
        .map_err(|_| "in-memory store lock poisoned".into())
}
