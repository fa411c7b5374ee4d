pub mod catalog_store;
pub mod membership_store;
pub mod transaction_store;

pub use catalog_store::{AdjustOutcome, CatalogStore};
pub use membership_store::MembershipStore;
pub use transaction_store::TransactionStore;
