mod eligibility_checker;
mod errors;
mod inventory_guard;
mod keyed_locks;
mod lending_workflow;
mod loan_ledger;
mod overdue_sweep;
mod policy;

pub use eligibility_checker::EligibilityChecker;
pub use errors::{ErrorKind, LendingError, Result};
pub use inventory_guard::InventoryGuard;
pub use keyed_locks::KeyedLocks;
pub use lending_workflow::{LendingWorkflow, ServiceDependencies};
pub use loan_ledger::{LoanLedger, MAX_NOTES_LEN};
pub use overdue_sweep::{run_overdue_sweep, spawn_periodic_sweep};
pub use policy::LendingPolicy;
