//! Wallet Ledger
//!
//! One balance record per user, mutated only through optimistic
//! conditional writes.
//!
//! # Fields
//!
//! ```text
//! balance ─┬─ frozen     (reserved for a pending obligation)
//!          └─ available  (balance - frozen, spendable)
//! coin_balance           (virtual currency)
//! total_income / total_expense (running aggregates)
//! version                (+1 on every applied mutation)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **No lost updates**: a write applies only if `version` is unchanged
//!    since the read that validated it
//! 2. **No negative funds**: preconditions are checked against the same read
//! 3. **Bounded retries**: 3 attempts, then `ContentionExhausted`

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use error::WalletError;
pub use ledger::WalletLedger;
pub use memory::InMemoryWalletStore;
pub use postgres::PgWalletStore;
pub use store::WalletStore;
pub use types::{LedgerRef, RefType, TransferReceipt, Wallet, WalletEntry, WalletOp};
