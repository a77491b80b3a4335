//! Service Ledger - wallet ledger and order payment core
//!
//! Balances are mutated without row locks: every write is a version-checked
//! conditional update, retried a bounded number of times when it loses a race.
//!
//! # Modules
//!
//! - [`wallet`] - Per-user balances, frozen funds, coins, journal, transfers
//! - [`order`] - Service order state machine with guarded transitions
//! - [`payment`] - Wallet and third-party payment orchestration
//! - [`refund`] - Refund with buyer credit and seller clawback
//! - [`retry`] - Generic retryable conditional mutation
//! - [`services`] - Wires the components over one set of stores
//! - [`db`] - PostgreSQL pool, schema and storage error
//! - [`money`] - Minor-unit formatting and fee arithmetic
//! - [`config`] / [`logging`] - YAML configuration and tracing setup

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod money;
pub mod retry;

pub mod order;
pub mod payment;
pub mod refund;
pub mod services;
pub mod wallet;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use core_types::{Bps, Coins, MinorUnits, OrderId, UserId, Version};
pub use error::ErrorKind;
pub use order::{
    CreateOrder, OrderAction, OrderError, OrderLifecycle, OrderStatus, PaymentMethod,
    ServiceOrder,
};
pub use payment::{PaymentError, PaymentOrchestrator};
pub use refund::{RefundCoordinator, RefundError, RefundRequest};
pub use retry::RetryPolicy;
pub use services::LedgerServices;
pub use wallet::{LedgerRef, RefType, Wallet, WalletError, WalletLedger};
