//! Service Orders
//!
//! # State Machine
//!
//! ```text
//!                   cancel
//! PENDING_PAYMENT ─────────→ CANCELLED
//!        │ pay
//!        ↓          start_service            complete
//!      PAID ──────────────────→ IN_SERVICE ─────────→ COMPLETED
//!        │ │                                             │
//!        │ └──────────────── complete ──────────────────→│
//!        │ refund                                        │ refund
//!        └──────────────────→ REFUNDED ←─────────────────┘
//! ```
//!
//! Every transition is a version-checked write; a pair outside this table
//! fails with `InvalidTransition` and changes nothing.

pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod postgres;
pub mod state;
pub mod store;
pub mod types;

pub use error::OrderError;
pub use lifecycle::OrderLifecycle;
pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;
pub use state::{OrderAction, OrderStatus};
pub use store::OrderStore;
pub use types::{
    Completion, CreateOrder, OrderExtras, PaymentMethod, RefundClaim, SellerCredit, ServiceOrder,
};
