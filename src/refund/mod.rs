//! Refunds
//!
//! The REFUNDED transition is written first, then the buyer is credited and,
//! if the seller had already been settled, the seller's share is clawed back.

pub mod coordinator;
pub mod error;

pub use coordinator::{ClawbackOutcome, RefundCoordinator, RefundReceipt, RefundRequest};
pub use error::RefundError;
