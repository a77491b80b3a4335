//! Order Error Types

use thiserror::Error;

use super::state::{OrderAction, OrderStatus};
use crate::core_types::{MinorUnits, OrderId, UserId};
use crate::db::StoreError;
use crate::error::ErrorKind;
use crate::wallet::WalletError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    // === Validation Errors ===
    #[error("Buyer and seller cannot be the same user")]
    SameParty,

    #[error("Invalid user id: {0}")]
    InvalidUser(UserId),

    #[error("Discount {discount} exceeds gross amount {gross}")]
    DiscountExceedsGross { discount: MinorUnits, gross: MinorUnits },

    #[error("Refund amount must be greater than zero")]
    InvalidRefundAmount,

    #[error("Refund {requested} exceeds order amount {actual}")]
    RefundExceedsAmount { requested: MinorUnits, actual: MinorUnits },

    #[error("Amount would cause overflow")]
    Overflow,

    // === Permission Errors ===
    #[error("User {user_id} may not {action} this order")]
    Forbidden { user_id: UserId, action: OrderAction },

    // === Domain State Errors ===
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Cannot {action} an order in state {from}")]
    InvalidTransition { from: OrderStatus, action: OrderAction },

    #[error("Refund window has closed")]
    RefundWindowExpired,

    // === Transient ===
    #[error("Order update contention exhausted after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },

    // === Collaborators ===
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::SameParty => "SAME_PARTY",
            OrderError::InvalidUser(_) => "INVALID_USER",
            OrderError::DiscountExceedsGross { .. } => "DISCOUNT_EXCEEDS_GROSS",
            OrderError::InvalidRefundAmount => "INVALID_REFUND_AMOUNT",
            OrderError::RefundExceedsAmount { .. } => "REFUND_EXCEEDS_AMOUNT",
            OrderError::Overflow => "OVERFLOW",
            OrderError::Forbidden { .. } => "FORBIDDEN",
            OrderError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::RefundWindowExpired => "REFUND_WINDOW_EXPIRED",
            OrderError::ContentionExhausted { .. } => "CONTENTION_EXHAUSTED",
            OrderError::Wallet(e) => e.code(),
            OrderError::Storage(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::SameParty
            | OrderError::InvalidUser(_)
            | OrderError::DiscountExceedsGross { .. }
            | OrderError::InvalidRefundAmount
            | OrderError::RefundExceedsAmount { .. }
            | OrderError::Overflow => ErrorKind::Validation,
            OrderError::Forbidden { .. } => ErrorKind::Forbidden,
            OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::InvalidTransition { .. } | OrderError::RefundWindowExpired => {
                ErrorKind::DomainState
            }
            OrderError::ContentionExhausted { .. } => ErrorKind::Contention,
            OrderError::Wallet(e) => e.kind(),
            OrderError::Storage(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Completed,
            action: OrderAction::Cancel,
        };
        assert_eq!(err.to_string(), "Cannot cancel an order in state COMPLETED");
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(err.kind(), ErrorKind::DomainState);
    }

    #[test]
    fn test_wallet_errors_keep_their_kind() {
        let err: OrderError = WalletError::ContentionExhausted { attempts: 3 }.into();
        assert_eq!(err.kind(), ErrorKind::Contention);
        assert_eq!(err.code(), "CONTENTION_EXHAUSTED");
    }
}
