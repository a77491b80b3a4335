//! Refund Error Types

use thiserror::Error;

use crate::core_types::OrderId;
use crate::error::ErrorKind;
use crate::order::OrderError;
use crate::wallet::WalletError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Buyer credit failed; the order was put back to its previous status
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Buyer credit failed and the order could not be restored: it reads
    /// REFUNDED but the buyer was not paid
    #[error("Order {order_id} marked refunded but buyer was not credited: {reason}")]
    RefundStuck { order_id: OrderId, reason: String },
}

impl RefundError {
    pub fn code(&self) -> &'static str {
        match self {
            RefundError::Order(e) => e.code(),
            RefundError::Wallet(e) => e.code(),
            RefundError::RefundStuck { .. } => "REFUND_STUCK",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RefundError::Order(e) => e.kind(),
            RefundError::Wallet(e) => e.kind(),
            RefundError::RefundStuck { .. } => ErrorKind::PartialFailure,
        }
    }
}
