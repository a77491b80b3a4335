//! Payment Error Types

use thiserror::Error;

use crate::core_types::{MinorUnits, OrderId};
use crate::db::StoreError;
use crate::error::ErrorKind;
use crate::order::{OrderError, PaymentMethod};
use crate::wallet::WalletError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    // === Validation Errors ===
    #[error("Payment credential required")]
    MissingCredential,

    #[error("Method {0} cannot be used here")]
    UnsupportedMethod(PaymentMethod),

    #[error("Callback does not match attempt {payment_no}")]
    AttemptMismatch { payment_no: String },

    // === Permission Errors ===
    #[error("Invalid payment credential")]
    InvalidCredential,

    // === Domain State Errors ===
    #[error("Payment attempt not found: {0}")]
    AttemptNotFound(String),

    // === Partial Failure ===
    #[error(
        "Order {order_id} could not be marked paid after charging {charged} (compensated: {compensated}): {reason}"
    )]
    OrderUpdateFailed {
        order_id: OrderId,
        charged: MinorUnits,
        compensated: bool,
        reason: String,
    },

    // === Collaborators ===
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::MissingCredential => "MISSING_CREDENTIAL",
            PaymentError::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            PaymentError::AttemptMismatch { .. } => "ATTEMPT_MISMATCH",
            PaymentError::InvalidCredential => "INVALID_CREDENTIAL",
            PaymentError::AttemptNotFound(_) => "ATTEMPT_NOT_FOUND",
            PaymentError::OrderUpdateFailed { .. } => "ORDER_UPDATE_FAILED",
            PaymentError::Gateway(_) => "GATEWAY_ERROR",
            PaymentError::Order(e) => e.code(),
            PaymentError::Wallet(e) => e.code(),
            PaymentError::Storage(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::MissingCredential
            | PaymentError::UnsupportedMethod(_)
            | PaymentError::AttemptMismatch { .. } => ErrorKind::Validation,
            PaymentError::InvalidCredential => ErrorKind::Forbidden,
            PaymentError::AttemptNotFound(_) => ErrorKind::NotFound,
            PaymentError::OrderUpdateFailed { .. } => ErrorKind::PartialFailure,
            PaymentError::Gateway(_) => ErrorKind::Infrastructure,
            PaymentError::Order(e) => e.kind(),
            PaymentError::Wallet(e) => e.kind(),
            PaymentError::Storage(e) => e.kind(),
        }
    }
}
