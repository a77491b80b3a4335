//! Wallet Error Types

use thiserror::Error;

use crate::core_types::{Coins, MinorUnits, UserId};
use crate::db::StoreError;
use crate::error::ErrorKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid user id: {0}")]
    InvalidUser(UserId),

    #[error("Source and target wallet cannot be the same")]
    SameWallet,

    #[error("Amount would cause overflow")]
    Overflow,

    // === Domain State Errors ===
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: MinorUnits,
        requested: MinorUnits,
    },

    #[error("Insufficient frozen funds: frozen {frozen}, requested {requested}")]
    InsufficientFrozen {
        frozen: MinorUnits,
        requested: MinorUnits,
    },

    #[error("Insufficient coins: balance {coin_balance}, requested {requested}")]
    InsufficientCoins { coin_balance: Coins, requested: Coins },

    // === Transient ===
    #[error("Wallet update contention exhausted after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },

    // === Partial Failure ===
    #[error("Transfer {transfer_id} debited the source but could not be reversed: {reason}")]
    TransferIncomplete { transfer_id: String, reason: String },

    // === System Errors ===
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl WalletError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidAmount => "INVALID_AMOUNT",
            WalletError::InvalidUser(_) => "INVALID_USER",
            WalletError::SameWallet => "SAME_WALLET",
            WalletError::Overflow => "OVERFLOW",
            WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WalletError::InsufficientFrozen { .. } => "INSUFFICIENT_FROZEN",
            WalletError::InsufficientCoins { .. } => "INSUFFICIENT_COINS",
            WalletError::ContentionExhausted { .. } => "CONTENTION_EXHAUSTED",
            WalletError::TransferIncomplete { .. } => "TRANSFER_INCOMPLETE",
            WalletError::Storage(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAmount
            | WalletError::InvalidUser(_)
            | WalletError::SameWallet
            | WalletError::Overflow => ErrorKind::Validation,
            WalletError::InsufficientFunds { .. }
            | WalletError::InsufficientFrozen { .. }
            | WalletError::InsufficientCoins { .. } => ErrorKind::DomainState,
            WalletError::ContentionExhausted { .. } => ErrorKind::Contention,
            WalletError::TransferIncomplete { .. } => ErrorKind::PartialFailure,
            WalletError::Storage(e) => e.kind(),
        }
    }
}
