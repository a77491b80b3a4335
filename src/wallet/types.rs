//! Wallet Core Types
//!
//! `Wallet` is the enforced balance record: fields are private and every
//! change goes through [`Wallet::apply`], which checks the precondition
//! against the values it was read with and bumps `version` by exactly one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::WalletError;
use crate::core_types::{Coins, MinorUnits, UserId, Version};

/// One balance record per user
///
/// # Invariants (ENFORCED by private fields):
/// - `balance >= 0`, `frozen >= 0` (unsigned, checked arithmetic)
/// - `frozen <= balance`: frozen funds are a reservation inside `balance`
/// - every applied mutation increments `version` by exactly 1
///
/// "Available" always means `balance - frozen`, for every check that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    user_id: UserId,
    balance: MinorUnits,
    frozen: MinorUnits,
    coin_balance: Coins,
    total_income: MinorUnits,
    total_expense: MinorUnits,
    version: Version,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh wallet: zero funds, signup bonus in coins, version 0
    pub fn new(user_id: UserId, signup_bonus: Coins) -> Self {
        Self {
            user_id,
            balance: 0,
            frozen: 0,
            coin_balance: signup_bonus,
            total_income: 0,
            total_expense: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Rebuild from a stored row. Rejects rows that break the invariants.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        user_id: UserId,
        balance: MinorUnits,
        frozen: MinorUnits,
        coin_balance: Coins,
        total_income: MinorUnits,
        total_expense: MinorUnits,
        version: Version,
        updated_at: DateTime<Utc>,
    ) -> Option<Self> {
        if frozen > balance {
            return None;
        }
        Some(Self {
            user_id,
            balance,
            frozen,
            coin_balance,
            total_income,
            total_expense,
            version,
            updated_at,
        })
    }

    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    #[inline]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[inline]
    pub fn balance(&self) -> MinorUnits {
        self.balance
    }

    #[inline]
    pub fn frozen(&self) -> MinorUnits {
        self.frozen
    }

    /// Spendable funds: `balance - frozen`
    #[inline]
    pub fn available(&self) -> MinorUnits {
        self.balance - self.frozen
    }

    #[inline]
    pub fn coin_balance(&self) -> Coins {
        self.coin_balance
    }

    #[inline]
    pub fn total_income(&self) -> MinorUnits {
        self.total_income
    }

    #[inline]
    pub fn total_expense(&self) -> MinorUnits {
        self.total_expense
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ============================================================
    // PURE STATE TRANSITION
    // ============================================================

    /// Compute the wallet that results from `op`, without touching storage.
    ///
    /// # Errors
    /// - `InvalidAmount` if amount is zero
    /// - `InsufficientFunds` / `InsufficientFrozen` / `InsufficientCoins`
    ///   when the precondition fails against `self`
    /// - `Overflow` on arithmetic overflow
    pub fn apply(&self, op: WalletOp, amount: u64) -> Result<Wallet, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount);
        }

        let mut next = self.clone();
        match op {
            WalletOp::DeductBalance => {
                self.require_available(amount)?;
                next.balance -= amount;
                next.total_expense = add(self.total_expense, amount)?;
            }
            WalletOp::RechargeBalance => {
                next.balance = add(self.balance, amount)?;
            }
            WalletOp::FreezeBalance => {
                self.require_available(amount)?;
                next.frozen += amount;
            }
            WalletOp::UnfreezeBalance => {
                self.require_frozen(amount)?;
                next.frozen -= amount;
            }
            WalletOp::DeductFrozen => {
                self.require_frozen(amount)?;
                next.frozen -= amount;
                next.balance -= amount;
                next.total_expense = add(self.total_expense, amount)?;
            }
            WalletOp::AddIncome => {
                next.balance = add(self.balance, amount)?;
                next.total_income = add(self.total_income, amount)?;
            }
            WalletOp::AddCoins => {
                next.coin_balance = add(self.coin_balance, amount)?;
            }
            WalletOp::DeductCoins => {
                if self.coin_balance < amount {
                    return Err(WalletError::InsufficientCoins {
                        coin_balance: self.coin_balance,
                        requested: amount,
                    });
                }
                next.coin_balance -= amount;
            }
        }

        next.version = self.version.checked_add(1).ok_or(WalletError::Overflow)?;
        next.updated_at = Utc::now();
        Ok(next)
    }

    fn require_available(&self, amount: MinorUnits) -> Result<(), WalletError> {
        if self.available() < amount {
            return Err(WalletError::InsufficientFunds {
                available: self.available(),
                requested: amount,
            });
        }
        Ok(())
    }

    fn require_frozen(&self, amount: MinorUnits) -> Result<(), WalletError> {
        if self.frozen < amount {
            return Err(WalletError::InsufficientFrozen {
                frozen: self.frozen,
                requested: amount,
            });
        }
        Ok(())
    }
}

fn add(a: u64, b: u64) -> Result<u64, WalletError> {
    a.checked_add(b).ok_or(WalletError::Overflow)
}

/// Wallet mutation kinds. IDs are stored as SMALLINT in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum WalletOp {
    DeductBalance = 1,
    RechargeBalance = 2,
    FreezeBalance = 3,
    UnfreezeBalance = 4,
    DeductFrozen = 5,
    AddIncome = 6,
    AddCoins = 7,
    DeductCoins = 8,
}

impl WalletOp {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WalletOp::DeductBalance),
            2 => Some(WalletOp::RechargeBalance),
            3 => Some(WalletOp::FreezeBalance),
            4 => Some(WalletOp::UnfreezeBalance),
            5 => Some(WalletOp::DeductFrozen),
            6 => Some(WalletOp::AddIncome),
            7 => Some(WalletOp::AddCoins),
            8 => Some(WalletOp::DeductCoins),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletOp::DeductBalance => "DEDUCT_BALANCE",
            WalletOp::RechargeBalance => "RECHARGE_BALANCE",
            WalletOp::FreezeBalance => "FREEZE_BALANCE",
            WalletOp::UnfreezeBalance => "UNFREEZE_BALANCE",
            WalletOp::DeductFrozen => "DEDUCT_FROZEN",
            WalletOp::AddIncome => "ADD_INCOME",
            WalletOp::AddCoins => "ADD_COINS",
            WalletOp::DeductCoins => "DEDUCT_COINS",
        }
    }
}

impl fmt::Display for WalletOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a wallet mutation was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum RefType {
    /// Buyer pays for an order
    Order = 1,
    /// Seller receives the net amount of an order
    Settlement = 2,
    /// Buyer is refunded
    Refund = 3,
    /// Seller settlement is taken back after a refund
    Clawback = 4,
    Recharge = 5,
    Transfer = 6,
    /// Reversal of an earlier step that could not be completed
    Compensation = 7,
    Reward = 8,
}

impl RefType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(RefType::Order),
            2 => Some(RefType::Settlement),
            3 => Some(RefType::Refund),
            4 => Some(RefType::Clawback),
            5 => Some(RefType::Recharge),
            6 => Some(RefType::Transfer),
            7 => Some(RefType::Compensation),
            8 => Some(RefType::Reward),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Order => "ORDER",
            RefType::Settlement => "SETTLEMENT",
            RefType::Refund => "REFUND",
            RefType::Clawback => "CLAWBACK",
            RefType::Recharge => "RECHARGE",
            RefType::Transfer => "TRANSFER",
            RefType::Compensation => "COMPENSATION",
            RefType::Reward => "REWARD",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `(refType, refId, description)` attached to every mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRef {
    pub ref_type: RefType,
    pub ref_id: String,
    pub description: String,
}

impl LedgerRef {
    pub fn new(ref_type: RefType, ref_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            ref_type,
            ref_id: ref_id.into(),
            description: description.into(),
        }
    }
}

/// Journal line written together with each applied mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub user_id: UserId,
    pub kind: WalletOp,
    pub amount: u64,
    pub balance_after: MinorUnits,
    pub frozen_after: MinorUnits,
    pub coin_balance_after: Coins,
    pub ref_type: RefType,
    pub ref_id: String,
    pub description: String,
    /// Wallet version this entry produced
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

impl WalletEntry {
    pub fn record(kind: WalletOp, amount: u64, after: &Wallet, reference: &LedgerRef) -> Self {
        Self {
            user_id: after.user_id(),
            kind,
            amount,
            balance_after: after.balance(),
            frozen_after: after.frozen(),
            coin_balance_after: after.coin_balance(),
            ref_type: reference.ref_type,
            ref_id: reference.ref_id.clone(),
            description: reference.description.clone(),
            version: after.version(),
            created_at: after.updated_at(),
        }
    }
}

/// Both legs of a completed transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub from: Wallet,
    pub to: Wallet,
}
