//! Wallet Ledger
//!
//! Every mutating operation follows one algorithm:
//!
//! ```text
//! read wallet (version v) → check precondition → UPDATE ... WHERE version = v
//!        ↑                                                │
//!        └──────── 0 rows affected: backoff, retry ───────┘
//! ```
//!
//! A domain rejection stops immediately with no write. Running out of
//! attempts yields `ContentionExhausted`, which tells the caller that the
//! whole business operation may succeed if retried.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::WalletError;
use super::store::WalletStore;
use super::types::{LedgerRef, RefType, TransferReceipt, Wallet, WalletEntry, WalletOp};
use crate::config::LedgerConfig;
use crate::core_types::{Coins, MinorUnits, UserId};
use crate::db::StoreError;
use crate::money::format_amount;
use crate::retry::{CasOutcome, RetryError, RetryPolicy};

pub struct WalletLedger {
    store: Arc<dyn WalletStore>,
    retry: RetryPolicy,
    signup_bonus: Coins,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn WalletStore>, config: &LedgerConfig) -> Self {
        Self::with_retry(
            store,
            RetryPolicy::from_config(config),
            config.signup_bonus_coins,
        )
    }

    pub fn with_retry(store: Arc<dyn WalletStore>, retry: RetryPolicy, signup_bonus: Coins) -> Self {
        Self {
            store,
            retry,
            signup_bonus,
        }
    }

    /// Current wallet, created with the signup bonus on first access
    pub async fn wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        validate_user(user_id)?;
        Ok(self.store.load_or_create(user_id, self.signup_bonus).await?)
    }

    /// Journal lines, newest first
    pub async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, WalletError> {
        validate_user(user_id)?;
        Ok(self.store.entries(user_id, limit).await?)
    }

    // ============================================================
    // MUTATIONS
    // ============================================================

    /// Spend available funds. Requires `balance - frozen >= amount`.
    pub async fn deduct_balance(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::DeductBalance, user_id, amount, reference)
            .await
    }

    /// Add funds without counting them as income (top-ups, refunds, reversals)
    pub async fn recharge_balance(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::RechargeBalance, user_id, amount, reference)
            .await
    }

    /// Reserve available funds for a pending obligation
    pub async fn freeze_balance(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::FreezeBalance, user_id, amount, reference)
            .await
    }

    /// Release a reservation back to available funds
    pub async fn unfreeze_balance(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::UnfreezeBalance, user_id, amount, reference)
            .await
    }

    /// Spend reserved funds: lowers both `frozen` and `balance`
    pub async fn deduct_frozen(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::DeductFrozen, user_id, amount, reference)
            .await
    }

    /// Credit earnings; counted in `total_income`
    pub async fn add_income(
        &self,
        user_id: UserId,
        amount: MinorUnits,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::AddIncome, user_id, amount, reference)
            .await
    }

    pub async fn add_coins(
        &self,
        user_id: UserId,
        amount: Coins,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::AddCoins, user_id, amount, reference)
            .await
    }

    pub async fn deduct_coins(
        &self,
        user_id: UserId,
        amount: Coins,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        self.mutate(WalletOp::DeductCoins, user_id, amount, reference)
            .await
    }

    /// Move funds between two wallets as a two-step saga.
    ///
    /// `deduct_balance(from)` then `add_income(to)`. If the credit fails the
    /// debit is reversed with a best-effort `recharge_balance(from)`. This is
    /// NOT atomic across wallets: a crash between the steps leaves the
    /// debit in place, recognisable in the journal by the shared transfer id.
    pub async fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: MinorUnits,
        description: &str,
    ) -> Result<TransferReceipt, WalletError> {
        validate_user(from)?;
        validate_user(to)?;
        if from == to {
            return Err(WalletError::SameWallet);
        }
        if amount == 0 {
            return Err(WalletError::InvalidAmount);
        }

        let transfer_id = format!("TR{}", ulid::Ulid::new());
        let reference = LedgerRef::new(RefType::Transfer, &transfer_id, description);

        let from_wallet = self.deduct_balance(from, amount, &reference).await?;

        match self.add_income(to, amount, &reference).await {
            Ok(to_wallet) => {
                info!(
                    transfer_id = %transfer_id,
                    from = from,
                    to = to,
                    amount = amount,
                    "Transfer committed"
                );
                Ok(TransferReceipt {
                    transfer_id,
                    from: from_wallet,
                    to: to_wallet,
                })
            }
            Err(credit_err) => {
                warn!(
                    transfer_id = %transfer_id,
                    to = to,
                    error = %credit_err,
                    "Transfer credit failed, reversing debit"
                );
                let reversal = LedgerRef::new(
                    RefType::Compensation,
                    &transfer_id,
                    format!("Reversal of failed transfer to user {}", to),
                );
                match self.recharge_balance(from, amount, &reversal).await {
                    Ok(_) => Err(credit_err),
                    Err(reversal_err) => {
                        error!(
                            transfer_id = %transfer_id,
                            from = from,
                            amount = amount,
                            credit_error = %credit_err,
                            reversal_error = %reversal_err,
                            "Transfer reversal failed - manual reconciliation required"
                        );
                        Err(WalletError::TransferIncomplete {
                            transfer_id,
                            reason: format!(
                                "credit failed ({}), reversal failed ({})",
                                credit_err, reversal_err
                            ),
                        })
                    }
                }
            }
        }
    }

    // ============================================================
    // RETRY LOOP
    // ============================================================

    async fn mutate(
        &self,
        op: WalletOp,
        user_id: UserId,
        amount: u64,
        reference: &LedgerRef,
    ) -> Result<Wallet, WalletError> {
        validate_user(user_id)?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount);
        }

        let wallet = self
            .retry
            .run(op.as_str(), move |attempt| {
                self.try_mutate(op, user_id, amount, reference, attempt)
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts } => {
                    WalletError::ContentionExhausted { attempts }
                }
                RetryError::Aborted(e) => e,
            })?;

        info!(
            user_id = user_id,
            op = %op,
            amount = amount,
            version = wallet.version(),
            ref_type = %reference.ref_type,
            ref_id = %reference.ref_id,
            "Wallet {} {}",
            op.as_str().to_lowercase(),
            format_amount(amount)
        );
        Ok(wallet)
    }

    /// One read → check → conditional write round
    async fn try_mutate(
        &self,
        op: WalletOp,
        user_id: UserId,
        amount: u64,
        reference: &LedgerRef,
        attempt: u32,
    ) -> Result<CasOutcome<Wallet>, WalletError> {
        let current = match self.store.load_or_create(user_id, self.signup_bonus).await {
            Ok(wallet) => wallet,
            Err(StoreError::Timeout) => return Ok(CasOutcome::Conflict),
            Err(e) => return Err(e.into()),
        };

        let next = current.apply(op, amount)?;
        let entry = WalletEntry::record(op, amount, &next, reference);

        match self
            .store
            .compare_and_swap(&next, current.version(), &entry)
            .await
        {
            Ok(true) => Ok(CasOutcome::Applied(next)),
            Ok(false) | Err(StoreError::Timeout) => {
                debug!(
                    user_id = user_id,
                    op = %op,
                    attempt = attempt,
                    read_version = current.version(),
                    "Wallet version moved underneath us"
                );
                Ok(CasOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_user(user_id: UserId) -> Result<(), WalletError> {
    if user_id == 0 {
        return Err(WalletError::InvalidUser(user_id));
    }
    Ok(())
}
