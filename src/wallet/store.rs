//! Wallet persistence contract

use async_trait::async_trait;

use super::types::{Wallet, WalletEntry};
use crate::core_types::{Coins, UserId, Version};
use crate::db::StoreError;

/// Storage collaborator for wallets
///
/// The only write is a conditional one: apply `next` if and only if the
/// stored version still equals `expected_version`. `Ok(false)` (zero rows
/// affected) is the ledger's retry signal.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Read a wallet, creating it with the signup bonus on first access.
    async fn load_or_create(&self, user_id: UserId, signup_bonus: Coins)
    -> Result<Wallet, StoreError>;

    /// `UPDATE wallets SET ..., version = version + 1 WHERE user_id = ? AND version = ?`
    /// plus the journal insert, atomically.
    async fn compare_and_swap(
        &self,
        next: &Wallet,
        expected_version: Version,
        entry: &WalletEntry,
    ) -> Result<bool, StoreError>;

    /// Journal lines for a user, newest first
    async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError>;
}
