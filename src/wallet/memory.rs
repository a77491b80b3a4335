//! In-memory wallet store
//!
//! Emulates the database's row-level conditional update with `DashMap`
//! entry guards. A guard is held only for the compare-and-set itself, never
//! across an await.

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::WalletStore;
use super::types::{Wallet, WalletEntry};
use crate::core_types::{Coins, UserId, Version};
use crate::db::StoreError;

#[derive(Default)]
pub struct InMemoryWalletStore {
    wallets: DashMap<UserId, Wallet>,
    entries: DashMap<UserId, Vec<WalletEntry>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn load_or_create(
        &self,
        user_id: UserId,
        signup_bonus: Coins,
    ) -> Result<Wallet, StoreError> {
        let wallet = self
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id, signup_bonus))
            .clone();
        Ok(wallet)
    }

    async fn compare_and_swap(
        &self,
        next: &Wallet,
        expected_version: Version,
        entry: &WalletEntry,
    ) -> Result<bool, StoreError> {
        let Some(mut current) = self.wallets.get_mut(&next.user_id()) else {
            return Err(StoreError::NotFound(format!("wallet {}", next.user_id())));
        };
        if current.version() != expected_version {
            return Ok(false);
        }
        *current = next.clone();
        // journal is appended while the row guard is still held
        self.entries
            .entry(next.user_id())
            .or_default()
            .push(entry.clone());
        Ok(true)
    }

    async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError> {
        Ok(self
            .entries
            .get(&user_id)
            .map(|list| list.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
