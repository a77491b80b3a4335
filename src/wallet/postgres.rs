//! PostgreSQL wallet store
//!
//! Implements the conditional-update contract against `wallets` and writes
//! the journal line into `wallet_entries` inside the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use super::store::WalletStore;
use super::types::{RefType, Wallet, WalletEntry, WalletOp};
use crate::core_types::{Coins, UserId, Version};
use crate::db::{SafeRow, StoreError, from_db_amount, to_db_amount, to_db_limit};

pub struct PgWalletStore {
    pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_wallet(row: &PgRow) -> Result<Wallet, StoreError> {
        let user_id: i64 = row.get_checked("user_id")?;
        let balance = from_db_amount(row.get_checked("balance")?, "balance")?;
        let frozen = from_db_amount(row.get_checked("frozen")?, "frozen")?;
        let coin_balance = from_db_amount(row.get_checked("coin_balance")?, "coin_balance")?;
        let total_income = from_db_amount(row.get_checked("total_income")?, "total_income")?;
        let total_expense = from_db_amount(row.get_checked("total_expense")?, "total_expense")?;
        let version = from_db_amount(row.get_checked("version")?, "version")?;
        let updated_at: DateTime<Utc> = row.get_checked("updated_at")?;

        Wallet::restore(
            user_id as UserId,
            balance,
            frozen,
            coin_balance,
            total_income,
            total_expense,
            version,
            updated_at,
        )
        .ok_or_else(|| StoreError::Corrupt(format!("wallet {} has frozen > balance", user_id)))
    }

    fn row_to_entry(row: &PgRow) -> Result<WalletEntry, StoreError> {
        let kind_id: i16 = row.get_checked("kind")?;
        let kind = WalletOp::from_id(kind_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid wallet op: {}", kind_id)))?;
        let ref_type_id: i16 = row.get_checked("ref_type")?;
        let ref_type = RefType::from_id(ref_type_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid ref_type: {}", ref_type_id)))?;
        let user_id: i64 = row.get_checked("user_id")?;

        Ok(WalletEntry {
            user_id: user_id as UserId,
            kind,
            amount: from_db_amount(row.get_checked("amount")?, "amount")?,
            balance_after: from_db_amount(row.get_checked("balance_after")?, "balance_after")?,
            frozen_after: from_db_amount(row.get_checked("frozen_after")?, "frozen_after")?,
            coin_balance_after: from_db_amount(
                row.get_checked("coin_balance_after")?,
                "coin_balance_after",
            )?,
            ref_type,
            ref_id: row.get_checked("ref_id")?,
            description: row.get_checked("description")?,
            version: from_db_amount(row.get_checked("version")?, "version")?,
            created_at: row.get_checked("created_at")?,
        })
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn load_or_create(
        &self,
        user_id: UserId,
        signup_bonus: Coins,
    ) -> Result<Wallet, StoreError> {
        let user = to_db_amount(user_id, "user_id")?;
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, coin_balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user)
        .bind(to_db_amount(signup_bonus, "coin_balance")?)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, balance, frozen, coin_balance, total_income, total_expense,
                   version, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_wallet(&row)
    }

    async fn compare_and_swap(
        &self,
        next: &Wallet,
        expected_version: Version,
        entry: &WalletEntry,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $1, frozen = $2, coin_balance = $3,
                total_income = $4, total_expense = $5,
                version = version + 1, updated_at = $6
            WHERE user_id = $7 AND version = $8
            "#,
        )
        .bind(to_db_amount(next.balance(), "balance")?)
        .bind(to_db_amount(next.frozen(), "frozen")?)
        .bind(to_db_amount(next.coin_balance(), "coin_balance")?)
        .bind(to_db_amount(next.total_income(), "total_income")?)
        .bind(to_db_amount(next.total_expense(), "total_expense")?)
        .bind(next.updated_at())
        .bind(to_db_amount(next.user_id(), "user_id")?)
        .bind(to_db_amount(expected_version, "version")?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO wallet_entries
                (user_id, kind, amount, balance_after, frozen_after, coin_balance_after,
                 ref_type, ref_id, description, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(to_db_amount(entry.user_id, "user_id")?)
        .bind(entry.kind.id())
        .bind(to_db_amount(entry.amount, "amount")?)
        .bind(to_db_amount(entry.balance_after, "balance_after")?)
        .bind(to_db_amount(entry.frozen_after, "frozen_after")?)
        .bind(to_db_amount(entry.coin_balance_after, "coin_balance_after")?)
        .bind(entry.ref_type.id())
        .bind(&entry.ref_id)
        .bind(&entry.description)
        .bind(to_db_amount(entry.version, "version")?)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, kind, amount, balance_after, frozen_after, coin_balance_after,
                   ref_type, ref_id, description, version, created_at
            FROM wallet_entries
            WHERE user_id = $1
            ORDER BY version DESC
            LIMIT $2
            "#,
        )
        .bind(to_db_amount(user_id, "user_id")?)
        .bind(to_db_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::types::LedgerRef;

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_conditional_update() {
        let Some(pool) = crate::db::test_pool().await else {
            eprintln!("Skipping test - database not available");
            return;
        };
        let store = PgWalletStore::new(pool);
        let user_id = (Utc::now().timestamp_micros() as u64) % 1_000_000_000 + 1_000_000;

        let wallet = store.load_or_create(user_id, 100).await.unwrap();
        assert_eq!(wallet.coin_balance(), 100);

        let reference = LedgerRef::new(RefType::Recharge, "pg-test", "top up");
        let next = wallet.apply(WalletOp::RechargeBalance, 500).unwrap();
        let entry = WalletEntry::record(WalletOp::RechargeBalance, 500, &next, &reference);
        assert!(store.compare_and_swap(&next, wallet.version(), &entry).await.unwrap());

        // stale version loses
        let stale = wallet.apply(WalletOp::RechargeBalance, 1).unwrap();
        let entry = WalletEntry::record(WalletOp::RechargeBalance, 1, &stale, &reference);
        assert!(!store.compare_and_swap(&stale, wallet.version(), &entry).await.unwrap());

        let stored = store.load_or_create(user_id, 100).await.unwrap();
        assert_eq!(stored.balance(), 500);
        assert_eq!(stored.version(), wallet.version() + 1);

        let entries = store.entries(user_id, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, WalletOp::RechargeBalance);
    }
}
