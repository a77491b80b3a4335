//! PostgreSQL payment attempt store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use super::store::PaymentAttemptStore;
use super::types::{AttemptStatus, PaymentAttempt};
use crate::core_types::OrderId;
use crate::db::{SafeRow, StoreError, from_db_amount, to_db_amount};
use crate::order::PaymentMethod;

const ATTEMPT_COLUMNS: &str =
    "payment_no, order_id, buyer_id, method, amount, status, third_party_no, created_at, finished_at";

pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_attempt(row: &PgRow) -> Result<PaymentAttempt, StoreError> {
        let status_id: i16 = row.get_checked("status")?;
        let status = AttemptStatus::from_id(status_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid attempt status: {}", status_id)))?;
        let method_id: i16 = row.get_checked("method")?;
        let method = PaymentMethod::from_id(method_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid payment method: {}", method_id)))?;

        Ok(PaymentAttempt {
            payment_no: row.get_checked("payment_no")?,
            order_id: from_db_amount(row.get_checked("order_id")?, "order_id")?,
            buyer_id: from_db_amount(row.get_checked("buyer_id")?, "buyer_id")?,
            method,
            amount: from_db_amount(row.get_checked("amount")?, "amount")?,
            status,
            third_party_no: row.get_checked("third_party_no")?,
            created_at: row.get_checked("created_at")?,
            finished_at: row.get_checked("finished_at")?,
        })
    }
}

#[async_trait]
impl PaymentAttemptStore for PgAttemptStore {
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_attempts
                (payment_no, order_id, buyer_id, method, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&attempt.payment_no)
        .bind(to_db_amount(attempt.order_id, "order_id")?)
        .bind(to_db_amount(attempt.buyer_id, "buyer_id")?)
        .bind(attempt.method.id())
        .bind(to_db_amount(attempt.amount, "amount")?)
        .bind(attempt.status.id())
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, payment_no: &str) -> Result<Option<PaymentAttempt>, StoreError> {
        let sql = format!(
            "SELECT {} FROM payment_attempts WHERE payment_no = $1",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(payment_no)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_attempt).transpose()
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>, StoreError> {
        let sql = format!(
            "SELECT {} FROM payment_attempts WHERE order_id = $1 ORDER BY created_at",
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_db_amount(order_id, "order_id")?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_attempt).collect()
    }

    async fn update_status_if(
        &self,
        payment_no: &str,
        expected: AttemptStatus,
        next: AttemptStatus,
        third_party_no: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_attempts
            SET status = $1, third_party_no = COALESCE($2, third_party_no), finished_at = $3
            WHERE payment_no = $4 AND status = $5
            "#,
        )
        .bind(next.id())
        .bind(third_party_no)
        .bind(finished_at)
        .bind(payment_no)
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
