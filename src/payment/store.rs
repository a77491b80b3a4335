//! Payment attempt persistence contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{AttemptStatus, PaymentAttempt};
use crate::core_types::OrderId;
use crate::db::StoreError;

#[async_trait]
pub trait PaymentAttemptStore: Send + Sync {
    /// Fails with `StoreError::Conflict` if `payment_no` already exists
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<(), StoreError>;

    async fn get(&self, payment_no: &str) -> Result<Option<PaymentAttempt>, StoreError>;

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>, StoreError>;

    /// Move the attempt to `next` only if it is still in `expected`.
    /// `Ok(false)` means someone else already finalized it.
    async fn update_status_if(
        &self,
        payment_no: &str,
        expected: AttemptStatus,
        next: AttemptStatus,
        third_party_no: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
