//! In-memory payment attempt store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::store::PaymentAttemptStore;
use super::types::{AttemptStatus, PaymentAttempt};
use crate::core_types::OrderId;
use crate::db::StoreError;

#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: DashMap<String, PaymentAttempt>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentAttemptStore for InMemoryAttemptStore {
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<(), StoreError> {
        match self.attempts.entry(attempt.payment_no.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "payment_no {} already exists",
                attempt.payment_no
            ))),
            Entry::Vacant(slot) => {
                slot.insert(attempt.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, payment_no: &str) -> Result<Option<PaymentAttempt>, StoreError> {
        Ok(self.attempts.get(payment_no).map(|a| a.clone()))
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>, StoreError> {
        let mut attempts: Vec<PaymentAttempt> = self
            .attempts
            .iter()
            .filter(|a| a.order_id == order_id)
            .map(|a| a.clone())
            .collect();
        attempts.sort_by_key(|a| a.created_at);
        Ok(attempts)
    }

    async fn update_status_if(
        &self,
        payment_no: &str,
        expected: AttemptStatus,
        next: AttemptStatus,
        third_party_no: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut attempt) = self.attempts.get_mut(payment_no) else {
            return Ok(false);
        };
        if attempt.status != expected {
            return Ok(false);
        }
        attempt.status = next;
        if let Some(no) = third_party_no {
            attempt.third_party_no = Some(no.to_string());
        }
        attempt.finished_at = Some(finished_at);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PaymentMethod;

    fn attempt(payment_no: &str) -> PaymentAttempt {
        PaymentAttempt {
            payment_no: payment_no.to_string(),
            order_id: 9,
            buyer_id: 1,
            method: PaymentMethod::Alipay,
            amount: 1_000,
            status: AttemptStatus::Pending,
            third_party_no: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn test_status_cas_applies_once() {
        let store = InMemoryAttemptStore::new();
        store.insert(&attempt("PAY1")).await.unwrap();

        let now = Utc::now();
        assert!(
            store
                .update_status_if("PAY1", AttemptStatus::Pending, AttemptStatus::Success, Some("T1"), now)
                .await
                .unwrap()
        );
        assert!(
            !store
                .update_status_if("PAY1", AttemptStatus::Pending, AttemptStatus::Failed, None, now)
                .await
                .unwrap()
        );

        let stored = store.get("PAY1").await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Success);
        assert_eq!(stored.third_party_no.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let store = InMemoryAttemptStore::new();
        store.insert(&attempt("PAY1")).await.unwrap();
        assert!(matches!(
            store.insert(&attempt("PAY1")).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.list_for_order(9).await.unwrap().len(), 1);
    }
}
