//! Order persistence contract

use async_trait::async_trait;

use super::types::ServiceOrder;
use crate::core_types::{OrderId, Version};
use crate::db::StoreError;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order; the store assigns `id` and returns the stored row.
    async fn insert(&self, order: &ServiceOrder) -> Result<ServiceOrder, StoreError>;

    async fn get(&self, id: OrderId) -> Result<Option<ServiceOrder>, StoreError>;

    async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, StoreError>;

    /// Replace the row with `next` only if its version still equals
    /// `expected_version`. `Ok(false)` means another writer got there first.
    async fn compare_and_swap(
        &self,
        next: &ServiceOrder,
        expected_version: Version,
    ) -> Result<bool, StoreError>;
}
