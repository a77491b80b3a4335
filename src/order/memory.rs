//! In-memory order store

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::OrderStore;
use super::types::ServiceOrder;
use crate::core_types::{OrderId, Version};
use crate::db::StoreError;

pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, ServiceOrder>,
    by_order_no: DashMap<String, OrderId>,
    next_id: AtomicU64,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self {
            orders: DashMap::new(),
            by_order_no: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &ServiceOrder) -> Result<ServiceOrder, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        match self.by_order_no.entry(order.order_no.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "order_no {} already exists",
                    order.order_no
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let mut stored = order.clone();
        stored.id = id;
        self.orders.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: OrderId) -> Result<Option<ServiceOrder>, StoreError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, StoreError> {
        let Some(id) = self.by_order_no.get(order_no).map(|id| *id) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn compare_and_swap(
        &self,
        next: &ServiceOrder,
        expected_version: Version,
    ) -> Result<bool, StoreError> {
        let Some(mut current) = self.orders.get_mut(&next.id) else {
            return Err(StoreError::NotFound(format!("order {}", next.id)));
        };
        if current.version != expected_version {
            return Ok(false);
        }
        *current = next.clone();
        Ok(true)
    }
}
