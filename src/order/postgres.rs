//! PostgreSQL order store

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use super::state::OrderStatus;
use super::store::OrderStore;
use super::types::{OrderExtras, PaymentMethod, ServiceOrder};
use crate::core_types::{OrderId, Version};
use crate::db::{SafeRow, StoreError, from_db_amount, to_db_amount};

const ORDER_COLUMNS: &str = r#"
    id, order_no, buyer_id, seller_id, content_id, base_fee, person_fee, platform_fee,
    discount_amount, actual_amount, status, payment_method, payment_time, completed_at,
    cancel_reason, cancel_time, refund_amount, settlement_claimed_at, seller_settled_at,
    extras, version, created_at, updated_at
"#;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<ServiceOrder, StoreError> {
        let status_id: i16 = row.get_checked("status")?;
        let status = OrderStatus::from_id(status_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid order status: {}", status_id)))?;

        let payment_method = match row.get_checked::<Option<i16>>("payment_method")? {
            Some(id) => Some(PaymentMethod::from_id(id).ok_or_else(|| {
                StoreError::Corrupt(format!("Invalid payment_method: {}", id))
            })?),
            None => None,
        };

        let extras_json: String = row.get_checked("extras")?;
        let extras: OrderExtras = serde_json::from_str(&extras_json)
            .map_err(|e| StoreError::Corrupt(format!("extras: {}", e)))?;

        let refund_amount = row
            .get_checked::<Option<i64>>("refund_amount")?
            .map(|v| from_db_amount(v, "refund_amount"))
            .transpose()?;

        Ok(ServiceOrder {
            id: from_db_amount(row.get_checked("id")?, "id")?,
            order_no: row.get_checked("order_no")?,
            buyer_id: from_db_amount(row.get_checked("buyer_id")?, "buyer_id")?,
            seller_id: from_db_amount(row.get_checked("seller_id")?, "seller_id")?,
            content_id: from_db_amount(row.get_checked("content_id")?, "content_id")?,
            base_fee: from_db_amount(row.get_checked("base_fee")?, "base_fee")?,
            person_fee: from_db_amount(row.get_checked("person_fee")?, "person_fee")?,
            platform_fee: from_db_amount(row.get_checked("platform_fee")?, "platform_fee")?,
            discount_amount: from_db_amount(row.get_checked("discount_amount")?, "discount_amount")?,
            actual_amount: from_db_amount(row.get_checked("actual_amount")?, "actual_amount")?,
            status,
            payment_method,
            payment_time: row.get_checked("payment_time")?,
            completed_at: row.get_checked("completed_at")?,
            cancel_reason: row.get_checked("cancel_reason")?,
            cancel_time: row.get_checked("cancel_time")?,
            refund_amount,
            settlement_claimed_at: row.get_checked("settlement_claimed_at")?,
            seller_settled_at: row.get_checked("seller_settled_at")?,
            extras,
            version: from_db_amount(row.get_checked("version")?, "version")?,
            created_at: row.get_checked("created_at")?,
            updated_at: row.get_checked("updated_at")?,
        })
    }
}

fn extras_to_json(extras: &OrderExtras) -> Result<String, StoreError> {
    serde_json::to_string(extras).map_err(|e| StoreError::Corrupt(format!("extras: {}", e)))
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &ServiceOrder) -> Result<ServiceOrder, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO service_orders
                (order_no, buyer_id, seller_id, content_id, base_fee, person_fee, platform_fee,
                 discount_amount, actual_amount, status, extras, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&order.order_no)
            .bind(to_db_amount(order.buyer_id, "buyer_id")?)
            .bind(to_db_amount(order.seller_id, "seller_id")?)
            .bind(to_db_amount(order.content_id, "content_id")?)
            .bind(to_db_amount(order.base_fee, "base_fee")?)
            .bind(to_db_amount(order.person_fee, "person_fee")?)
            .bind(to_db_amount(order.platform_fee, "platform_fee")?)
            .bind(to_db_amount(order.discount_amount, "discount_amount")?)
            .bind(to_db_amount(order.actual_amount, "actual_amount")?)
            .bind(order.status.id())
            .bind(extras_to_json(&order.extras)?)
            .bind(to_db_amount(order.version, "version")?)
            .bind(order.created_at)
            .bind(order.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_order(&row)
    }

    async fn get(&self, id: OrderId) -> Result<Option<ServiceOrder>, StoreError> {
        let sql = format!("SELECT {} FROM service_orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(to_db_amount(id, "id")?)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, StoreError> {
        let sql = format!(
            "SELECT {} FROM service_orders WHERE order_no = $1",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(order_no)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn compare_and_swap(
        &self,
        next: &ServiceOrder,
        expected_version: Version,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE service_orders
            SET status = $1, payment_method = $2, payment_time = $3, completed_at = $4,
                cancel_reason = $5, cancel_time = $6, refund_amount = $7,
                settlement_claimed_at = $8, seller_settled_at = $9, extras = $10,
                version = version + 1, updated_at = $11
            WHERE id = $12 AND version = $13
            "#,
        )
        .bind(next.status.id())
        .bind(next.payment_method.map(|m| m.id()))
        .bind(next.payment_time)
        .bind(next.completed_at)
        .bind(next.cancel_reason.as_deref())
        .bind(next.cancel_time)
        .bind(
            next.refund_amount
                .map(|v| to_db_amount(v, "refund_amount"))
                .transpose()?,
        )
        .bind(next.settlement_claimed_at)
        .bind(next.seller_settled_at)
        .bind(extras_to_json(&next.extras)?)
        .bind(next.updated_at)
        .bind(to_db_amount(next.id, "id")?)
        .bind(to_db_amount(expected_version, "version")?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
