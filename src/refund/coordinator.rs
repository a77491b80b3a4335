//! Refund Coordinator
//!
//! ```text
//! order → REFUNDED ─→ credit buyer ─→ settled? ─→ claw back seller net
//!                          │                            │
//!                   restore previous              log, report
//!                   status, fail                  (manual reconciliation)
//! ```
//!
//! Writing the transition first makes the order row the single gate: a
//! second refund of the same order fails its guard before any money moves.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::RefundError;
use crate::core_types::{MinorUnits, OrderId, UserId};
use crate::money::format_amount;
use crate::order::{OrderLifecycle, ServiceOrder};
use crate::wallet::{LedgerRef, RefType, WalletLedger};

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub order_id: OrderId,
    /// Buyer or seller of the order
    pub requester: UserId,
    /// Defaults to the full `actual_amount`
    pub amount: Option<MinorUnits>,
    pub reason: String,
}

/// What happened to the seller's share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClawbackOutcome {
    /// The seller was never credited for this order
    NotSettled,
    Recovered { amount: MinorUnits },
    /// The buyer was refunded but the seller still holds the share
    Failed { amount: MinorUnits, reason: String },
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub order: ServiceOrder,
    pub refunded: MinorUnits,
    pub clawback: ClawbackOutcome,
}

pub struct RefundCoordinator {
    orders: Arc<OrderLifecycle>,
    wallets: Arc<WalletLedger>,
}

impl RefundCoordinator {
    pub fn new(orders: Arc<OrderLifecycle>) -> Self {
        Self {
            wallets: orders.wallets().clone(),
            orders,
        }
    }

    pub async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, RefundError> {
        let claim = self
            .orders
            .refund(
                request.order_id,
                request.requester,
                request.amount,
                &request.reason,
            )
            .await?;
        let order = &claim.order;

        if claim.refund_amount > 0 {
            let reference = LedgerRef::new(
                RefType::Refund,
                &order.order_no,
                format!(
                    "Refund for order {} ({})",
                    order.order_no,
                    format_amount(claim.refund_amount)
                ),
            );
            if let Err(e) = self
                .wallets
                .recharge_balance(order.buyer_id, claim.refund_amount, &reference)
                .await
            {
                warn!(
                    order_id = order.id,
                    buyer_id = order.buyer_id,
                    amount = claim.refund_amount,
                    error = %e,
                    "Buyer refund credit failed, restoring order"
                );
                return match self.orders.restore_after_failed_refund(&claim).await {
                    Ok(_) => Err(e.into()),
                    Err(restore_err) => {
                        error!(
                            order_id = order.id,
                            order_no = %order.order_no,
                            error = %restore_err,
                            "Order left REFUNDED without buyer credit - manual reconciliation required"
                        );
                        Err(RefundError::RefundStuck {
                            order_id: order.id,
                            reason: e.to_string(),
                        })
                    }
                };
            }
        }

        // an in-flight settlement claim is not a credit
        let clawback = if order.is_seller_settled() {
            self.claw_back(order).await
        } else {
            ClawbackOutcome::NotSettled
        };

        info!(
            order_id = order.id,
            order_no = %order.order_no,
            requester = request.requester,
            refunded = claim.refund_amount,
            clawback = ?clawback,
            "Refund complete"
        );
        Ok(RefundReceipt {
            refunded: claim.refund_amount,
            order: claim.order,
            clawback,
        })
    }

    async fn claw_back(&self, order: &ServiceOrder) -> ClawbackOutcome {
        let amount = order.seller_net();
        if amount == 0 {
            return ClawbackOutcome::Recovered { amount: 0 };
        }

        let reference = LedgerRef::new(
            RefType::Clawback,
            &order.order_no,
            format!(
                "Clawback for refunded order {} ({})",
                order.order_no,
                format_amount(amount)
            ),
        );
        match self
            .wallets
            .deduct_balance(order.seller_id, amount, &reference)
            .await
        {
            Ok(_) => ClawbackOutcome::Recovered { amount },
            Err(e) => {
                error!(
                    order_id = order.id,
                    order_no = %order.order_no,
                    seller_id = order.seller_id,
                    amount,
                    error = %e,
                    "Seller clawback failed - ledger over-credited, manual reconciliation required"
                );
                ClawbackOutcome::Failed {
                    amount,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderConfig;
    use crate::core_types::{Coins, Version};
    use crate::db::StoreError;
    use crate::order::{
        CreateOrder, InMemoryOrderStore, OrderError, OrderStatus, PaymentMethod,
    };
    use crate::retry::RetryPolicy;
    use crate::wallet::{
        InMemoryWalletStore, Wallet, WalletEntry, WalletError, WalletOp, WalletStore,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const BUYER: UserId = 1;
    const SELLER: UserId = 2;

    /// Wallet store that can refuse every refund credit
    struct RefundBlocking {
        inner: InMemoryWalletStore,
        block_refunds: AtomicBool,
    }

    #[async_trait]
    impl WalletStore for RefundBlocking {
        async fn load_or_create(&self, user_id: UserId, bonus: Coins) -> Result<Wallet, StoreError> {
            self.inner.load_or_create(user_id, bonus).await
        }
        async fn compare_and_swap(
            &self,
            next: &Wallet,
            expected_version: Version,
            entry: &WalletEntry,
        ) -> Result<bool, StoreError> {
            if self.block_refunds.load(Ordering::SeqCst) && entry.ref_type == RefType::Refund {
                return Err(StoreError::Database("wallet shard offline".into()));
            }
            self.inner.compare_and_swap(next, expected_version, entry).await
        }
        async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError> {
            self.inner.entries(user_id, limit).await
        }
    }

    /// Wallet store that parks the first settlement credit until released,
    /// then lets it commit or fail
    struct SettlementGate {
        inner: InMemoryWalletStore,
        armed: AtomicBool,
        fail: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl SettlementGate {
        fn new(fail: bool) -> Self {
            Self {
                inner: InMemoryWalletStore::new(),
                armed: AtomicBool::new(true),
                fail: AtomicBool::new(fail),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl WalletStore for SettlementGate {
        async fn load_or_create(&self, user_id: UserId, bonus: Coins) -> Result<Wallet, StoreError> {
            self.inner.load_or_create(user_id, bonus).await
        }
        async fn compare_and_swap(
            &self,
            next: &Wallet,
            expected_version: Version,
            entry: &WalletEntry,
        ) -> Result<bool, StoreError> {
            if entry.ref_type == RefType::Settlement && self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
                if self.fail.load(Ordering::SeqCst) {
                    return Err(StoreError::Database("ledger node down".into()));
                }
            }
            self.inner.compare_and_swap(next, expected_version, entry).await
        }
        async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError> {
            self.inner.entries(user_id, limit).await
        }
    }

    struct Fixture {
        orders: Arc<OrderLifecycle>,
        wallets: Arc<WalletLedger>,
        refunds: RefundCoordinator,
    }

    fn fixture_with(store: Arc<dyn WalletStore>) -> Fixture {
        let wallets = Arc::new(WalletLedger::with_retry(store, RetryPolicy::immediate(3), 0));
        let orders = Arc::new(OrderLifecycle::with_retry(
            Arc::new(InMemoryOrderStore::new()),
            wallets.clone(),
            RetryPolicy::immediate(3),
            &OrderConfig::default(),
        ));
        Fixture {
            refunds: RefundCoordinator::new(orders.clone()),
            orders,
            wallets,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryWalletStore::new()))
    }

    impl Fixture {
        async fn paid_order(&self) -> ServiceOrder {
            let order = self
                .orders
                .create(CreateOrder {
                    buyer_id: BUYER,
                    seller_id: SELLER,
                    base_fee: 10_000,
                    platform_fee: Some(500),
                    ..Default::default()
                })
                .await
                .unwrap();
            self.orders
                .pay(order.id, BUYER, PaymentMethod::Card)
                .await
                .unwrap()
        }

        async fn balance(&self, user_id: UserId) -> MinorUnits {
            self.wallets.wallet(user_id).await.unwrap().balance()
        }
    }

    fn full_refund(order_id: OrderId, requester: UserId) -> RefundRequest {
        RefundRequest {
            order_id,
            requester,
            amount: None,
            reason: "service not delivered".into(),
        }
    }

    #[tokio::test]
    async fn test_refund_unsettled_order() {
        let f = fixture();
        let order = f.paid_order().await;

        let receipt = f.refunds.refund(full_refund(order.id, BUYER)).await.unwrap();
        assert_eq!(receipt.refunded, 10_000);
        assert_eq!(receipt.clawback, ClawbackOutcome::NotSettled);
        assert_eq!(receipt.order.status, OrderStatus::Refunded);
        assert!(receipt.order.cancel_time.is_some());
        assert_eq!(f.balance(BUYER).await, 10_000);
    }

    #[tokio::test]
    async fn test_refund_claws_back_settled_seller() {
        let f = fixture();
        let order = f.paid_order().await;
        f.orders.complete(order.id, BUYER).await.unwrap();
        assert_eq!(f.balance(SELLER).await, 9_500);

        let receipt = f
            .refunds
            .refund(RefundRequest {
                amount: Some(4_000),
                ..full_refund(order.id, SELLER)
            })
            .await
            .unwrap();
        assert_eq!(receipt.refunded, 4_000);
        assert_eq!(receipt.clawback, ClawbackOutcome::Recovered { amount: 9_500 });
        assert_eq!(f.balance(BUYER).await, 4_000);
        assert_eq!(f.balance(SELLER).await, 0);

        let seller_journal = f.wallets.entries(SELLER, 1).await.unwrap();
        assert_eq!(seller_journal[0].kind, WalletOp::DeductBalance);
        assert_eq!(seller_journal[0].ref_type, RefType::Clawback);
    }

    #[tokio::test]
    async fn test_failed_clawback_is_reported() {
        let f = fixture();
        let order = f.paid_order().await;
        f.orders.complete(order.id, BUYER).await.unwrap();

        // seller already spent the income
        let spend = LedgerRef::new(RefType::Transfer, "spend", "Spent");
        f.wallets.deduct_balance(SELLER, 9_000, &spend).await.unwrap();

        let receipt = f.refunds.refund(full_refund(order.id, BUYER)).await.unwrap();
        assert!(matches!(
            receipt.clawback,
            ClawbackOutcome::Failed { amount: 9_500, .. }
        ));
        assert_eq!(f.balance(BUYER).await, 10_000);
        assert_eq!(f.balance(SELLER).await, 500);
    }

    #[tokio::test]
    async fn test_second_refund_moves_no_money() {
        let f = fixture();
        let order = f.paid_order().await;
        f.refunds.refund(full_refund(order.id, BUYER)).await.unwrap();

        let err = f
            .refunds
            .refund(full_refund(order.id, BUYER))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RefundError::Order(OrderError::InvalidTransition { .. })
        ));
        assert_eq!(f.balance(BUYER).await, 10_000);
    }

    #[tokio::test]
    async fn test_failed_buyer_credit_restores_order() {
        let store = Arc::new(RefundBlocking {
            inner: InMemoryWalletStore::new(),
            block_refunds: AtomicBool::new(true),
        });
        let f = fixture_with(store.clone());
        let order = f.paid_order().await;

        let err = f
            .refunds
            .refund(full_refund(order.id, BUYER))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RefundError::Wallet(WalletError::Storage(StoreError::Database(
                "wallet shard offline".into()
            )))
        );

        let restored = f.orders.get(order.id).await.unwrap();
        assert_eq!(restored.status, OrderStatus::Paid);
        assert!(restored.refund_amount.is_none());

        store.block_refunds.store(false, Ordering::SeqCst);
        let receipt = f.refunds.refund(full_refund(order.id, BUYER)).await.unwrap();
        assert_eq!(receipt.refunded, 10_000);
    }

    #[tokio::test]
    async fn test_stranger_cannot_refund() {
        let f = fixture();
        let order = f.paid_order().await;
        let err = f.refunds.refund(full_refund(order.id, 99)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Forbidden);
        assert_eq!(f.balance(BUYER).await, 0);
    }

    /// Complete the order with its settlement credit parked, refund it in
    /// that window, then let the credit finish
    async fn refund_during_settlement(
        store: Arc<SettlementGate>,
        seller_opening: MinorUnits,
    ) -> (Fixture, ServiceOrder, RefundReceipt, crate::order::SellerCredit) {
        let f = fixture_with(store.clone());
        if seller_opening > 0 {
            let opening = LedgerRef::new(RefType::Recharge, "opening", "Opening balance");
            f.wallets
                .recharge_balance(SELLER, seller_opening, &opening)
                .await
                .unwrap();
        }
        let order = f.paid_order().await;

        let orders = f.orders.clone();
        let order_id = order.id;
        let completing = tokio::spawn(async move { orders.complete(order_id, BUYER).await });
        store.parked.notified().await;

        let receipt = f.refunds.refund(full_refund(order.id, BUYER)).await.unwrap();
        store.release.notify_one();
        let completion = completing.await.unwrap().unwrap();
        (f, order, receipt, completion.seller_credit)
    }

    #[tokio::test]
    async fn test_refund_during_failed_settlement_leaves_seller_whole() {
        let store = Arc::new(SettlementGate::new(true));
        let (f, order, receipt, seller_credit) = refund_during_settlement(store, 9_500).await;

        // the credit was only in flight, so nothing is clawed back
        assert_eq!(receipt.clawback, ClawbackOutcome::NotSettled);
        assert!(seller_credit.is_failed());
        assert_eq!(f.balance(BUYER).await, 10_000);
        assert_eq!(f.balance(SELLER).await, 9_500);

        let after = f.orders.get(order.id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Refunded);
        assert!(!after.is_settlement_claimed());
    }

    #[tokio::test]
    async fn test_refund_during_committed_settlement_marks_over_credit() {
        let store = Arc::new(SettlementGate::new(false));
        let (f, order, receipt, seller_credit) = refund_during_settlement(store, 0).await;

        assert_eq!(receipt.clawback, ClawbackOutcome::NotSettled);
        assert_eq!(
            seller_credit,
            crate::order::SellerCredit::Credited { amount: 9_500 }
        );
        assert_eq!(f.balance(BUYER).await, 10_000);
        assert_eq!(f.balance(SELLER).await, 9_500);

        let after = f.orders.get(order.id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Refunded);
        assert!(after.is_seller_settled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refunds_credit_buyer_once() {
        let f = Arc::new(fixture());
        let order_id = f.paid_order().await.id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let f = f.clone();
                let requester = if i % 2 == 0 { BUYER } else { SELLER };
                tokio::spawn(async move { f.refunds.refund(full_refund(order_id, requester)).await })
            })
            .collect();
        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(
                    err,
                    RefundError::Order(OrderError::InvalidTransition {
                        from: OrderStatus::Refunded,
                        ..
                    }) | RefundError::Order(OrderError::ContentionExhausted { .. })
                ),
                "{err:?}"
            );
        }
        assert_eq!(f.balance(BUYER).await, 10_000);
        let refunds = f.wallets.entries(BUYER, 20).await.unwrap();
        assert_eq!(
            refunds.iter().filter(|e| e.ref_type == RefType::Refund).count(),
            1
        );
    }
}
