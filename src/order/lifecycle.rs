//! Order Lifecycle
//!
//! Guarded transitions over `ServiceOrder`. Every write is a version-checked
//! conditional update; the losing writer re-fetches the order and evaluates
//! its guard again on the fresh row, so a guard never passes on stale state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::OrderError;
use super::state::{OrderAction, OrderStatus};
use super::store::OrderStore;
use super::types::{
    Completion, CreateOrder, PaymentMethod, RefundClaim, SellerCredit, ServiceOrder,
};
use crate::config::{LedgerConfig, OrderConfig};
use crate::core_types::{Bps, MinorUnits, OrderId, UserId};
use crate::db::StoreError;
use crate::money::{apply_bps, format_amount};
use crate::retry::{CasOutcome, RetryError, RetryPolicy};
use crate::wallet::{LedgerRef, RefType, WalletLedger};

/// Outcome of a guarded write
struct Transitioned {
    order: ServiceOrder,
    /// Status of the row the guard passed on
    from: OrderStatus,
    /// false when the guard decided nothing needed writing
    applied: bool,
}

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    wallets: Arc<WalletLedger>,
    retry: RetryPolicy,
    default_platform_fee_bps: Bps,
    refund_window: chrono::Duration,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        wallets: Arc<WalletLedger>,
        ledger: &LedgerConfig,
        orders: &OrderConfig,
    ) -> Self {
        Self::with_retry(store, wallets, RetryPolicy::from_config(ledger), orders)
    }

    pub fn with_retry(
        store: Arc<dyn OrderStore>,
        wallets: Arc<WalletLedger>,
        retry: RetryPolicy,
        orders: &OrderConfig,
    ) -> Self {
        Self {
            store,
            wallets,
            retry,
            default_platform_fee_bps: orders.default_platform_fee_bps,
            refund_window: chrono::Duration::from_std(orders.refund_window())
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn wallets(&self) -> &Arc<WalletLedger> {
        &self.wallets
    }

    pub async fn get(&self, order_id: OrderId) -> Result<ServiceOrder, OrderError> {
        self.store
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    pub async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, OrderError> {
        Ok(self.store.get_by_order_no(order_no).await?)
    }

    // ============================================================
    // GUARDS
    // ============================================================

    /// Cancellation is only possible before payment
    pub fn can_cancel(&self, order: &ServiceOrder) -> bool {
        order.status.next(OrderAction::Cancel).is_some()
    }

    /// Paid or completed, and still inside the refund window measured from
    /// the payment time
    pub fn can_refund(&self, order: &ServiceOrder, now: DateTime<Utc>) -> bool {
        order.status.next(OrderAction::Refund).is_some() && self.within_refund_window(order, now)
    }

    fn within_refund_window(&self, order: &ServiceOrder, now: DateTime<Utc>) -> bool {
        match order.payment_time {
            Some(paid_at) => paid_at
                .checked_add_signed(self.refund_window)
                .is_none_or(|deadline| now <= deadline),
            None => false,
        }
    }

    // ============================================================
    // OPERATIONS
    // ============================================================

    /// Create an order in `PENDING_PAYMENT`
    pub async fn create(&self, req: CreateOrder) -> Result<ServiceOrder, OrderError> {
        if req.buyer_id == 0 {
            return Err(OrderError::InvalidUser(req.buyer_id));
        }
        if req.seller_id == 0 {
            return Err(OrderError::InvalidUser(req.seller_id));
        }
        if req.buyer_id == req.seller_id {
            return Err(OrderError::SameParty);
        }

        let gross = req
            .base_fee
            .checked_add(req.person_fee)
            .ok_or(OrderError::Overflow)?;
        if req.discount_amount > gross {
            return Err(OrderError::DiscountExceedsGross {
                discount: req.discount_amount,
                gross,
            });
        }
        let actual_amount = gross - req.discount_amount;
        let platform_fee = req
            .platform_fee
            .unwrap_or_else(|| apply_bps(gross, self.default_platform_fee_bps));

        let now = Utc::now();
        let draft = ServiceOrder {
            id: 0,
            order_no: format!("SO{}", ulid::Ulid::new()),
            buyer_id: req.buyer_id,
            seller_id: req.seller_id,
            content_id: req.content_id,
            base_fee: req.base_fee,
            person_fee: req.person_fee,
            platform_fee,
            discount_amount: req.discount_amount,
            actual_amount,
            status: OrderStatus::PendingPayment,
            payment_method: None,
            payment_time: None,
            completed_at: None,
            cancel_reason: None,
            cancel_time: None,
            refund_amount: None,
            settlement_claimed_at: None,
            seller_settled_at: None,
            extras: req.extras,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let order = self.store.insert(&draft).await?;
        info!(
            order_id = order.id,
            order_no = %order.order_no,
            buyer_id = order.buyer_id,
            seller_id = order.seller_id,
            actual_amount = order.actual_amount,
            platform_fee = order.platform_fee,
            "Order created"
        );
        Ok(order)
    }

    /// `PENDING_PAYMENT → PAID`, buyer only. Stamps method and payment time.
    ///
    /// Moves no money: the payment orchestrator debits before calling this.
    pub async fn pay(
        &self,
        order_id: OrderId,
        buyer_id: UserId,
        method: PaymentMethod,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self
            .apply_transition(order_id, OrderAction::Pay, |o| {
                let status = advance(o, OrderAction::Pay)?;
                if o.buyer_id != buyer_id {
                    return Err(forbidden(buyer_id, OrderAction::Pay));
                }
                let now = Utc::now();
                Ok(ServiceOrder {
                    status,
                    payment_method: Some(method),
                    payment_time: Some(now),
                    ..o.clone()
                })
            })
            .await?;

        info!(order_id, order_no = %order.order_no, method = %method, "Order paid");
        Ok(order)
    }

    /// `PAID → IN_SERVICE`, seller only
    pub async fn start_service(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self
            .apply_transition(order_id, OrderAction::StartService, |o| {
                let status = advance(o, OrderAction::StartService)?;
                if o.seller_id != actor {
                    return Err(forbidden(actor, OrderAction::StartService));
                }
                Ok(ServiceOrder { status, ..o.clone() })
            })
            .await?;

        info!(order_id, order_no = %order.order_no, "Service started");
        Ok(order)
    }

    /// `PAID | IN_SERVICE → COMPLETED`, either party.
    ///
    /// Settles the seller's share if no earlier event did. A settlement
    /// failure is reported in `Completion::seller_credit` and logged; the
    /// completion itself stands.
    pub async fn complete(&self, order_id: OrderId, actor: UserId) -> Result<Completion, OrderError> {
        let completed = self
            .apply_transition(order_id, OrderAction::Complete, |o| {
                let status = advance(o, OrderAction::Complete)?;
                if !o.is_party(actor) {
                    return Err(forbidden(actor, OrderAction::Complete));
                }
                Ok(ServiceOrder {
                    status,
                    completed_at: Some(Utc::now()),
                    ..o.clone()
                })
            })
            .await?;

        info!(order_id, order_no = %completed.order_no, actor, "Order completed");

        let seller_credit = self.settle_seller(order_id).await;
        let order = self.get(order_id).await.unwrap_or(completed);
        Ok(Completion {
            order,
            seller_credit,
        })
    }

    /// `PENDING_PAYMENT → CANCELLED`, either party
    pub async fn cancel(
        &self,
        order_id: OrderId,
        actor: UserId,
        reason: &str,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self
            .apply_transition(order_id, OrderAction::Cancel, |o| {
                if !self.can_cancel(o) {
                    return Err(OrderError::InvalidTransition {
                        from: o.status,
                        action: OrderAction::Cancel,
                    });
                }
                if !o.is_party(actor) {
                    return Err(forbidden(actor, OrderAction::Cancel));
                }
                let now = Utc::now();
                Ok(ServiceOrder {
                    status: OrderStatus::Cancelled,
                    cancel_reason: Some(reason.to_string()),
                    cancel_time: Some(now),
                    ..o.clone()
                })
            })
            .await?;

        info!(order_id, order_no = %order.order_no, actor, reason, "Order cancelled");
        Ok(order)
    }

    /// `PAID | COMPLETED → REFUNDED` within the refund window, either party.
    ///
    /// Only the state transition. Money is moved by the refund coordinator,
    /// which holds the returned claim.
    pub async fn refund(
        &self,
        order_id: OrderId,
        actor: UserId,
        amount: Option<MinorUnits>,
        reason: &str,
    ) -> Result<RefundClaim, OrderError> {
        if amount == Some(0) {
            return Err(OrderError::InvalidRefundAmount);
        }

        let claimed = self
            .transition(order_id, "refund", |o| {
                let status = advance(o, OrderAction::Refund)?;
                if !o.is_party(actor) {
                    return Err(forbidden(actor, OrderAction::Refund));
                }
                let now = Utc::now();
                if !self.within_refund_window(o, now) {
                    return Err(OrderError::RefundWindowExpired);
                }
                let refund_amount = amount.unwrap_or(o.actual_amount);
                if refund_amount > o.actual_amount {
                    return Err(OrderError::RefundExceedsAmount {
                        requested: refund_amount,
                        actual: o.actual_amount,
                    });
                }
                Ok(Some(ServiceOrder {
                    status,
                    cancel_reason: Some(reason.to_string()),
                    cancel_time: Some(now),
                    refund_amount: Some(refund_amount),
                    ..o.clone()
                }))
            })
            .await?;

        let previous_status = claimed.from;
        let order = claimed.order;
        let refund_amount = order.refund_amount.unwrap_or(order.actual_amount);
        info!(
            order_id,
            order_no = %order.order_no,
            actor,
            refund_amount,
            previous = %previous_status,
            "Order refunded"
        );
        Ok(RefundClaim {
            order,
            previous_status,
            refund_amount,
        })
    }

    /// Seller's share: `actual_amount - platform_fee`, credited at most once.
    ///
    /// `settlement_claimed_at` is written before money moves and only marks
    /// the credit as in flight. `seller_settled_at` is written after the
    /// credit commits; refund clawback looks at that marker alone. If the
    /// credit fails, the claim is released so `complete()` can try again.
    pub async fn settle_seller(&self, order_id: OrderId) -> SellerCredit {
        let claimed = match self
            .transition(order_id, "claim_settlement", |o| {
                if o.is_settlement_claimed() {
                    return Ok(None);
                }
                if !o.status.is_paid() {
                    return Err(OrderError::InvalidTransition {
                        from: o.status,
                        action: OrderAction::Complete,
                    });
                }
                Ok(Some(ServiceOrder {
                    settlement_claimed_at: Some(Utc::now()),
                    ..o.clone()
                }))
            })
            .await
        {
            Ok(t) if t.applied => t.order,
            Ok(_) => return SellerCredit::AlreadySettled,
            Err(e) => {
                warn!(order_id, error = %e, "Could not claim seller settlement");
                return SellerCredit::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let net = claimed.seller_net();
        if net > 0 {
            let reference = LedgerRef::new(
                RefType::Settlement,
                &claimed.order_no,
                format!(
                    "Settlement for order {} ({})",
                    claimed.order_no,
                    format_amount(net)
                ),
            );
            match self.wallets.add_income(claimed.seller_id, net, &reference).await {
                Ok(wallet) => {
                    info!(
                        order_id,
                        seller_id = claimed.seller_id,
                        amount = net,
                        version = wallet.version(),
                        "Seller credited"
                    );
                }
                Err(e) => {
                    error!(
                        order_id,
                        order_no = %claimed.order_no,
                        seller_id = claimed.seller_id,
                        amount = net,
                        error = %e,
                        "Seller settlement failed - order progress kept, settlement pending"
                    );
                    if let Err(release_err) = self.release_settlement(order_id).await {
                        error!(
                            order_id,
                            error = %release_err,
                            "Could not release settlement claim - manual reconciliation required"
                        );
                    }
                    return SellerCredit::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        match self.mark_settled(order_id).await {
            Ok(marked) if marked.status == OrderStatus::Refunded => {
                // the refund saw no settled marker and skipped the clawback
                error!(
                    order_id,
                    order_no = %marked.order_no,
                    seller_id = marked.seller_id,
                    amount = net,
                    "Order refunded while seller credit was in flight - seller over-credited, manual reconciliation required"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    order_id,
                    seller_id = claimed.seller_id,
                    amount = net,
                    error = %e,
                    "Seller credited but settled marker not written - manual reconciliation required"
                );
            }
        }
        SellerCredit::Credited { amount: net }
    }

    /// Undo a refund transition whose buyer credit failed. Only succeeds if
    /// nobody touched the order since the claim.
    pub(crate) async fn restore_after_failed_refund(
        &self,
        claim: &RefundClaim,
    ) -> Result<ServiceOrder, OrderError> {
        let claimed_version = claim.order.version;
        let previous = claim.previous_status;
        let restored = self
            .apply_transition(claim.order.id, OrderAction::Refund, |o| {
                if o.status != OrderStatus::Refunded || o.version != claimed_version {
                    return Err(OrderError::InvalidTransition {
                        from: o.status,
                        action: OrderAction::Refund,
                    });
                }
                Ok(ServiceOrder {
                    status: previous,
                    cancel_reason: None,
                    cancel_time: None,
                    refund_amount: None,
                    ..o.clone()
                })
            })
            .await?;

        warn!(
            order_id = restored.id,
            status = %restored.status,
            "Refund transition rolled back"
        );
        Ok(restored)
    }

    /// Record that the seller's credit committed. Applies in any status: a
    /// refund may have landed while the credit was in flight.
    async fn mark_settled(&self, order_id: OrderId) -> Result<ServiceOrder, OrderError> {
        self.transition(order_id, "mark_settled", |o| {
            if o.is_seller_settled() {
                return Ok(None);
            }
            Ok(Some(ServiceOrder {
                settlement_claimed_at: None,
                seller_settled_at: Some(Utc::now()),
                ..o.clone()
            }))
        })
        .await
        .map(|t| t.order)
    }

    async fn release_settlement(&self, order_id: OrderId) -> Result<(), OrderError> {
        self.transition(order_id, "release_settlement", |o| {
            if o.settlement_claimed_at.is_none() || o.is_seller_settled() {
                return Ok(None);
            }
            Ok(Some(ServiceOrder {
                settlement_claimed_at: None,
                ..o.clone()
            }))
        })
        .await
        .map(|_| ())
    }

    // ============================================================
    // GUARDED WRITE
    // ============================================================

    async fn apply_transition<F>(
        &self,
        order_id: OrderId,
        action: OrderAction,
        mutate: F,
    ) -> Result<ServiceOrder, OrderError>
    where
        F: Fn(&ServiceOrder) -> Result<ServiceOrder, OrderError>,
    {
        self.transition(order_id, action.as_str(), |o| mutate(o).map(Some))
            .await
            .map(|t| t.order)
    }

    /// Read → guard → conditional write, retried on lost races.
    ///
    /// `mutate` returns `Ok(None)` when the fresh row needs no write.
    async fn transition<F>(
        &self,
        order_id: OrderId,
        label: &'static str,
        mutate: F,
    ) -> Result<Transitioned, OrderError>
    where
        F: Fn(&ServiceOrder) -> Result<Option<ServiceOrder>, OrderError>,
    {
        let mutate = &mutate;
        self.retry
            .run(label, move |attempt| {
                self.try_transition(order_id, label, mutate, attempt)
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts } => OrderError::ContentionExhausted { attempts },
                RetryError::Aborted(e) => e,
            })
    }

    async fn try_transition<F>(
        &self,
        order_id: OrderId,
        label: &'static str,
        mutate: &F,
        attempt: u32,
    ) -> Result<CasOutcome<Transitioned>, OrderError>
    where
        F: Fn(&ServiceOrder) -> Result<Option<ServiceOrder>, OrderError>,
    {
        let current = match self.store.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return Err(OrderError::OrderNotFound(order_id)),
            Err(StoreError::Timeout) => return Ok(CasOutcome::Conflict),
            Err(e) => return Err(e.into()),
        };

        let Some(mut next) = mutate(&current)? else {
            return Ok(CasOutcome::Applied(Transitioned {
                from: current.status,
                order: current,
                applied: false,
            }));
        };
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        match self.store.compare_and_swap(&next, current.version).await {
            Ok(true) => Ok(CasOutcome::Applied(Transitioned {
                order: next,
                from: current.status,
                applied: true,
            })),
            Ok(false) | Err(StoreError::Timeout) => {
                debug!(
                    order_id,
                    op = label,
                    attempt,
                    read_version = current.version,
                    "Order version moved, re-evaluating guard"
                );
                Ok(CasOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn advance(order: &ServiceOrder, action: OrderAction) -> Result<OrderStatus, OrderError> {
    order
        .status
        .next(action)
        .ok_or(OrderError::InvalidTransition {
            from: order.status,
            action,
        })
}

fn forbidden(user_id: UserId, action: OrderAction) -> OrderError {
    OrderError::Forbidden { user_id, action }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Coins, Version};
    use crate::order::memory::InMemoryOrderStore;
    use crate::wallet::{InMemoryWalletStore, Wallet, WalletEntry, WalletStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const BUYER: UserId = 1;
    const SELLER: UserId = 2;
    const STRANGER: UserId = 3;

    fn lifecycle_with(
        orders: Arc<dyn OrderStore>,
        wallets: Arc<dyn WalletStore>,
    ) -> OrderLifecycle {
        let wallets = Arc::new(WalletLedger::with_retry(wallets, RetryPolicy::immediate(3), 0));
        OrderLifecycle::with_retry(orders, wallets, RetryPolicy::immediate(3), &OrderConfig::default())
    }

    fn lifecycle() -> (OrderLifecycle, Arc<InMemoryOrderStore>) {
        let orders = Arc::new(InMemoryOrderStore::new());
        let lc = lifecycle_with(orders.clone(), Arc::new(InMemoryWalletStore::new()));
        (lc, orders)
    }

    fn request(base_fee: MinorUnits) -> CreateOrder {
        CreateOrder {
            buyer_id: BUYER,
            seller_id: SELLER,
            content_id: 7,
            base_fee,
            ..Default::default()
        }
    }

    /// Order store whose conditional writes always lose
    struct AlwaysConflicting(InMemoryOrderStore);

    #[async_trait]
    impl OrderStore for AlwaysConflicting {
        async fn insert(&self, order: &ServiceOrder) -> Result<ServiceOrder, StoreError> {
            self.0.insert(order).await
        }
        async fn get(&self, id: OrderId) -> Result<Option<ServiceOrder>, StoreError> {
            self.0.get(id).await
        }
        async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, StoreError> {
            self.0.get_by_order_no(order_no).await
        }
        async fn compare_and_swap(&self, _: &ServiceOrder, _: Version) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Order store where the buyer's first write loses to a cancel that
    /// commits just before it
    struct CancelledUnderfoot {
        inner: InMemoryOrderStore,
        writes: AtomicU32,
    }

    #[async_trait]
    impl OrderStore for CancelledUnderfoot {
        async fn insert(&self, order: &ServiceOrder) -> Result<ServiceOrder, StoreError> {
            self.inner.insert(order).await
        }
        async fn get(&self, id: OrderId) -> Result<Option<ServiceOrder>, StoreError> {
            self.inner.get(id).await
        }
        async fn get_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, StoreError> {
            self.inner.get_by_order_no(order_no).await
        }
        async fn compare_and_swap(
            &self,
            next: &ServiceOrder,
            expected_version: Version,
        ) -> Result<bool, StoreError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(current) = self.inner.get(next.id).await? {
                    let read_version = current.version;
                    let cancelled = ServiceOrder {
                        status: OrderStatus::Cancelled,
                        cancel_reason: Some("seller unavailable".into()),
                        cancel_time: Some(Utc::now()),
                        version: read_version + 1,
                        ..current
                    };
                    assert!(self.inner.compare_and_swap(&cancelled, read_version).await?);
                }
            }
            self.inner.compare_and_swap(next, expected_version).await
        }
    }

    /// Wallet store that cannot reach one user's wallet
    struct UnreachableWallet {
        inner: InMemoryWalletStore,
        user_id: UserId,
    }

    #[async_trait]
    impl WalletStore for UnreachableWallet {
        async fn load_or_create(&self, user_id: UserId, bonus: Coins) -> Result<Wallet, StoreError> {
            if user_id == self.user_id {
                return Err(StoreError::Database("connection refused".into()));
            }
            self.inner.load_or_create(user_id, bonus).await
        }
        async fn compare_and_swap(
            &self,
            next: &Wallet,
            expected_version: Version,
            entry: &WalletEntry,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_swap(next, expected_version, entry).await
        }
        async fn entries(&self, user_id: UserId, limit: usize) -> Result<Vec<WalletEntry>, StoreError> {
            self.inner.entries(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_create_computes_amounts() {
        let (lc, _) = lifecycle();
        let order = lc
            .create(CreateOrder {
                person_fee: 2_000,
                discount_amount: 1_000,
                ..request(10_000)
            })
            .await
            .unwrap();

        assert!(order.order_no.starts_with("SO"));
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.actual_amount, 11_000);
        // 5% of gross
        assert_eq!(order.platform_fee, 600);
        assert_eq!(order.version, 0);
        assert_eq!(lc.get_by_order_no(&order.order_no).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (lc, _) = lifecycle();
        let same = lc
            .create(CreateOrder {
                seller_id: BUYER,
                ..request(100)
            })
            .await;
        assert_eq!(same.unwrap_err(), OrderError::SameParty);

        let discount = lc
            .create(CreateOrder {
                discount_amount: 101,
                ..request(100)
            })
            .await;
        assert_eq!(
            discount.unwrap_err(),
            OrderError::DiscountExceedsGross {
                discount: 101,
                gross: 100
            }
        );

        let free = lc
            .create(CreateOrder {
                discount_amount: 100,
                ..request(100)
            })
            .await
            .unwrap();
        assert_eq!(free.actual_amount, 0);
    }

    #[tokio::test]
    async fn test_happy_path_settles_seller_on_complete() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(10_000)).await.unwrap();

        let paid = lc.pay(order.id, BUYER, PaymentMethod::Alipay).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_method, Some(PaymentMethod::Alipay));
        assert!(paid.payment_time.is_some());

        let started = lc.start_service(order.id, SELLER).await.unwrap();
        assert_eq!(started.status, OrderStatus::InService);

        let done = lc.complete(order.id, BUYER).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert!(done.order.completed_at.is_some());
        assert!(done.order.is_seller_settled());
        assert!(done.order.settlement_claimed_at.is_none());
        assert_eq!(done.seller_credit, SellerCredit::Credited { amount: 9_500 });

        let seller = lc.wallets().wallet(SELLER).await.unwrap();
        assert_eq!(seller.balance(), 9_500);
        assert_eq!(seller.total_income(), 9_500);
    }

    #[tokio::test]
    async fn test_settlement_happens_once() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(10_000)).await.unwrap();
        lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap();

        assert_eq!(
            lc.settle_seller(order.id).await,
            SellerCredit::Credited { amount: 9_500 }
        );
        let done = lc.complete(order.id, SELLER).await.unwrap();
        assert_eq!(done.seller_credit, SellerCredit::AlreadySettled);
        assert_eq!(lc.wallets().wallet(SELLER).await.unwrap().balance(), 9_500);
    }

    #[tokio::test]
    async fn test_failed_settlement_releases_claim() {
        let orders = Arc::new(InMemoryOrderStore::new());
        let lc = lifecycle_with(
            orders,
            Arc::new(UnreachableWallet {
                inner: InMemoryWalletStore::new(),
                user_id: SELLER,
            }),
        );
        let order = lc.create(request(10_000)).await.unwrap();
        lc.pay(order.id, BUYER, PaymentMethod::Card).await.unwrap();

        let done = lc.complete(order.id, BUYER).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert!(done.seller_credit.is_failed());
        assert!(!done.order.is_settlement_claimed());
    }

    #[tokio::test]
    async fn test_permissions() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(500)).await.unwrap();

        assert_eq!(
            lc.pay(order.id, SELLER, PaymentMethod::Wallet).await.unwrap_err(),
            OrderError::Forbidden {
                user_id: SELLER,
                action: OrderAction::Pay
            }
        );
        assert_eq!(
            lc.cancel(order.id, STRANGER, "no").await.unwrap_err().kind(),
            crate::error::ErrorKind::Forbidden
        );

        lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap();
        assert_eq!(
            lc.start_service(order.id, BUYER).await.unwrap_err(),
            OrderError::Forbidden {
                user_id: BUYER,
                action: OrderAction::StartService
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_order_unchanged() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(500)).await.unwrap();
        lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap();
        let paid = lc.get(order.id).await.unwrap();

        assert!(!lc.can_cancel(&paid));
        assert_eq!(
            lc.cancel(order.id, BUYER, "changed my mind").await.unwrap_err(),
            OrderError::InvalidTransition {
                from: OrderStatus::Paid,
                action: OrderAction::Cancel
            }
        );
        assert_eq!(
            lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap_err(),
            OrderError::InvalidTransition {
                from: OrderStatus::Paid,
                action: OrderAction::Pay
            }
        );
        assert_eq!(lc.get(order.id).await.unwrap(), paid);
    }

    #[tokio::test]
    async fn test_cancel_records_reason() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(500)).await.unwrap();
        let cancelled = lc.cancel(order.id, SELLER, "fully booked").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("fully booked"));
        assert!(cancelled.cancel_time.is_some());
        assert_eq!(cancelled.version, 1);
    }

    #[tokio::test]
    async fn test_refund_claim() {
        let (lc, _) = lifecycle();
        let order = lc.create(request(10_000)).await.unwrap();
        lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap();

        assert_eq!(
            lc.refund(order.id, BUYER, Some(10_001), "too much").await.unwrap_err(),
            OrderError::RefundExceedsAmount {
                requested: 10_001,
                actual: 10_000
            }
        );
        assert_eq!(
            lc.refund(order.id, BUYER, Some(0), "nothing").await.unwrap_err(),
            OrderError::InvalidRefundAmount
        );

        let claim = lc.refund(order.id, BUYER, None, "not needed").await.unwrap();
        assert_eq!(claim.previous_status, OrderStatus::Paid);
        assert_eq!(claim.refund_amount, 10_000);
        assert_eq!(claim.order.status, OrderStatus::Refunded);
        assert_eq!(claim.order.refund_amount, Some(10_000));

        let again = lc.refund(order.id, BUYER, None, "twice").await;
        assert!(matches!(again, Err(OrderError::InvalidTransition { .. })));

        let restored = lc.restore_after_failed_refund(&claim).await.unwrap();
        assert_eq!(restored.status, OrderStatus::Paid);
        assert!(restored.refund_amount.is_none());
    }

    #[tokio::test]
    async fn test_refund_window_expired() {
        let (lc, orders) = lifecycle();
        let order = lc.create(request(10_000)).await.unwrap();
        let paid = lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap();

        let mut stale = paid.clone();
        stale.payment_time = Some(Utc::now() - chrono::Duration::hours(169));
        stale.version = paid.version + 1;
        assert!(orders.compare_and_swap(&stale, paid.version).await.unwrap());

        assert!(!lc.can_refund(&stale, Utc::now()));
        assert_eq!(
            lc.refund(order.id, SELLER, None, "late").await.unwrap_err(),
            OrderError::RefundWindowExpired
        );
        assert_eq!(lc.get(order.id).await.unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_contention_exhausted() {
        let lc = lifecycle_with(
            Arc::new(AlwaysConflicting(InMemoryOrderStore::new())),
            Arc::new(InMemoryWalletStore::new()),
        );
        let order = lc.create(request(100)).await.unwrap();
        let err = lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap_err();
        assert_eq!(err, OrderError::ContentionExhausted { attempts: 3 });
        assert_eq!(
            lc.get(order.id).await.unwrap().status,
            OrderStatus::PendingPayment
        );
    }

    #[tokio::test]
    async fn test_lost_race_reevaluates_guard() {
        let store = Arc::new(CancelledUnderfoot {
            inner: InMemoryOrderStore::new(),
            writes: AtomicU32::new(0),
        });
        let lc = lifecycle_with(store.clone(), Arc::new(InMemoryWalletStore::new()));
        let order = lc.create(request(100)).await.unwrap();

        let err = lc.pay(order.id, BUYER, PaymentMethod::Wallet).await.unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                action: OrderAction::Pay
            }
        );
        // the retry read the cancelled row and stopped before writing
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let after = lc.get(order.id).await.unwrap();
        assert_eq!(after.status, OrderStatus::Cancelled);
        assert_eq!(after.payment_time, None);
        assert_eq!(after.version, 1);
    }

    #[tokio::test]
    async fn test_missing_order() {
        let (lc, _) = lifecycle();
        assert_eq!(
            lc.complete(99, BUYER).await.unwrap_err(),
            OrderError::OrderNotFound(99)
        );
    }
}
