//! Payment Orchestrator
//!
//! Drives an order from `PENDING_PAYMENT` to `PAID`.
//!
//! # Wallet path
//!
//! ```text
//! check order ─→ verify pin ─→ debit buyer ─→ order PAID ─→ credit seller
//!                                   │              │              │
//!                              abort, no     recharge buyer   log, keep
//!                              state change  (compensation)   PAID
//! ```
//!
//! # Gateway path
//!
//! `start_gateway_payment` records a pending attempt and returns the
//! gateway's checkout payload. The gateway has already moved the money by
//! the time `handle_callback` runs, so the callback skips the debit and only
//! performs the order transition and the seller credit.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::PaymentError;
use super::gateway::{CredentialVerifier, PaymentGateway};
use super::store::PaymentAttemptStore;
use super::types::{
    AttemptStatus, CallbackAck, CallbackOutcome, GatewayCallback, GatewayCheckout,
    GatewayRequest, PaymentAttempt, PaymentReceipt,
};
use crate::config::PaymentConfig;
use crate::core_types::{MinorUnits, OrderId, UserId};
use crate::money::format_amount;
use crate::order::{
    OrderAction, OrderError, OrderLifecycle, OrderStatus, PaymentMethod, ServiceOrder,
};
use crate::wallet::{LedgerRef, RefType, WalletLedger};

pub struct PaymentOrchestrator {
    orders: Arc<OrderLifecycle>,
    wallets: Arc<WalletLedger>,
    attempts: Arc<dyn PaymentAttemptStore>,
    gateway: Arc<dyn PaymentGateway>,
    credentials: Arc<dyn CredentialVerifier>,
    urls: PaymentConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        orders: Arc<OrderLifecycle>,
        attempts: Arc<dyn PaymentAttemptStore>,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialVerifier>,
        urls: PaymentConfig,
    ) -> Self {
        Self {
            wallets: orders.wallets().clone(),
            orders,
            attempts,
            gateway,
            credentials,
            urls,
        }
    }

    /// Pay from the buyer's wallet
    pub async fn pay_with_wallet(
        &self,
        order_id: OrderId,
        buyer_id: UserId,
        pin: Option<&str>,
    ) -> Result<PaymentReceipt, PaymentError> {
        let order = self.payable_order(order_id, buyer_id).await?;

        let pin = pin.ok_or(PaymentError::MissingCredential)?;
        if !self.credentials.verify(buyer_id, pin).await {
            warn!(order_id, buyer_id, "Payment credential rejected");
            return Err(PaymentError::InvalidCredential);
        }

        let settlement = order.actual_amount;
        if settlement > 0 {
            let reference = LedgerRef::new(
                RefType::Order,
                &order.order_no,
                format!(
                    "Payment for order {} ({})",
                    order.order_no,
                    format_amount(settlement)
                ),
            );
            self.wallets
                .deduct_balance(buyer_id, settlement, &reference)
                .await?;
        }

        let paid = match self
            .orders
            .pay(order_id, buyer_id, PaymentMethod::Wallet)
            .await
        {
            Ok(paid) => paid,
            Err(e) => {
                return Err(self
                    .compensate_buyer(&order, buyer_id, settlement, e)
                    .await);
            }
        };

        let seller_credit = self.orders.settle_seller(order_id).await;
        let order = self.orders.get(order_id).await.unwrap_or(paid);

        info!(
            order_id,
            order_no = %order.order_no,
            buyer_id,
            charged = settlement,
            "Wallet payment complete"
        );
        Ok(PaymentReceipt {
            order,
            charged: settlement,
            seller_credit,
        })
    }

    /// Open a third-party checkout for the order
    pub async fn start_gateway_payment(
        &self,
        order_id: OrderId,
        buyer_id: UserId,
        method: PaymentMethod,
    ) -> Result<GatewayCheckout, PaymentError> {
        if !method.is_gateway() {
            return Err(PaymentError::UnsupportedMethod(method));
        }
        let order = self.payable_order(order_id, buyer_id).await?;

        let attempt = PaymentAttempt::pending(&order, method);
        self.attempts.insert(&attempt).await?;

        let request = GatewayRequest {
            order_id,
            order_no: order.order_no.clone(),
            payment_no: attempt.payment_no.clone(),
            method,
            amount: attempt.amount,
            return_url: self.urls.return_url.clone(),
            notify_url: self.urls.notify_url.clone(),
        };

        match self.gateway.create_checkout(&request).await {
            Ok(payload) => {
                info!(
                    order_id,
                    payment_no = %attempt.payment_no,
                    method = %method,
                    gateway = self.gateway.name(),
                    amount = attempt.amount,
                    "Gateway checkout started"
                );
                Ok(GatewayCheckout { attempt, payload })
            }
            Err(reason) => {
                warn!(
                    order_id,
                    payment_no = %attempt.payment_no,
                    gateway = self.gateway.name(),
                    reason = %reason,
                    "Gateway rejected checkout"
                );
                self.attempts
                    .update_status_if(
                        &attempt.payment_no,
                        AttemptStatus::Pending,
                        AttemptStatus::Failed,
                        None,
                        Utc::now(),
                    )
                    .await?;
                Err(PaymentError::Gateway(reason))
            }
        }
    }

    /// Consume a gateway callback. Safe to call repeatedly with the same
    /// callback: only the first one that finalizes the attempt has effect.
    pub async fn handle_callback(&self, callback: GatewayCallback) -> Result<CallbackAck, PaymentError> {
        let attempt = self.attempt(&callback.payment_no).await?;
        if attempt.order_id != callback.order_id {
            return Err(PaymentError::AttemptMismatch {
                payment_no: callback.payment_no,
            });
        }
        if attempt.status.is_final() {
            return Ok(CallbackAck::Duplicate { attempt });
        }

        let next = match callback.outcome {
            CallbackOutcome::Success => AttemptStatus::Success,
            CallbackOutcome::Failure { .. } => AttemptStatus::Failed,
        };
        let finalized = self
            .attempts
            .update_status_if(
                &attempt.payment_no,
                AttemptStatus::Pending,
                next,
                Some(&callback.third_party_no),
                Utc::now(),
            )
            .await?;
        let attempt = self.attempt(&callback.payment_no).await?;
        if !finalized {
            return Ok(CallbackAck::Duplicate { attempt });
        }

        if let CallbackOutcome::Failure { reason } = &callback.outcome {
            warn!(
                order_id = attempt.order_id,
                payment_no = %attempt.payment_no,
                reason = %reason,
                "Gateway payment failed"
            );
            return Ok(CallbackAck::Declined { attempt });
        }

        let paid = match self
            .orders
            .pay(attempt.order_id, attempt.buyer_id, attempt.method)
            .await
        {
            Ok(paid) => paid,
            Err(e) => {
                let order = self.orders.get(attempt.order_id).await?;
                return Err(self
                    .compensate_buyer(&order, attempt.buyer_id, attempt.amount, e)
                    .await);
            }
        };

        let seller_credit = self.orders.settle_seller(attempt.order_id).await;
        let order = self.orders.get(attempt.order_id).await.unwrap_or(paid);

        info!(
            order_id = order.id,
            order_no = %order.order_no,
            payment_no = %attempt.payment_no,
            third_party_no = %callback.third_party_no,
            "Gateway payment complete"
        );
        Ok(CallbackAck::Paid {
            order,
            seller_credit,
        })
    }

    pub async fn attempts_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>, PaymentError> {
        Ok(self.attempts.list_for_order(order_id).await?)
    }

    async fn attempt(&self, payment_no: &str) -> Result<PaymentAttempt, PaymentError> {
        self.attempts
            .get(payment_no)
            .await?
            .ok_or_else(|| PaymentError::AttemptNotFound(payment_no.to_string()))
    }

    async fn payable_order(&self, order_id: OrderId, buyer_id: UserId) -> Result<ServiceOrder, PaymentError> {
        let order = self.orders.get(order_id).await?;
        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                action: OrderAction::Pay,
            }
            .into());
        }
        if order.buyer_id != buyer_id {
            return Err(OrderError::Forbidden {
                user_id: buyer_id,
                action: OrderAction::Pay,
            }
            .into());
        }
        Ok(order)
    }

    /// The buyer was charged but the order could not be marked paid: put the
    /// money back in the buyer's wallet and report the failure.
    async fn compensate_buyer(
        &self,
        order: &ServiceOrder,
        buyer_id: UserId,
        charged: MinorUnits,
        cause: OrderError,
    ) -> PaymentError {
        let compensated = if charged == 0 {
            true
        } else {
            let reference = LedgerRef::new(
                RefType::Compensation,
                &order.order_no,
                format!("Payment reversal for order {}", order.order_no),
            );
            match self.wallets.recharge_balance(buyer_id, charged, &reference).await {
                Ok(_) => true,
                Err(e) => {
                    error!(
                        order_id = order.id,
                        order_no = %order.order_no,
                        buyer_id,
                        amount = charged,
                        error = %e,
                        "Payment reversal failed - manual reconciliation required"
                    );
                    false
                }
            }
        };

        warn!(
            order_id = order.id,
            buyer_id,
            charged,
            compensated,
            cause = %cause,
            "Order update failed after charge"
        );
        PaymentError::OrderUpdateFailed {
            order_id: order.id,
            charged,
            compensated,
            reason: cause.to_string(),
        }
    }
}
