//! Service Order Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::OrderStatus;
use crate::core_types::{MinorUnits, OrderId, UserId, Version};

/// How an order was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum PaymentMethod {
    /// Synchronous debit of the buyer's wallet
    Wallet = 1,
    Alipay = 2,
    WechatPay = 3,
    Card = 4,
}

impl PaymentMethod {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PaymentMethod::Wallet),
            2 => Some(PaymentMethod::Alipay),
            3 => Some(PaymentMethod::WechatPay),
            4 => Some(PaymentMethod::Card),
            _ => None,
        }
    }

    /// Third-party methods complete asynchronously through a gateway callback
    #[inline]
    pub fn is_gateway(&self) -> bool {
        !matches!(self, PaymentMethod::Wallet)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::Alipay => "ALIPAY",
            PaymentMethod::WechatPay => "WECHAT_PAY",
            PaymentMethod::Card => "CARD",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const ORDER_EXTRAS_VERSION: u16 = 1;

/// Optional per-order details. Versioned so rows written by older code
/// still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExtras {
    #[serde(default = "default_extras_version")]
    pub schema_version: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn default_extras_version() -> u16 {
    ORDER_EXTRAS_VERSION
}

impl Default for OrderExtras {
    fn default() -> Self {
        Self {
            schema_version: ORDER_EXTRAS_VERSION,
            buyer_note: None,
            contact: None,
            scheduled_at: None,
        }
    }
}

/// One purchase of a listing, owned jointly by buyer and seller
///
/// Never deleted: terminal states stay as final rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: OrderId,
    pub order_no: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Purchased listing (owned elsewhere)
    pub content_id: u64,
    pub base_fee: MinorUnits,
    pub person_fee: MinorUnits,
    pub platform_fee: MinorUnits,
    pub discount_amount: MinorUnits,
    /// `base_fee + person_fee - discount_amount`
    pub actual_amount: MinorUnits,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancel_time: Option<DateTime<Utc>>,
    pub refund_amount: Option<MinorUnits>,
    /// Set while one event is crediting the seller's share
    pub settlement_claimed_at: Option<DateTime<Utc>>,
    /// Set only after the seller's share has been credited
    pub seller_settled_at: Option<DateTime<Utc>>,
    pub extras: OrderExtras,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceOrder {
    /// `base_fee + person_fee`
    pub fn gross_amount(&self) -> MinorUnits {
        self.base_fee.saturating_add(self.person_fee)
    }

    /// What the seller receives: `actual_amount - platform_fee`, floored at 0
    pub fn seller_net(&self) -> MinorUnits {
        self.actual_amount.saturating_sub(self.platform_fee)
    }

    #[inline]
    pub fn is_party(&self, user_id: UserId) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }

    /// The seller has actually received `seller_net()`
    #[inline]
    pub fn is_seller_settled(&self) -> bool {
        self.seller_settled_at.is_some()
    }

    /// Settled, or a settlement is in flight
    #[inline]
    pub fn is_settlement_claimed(&self) -> bool {
        self.settlement_claimed_at.is_some() || self.is_seller_settled()
    }
}

/// Input of `OrderLifecycle::create`
#[derive(Debug, Clone, Default)]
pub struct CreateOrder {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub content_id: u64,
    pub base_fee: MinorUnits,
    pub person_fee: MinorUnits,
    pub discount_amount: MinorUnits,
    /// Defaults to the configured percentage of the gross amount
    pub platform_fee: Option<MinorUnits>,
    pub extras: OrderExtras,
}

/// What happened to the seller's share after an order event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellerCredit {
    Credited { amount: MinorUnits },
    /// An earlier event already claimed the settlement
    AlreadySettled,
    /// Logged, not rolled back; `complete()` retries it later
    Failed { reason: String },
}

impl SellerCredit {
    pub fn is_failed(&self) -> bool {
        matches!(self, SellerCredit::Failed { .. })
    }
}

/// Result of `OrderLifecycle::complete`
#[derive(Debug, Clone)]
pub struct Completion {
    pub order: ServiceOrder,
    pub seller_credit: SellerCredit,
}

/// A refund transition that has been written, with the status it replaced
#[derive(Debug, Clone)]
pub struct RefundClaim {
    pub order: ServiceOrder,
    pub previous_status: OrderStatus,
    pub refund_amount: MinorUnits,
}
