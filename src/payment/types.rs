//! Payment Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{MinorUnits, OrderId, UserId};
use crate::order::{PaymentMethod, SellerCredit, ServiceOrder};

/// Third-party attempt status
///
/// ```text
/// PENDING ──→ SUCCESS
///    └──────→ FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum AttemptStatus {
    Pending = 0,
    Success = 1,
    Failed = 2,
}

impl AttemptStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(AttemptStatus::Pending),
            1 => Some(AttemptStatus::Success),
            2 => Some(AttemptStatus::Failed),
            _ => None,
        }
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One try at paying an order through a third-party gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub payment_no: String,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub method: PaymentMethod,
    pub amount: MinorUnits,
    pub status: AttemptStatus,
    pub third_party_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn pending(order: &ServiceOrder, method: PaymentMethod) -> Self {
        Self {
            payment_no: format!("PAY{}", ulid::Ulid::new()),
            order_id: order.id,
            buyer_id: order.buyer_id,
            method,
            amount: order.actual_amount,
            status: AttemptStatus::Pending,
            third_party_no: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// What the gateway needs to start a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub order_id: OrderId,
    pub order_no: String,
    pub payment_no: String,
    pub method: PaymentMethod,
    pub amount: MinorUnits,
    pub return_url: String,
    pub notify_url: String,
}

/// Opaque checkout handle shown to the buyer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub redirect_url: Option<String>,
    pub qr_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackOutcome {
    Success,
    Failure { reason: String },
}

/// Asynchronous notification from the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub order_id: OrderId,
    pub payment_no: String,
    pub third_party_no: String,
    pub outcome: CallbackOutcome,
}

/// Result of a synchronous wallet payment
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub order: ServiceOrder,
    /// Debited from the buyer's wallet
    pub charged: MinorUnits,
    pub seller_credit: SellerCredit,
}

/// Result of starting a third-party payment
#[derive(Debug, Clone)]
pub struct GatewayCheckout {
    pub attempt: PaymentAttempt,
    pub payload: GatewayPayload,
}

/// How a gateway callback was handled
#[derive(Debug, Clone)]
pub enum CallbackAck {
    /// Attempt succeeded and the order is now paid
    Paid {
        order: ServiceOrder,
        seller_credit: SellerCredit,
    },
    /// Gateway reported failure; the order stays awaiting payment
    Declined { attempt: PaymentAttempt },
    /// Attempt was already final; nothing changed
    Duplicate { attempt: PaymentAttempt },
}
