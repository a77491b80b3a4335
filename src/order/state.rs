//! Order FSM State Definitions
//!
//! State IDs are stored as SMALLINT. Negative IDs are the two exit states
//! that are not a successful delivery.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service order states
///
/// ```text
/// PENDING_PAYMENT ─pay→ PAID ─start_service→ IN_SERVICE ─complete→ COMPLETED
///        │                │ └──────────────complete─────────────────↗   │
///      cancel             └──────refund──→ REFUNDED ←──────refund───────┘
///        ↓
///    CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum OrderStatus {
    PendingPayment = 10,
    Paid = 20,
    InService = 30,
    /// Terminal for the lifecycle; still refundable within the window
    Completed = 40,
    Cancelled = -10,
    Refunded = -20,
}

/// Operations that move an order between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Pay,
    StartService,
    Complete,
    Cancel,
    Refund,
}

impl OrderStatus {
    /// The transition table. `None` means the action is not allowed here.
    pub fn next(&self, action: OrderAction) -> Option<OrderStatus> {
        use OrderAction::*;
        use OrderStatus::*;
        match (self, action) {
            (PendingPayment, Pay) => Some(Paid),
            (PendingPayment, Cancel) => Some(Cancelled),
            (Paid, StartService) => Some(InService),
            (Paid, Complete) | (InService, Complete) => Some(Completed),
            (Paid, Refund) | (Completed, Refund) => Some(Refunded),
            _ => None,
        }
    }

    /// No action leads anywhere from here. COMPLETED is not terminal: it
    /// can still be refunded.
    pub fn is_terminal(&self) -> bool {
        OrderAction::ALL.iter().all(|a| self.next(*a).is_none())
    }

    /// Money has been taken from the buyer for this order
    #[inline]
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::InService | OrderStatus::Completed
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(OrderStatus::PendingPayment),
            20 => Some(OrderStatus::Paid),
            30 => Some(OrderStatus::InService),
            40 => Some(OrderStatus::Completed),
            -10 => Some(OrderStatus::Cancelled),
            -20 => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::InService => "IN_SERVICE",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::InService,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Pay => "pay",
            OrderAction::StartService => "start_service",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
            OrderAction::Refund => "refund",
        }
    }

    pub const ALL: [OrderAction; 5] = [
        OrderAction::Pay,
        OrderAction::StartService,
        OrderAction::Complete,
        OrderAction::Cancel,
        OrderAction::Refund,
    ];
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
